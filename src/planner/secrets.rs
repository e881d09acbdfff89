//! Secret types and keys understood by the planners.

use super::PlanError;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;

/// Declared `type` of referenced secrets
pub mod secret_type {
    pub const REDIS: &str = "goharbor.io/redis";
    pub const POSTGRESQL: &str = "goharbor.io/postgresql";
    pub const SINGLE_KEY: &str = "goharbor.io/single-key";
    pub const HTPASSWD: &str = "goharbor.io/htpasswd";
    pub const GITHUB: &str = "goharbor.io/github";
    pub const TLS: &str = "kubernetes.io/tls";
    pub const BASIC_AUTH: &str = "kubernetes.io/basic-auth";
    pub const OPAQUE: &str = "Opaque";
}

/// Data keys of referenced secrets
pub mod secret_key {
    pub const REDIS_PASSWORD: &str = "redis-password";
    pub const POSTGRES_PASSWORD: &str = "postgres-password";
    pub const SECRET: &str = "secret";
    pub const HTPASSWD: &str = "htpasswd";
    pub const GITHUB_TOKEN: &str = "github-token";
    pub const TLS_CERT: &str = "tls.crt";
    pub const TLS_KEY: &str = "tls.key";
    pub const CA_CERT: &str = "ca.crt";
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    pub const S3_SECRET_KEY: &str = "secretkey";
}

/// Fail unless `secret` declares `expected` as its type
pub fn check_type(secret: &Secret, expected: &str) -> Result<(), PlanError> {
    let actual = secret.type_.as_deref().unwrap_or(secret_type::OPAQUE);
    if actual == expected {
        Ok(())
    } else {
        Err(PlanError::SecretTypeMismatch {
            name: secret.name_any(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

/// UTF-8 value of `key`, from `data` or `stringData`
pub fn string_value(secret: &Secret, key: &str) -> Result<String, PlanError> {
    let missing = || PlanError::SecretKeyMissing {
        name: secret.name_any(),
        key: key.to_string(),
    };

    if let Some(bytes) = secret.data.as_ref().and_then(|data| data.get(key)) {
        return String::from_utf8(bytes.0.clone()).map_err(|_utf8_error| PlanError::InvalidSpec {
            field: "secret",
            message: format!("key {key} of secret {} is not valid UTF-8", secret.name_any()),
        });
    }
    secret
        .string_data
        .as_ref()
        .and_then(|data| data.get(key))
        .cloned()
        .ok_or_else(missing)
}
