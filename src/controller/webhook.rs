//! # Validating Webhooks
//!
//! Structural checks on component specs, served as `AdmissionReview`s at
//! `/validate/<uid>`.
//!
//! Every violation found is reported, not just the first one:
//!
//! - URLs must be non-empty and use the `http` or `https` scheme
//! - referenced secret names must be valid DNS-1123 subdomains
//! - replica counts must not be negative

use super::ControllerUid;
use crate::crd::{
    ChartMuseum, ComponentResource, ComponentSpec, Core, CredentialsRef, HarborComponent,
    JobService, NotaryServer, NotarySigner, Portal, PostgresConnection, RedisConnection,
    Registry, RegistryController, TlsConfig, Trivy,
};
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

/// Maximum length of a DNS-1123 subdomain
const MAX_SUBDOMAIN_LENGTH: usize = 253;

static DNS1123_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("DNS-1123 subdomain pattern must compile")
});

/// Collects violations with their field paths
#[derive(Debug, Default)]
struct Validator {
    errors: Vec<String>,
}

impl Validator {
    fn url(&mut self, field: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            self.errors.push(format!("{field} must not be empty"));
            return;
        }
        match value.split_once("://") {
            Some(("http" | "https", rest)) if !rest.is_empty() => {}
            Some((scheme, _)) if scheme != "http" && scheme != "https" => self
                .errors
                .push(format!("{field} '{value}' must use the http or https scheme")),
            _ => self
                .errors
                .push(format!("{field} '{value}' is not a valid URL")),
        }
    }

    fn optional_url(&mut self, field: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.url(field, value);
        }
    }

    fn secret_name(&mut self, field: &str, value: &str) {
        if value.is_empty() {
            self.errors.push(format!("{field} must not be empty"));
        } else if value.len() > MAX_SUBDOMAIN_LENGTH {
            self.errors.push(format!(
                "{field} '{value}' is longer than {MAX_SUBDOMAIN_LENGTH} characters"
            ));
        } else if !DNS1123_SUBDOMAIN.is_match(value) {
            self.errors.push(format!(
                "{field} '{value}' must consist of lower case alphanumeric characters, '-' or '.', \
                 and must start and end with an alphanumeric character"
            ));
        }
    }

    fn optional_secret_name(&mut self, field: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.secret_name(field, value);
        }
    }

    fn at_least(&mut self, field: &str, value: i64, min: i64) {
        if value < min {
            self.errors
                .push(format!("{field} must be at least {min}, got {value}"));
        }
    }

    fn component(&mut self, spec: &ComponentSpec) {
        if let Some(replicas) = spec.replicas {
            self.at_least("spec.replicas", i64::from(replicas), 0);
        }
        for (index, secret) in spec.image_pull_secrets.iter().enumerate() {
            self.secret_name(&format!("spec.imagePullSecrets[{index}].name"), &secret.name);
        }
    }

    fn tls(&mut self, field: &str, tls: Option<&TlsConfig>) {
        if let Some(tls) = tls {
            self.secret_name(&format!("{field}.certificateRef"), &tls.certificate_ref);
        }
    }

    fn redis(&mut self, field: &str, redis: &RedisConnection) {
        if redis.host.is_empty() {
            self.errors.push(format!("{field}.host must not be empty"));
        }
        self.optional_secret_name(&format!("{field}.passwordRef"), redis.password_ref.as_deref());
    }

    fn postgres(&mut self, field: &str, postgres: &PostgresConnection) {
        if postgres.host.is_empty() {
            self.errors.push(format!("{field}.host must not be empty"));
        }
        self.optional_secret_name(
            &format!("{field}.passwordRef"),
            postgres.password_ref.as_deref(),
        );
    }

    fn credentials(&mut self, field: &str, credentials: &CredentialsRef) {
        self.secret_name(&format!("{field}.passwordRef"), &credentials.password_ref);
    }

    fn finish(self) -> Result<(), Vec<String>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Validate a component resource, returning every violation found
pub fn validate(resource: &ComponentResource) -> Result<(), Vec<String>> {
    let mut v = Validator::default();
    match resource {
        ComponentResource::ChartMuseum(cm) => {
            let spec = &cm.spec;
            v.component(&spec.component);
            v.url("spec.chart.url", &spec.chart.url);
            if let Some(store) = &spec.storage.object_store {
                v.secret_name("spec.storage.objectStore.secretRef", &store.secret_ref);
            }
            if let Some(auth) = &spec.authentication {
                v.optional_secret_name(
                    "spec.authentication.basicAuthRef",
                    auth.basic_auth_ref.as_deref(),
                );
            }
            if let Some(redis) = spec.cache.as_ref().and_then(|c| c.redis.as_ref()) {
                v.redis("spec.cache.redis", redis);
            }
            v.tls("spec.tls", spec.tls.as_ref());
        }
        ComponentResource::Core(core) => {
            let spec = &core.spec;
            v.component(&spec.component);
            v.url("spec.externalEndpoint", &spec.external_endpoint);
            v.secret_name("spec.secretRef", &spec.secret_ref);
            v.optional_url("spec.tokenService.url", spec.token_service.url.as_deref());
            v.secret_name(
                "spec.tokenService.certificateRef",
                &spec.token_service.certificate_ref,
            );
            v.url("spec.jobservice.url", &spec.jobservice.url);
            v.secret_name("spec.jobservice.secretRef", &spec.jobservice.secret_ref);
            let components = &spec.components;
            v.url("spec.components.portalUrl", &components.portal_url);
            v.url("spec.components.registry.url", &components.registry.url);
            v.url(
                "spec.components.registry.controllerUrl",
                &components.registry.controller_url,
            );
            v.credentials(
                "spec.components.registry.credentials",
                &components.registry.credentials,
            );
            v.optional_url(
                "spec.components.chartRepositoryUrl",
                components.chart_repository_url.as_deref(),
            );
            v.optional_url(
                "spec.components.trivyAdapterUrl",
                components.trivy_adapter_url.as_deref(),
            );
            v.optional_url(
                "spec.components.notaryServerUrl",
                components.notary_server_url.as_deref(),
            );
            v.postgres("spec.database", &spec.database.connection);
            v.secret_name(
                "spec.database.encryptionKeyRef",
                &spec.database.encryption_key_ref,
            );
            v.redis("spec.redis", &spec.redis.connection);
            if let Some(cache) = &spec.redis.registry_cache {
                v.redis("spec.redis.registryCache", cache);
            }
            v.secret_name("spec.csrfKeyRef", &spec.csrf_key_ref);
            v.secret_name(
                "spec.adminInitialPasswordRef",
                &spec.admin_initial_password_ref,
            );
            v.tls("spec.tls", spec.tls.as_ref());
        }
        ComponentResource::JobService(js) => {
            let spec = &js.spec;
            v.component(&spec.component);
            v.url("spec.core.url", &spec.core.url);
            v.secret_name("spec.core.secretRef", &spec.core.secret_ref);
            v.secret_name("spec.secretRef", &spec.secret_ref);
            v.url("spec.registry.url", &spec.registry.url);
            v.url("spec.registry.controllerUrl", &spec.registry.controller_url);
            v.credentials("spec.registry.credentials", &spec.registry.credentials);
            v.at_least("spec.workerPool.workers", i64::from(spec.worker_pool.workers), 1);
            v.redis("spec.workerPool.redis", &spec.worker_pool.redis);
            v.tls("spec.tls", spec.tls.as_ref());
        }
        ComponentResource::NotaryServer(ns) => {
            let spec = &ns.spec;
            v.component(&spec.component);
            v.postgres("spec.storage.postgres", &spec.storage.postgres);
            v.secret_name(
                "spec.trustService.remote.certificateRef",
                &spec.trust_service.remote.certificate_ref,
            );
            if let Some(auth) = &spec.authentication {
                v.url("spec.authentication.token.realm", &auth.token.realm);
                v.secret_name(
                    "spec.authentication.token.certificateRef",
                    &auth.token.certificate_ref,
                );
            }
            v.tls("spec.tls", spec.tls.as_ref());
        }
        ComponentResource::NotarySigner(ns) => {
            let spec = &ns.spec;
            v.component(&spec.component);
            v.postgres("spec.storage.postgres", &spec.storage.postgres);
            v.secret_name("spec.storage.aliasesRef", &spec.storage.aliases_ref);
            v.tls("spec.tls", Some(&spec.tls));
        }
        ComponentResource::Portal(portal) => {
            v.component(&portal.spec.component);
            v.tls("spec.tls", portal.spec.tls.as_ref());
        }
        ComponentResource::Registry(registry) => {
            let spec = &registry.spec;
            v.component(&spec.component);
            v.secret_name("spec.http.secretRef", &spec.http.secret_ref);
            match (&spec.storage.file_system, &spec.storage.s3) {
                (Some(_), None) => {}
                (None, Some(s3)) => {
                    v.secret_name("spec.storage.s3.secretKeyRef", &s3.secret_key_ref);
                    v.optional_url(
                        "spec.storage.s3.regionEndpoint",
                        s3.region_endpoint.as_deref(),
                    );
                }
                _ => v
                    .errors
                    .push("spec.storage must set exactly one of fileSystem or s3".to_string()),
            }
            if let Some(auth) = &spec.authentication {
                v.secret_name("spec.authentication.htpasswdRef", &auth.htpasswd_ref);
            }
            if let Some(redis) = &spec.redis {
                v.redis("spec.redis", redis);
            }
            v.tls("spec.tls", spec.tls.as_ref());
        }
        ComponentResource::RegistryController(ctl) => {
            let spec = &ctl.spec;
            v.component(&spec.component);
            v.secret_name("spec.registryRef", &spec.registry_ref);
            v.secret_name("spec.coreSecretRef", &spec.core_secret_ref);
            v.secret_name("spec.jobserviceSecretRef", &spec.jobservice_secret_ref);
            v.tls("spec.tls", spec.tls.as_ref());
        }
        ComponentResource::Trivy(trivy) => {
            let spec = &trivy.spec;
            v.component(&spec.component);
            v.redis("spec.redis", &spec.redis);
            v.optional_secret_name(
                "spec.update.githubTokenRef",
                spec.update.github_token_ref.as_deref(),
            );
            v.tls("spec.tls", spec.tls.as_ref());
        }
    }
    v.finish()
}

fn decode<K: HarborComponent>(object: DynamicObject) -> Result<ComponentResource, String> {
    object
        .try_parse::<K>()
        .map(|resource| Arc::new(resource).into_resource())
        .map_err(|e| format!("cannot decode {}: {e}", K::kind(&())))
}

/// Decode an admitted object into the component kind served by `uid`
pub fn decode_component(
    uid: ControllerUid,
    object: DynamicObject,
) -> Result<ComponentResource, String> {
    match uid {
        ControllerUid::ChartMuseum => decode::<ChartMuseum>(object),
        ControllerUid::Core => decode::<Core>(object),
        ControllerUid::JobService => decode::<JobService>(object),
        ControllerUid::NotaryServer => decode::<NotaryServer>(object),
        ControllerUid::NotarySigner => decode::<NotarySigner>(object),
        ControllerUid::Portal => decode::<Portal>(object),
        ControllerUid::Registry => decode::<Registry>(object),
        ControllerUid::RegistryController => decode::<RegistryController>(object),
        ControllerUid::Trivy => decode::<Trivy>(object),
    }
}

/// Answer an admission review for the component kind served by `uid`
pub fn review(
    uid: ControllerUid,
    review: AdmissionReview<DynamicObject>,
) -> AdmissionReview<DynamicObject> {
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            warn!(controller = uid.as_str(), error = %e, "invalid admission review");
            return AdmissionResponse::invalid(e.to_string()).into_review();
        }
    };
    admit(uid, &request).into_review()
}

/// Decide one admission request
pub fn admit(uid: ControllerUid, request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
    let response = AdmissionResponse::from(request);
    if matches!(request.operation, Operation::Delete) {
        return response;
    }
    let Some(object) = request.object.clone() else {
        return response;
    };

    let outcome = decode_component(uid, object)
        .map_err(|message| vec![message])
        .and_then(|resource| validate(&resource));
    match outcome {
        Ok(()) => {
            debug!(controller = uid.as_str(), name = %request.name, "admitted");
            response
        }
        Err(errors) => {
            let message = errors.join("; ");
            info!(
                controller = uid.as_str(),
                name = %request.name,
                namespace = request.namespace.as_deref().unwrap_or_default(),
                reason = %message,
                "denied"
            );
            response.deny(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ChartMuseumSpec;
    use serde_json::json;

    fn chartmuseum(spec: serde_json::Value) -> ComponentResource {
        let spec: ChartMuseumSpec = serde_json::from_value(spec).unwrap();
        ComponentResource::ChartMuseum(Arc::new(ChartMuseum::new("cm1", spec)))
    }

    fn review_for(object: serde_json::Value) -> AdmissionReview<DynamicObject> {
        serde_json::from_value(json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": { "group": "goharbor.io", "version": "v1beta1", "kind": "ChartMuseum" },
                "resource": { "group": "goharbor.io", "version": "v1beta1", "resource": "chartmuseums" },
                "requestKind": { "group": "goharbor.io", "version": "v1beta1", "kind": "ChartMuseum" },
                "requestResource": { "group": "goharbor.io", "version": "v1beta1", "resource": "chartmuseums" },
                "name": "cm1",
                "namespace": "default",
                "operation": "CREATE",
                "userInfo": { "username": "admin" },
                "object": object,
                "dryRun": false
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_chartmuseum_is_admitted() {
        let resource = chartmuseum(json!({
            "chart": { "url": "http://the.chartserver.url" },
            "storage": { "fileSystem": { "emptyDir": {} } },
            "replicas": 2
        }));
        assert!(validate(&resource).is_ok());
    }

    #[test]
    fn test_every_violation_is_reported() {
        let resource = chartmuseum(json!({
            "chart": { "url": "ftp://charts" },
            "storage": { "objectStore": { "kind": "s3", "secretRef": "Not_A_Name" } },
            "replicas": -1
        }));
        let errors = validate(&resource).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].starts_with("spec.replicas"));
        assert!(errors[1].contains("http or https"));
        assert!(errors[2].starts_with("spec.storage.objectStore.secretRef"));
    }

    #[test]
    fn test_url_without_scheme_is_rejected() {
        let mut v = Validator::default();
        v.url("spec.chart.url", "charts.example.com");
        v.url("spec.chart.url", "");
        v.url("spec.chart.url", "https://charts.example.com");
        assert_eq!(v.errors.len(), 2);
    }

    #[test]
    fn test_secret_names_follow_dns1123() {
        let mut v = Validator::default();
        v.secret_name("ref", "core-secret.v1");
        v.secret_name("ref", "-leading");
        v.secret_name("ref", &"a".repeat(254));
        assert_eq!(v.errors.len(), 2);
    }

    #[test]
    fn test_review_denies_invalid_object() {
        let review = review_for(json!({
            "apiVersion": "goharbor.io/v1beta1",
            "kind": "ChartMuseum",
            "metadata": { "name": "cm1", "namespace": "default" },
            "spec": {
                "chart": { "url": "" },
                "storage": { "fileSystem": { "emptyDir": {} } }
            }
        }));
        let answer = super::review(ControllerUid::ChartMuseum, review);
        let response = answer.response.unwrap();
        assert!(!response.allowed);
        assert!(response.result.message.contains("spec.chart.url must not be empty"));
    }

    #[test]
    fn test_review_allows_valid_object() {
        let review = review_for(json!({
            "apiVersion": "goharbor.io/v1beta1",
            "kind": "ChartMuseum",
            "metadata": { "name": "cm1", "namespace": "default" },
            "spec": {
                "chart": { "url": "https://charts.example.com" },
                "storage": { "fileSystem": { "emptyDir": {} } }
            }
        }));
        let answer = super::review(ControllerUid::ChartMuseum, review);
        assert!(answer.response.unwrap().allowed);
    }
}
