//! Readiness of realized objects.

use crate::graph::{ExternalSecretRef, NodeObject};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Secret;

/// Readiness of one observed object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Exists but has not converged; the message says why
    NotReady(String),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// Readiness of an object as stored by the cluster
///
/// Services, ConfigMaps, Secrets and NetworkPolicies are ready once they
/// exist. A Deployment is ready when every desired replica is ready and the
/// controller has observed the current generation.
pub fn evaluate(object: &NodeObject) -> Readiness {
    match object {
        NodeObject::Deployment(deployment) => deployment_readiness(deployment),
        NodeObject::Service(_)
        | NodeObject::ConfigMap(_)
        | NodeObject::Secret(_)
        | NodeObject::NetworkPolicy(_)
        | NodeObject::ExternalSecret(_) => Readiness::Ready,
    }
}

fn deployment_readiness(deployment: &Deployment) -> Readiness {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let status = deployment.status.as_ref();
    let ready = status.and_then(|s| s.ready_replicas).unwrap_or(0);
    let observed = status.and_then(|s| s.observed_generation);
    let generation = deployment.metadata.generation;

    if let (Some(generation), Some(observed)) = (generation, observed) {
        if observed < generation {
            return Readiness::NotReady(format!(
                "generation {generation} not yet observed (at {observed})"
            ));
        }
    } else if generation.is_some() {
        return Readiness::NotReady("rollout not yet observed".to_string());
    }

    if ready == desired {
        Readiness::Ready
    } else {
        Readiness::NotReady(format!("{ready}/{desired} replicas ready"))
    }
}

/// Readiness of a user-owned secret
///
/// `Err` carries the message of a type mismatch, which no retry can fix.
pub fn external_secret_readiness(
    reference: &ExternalSecretRef,
    observed: Option<&Secret>,
) -> Result<Readiness, String> {
    let Some(secret) = observed else {
        return Ok(Readiness::NotReady("secret not found".to_string()));
    };
    match reference.expected_type.as_deref() {
        Some(expected) => {
            let actual = secret.type_.as_deref().unwrap_or("Opaque");
            if actual == expected {
                Ok(Readiness::Ready)
            } else {
                Err(format!(
                    "secret {} has type {actual}, expected {expected}",
                    reference.name
                ))
            }
        }
        None => Ok(Readiness::Ready),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn deployment(replicas: i32, ready: i32, generation: i64, observed: i64) -> NodeObject {
        NodeObject::Deployment(Deployment {
            metadata: ObjectMeta {
                name: Some("cm1".to_string()),
                generation: Some(generation),
                ..ObjectMeta::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                ..DeploymentSpec::default()
            }),
            status: Some(DeploymentStatus {
                ready_replicas: Some(ready),
                observed_generation: Some(observed),
                ..DeploymentStatus::default()
            }),
        })
    }

    #[test]
    fn test_deployment_ready_when_replicas_match_current_generation() {
        assert!(evaluate(&deployment(2, 2, 3, 3)).is_ready());
        assert_eq!(
            evaluate(&deployment(2, 1, 3, 3)),
            Readiness::NotReady("1/2 replicas ready".to_string())
        );
        assert!(!evaluate(&deployment(2, 2, 4, 3)).is_ready());
    }

    #[test]
    fn test_deployment_without_status_is_not_ready() {
        let object = NodeObject::Deployment(Deployment {
            metadata: ObjectMeta {
                generation: Some(1),
                ..ObjectMeta::default()
            },
            ..Deployment::default()
        });
        assert!(!evaluate(&object).is_ready());
    }

    #[test]
    fn test_external_secret_type_check() {
        let reference = ExternalSecretRef {
            name: "db".to_string(),
            expected_type: Some("goharbor.io/postgresql".to_string()),
        };
        assert_eq!(
            external_secret_readiness(&reference, None),
            Ok(Readiness::NotReady("secret not found".to_string()))
        );

        let mut secret = Secret {
            type_: Some("goharbor.io/postgresql".to_string()),
            ..Secret::default()
        };
        assert_eq!(
            external_secret_readiness(&reference, Some(&secret)),
            Ok(Readiness::Ready)
        );

        secret.type_ = Some("Opaque".to_string());
        let message = external_secret_readiness(&reference, Some(&secret)).unwrap_err();
        assert!(message.contains("expected goharbor.io/postgresql"));
    }
}
