//! Reconcile engine scenarios against an in-memory cluster.

mod common;

use common::{annotated, created, FakeCluster, TestConfig, NAMESPACE};
use harbor_operator::constants::{keys, DEPENDENCIES_CHECKSUM_ANNOTATION};
use harbor_operator::controller::ControllerUid;
use harbor_operator::crd::{condition_status, condition_type, ChartMuseum, ComponentStatus};
use harbor_operator::graph::{NodeKind, NodeObject};
use harbor_operator::planner::secrets::secret_type;
use k8s_openapi::api::apps::v1::Deployment;
use kube_runtime::controller::Action;
use serde_json::json;

fn chartmuseum(name: &str, spec: serde_json::Value) -> ChartMuseum {
    let resource: ChartMuseum = serde_json::from_value(json!({
        "apiVersion": "goharbor.io/v1beta1",
        "kind": "ChartMuseum",
        "metadata": { "name": name },
        "spec": spec,
    }))
    .unwrap();
    created(resource, &format!("uid-{name}"))
}

fn basic_chartmuseum() -> ChartMuseum {
    chartmuseum(
        "cm1",
        json!({
            "chart": { "url": "http://the.chartserver.url" },
            "storage": { "fileSystem": { "emptyDir": {} } },
        }),
    )
}

fn status(cluster: &FakeCluster, name: &str) -> ComponentStatus {
    cluster
        .component::<ChartMuseum>(NAMESPACE, name)
        .status
        .unwrap()
}

fn condition(status: &ComponentStatus, condition_type: &str) -> String {
    status.condition(condition_type).unwrap().status.clone()
}

fn deployment(cluster: &FakeCluster, name: &str) -> Deployment {
    match cluster.object(NodeKind::Deployment, name) {
        Some(NodeObject::Deployment(deployment)) => deployment,
        other => panic!("expected a deployment, found {other:?}"),
    }
}

fn checksum(deployment: &Deployment) -> String {
    deployment.spec.as_ref().unwrap().template.metadata.as_ref().unwrap()
        .annotations.as_ref().unwrap()[DEPENDENCIES_CHECKSUM_ANNOTATION]
        .clone()
}

#[tokio::test]
async fn chartmuseum_reaches_applied_once_ready() {
    let cluster = FakeCluster::ready();
    cluster.put_component(&basic_chartmuseum());
    let config = TestConfig::new();
    let reconciler = config.reconciler::<ChartMuseum>(&cluster);

    let action = reconciler
        .reconcile_component::<ChartMuseum>(NAMESPACE, "cm1")
        .await
        .unwrap();
    assert_eq!(action, Action::await_change());

    let status = status(&cluster, "cm1");
    assert_eq!(status.observed_generation, Some(1));
    assert_eq!(condition(&status, condition_type::APPLIED), condition_status::TRUE);
    assert_eq!(condition(&status, condition_type::IN_PROGRESS), condition_status::FALSE);
    assert_eq!(condition(&status, condition_type::FAILED), condition_status::FALSE);
    assert_eq!(status.operator.controller_version.as_deref(), Some("0.1.0+test"));

    let Some(NodeObject::ConfigMap(config_map)) = cluster.object(NodeKind::ConfigMap, "cm1") else {
        panic!("config map not written");
    };
    assert!(config_map.data.unwrap().contains_key("config.yaml"));

    let Some(NodeObject::Service(service)) = cluster.object(NodeKind::Service, "cm1") else {
        panic!("service not written");
    };
    let port = &service.spec.unwrap().ports.unwrap()[0];
    assert_eq!(port.name.as_deref(), Some("http"));
    assert_eq!(port.port, 80);

    let pod = deployment(&cluster, "cm1").spec.unwrap().template.spec.unwrap();
    let container = &pod.containers[0];
    assert_eq!(container.name, "chartmuseum");
    let probe = container.readiness_probe.as_ref().unwrap().http_get.as_ref().unwrap();
    assert_eq!(probe.path.as_deref(), Some("/health"));
    assert_eq!(
        container.ports.as_ref().unwrap()[0].container_port,
        8080
    );
}

#[tokio::test]
async fn managed_objects_carry_owner_and_standard_labels() {
    let cluster = FakeCluster::ready();
    cluster.put_component(&basic_chartmuseum());
    let config = TestConfig::new();
    config
        .reconciler::<ChartMuseum>(&cluster)
        .reconcile_component::<ChartMuseum>(NAMESPACE, "cm1")
        .await
        .unwrap();

    let objects = cluster.objects();
    assert_eq!(objects.len(), 3);
    for object in objects {
        let meta = object.metadata().unwrap();
        let owners = meta.owner_references.as_ref().unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].uid, "uid-cm1");
        assert_eq!(owners[0].kind, "ChartMuseum");
        assert_eq!(owners[0].controller, Some(true));

        let labels = meta.labels.as_ref().unwrap();
        assert_eq!(labels["goharbor.io/name"], "cm1");
        assert_eq!(labels["goharbor.io/namespace"], NAMESPACE);
    }
}

#[tokio::test]
async fn config_map_is_written_before_the_deployment() {
    let cluster = FakeCluster::ready();
    cluster.put_component(&basic_chartmuseum());
    let config = TestConfig::new();
    config
        .reconciler::<ChartMuseum>(&cluster)
        .reconcile_component::<ChartMuseum>(NAMESPACE, "cm1")
        .await
        .unwrap();

    let writes = cluster.writes();
    let position = |kind| writes.iter().position(|(k, _)| *k == kind).unwrap();
    assert!(position(NodeKind::ConfigMap) < position(NodeKind::Deployment));
}

#[tokio::test]
async fn second_pass_without_changes_writes_nothing() {
    let cluster = FakeCluster::ready();
    cluster.put_component(&basic_chartmuseum());
    let config = TestConfig::new();
    let reconciler = config.reconciler::<ChartMuseum>(&cluster);

    reconciler
        .reconcile_component::<ChartMuseum>(NAMESPACE, "cm1")
        .await
        .unwrap();
    let writes = cluster.writes().len();
    let patches = cluster.status_patches();
    let before = status(&cluster, "cm1");

    let action = reconciler
        .reconcile_component::<ChartMuseum>(NAMESPACE, "cm1")
        .await
        .unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(cluster.writes().len(), writes);
    assert_eq!(cluster.status_patches(), patches);
    assert_eq!(status(&cluster, "cm1"), before);
}

#[tokio::test]
async fn missing_basic_auth_secret_keeps_resource_in_progress() {
    let cluster = FakeCluster::ready();
    cluster.put_component(&chartmuseum(
        "cm1",
        json!({
            "chart": { "url": "http://the.chartserver.url" },
            "storage": { "fileSystem": { "emptyDir": {} } },
            "authentication": { "basicAuthRef": "cm-basic-auth" },
        }),
    ));
    let config = TestConfig::new();
    let reconciler = config.reconciler::<ChartMuseum>(&cluster);

    let action = reconciler
        .reconcile_component::<ChartMuseum>(NAMESPACE, "cm1")
        .await
        .unwrap();
    assert_ne!(action, Action::await_change());

    let pending = status(&cluster, "cm1");
    assert_eq!(condition(&pending, condition_type::IN_PROGRESS), condition_status::TRUE);
    assert_eq!(condition(&pending, condition_type::APPLIED), condition_status::FALSE);
    assert_eq!(
        pending.condition(condition_type::IN_PROGRESS).unwrap().reason.as_deref(),
        Some("DependencyMissing")
    );
    assert!(cluster.object(NodeKind::Deployment, "cm1").is_none());

    cluster.put_secret(
        "cm-basic-auth",
        secret_type::BASIC_AUTH,
        &[("username", "admin"), ("password", "s3cret")],
    );
    let action = reconciler
        .reconcile_component::<ChartMuseum>(NAMESPACE, "cm1")
        .await
        .unwrap();
    assert_eq!(action, Action::await_change());
    let applied = status(&cluster, "cm1");
    assert_eq!(condition(&applied, condition_type::APPLIED), condition_status::TRUE);

    let pod = deployment(&cluster, "cm1").spec.unwrap().template.spec.unwrap();
    let env = pod.containers[0].env.clone().unwrap();
    let user = env.iter().find(|var| var.name == "BASIC_AUTH_USER").unwrap();
    let reference = user.value_from.as_ref().unwrap().secret_key_ref.as_ref().unwrap();
    assert_eq!(reference.name, "cm-basic-auth");
    assert_eq!(reference.key, "username");
}

#[tokio::test]
async fn scale_up_stays_in_progress_until_new_replicas_are_ready() {
    let cluster = FakeCluster::new();
    cluster.put_component(&basic_chartmuseum());
    let config = TestConfig::new();
    let reconciler = config.reconciler::<ChartMuseum>(&cluster);

    reconciler
        .reconcile_component::<ChartMuseum>(NAMESPACE, "cm1")
        .await
        .unwrap();
    assert_eq!(
        condition(&status(&cluster, "cm1"), condition_type::IN_PROGRESS),
        condition_status::TRUE
    );

    cluster.mark_deployments_ready();
    reconciler
        .reconcile_component::<ChartMuseum>(NAMESPACE, "cm1")
        .await
        .unwrap();
    assert_eq!(
        condition(&status(&cluster, "cm1"), condition_type::APPLIED),
        condition_status::TRUE
    );

    let mut scaled = cluster.component::<ChartMuseum>(NAMESPACE, "cm1");
    scaled.spec.component.replicas = Some(2);
    scaled.metadata.generation = Some(2);
    cluster.put_component(&scaled);

    let action = reconciler
        .reconcile_component::<ChartMuseum>(NAMESPACE, "cm1")
        .await
        .unwrap();
    assert_ne!(action, Action::await_change());
    let scaling = status(&cluster, "cm1");
    assert_eq!(scaling.observed_generation, Some(2));
    assert_eq!(condition(&scaling, condition_type::IN_PROGRESS), condition_status::TRUE);
    assert_eq!(condition(&scaling, condition_type::APPLIED), condition_status::FALSE);
    assert_eq!(
        deployment(&cluster, "cm1").spec.unwrap().replicas,
        Some(2)
    );

    cluster.mark_deployments_ready();
    let action = reconciler
        .reconcile_component::<ChartMuseum>(NAMESPACE, "cm1")
        .await
        .unwrap();
    assert_eq!(action, Action::await_change());
    let scaled = status(&cluster, "cm1");
    assert_eq!(scaled.observed_generation, Some(2));
    assert_eq!(condition(&scaled, condition_type::APPLIED), condition_status::TRUE);
}

#[tokio::test]
async fn resource_of_another_class_is_ignored() {
    let cluster = FakeCluster::ready();
    cluster.put_component(&annotated(
        basic_chartmuseum(),
        "goharbor.io/harbor",
        "other",
    ));
    let config = TestConfig::new();

    let action = config
        .reconciler::<ChartMuseum>(&cluster)
        .reconcile_component::<ChartMuseum>(NAMESPACE, "cm1")
        .await
        .unwrap();

    assert_eq!(action, Action::await_change());
    assert!(cluster.writes().is_empty());
    assert_eq!(cluster.status_patches(), 0);
}

#[tokio::test]
async fn configured_class_only_processes_matching_resources() {
    let cluster = FakeCluster::ready();
    cluster.put_component(&annotated(
        chartmuseum(
            "prod-cm",
            json!({
                "chart": { "url": "http://the.chartserver.url" },
                "storage": { "fileSystem": { "emptyDir": {} } },
            }),
        ),
        "goharbor.io/harbor",
        "prod",
    ));
    cluster.put_component(&basic_chartmuseum());
    let config = TestConfig::new();
    config.set(keys::HARBOR_CLASS, "prod");
    let reconciler = config.reconciler::<ChartMuseum>(&cluster);

    reconciler
        .reconcile_component::<ChartMuseum>(NAMESPACE, "cm1")
        .await
        .unwrap();
    assert!(cluster.writes().is_empty());

    reconciler
        .reconcile_component::<ChartMuseum>(NAMESPACE, "prod-cm")
        .await
        .unwrap();
    assert!(cluster.object(NodeKind::Deployment, "prod-cm").is_some());
}

#[tokio::test]
async fn deleted_resource_ends_the_pass() {
    let cluster = FakeCluster::ready();
    let config = TestConfig::new();

    let action = config
        .reconciler::<ChartMuseum>(&cluster)
        .reconcile_component::<ChartMuseum>(NAMESPACE, "gone")
        .await
        .unwrap();

    assert_eq!(action, Action::await_change());
    assert!(cluster.writes().is_empty());
}

#[tokio::test]
async fn template_change_rolls_the_deployment() {
    let cluster = FakeCluster::ready();
    cluster.put_component(&basic_chartmuseum());
    let config = TestConfig::new();
    let template_key = keys::template_content(ControllerUid::ChartMuseum.as_str());
    config.set(&template_key, "port: {{ port }}\ndebug: false\n");
    let reconciler = config.reconciler::<ChartMuseum>(&cluster);

    reconciler
        .reconcile_component::<ChartMuseum>(NAMESPACE, "cm1")
        .await
        .unwrap();
    let first = checksum(&deployment(&cluster, "cm1"));

    config.set(&template_key, "port: {{ port }}\ndebug: true\n");
    reconciler
        .reconcile_component::<ChartMuseum>(NAMESPACE, "cm1")
        .await
        .unwrap();

    let Some(NodeObject::ConfigMap(config_map)) = cluster.object(NodeKind::ConfigMap, "cm1") else {
        panic!("config map not written");
    };
    assert_eq!(
        config_map.data.unwrap()["config.yaml"],
        "port: 8080\ndebug: true\n"
    );
    let second = checksum(&deployment(&cluster, "cm1"));
    assert_ne!(first, second);
    assert_eq!(
        condition(&status(&cluster, "cm1"), condition_type::APPLIED),
        condition_status::TRUE
    );
}

#[tokio::test]
async fn broken_template_fails_without_requeue() {
    let cluster = FakeCluster::ready();
    cluster.put_component(&basic_chartmuseum());
    let config = TestConfig::new();
    config.set(
        &keys::template_content(ControllerUid::ChartMuseum.as_str()),
        "port: {{ port \n",
    );

    let action = config
        .reconciler::<ChartMuseum>(&cluster)
        .reconcile_component::<ChartMuseum>(NAMESPACE, "cm1")
        .await
        .unwrap();

    assert_eq!(action, Action::await_change());
    let failed = status(&cluster, "cm1");
    assert_eq!(condition(&failed, condition_type::FAILED), condition_status::TRUE);
    assert_eq!(condition(&failed, condition_type::IN_PROGRESS), condition_status::FALSE);
    assert_eq!(condition(&failed, condition_type::APPLIED), condition_status::FALSE);
    assert_eq!(
        failed.condition(condition_type::FAILED).unwrap().reason.as_deref(),
        Some("TemplateError")
    );
    assert!(cluster.writes().is_empty());
}

#[tokio::test]
async fn network_policy_is_planned_when_enabled() {
    let cluster = FakeCluster::ready();
    cluster.put_component(&basic_chartmuseum());
    let config = TestConfig::new();
    config.set(&keys::network_policies_enabled("chartmuseum"), "true");

    config
        .reconciler::<ChartMuseum>(&cluster)
        .reconcile_component::<ChartMuseum>(NAMESPACE, "cm1")
        .await
        .unwrap();

    assert!(cluster.object(NodeKind::NetworkPolicy, "cm1-ingress").is_some());
}

#[tokio::test]
async fn cancelled_pass_writes_nothing() {
    let cluster = FakeCluster::ready();
    cluster.put_component(&basic_chartmuseum());
    let config = TestConfig::new();
    let cancel = tokio_util::sync::CancellationToken::new();
    cancel.cancel();

    let action = config
        .reconciler_with_cancel::<ChartMuseum>(&cluster, cancel)
        .reconcile_component::<ChartMuseum>(NAMESPACE, "cm1")
        .await
        .unwrap();

    assert_eq!(action, Action::await_change());
    assert!(cluster.writes().is_empty());
    assert_eq!(cluster.status_patches(), 0);
}

#[tokio::test]
async fn resource_without_uid_is_rejected() {
    let cluster = FakeCluster::ready();
    let mut resource = basic_chartmuseum();
    resource.metadata.uid = None;
    cluster.put_component(&resource);
    let config = TestConfig::new();

    let error = config
        .reconciler::<ChartMuseum>(&cluster)
        .reconcile_component::<ChartMuseum>(NAMESPACE, "cm1")
        .await
        .unwrap_err();

    assert!(!error.is_retryable());
    assert!(cluster.writes().is_empty());
}
