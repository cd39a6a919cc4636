//! End-to-end composition of the declaration sets under `fixtures/`.

use std::path::{Path, PathBuf};

use manifold_core::{
    compose, compose_file, compose_with_provider, ComposeError, ComposeOptions,
    CompositionReport, FailurePolicy, InMemoryProvider, Progress, Stage,
};

/// Locate the workspace root by walking up from CARGO_MANIFEST_DIR.
fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    // crates/core -> workspace root is two levels up
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .to_path_buf()
}

fn fixture(rel: &str) -> PathBuf {
    workspace_root().join("fixtures").join(rel)
}

fn compose_fixture(rel: &str, policy: FailurePolicy) -> Result<CompositionReport, ComposeError> {
    let options = ComposeOptions {
        failure_policy: policy,
        default_namespace: None,
    };
    compose_file(&fixture(rel), &options, &mut |_| {})
}

fn text_of<'a>(report: &'a CompositionReport, file_name: &str) -> &'a str {
    report
        .manifests
        .iter()
        .find(|m| m.file_name == file_name)
        .map(|m| m.text.as_str())
        .unwrap_or_else(|| panic!("no manifest named {}", file_name))
}

#[test]
fn mesh_composes_with_imported_services() {
    let report = compose_fixture("mesh/main.yaml", FailurePolicy::FailFast).unwrap();
    let files: Vec<&str> = report.manifests.iter().map(|m| m.file_name.as_str()).collect();
    assert_eq!(
        files,
        vec![
            "service-reviews-svc.yaml",
            "deployment-reviews-v1.yaml",
            "gateway-gw1.yaml",
            "virtualservice-reviews.yaml",
            "route-bookinfo.yaml",
        ]
    );

    let vs = text_of(&report, "virtualservice-reviews.yaml");
    assert!(vs.contains("host: reviews-svc"), "{}", vs);
    assert!(vs.contains("weight: 90"));
    assert!(!vs.contains("serviceName"));
    // the v2 destination declared its port as -1
    assert_eq!(vs.matches("number: 9080").count(), 1, "{}", vs);

    let route = text_of(&report, "route-bookinfo.yaml");
    assert!(route.contains("name: reviews-svc"), "{}", route);
    assert!(route.contains("apiVersion: route.openshift.io/v1"));
}

#[test]
fn gateway_without_servers_renders_default_server() {
    let report = compose_fixture("gateway_default.yaml", FailurePolicy::FailFast).unwrap();
    let text = text_of(&report, "gateway-gw1.yaml");
    let value: serde_yaml::Value = serde_yaml::from_str(text).unwrap();
    let servers = value["spec"]["servers"].as_sequence().unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0]["port"]["number"], serde_yaml::Value::from(80));
    assert_eq!(servers[0]["port"]["protocol"], serde_yaml::Value::from("HTTP"));
    assert_eq!(servers[0]["port"]["name"], serde_yaml::Value::from("http"));
    assert_eq!(servers[0]["hosts"][0], serde_yaml::Value::from("*"));
    assert_eq!(value["metadata"]["name"], serde_yaml::Value::from("gw1"));
    assert_eq!(value["spec"]["selector"]["app"], serde_yaml::Value::from("x"));
}

#[test]
fn tls_without_private_key_names_gateway_and_field() {
    let err = compose_fixture("tls_missing_key.yaml", FailurePolicy::FailFast).unwrap_err();
    assert_eq!(err.stage(), Stage::Validate);
    assert_eq!(err.resource(), Some("secure"));
    let json = err.to_json_value();
    assert_eq!(json["field"], "servers[0].tls.privateKey");
    assert_eq!(json["error"], "ValidationError");
}

#[test]
fn unresolved_reference_names_identifier() {
    let err = compose_fixture("unresolved.yaml", FailurePolicy::FailFast).unwrap_err();
    assert_eq!(
        err,
        ComposeError::ReferenceResolution {
            kind: "VirtualService".to_owned(),
            resource: "orphan".to_owned(),
            service: "ghost".to_owned(),
        }
    );
}

#[test]
fn continue_policy_keeps_healthy_resources() {
    let report = compose_fixture("partial.yaml", FailurePolicy::Continue).unwrap();
    let files: Vec<&str> = report.manifests.iter().map(|m| m.file_name.as_str()).collect();
    assert_eq!(files, vec!["service-web.yaml", "buildconfig-web-build.yaml"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage(), Stage::Resolve);
}

#[test]
fn build_config_labels_are_merged() {
    let report = compose_fixture("build.yaml", FailurePolicy::FailFast).unwrap();
    let text = text_of(&report, "buildconfig-storefront.yaml");
    let value: serde_yaml::Value = serde_yaml::from_str(text).unwrap();
    assert_eq!(value["metadata"]["labels"]["team"], serde_yaml::Value::from("shop"));
    assert_eq!(value["metadata"]["labels"]["app"], serde_yaml::Value::from("storefront"));
    assert_eq!(
        value["spec"]["strategy"]["sourceStrategy"]["from"]["name"],
        serde_yaml::Value::from("registry.example.com/node:20")
    );
    assert_eq!(value["spec"]["source"]["contextDir"], serde_yaml::Value::from("app"));
}

#[test]
fn import_cycle_is_a_load_error() {
    let err = compose_fixture("cycle/a.yaml", FailurePolicy::Continue).unwrap_err();
    assert_eq!(err.stage(), Stage::Load);
    assert!(err.to_string().contains("import cycle detected"), "{}", err);
}

#[test]
fn recomposition_is_byte_identical() {
    let a = compose_fixture("mesh/main.yaml", FailurePolicy::FailFast).unwrap();
    let b = compose_fixture("mesh/main.yaml", FailurePolicy::FailFast).unwrap();
    assert_eq!(a, b);
}

#[test]
fn in_memory_sources_compose_like_files() {
    let provider = InMemoryProvider::new()
        .with_file(
            "/decl/root.yaml",
            "imports: [svc.yaml]\nresources:\n  - kind: VirtualService\n    name: vs\n    http:\n      - route: [{ destination: { serviceName: svcA } }]\n",
        )
        .with_file(
            "/decl/svc.yaml",
            "resources:\n  - kind: Service\n    id: svcA\n    ports: [{ port: 80 }]\n",
        );
    let mut progress: Vec<Progress> = Vec::new();
    let report = compose_with_provider(
        Path::new("/decl/root.yaml"),
        &provider,
        &ComposeOptions::default(),
        &mut |p| progress.push(p),
    )
    .unwrap();
    assert_eq!(report.manifests.len(), 2);
    assert!(report.manifests[1].text.contains("host: svc-a"));
    assert_eq!(
        progress.iter().map(|p| p.resource.as_str()).collect::<Vec<_>>(),
        vec!["svc-a", "vs"]
    );
}

#[test]
fn compose_accepts_declarations_directly() {
    let decls = manifold_core::parse_declarations(
        "resources:\n  - kind: Service\n    name: a\n    ports: [{ port: 80 }]\n",
        "inline.yaml",
    )
    .unwrap()
    .resources;
    let report = compose(&decls, &ComposeOptions::default(), &mut |_| {}).unwrap();
    assert!(report.is_success());
    assert_eq!(report.manifests[0].file_name, "service-a.yaml");
}
