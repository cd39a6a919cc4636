//! Typed resource records shared by every stage after extraction.
//!
//! Optional fields are `Option`s and empty collections are simply empty;
//! there are no sentinel values past the extractor.

use std::collections::BTreeMap;
use std::fmt;

use crate::decl::Provenance;

// ──────────────────────────────────────────────
// Resource kinds
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Gateway,
    VirtualService,
    Service,
    Deployment,
    Route,
    BuildConfig,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Gateway,
        ResourceKind::VirtualService,
        ResourceKind::Service,
        ResourceKind::Deployment,
        ResourceKind::Route,
        ResourceKind::BuildConfig,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Gateway => "Gateway",
            ResourceKind::VirtualService => "VirtualService",
            ResourceKind::Service => "Service",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Route => "Route",
            ResourceKind::BuildConfig => "BuildConfig",
        }
    }

    pub fn from_name(name: &str) -> Option<ResourceKind> {
        ResourceKind::ALL.into_iter().find(|k| k.as_str() == name)
    }

    pub fn api_version(self) -> &'static str {
        match self {
            ResourceKind::Gateway | ResourceKind::VirtualService => "networking.istio.io/v1alpha3",
            ResourceKind::Service => "v1",
            ResourceKind::Deployment => "apps/v1",
            ResourceKind::Route => "route.openshift.io/v1",
            ResourceKind::BuildConfig => "build.openshift.io/v1",
        }
    }

    /// File-name prefix of rendered manifests of this kind.
    pub fn postfix(self) -> &'static str {
        match self {
            ResourceKind::Gateway => "gateway",
            ResourceKind::VirtualService => "virtualservice",
            ResourceKind::Service => "service",
            ResourceKind::Deployment => "deployment",
            ResourceKind::Route => "route",
            ResourceKind::BuildConfig => "buildconfig",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// Records
// ──────────────────────────────────────────────

/// Intermediate form of one declared resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    /// Declaration-site identifier; the registry key.
    pub id: String,
    /// DNS-safe canonical name.
    pub name: String,
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub spec: ResourceSpec,
    pub prov: Provenance,
}

impl ResourceRecord {
    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceSpec {
    Gateway(GatewaySpec),
    VirtualService(VirtualServiceSpec),
    Service(ServiceSpec),
    Deployment(DeploymentSpec),
    Route(RouteSpec),
    BuildConfig(BuildConfigSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Gateway(_) => ResourceKind::Gateway,
            ResourceSpec::VirtualService(_) => ResourceKind::VirtualService,
            ResourceSpec::Service(_) => ResourceKind::Service,
            ResourceSpec::Deployment(_) => ResourceKind::Deployment,
            ResourceSpec::Route(_) => ResourceKind::Route,
            ResourceSpec::BuildConfig(_) => ResourceKind::BuildConfig,
        }
    }
}

// ──────────────────────────────────────────────
// Gateway
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatewaySpec {
    pub selector: BTreeMap<String, String>,
    pub servers: Vec<ServerSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerSpec {
    pub port: PortSpec,
    /// Declaration order, duplicates removed
    pub hosts: Vec<String>,
    pub tls: Option<TlsOptions>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortSpec {
    pub number: i64,
    pub protocol: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    Simple,
    Mutual,
    Passthrough,
    AutoPassthrough,
    IstioMutual,
}

impl TlsMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TlsMode::Simple => "SIMPLE",
            TlsMode::Mutual => "MUTUAL",
            TlsMode::Passthrough => "PASSTHROUGH",
            TlsMode::AutoPassthrough => "AUTO_PASSTHROUGH",
            TlsMode::IstioMutual => "ISTIO_MUTUAL",
        }
    }

    pub fn from_name(name: &str) -> Option<TlsMode> {
        match name {
            "SIMPLE" => Some(TlsMode::Simple),
            "MUTUAL" => Some(TlsMode::Mutual),
            "PASSTHROUGH" => Some(TlsMode::Passthrough),
            "AUTO_PASSTHROUGH" => Some(TlsMode::AutoPassthrough),
            "ISTIO_MUTUAL" => Some(TlsMode::IstioMutual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TlsOptions {
    pub mode: TlsMode,
    pub server_certificate: Option<String>,
    pub private_key: Option<String>,
    pub ca_certificates: Option<String>,
    pub subject_alt_names: Vec<String>,
    /// Absent means `false`; kept optional so an explicit `false` still renders.
    pub https_redirect: Option<bool>,
}

// ──────────────────────────────────────────────
// VirtualService
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VirtualServiceSpec {
    pub hosts: Vec<String>,
    pub gateways: Vec<String>,
    pub http: Vec<HttpRoute>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpRoute {
    pub matches: Vec<HttpMatchRequest>,
    pub route: Vec<DestinationWeight>,
    pub redirect: Option<HttpRedirect>,
    pub rewrite: Option<HttpRewrite>,
    pub timeout: Option<String>,
    pub retries: Option<HttpRetry>,
    pub fault: Option<FaultInjection>,
    pub mirror: Option<Destination>,
    pub cors_policy: Option<CorsPolicy>,
    pub append_headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringMatch {
    Exact(String),
    Prefix(String),
    Regex(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpMatchRequest {
    pub uri: Option<StringMatch>,
    pub scheme: Option<StringMatch>,
    pub method: Option<StringMatch>,
    pub authority: Option<StringMatch>,
    pub headers: BTreeMap<String, StringMatch>,
    pub port: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DestinationWeight {
    pub destination: Destination,
    pub weight: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Destination {
    pub host: Option<String>,
    pub subset: Option<String>,
    pub port: Option<i64>,
    /// Symbolic reference to a registered Service identifier.
    pub service_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpRedirect {
    pub uri: Option<String>,
    pub authority: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpRewrite {
    pub uri: Option<String>,
    pub authority: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRetry {
    pub attempts: i64,
    pub per_try_timeout: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaultInjection {
    pub delay: Option<FaultDelay>,
    pub abort: Option<FaultAbort>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaultDelay {
    pub percent: Option<i64>,
    pub fixed_delay: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaultAbort {
    pub percent: Option<i64>,
    pub http_status: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorsPolicy {
    pub allow_origin: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub max_age: Option<String>,
    pub allow_credentials: Option<bool>,
}

// ──────────────────────────────────────────────
// Service / Deployment
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceSpec {
    pub service_type: Option<String>,
    pub selector: BTreeMap<String, String>,
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServicePort {
    pub name: Option<String>,
    pub port: i64,
    pub target_port: Option<i64>,
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentSpec {
    pub replicas: Option<i64>,
    pub selector: BTreeMap<String, String>,
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Container {
    pub name: String,
    pub image: String,
    pub image_pull_policy: Option<String>,
    pub ports: Vec<ContainerPort>,
    pub env: BTreeMap<String, String>,
    pub command: Vec<String>,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerPort {
    pub name: Option<String>,
    pub container_port: i64,
    pub protocol: Option<String>,
}

// ──────────────────────────────────────────────
// Route / BuildConfig
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteSpec {
    pub host: Option<String>,
    pub path: Option<String>,
    pub to: Option<RouteTarget>,
    pub target_port: Option<PortRef>,
    pub tls: Option<RouteTls>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteTarget {
    /// Canonical Service name; filled by the resolver from `service_name`.
    pub name: Option<String>,
    pub service_name: Option<String>,
    pub weight: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortRef {
    Number(i64),
    Name(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteTls {
    pub termination: String,
    pub certificate: Option<String>,
    pub key: Option<String>,
    pub ca_certificate: Option<String>,
    pub insecure_edge_termination_policy: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildConfigSpec {
    pub source: Option<BuildSource>,
    pub strategy: Option<BuildStrategy>,
    /// Output image stream tag
    pub output: Option<String>,
    pub triggers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildSource {
    pub git_uri: String,
    pub git_ref: Option<String>,
    pub context_dir: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyType {
    Docker,
    Source,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildStrategy {
    pub strategy_type: StrategyType,
    pub from: Option<String>,
    pub dockerfile_path: Option<String>,
}

// ──────────────────────────────────────────────
// Names
// ──────────────────────────────────────────────

const MAX_NAME_LEN: usize = 63;

/// Normalize a declared name to a DNS-safe form.
///
/// camelCase boundaries become `-`, anything outside `[a-z0-9.-]` becomes
/// `-`, runs of `-` collapse, and the result is trimmed and capped at 63
/// characters. `svcA` becomes `svc-a`.
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 4);
    let mut prev: Option<char> = None;
    for ch in raw.chars() {
        if ch.is_ascii_uppercase() {
            if matches!(prev, Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit()) {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
        } else if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '.' {
            out.push(ch);
        } else {
            out.push('-');
        }
        prev = Some(ch);
    }

    let mut collapsed = String::with_capacity(out.len());
    for ch in out.chars() {
        if ch == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(ch);
    }

    let trimmed = collapsed.trim_matches(|c| c == '-' || c == '.');
    let capped: String = trimmed.chars().take(MAX_NAME_LEN).collect();
    capped.trim_end_matches(|c| c == '-' || c == '.').to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_becomes_kebab() {
        assert_eq!(normalize_name("svcA"), "svc-a");
        assert_eq!(normalize_name("reviewsV2Service"), "reviews-v2-service");
    }

    #[test]
    fn invalid_characters_collapse() {
        assert_eq!(normalize_name("my__gateway!!"), "my-gateway");
        assert_eq!(normalize_name("-edge.gw-"), "edge.gw");
    }

    #[test]
    fn already_safe_name_is_unchanged() {
        assert_eq!(normalize_name("gw1"), "gw1");
    }

    #[test]
    fn long_names_are_capped() {
        let long = "a".repeat(80);
        assert_eq!(normalize_name(&long).len(), 63);
    }

    #[test]
    fn empty_after_normalization() {
        assert_eq!(normalize_name("___"), "");
    }

    #[test]
    fn kinds_round_trip_by_name() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(ResourceKind::from_name("Ingress"), None);
    }
}
