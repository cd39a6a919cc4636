//! Pass 1: Typed field extraction -- ordered declaration trees to typed
//! [`ResourceRecord`]s.
//!
//! Every record kind, and every nested record, owns a closed set of field
//! names expressed as an enum. Keys outside that set fail with
//! [`ComposeError::UnrecognizedField`]; nothing is passed through.
//! Declaration sentinels (`-1` for weights and ports) become `None` here
//! and never reach later passes.

use std::collections::BTreeMap;

use tracing::debug;

use crate::decl::{DeclValue, Declaration, Entry};
use crate::error::ComposeError;
use crate::model::*;

/// A record fresh out of extraction. The only way to obtain one is
/// [`extract`] / [`extract_as`].
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    record: ResourceRecord,
}

impl Extracted {
    pub fn record(&self) -> &ResourceRecord {
        &self.record
    }

    pub(crate) fn into_record(self) -> ResourceRecord {
        self.record
    }
}

/// Extract `decl` as the kind it was declared with.
pub fn extract(decl: &Declaration) -> Result<Extracted, ComposeError> {
    extract_as(decl, decl.kind)
}

/// Extract `decl` as `kind`, checking its keys against `kind`'s field set.
pub fn extract_as(decl: &Declaration, kind: ResourceKind) -> Result<Extracted, ComposeError> {
    let label = decl.label();
    let cx = Cx {
        kind,
        resource: &label,
    };

    let mut meta = Metadata::default();
    let mut rest: Vec<&Entry> = Vec::with_capacity(decl.entries.len());
    for entry in &decl.entries {
        let (key, value) = entry;
        match MetaField::from_key(key) {
            Some(field) if !matches!(value, DeclValue::Null) => {
                meta.apply(&cx, field, key, value)?
            }
            Some(_) => {}
            None => rest.push(entry),
        }
    }

    let id = decl
        .id
        .clone()
        .or_else(|| meta.raw_name.clone())
        .ok_or_else(|| cx.bad("name", "either 'name' or 'id' is required"))?;
    let raw_name = meta.raw_name.unwrap_or_else(|| id.clone());

    let spec = match kind {
        ResourceKind::Gateway => ResourceSpec::Gateway(gateway(&cx, rest)?),
        ResourceKind::VirtualService => ResourceSpec::VirtualService(virtual_service(&cx, rest)?),
        ResourceKind::Service => ResourceSpec::Service(service(&cx, rest)?),
        ResourceKind::Deployment => ResourceSpec::Deployment(deployment(&cx, rest)?),
        ResourceKind::Route => ResourceSpec::Route(route(&cx, rest)?),
        ResourceKind::BuildConfig => ResourceSpec::BuildConfig(build_config(&cx, rest)?),
    };

    let record = ResourceRecord {
        id,
        name: normalize_name(&raw_name),
        namespace: meta.namespace,
        labels: meta.labels,
        annotations: meta.annotations,
        spec,
        prov: decl.prov.clone(),
    };
    debug!(kind = %kind, id = %record.id, name = %record.name, "extracted");
    Ok(Extracted { record })
}

// ──────────────────────────────────────────────
// Field sets
// ──────────────────────────────────────────────

trait FieldSet: Sized + Copy {
    fn from_key(key: &str) -> Option<Self>;
}

macro_rules! field_set {
    ($name:ident { $($variant:ident => $key:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        enum $name {
            $($variant),+
        }

        impl FieldSet for $name {
            fn from_key(key: &str) -> Option<Self> {
                match key {
                    $($key => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

field_set!(MetaField {
    Name => "name",
    Namespace => "namespace",
    Labels => "labels",
    Annotations => "annotations",
});

field_set!(GatewayField {
    Selector => "selector",
    Servers => "servers",
});

field_set!(ServerField {
    Port => "port",
    Hosts => "hosts",
    Tls => "tls",
});

field_set!(PortField {
    Number => "number",
    Protocol => "protocol",
    Name => "name",
});

field_set!(TlsField {
    Mode => "mode",
    ServerCertificate => "serverCertificate",
    PrivateKey => "privateKey",
    CaCertificates => "caCertificates",
    SubjectAltNames => "subjectAltNames",
    HttpsRedirect => "httpsRedirect",
});

field_set!(VirtualServiceField {
    Hosts => "hosts",
    Gateways => "gateways",
    Http => "http",
});

field_set!(HttpRouteField {
    Match => "match",
    Route => "route",
    Redirect => "redirect",
    Rewrite => "rewrite",
    Timeout => "timeout",
    Retries => "retries",
    Fault => "fault",
    Mirror => "mirror",
    CorsPolicy => "corsPolicy",
    AppendHeaders => "appendHeaders",
});

field_set!(MatchField {
    Uri => "uri",
    Scheme => "scheme",
    Method => "method",
    Authority => "authority",
    Headers => "headers",
    Port => "port",
});

field_set!(StringMatchField {
    Exact => "exact",
    Prefix => "prefix",
    Regex => "regex",
});

field_set!(DestinationWeightField {
    Destination => "destination",
    Weight => "weight",
});

field_set!(DestinationField {
    Host => "host",
    Subset => "subset",
    Port => "port",
    ServiceName => "serviceName",
});

field_set!(PortSelectorField {
    Number => "number",
});

field_set!(UriAuthorityField {
    Uri => "uri",
    Authority => "authority",
});

field_set!(RetryField {
    Attempts => "attempts",
    PerTryTimeout => "perTryTimeout",
});

field_set!(FaultField {
    Delay => "delay",
    Abort => "abort",
});

field_set!(DelayField {
    Percent => "percent",
    FixedDelay => "fixedDelay",
});

field_set!(AbortField {
    Percent => "percent",
    HttpStatus => "httpStatus",
});

field_set!(CorsField {
    AllowOrigin => "allowOrigin",
    AllowMethods => "allowMethods",
    AllowHeaders => "allowHeaders",
    ExposeHeaders => "exposeHeaders",
    MaxAge => "maxAge",
    AllowCredentials => "allowCredentials",
});

field_set!(ServiceField {
    Type => "type",
    Selector => "selector",
    Ports => "ports",
});

field_set!(ServicePortField {
    Name => "name",
    Port => "port",
    TargetPort => "targetPort",
    Protocol => "protocol",
});

field_set!(DeploymentField {
    Replicas => "replicas",
    Selector => "selector",
    Containers => "containers",
});

field_set!(ContainerField {
    Name => "name",
    Image => "image",
    ImagePullPolicy => "imagePullPolicy",
    Ports => "ports",
    Env => "env",
    Command => "command",
    Args => "args",
});

field_set!(ContainerPortField {
    Name => "name",
    ContainerPort => "containerPort",
    Protocol => "protocol",
});

field_set!(RouteField {
    Host => "host",
    Path => "path",
    To => "to",
    TargetPort => "targetPort",
    Tls => "tls",
});

field_set!(RouteTargetField {
    Name => "name",
    ServiceName => "serviceName",
    Weight => "weight",
});

field_set!(RouteTlsField {
    Termination => "termination",
    Certificate => "certificate",
    Key => "key",
    CaCertificate => "caCertificate",
    InsecureEdgeTerminationPolicy => "insecureEdgeTerminationPolicy",
});

field_set!(BuildConfigField {
    Source => "source",
    Strategy => "strategy",
    Output => "output",
    Triggers => "triggers",
});

field_set!(BuildSourceField {
    Git => "git",
    ContextDir => "contextDir",
});

field_set!(GitField {
    Uri => "uri",
    Ref => "ref",
});

field_set!(StrategyField {
    Type => "type",
    From => "from",
    DockerfilePath => "dockerfilePath",
});

field_set!(OutputField {
    To => "to",
});

// ──────────────────────────────────────────────
// Extraction context and value accessors
// ──────────────────────────────────────────────

struct Cx<'a> {
    kind: ResourceKind,
    resource: &'a str,
}

impl Cx<'_> {
    fn bad(&self, path: &str, message: impl Into<String>) -> ComposeError {
        ComposeError::declaration(self.kind.as_str(), self.resource, path, message)
    }

    fn unknown(&self, path: &str) -> ComposeError {
        ComposeError::unrecognized(self.kind.as_str(), self.resource, path)
    }

    fn expected(&self, path: &str, what: &str, found: &DeclValue) -> ComposeError {
        self.bad(
            path,
            format!("expected {}, found {}", what, found.type_name()),
        )
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_owned()
    } else {
        format!("{}.{}", path, key)
    }
}

/// Classify `entries` against the closed field set `F`. Null values are
/// treated as absent and skipped.
fn fields<'v, F: FieldSet>(
    cx: &Cx<'_>,
    path: &str,
    entries: impl IntoIterator<Item = &'v Entry>,
) -> Result<Vec<(F, String, &'v DeclValue)>, ComposeError> {
    let mut out = Vec::new();
    for (key, value) in entries {
        let field_path = join(path, key);
        let field = F::from_key(key).ok_or_else(|| cx.unknown(&field_path))?;
        if !matches!(value, DeclValue::Null) {
            out.push((field, field_path, value));
        }
    }
    Ok(out)
}

fn map<'v>(cx: &Cx<'_>, path: &str, v: &'v DeclValue) -> Result<&'v [Entry], ComposeError> {
    match v {
        DeclValue::Map(entries) => Ok(entries),
        other => Err(cx.expected(path, "a mapping", other)),
    }
}

fn list<'v>(cx: &Cx<'_>, path: &str, v: &'v DeclValue) -> Result<&'v [DeclValue], ComposeError> {
    match v {
        DeclValue::List(items) => Ok(items),
        other => Err(cx.expected(path, "a list", other)),
    }
}

/// Scalars are accepted as text; YAML readily types `8080` or `true`.
fn text(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<String, ComposeError> {
    v.scalar_text()
        .ok_or_else(|| cx.expected(path, "a scalar", v))
}

fn int(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<i64, ComposeError> {
    match v {
        DeclValue::Int(i) => Ok(*i),
        DeclValue::Str(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| cx.bad(path, format!("expected an integer, found '{}'", s))),
        other => Err(cx.expected(path, "an integer", other)),
    }
}

/// An integer where `-1` means "not set".
fn optional_int(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<Option<i64>, ComposeError> {
    let i = int(cx, path, v)?;
    Ok(if i == -1 { None } else { Some(i) })
}

fn boolean(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<bool, ComposeError> {
    match v {
        DeclValue::Bool(b) => Ok(*b),
        other => Err(cx.expected(path, "a bool", other)),
    }
}

fn string_list(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<Vec<String>, ComposeError> {
    list(cx, path, v)?
        .iter()
        .enumerate()
        .map(|(i, item)| text(cx, &format!("{}[{}]", path, i), item))
        .collect()
}

/// A list with duplicates removed, first occurrence wins.
fn string_set(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<Vec<String>, ComposeError> {
    let mut out: Vec<String> = Vec::new();
    for item in string_list(cx, path, v)? {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    Ok(out)
}

fn string_map(
    cx: &Cx<'_>,
    path: &str,
    v: &DeclValue,
) -> Result<BTreeMap<String, String>, ComposeError> {
    let mut out = BTreeMap::new();
    for (key, value) in map(cx, path, v)? {
        if matches!(value, DeclValue::Null) {
            continue;
        }
        out.insert(key.clone(), text(cx, &join(path, key), value)?);
    }
    Ok(out)
}

fn required<T>(cx: &Cx<'_>, path: &str, key: &str, v: Option<T>) -> Result<T, ComposeError> {
    v.ok_or_else(|| cx.bad(&join(path, key), "required field is missing"))
}

fn items<'v>(
    cx: &Cx<'_>,
    path: &str,
    v: &'v DeclValue,
) -> Result<impl Iterator<Item = (String, &'v DeclValue)>, ComposeError> {
    let owned = path.to_owned();
    Ok(list(cx, path, v)?
        .iter()
        .enumerate()
        .map(move |(i, item)| (format!("{}[{}]", owned, i), item)))
}

// ──────────────────────────────────────────────
// Metadata
// ──────────────────────────────────────────────

#[derive(Default)]
struct Metadata {
    raw_name: Option<String>,
    namespace: Option<String>,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
}

impl Metadata {
    fn apply(
        &mut self,
        cx: &Cx<'_>,
        field: MetaField,
        key: &str,
        value: &DeclValue,
    ) -> Result<(), ComposeError> {
        match field {
            MetaField::Name => self.raw_name = Some(text(cx, key, value)?),
            MetaField::Namespace => self.namespace = Some(text(cx, key, value)?),
            MetaField::Labels => self.labels = string_map(cx, key, value)?,
            MetaField::Annotations => self.annotations = string_map(cx, key, value)?,
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Gateway
// ──────────────────────────────────────────────

fn gateway(cx: &Cx<'_>, entries: Vec<&Entry>) -> Result<GatewaySpec, ComposeError> {
    let mut spec = GatewaySpec::default();
    for (field, path, value) in fields::<GatewayField>(cx, "", entries)? {
        match field {
            GatewayField::Selector => spec.selector = string_map(cx, &path, value)?,
            GatewayField::Servers => {
                for (item_path, item) in items(cx, &path, value)? {
                    spec.servers.push(server(cx, &item_path, item)?);
                }
            }
        }
    }
    Ok(spec)
}

fn server(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<ServerSpec, ComposeError> {
    let mut port = None;
    let mut hosts = Vec::new();
    let mut tls = None;
    for (field, fpath, value) in fields::<ServerField>(cx, path, map(cx, path, v)?)? {
        match field {
            ServerField::Port => port = Some(port_spec(cx, &fpath, value)?),
            ServerField::Hosts => hosts = string_set(cx, &fpath, value)?,
            ServerField::Tls => tls = Some(tls_options(cx, &fpath, value)?),
        }
    }
    Ok(ServerSpec {
        port: required(cx, path, "port", port)?,
        hosts,
        tls,
    })
}

fn port_spec(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<PortSpec, ComposeError> {
    let mut number = None;
    let mut protocol = None;
    let mut name = None;
    for (field, fpath, value) in fields::<PortField>(cx, path, map(cx, path, v)?)? {
        match field {
            PortField::Number => number = Some(int(cx, &fpath, value)?),
            PortField::Protocol => protocol = Some(text(cx, &fpath, value)?),
            PortField::Name => name = Some(text(cx, &fpath, value)?),
        }
    }
    Ok(PortSpec {
        number: required(cx, path, "number", number)?,
        protocol: required(cx, path, "protocol", protocol)?,
        name,
    })
}

fn tls_options(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<TlsOptions, ComposeError> {
    let mut mode = None;
    let mut server_certificate = None;
    let mut private_key = None;
    let mut ca_certificates = None;
    let mut subject_alt_names = Vec::new();
    let mut https_redirect = None;
    for (field, fpath, value) in fields::<TlsField>(cx, path, map(cx, path, v)?)? {
        match field {
            TlsField::Mode => {
                let raw = text(cx, &fpath, value)?;
                let parsed = TlsMode::from_name(&raw)
                    .ok_or_else(|| cx.bad(&fpath, format!("unknown TLS mode '{}'", raw)))?;
                mode = Some(parsed);
            }
            TlsField::ServerCertificate => server_certificate = Some(text(cx, &fpath, value)?),
            TlsField::PrivateKey => private_key = Some(text(cx, &fpath, value)?),
            TlsField::CaCertificates => ca_certificates = Some(text(cx, &fpath, value)?),
            TlsField::SubjectAltNames => subject_alt_names = string_set(cx, &fpath, value)?,
            TlsField::HttpsRedirect => https_redirect = Some(boolean(cx, &fpath, value)?),
        }
    }
    Ok(TlsOptions {
        mode: required(cx, path, "mode", mode)?,
        server_certificate,
        private_key,
        ca_certificates,
        subject_alt_names,
        https_redirect,
    })
}

// ──────────────────────────────────────────────
// VirtualService
// ──────────────────────────────────────────────

fn virtual_service(cx: &Cx<'_>, entries: Vec<&Entry>) -> Result<VirtualServiceSpec, ComposeError> {
    let mut spec = VirtualServiceSpec::default();
    for (field, path, value) in fields::<VirtualServiceField>(cx, "", entries)? {
        match field {
            VirtualServiceField::Hosts => spec.hosts = string_set(cx, &path, value)?,
            VirtualServiceField::Gateways => spec.gateways = string_set(cx, &path, value)?,
            VirtualServiceField::Http => {
                for (item_path, item) in items(cx, &path, value)? {
                    spec.http.push(http_route(cx, &item_path, item)?);
                }
            }
        }
    }
    Ok(spec)
}

fn http_route(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<HttpRoute, ComposeError> {
    let mut r = HttpRoute::default();
    for (field, fpath, value) in fields::<HttpRouteField>(cx, path, map(cx, path, v)?)? {
        match field {
            HttpRouteField::Match => {
                for (item_path, item) in items(cx, &fpath, value)? {
                    r.matches.push(match_request(cx, &item_path, item)?);
                }
            }
            HttpRouteField::Route => {
                for (item_path, item) in items(cx, &fpath, value)? {
                    r.route.push(destination_weight(cx, &item_path, item)?);
                }
            }
            HttpRouteField::Redirect => {
                let (uri, authority) = uri_authority(cx, &fpath, value)?;
                r.redirect = Some(HttpRedirect { uri, authority });
            }
            HttpRouteField::Rewrite => {
                let (uri, authority) = uri_authority(cx, &fpath, value)?;
                r.rewrite = Some(HttpRewrite { uri, authority });
            }
            HttpRouteField::Timeout => r.timeout = Some(text(cx, &fpath, value)?),
            HttpRouteField::Retries => r.retries = Some(retries(cx, &fpath, value)?),
            HttpRouteField::Fault => r.fault = Some(fault(cx, &fpath, value)?),
            HttpRouteField::Mirror => r.mirror = Some(destination(cx, &fpath, value)?),
            HttpRouteField::CorsPolicy => r.cors_policy = Some(cors(cx, &fpath, value)?),
            HttpRouteField::AppendHeaders => r.append_headers = string_map(cx, &fpath, value)?,
        }
    }
    Ok(r)
}

fn match_request(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<HttpMatchRequest, ComposeError> {
    let mut m = HttpMatchRequest::default();
    for (field, fpath, value) in fields::<MatchField>(cx, path, map(cx, path, v)?)? {
        match field {
            MatchField::Uri => m.uri = Some(string_match(cx, &fpath, value)?),
            MatchField::Scheme => m.scheme = Some(string_match(cx, &fpath, value)?),
            MatchField::Method => m.method = Some(string_match(cx, &fpath, value)?),
            MatchField::Authority => m.authority = Some(string_match(cx, &fpath, value)?),
            MatchField::Headers => {
                for (name, header) in map(cx, &fpath, value)? {
                    let hpath = join(&fpath, name);
                    m.headers
                        .insert(name.clone(), string_match(cx, &hpath, header)?);
                }
            }
            MatchField::Port => m.port = optional_int(cx, &fpath, value)?,
        }
    }
    Ok(m)
}

fn string_match(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<StringMatch, ComposeError> {
    let found = fields::<StringMatchField>(cx, path, map(cx, path, v)?)?;
    if found.len() != 1 {
        return Err(cx.bad(
            path,
            "exactly one of 'exact', 'prefix' or 'regex' is required",
        ));
    }
    let (field, fpath, value) = &found[0];
    let s = text(cx, fpath, value)?;
    Ok(match field {
        StringMatchField::Exact => StringMatch::Exact(s),
        StringMatchField::Prefix => StringMatch::Prefix(s),
        StringMatchField::Regex => StringMatch::Regex(s),
    })
}

fn destination_weight(
    cx: &Cx<'_>,
    path: &str,
    v: &DeclValue,
) -> Result<DestinationWeight, ComposeError> {
    let mut dest = None;
    let mut weight = None;
    for (field, fpath, value) in fields::<DestinationWeightField>(cx, path, map(cx, path, v)?)? {
        match field {
            DestinationWeightField::Destination => dest = Some(destination(cx, &fpath, value)?),
            DestinationWeightField::Weight => weight = optional_int(cx, &fpath, value)?,
        }
    }
    Ok(DestinationWeight {
        destination: required(cx, path, "destination", dest)?,
        weight,
    })
}

fn destination(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<Destination, ComposeError> {
    let mut d = Destination::default();
    for (field, fpath, value) in fields::<DestinationField>(cx, path, map(cx, path, v)?)? {
        match field {
            DestinationField::Host => d.host = Some(text(cx, &fpath, value)?),
            DestinationField::Subset => d.subset = Some(text(cx, &fpath, value)?),
            DestinationField::ServiceName => d.service_name = Some(text(cx, &fpath, value)?),
            DestinationField::Port => {
                // `port: 9080` and `port: { number: 9080 }` are both accepted.
                d.port = match value {
                    DeclValue::Map(entries) => {
                        let mut number = None;
                        for (_, npath, nvalue) in
                            fields::<PortSelectorField>(cx, &fpath, entries)?
                        {
                            number = optional_int(cx, &npath, nvalue)?;
                        }
                        number
                    }
                    other => optional_int(cx, &fpath, other)?,
                };
            }
        }
    }
    Ok(d)
}

fn uri_authority(
    cx: &Cx<'_>,
    path: &str,
    v: &DeclValue,
) -> Result<(Option<String>, Option<String>), ComposeError> {
    let mut uri = None;
    let mut authority = None;
    for (field, fpath, value) in fields::<UriAuthorityField>(cx, path, map(cx, path, v)?)? {
        match field {
            UriAuthorityField::Uri => uri = Some(text(cx, &fpath, value)?),
            UriAuthorityField::Authority => authority = Some(text(cx, &fpath, value)?),
        }
    }
    Ok((uri, authority))
}

fn retries(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<HttpRetry, ComposeError> {
    let mut attempts = None;
    let mut per_try_timeout = None;
    for (field, fpath, value) in fields::<RetryField>(cx, path, map(cx, path, v)?)? {
        match field {
            RetryField::Attempts => attempts = Some(int(cx, &fpath, value)?),
            RetryField::PerTryTimeout => per_try_timeout = Some(text(cx, &fpath, value)?),
        }
    }
    Ok(HttpRetry {
        attempts: required(cx, path, "attempts", attempts)?,
        per_try_timeout,
    })
}

fn fault(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<FaultInjection, ComposeError> {
    let mut f = FaultInjection::default();
    for (field, fpath, value) in fields::<FaultField>(cx, path, map(cx, path, v)?)? {
        match field {
            FaultField::Delay => {
                let mut percent = None;
                let mut fixed_delay = None;
                for (df, dpath, dv) in fields::<DelayField>(cx, &fpath, map(cx, &fpath, value)?)? {
                    match df {
                        DelayField::Percent => percent = optional_int(cx, &dpath, dv)?,
                        DelayField::FixedDelay => fixed_delay = Some(text(cx, &dpath, dv)?),
                    }
                }
                f.delay = Some(FaultDelay {
                    percent,
                    fixed_delay: required(cx, &fpath, "fixedDelay", fixed_delay)?,
                });
            }
            FaultField::Abort => {
                let mut percent = None;
                let mut http_status = None;
                for (af, apath, av) in fields::<AbortField>(cx, &fpath, map(cx, &fpath, value)?)? {
                    match af {
                        AbortField::Percent => percent = optional_int(cx, &apath, av)?,
                        AbortField::HttpStatus => http_status = Some(int(cx, &apath, av)?),
                    }
                }
                f.abort = Some(FaultAbort {
                    percent,
                    http_status: required(cx, &fpath, "httpStatus", http_status)?,
                });
            }
        }
    }
    Ok(f)
}

fn cors(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<CorsPolicy, ComposeError> {
    let mut c = CorsPolicy::default();
    for (field, fpath, value) in fields::<CorsField>(cx, path, map(cx, path, v)?)? {
        match field {
            CorsField::AllowOrigin => c.allow_origin = string_list(cx, &fpath, value)?,
            CorsField::AllowMethods => c.allow_methods = string_list(cx, &fpath, value)?,
            CorsField::AllowHeaders => c.allow_headers = string_list(cx, &fpath, value)?,
            CorsField::ExposeHeaders => c.expose_headers = string_list(cx, &fpath, value)?,
            CorsField::MaxAge => c.max_age = Some(text(cx, &fpath, value)?),
            CorsField::AllowCredentials => c.allow_credentials = Some(boolean(cx, &fpath, value)?),
        }
    }
    Ok(c)
}

// ──────────────────────────────────────────────
// Service / Deployment
// ──────────────────────────────────────────────

fn service(cx: &Cx<'_>, entries: Vec<&Entry>) -> Result<ServiceSpec, ComposeError> {
    let mut spec = ServiceSpec::default();
    for (field, path, value) in fields::<ServiceField>(cx, "", entries)? {
        match field {
            ServiceField::Type => spec.service_type = Some(text(cx, &path, value)?),
            ServiceField::Selector => spec.selector = string_map(cx, &path, value)?,
            ServiceField::Ports => {
                for (item_path, item) in items(cx, &path, value)? {
                    spec.ports.push(service_port(cx, &item_path, item)?);
                }
            }
        }
    }
    Ok(spec)
}

fn service_port(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<ServicePort, ComposeError> {
    let mut name = None;
    let mut port = None;
    let mut target_port = None;
    let mut protocol = None;
    for (field, fpath, value) in fields::<ServicePortField>(cx, path, map(cx, path, v)?)? {
        match field {
            ServicePortField::Name => name = Some(text(cx, &fpath, value)?),
            ServicePortField::Port => port = Some(int(cx, &fpath, value)?),
            ServicePortField::TargetPort => target_port = optional_int(cx, &fpath, value)?,
            ServicePortField::Protocol => protocol = Some(text(cx, &fpath, value)?),
        }
    }
    Ok(ServicePort {
        name,
        port: required(cx, path, "port", port)?,
        target_port,
        protocol,
    })
}

fn deployment(cx: &Cx<'_>, entries: Vec<&Entry>) -> Result<DeploymentSpec, ComposeError> {
    let mut spec = DeploymentSpec::default();
    for (field, path, value) in fields::<DeploymentField>(cx, "", entries)? {
        match field {
            DeploymentField::Replicas => spec.replicas = Some(int(cx, &path, value)?),
            DeploymentField::Selector => spec.selector = string_map(cx, &path, value)?,
            DeploymentField::Containers => {
                for (item_path, item) in items(cx, &path, value)? {
                    spec.containers.push(container(cx, &item_path, item)?);
                }
            }
        }
    }
    Ok(spec)
}

fn container(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<Container, ComposeError> {
    let mut c = Container::default();
    let mut name = None;
    let mut image = None;
    for (field, fpath, value) in fields::<ContainerField>(cx, path, map(cx, path, v)?)? {
        match field {
            ContainerField::Name => name = Some(text(cx, &fpath, value)?),
            ContainerField::Image => image = Some(text(cx, &fpath, value)?),
            ContainerField::ImagePullPolicy => c.image_pull_policy = Some(text(cx, &fpath, value)?),
            ContainerField::Ports => {
                for (item_path, item) in items(cx, &fpath, value)? {
                    c.ports.push(container_port(cx, &item_path, item)?);
                }
            }
            ContainerField::Env => c.env = string_map(cx, &fpath, value)?,
            ContainerField::Command => c.command = string_list(cx, &fpath, value)?,
            ContainerField::Args => c.args = string_list(cx, &fpath, value)?,
        }
    }
    c.name = required(cx, path, "name", name)?;
    c.image = required(cx, path, "image", image)?;
    Ok(c)
}

fn container_port(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<ContainerPort, ComposeError> {
    let mut name = None;
    let mut container_port = None;
    let mut protocol = None;
    for (field, fpath, value) in fields::<ContainerPortField>(cx, path, map(cx, path, v)?)? {
        match field {
            ContainerPortField::Name => name = Some(text(cx, &fpath, value)?),
            ContainerPortField::ContainerPort => container_port = Some(int(cx, &fpath, value)?),
            ContainerPortField::Protocol => protocol = Some(text(cx, &fpath, value)?),
        }
    }
    Ok(ContainerPort {
        name,
        container_port: required(cx, path, "containerPort", container_port)?,
        protocol,
    })
}

// ──────────────────────────────────────────────
// Route / BuildConfig
// ──────────────────────────────────────────────

fn route(cx: &Cx<'_>, entries: Vec<&Entry>) -> Result<RouteSpec, ComposeError> {
    let mut spec = RouteSpec::default();
    for (field, path, value) in fields::<RouteField>(cx, "", entries)? {
        match field {
            RouteField::Host => spec.host = Some(text(cx, &path, value)?),
            RouteField::Path => spec.path = Some(text(cx, &path, value)?),
            RouteField::To => spec.to = Some(route_target(cx, &path, value)?),
            RouteField::TargetPort => {
                spec.target_port = Some(match value {
                    DeclValue::Int(i) => PortRef::Number(*i),
                    other => PortRef::Name(text(cx, &path, other)?),
                })
            }
            RouteField::Tls => spec.tls = Some(route_tls(cx, &path, value)?),
        }
    }
    Ok(spec)
}

fn route_target(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<RouteTarget, ComposeError> {
    let mut t = RouteTarget::default();
    for (field, fpath, value) in fields::<RouteTargetField>(cx, path, map(cx, path, v)?)? {
        match field {
            RouteTargetField::Name => t.name = Some(text(cx, &fpath, value)?),
            RouteTargetField::ServiceName => t.service_name = Some(text(cx, &fpath, value)?),
            RouteTargetField::Weight => t.weight = optional_int(cx, &fpath, value)?,
        }
    }
    Ok(t)
}

fn route_tls(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<RouteTls, ComposeError> {
    let mut t = RouteTls::default();
    let mut termination = None;
    for (field, fpath, value) in fields::<RouteTlsField>(cx, path, map(cx, path, v)?)? {
        match field {
            RouteTlsField::Termination => termination = Some(text(cx, &fpath, value)?),
            RouteTlsField::Certificate => t.certificate = Some(text(cx, &fpath, value)?),
            RouteTlsField::Key => t.key = Some(text(cx, &fpath, value)?),
            RouteTlsField::CaCertificate => t.ca_certificate = Some(text(cx, &fpath, value)?),
            RouteTlsField::InsecureEdgeTerminationPolicy => {
                t.insecure_edge_termination_policy = Some(text(cx, &fpath, value)?)
            }
        }
    }
    t.termination = required(cx, path, "termination", termination)?;
    Ok(t)
}

fn build_config(cx: &Cx<'_>, entries: Vec<&Entry>) -> Result<BuildConfigSpec, ComposeError> {
    let mut spec = BuildConfigSpec::default();
    for (field, path, value) in fields::<BuildConfigField>(cx, "", entries)? {
        match field {
            BuildConfigField::Source => spec.source = Some(build_source(cx, &path, value)?),
            BuildConfigField::Strategy => spec.strategy = Some(strategy(cx, &path, value)?),
            BuildConfigField::Output => {
                let mut to = None;
                for (_, opath, ov) in fields::<OutputField>(cx, &path, map(cx, &path, value)?)? {
                    to = Some(text(cx, &opath, ov)?);
                }
                spec.output = to;
            }
            BuildConfigField::Triggers => spec.triggers = string_set(cx, &path, value)?,
        }
    }
    Ok(spec)
}

fn build_source(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<BuildSource, ComposeError> {
    let mut s = BuildSource::default();
    let mut uri = None;
    for (field, fpath, value) in fields::<BuildSourceField>(cx, path, map(cx, path, v)?)? {
        match field {
            BuildSourceField::Git => {
                for (gf, gpath, gv) in fields::<GitField>(cx, &fpath, map(cx, &fpath, value)?)? {
                    match gf {
                        GitField::Uri => uri = Some(text(cx, &gpath, gv)?),
                        GitField::Ref => s.git_ref = Some(text(cx, &gpath, gv)?),
                    }
                }
            }
            BuildSourceField::ContextDir => s.context_dir = Some(text(cx, &fpath, value)?),
        }
    }
    s.git_uri = required(cx, path, "git.uri", uri)?;
    Ok(s)
}

fn strategy(cx: &Cx<'_>, path: &str, v: &DeclValue) -> Result<BuildStrategy, ComposeError> {
    let mut strategy_type = None;
    let mut from = None;
    let mut dockerfile_path = None;
    for (field, fpath, value) in fields::<StrategyField>(cx, path, map(cx, path, v)?)? {
        match field {
            StrategyField::Type => {
                let raw = text(cx, &fpath, value)?;
                strategy_type = Some(match raw.as_str() {
                    "Docker" => StrategyType::Docker,
                    "Source" => StrategyType::Source,
                    _ => {
                        return Err(cx.bad(
                            &fpath,
                            format!("unknown build strategy '{}' (expected Docker or Source)", raw),
                        ))
                    }
                });
            }
            StrategyField::From => from = Some(text(cx, &fpath, value)?),
            StrategyField::DockerfilePath => dockerfile_path = Some(text(cx, &fpath, value)?),
        }
    }
    Ok(BuildStrategy {
        strategy_type: required(cx, path, "type", strategy_type)?,
        from,
        dockerfile_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass0_load::parse_declarations;

    fn one(yaml: &str) -> Declaration {
        let mut f = parse_declarations(yaml, "test.yaml").unwrap();
        assert_eq!(f.resources.len(), 1);
        f.resources.remove(0)
    }

    fn record(yaml: &str) -> ResourceRecord {
        extract(&one(yaml)).unwrap().into_record()
    }

    #[test]
    fn gateway_fields_are_typed() {
        let r = record(
            r#"
resources:
  - kind: Gateway
    name: gw1
    namespace: mesh
    selector: { app: x }
    servers:
      - port: { number: 443, protocol: HTTPS, name: https }
        hosts: ["a.example.com", "a.example.com", "b.example.com"]
        tls:
          mode: SIMPLE
          serverCertificate: /etc/cert.pem
          privateKey: /etc/key.pem
"#,
        );
        assert_eq!(r.name, "gw1");
        assert_eq!(r.id, "gw1");
        assert_eq!(r.namespace.as_deref(), Some("mesh"));
        let ResourceSpec::Gateway(g) = r.spec else {
            panic!("expected gateway");
        };
        assert_eq!(g.selector.get("app").map(String::as_str), Some("x"));
        assert_eq!(g.servers.len(), 1);
        let s = &g.servers[0];
        assert_eq!(s.port.number, 443);
        assert_eq!(s.hosts, vec!["a.example.com", "b.example.com"]);
        let tls = s.tls.as_ref().unwrap();
        assert_eq!(tls.mode, TlsMode::Simple);
        assert_eq!(tls.private_key.as_deref(), Some("/etc/key.pem"));
        assert_eq!(tls.https_redirect, None);
    }

    #[test]
    fn unknown_top_level_key_names_kind_and_key() {
        let d = one("resources:\n  - kind: Gateway\n    name: gw1\n    serverz: []\n");
        let err = extract(&d).unwrap_err();
        assert_eq!(
            err,
            ComposeError::unrecognized("Gateway", "gw1", "serverz")
        );
    }

    #[test]
    fn unknown_nested_key_reports_full_path() {
        let d = one(
            r#"
resources:
  - kind: Gateway
    name: gw1
    servers:
      - port: { number: 80, protocol: HTTP }
        hosts: ["*"]
        tls: { mode: SIMPLE, cert: x }
"#,
        );
        let err = extract(&d).unwrap_err();
        assert_eq!(
            err,
            ComposeError::unrecognized("Gateway", "gw1", "servers[0].tls.cert")
        );
    }

    #[test]
    fn extract_as_checks_against_target_kind() {
        let d = one("resources:\n  - kind: Gateway\n    name: gw1\n    servers: []\n");
        let err = extract_as(&d, ResourceKind::Service).unwrap_err();
        assert_eq!(err, ComposeError::unrecognized("Service", "gw1", "servers"));
    }

    #[test]
    fn sentinels_become_absent() {
        let r = record(
            r#"
resources:
  - kind: VirtualService
    name: reviews
    http:
      - route:
          - destination: { host: reviews, port: -1 }
            weight: -1
          - destination: { host: ratings, port: { number: 9080 } }
            weight: 20
"#,
        );
        let ResourceSpec::VirtualService(vs) = r.spec else {
            panic!("expected virtual service");
        };
        let route = &vs.http[0].route;
        assert_eq!(route[0].weight, None);
        assert_eq!(route[0].destination.port, None);
        assert_eq!(route[1].weight, Some(20));
        assert_eq!(route[1].destination.port, Some(9080));
    }

    #[test]
    fn service_name_reference_is_kept_for_resolution() {
        let r = record(
            r#"
resources:
  - kind: VirtualService
    name: reviews
    http:
      - route:
          - destination: { serviceName: svcA }
"#,
        );
        let ResourceSpec::VirtualService(vs) = r.spec else {
            panic!("expected virtual service");
        };
        let d = &vs.http[0].route[0].destination;
        assert_eq!(d.host, None);
        assert_eq!(d.service_name.as_deref(), Some("svcA"));
    }

    #[test]
    fn name_defaults_to_normalized_id() {
        let r = record("resources:\n  - kind: Service\n    id: svcA\n    ports: [{ port: 80 }]\n");
        assert_eq!(r.id, "svcA");
        assert_eq!(r.name, "svc-a");
    }

    #[test]
    fn missing_name_and_id_is_a_declaration_error() {
        let d = one("resources:\n  - kind: Service\n    ports: [{ port: 80 }]\n");
        let err = extract(&d).unwrap_err();
        assert!(matches!(err, ComposeError::Declaration { ref field, .. } if field == "name"));
    }

    #[test]
    fn wrong_shape_is_a_declaration_error() {
        let d = one("resources:\n  - kind: Gateway\n    name: gw1\n    servers: nope\n");
        let err = extract(&d).unwrap_err();
        assert_eq!(
            err,
            ComposeError::declaration("Gateway", "gw1", "servers", "expected a list, found string")
        );
    }

    #[test]
    fn missing_port_number_is_reported() {
        let d = one(
            "resources:\n  - kind: Gateway\n    name: gw1\n    servers:\n      - port: { protocol: HTTP }\n",
        );
        let err = extract(&d).unwrap_err();
        assert!(
            matches!(err, ComposeError::Declaration { ref field, .. } if field == "servers[0].port.number"),
            "{err}"
        );
    }

    #[test]
    fn string_match_needs_exactly_one_kind() {
        let d = one(
            r#"
resources:
  - kind: VirtualService
    name: vs
    http:
      - match: [{ uri: { exact: /a, prefix: /b } }]
        route: [{ destination: { host: a } }]
"#,
        );
        let err = extract(&d).unwrap_err();
        assert!(err.to_string().contains("exactly one"), "{err}");
    }

    #[test]
    fn null_values_are_absent() {
        let r = record(
            "resources:\n  - kind: Service\n    name: a\n    namespace: ~\n    ports: [{ port: 80, targetPort: ~ }]\n",
        );
        assert_eq!(r.namespace, None);
        let ResourceSpec::Service(s) = r.spec else {
            panic!("expected service");
        };
        assert_eq!(s.ports[0].target_port, None);
    }

    #[test]
    fn route_target_port_accepts_number_or_name() {
        let r = record(
            "resources:\n  - kind: Route\n    name: web\n    to: { serviceName: web }\n    targetPort: http\n",
        );
        let ResourceSpec::Route(route) = r.spec else {
            panic!("expected route");
        };
        assert_eq!(route.target_port, Some(PortRef::Name("http".to_owned())));
    }

    #[test]
    fn build_config_strategy_is_closed() {
        let d = one(
            r#"
resources:
  - kind: BuildConfig
    name: app
    source: { git: { uri: "https://example.com/app.git" } }
    strategy: { type: Custom }
"#,
        );
        let err = extract(&d).unwrap_err();
        assert!(err.to_string().contains("unknown build strategy 'Custom'"), "{err}");
    }

    #[test]
    fn unknown_tls_mode_is_rejected() {
        let d = one(
            "resources:\n  - kind: Gateway\n    name: g\n    servers:\n      - port: { number: 443, protocol: HTTPS }\n        tls: { mode: STRICT }\n",
        );
        let err = extract(&d).unwrap_err();
        assert!(err.to_string().contains("unknown TLS mode 'STRICT'"), "{err}");
    }

    #[test]
    fn tls_without_mode_is_rejected() {
        let d = one(
            "resources:\n  - kind: Gateway\n    name: g\n    servers:\n      - port: { number: 443, protocol: HTTPS }\n        hosts: [\"*\"]\n        tls: { privateKey: /k.pem }\n",
        );
        let err = extract(&d).unwrap_err();
        assert_eq!(
            err,
            ComposeError::declaration(
                "Gateway",
                "g",
                "servers[0].tls.mode",
                "required field is missing"
            )
        );
    }
}
