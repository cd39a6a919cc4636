//! Pass 5: Semantic validation of resolved records.
//!
//! Validation is fail-fast per record: the first violated rule is
//! returned and the record goes no further. Other records are unaffected.

use crate::error::ComposeError;
use crate::model::*;
use crate::pass4_resolve::Resolved;

/// A record that passed every rule of its kind. Immutable from here on.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    record: ResourceRecord,
}

impl Validated {
    pub fn record(&self) -> &ResourceRecord {
        &self.record
    }
}

const PORT_RANGE: std::ops::RangeInclusive<i64> = 1..=65535;
const PERCENT_RANGE: std::ops::RangeInclusive<i64> = 0..=100;
const ROUTE_TERMINATIONS: [&str; 3] = ["edge", "passthrough", "reencrypt"];

pub fn validate(resolved: Resolved) -> Result<Validated, ComposeError> {
    let record = resolved.into_record();
    let v = Violation {
        kind: record.kind(),
        resource: &record.name,
    };

    if record.name.is_empty() {
        let v = Violation {
            kind: record.kind(),
            resource: &record.id,
        };
        return Err(v.fail(
            "name",
            "must contain at least one DNS-safe character after normalization",
        ));
    }

    match &record.spec {
        ResourceSpec::Gateway(g) => validate_gateway(&v, g)?,
        ResourceSpec::VirtualService(vs) => validate_virtual_service(&v, vs)?,
        ResourceSpec::Service(s) => validate_service(&v, s)?,
        ResourceSpec::Deployment(d) => validate_deployment(&v, d)?,
        ResourceSpec::Route(r) => validate_route(&v, r)?,
        ResourceSpec::BuildConfig(b) => validate_build_config(&v, b)?,
    }

    Ok(Validated { record })
}

struct Violation<'a> {
    kind: ResourceKind,
    resource: &'a str,
}

impl Violation<'_> {
    fn fail(&self, field: &str, message: impl Into<String>) -> ComposeError {
        ComposeError::validation(self.kind.as_str(), self.resource, field, message)
    }

    fn port(&self, field: &str, number: i64) -> Result<(), ComposeError> {
        if PORT_RANGE.contains(&number) {
            Ok(())
        } else {
            Err(self.fail(
                field,
                format!("port number must be between 1 and 65535, got {}", number),
            ))
        }
    }
}

// ──────────────────────────────────────────────
// Gateway
// ──────────────────────────────────────────────

fn validate_gateway(v: &Violation<'_>, g: &GatewaySpec) -> Result<(), ComposeError> {
    if g.selector.is_empty() {
        return Err(v.fail("selector", "must not be empty"));
    }
    if g.servers.is_empty() {
        return Err(v.fail("servers", "must not be empty"));
    }
    for (i, server) in g.servers.iter().enumerate() {
        let path = format!("servers[{}]", i);
        if server.hosts.is_empty() {
            return Err(v.fail(&format!("{}.hosts", path), "must not be empty"));
        }
        v.port(&format!("{}.port.number", path), server.port.number)?;
        if let Some(tls) = &server.tls {
            validate_tls(v, &format!("{}.tls", path), tls)?;
        }
    }
    Ok(())
}

fn validate_tls(v: &Violation<'_>, path: &str, tls: &TlsOptions) -> Result<(), ComposeError> {
    let mode = tls.mode;
    let mut required: Vec<(&str, bool)> = Vec::new();
    match mode {
        TlsMode::Simple => {
            required.push(("serverCertificate", tls.server_certificate.is_some()));
            required.push(("privateKey", tls.private_key.is_some()));
        }
        TlsMode::Mutual => {
            required.push(("serverCertificate", tls.server_certificate.is_some()));
            required.push(("privateKey", tls.private_key.is_some()));
            required.push(("caCertificates", tls.ca_certificates.is_some()));
        }
        TlsMode::Passthrough | TlsMode::AutoPassthrough | TlsMode::IstioMutual => {}
    }
    for (field, present) in required {
        if !present {
            return Err(v.fail(
                &format!("{}.{}", path, field),
                format!("is required when TLS mode is {}", mode.as_str()),
            ));
        }
    }
    Ok(())
}

// ──────────────────────────────────────────────
// VirtualService
// ──────────────────────────────────────────────

fn validate_virtual_service(v: &Violation<'_>, vs: &VirtualServiceSpec) -> Result<(), ComposeError> {
    if vs.hosts.is_empty() {
        return Err(v.fail("hosts", "must not be empty"));
    }
    for (i, http) in vs.http.iter().enumerate() {
        let path = format!("http[{}]", i);
        match (http.route.is_empty(), http.redirect.is_some()) {
            (true, false) => {
                return Err(v.fail(
                    &path,
                    "one of 'route' or 'redirect' is required",
                ))
            }
            (false, true) => {
                return Err(v.fail(
                    &path,
                    "'route' and 'redirect' are mutually exclusive",
                ))
            }
            _ => {}
        }
        if http.redirect.is_some() && http.rewrite.is_some() {
            return Err(v.fail(
                &format!("{}.rewrite", path),
                "cannot be combined with 'redirect'",
            ));
        }
        for (j, dw) in http.route.iter().enumerate() {
            validate_destination(v, &format!("{}.route[{}].destination", path, j), &dw.destination)?;
        }
        if let Some(mirror) = &http.mirror {
            validate_destination(v, &format!("{}.mirror", path), mirror)?;
        }
        if let Some(retries) = &http.retries {
            if retries.attempts < 0 {
                return Err(v.fail(
                    &format!("{}.retries.attempts", path),
                    "must not be negative",
                ));
            }
        }
        if let Some(fault) = &http.fault {
            let delay_percent = fault.delay.as_ref().and_then(|d| d.percent);
            let abort_percent = fault.abort.as_ref().and_then(|a| a.percent);
            for (field, percent) in [("delay", delay_percent), ("abort", abort_percent)] {
                if let Some(p) = percent {
                    if !PERCENT_RANGE.contains(&p) {
                        return Err(v.fail(
                            &format!("{}.fault.{}.percent", path, field),
                            format!("must be between 0 and 100, got {}", p),
                        ));
                    }
                }
            }
        }
        for (j, m) in http.matches.iter().enumerate() {
            if let Some(port) = m.port {
                v.port(&format!("{}.match[{}].port", path, j), port)?;
            }
        }
    }
    Ok(())
}

fn validate_destination(
    v: &Violation<'_>,
    path: &str,
    dest: &Destination,
) -> Result<(), ComposeError> {
    if dest.host.is_none() {
        return Err(v.fail(
            &format!("{}.host", path),
            "is required (declare 'host' or a resolvable 'serviceName')",
        ));
    }
    if let Some(port) = dest.port {
        v.port(&format!("{}.port", path), port)?;
    }
    Ok(())
}

// ──────────────────────────────────────────────
// Service / Deployment
// ──────────────────────────────────────────────

fn validate_service(v: &Violation<'_>, s: &ServiceSpec) -> Result<(), ComposeError> {
    if s.ports.is_empty() {
        return Err(v.fail("ports", "must not be empty"));
    }
    for (i, p) in s.ports.iter().enumerate() {
        v.port(&format!("ports[{}].port", i), p.port)?;
        if let Some(target) = p.target_port {
            v.port(&format!("ports[{}].targetPort", i), target)?;
        }
    }
    Ok(())
}

fn validate_deployment(v: &Violation<'_>, d: &DeploymentSpec) -> Result<(), ComposeError> {
    if let Some(replicas) = d.replicas {
        if replicas < 0 {
            return Err(v.fail("replicas", "must not be negative"));
        }
    }
    if d.containers.is_empty() {
        return Err(v.fail("containers", "must not be empty"));
    }
    for (i, c) in d.containers.iter().enumerate() {
        if c.name.trim().is_empty() {
            return Err(v.fail(&format!("containers[{}].name", i), "must not be empty"));
        }
        if c.image.trim().is_empty() {
            return Err(v.fail(&format!("containers[{}].image", i), "must not be empty"));
        }
        for (j, p) in c.ports.iter().enumerate() {
            v.port(
                &format!("containers[{}].ports[{}].containerPort", i, j),
                p.container_port,
            )?;
        }
    }
    Ok(())
}

// ──────────────────────────────────────────────
// Route / BuildConfig
// ──────────────────────────────────────────────

fn validate_route(v: &Violation<'_>, r: &RouteSpec) -> Result<(), ComposeError> {
    let to = r
        .to
        .as_ref()
        .ok_or_else(|| v.fail("to", "is required"))?;
    if to.name.is_none() {
        return Err(v.fail(
            "to.name",
            "is required (declare 'name' or a resolvable 'serviceName')",
        ));
    }
    if let Some(PortRef::Number(n)) = &r.target_port {
        v.port("targetPort", *n)?;
    }
    if let Some(tls) = &r.tls {
        if !ROUTE_TERMINATIONS.contains(&tls.termination.as_str()) {
            return Err(v.fail(
                "tls.termination",
                format!(
                    "must be one of {}, got '{}'",
                    ROUTE_TERMINATIONS.join(", "),
                    tls.termination
                ),
            ));
        }
        if tls.termination != "passthrough" && tls.key.is_some() && tls.certificate.is_none() {
            return Err(v.fail(
                "tls.certificate",
                format!("is required with 'key' for {} termination", tls.termination),
            ));
        }
    }
    Ok(())
}

fn validate_build_config(v: &Violation<'_>, b: &BuildConfigSpec) -> Result<(), ComposeError> {
    let source = b
        .source
        .as_ref()
        .ok_or_else(|| v.fail("source", "is required"))?;
    if source.git_uri.trim().is_empty() {
        return Err(v.fail("source.git.uri", "must not be empty"));
    }
    if let Some(strategy) = &b.strategy {
        if strategy.strategy_type == StrategyType::Source && strategy.from.is_none() {
            return Err(v.fail("strategy.from", "is required for the Source strategy"));
        }
    }
    if b.output.is_none() {
        return Err(v.fail("output.to", "is required"));
    }
    Ok(())
}
