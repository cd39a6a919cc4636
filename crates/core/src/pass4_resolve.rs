//! Pass 4: Cross-model resolution -- symbolic `serviceName` references to
//! canonical Service names.
//!
//! Each reference resolves on its own against the same registry; resolving
//! one record never triggers resolution of another. An explicit `host`
//! (or Route `to.name`) always wins and its reference is not looked up.

use tracing::debug;

use crate::error::ComposeError;
use crate::model::{Destination, ResourceKind, ResourceRecord, ResourceSpec};
use crate::pass2_registry::Registry;
use crate::pass3_defaults::Defaulted;

/// A record whose references all point at registered Services.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    record: ResourceRecord,
}

impl Resolved {
    pub fn record(&self) -> &ResourceRecord {
        &self.record
    }

    pub(crate) fn into_record(self) -> ResourceRecord {
        self.record
    }
}

pub fn resolve(defaulted: Defaulted, registry: &Registry) -> Result<Resolved, ComposeError> {
    let mut record = defaulted.into_record();
    let kind = record.kind();
    let name = record.name.clone();

    match &mut record.spec {
        ResourceSpec::VirtualService(vs) => {
            for http in &mut vs.http {
                for dw in &mut http.route {
                    resolve_destination(&mut dw.destination, registry, kind, &name)?;
                }
                if let Some(mirror) = &mut http.mirror {
                    resolve_destination(mirror, registry, kind, &name)?;
                }
            }
        }
        ResourceSpec::Route(route) => {
            if let Some(to) = &mut route.to {
                if to.name.is_none() {
                    if let Some(reference) = &to.service_name {
                        to.name = Some(service_name(registry, kind, &name, reference)?);
                    }
                }
            }
        }
        _ => {}
    }

    Ok(Resolved { record })
}

fn resolve_destination(
    dest: &mut Destination,
    registry: &Registry,
    kind: ResourceKind,
    resource: &str,
) -> Result<(), ComposeError> {
    if dest.host.is_some() {
        return Ok(());
    }
    if let Some(reference) = &dest.service_name {
        dest.host = Some(service_name(registry, kind, resource, reference)?);
    }
    Ok(())
}

fn service_name(
    registry: &Registry,
    kind: ResourceKind,
    resource: &str,
    reference: &str,
) -> Result<String, ComposeError> {
    let service = registry
        .lookup(ResourceKind::Service, reference)
        .map_err(|_| ComposeError::unresolved(kind.as_str(), resource, reference))?;
    debug!(resource, reference, host = %service.name, "resolved service reference");
    Ok(service.name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass0_load::parse_declarations;
    use crate::pass1_extract::extract;
    use crate::pass3_defaults::apply_defaults;

    fn setup(yaml: &str) -> (Registry, Vec<Defaulted>) {
        let f = parse_declarations(yaml, "t.yaml").unwrap();
        let mut registry = Registry::new();
        let mut out = Vec::new();
        for d in &f.resources {
            let e = extract(d).unwrap();
            registry.register(e.record().id.clone(), e.record().clone());
            out.push(apply_defaults(e, None));
        }
        (registry, out)
    }

    const MESH: &str = r#"
resources:
  - kind: Service
    id: svcA
    ports: [{ port: 9080 }]
  - kind: VirtualService
    name: reviews
    http:
      - route:
          - destination: { serviceName: svcA }
          - destination: { host: explicit.local, serviceName: ghost }
        mirror: { serviceName: svcA, subset: v2 }
"#;

    #[test]
    fn service_reference_resolves_to_canonical_name() {
        let (registry, mut records) = setup(MESH);
        let vs = records.remove(1);
        let resolved = resolve(vs, &registry).unwrap();
        let ResourceSpec::VirtualService(spec) = &resolved.record().spec else {
            panic!("expected virtual service");
        };
        let http = &spec.http[0];
        assert_eq!(http.route[0].destination.host.as_deref(), Some("svc-a"));
        assert_eq!(http.mirror.as_ref().unwrap().host.as_deref(), Some("svc-a"));
    }

    #[test]
    fn explicit_host_is_not_looked_up() {
        let (registry, mut records) = setup(MESH);
        let resolved = resolve(records.remove(1), &registry).unwrap();
        let ResourceSpec::VirtualService(spec) = &resolved.record().spec else {
            panic!("expected virtual service");
        };
        assert_eq!(
            spec.http[0].route[1].destination.host.as_deref(),
            Some("explicit.local")
        );
    }

    #[test]
    fn unregistered_reference_names_the_identifier() {
        let (registry, mut records) = setup(
            "resources:\n  - kind: VirtualService\n    name: reviews\n    http:\n      - route: [{ destination: { serviceName: ghost } }]\n",
        );
        let err = resolve(records.remove(0), &registry).unwrap_err();
        assert_eq!(
            err,
            ComposeError::unresolved("VirtualService", "reviews", "ghost")
        );
    }

    #[test]
    fn reference_to_non_service_does_not_resolve() {
        let (registry, mut records) = setup(
            "resources:\n  - kind: Deployment\n    id: svcA\n    containers: [{ name: a, image: a }]\n  - kind: VirtualService\n    name: vs\n    http:\n      - route: [{ destination: { serviceName: svcA } }]\n",
        );
        let err = resolve(records.remove(1), &registry).unwrap_err();
        assert!(matches!(err, ComposeError::ReferenceResolution { ref service, .. } if service == "svcA"));
    }

    #[test]
    fn route_target_resolves() {
        let (registry, mut records) = setup(
            "resources:\n  - kind: Service\n    id: frontendSvc\n    ports: [{ port: 80 }]\n  - kind: Route\n    name: web\n    to: { serviceName: frontendSvc, weight: 100 }\n",
        );
        let resolved = resolve(records.remove(1), &registry).unwrap();
        let ResourceSpec::Route(route) = &resolved.record().spec else {
            panic!("expected route");
        };
        assert_eq!(
            route.to.as_ref().unwrap().name.as_deref(),
            Some("frontend-svc")
        );
    }

    #[test]
    fn destination_without_reference_is_left_for_validation() {
        let (registry, mut records) = setup(
            "resources:\n  - kind: VirtualService\n    name: vs\n    http:\n      - route: [{ destination: { subset: v1 } }]\n",
        );
        let resolved = resolve(records.remove(0), &registry).unwrap();
        let ResourceSpec::VirtualService(spec) = &resolved.record().spec else {
            panic!("expected virtual service");
        };
        assert_eq!(spec.http[0].route[0].destination.host, None);
    }
}
