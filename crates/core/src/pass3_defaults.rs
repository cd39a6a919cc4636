//! Pass 3: Structural defaults.
//!
//! Exactly these gaps are filled:
//! - a Gateway without servers gets one HTTP server on port 80 for `*`;
//! - a VirtualService without hosts gets host `*`;
//! - a BuildConfig without an `app` label gets `app: <name>`, keeping any
//!   labels the declaration supplied;
//! - a record without a namespace gets the run's configured default
//!   namespace, when one is configured.
//!
//! Nothing carrying a validation constraint (TLS material, ports of
//! declared servers) is ever invented here.

use tracing::debug;

use crate::model::{PortSpec, ResourceRecord, ResourceSpec, ServerSpec};
use crate::pass1_extract::Extracted;

pub const DEFAULT_SERVER_PORT: i64 = 80;
pub const DEFAULT_SERVER_PROTOCOL: &str = "HTTP";
pub const DEFAULT_SERVER_PORT_NAME: &str = "http";
pub const WILDCARD_HOST: &str = "*";

/// A record whose structural gaps have been filled.
#[derive(Debug, Clone, PartialEq)]
pub struct Defaulted {
    record: ResourceRecord,
}

impl Defaulted {
    pub fn record(&self) -> &ResourceRecord {
        &self.record
    }

    pub(crate) fn into_record(self) -> ResourceRecord {
        self.record
    }
}

pub fn apply_defaults(extracted: Extracted, default_namespace: Option<&str>) -> Defaulted {
    let mut record = extracted.into_record();

    if record.namespace.is_none() {
        record.namespace = default_namespace.map(str::to_owned);
    }

    match &mut record.spec {
        ResourceSpec::Gateway(g) if g.servers.is_empty() => {
            debug!(name = %record.name, "gateway has no servers, adding default HTTP server");
            g.servers.push(ServerSpec {
                port: PortSpec {
                    number: DEFAULT_SERVER_PORT,
                    protocol: DEFAULT_SERVER_PROTOCOL.to_owned(),
                    name: Some(DEFAULT_SERVER_PORT_NAME.to_owned()),
                },
                hosts: vec![WILDCARD_HOST.to_owned()],
                tls: None,
            });
        }
        ResourceSpec::VirtualService(vs) if vs.hosts.is_empty() => {
            debug!(name = %record.name, "virtual service has no hosts, using '*'");
            vs.hosts.push(WILDCARD_HOST.to_owned());
        }
        ResourceSpec::BuildConfig(_) => {
            if !record.labels.contains_key("app") {
                record.labels.insert("app".to_owned(), record.name.clone());
            }
        }
        _ => {}
    }

    Defaulted { record }
}
