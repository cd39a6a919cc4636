//! Pass 2: Resource registry -- every extracted record of one composition
//! run, keyed by kind and declaration-site identifier.
//!
//! The registry is an owned value created per run and passed by reference
//! to the resolver; there is no process-wide instance.

use std::collections::HashMap;
use std::fmt;

use crate::model::{ResourceKind, ResourceRecord};

/// Failed registry lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotFound {
    pub kind: ResourceKind,
    pub key: String,
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no {} registered under '{}'", self.kind, self.key)
    }
}

impl std::error::Error for NotFound {}

#[derive(Debug, Default)]
pub struct Registry {
    records: HashMap<(ResourceKind, String), ResourceRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `record` under its kind and `key`, returning the record of
    /// the same kind it replaced.
    pub fn register(
        &mut self,
        key: impl Into<String>,
        record: ResourceRecord,
    ) -> Option<ResourceRecord> {
        self.records.insert((record.kind(), key.into()), record)
    }

    /// Look up the `kind` record registered under `key`. A record of another
    /// kind under the same key does not match.
    pub fn lookup(&self, kind: ResourceKind, key: &str) -> Result<&ResourceRecord, NotFound> {
        self.records
            .get(&(kind, key.to_owned()))
            .ok_or_else(|| NotFound {
                kind,
                key: key.to_owned(),
            })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::Provenance;
    use crate::model::{ResourceSpec, ServiceSpec, VirtualServiceSpec};
    use std::collections::BTreeMap;

    fn rec(id: &str, name: &str, spec: ResourceSpec) -> ResourceRecord {
        ResourceRecord {
            id: id.to_owned(),
            name: name.to_owned(),
            namespace: None,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            spec,
            prov: Provenance {
                file: "t.yaml".to_owned(),
                index: 0,
            },
        }
    }

    #[test]
    fn lookup_by_kind_and_key() {
        let mut reg = Registry::new();
        reg.register("svcA", rec("svcA", "svc-a", ResourceSpec::Service(ServiceSpec::default())));
        let found = reg.lookup(ResourceKind::Service, "svcA").unwrap();
        assert_eq!(found.name, "svc-a");
    }

    #[test]
    fn lookup_of_other_kind_is_not_found() {
        let mut reg = Registry::new();
        reg.register(
            "reviews",
            rec(
                "reviews",
                "reviews",
                ResourceSpec::VirtualService(VirtualServiceSpec::default()),
            ),
        );
        let err = reg.lookup(ResourceKind::Service, "reviews").unwrap_err();
        assert_eq!(err.to_string(), "no Service registered under 'reviews'");
    }

    #[test]
    fn one_key_holds_one_record_per_kind() {
        let mut reg = Registry::new();
        reg.register("reviews", rec("reviews", "reviews", ResourceSpec::Service(ServiceSpec::default())));
        let previous = reg.register(
            "reviews",
            rec(
                "reviews",
                "reviews",
                ResourceSpec::VirtualService(VirtualServiceSpec::default()),
            ),
        );
        assert!(previous.is_none());
        assert_eq!(reg.len(), 2);
        assert_eq!(
            reg.lookup(ResourceKind::Service, "reviews").unwrap().kind(),
            ResourceKind::Service
        );
    }

    #[test]
    fn register_overwrites_and_returns_previous() {
        let mut reg = Registry::new();
        let svc = || ResourceSpec::Service(ServiceSpec::default());
        assert!(reg.register("a", rec("a", "first", svc())).is_none());
        let previous = reg.register("a", rec("a", "second", svc())).unwrap();
        assert_eq!(previous.name, "first");
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.lookup(ResourceKind::Service, "a").unwrap().name, "second");
    }

    #[test]
    fn missing_key_is_not_found() {
        let reg = Registry::new();
        assert!(reg.is_empty());
        assert!(reg.lookup(ResourceKind::Service, "ghost").is_err());
    }
}
