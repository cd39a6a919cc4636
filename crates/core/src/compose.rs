//! Composer: declarations -> rendered manifests.
//!
//! This is a thin orchestrator that calls each pass module in order. All
//! records are extracted and registered before any record is defaulted, so
//! resolution sees every Service of the run regardless of declaration order.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::decl::Declaration;
use crate::error::ComposeError;
use crate::model::ResourceKind;
use crate::pass0_load;
use crate::pass1_extract::{self, Extracted};
use crate::pass2_registry::Registry;
use crate::pass3_defaults;
use crate::pass4_resolve;
use crate::pass5_validate;
use crate::pass6_render::{self, Manifest};
use crate::source::SourceProvider;

/// What to do when one resource fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort the run on the first failing resource.
    #[default]
    FailFast,
    /// Record the failure and keep composing the remaining resources.
    Continue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComposeOptions {
    pub failure_policy: FailurePolicy,
    /// Applied to records declared without a namespace.
    pub default_namespace: Option<String>,
}

/// Emitted once per resource, after it finished (or failed) rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
    pub resource: String,
    pub ok: bool,
}

/// Outcome of a run. Manifests are in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositionReport {
    pub manifests: Vec<Manifest>,
    pub failures: Vec<ComposeError>,
}

impl CompositionReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Compose every declaration into a manifest.
///
/// Under [`FailurePolicy::FailFast`] the first error is returned. Under
/// [`FailurePolicy::Continue`] failures are collected into the report and
/// the remaining resources are still composed; a resource that failed
/// extraction is never registered, so references to it fail resolution.
pub fn compose(
    declarations: &[Declaration],
    options: &ComposeOptions,
    on_progress: &mut dyn FnMut(Progress),
) -> Result<CompositionReport, ComposeError> {
    let total = declarations.len();
    let mut report = CompositionReport::default();
    let mut processed = 0;

    // Passes 1+2: extract and register everything first
    let mut registry = Registry::new();
    let mut first_seen: HashMap<(ResourceKind, String), String> = HashMap::new();
    let mut names: HashMap<(ResourceKind, String), String> = HashMap::new();
    let mut extracted: Vec<Extracted> = Vec::with_capacity(total);
    for decl in declarations {
        let outcome = pass1_extract::extract(decl).and_then(|e| {
            let record = e.record();
            let id_key = (decl.kind, record.id.clone());
            if let Some(first_file) = first_seen.get(&id_key) {
                return Err(ComposeError::DuplicateIdentifier {
                    kind: decl.kind.as_str().to_owned(),
                    id: record.id.clone(),
                    first_file: first_file.clone(),
                });
            }
            // the canonical name picks the manifest file
            let name_key = (decl.kind, record.name.clone());
            if let Some(first_id) = names.get(&name_key) {
                return Err(ComposeError::NameCollision {
                    kind: decl.kind.as_str().to_owned(),
                    id: record.id.clone(),
                    name: record.name.clone(),
                    first_id: first_id.clone(),
                });
            }
            first_seen.insert(id_key, decl.prov.file.clone());
            names.insert(name_key, record.id.clone());
            registry.register(record.id.clone(), record.clone());
            Ok(e)
        });
        match outcome {
            Ok(e) => extracted.push(e),
            Err(err) => {
                processed += 1;
                fail(options, &mut report, err, decl.label(), processed, total, on_progress)?;
            }
        }
    }
    debug!(registered = registry.len(), "registry built");

    // Passes 3-6 per record, each stage consuming the previous one
    for e in extracted {
        let label = e.record().name.clone();
        let outcome = compose_one(e, &registry, options);
        processed += 1;
        match outcome {
            Ok(manifest) => {
                debug!(file = %manifest.file_name, "manifest rendered");
                report.manifests.push(manifest);
                on_progress(Progress {
                    processed,
                    total,
                    resource: label,
                    ok: true,
                });
            }
            Err(err) => fail(options, &mut report, err, label, processed, total, on_progress)?,
        }
    }

    info!(
        manifests = report.manifests.len(),
        failures = report.failures.len(),
        "composition finished"
    );
    Ok(report)
}

fn compose_one(
    extracted: Extracted,
    registry: &Registry,
    options: &ComposeOptions,
) -> Result<Manifest, ComposeError> {
    let defaulted = pass3_defaults::apply_defaults(extracted, options.default_namespace.as_deref());
    let resolved = pass4_resolve::resolve(defaulted, registry)?;
    let validated = pass5_validate::validate(resolved)?;
    pass6_render::render(&validated)
}

fn fail(
    options: &ComposeOptions,
    report: &mut CompositionReport,
    err: ComposeError,
    resource: String,
    processed: usize,
    total: usize,
    on_progress: &mut dyn FnMut(Progress),
) -> Result<(), ComposeError> {
    on_progress(Progress {
        processed,
        total,
        resource,
        ok: false,
    });
    match options.failure_policy {
        FailurePolicy::FailFast => Err(err),
        FailurePolicy::Continue => {
            warn!(stage = %err.stage(), error = %err, "resource skipped");
            report.failures.push(err);
            Ok(())
        }
    }
}

/// Load `root` (with imports) from disk and compose it.
pub fn compose_file(
    root: &Path,
    options: &ComposeOptions,
    on_progress: &mut dyn FnMut(Progress),
) -> Result<CompositionReport, ComposeError> {
    let declarations = pass0_load::load_declarations(root)?;
    compose(&declarations, options, on_progress)
}

/// Like [`compose_file`], reading through `provider`.
pub fn compose_with_provider(
    root: &Path,
    provider: &dyn SourceProvider,
    options: &ComposeOptions,
    on_progress: &mut dyn FnMut(Progress),
) -> Result<CompositionReport, ComposeError> {
    let declarations = pass0_load::load_declarations_with_provider(root, provider)?;
    compose(&declarations, options, on_progress)
}
