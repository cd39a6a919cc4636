#![allow(clippy::result_large_err)]
//! manifold-core: declarative resource model composer.
//!
//! Turns declaration files into Kubernetes, OpenShift and Istio manifests
//! through a fixed pipeline of passes:
//!
//! 0. load declaration files and their imports ([`load_declarations`])
//! 1. extract typed records, rejecting unknown fields ([`extract`])
//! 2. register records by declaration-site identifier ([`Registry`])
//! 3. fill structural defaults ([`apply_defaults`])
//! 4. resolve service references ([`resolve`])
//! 5. validate semantic invariants ([`validate`])
//! 6. render ordered YAML ([`render`])
//!
//! [`compose()`] runs passes 1-6 over a declaration list. Each pass consumes
//! the previous pass's stage type, so a record can only be rendered once it
//! has been defaulted, resolved and validated.

pub mod compose;
pub mod decl;
pub mod error;
pub mod model;
pub mod pass0_load;
pub mod pass1_extract;
pub mod pass2_registry;
pub mod pass3_defaults;
pub mod pass4_resolve;
pub mod pass5_validate;
pub mod pass6_render;
pub mod source;

// ── Convenience re-exports: key types ────────────────────────────────

pub use compose::{ComposeOptions, CompositionReport, FailurePolicy, Progress};
pub use decl::{DeclValue, Declaration, Provenance};
pub use error::{ComposeError, Stage};
pub use model::{normalize_name, ResourceKind, ResourceRecord, ResourceSpec};
pub use pass2_registry::{NotFound, Registry};
pub use pass6_render::Manifest;
pub use source::{FileSystemProvider, InMemoryProvider, SourceProvider};

// ── Convenience re-exports: pipeline entry points ────────────────────

pub use compose::{compose, compose_file, compose_with_provider};
pub use pass0_load::{load_declarations, load_declarations_with_provider, parse_declarations};
pub use pass1_extract::{extract, extract_as, Extracted};
pub use pass3_defaults::{apply_defaults, Defaulted};
pub use pass4_resolve::{resolve, Resolved};
pub use pass5_validate::{validate, Validated};
pub use pass6_render::render;
