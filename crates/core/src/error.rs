use std::fmt;

use serde::{Deserialize, Serialize};

/// The pipeline stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Load,
    Extract,
    Register,
    Resolve,
    Validate,
    Render,
}

impl Stage {
    /// Pass number, matching the `passN_*` module that owns the stage.
    pub fn pass(self) -> u8 {
        match self {
            Stage::Load => 0,
            Stage::Extract => 1,
            Stage::Register => 2,
            Stage::Resolve => 4,
            Stage::Validate => 5,
            Stage::Render => 6,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Load => "load",
            Stage::Extract => "extract",
            Stage::Register => "register",
            Stage::Resolve => "resolve",
            Stage::Validate => "validate",
            Stage::Render => "render",
        };
        f.write_str(s)
    }
}

/// A composition error.
///
/// Every variant that concerns a single resource names it, so the CLI can
/// report per-resource diagnostics without extra bookkeeping.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComposeError {
    /// A declaration file could not be read, tokenized or imported.
    #[error("{file}: {message}")]
    Load { file: String, message: String },

    /// A declaration is structurally malformed (wrong value type, missing
    /// required key).
    #[error("{kind} '{resource}': field '{field}': {message}")]
    Declaration {
        kind: String,
        resource: String,
        field: String,
        message: String,
    },

    /// A key outside the closed field set of a record kind.
    #[error("{kind} '{resource}': unrecognized field '{field}'")]
    UnrecognizedField {
        kind: String,
        resource: String,
        field: String,
    },

    /// Two declarations share one declaration-site identifier.
    #[error("{kind} '{id}': duplicate identifier, first declared in {first_file}")]
    DuplicateIdentifier {
        kind: String,
        id: String,
        first_file: String,
    },

    /// Two declarations of one kind normalize to the same canonical name and
    /// would render to the same manifest file.
    #[error("{kind} '{id}': canonical name '{name}' is already used by '{first_id}'")]
    NameCollision {
        kind: String,
        id: String,
        name: String,
        first_id: String,
    },

    /// A symbolic service reference has no registered Service.
    #[error("{kind} '{resource}': cannot resolve service reference '{service}'")]
    ReferenceResolution {
        kind: String,
        resource: String,
        service: String,
    },

    /// A resolved record violates a semantic invariant.
    #[error("{kind} '{resource}': field '{field}': {message}")]
    Validation {
        kind: String,
        resource: String,
        field: String,
        message: String,
    },

    /// Internal invariant violation while rendering a validated record.
    #[error("{kind} '{resource}': render failed: {message}")]
    Render {
        kind: String,
        resource: String,
        message: String,
    },
}

impl ComposeError {
    pub fn load(file: &str, message: impl Into<String>) -> Self {
        ComposeError::Load {
            file: file.to_owned(),
            message: message.into(),
        }
    }

    pub fn declaration(
        kind: &str,
        resource: &str,
        field: &str,
        message: impl Into<String>,
    ) -> Self {
        ComposeError::Declaration {
            kind: kind.to_owned(),
            resource: resource.to_owned(),
            field: field.to_owned(),
            message: message.into(),
        }
    }

    pub fn unrecognized(kind: &str, resource: &str, field: &str) -> Self {
        ComposeError::UnrecognizedField {
            kind: kind.to_owned(),
            resource: resource.to_owned(),
            field: field.to_owned(),
        }
    }

    pub fn unresolved(kind: &str, resource: &str, service: &str) -> Self {
        ComposeError::ReferenceResolution {
            kind: kind.to_owned(),
            resource: resource.to_owned(),
            service: service.to_owned(),
        }
    }

    pub fn validation(
        kind: &str,
        resource: &str,
        field: &str,
        message: impl Into<String>,
    ) -> Self {
        ComposeError::Validation {
            kind: kind.to_owned(),
            resource: resource.to_owned(),
            field: field.to_owned(),
            message: message.into(),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            ComposeError::Load { .. } => Stage::Load,
            ComposeError::Declaration { .. } | ComposeError::UnrecognizedField { .. } => {
                Stage::Extract
            }
            ComposeError::DuplicateIdentifier { .. } | ComposeError::NameCollision { .. } => {
                Stage::Register
            }
            ComposeError::ReferenceResolution { .. } => Stage::Resolve,
            ComposeError::Validation { .. } => Stage::Validate,
            ComposeError::Render { .. } => Stage::Render,
        }
    }

    /// Short machine-readable error class.
    pub fn code(&self) -> &'static str {
        match self {
            ComposeError::Load { .. } => "LoadError",
            ComposeError::Declaration { .. } => "DeclarationError",
            ComposeError::UnrecognizedField { .. } => "UnrecognizedFieldError",
            ComposeError::DuplicateIdentifier { .. } => "DuplicateIdentifierError",
            ComposeError::NameCollision { .. } => "NameCollisionError",
            ComposeError::ReferenceResolution { .. } => "ReferenceResolutionError",
            ComposeError::Validation { .. } => "ValidationError",
            ComposeError::Render { .. } => "RenderError",
        }
    }

    /// The resource the error concerns, when it concerns one.
    pub fn resource(&self) -> Option<&str> {
        match self {
            ComposeError::Load { .. } => None,
            ComposeError::Declaration { resource, .. }
            | ComposeError::UnrecognizedField { resource, .. }
            | ComposeError::ReferenceResolution { resource, .. }
            | ComposeError::Validation { resource, .. }
            | ComposeError::Render { resource, .. } => Some(resource),
            ComposeError::DuplicateIdentifier { id, .. }
            | ComposeError::NameCollision { id, .. } => Some(id),
        }
    }

    /// Serialize to a JSON object with a fixed key set; keys that do not
    /// apply to the variant are `null`.
    pub fn to_json_value(&self) -> serde_json::Value {
        let (kind, field, reference) = match self {
            ComposeError::Load { .. } => (None, None, None),
            ComposeError::Declaration { kind, field, .. }
            | ComposeError::UnrecognizedField { kind, field, .. }
            | ComposeError::Validation { kind, field, .. } => {
                (Some(kind.as_str()), Some(field.as_str()), None)
            }
            ComposeError::DuplicateIdentifier { kind, .. }
            | ComposeError::Render { kind, .. } => (Some(kind.as_str()), None, None),
            ComposeError::ReferenceResolution { kind, service, .. } => {
                (Some(kind.as_str()), None, Some(service.as_str()))
            }
            ComposeError::NameCollision { kind, first_id, .. } => {
                (Some(kind.as_str()), Some("name"), Some(first_id.as_str()))
            }
        };
        serde_json::json!({
            "error":     self.code(),
            "field":     field,
            "kind":      kind,
            "message":   self.to_string(),
            "pass":      self.stage().pass(),
            "reference": reference,
            "resource":  self.resource(),
            "stage":     self.stage(),
        })
    }
}
