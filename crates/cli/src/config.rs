//! Project configuration for `manifold`.
//!
//! Read from `--config <path>`, else from `./manifold.toml` when present.
//! Every setting is optional; command-line flags override file values.
//!
//! ```toml
//! [compose]
//! failure_policy = "continue"
//! default_namespace = "apps"
//!
//! [output]
//! dir = "manifests"
//! ```

use std::path::{Path, PathBuf};

use manifold_core::ComposeOptions;
use serde::Deserialize;

pub(crate) const DEFAULT_CONFIG_FILE: &str = "manifold.toml";
pub(crate) const DEFAULT_OUTPUT_DIR: &str = "manifests";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ProjectConfig {
    pub compose: ComposeOptions,
    pub output: OutputSettings,
}

/// `[output]` section.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct OutputSettings {
    pub dir: Option<PathBuf>,
}

impl ProjectConfig {
    pub(crate) fn output_dir(&self) -> PathBuf {
        self.output
            .dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
    }
}

/// Load the project config. An explicit path must exist; the implicit
/// `./manifold.toml` is used only when present.
pub(crate) fn load_config(explicit: Option<&Path>) -> Result<ProjectConfig, String> {
    match explicit {
        Some(path) => read_config(path),
        None => {
            let implicit = Path::new(DEFAULT_CONFIG_FILE);
            if implicit.is_file() {
                read_config(implicit)
            } else {
                Ok(ProjectConfig::default())
            }
        }
    }
}

pub(crate) fn read_config(path: &Path) -> Result<ProjectConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;
    parse_config(&content).map_err(|e| format!("could not parse '{}': {}", path.display(), e))
}

fn parse_config(content: &str) -> Result<ProjectConfig, toml::de::Error> {
    toml::from_str(content)
}
