use std::path::Path;
use std::process;

use manifold_core::{compose_file, FailurePolicy};

use crate::config::ProjectConfig;
use crate::{report_compose_error, OutputFormat};

/// Run the whole pipeline without writing anything. Every failing resource
/// is reported, not just the first.
pub(crate) fn cmd_check(file: &Path, config: &ProjectConfig, output: OutputFormat, quiet: bool) {
    let mut options = config.compose.clone();
    options.failure_policy = FailurePolicy::Continue;

    let report = match compose_file(file, &options, &mut |_| {}) {
        Ok(r) => r,
        Err(e) => {
            report_compose_error(&e, output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => {
            let errors: Vec<serde_json::Value> =
                report.failures.iter().map(|e| e.to_json_value()).collect();
            let json = serde_json::json!({
                "valid": report.is_success(),
                "resources": report.manifests.len() + report.failures.len(),
                "errors": errors,
            });
            let pretty = serde_json::to_string_pretty(&json)
                .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
            println!("{}", pretty);
        }
        OutputFormat::Text => {
            for failure in &report.failures {
                report_compose_error(failure, output, quiet);
            }
            if report.is_success() && !quiet {
                println!("valid");
            }
        }
    }

    if !report.is_success() {
        process::exit(1);
    }
}
