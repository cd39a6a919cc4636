use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use manifold_core::{compose_file, CompositionReport, FailurePolicy, Manifest, Progress};
use tempfile::NamedTempFile;
use tracing::info;

use crate::config::ProjectConfig;
use crate::{report_compose_error, report_error, OutputFormat};

pub(crate) struct ComposeArgs<'a> {
    pub file: &'a Path,
    pub out_dir: Option<PathBuf>,
    pub dry_run: bool,
    pub policy: Option<FailurePolicy>,
}

pub(crate) fn cmd_compose(
    args: ComposeArgs<'_>,
    config: &ProjectConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let mut options = config.compose.clone();
    if let Some(policy) = args.policy {
        options.failure_policy = policy;
    }
    let out_dir = args.out_dir.unwrap_or_else(|| config.output_dir());

    let mut progress = |p: Progress| {
        if !quiet {
            let status = if p.ok { "" } else { " (failed)" };
            eprintln!("[{}/{}] {}{}", p.processed, p.total, p.resource, status);
        }
    };

    let report = match compose_file(args.file, &options, &mut progress) {
        Ok(r) => r,
        Err(e) => {
            report_compose_error(&e, output, quiet);
            process::exit(1);
        }
    };

    if args.dry_run {
        if output == OutputFormat::Text {
            print!("{}", join_documents(&report.manifests));
        }
    } else {
        if let Err(msg) = write_manifests(&out_dir, &report.manifests) {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
        info!(dir = %out_dir.display(), count = report.manifests.len(), "manifests written");
    }

    match output {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&summary_json(&report, args.dry_run))
                .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
            println!("{}", json);
        }
        OutputFormat::Text => {
            for failure in &report.failures {
                report_compose_error(failure, output, quiet);
            }
            if !quiet && !args.dry_run {
                println!(
                    "wrote {} manifest(s) to {}",
                    report.manifests.len(),
                    out_dir.display()
                );
            }
        }
    }

    if !report.is_success() {
        process::exit(1);
    }
}

/// YAML documents separated by `---` lines, in declaration order.
fn join_documents(manifests: &[Manifest]) -> String {
    manifests
        .iter()
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join("---\n")
}

/// Write each manifest through a temp file in `dir` renamed into place, so
/// a reader never observes a partially written manifest.
fn write_manifests(dir: &Path, manifests: &[Manifest]) -> Result<(), String> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("could not create '{}': {}", dir.display(), e))?;
    for manifest in manifests {
        let target = dir.join(&manifest.file_name);
        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| format!("could not create temp file in '{}': {}", dir.display(), e))?;
        tmp.write_all(manifest.text.as_bytes())
            .map_err(|e| format!("could not write '{}': {}", target.display(), e))?;
        tmp.persist(&target)
            .map_err(|e| format!("could not write '{}': {}", target.display(), e.error))?;
    }
    Ok(())
}

fn summary_json(report: &CompositionReport, dry_run: bool) -> serde_json::Value {
    let manifests: Vec<serde_json::Value> = report
        .manifests
        .iter()
        .map(|m| {
            let mut entry = serde_json::json!({
                "file": m.file_name,
                "kind": m.kind.as_str(),
                "name": m.name,
            });
            if dry_run {
                entry["text"] = serde_json::Value::String(m.text.clone());
            }
            entry
        })
        .collect();
    let failures: Vec<serde_json::Value> =
        report.failures.iter().map(|e| e.to_json_value()).collect();
    serde_json::json!({
        "manifests": manifests,
        "failures": failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifold_core::ResourceKind;

    fn manifest(name: &str, text: &str) -> Manifest {
        Manifest {
            kind: ResourceKind::Service,
            name: name.to_owned(),
            file_name: format!("service-{}.yaml", name),
            text: text.to_owned(),
        }
    }

    #[test]
    fn documents_are_separated() {
        let joined = join_documents(&[manifest("a", "kind: A\n"), manifest("b", "kind: B\n")]);
        assert_eq!(joined, "kind: A\n---\nkind: B\n");
    }

    #[test]
    fn manifests_are_written_and_replaced() {
        let dir = tempfile::tempdir().expect("temp dir");
        let out = dir.path().join("nested/out");
        write_manifests(&out, &[manifest("a", "first\n")]).unwrap();
        write_manifests(&out, &[manifest("a", "second\n")]).unwrap();
        let text = std::fs::read_to_string(out.join("service-a.yaml")).unwrap();
        assert_eq!(text, "second\n");
        let entries = std::fs::read_dir(&out).unwrap().count();
        assert_eq!(entries, 1, "no temp files left behind");
    }
}
