use std::path::Path;
use std::process;

use manifold_core::{load_declarations, normalize_name, Declaration};

use crate::{report_compose_error, OutputFormat};

pub(crate) fn cmd_list(file: &Path, output: OutputFormat, quiet: bool) {
    let declarations = match load_declarations(file) {
        Ok(d) => d,
        Err(e) => {
            report_compose_error(&e, output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => {
            let rows: Vec<serde_json::Value> = declarations
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "kind": d.kind.as_str(),
                        "id": d.identifier(),
                        "name": canonical_name(d),
                        "file": d.prov.file,
                    })
                })
                .collect();
            let pretty = serde_json::to_string_pretty(&rows)
                .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
            println!("{}", pretty);
        }
        OutputFormat::Text => {
            for d in &declarations {
                println!(
                    "{} {} {}",
                    d.kind,
                    d.identifier().unwrap_or_else(|| "-".to_owned()),
                    canonical_name(d).unwrap_or_else(|| "-".to_owned())
                );
            }
        }
    }
}

/// The name the resource will be rendered under, when one can be derived.
fn canonical_name(decl: &Declaration) -> Option<String> {
    decl.declared_name()
        .or_else(|| decl.id.clone())
        .map(|raw| normalize_name(&raw))
}
