//! Pass 0: Declaration loading -- tokenize declaration files, follow
//! `imports`, and hand out ordered declaration trees.
//!
//! A declaration file is a YAML mapping with two recognized keys:
//!
//! ```yaml
//! imports:
//!   - services.yaml
//! resources:
//!   - kind: Gateway
//!     name: gw1
//!     selector: { app: x }
//! ```
//!
//! Imported declarations precede the importer's own, so a root file can
//! reference services declared in shared files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tracing::debug;

use crate::decl::{DeclValue, Declaration, Entry, Provenance};
use crate::error::ComposeError;
use crate::model::ResourceKind;
use crate::source::{FileSystemProvider, SourceProvider};

/// One tokenized declaration file.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclarationFile {
    pub imports: Vec<String>,
    pub resources: Vec<Declaration>,
}

/// Load the root declaration file and everything it imports from disk.
pub fn load_declarations(root: &Path) -> Result<Vec<Declaration>, ComposeError> {
    load_declarations_with_provider(root, &FileSystemProvider)
}

/// Load the root declaration file and everything it imports through
/// `provider`. Imports may not leave the root file's directory.
pub fn load_declarations_with_provider(
    root: &Path,
    provider: &dyn SourceProvider,
) -> Result<Vec<Declaration>, ComposeError> {
    let root_label = root.display().to_string();
    let canon_root = provider
        .canonicalize(root)
        .map_err(|e| ComposeError::load(&root_label, format!("cannot open file: {}", e)))?;
    let root_dir = canon_root.parent().unwrap_or(Path::new("")).to_owned();
    let sandbox = provider.canonicalize(&root_dir).map_err(|e| {
        ComposeError::load(
            &root_label,
            format!("cannot canonicalize root directory: {}", e),
        )
    })?;

    let mut walk = ImportWalk {
        provider,
        sandbox: &sandbox,
        visited: HashSet::new(),
        stack: Vec::new(),
        out: Vec::new(),
    };
    walk.load_file(&canon_root)?;
    debug!(declarations = walk.out.len(), root = %root_label, "declarations loaded");
    Ok(walk.out)
}

struct ImportWalk<'a> {
    provider: &'a dyn SourceProvider,
    sandbox: &'a Path,
    visited: HashSet<PathBuf>,
    /// Files currently being loaded, outermost first
    stack: Vec<PathBuf>,
    out: Vec<Declaration>,
}

impl ImportWalk<'_> {
    fn load_file(&mut self, canon: &Path) -> Result<(), ComposeError> {
        if self.visited.contains(canon) {
            return Ok(());
        }

        let file = file_label(canon);
        let text = self
            .provider
            .read(canon)
            .map_err(|e| ComposeError::load(&file, format!("cannot read file: {}", e)))?;
        let parsed = parse_declarations(&text, &file)?;

        self.stack.push(canon.to_owned());
        let base = canon.parent().unwrap_or(Path::new("")).to_owned();
        for import in &parsed.imports {
            let resolved = self.provider.resolve(&base, import).map_err(|e| {
                ComposeError::load(&file, format!("cannot resolve import '{}': {}", import, e))
            })?;
            let canon_import = self.provider.canonicalize(&resolved).map_err(|e| {
                ComposeError::load(&file, format!("cannot resolve import '{}': {}", import, e))
            })?;
            if !canon_import.starts_with(self.sandbox) {
                return Err(ComposeError::load(
                    &file,
                    format!("import '{}' escapes the declaration root directory", import),
                ));
            }
            if self.stack.contains(&canon_import) {
                let mut chain: Vec<String> = self.stack.iter().map(|p| file_label(p)).collect();
                chain.push(file_label(&canon_import));
                return Err(ComposeError::load(
                    &file,
                    format!("import cycle detected: {}", chain.join(" \u{2192} ")),
                ));
            }
            self.load_file(&canon_import)?;
        }
        self.stack.pop();

        debug!(file = %file, resources = parsed.resources.len(), "declaration file parsed");
        self.out.extend(parsed.resources);
        self.visited.insert(canon.to_owned());
        Ok(())
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Tokenize one declaration file's text. `file` is used for provenance
/// and diagnostics only.
pub fn parse_declarations(text: &str, file: &str) -> Result<DeclarationFile, ComposeError> {
    let doc: Value = serde_yaml::from_str(text)
        .map_err(|e| ComposeError::load(file, format!("invalid YAML: {}", e)))?;

    let mut out = DeclarationFile {
        imports: Vec::new(),
        resources: Vec::new(),
    };
    let top = match doc {
        Value::Null => return Ok(out),
        Value::Mapping(m) => m,
        other => {
            return Err(ComposeError::load(
                file,
                format!(
                    "top level must be a mapping, found {}",
                    convert(&other, file)?.type_name()
                ),
            ))
        }
    };

    for (key, value) in top {
        let key = key_text(&key, file)?;
        match key.as_str() {
            "imports" => match convert(&value, file)? {
                DeclValue::Null => {}
                DeclValue::List(items) => {
                    for item in items {
                        match item {
                            DeclValue::Str(s) => out.imports.push(s),
                            other => {
                                return Err(ComposeError::load(
                                    file,
                                    format!(
                                        "imports entries must be strings, found {}",
                                        other.type_name()
                                    ),
                                ))
                            }
                        }
                    }
                }
                other => {
                    return Err(ComposeError::load(
                        file,
                        format!("imports must be a list, found {}", other.type_name()),
                    ))
                }
            },
            "resources" => match convert(&value, file)? {
                DeclValue::Null => {}
                DeclValue::List(items) => {
                    for (index, item) in items.into_iter().enumerate() {
                        out.resources.push(declaration(item, file, index)?);
                    }
                }
                other => {
                    return Err(ComposeError::load(
                        file,
                        format!("resources must be a list, found {}", other.type_name()),
                    ))
                }
            },
            other => {
                return Err(ComposeError::load(
                    file,
                    format!(
                        "unrecognized top-level key '{}' (expected 'imports' or 'resources')",
                        other
                    ),
                ))
            }
        }
    }
    Ok(out)
}

/// Split `kind` and `id` off one resource mapping.
fn declaration(value: DeclValue, file: &str, index: usize) -> Result<Declaration, ComposeError> {
    let entries = match value {
        DeclValue::Map(entries) => entries,
        other => {
            return Err(ComposeError::load(
                file,
                format!(
                    "resources[{}] must be a mapping, found {}",
                    index,
                    other.type_name()
                ),
            ))
        }
    };

    let mut kind = None;
    let mut id = None;
    let mut rest: Vec<Entry> = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        match key.as_str() {
            "kind" => {
                let name = match &value {
                    DeclValue::Str(s) => s.clone(),
                    other => {
                        return Err(ComposeError::load(
                            file,
                            format!(
                                "resources[{}].kind must be a string, found {}",
                                index,
                                other.type_name()
                            ),
                        ))
                    }
                };
                kind = Some(ResourceKind::from_name(&name).ok_or_else(|| {
                    let known: Vec<&str> = ResourceKind::ALL.iter().map(|k| k.as_str()).collect();
                    ComposeError::load(
                        file,
                        format!(
                            "resources[{}]: unknown kind '{}' (expected one of {})",
                            index,
                            name,
                            known.join(", ")
                        ),
                    )
                })?);
            }
            "id" => match value.scalar_text() {
                Some(s) => id = Some(s),
                None => {
                    return Err(ComposeError::load(
                        file,
                        format!(
                            "resources[{}].id must be a scalar, found {}",
                            index,
                            value.type_name()
                        ),
                    ))
                }
            },
            _ => rest.push((key, value)),
        }
    }

    let kind = kind.ok_or_else(|| {
        ComposeError::load(file, format!("resources[{}]: missing 'kind'", index))
    })?;
    Ok(Declaration {
        kind,
        id,
        entries: rest,
        prov: Provenance {
            file: file.to_owned(),
            index,
        },
    })
}

fn key_text(key: &Value, file: &str) -> Result<String, ComposeError> {
    match convert(key, file)?.scalar_text() {
        Some(s) => Ok(s),
        None => Err(ComposeError::load(file, "mapping keys must be scalars")),
    }
}

fn convert(value: &Value, file: &str) -> Result<DeclValue, ComposeError> {
    Ok(match value {
        Value::Null => DeclValue::Null,
        Value::Bool(b) => DeclValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => DeclValue::Int(i),
            None => DeclValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => DeclValue::Str(s.clone()),
        Value::Sequence(items) => DeclValue::List(
            items
                .iter()
                .map(|v| convert(v, file))
                .collect::<Result<_, _>>()?,
        ),
        Value::Mapping(m) => {
            let mut entries = Vec::with_capacity(m.len());
            for (k, v) in m {
                entries.push((key_text(k, file)?, convert(v, file)?));
            }
            DeclValue::Map(entries)
        }
        Value::Tagged(t) => {
            return Err(ComposeError::load(
                file,
                format!("YAML tags are not supported (found {})", t.tag),
            ))
        }
    })
}
