//! Definition loader
//!
//! Resolves a locator to a source file, decodes it (YAML or JSON) and parses
//! the `root` statement tree plus the optional `variables` map.

use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::model::Definition;
use super::parser::{parse_statement, ParseError};
use crate::types::Variables;

/// Extensions tried, in order, when a locator is a bare definition name
pub const DEFINITION_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("workflow definition not found: {locator}")]
    DefinitionNotFound { locator: String },

    #[error("failed to read workflow definition {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed workflow definition {name}: {message}")]
    Format { name: String, message: String },

    #[error("invalid workflow definition: {0}")]
    Parse(#[from] ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Yaml,
    Json,
}

impl SourceFormat {
    /// Pick a format from a file extension; anything but `.json` is read as YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SourceFormat::Json,
            _ => SourceFormat::Yaml,
        }
    }
}

/// Finds and loads definitions from a list of search directories
#[derive(Debug, Clone, Default)]
pub struct DefinitionLoader {
    search_paths: Vec<PathBuf>,
}

impl DefinitionLoader {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Resolve a locator to a file path
    ///
    /// A locator naming an existing file is used directly. Otherwise each
    /// search directory is tried for `<locator>`, then `<locator>.yaml`,
    /// `<locator>.yml` and `<locator>.json`.
    pub fn resolve(&self, locator: &str) -> Result<PathBuf, LoadError> {
        let direct = Path::new(locator);
        if direct.is_file() {
            return Ok(direct.to_path_buf());
        }

        for dir in &self.search_paths {
            let exact = dir.join(locator);
            if exact.is_file() {
                return Ok(exact);
            }
            for ext in DEFINITION_EXTENSIONS {
                let candidate = dir.join(format!("{locator}.{ext}"));
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }

        Err(LoadError::DefinitionNotFound {
            locator: locator.to_string(),
        })
    }

    /// Resolve and load a definition
    pub fn load(&self, locator: &str) -> Result<Definition, LoadError> {
        let path = self.resolve(locator)?;
        debug!(locator = %locator, path = %path.display(), "Loading workflow definition");
        load_file(&path)
    }
}

/// Load a definition from an explicit file path
pub fn load_file(path: &Path) -> Result<Definition, LoadError> {
    let source = std::fs::read_to_string(path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => LoadError::DefinitionNotFound {
            locator: path.display().to_string(),
        },
        _ => LoadError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("definition");

    parse_definition(name, &source, SourceFormat::from_path(path))
}

/// Parse a definition from source text
pub fn parse_definition(
    name: &str,
    source: &str,
    format: SourceFormat,
) -> Result<Definition, LoadError> {
    let document: JsonValue = match format {
        SourceFormat::Yaml => serde_yaml::from_str(source).map_err(|e| LoadError::Format {
            name: name.to_string(),
            message: e.to_string(),
        })?,
        SourceFormat::Json => serde_json::from_str(source).map_err(|e| LoadError::Format {
            name: name.to_string(),
            message: e.to_string(),
        })?,
    };

    let Some(top) = document.as_object() else {
        return Err(ParseError::InvalidField {
            path: name.to_string(),
            field: "document".to_string(),
            expected: "a mapping with 'root' and optional 'variables'".to_string(),
        }
        .into());
    };

    let raw_root = top.get("root").ok_or_else(|| ParseError::MissingField {
        path: name.to_string(),
        field: "root".to_string(),
    })?;
    let root = parse_statement(raw_root)?;

    let variables: Variables = match top.get("variables") {
        None | Some(JsonValue::Null) => Variables::new(),
        Some(JsonValue::Object(vars)) => vars.clone(),
        Some(_) => {
            return Err(ParseError::InvalidField {
                path: name.to_string(),
                field: "variables".to_string(),
                expected: "a mapping".to_string(),
            }
            .into())
        }
    };

    Ok(Definition {
        name: name.to_string(),
        version_hash: hash_source(source),
        root,
        variables,
    })
}

/// Hash definition source using SHA256
fn hash_source(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
