//! Symbol registry: symbolic name → numeric identifier plus syntax metadata.
//!
//! Compiling real schema sources is out of scope; the registry consumes
//! pre-digested YAML module files, one per module, mapping symbols to their
//! identifier, a scalar flag and (for enumerated integer syntaxes) the
//! declared symbol set.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::protocol::Oid;

/// Errors raised while loading registry module files.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to read a module file or list the registry directory.
    #[error("failed to read registry module: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a module file.
    #[error("failed to parse registry module '{file}': {source}")]
    Parse {
        file: String,
        source: serde_yaml::Error,
    },
}

/// One declared value of an enumerated integer syntax.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EnumSymbol {
    pub name: String,
    pub value: i64,
}

/// Resolution result for one symbol.
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfo {
    /// Numeric identifier of the symbol.
    pub oid: Oid,

    /// Scalars are instanced at `.0`; columnar objects are walked.
    #[serde(default)]
    pub scalar: bool,

    /// Declared symbols of an enumerated integer syntax, in declaration
    /// order. Empty for every other syntax.
    #[serde(default)]
    pub enums: Vec<EnumSymbol>,
}

impl SymbolInfo {
    /// The identifier to put on the wire for this symbol.
    pub fn request_oid(&self) -> Oid {
        if self.scalar {
            self.oid.child(0)
        } else {
            self.oid.clone()
        }
    }

    /// Translate an enumerated integer to its symbolic name.
    ///
    /// Declaration order usually aligns with the numeric values, so
    /// `value - 1` is tried as a direct index first; non-contiguous
    /// enumerations fall back to a linear scan.
    pub fn enum_name(&self, value: i64) -> Option<&str> {
        if self.enums.is_empty() {
            return None;
        }
        if value >= 1 {
            if let Some(symbol) = self.enums.get((value - 1) as usize) {
                if symbol.value == value {
                    return Some(&symbol.name);
                }
            }
        }
        self.enums
            .iter()
            .find(|symbol| symbol.value == value)
            .map(|symbol| symbol.name.as_str())
    }
}

/// Lookup of symbol metadata by (module, name).
pub trait SymbolRegistry: Send + Sync {
    fn resolve(&self, module: &str, symbol: &str) -> Option<SymbolInfo>;
}

#[derive(Debug, Deserialize)]
struct ModuleFile {
    module: String,
    #[serde(default)]
    symbols: HashMap<String, SymbolInfo>,
}

/// Registry backed by a directory of YAML module files, loaded once at
/// startup.
#[derive(Debug, Default)]
pub struct FileRegistry {
    modules: HashMap<String, HashMap<String, SymbolInfo>>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.yaml` module file in `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            let module: ModuleFile =
                serde_yaml::from_str(&content).map_err(|source| RegistryError::Parse {
                    file: path.display().to_string(),
                    source,
                })?;
            debug!(module = %module.module, symbols = module.symbols.len(), "loaded registry module");
            registry.modules.insert(module.module, module.symbols);
        }
        Ok(registry)
    }

    /// Register a symbol directly. Used by tests and embedders.
    pub fn insert(&mut self, module: &str, symbol: &str, info: SymbolInfo) {
        self.modules
            .entry(module.to_string())
            .or_default()
            .insert(symbol.to_string(), info);
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }
}

impl SymbolRegistry for FileRegistry {
    fn resolve(&self, module: &str, symbol: &str) -> Option<SymbolInfo> {
        self.modules.get(module)?.get(symbol).cloned()
    }
}
