//! Plugin store: document loading, capability selection and rule fallback.

use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

use super::document::{PluginDocument, Rule};

/// Errors raised while loading the plugin set. Any of these is fatal to
/// process start.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Failed to read a document or list the plugin directory.
    #[error("failed to read plugin document: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a document.
    #[error("failed to parse plugin document '{file}': {source}")]
    Parse {
        file: String,
        source: serde_yaml::Error,
    },

    /// A non-default document has a malformed capability pattern.
    #[error("invalid capability pattern in '{file}': {source}")]
    Pattern { file: String, source: regex::Error },

    /// A non-default document declares no capability pattern.
    #[error("plugin document '{file}' declares no capability pattern")]
    MissingPattern { file: String },

    /// The default document is missing.
    #[error("default plugin document '{0}' not found")]
    MissingDefault(String),
}

struct KeyedDocument {
    pattern: String,
    regex: Regex,
    document: Arc<PluginDocument>,
}

/// Holds the default document and the capability-keyed documents, loaded
/// once at startup.
pub struct PluginStore {
    default: Arc<PluginDocument>,
    keyed: Vec<KeyedDocument>,
}

impl PluginStore {
    /// Load every `*.yaml` document in `dir`; `default_name` names the
    /// default document file.
    pub fn load(dir: impl AsRef<Path>, default_name: &str) -> Result<Self, PluginError> {
        let mut default = None;
        let mut others = Vec::new();

        let mut paths: Vec<_> = std::fs::read_dir(dir.as_ref())?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("yaml"))
            .collect();
        paths.sort();

        for path in paths {
            let file = path.display().to_string();
            let content = std::fs::read_to_string(&path)?;
            let mut document: PluginDocument =
                serde_yaml::from_str(&content).map_err(|source| PluginError::Parse {
                    file: file.clone(),
                    source,
                })?;
            document.name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();

            if path.file_name().and_then(|n| n.to_str()) == Some(default_name) {
                debug!(document = %document.name, "loaded default plugin document");
                default = Some(document);
            } else {
                debug!(document = %document.name, "loaded plugin document");
                others.push(document);
            }
        }

        let default = default.ok_or_else(|| PluginError::MissingDefault(default_name.into()))?;
        let store = Self::from_documents(default, others)?;
        info!(
            documents = store.keyed.len() + 1,
            "plugin store initialized"
        );
        Ok(store)
    }

    /// Build a store from already-parsed documents. The default document's
    /// capability pattern, if any, is ignored.
    pub fn from_documents(
        default: PluginDocument,
        others: Vec<PluginDocument>,
    ) -> Result<Self, PluginError> {
        let mut keyed = Vec::new();
        for document in others {
            let pattern = document
                .capability
                .as_ref()
                .map(|c| c.pattern.clone())
                .ok_or_else(|| PluginError::MissingPattern {
                    file: document.name.clone(),
                })?;
            let regex = Regex::new(&pattern).map_err(|source| PluginError::Pattern {
                file: document.name.clone(),
                source,
            })?;
            keyed.push(KeyedDocument {
                pattern,
                regex,
                document: Arc::new(document),
            });
        }
        // Sorting by pattern makes equal-length match ties deterministic:
        // the lexicographically smallest pattern wins.
        keyed.sort_by(|a, b| a.pattern.cmp(&b.pattern));
        Ok(Self {
            default: Arc::new(default),
            keyed,
        })
    }

    pub fn default_document(&self) -> Arc<PluginDocument> {
        Arc::clone(&self.default)
    }

    /// Select the document for a reported identity: the longest matched
    /// span anywhere within the identity wins; no identity or no match
    /// selects the default.
    pub fn select(&self, reported_id: Option<&str>) -> Arc<PluginDocument> {
        let Some(id) = reported_id else {
            return self.default_document();
        };

        let mut best: Option<(usize, &KeyedDocument)> = None;
        for keyed in &self.keyed {
            if let Some(found) = keyed.regex.find(id) {
                let span = found.len();
                if best.map_or(span > 0, |(longest, _)| span > longest) {
                    best = Some((span, keyed));
                }
            }
        }
        match best {
            Some((span, keyed)) => {
                debug!(reported_id = id, document = %keyed.document.name, span, "selected plugin document");
                Arc::clone(&keyed.document)
            }
            None => self.default_document(),
        }
    }

    /// Look up an attribute rule with two-level fallback to the default
    /// document: a class missing from the selected document falls through
    /// whole, and an attribute missing from a present class falls through
    /// by itself.
    pub fn lookup<'a>(
        &'a self,
        document: &'a PluginDocument,
        class: &str,
        attr: &str,
    ) -> Option<&'a Rule> {
        match document.classes.get(class) {
            Some(attrs) => attrs
                .get(attr)
                .or_else(|| self.default.rule(class, attr)),
            None => self.default.rule(class, attr),
        }
    }
}
