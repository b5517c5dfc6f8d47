//! Plugin layer: declarative extraction documents and their store.

mod document;
mod store;

pub use document::{
    AttrRef, CapabilityPattern, DependentRule, LiteralRule, MatchCase, MatchOp, PluginDocument,
    RefSource, Rule, SplitOp, SubstringOp, SymbolRule,
};
pub use store::{PluginError, PluginStore};
