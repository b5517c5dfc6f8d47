//! Declarative extraction documents.
//!
//! A document is a tree keyed by class name then attribute name. Each
//! attribute resolves to a literal, a symbol-registry reference, or a
//! dependent reference carrying at most one transform. Non-default
//! documents declare a capability pattern matched against the device's
//! reported identity.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Capability selector of a non-default document.
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityPattern {
    /// Pattern matched anywhere within the reported identity.
    pub pattern: String,
}

/// One extraction document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginDocument {
    /// Document name; the file stem when loaded from disk.
    #[serde(skip)]
    pub name: String,

    /// Absent on the default document.
    #[serde(default)]
    pub capability: Option<CapabilityPattern>,

    /// Class name → attribute name → rule.
    #[serde(default)]
    pub classes: BTreeMap<String, BTreeMap<String, Rule>>,
}

impl PluginDocument {
    pub fn rule(&self, class: &str, attr: &str) -> Option<&Rule> {
        self.classes.get(class)?.get(attr)
    }
}

/// An attribute rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Rule {
    /// Registry-bound: the attribute comes back from the device.
    Symbol(SymbolRule),
    /// Derived from another attribute.
    Dependent(DependentRule),
    /// Verbatim text.
    Literal(LiteralRule),
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiteralRule {
    pub literal: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolRule {
    pub symbol: String,
    pub module: String,
}

/// Which resolved facet of the dependency to read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefSource {
    /// The dependency's resolved value.
    #[default]
    Value,
    /// The dependency's resolved request identifier.
    Identifier,
}

/// A rule deriving its value from another attribute, with at most one
/// transform. Transform precedence is `substring`, `split`, `switch`,
/// `match`; the first one present wins and the rest are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct DependentRule {
    /// The referenced attribute.
    #[serde(rename = "ref")]
    pub target: AttrRef,

    /// Read the dependency's value or its identifier (default: value).
    #[serde(default)]
    pub source: RefSource,

    #[serde(default)]
    pub substring: Option<SubstringOp>,

    #[serde(default)]
    pub split: Option<SplitOp>,

    /// Dependency value indexes a named case; an absent key passes the
    /// value through unchanged.
    #[serde(default)]
    pub switch: Option<BTreeMap<String, Rule>>,

    #[serde(rename = "match", default)]
    pub matches: Option<MatchOp>,
}

/// Reference to `(class, attribute)`. The shorthand string form names an
/// attribute of the same class.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "AttrRefRepr")]
pub struct AttrRef {
    pub class: Option<String>,
    pub attr: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum AttrRefRepr {
    Name(String),
    Qualified {
        #[serde(default)]
        class: Option<String>,
        attr: String,
    },
}

impl From<AttrRefRepr> for AttrRef {
    fn from(repr: AttrRefRepr) -> Self {
        match repr {
            AttrRefRepr::Name(attr) => AttrRef { class: None, attr },
            AttrRefRepr::Qualified { class, attr } => AttrRef { class, attr },
        }
    }
}

/// Suffix of the dependency from `start`; unset when out of range.
#[derive(Debug, Clone, Deserialize)]
pub struct SubstringOp {
    pub start: usize,
}

/// Split the dependency by `delimiter` and pick one piece; unset when out
/// of range.
#[derive(Debug, Clone, Deserialize)]
pub struct SplitOp {
    pub delimiter: String,
    #[serde(default)]
    pub index: usize,
}

/// First pattern found anywhere in the dependency wins; no match yields
/// the default rule, or unset without one.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchOp {
    pub cases: Vec<MatchCase>,
    #[serde(default)]
    pub default: Option<Box<Rule>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchCase {
    pub pattern: String,
    pub then: Rule,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_yaml_shape() {
        let doc: PluginDocument = serde_yaml::from_str(
            r#"
capability:
  pattern: "1\\.3\\.6\\.1\\.4\\.1\\.9"
classes:
  device:
    brand: { literal: cisco }
    description: { symbol: sysDescr, module: SNMPv2-MIB }
  interface:
    media:
      ref: type
      match:
        cases:
          - { pattern: ethernet, then: { literal: physical } }
        default: { literal: logical }
    short:
      ref: { class: interface, attr: name }
      substring: { start: 2 }
    slot:
      ref: name
      split: { delimiter: "/", index: 1 }
"#,
        )
        .unwrap();

        assert!(doc.capability.is_some());
        assert!(matches!(
            doc.rule("device", "brand"),
            Some(Rule::Literal(l)) if l.literal == "cisco"
        ));
        assert!(matches!(
            doc.rule("device", "description"),
            Some(Rule::Symbol(s)) if s.symbol == "sysDescr" && s.module == "SNMPv2-MIB"
        ));

        let Some(Rule::Dependent(media)) = doc.rule("interface", "media") else {
            panic!("expected dependent rule");
        };
        assert_eq!(media.target.attr, "type");
        assert!(media.target.class.is_none());
        let matches = media.matches.as_ref().unwrap();
        assert_eq!(matches.cases.len(), 1);
        assert!(matches.default.is_some());

        let Some(Rule::Dependent(short)) = doc.rule("interface", "short") else {
            panic!("expected dependent rule");
        };
        assert_eq!(short.target.class.as_deref(), Some("interface"));
        assert_eq!(short.substring.as_ref().unwrap().start, 2);

        let Some(Rule::Dependent(slot)) = doc.rule("interface", "slot") else {
            panic!("expected dependent rule");
        };
        let split = slot.split.as_ref().unwrap();
        assert_eq!(split.delimiter, "/");
        assert_eq!(split.index, 1);
    }

    #[test]
    fn test_ref_source_identifier() {
        let doc: PluginDocument = serde_yaml::from_str(
            r#"
classes:
  interface:
    oidOfName:
      ref: name
      source: identifier
"#,
        )
        .unwrap();
        let Some(Rule::Dependent(rule)) = doc.rule("interface", "oidOfName") else {
            panic!("expected dependent rule");
        };
        assert_eq!(rule.source, RefSource::Identifier);
    }
}
