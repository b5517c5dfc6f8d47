//! Declarative-rule interpreter.
//!
//! The engine runs twice around every walk. [`ExtractionEngine::prepare`]
//! turns a template's rules into the outgoing request by resolving every
//! transitively registry-bound symbol to its identifier.
//! [`ExtractionEngine::resolve`] turns one response row back into attribute
//! values: literals verbatim, registry-bound values from the first binding
//! under the requested identifier, dependent rules by recursing into their
//! referenced attribute and applying at most one transform.
//!
//! Nothing here fails the operation. A rule that cannot produce a value
//! leaves its slot unset and the partial template still flows downstream.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::plugin::{DependentRule, PluginDocument, PluginStore, RefSource, Rule};
use crate::protocol::{Oid, Pdu, Value, VarBind};
use crate::registry::SymbolRegistry;
use crate::template::Template;

/// Stateless interpreter bound to the plugin store and symbol registry.
pub struct ExtractionEngine<'a> {
    store: &'a PluginStore,
    registry: &'a dyn SymbolRegistry,
}

/// Per-resolution scratch: memoized attribute values and the in-progress
/// attribute chain used to detect rule cycles.
struct ResolveCtx<'a> {
    doc: &'a PluginDocument,
    row: &'a Pdu,
    memo: HashMap<(String, RefSource), Option<String>>,
    visiting: HashSet<String>,
}

impl<'a> ExtractionEngine<'a> {
    pub fn new(store: &'a PluginStore, registry: &'a dyn SymbolRegistry) -> Self {
        Self { store, registry }
    }

    /// Build the outgoing request for a template: every registry-bound
    /// symbol reachable from a slot's rule becomes one binding, in slot
    /// order and without duplicates. Slots whose own rule is registry-bound
    /// get their requested identifier recorded.
    pub fn prepare(&self, template: &mut Template, doc: &PluginDocument) -> Pdu {
        let class = template.class().name();
        let mut oids: Vec<Oid> = Vec::new();
        let mut seen_attrs: HashSet<String> = HashSet::new();

        for slot in template.class().slots() {
            let Some(rule) = self.store.lookup(doc, class, slot.name) else {
                continue;
            };
            if let Rule::Symbol(symbol) = rule {
                if let Some(info) = self.registry.resolve(&symbol.module, &symbol.symbol) {
                    template.set_oid(slot.name, info.request_oid());
                }
            }
            seen_attrs.insert(format!("{class}\u{1f}{}", slot.name));
            self.collect_symbols(doc, class, rule, &mut seen_attrs, &mut oids);
        }

        let mut request = Pdu::new();
        for oid in oids {
            request.push(VarBind::unset(oid));
        }
        debug!(
            class,
            bindings = request.len(),
            "prepared extraction request"
        );
        request
    }

    fn collect_symbols(
        &self,
        doc: &PluginDocument,
        class: &str,
        rule: &Rule,
        seen_attrs: &mut HashSet<String>,
        oids: &mut Vec<Oid>,
    ) {
        match rule {
            Rule::Literal(_) => {}
            Rule::Symbol(symbol) => {
                match self.registry.resolve(&symbol.module, &symbol.symbol) {
                    Some(info) => {
                        let oid = info.request_oid();
                        if !oids.contains(&oid) {
                            oids.push(oid);
                        }
                    }
                    None => {
                        warn!(
                            module = %symbol.module,
                            symbol = %symbol.symbol,
                            "unknown registry symbol, attribute will stay unset"
                        );
                    }
                }
            }
            Rule::Dependent(dep) => {
                let target_class = dep.target.class.as_deref().unwrap_or(class);
                let key = format!("{target_class}\u{1f}{}", dep.target.attr);
                if seen_attrs.insert(key) {
                    if let Some(target) = self.store.lookup(doc, target_class, &dep.target.attr) {
                        self.collect_symbols(doc, target_class, target, seen_attrs, oids);
                    }
                }
                if let Some(switch) = &dep.switch {
                    for case in switch.values() {
                        self.collect_symbols(doc, class, case, seen_attrs, oids);
                    }
                }
                if let Some(matches) = &dep.matches {
                    for case in &matches.cases {
                        self.collect_symbols(doc, class, &case.then, seen_attrs, oids);
                    }
                    if let Some(default) = &matches.default {
                        self.collect_symbols(doc, class, default, seen_attrs, oids);
                    }
                }
            }
        }
    }

    /// Evaluate one response row against a prepared template. Returns a
    /// filled clone; the prepared template is untouched, so every row of a
    /// walk resolves from the same starting point.
    pub fn resolve(&self, prepared: &Template, doc: &PluginDocument, row: &Pdu) -> Template {
        let mut template = prepared.clone();
        let class = template.class().name();
        let mut ctx = ResolveCtx {
            doc,
            row,
            memo: HashMap::new(),
            visiting: HashSet::new(),
        };

        for slot in template.class().slots() {
            if template.value(slot.name).is_some() {
                continue;
            }
            if let Some(value) = self.eval_attr(&mut ctx, class, slot.name, RefSource::Value) {
                template.set_value(slot.name, &value);
            }
        }
        template
    }

    fn eval_attr(
        &self,
        ctx: &mut ResolveCtx<'_>,
        class: &str,
        attr: &str,
        source: RefSource,
    ) -> Option<String> {
        let key = format!("{class}\u{1f}{attr}");
        if let Some(memoized) = ctx.memo.get(&(key.clone(), source)) {
            return memoized.clone();
        }
        if !ctx.visiting.insert(key.clone()) {
            warn!(class, attr, "rule cycle detected, attribute unset");
            return None;
        }

        let value = self
            .store
            .lookup(ctx.doc, class, attr)
            .and_then(|rule| self.eval_rule(ctx, class, rule, source));

        ctx.visiting.remove(&key);
        ctx.memo.insert((key, source), value.clone());
        value
    }

    fn eval_rule(
        &self,
        ctx: &mut ResolveCtx<'_>,
        class: &str,
        rule: &Rule,
        source: RefSource,
    ) -> Option<String> {
        let value = match rule {
            Rule::Literal(literal) => Some(literal.literal.clone()),
            Rule::Symbol(symbol) => match source {
                RefSource::Value => self.binding_value(ctx, symbol),
                RefSource::Identifier => {
                    self.binding_oid(ctx, symbol).map(|oid| oid.to_string())
                }
            },
            Rule::Dependent(dep) => self.eval_dependent(ctx, class, dep),
        };
        nonblank(value)
    }

    fn eval_dependent(
        &self,
        ctx: &mut ResolveCtx<'_>,
        class: &str,
        dep: &DependentRule,
    ) -> Option<String> {
        let target_class = dep.target.class.as_deref().unwrap_or(class);
        let referenced = self.eval_attr(ctx, target_class, &dep.target.attr, dep.source);

        // At most one transform applies; the first declared kind wins.
        if let Some(substring) = &dep.substring {
            let value = referenced?;
            return nonblank(
                value
                    .char_indices()
                    .nth(substring.start)
                    .map(|(i, _)| value[i..].to_string()),
            );
        }
        if let Some(split) = &dep.split {
            let value = referenced?;
            return nonblank(
                value
                    .split(&split.delimiter)
                    .nth(split.index)
                    .map(str::to_string),
            );
        }
        if let Some(switch) = &dep.switch {
            let value = referenced?;
            return match switch.get(&value) {
                Some(case) => self.eval_rule(ctx, class, case, RefSource::Value),
                None => Some(value),
            };
        }
        if let Some(matches) = &dep.matches {
            // An unset dependency still lands on the default case.
            if let Some(value) = &referenced {
                for case in &matches.cases {
                    if value.contains(&case.pattern) {
                        return self.eval_rule(ctx, class, &case.then, RefSource::Value);
                    }
                }
            }
            return matches
                .default
                .as_ref()
                .and_then(|default| self.eval_rule(ctx, class, default, RefSource::Value));
        }
        referenced
    }

    /// First binding of the row under the symbol's requested identifier.
    fn find_binding<'b>(
        &self,
        ctx: &ResolveCtx<'b>,
        symbol: &crate::plugin::SymbolRule,
    ) -> Option<(&'b VarBind, crate::registry::SymbolInfo)> {
        let info = self.registry.resolve(&symbol.module, &symbol.symbol)?;
        let binding = ctx.row.first_under(&info.request_oid())?;
        Some((binding, info))
    }

    fn binding_value(
        &self,
        ctx: &mut ResolveCtx<'_>,
        symbol: &crate::plugin::SymbolRule,
    ) -> Option<String> {
        let (binding, info) = self.find_binding(ctx, symbol)?;
        if binding.value.is_null() {
            return None;
        }
        if let Value::Int(n) = binding.value {
            if let Some(name) = info.enum_name(n) {
                return Some(name.to_string());
            }
        }
        Some(binding.value.to_string())
    }

    fn binding_oid(
        &self,
        ctx: &mut ResolveCtx<'_>,
        symbol: &crate::plugin::SymbolRule,
    ) -> Option<Oid> {
        let (binding, _) = self.find_binding(ctx, symbol)?;
        Some(binding.oid.clone())
    }
}

/// Trim the resolved value; blank means unset.
fn nonblank(value: Option<String>) -> Option<String> {
    let trimmed = value?.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
