//! Protocol data units: variable bindings and request/response payloads.

use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

use super::oid::Oid;

static NEXT_REQUEST_ID: AtomicI32 = AtomicI32::new(1);

/// A value carried in a variable binding.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The "no value" marker. Also substituted for table columns that have
    /// been walked past their subtree.
    Null,
    Int(i64),
    Counter(u64),
    TimeTicks(u64),
    Text(String),
    Oid(Oid),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value, when it has one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Counter(n) | Value::TimeTicks(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(n) => write!(f, "{n}"),
            Value::Counter(n) | Value::TimeTicks(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Oid(oid) => write!(f, "{oid}"),
        }
    }
}

/// An (identifier, value) pair inside a request or response.
#[derive(Debug, Clone, PartialEq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: Value,
}

impl VarBind {
    pub fn new(oid: Oid, value: Value) -> Self {
        Self { oid, value }
    }

    /// A binding with no value, as used in requests and end-of-column markers.
    pub fn unset(oid: Oid) -> Self {
        Self {
            oid,
            value: Value::Null,
        }
    }
}

/// An ordered list of variable bindings with a correlation id.
#[derive(Debug, Clone, PartialEq)]
pub struct Pdu {
    request_id: i32,
    pub bindings: Vec<VarBind>,
}

impl Pdu {
    /// An empty request with a fresh correlation id.
    pub fn new() -> Self {
        Self::with_id(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn with_id(request_id: i32) -> Self {
        Self {
            request_id,
            bindings: Vec::new(),
        }
    }

    pub fn request_id(&self) -> i32 {
        self.request_id
    }

    pub fn push(&mut self, binding: VarBind) {
        self.bindings.push(binding);
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// First binding whose identifier lies under `prefix`. Several bindings
    /// can cover one logical row; callers take the first.
    pub fn first_under(&self, prefix: &Oid) -> Option<&VarBind> {
        self.bindings.iter().find(|vb| vb.oid.starts_with(prefix))
    }

    /// Split into sub-units of at most `max_size` bindings each, preserving
    /// order. A unit within the bound is returned whole.
    pub fn split(&self, max_size: usize) -> Vec<Pdu> {
        if self.bindings.len() <= max_size {
            return vec![self.clone()];
        }
        self.bindings
            .chunks(max_size)
            .map(|chunk| Pdu {
                request_id: self.request_id,
                bindings: chunk.to_vec(),
            })
            .collect()
    }

    /// Recombine sub-responses in original request order under the original
    /// correlation id.
    pub fn combine(request_id: i32, parts: &[Pdu]) -> Pdu {
        Pdu {
            request_id,
            bindings: parts.iter().flat_map(|p| p.bindings.clone()).collect(),
        }
    }
}

impl Default for Pdu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(s: &str) -> Oid {
        s.parse().unwrap()
    }

    fn request_with(n: usize) -> Pdu {
        let mut pdu = Pdu::with_id(42);
        for i in 0..n {
            pdu.push(VarBind::unset(oid(&format!("1.3.6.1.{i}"))));
        }
        pdu
    }

    #[test]
    fn test_split_seven_by_three() {
        let request = request_with(7);
        let parts = request.split(3);
        let sizes: Vec<usize> = parts.iter().map(Pdu::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert!(parts.iter().all(|p| p.request_id() == 42));
    }

    #[test]
    fn test_split_within_bound_is_whole() {
        let request = request_with(3);
        assert_eq!(request.split(3).len(), 1);
        assert_eq!(request.split(5).len(), 1);
    }

    #[test]
    fn test_combine_preserves_order_and_id() {
        let request = request_with(7);
        let parts = request.split(3);
        let combined = Pdu::combine(request.request_id(), &parts);
        assert_eq!(combined, request);
    }

    #[test]
    fn test_first_under_picks_first_covering_binding() {
        let mut pdu = Pdu::with_id(1);
        pdu.push(VarBind::new(oid("1.3.6.1.2.1"), Value::Int(1)));
        pdu.push(VarBind::new(oid("1.3.6.1.2.2"), Value::Int(2)));
        let found = pdu.first_under(&oid("1.3.6.1.2")).unwrap();
        assert_eq!(found.value, Value::Int(1));
        assert!(pdu.first_under(&oid("1.3.6.9")).is_none());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Int(-3).to_string(), "-3");
        assert_eq!(Value::Text("Gi0/1".into()).to_string(), "Gi0/1");
        assert_eq!(Value::Oid(oid("1.3.6")).to_string(), "1.3.6");
    }
}
