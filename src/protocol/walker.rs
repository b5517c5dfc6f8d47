//! Protocol walker: one request/response cycle for one device.
//!
//! The walker moves through `Idle → Sending → CredentialFallback →
//! {Combining | TableWalking} → Done`. It splits oversized requests into
//! size-bounded sub-requests, falls back across credential sets in order,
//! and reassembles sub-responses in original request order. Table walks
//! iterate "next" rounds until the table is exhausted.
//!
//! Nothing here returns an error: an operation that gets no usable reply
//! completes with zero responses, and the caller treats that as missing
//! data.

use tracing::{debug, warn};

use super::oid::Oid;
use super::pdu::{Pdu, VarBind};
use super::transport::{CredentialSet, PduKind, Transport};

/// Hard bound on table-walk rounds, so a misbehaving agent that keeps
/// producing bindings cannot spin an operation forever.
pub const MAX_WALK_ROUNDS: usize = 4096;

/// The operation a template wants performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Single read of named instances.
    Get,
    /// Single step to lexicographic successors.
    GetNext,
    /// Iterative step-based enumeration until table exhaustion.
    Walk,
}

impl OperationKind {
    fn pdu_kind(self) -> PduKind {
        match self {
            OperationKind::Get => PduKind::Get,
            OperationKind::GetNext | OperationKind::Walk => PduKind::Next,
        }
    }
}

/// Executes operations against one transport with a fixed sub-request bound.
pub struct Walker<'a> {
    transport: &'a dyn Transport,
    max_request_size: usize,
}

impl<'a> Walker<'a> {
    pub fn new(transport: &'a dyn Transport, max_request_size: usize) -> Self {
        Self {
            transport,
            max_request_size: max_request_size.max(1),
        }
    }

    /// Run one operation. Returns the ordered response rows: one for a
    /// single-shot operation, N for a table walk, empty when no credential
    /// set yielded a usable reply.
    pub async fn run(
        &self,
        device: &str,
        credentials: &[CredentialSet],
        request: Pdu,
        kind: OperationKind,
    ) -> Vec<Pdu> {
        match kind {
            OperationKind::Get | OperationKind::GetNext => {
                self.single_shot(device, credentials, &request, kind.pdu_kind())
                    .await
            }
            OperationKind::Walk => self.table_walk(device, credentials, &request).await,
        }
    }

    /// Try credential sets in order against `first`; the first set whose
    /// exchange yields any reply is adopted for the remainder of the
    /// operation, so sub-responses never mix across sets.
    async fn adopt_credentials<'c>(
        &self,
        device: &str,
        credentials: &'c [CredentialSet],
        first: &Pdu,
        kind: PduKind,
    ) -> Option<(&'c CredentialSet, Pdu)> {
        for (attempt, creds) in credentials.iter().enumerate() {
            debug!(device, attempt, "trying credential set");
            if let Some(response) = self.transport.exchange(device, creds, first, kind).await {
                return Some((creds, response));
            }
        }
        debug!(device, "no credential set yielded a reply");
        None
    }

    async fn single_shot(
        &self,
        device: &str,
        credentials: &[CredentialSet],
        request: &Pdu,
        kind: PduKind,
    ) -> Vec<Pdu> {
        let subs = request.split(self.max_request_size);
        let Some((creds, first)) = self
            .adopt_credentials(device, credentials, &subs[0], kind)
            .await
        else {
            return Vec::new();
        };

        let mut parts = vec![first];
        for sub in &subs[1..] {
            match self.transport.exchange(device, creds, sub, kind).await {
                Some(response) => parts.push(response),
                None => {
                    debug!(device, "sub-request lost mid-operation");
                    return Vec::new();
                }
            }
        }
        vec![Pdu::combine(request.request_id(), &parts)]
    }

    /// Repeat "next" rounds cursored on the original request's columns.
    ///
    /// A binding that no longer starts with its requested column has walked
    /// past that column's subtree and is replaced by a no-value marker. A
    /// round of nothing but markers is the clean end of the table and is
    /// discarded; a failed or empty exchange ends the walk keeping what was
    /// collected so far.
    async fn table_walk(
        &self,
        device: &str,
        credentials: &[CredentialSet],
        request: &Pdu,
    ) -> Vec<Pdu> {
        let columns: Vec<Oid> = request.bindings.iter().map(|vb| vb.oid.clone()).collect();
        if columns.is_empty() {
            return Vec::new();
        }

        let mut rows: Vec<Pdu> = Vec::new();
        let mut adopted: Option<&CredentialSet> = None;
        let mut cursor = request.clone();

        for round in 0.. {
            if round >= MAX_WALK_ROUNDS {
                warn!(device, rounds = round, "table walk hit round cap");
                break;
            }

            let subs = cursor.split(self.max_request_size);
            let mut parts: Vec<Pdu> = Vec::new();
            // The next round steps from the identifiers as returned, even
            // for columns already walked past their subtree.
            let mut returned: Vec<Oid> = Vec::new();
            let mut pointer = 0;
            let mut failed = false;

            for sub in &subs {
                let response = match adopted {
                    Some(creds) => {
                        self.transport
                            .exchange(device, creds, sub, PduKind::Next)
                            .await
                    }
                    None => {
                        match self
                            .adopt_credentials(device, credentials, sub, PduKind::Next)
                            .await
                        {
                            Some((creds, response)) => {
                                adopted = Some(creds);
                                Some(response)
                            }
                            None => None,
                        }
                    }
                };

                let Some(mut response) = response else {
                    failed = true;
                    break;
                };
                if response.is_empty() || response.len() != sub.len() {
                    failed = true;
                    break;
                }

                for binding in response.bindings.iter_mut() {
                    let requested = &columns[pointer];
                    pointer += 1;
                    returned.push(binding.oid.clone());
                    if !binding.oid.starts_with(requested) {
                        *binding = VarBind::unset(requested.clone());
                    }
                }
                parts.push(response);
            }

            if failed {
                break;
            }

            let combined = Pdu::combine(request.request_id(), &parts);
            if combined.bindings.iter().all(|vb| vb.value.is_null()) {
                break;
            }

            let mut next = Pdu::with_id(request.request_id());
            for oid in returned {
                next.push(VarBind::unset(oid));
            }
            rows.push(combined);
            cursor = next;
        }

        debug!(device, rows = rows.len(), "table walk finished");
        rows
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::*;
    use crate::protocol::pdu::Value;

    fn oid(s: &str) -> Oid {
        s.parse().unwrap()
    }

    /// Transport over a sorted binding map, optionally deaf to all but one
    /// community. Records which communities were used for each exchange.
    struct TableTransport {
        community: String,
        values: BTreeMap<Oid, Value>,
        used: Mutex<Vec<String>>,
    }

    impl TableTransport {
        fn new(community: &str, entries: &[(&str, Value)]) -> Self {
            Self {
                community: community.to_string(),
                values: entries
                    .iter()
                    .map(|(o, v)| (oid(o), v.clone()))
                    .collect(),
                used: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl Transport for TableTransport {
        async fn exchange(
            &self,
            _device: &str,
            credentials: &CredentialSet,
            request: &Pdu,
            kind: PduKind,
        ) -> Option<Pdu> {
            if credentials.community != self.community {
                return None;
            }
            self.used
                .lock()
                .unwrap()
                .push(credentials.community.clone());
            let mut response = Pdu::with_id(request.request_id());
            for vb in &request.bindings {
                let answered = match kind {
                    PduKind::Get => self
                        .values
                        .get(&vb.oid)
                        .map(|v| VarBind::new(vb.oid.clone(), v.clone())),
                    PduKind::Next => self
                        .values
                        .range((
                            std::ops::Bound::Excluded(vb.oid.clone()),
                            std::ops::Bound::Unbounded,
                        ))
                        .next()
                        .map(|(o, v)| VarBind::new(o.clone(), v.clone())),
                };
                response.push(answered.unwrap_or_else(|| VarBind::unset(vb.oid.clone())));
            }
            Some(response)
        }
    }

    fn walk_request(columns: &[&str]) -> Pdu {
        let mut request = Pdu::with_id(7);
        for column in columns {
            request.push(VarBind::unset(oid(column)));
        }
        request
    }

    #[tokio::test]
    async fn test_table_walk_collects_three_rows() {
        let transport = TableTransport::new(
            "public",
            &[
                ("1.1.1", Value::Int(1)),
                ("1.1.2", Value::Int(2)),
                ("1.1.3", Value::Int(3)),
                ("1.2.1", Value::Text("a".into())),
                ("1.2.2", Value::Text("b".into())),
                ("1.2.3", Value::Text("c".into())),
            ],
        );
        let walker = Walker::new(&transport, 3);
        let rows = walker
            .run(
                "192.0.2.1",
                &[CredentialSet::new("public")],
                walk_request(&["1.1", "1.2"]),
                OperationKind::Walk,
            )
            .await;

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].bindings[0].value, Value::Int(1));
        assert_eq!(rows[0].bindings[1].value, Value::Text("a".into()));
        assert_eq!(rows[2].bindings[0].value, Value::Int(3));
        assert_eq!(rows[2].bindings[1].value, Value::Text("c".into()));
    }

    #[tokio::test]
    async fn test_table_walk_marks_exhausted_column() {
        // Second column has two instances against the first column's three;
        // the trailing entry sits outside both columns.
        let transport = TableTransport::new(
            "public",
            &[
                ("1.1.1", Value::Int(1)),
                ("1.1.2", Value::Int(2)),
                ("1.1.3", Value::Int(3)),
                ("1.2.1", Value::Text("a".into())),
                ("1.2.2", Value::Text("b".into())),
                ("9.9", Value::Int(99)),
            ],
        );
        let walker = Walker::new(&transport, 3);
        let rows = walker
            .run(
                "192.0.2.1",
                &[CredentialSet::new("public")],
                walk_request(&["1.1", "1.2"]),
                OperationKind::Walk,
            )
            .await;

        assert_eq!(rows.len(), 3);
        assert!(rows[2].bindings[1].value.is_null());
        assert_eq!(rows[2].bindings[1].oid, oid("1.2"));
    }

    #[tokio::test]
    async fn test_credential_fallback_adopts_second_set() {
        let transport = TableTransport::new(
            "private",
            &[("1.1.0", Value::Text("sys".into())), ("1.2.0", Value::Int(9))],
        );
        let walker = Walker::new(&transport, 1);
        let mut request = Pdu::with_id(3);
        request.push(VarBind::unset(oid("1.1.0")));
        request.push(VarBind::unset(oid("1.2.0")));

        let rows = walker
            .run(
                "192.0.2.1",
                &[CredentialSet::new("public"), CredentialSet::new("private")],
                request,
                OperationKind::Get,
            )
            .await;

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 2);
        // Every exchange that got through used the adopted set only.
        let used = transport.used.lock().unwrap();
        assert!(used.iter().all(|c| c == "private"));
        assert_eq!(used.len(), 2);
    }

    #[tokio::test]
    async fn test_no_credentials_yield_zero_responses() {
        let transport = TableTransport::new("secret", &[("1.1.0", Value::Int(1))]);
        let walker = Walker::new(&transport, 3);
        let mut request = Pdu::with_id(5);
        request.push(VarBind::unset(oid("1.1.0")));

        let rows = walker
            .run(
                "192.0.2.1",
                &[CredentialSet::new("public")],
                request,
                OperationKind::Get,
            )
            .await;
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_single_shot_recombines_split_request() {
        let entries: Vec<(String, Value)> = (0..7)
            .map(|i| (format!("1.9.{i}.0"), Value::Int(i)))
            .collect();
        let borrowed: Vec<(&str, Value)> = entries
            .iter()
            .map(|(o, v)| (o.as_str(), v.clone()))
            .collect();
        let transport = TableTransport::new("public", &borrowed);

        let walker = Walker::new(&transport, 3);
        let mut request = Pdu::with_id(11);
        for i in 0..7 {
            request.push(VarBind::unset(oid(&format!("1.9.{i}.0"))));
        }

        let rows = walker
            .run(
                "192.0.2.1",
                &[CredentialSet::new("public")],
                request,
                OperationKind::Get,
            )
            .await;

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].request_id(), 11);
        assert_eq!(rows[0].len(), 7);
        for (i, vb) in rows[0].bindings.iter().enumerate() {
            assert_eq!(vb.value, Value::Int(i as i64));
        }
    }
}
