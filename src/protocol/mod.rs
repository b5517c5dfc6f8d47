//! Protocol layer: identifiers, request/response units, the transport seam
//! and the walker that drives one operation against one device.

mod oid;
mod pdu;
pub mod sim;
mod transport;
mod walker;

pub use oid::{Oid, ParseOidError};
pub use pdu::{Pdu, Value, VarBind};
pub use transport::{CredentialSet, PduKind, SnmpVersion, Transport};
pub use walker::{OperationKind, Walker, MAX_WALK_ROUNDS};
