//! Change operations.

use serde::{Deserialize, Serialize};

/// Kind of replicated mutation.
///
/// Wire names are the upper-case forms fixed by the sync contract
/// (`"CREATE"`, `"UPDATE"`, `"DELETE"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    /// Entity was created.
    Create,
    /// Entity was updated.
    Update,
    /// Entity was deleted.
    Delete,
}

impl ChangeOp {
    /// Returns true if this operation carries a payload on the wire.
    ///
    /// DELETE is the only payload-free operation; `data` is omitted for it.
    pub fn carries_payload(&self) -> bool {
        !matches!(self, ChangeOp::Delete)
    }
}

impl std::fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeOp::Create => write!(f, "CREATE"),
            ChangeOp::Update => write!(f, "UPDATE"),
            ChangeOp::Delete => write!(f, "DELETE"),
        }
    }
}
