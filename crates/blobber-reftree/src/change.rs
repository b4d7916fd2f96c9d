use serde::{Deserialize, Serialize};

use crate::node::NewFile;

/// Operation kind of a staged change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    Rename,
    Copy,
}

/// Operation-specific payload of a staged change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum ChangeOp {
    Insert(NewFile),
    Update(NewFile),
    Delete { path: String },
    Rename { path: String, new_name: String },
    Copy { src_path: String, dest_path: String },
}

impl ChangeOp {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Insert(_) => ChangeKind::Insert,
            Self::Update(_) => ChangeKind::Update,
            Self::Delete { .. } => ChangeKind::Delete,
            Self::Rename { .. } => ChangeKind::Rename,
            Self::Copy { .. } => ChangeKind::Copy,
        }
    }

    /// The path the operation targets (the source path for copies).
    pub fn path(&self) -> &str {
        match self {
            Self::Insert(file) | Self::Update(file) => &file.path,
            Self::Delete { path } | Self::Rename { path, .. } => path,
            Self::Copy { src_path, .. } => src_path,
        }
    }
}

/// One staged operation together with its signed size contribution.
///
/// Inserts contribute the new size, updates the size difference, deletes
/// the negated size, renames zero, and copies the size of the copied
/// subtree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationChange {
    pub size: i64,
    pub op: ChangeOp,
}

impl AllocationChange {
    pub fn new(op: ChangeOp, size: i64) -> Self {
        Self { size, op }
    }

    pub fn kind(&self) -> ChangeKind {
        self.op.kind()
    }
}
