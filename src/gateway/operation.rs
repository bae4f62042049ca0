//! Operation kinds the gateway understands
//!
//! The wire carries the operation as a plain string; `OperationKind::parse`
//! turns it into this enum during validation so an unknown name ends up in
//! the result envelope instead of failing deserialization.

use std::fmt;

use serde::{Deserialize, Serialize};

/// All operations that can be dispatched to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    Find,
    FindOne,
    Count,
    CountDocuments,
    Aggregate,
    InsertOne,
    UpdateOne,
    UpdateMany,
    DeleteOne,
    DeleteMany,
}

/// Shape of the result an operation produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationCategory {
    Read,
    Count,
    Insert,
    Update,
    Delete,
}

impl OperationKind {
    /// Every kind, in declaration order
    pub const ALL: [OperationKind; 10] = [
        OperationKind::Find,
        OperationKind::FindOne,
        OperationKind::Count,
        OperationKind::CountDocuments,
        OperationKind::Aggregate,
        OperationKind::InsertOne,
        OperationKind::UpdateOne,
        OperationKind::UpdateMany,
        OperationKind::DeleteOne,
        OperationKind::DeleteMany,
    ];

    /// Parse the wire name (exact, case-sensitive)
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Find => "find",
            OperationKind::FindOne => "findOne",
            OperationKind::Count => "count",
            OperationKind::CountDocuments => "countDocuments",
            OperationKind::Aggregate => "aggregate",
            OperationKind::InsertOne => "insertOne",
            OperationKind::UpdateOne => "updateOne",
            OperationKind::UpdateMany => "updateMany",
            OperationKind::DeleteOne => "deleteOne",
            OperationKind::DeleteMany => "deleteMany",
        }
    }

    pub fn category(&self) -> OperationCategory {
        match self {
            OperationKind::Find | OperationKind::FindOne | OperationKind::Aggregate => {
                OperationCategory::Read
            }
            OperationKind::Count | OperationKind::CountDocuments => OperationCategory::Count,
            OperationKind::InsertOne => OperationCategory::Insert,
            OperationKind::UpdateOne | OperationKind::UpdateMany => OperationCategory::Update,
            OperationKind::DeleteOne | OperationKind::DeleteMany => OperationCategory::Delete,
        }
    }

    /// Whether the operation mutates the store
    pub fn is_write(&self) -> bool {
        matches!(
            self.category(),
            OperationCategory::Insert | OperationCategory::Update | OperationCategory::Delete
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
