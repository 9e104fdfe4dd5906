//! What a handle currently believes about its key.
//!
//! The store hands back several differently shaped answers for the same key
//! (a single-object fetch, a listing entry, a write acknowledgement). Each
//! shape gets its own variant so the handle can serve whatever it already
//! knows and only go back to the store for what is missing.

use crate::cadapter::client::{ObjectMeta, ObjectSummary, PutAck};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug)]
pub(crate) enum Node {
    /// Pseudo-directory: a shared key prefix, never a remote entity.
    Directory,
    /// Result of a single-object fetch. `content` is absent when only the
    /// metadata was requested.
    Metadata {
        meta: ObjectMeta,
        content: Option<Bytes>,
    },
    ListingSummary(ObjectSummary),
    UpdatedObject(PutAck),
    /// Existence not determined yet.
    Unknown,
    /// Confirmed absent.
    NewObject,
}

/// Public tag of the cached state, for diagnostics and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Directory,
    Metadata,
    ListingSummary,
    UpdatedObject,
    Unknown,
    NewObject,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Directory => "Directory",
            NodeKind::Metadata => "Metadata",
            NodeKind::ListingSummary => "ListingSummary",
            NodeKind::UpdatedObject => "UpdatedObject",
            NodeKind::Unknown => "Unknown",
            NodeKind::NewObject => "NewObject",
        }
    }

    /// True for the three states that stand for an existing object.
    pub fn is_object(&self) -> bool {
        matches!(
            self,
            NodeKind::Metadata | NodeKind::ListingSummary | NodeKind::UpdatedObject
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Node {
    pub(crate) fn kind(&self) -> NodeKind {
        match self {
            Node::Directory => NodeKind::Directory,
            Node::Metadata { .. } => NodeKind::Metadata,
            Node::ListingSummary(_) => NodeKind::ListingSummary,
            Node::UpdatedObject(_) => NodeKind::UpdatedObject,
            Node::Unknown => NodeKind::Unknown,
            Node::NewObject => NodeKind::NewObject,
        }
    }

    pub(crate) fn is_object(&self) -> bool {
        self.kind().is_object()
    }

    pub(crate) fn exists(&self) -> bool {
        matches!(self, Node::Directory) || self.is_object()
    }

    pub(crate) fn etag(&self) -> Option<String> {
        match self {
            Node::Metadata { meta, .. } => Some(meta.etag.clone()),
            Node::ListingSummary(s) => Some(s.etag.clone()),
            Node::UpdatedObject(ack) => ack.etag.clone(),
            _ => None,
        }
    }

    pub(crate) fn size(&self) -> Option<u64> {
        match self {
            Node::Metadata { meta, .. } => Some(meta.size),
            Node::ListingSummary(s) => Some(s.size),
            Node::UpdatedObject(ack) => ack.size,
            _ => None,
        }
    }

    pub(crate) fn last_modified(&self) -> Option<DateTime<Utc>> {
        match self {
            Node::Metadata { meta, .. } => Some(meta.last_modified),
            Node::ListingSummary(s) => Some(s.last_modified),
            Node::UpdatedObject(ack) => ack.last_modified,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> ObjectSummary {
        ObjectSummary {
            key: "colors/red.txt".into(),
            etag: "abc".into(),
            size: 3,
            last_modified: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_object_states_answer_from_own_fields() {
        let node = Node::ListingSummary(summary());
        assert!(node.exists());
        assert!(node.is_object());
        assert_eq!(node.etag().as_deref(), Some("abc"));
        assert_eq!(node.size(), Some(3));
        assert_eq!(node.last_modified().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_partial_ack_leaves_gaps() {
        let node = Node::UpdatedObject(PutAck {
            etag: Some("e".into()),
            size: None,
            last_modified: None,
        });
        assert_eq!(node.etag().as_deref(), Some("e"));
        assert!(node.size().is_none());
        assert!(node.last_modified().is_none());
        assert_eq!(node.kind(), NodeKind::UpdatedObject);
    }

    #[test]
    fn test_non_object_states() {
        assert!(Node::Directory.exists());
        assert!(!Node::Directory.is_object());
        assert!(!Node::NewObject.exists());
        assert!(!Node::Unknown.is_object());
        assert_eq!(Node::Unknown.kind().to_string(), "Unknown");
        assert!(Node::Directory.etag().is_none());
    }
}
