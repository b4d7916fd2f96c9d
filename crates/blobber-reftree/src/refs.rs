//! Flat, paginated listings of references.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use blobber_types::Timestamp;

use crate::error::{TreeError, TreeResult};
use crate::node::{RefNode, RefType};
use crate::path;
use crate::tree::ReferenceTree;

/// Which population of references a listing walks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    /// Live references, ordered by path.
    Regular,
    /// Live references ordered by last update.
    Updated,
    /// Deleted files, ordered by deletion time.
    Deleted,
}

impl FromStr for RefKind {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(Self::Regular),
            "updated" => Ok(Self::Updated),
            "deleted" => Ok(Self::Deleted),
            other => Err(TreeError::InvalidPath(format!(
                "ref kind should be regular/updated/deleted, got {other}"
            ))),
        }
    }
}

/// Cursor and filters for [`ReferenceTree::refs`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefsQuery {
    pub path: String,
    pub kind: RefKind,
    /// Return references strictly after this path (within equal dates for
    /// date-ordered kinds).
    pub offset_path: Option<String>,
    pub offset_date: Option<Timestamp>,
    /// Only references updated strictly after this instant.
    pub updated_date: Option<Timestamp>,
    pub file_type: Option<RefType>,
    /// Only references at exactly this depth; `0` means any depth.
    pub level: usize,
    pub page_limit: usize,
}

impl RefsQuery {
    pub fn new(path: impl Into<String>, kind: RefKind, page_limit: usize) -> Self {
        Self {
            path: path.into(),
            kind,
            offset_path: None,
            offset_date: None,
            updated_date: None,
            file_type: None,
            level: 0,
            page_limit,
        }
    }
}

/// One page of references plus the cursor for the next page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefsPage {
    pub refs: Vec<RefNode>,
    pub total_pages: usize,
    pub offset_path: Option<String>,
    pub offset_date: Option<Timestamp>,
}

impl ReferenceTree {
    pub fn refs(&self, query: &RefsQuery) -> TreeResult<RefsPage> {
        let scope = path::normalize(&query.path)?;
        let limit = query.page_limit.max(1);

        let mut candidates: Vec<&RefNode> = match query.kind {
            RefKind::Regular | RefKind::Updated => self
                .nodes()
                .filter(|n| path::is_within(&n.path, &scope))
                .filter(|n| query.file_type.map_or(true, |t| n.ref_type == t))
                .filter(|n| query.level == 0 || n.level == query.level)
                .collect(),
            RefKind::Deleted => self.deleted.iter().collect(),
        };
        if let Some(since) = query.updated_date {
            if query.kind != RefKind::Regular {
                candidates.retain(|n| n.updated_at > since);
            }
        }

        match query.kind {
            RefKind::Regular => candidates.sort_by(|a, b| a.path.cmp(&b.path)),
            RefKind::Updated | RefKind::Deleted => {
                candidates.sort_by(|a, b| (a.updated_at, &a.path).cmp(&(b.updated_at, &b.path)))
            }
        }
        let total_pages = candidates.len().div_ceil(limit);

        // A bare path cursor on a date-ordered listing resumes after that
        // reference's own position.
        let offset_date = match (query.kind, &query.offset_path, query.offset_date) {
            (RefKind::Updated | RefKind::Deleted, Some(offset), None) => Some(
                candidates
                    .iter()
                    .find(|n| n.path == *offset)
                    .map(|n| n.updated_at)
                    .ok_or_else(|| {
                        TreeError::InvalidPath(format!("offset path {offset} is not in the listing"))
                    })?,
            ),
            _ => query.offset_date,
        };
        let after_cursor = |n: &&RefNode| match (query.kind, &query.offset_path, offset_date) {
            (RefKind::Regular, Some(offset), _) => n.path.as_str() > offset.as_str(),
            (_, offset_path, Some(date)) => {
                let offset = offset_path.as_deref().unwrap_or("");
                (n.updated_at, n.path.as_str()) > (date, offset)
            }
            _ => true,
        };
        let refs: Vec<RefNode> = candidates
            .into_iter()
            .filter(after_cursor)
            .take(limit)
            .cloned()
            .collect();

        let (offset_path, offset_date) = match refs.last() {
            Some(last) => (Some(last.path.clone()), Some(last.updated_at)),
            None => (query.offset_path.clone(), offset_date),
        };
        Ok(RefsPage {
            refs,
            total_pages,
            offset_path,
            offset_date: if query.kind == RefKind::Regular {
                None
            } else {
                offset_date
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{AllocationChange, ChangeOp};
    use crate::node::NewFile;
    use blobber_types::Digest;

    fn file(p: &str) -> NewFile {
        NewFile {
            path: p.into(),
            content_hash: Digest::of(p.as_bytes()),
            merkle_root: Digest::of(b"m"),
            size: 1,
            thumbnail_hash: None,
            thumbnail_size: 0,
            mime_type: String::new(),
        }
    }

    fn sample_tree() -> ReferenceTree {
        let mut tree = ReferenceTree::new("alloc", 64);
        for (i, p) in ["/a/1", "/a/2", "/b", "/c/d/3"].iter().enumerate() {
            tree.apply_change(
                &AllocationChange::new(ChangeOp::Insert(file(p)), 1),
                Timestamp::from_secs(10 + i as i64),
            )
            .unwrap();
        }
        tree
    }

    fn paths(page: &RefsPage) -> Vec<&str> {
        page.refs.iter().map(|n| n.path.as_str()).collect()
    }

    #[test]
    fn regular_pages_follow_path_cursor() {
        let tree = sample_tree();
        let mut query = RefsQuery::new("/", RefKind::Regular, 3);
        query.file_type = Some(RefType::File);

        let first = tree.refs(&query).unwrap();
        assert_eq!(paths(&first), vec!["/a/1", "/a/2", "/b"]);
        assert_eq!(first.total_pages, 2);
        assert_eq!(first.offset_date, None);

        query.offset_path = first.offset_path.clone();
        let second = tree.refs(&query).unwrap();
        assert_eq!(paths(&second), vec!["/c/d/3"]);
    }

    #[test]
    fn regular_respects_scope_and_level() {
        let tree = sample_tree();
        let mut query = RefsQuery::new("/a", RefKind::Regular, 100);
        let scoped = tree.refs(&query).unwrap();
        assert_eq!(paths(&scoped), vec!["/a", "/a/1", "/a/2"]);

        query.path = "/".into();
        query.level = 1;
        let top = tree.refs(&query).unwrap();
        assert_eq!(paths(&top), vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn updated_orders_by_date_and_filters() {
        let tree = sample_tree();
        let mut query = RefsQuery::new("/", RefKind::Updated, 2);
        query.file_type = Some(RefType::File);
        query.updated_date = Some(Timestamp::from_secs(10));

        let first = tree.refs(&query).unwrap();
        assert_eq!(paths(&first), vec!["/a/2", "/b"]);
        assert_eq!(first.offset_date, Some(Timestamp::from_secs(12)));

        query.offset_date = first.offset_date;
        query.offset_path = first.offset_path.clone();
        let second = tree.refs(&query).unwrap();
        assert_eq!(paths(&second), vec!["/c/d/3"]);
    }

    #[test]
    fn updated_resumes_from_path_alone() {
        let tree = sample_tree();
        let mut query = RefsQuery::new("/", RefKind::Updated, 10);
        query.file_type = Some(RefType::File);
        query.offset_path = Some("/a/2".into());

        let page = tree.refs(&query).unwrap();
        assert_eq!(paths(&page), vec!["/b", "/c/d/3"]);
        assert_eq!(page.offset_date, Some(Timestamp::from_secs(13)));

        query.offset_path = Some("/missing".into());
        assert!(matches!(tree.refs(&query), Err(TreeError::InvalidPath(_))));
    }

    #[test]
    fn deleted_lists_tombstones() {
        let mut tree = sample_tree();
        tree.apply_change(
            &AllocationChange::new(ChangeOp::Delete { path: "/a".into() }, -2),
            Timestamp::from_secs(50),
        )
        .unwrap();
        let page = tree
            .refs(&RefsQuery::new("/", RefKind::Deleted, 10))
            .unwrap();
        assert_eq!(paths(&page), vec!["/a/1", "/a/2"]);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn kind_parses() {
        assert_eq!("updated".parse::<RefKind>().unwrap(), RefKind::Updated);
        assert!("bogus".parse::<RefKind>().is_err());
    }
}
