//! Allocation path helpers. Paths are absolute, `/`-separated, and never end
//! in a slash except for the root itself.

use crate::error::{TreeError, TreeResult};

pub const ROOT: &str = "/";

/// Canonicalize a client-supplied path.
///
/// Rejects empty input and `.`/`..` segments; collapses repeated slashes.
pub fn normalize(path: &str) -> TreeResult<String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(TreeError::InvalidPath(path.to_string()));
    }
    let mut out = String::with_capacity(trimmed.len() + 1);
    for segment in trimmed.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            return Err(TreeError::InvalidPath(path.to_string()));
        }
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    Ok(out)
}

/// Parent of a normalized path. The root is its own parent.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => ROOT,
        Some(idx) => &path[..idx],
    }
}

/// Last component of a normalized path (`/` for the root).
pub fn name(path: &str) -> &str {
    if path == ROOT {
        return ROOT;
    }
    path.rsplit('/').next().unwrap_or(path)
}

pub fn join(dir: &str, name: &str) -> String {
    if dir == ROOT {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Number of components below the root (`/` is level 0).
pub fn level(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

/// Every proper ancestor of `path`, root first.
pub fn ancestors(path: &str) -> Vec<String> {
    let mut out = vec![ROOT.to_string()];
    let mut current = String::new();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    for segment in segments.iter().take(segments.len().saturating_sub(1)) {
        current.push('/');
        current.push_str(segment);
        out.push(current.clone());
    }
    out
}

/// Returns `true` if `path` is `anchor` or lies below it.
pub fn is_within(path: &str, anchor: &str) -> bool {
    anchor == ROOT || path == anchor || path.starts_with(&format!("{anchor}/"))
}

pub fn validate_name(name: &str) -> TreeResult<()> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(TreeError::InvalidPath(name.to_string()));
    }
    Ok(())
}
