//! Paths addressing containers inside a document.
//!
//! A path names a map or sequence container: map entries by key, sequence
//! elements by the [`OpId`] of the operation that inserted them. Element
//! segments stay valid under concurrent edits because they never refer to a
//! numeric index.

use crate::actor::OpId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A segment in a document path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PathSegment {
    /// A map key.
    Key(String),
    /// A sequence element, named by its inserting operation.
    Elem(OpId),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, "{}", k),
            PathSegment::Elem(id) => write!(f, "[{}]", id),
        }
    }
}

/// A path from the document root to a container.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Path(Vec<PathSegment>);

impl Path {
    /// The root path (the document's top-level map).
    pub fn root() -> Self {
        Path(Vec::new())
    }

    /// Create a path from segments.
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Path(segments)
    }

    /// Build a key-only path from dot notation (e.g. `"user.address"`).
    pub fn keys(path: &str) -> Self {
        if path.is_empty() {
            return Self::root();
        }
        Path(
            path.split('.')
                .map(|s| PathSegment::Key(s.to_string()))
                .collect(),
        )
    }

    /// The segments of this path.
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The parent path, or `None` at the root.
    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            None
        } else {
            Some(Path(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// The last segment, or `None` at the root.
    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    /// Extend with a map-key segment.
    pub fn child_key(&self, key: impl Into<String>) -> Path {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Key(key.into()));
        Path(segments)
    }

    /// Extend with a sequence-element segment.
    pub fn child_elem(&self, elem: OpId) -> Path {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Elem(elem));
        Path(segments)
    }

    /// Check whether `self` is `prefix` or lies underneath it.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "$");
        }
        let parts: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorId;

    #[test]
    fn test_root_path() {
        let root = Path::root();
        assert!(root.is_root());
        assert_eq!(root.parent(), None);
        assert_eq!(root.to_string(), "$");
    }

    #[test]
    fn test_keys_notation() {
        let path = Path::keys("user.address");
        assert_eq!(path.len(), 2);
        assert_eq!(path.last(), Some(&PathSegment::Key("address".to_string())));
        assert_eq!(path.parent(), Some(Path::keys("user")));
    }

    #[test]
    fn test_child_segments() {
        let elem = OpId::new(3, ActorId::generate());
        let path = Path::root().child_key("items").child_elem(elem);
        assert_eq!(path.len(), 2);
        assert_eq!(path.last(), Some(&PathSegment::Elem(elem)));
    }

    #[test]
    fn test_starts_with() {
        let base = Path::keys("a.b");
        let deeper = base.child_key("c");
        assert!(deeper.starts_with(&base));
        assert!(base.starts_with(&base));
        assert!(!base.starts_with(&deeper));
        assert!(deeper.starts_with(&Path::root()));
    }
}
