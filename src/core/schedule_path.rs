//! Schedule paths: the causal chain of nested `schedule` calls.
//!
//! When capture is enabled, every scheduled unit carries the path of
//! scheduling calls that led to it. A unit scheduled from inside another
//! unit's `work()` extends its parent's path. On failure the engine turns the
//! path into a [`Trace`] chain, so an observer can walk from a deeply nested
//! failure back to the outermost call that started it.

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One scheduling call in a [`SchedulePath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathEntry {
    /// Id of the scheduled unit.
    pub id: String,
    /// Queue category the unit was routed to.
    pub category: String,
    /// Human-readable title of the unit.
    pub title: String,
}

impl PathEntry {
    /// Build an entry.
    pub fn new(
        id: impl Into<String>,
        category: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            title: title.into(),
        }
    }
}

impl fmt::Display for PathEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]({})", self.title, self.id, self.category)
    }
}

/// Ordered, append-only chain from the outermost scheduling call to the
/// current one. Empty when capture was disabled at scheduling time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchedulePath {
    entries: Vec<PathEntry>,
}

impl SchedulePath {
    /// Path for a top-level scheduling call.
    #[must_use]
    pub fn root(entry: PathEntry) -> Self {
        Self {
            entries: vec![entry],
        }
    }

    /// New path with `entry` appended; `self` is left untouched.
    #[must_use]
    pub fn extend(&self, entry: PathEntry) -> Self {
        let mut entries = Vec::with_capacity(self.entries.len() + 1);
        entries.extend_from_slice(&self.entries);
        entries.push(entry);
        Self { entries }
    }

    /// The path of the enclosing scheduling call, if any.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.entries.len() < 2 {
            return None;
        }
        Some(Self {
            entries: self.entries[..self.entries.len() - 1].to_vec(),
        })
    }

    /// The innermost scheduling call.
    #[must_use]
    pub fn leaf(&self) -> Option<&PathEntry> {
        self.entries.last()
    }

    /// All entries, outermost first.
    #[must_use]
    pub fn entries(&self) -> &[PathEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for SchedulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return write!(f, "<not captured>");
        }
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, " > ")?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

/// Synthetic error whose cause chain mirrors a [`SchedulePath`].
///
/// `source()` of a trace is the trace of the parent path, so walking the
/// standard error chain ends at the outermost scheduling call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    path: SchedulePath,
    cause: Option<Box<Trace>>,
}

impl Trace {
    /// Build the trace chain for `path`. Returns `None` for an empty path.
    #[must_use]
    pub fn from_path(path: &SchedulePath) -> Option<Self> {
        if path.is_empty() {
            return None;
        }
        Some(Self {
            path: path.clone(),
            cause: path.parent().as_ref().and_then(Self::from_path).map(Box::new),
        })
    }

    /// The schedule path this trace level stands for.
    #[must_use]
    pub const fn path(&self) -> &SchedulePath {
        &self.path
    }

    /// The enclosing scheduling call's trace.
    #[must_use]
    pub fn cause(&self) -> Option<&Self> {
        self.cause.as_deref()
    }

    /// The outermost trace in the chain.
    #[must_use]
    pub fn root(&self) -> &Self {
        let mut current = self;
        while let Some(cause) = current.cause() {
            current = cause;
        }
        current
    }

    /// Number of trace levels in the chain (including this one).
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self.cause().map_or(0, Self::depth)
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scheduled via {}", self.path)
    }
}

impl Error for Trace {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> PathEntry {
        PathEntry::new(id, "default", format!("title-{id}"))
    }

    #[test]
    fn test_extend_keeps_original() {
        let root = SchedulePath::root(entry("a"));
        let child = root.extend(entry("b"));
        assert_eq!(root.len(), 1);
        assert_eq!(child.len(), 2);
        assert_eq!(child.parent(), Some(root.clone()));
        assert_eq!(child.leaf().map(|e| e.id.as_str()), Some("b"));
        assert_eq!(root.parent(), None);
    }

    #[test]
    fn test_trace_chain_walks_to_root() {
        let root = SchedulePath::root(entry("a"));
        let leaf = root.extend(entry("b")).extend(entry("c"));
        let trace = Trace::from_path(&leaf).unwrap();

        assert_eq!(trace.path(), &leaf);
        assert_eq!(trace.depth(), 3);
        assert_eq!(trace.root().path(), &root);

        let mut levels = 0;
        let mut current: Option<&(dyn Error + 'static)> = Some(&trace);
        while let Some(err) = current {
            levels += 1;
            current = err.source();
        }
        assert_eq!(levels, 3);
    }

    #[test]
    fn test_empty_path_has_no_trace() {
        assert!(Trace::from_path(&SchedulePath::default()).is_none());
        assert_eq!(SchedulePath::default().to_string(), "<not captured>");
    }
}
