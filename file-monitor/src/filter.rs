//! File filters restricting which entries an observer tracks.

use std::path::{Path, PathBuf};

use crate::error::{MonitorError, Result};

/// Predicate deciding whether a path is listed and tracked.
///
/// Any `Fn(&Path) -> bool + Send + Sync` closure is a filter.
pub trait FileFilter: Send + Sync {
    /// Return `true` to track `path`.
    fn accept(&self, path: &Path) -> bool;
}

impl<F> FileFilter for F
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    fn accept(&self, path: &Path) -> bool {
        self(path)
    }
}

/// Filter rejecting every path matching one of a set of glob patterns.
///
/// With a base directory set, patterns are matched against the path relative
/// to it, so `**/tmp/**` does not reject a tree that itself lives under `/tmp`.
#[derive(Debug, Clone, Default)]
pub struct GlobFilter {
    patterns: Vec<glob::Pattern>,
    base: Option<PathBuf>,
}

impl GlobFilter {
    /// Build a filter from exclude patterns such as `**/.git/**` or `**/*.tmp`.
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                glob::Pattern::new(pattern)
                    .map_err(|e| MonitorError::InvalidPattern(format!("{pattern}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            patterns,
            base: None,
        })
    }

    /// Match patterns against paths relative to `base`.
    pub fn relative_to(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// The compiled patterns.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(glob::Pattern::as_str)
    }

    /// Check if a path should be excluded.
    pub fn should_exclude(&self, path: &Path) -> bool {
        let path = self
            .base
            .as_deref()
            .and_then(|base| path.strip_prefix(base).ok())
            .unwrap_or(path);
        let path_str = path.to_string_lossy();
        self.patterns.iter().any(|glob| glob.matches(&path_str))
    }
}

impl FileFilter for GlobFilter {
    fn accept(&self, path: &Path) -> bool {
        !self.should_exclude(path)
    }
}
