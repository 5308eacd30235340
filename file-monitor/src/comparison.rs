//! Name ordering used to match snapshot entries against a fresh listing.

use std::cmp::Ordering;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// How entry names are compared.
///
/// Two entries are considered the same node iff their names compare
/// [`Ordering::Equal`], so the comparison mode also decides whether a case-only
/// rename is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameComparison {
    /// Follow the host platform: case-insensitive on Windows, case-sensitive elsewhere.
    #[default]
    System,

    /// Compare names byte for byte.
    Sensitive,

    /// Compare names ignoring case.
    Insensitive,
}

impl NameComparison {
    /// Whether this mode compares case-sensitively on the current platform.
    pub fn is_case_sensitive(self) -> bool {
        match self {
            Self::System => !cfg!(windows),
            Self::Sensitive => true,
            Self::Insensitive => false,
        }
    }

    /// Compare two entry names.
    pub fn compare(self, a: &str, b: &str) -> Ordering {
        if self.is_case_sensitive() {
            a.cmp(b)
        } else {
            // Lowercase per char so mixed-case names interleave predictably.
            a.chars()
                .flat_map(char::to_lowercase)
                .cmp(b.chars().flat_map(char::to_lowercase))
        }
    }

    /// Compare the final components of two paths.
    pub fn compare_paths(self, a: &Path, b: &Path) -> Ordering {
        self.compare(&file_name(a), &file_name(b))
    }

    /// Sort paths by their final component.
    pub fn sort(self, paths: &mut [std::path::PathBuf]) {
        paths.sort_by(|a, b| self.compare_paths(a, b));
    }
}

/// Final component of `path` as a string, or the whole path for roots like `/`.
pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or(path.as_os_str())
        .to_string_lossy()
        .into_owned()
}
