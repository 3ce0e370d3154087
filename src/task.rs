//! Input normalization and per-file path resolution.

use std::path::{Component, Path, PathBuf};

// =============================================================================
// Stylesheets - normalized input list
// =============================================================================

/// Ordered list of stylesheet entries to render.
///
/// Built from a single path or any sequence of paths, so callers can pass
/// `"main.scss"` and `["a.scss", "b.scss"]` alike.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stylesheets(Vec<PathBuf>);

impl Stylesheets {
    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there is nothing to render.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the entries in input order.
    pub fn iter(&self) -> std::slice::Iter<'_, PathBuf> {
        self.0.iter()
    }

    /// Take the entries.
    pub fn into_inner(self) -> Vec<PathBuf> {
        self.0
    }
}

impl From<&str> for Stylesheets {
    fn from(path: &str) -> Self {
        Self(vec![PathBuf::from(path)])
    }
}

impl From<String> for Stylesheets {
    fn from(path: String) -> Self {
        Self(vec![PathBuf::from(path)])
    }
}

impl From<&Path> for Stylesheets {
    fn from(path: &Path) -> Self {
        Self(vec![path.to_path_buf()])
    }
}

impl From<PathBuf> for Stylesheets {
    fn from(path: PathBuf) -> Self {
        Self(vec![path])
    }
}

impl<P: Into<PathBuf>> From<Vec<P>> for Stylesheets {
    fn from(paths: Vec<P>) -> Self {
        paths.into_iter().collect()
    }
}

impl<P: Into<PathBuf>, const N: usize> From<[P; N]> for Stylesheets {
    fn from(paths: [P; N]) -> Self {
        paths.into_iter().collect()
    }
}

impl<P: AsRef<Path>> From<&[P]> for Stylesheets {
    fn from(paths: &[P]) -> Self {
        Self(paths.iter().map(|p| p.as_ref().to_path_buf()).collect())
    }
}

impl<P: Into<PathBuf>> FromIterator<P> for Stylesheets {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl IntoIterator for Stylesheets {
    type Item = PathBuf;
    type IntoIter = std::vec::IntoIter<PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// =============================================================================
// StylesheetTask - one compile-and-write unit
// =============================================================================

/// Source and destination of a single compile-and-write cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylesheetTask {
    source: PathBuf,
    dest: PathBuf,
}

impl StylesheetTask {
    /// Resolve an input entry against the source and destination roots.
    ///
    /// Rooted entries are reinterpreted relative to `src`: `/project/a.scss`
    /// under `src = /project` becomes `a.scss`, and any other rooted path has
    /// its root stripped, so `/foo/bar.styl` becomes `foo/bar.styl`.
    /// The destination mirrors the relative layout under `dest` with its
    /// extension replaced by `.css`.
    pub fn resolve(src: &Path, dest: &Path, entry: &Path) -> Self {
        let relative = source_relative(src, entry);
        Self {
            source: src.join(&relative),
            dest: css_path(&dest.join(&relative)),
        }
    }

    /// Path the source text is read from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Path the compiled CSS is written to.
    pub fn dest(&self) -> &Path {
        &self.dest
    }
}

fn source_relative(src: &Path, entry: &Path) -> PathBuf {
    if !entry.has_root() {
        return entry.to_path_buf();
    }
    if let Ok(inner) = entry.strip_prefix(src) {
        return inner.to_path_buf();
    }
    entry
        .components()
        .filter(|c| !matches!(c, Component::Prefix(_) | Component::RootDir))
        .collect()
}

/// Replace a trailing `.<word characters>` extension with `.css`.
///
/// Only ASCII letters, digits and `_` count as word characters, so
/// `foo.tar-gz` and extensionless names are left untouched.
pub fn css_path(path: &Path) -> PathBuf {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return path.to_path_buf();
    };
    let Some(dot) = name.rfind('.') else {
        return path.to_path_buf();
    };
    let ext = &name[dot + 1..];
    if ext.is_empty() || !ext.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return path.to_path_buf();
    }
    path.with_file_name(format!("{}.css", &name[..dot]))
}
