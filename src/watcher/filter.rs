//! Path admission rules for swept media.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::config::absolute_path;
use crate::Result;

/// Known media extensions and their MIME types.
const MEDIA_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("heic", "image/heic"),
    ("heif", "image/heif"),
    ("bmp", "image/bmp"),
    ("dng", "image/x-adobe-dng"),
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mov", "video/quicktime"),
    ("3gp", "video/3gpp"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
];

/// Why a path was turned away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The path lies under our own output root.
    OwnOutput,
    /// The path is outside every watched root.
    OutsideWatched,
    /// The path matched an exclusion pattern.
    Excluded { pattern: String },
}

/// Result of running a path through the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The path may be dispatched.
    Admitted,
    /// The path must be skipped.
    Rejected(RejectReason),
}

impl Admission {
    /// Whether the path was admitted.
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

/// Immutable admission rules.
///
/// Evaluation never touches the filesystem, so the same path always gets the
/// same answer from the same filter.
#[derive(Debug)]
pub struct PathFilter {
    output_root: PathBuf,
    roots: Vec<PathBuf>,
    excludes: Option<Gitignore>,
    sidecar_extensions: Vec<String>,
}

/// Builder for [`PathFilter`].
#[derive(Debug)]
pub struct PathFilterBuilder {
    output_root: PathBuf,
    roots: Vec<PathBuf>,
    excludes: Vec<String>,
    sidecar_extensions: Vec<String>,
}

impl PathFilterBuilder {
    /// Limit admission to these roots. No roots means everything is in scope.
    #[must_use]
    pub fn roots(mut self, roots: impl IntoIterator<Item = PathBuf>) -> Self {
        self.roots.extend(roots);
        self
    }

    /// Add gitignore-style exclusion lines. `!pattern` re-includes.
    #[must_use]
    pub fn excludes<'a>(mut self, patterns: impl IntoIterator<Item = &'a str>) -> Self {
        self.excludes.extend(patterns.into_iter().map(String::from));
        self
    }

    /// Extensions reported by [`PathFilter::sidecars`].
    #[must_use]
    pub fn sidecars<'a>(mut self, extensions: impl IntoIterator<Item = &'a str>) -> Self {
        self.sidecar_extensions.extend(
            extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_string()),
        );
        self
    }

    /// Compile the rules. Relative roots resolve against the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if an exclusion pattern is invalid or a root cannot be
    /// resolved.
    pub fn build(self) -> Result<PathFilter> {
        let output_root = absolute_path(&self.output_root)?;
        let roots = self
            .roots
            .iter()
            .map(|root| absolute_path(root))
            .collect::<Result<Vec<_>>>()?;

        let excludes = if self.excludes.is_empty() {
            None
        } else {
            let mut builder = GitignoreBuilder::new("/");
            for pattern in &self.excludes {
                builder
                    .add_line(None, pattern)
                    .map_err(|e| crate::Error::config(format!("invalid pattern '{pattern}': {e}")))?;
            }
            Some(builder.build().map_err(|e| {
                crate::Error::config(format!("failed to build exclusion rules: {e}"))
            })?)
        };

        Ok(PathFilter {
            output_root,
            roots,
            excludes,
            sidecar_extensions: self.sidecar_extensions,
        })
    }
}

impl PathFilter {
    /// Start building a filter that protects `output_root`.
    pub fn builder(output_root: impl Into<PathBuf>) -> PathFilterBuilder {
        PathFilterBuilder {
            output_root: output_root.into(),
            roots: Vec::new(),
            excludes: Vec::new(),
            sidecar_extensions: Vec::new(),
        }
    }

    /// Root of the files we produce ourselves.
    #[must_use]
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Whether `path` is one of our own output files.
    ///
    /// Compared component-wise on absolute paths, so `/data/output2` is not
    /// under `/data/output`.
    #[must_use]
    pub fn is_own_output(&self, path: &Path) -> bool {
        resolve(path).starts_with(&self.output_root)
    }

    /// Decide whether `path` may be dispatched.
    #[must_use]
    pub fn admit(&self, path: &Path) -> Admission {
        let path: &Path = &resolve(path);

        if path.starts_with(&self.output_root) {
            return Admission::Rejected(RejectReason::OwnOutput);
        }

        if !self.roots.is_empty() && !self.roots.iter().any(|root| path.starts_with(root)) {
            return Admission::Rejected(RejectReason::OutsideWatched);
        }

        if let Some(pattern) = self.excluded_by(path) {
            return Admission::Rejected(RejectReason::Excluded { pattern });
        }

        Admission::Admitted
    }

    /// The most specific exclusion that applies, checking the file and then
    /// each parent directory. A whitelist match stops the search.
    fn excluded_by(&self, path: &Path) -> Option<String> {
        let rules = self.excludes.as_ref()?;
        let mut is_dir = false;

        for candidate in path.ancestors() {
            if candidate.parent().is_none() {
                break;
            }

            let matched = rules.matched(candidate, is_dir);
            if matched.is_whitelist() {
                return None;
            }
            if let ignore::Match::Ignore(glob) = matched {
                return Some(glob.original().to_string());
            }

            is_dir = true;
        }

        None
    }

    /// Existing sidecar files for `path` (same stem, configured extension).
    #[must_use]
    pub fn sidecars(&self, path: &Path) -> Vec<PathBuf> {
        self.sidecar_extensions
            .iter()
            .map(|ext| path.with_extension(ext))
            .filter(|candidate| candidate != path && candidate.is_file())
            .collect()
    }

    /// MIME type for a media file, based on extension.
    #[must_use]
    pub fn detect_mime(path: &Path) -> Option<&'static str> {
        path.extension().and_then(|e| e.to_str()).and_then(|ext| {
            let ext = ext.to_lowercase();
            MEDIA_TYPES
                .iter()
                .find(|(e, _)| *e == ext)
                .map(|(_, mime)| *mime)
        })
    }

    /// Whether a path looks like a media file.
    #[must_use]
    pub fn is_media_file(path: &Path) -> bool {
        Self::detect_mime(path).is_some()
    }
}

fn resolve(path: &Path) -> Cow<'_, Path> {
    if path.is_absolute() {
        return Cow::Borrowed(path);
    }
    std::path::absolute(path).map_or(Cow::Borrowed(path), Cow::Owned)
}
