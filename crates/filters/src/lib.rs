#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `mirror_filters` evaluates the exclude patterns attached to an `oc-mirror`
//! sync. Patterns use the rsync-filter subset the daemon documents: `?`
//! matches one non-slash character, `*` one path segment, `**` any suffix, a
//! leading `/` anchors the pattern at the sync root, and a trailing `/`
//! matches the directory itself and everything under it. All other filter
//! metacharacters are taken literally.
//!
//! # Design
//!
//! - [`Excludes`] owns an ordered list of `(original pattern, compiled
//!   matcher)` pairs. Order is preserved for status reporting; matching is
//!   first-hit since every rule is an exclusion.
//! - Compilation lowers each pattern onto [`globset`] with
//!   `literal_separator` enabled, which yields exactly the documented `?`,
//!   `*` and `**` semantics. Bracket and brace metacharacters are escaped
//!   beforehand so they stay literal.
//! - Paths are tested as sync-root-relative strings in which directories
//!   carry a trailing slash; the trailing slash decides whether
//!   directory-only rules may match directly.
//!
//! # Errors
//!
//! [`Excludes::add`] reports [`ExcludeError::Pattern`] when a pattern cannot
//! be compiled, carrying the offending text. [`Excludes::load_file`] adds
//! [`ExcludeError::File`] for I/O failures; the daemon treats those as fatal
//! at configuration load.
//!
//! # Examples
//!
//! ```
//! use mirror_filters::Excludes;
//!
//! let mut excludes = Excludes::new();
//! excludes.add("*.tmp").unwrap();
//! excludes.add("/cache/").unwrap();
//!
//! assert!(excludes.test("note.tmp"));
//! assert!(excludes.test("deep/nested/note.tmp"));
//! assert!(excludes.test("cache/"));
//! assert!(excludes.test("cache/blob"));
//! assert!(!excludes.test("note.txt"));
//! ```

use std::fmt;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use thiserror::Error;

/// Error produced while building or loading exclude rules.
#[derive(Debug, Error)]
pub enum ExcludeError {
    /// The pattern could not be compiled into a matcher.
    #[error("failed to compile exclude pattern '{pattern}': {source}")]
    Pattern {
        /// Original pattern text as supplied by the user.
        pattern: String,
        /// Underlying glob compilation failure.
        source: globset::Error,
    },
    /// The pattern was empty after stripping its anchors.
    #[error("exclude pattern '{pattern}' has no content")]
    Empty {
        /// Original pattern text as supplied by the user.
        pattern: String,
    },
    /// An exclude file could not be read.
    #[error("failed to read exclude file {path:?}: {source}")]
    File {
        /// Path of the unreadable file.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
}

/// Ordered set of exclusion patterns for one sync.
#[derive(Debug, Default)]
pub struct Excludes {
    rules: Vec<ExcludeRule>,
}

impl Excludes {
    /// Creates an empty exclude set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles `pattern` and appends it. Adding a pattern that is already
    /// present is a no-op.
    pub fn add(&mut self, pattern: &str) -> Result<(), ExcludeError> {
        if self.rules.iter().any(|rule| rule.pattern == pattern) {
            tracing::debug!("exclude already present: {pattern}");
            return Ok(());
        }
        let matcher = CompiledPattern::new(pattern)?;
        self.rules.push(ExcludeRule {
            pattern: pattern.to_string(),
            matcher,
        });
        Ok(())
    }

    /// Removes a pattern by its original text. Removing an absent pattern
    /// logs a warning and leaves the set unchanged.
    pub fn remove(&mut self, pattern: &str) {
        match self.rules.iter().position(|rule| rule.pattern == pattern) {
            Some(index) => {
                self.rules.remove(index);
            }
            None => {
                tracing::warn!("cannot remove exclude, not in list: {pattern}");
            }
        }
    }

    /// Loads patterns from a file, one per line. Lines starting with `+` are
    /// not supported and skipped; leading whitespace and a leading `-` are
    /// stripped; blank lines are ignored.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ExcludeError> {
        let file = std::fs::File::open(path).map_err(|source| ExcludeError::File {
            path: path.to_path_buf(),
            source,
        })?;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|source| ExcludeError::File {
                path: path.to_path_buf(),
                source,
            })?;
            let mut text = line.trim_start();
            if text.starts_with('+') {
                tracing::warn!("'+' filter rules are not supported, skipped: {text}");
                continue;
            }
            if let Some(rest) = text.strip_prefix('-') {
                text = rest.trim_start();
            }
            let text = text.trim_end();
            if text.is_empty() {
                continue;
            }
            self.add(text)?;
        }
        Ok(())
    }

    /// Tests a sync-root-relative path (directories carry a trailing slash)
    /// against the set. True when any pattern matches.
    #[must_use]
    pub fn test(&self, relative: &str) -> bool {
        let is_dir = relative.ends_with('/');
        let trimmed = relative.trim_end_matches('/');
        let path = Path::new(trimmed);
        self.rules
            .iter()
            .any(|rule| rule.matcher.matches(path, is_dir))
    }

    /// Returns the original pattern texts in insertion order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| rule.pattern.as_str())
    }

    /// Number of patterns in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Reports whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Debug)]
struct ExcludeRule {
    pattern: String,
    matcher: CompiledPattern,
}

#[derive(Debug)]
struct CompiledPattern {
    directory_only: bool,
    direct: GlobMatcher,
    descendants: Option<GlobMatcher>,
}

impl CompiledPattern {
    fn new(pattern: &str) -> Result<Self, ExcludeError> {
        let anchored = pattern.starts_with('/');
        let directory_only = pattern.ends_with('/');
        let mut core = pattern;
        if anchored {
            core = &core[1..];
        }
        if directory_only && !core.is_empty() {
            core = &core[..core.len() - 1];
        }
        if core.is_empty() {
            return Err(ExcludeError::Empty {
                pattern: pattern.to_string(),
            });
        }

        let escaped = escape_literal_metacharacters(core);
        let direct_pattern = if anchored {
            escaped.clone()
        } else {
            format!("**/{escaped}")
        };
        let direct = compile_glob(&direct_pattern, pattern)?;
        let descendants = if directory_only {
            Some(compile_glob(&format!("{direct_pattern}/**"), pattern)?)
        } else {
            None
        };

        Ok(Self {
            directory_only,
            direct,
            descendants,
        })
    }

    fn matches(&self, path: &Path, is_dir: bool) -> bool {
        if self.direct.is_match(path) && (!self.directory_only || is_dir) {
            return true;
        }
        self.descendants
            .as_ref()
            .is_some_and(|matcher| matcher.is_match(path))
    }
}

fn compile_glob(glob: &str, original: &str) -> Result<GlobMatcher, ExcludeError> {
    GlobBuilder::new(glob)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|source| ExcludeError::Pattern {
            pattern: original.to_string(),
            source,
        })
}

/// Escapes the glob metacharacters the filter grammar takes literally,
/// leaving `*`, `**` and `?` active.
fn escape_literal_metacharacters(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for ch in pattern.chars() {
        if matches!(ch, '[' | ']' | '{' | '}' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

impl fmt::Display for Excludes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rule in &self.rules {
            writeln!(f, "{}", rule.pattern)?;
        }
        Ok(())
    }
}
