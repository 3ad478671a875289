// src/sensor/patterns.rs

use std::path::Path;

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// Default ignore list: files still being written use a `.tmp` suffix and are
/// renamed into place when complete.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &["*.tmp"];

/// Compiled ignore patterns for a watched directory.
///
/// Patterns are matched case-insensitively against the full event path, and
/// `*` also crosses `/`, so `*.tmp` matches `/in/sub/partial.TMP`.
#[derive(Debug, Clone)]
pub struct IgnorePatterns {
    patterns: Vec<String>,
    set: GlobSet,
}

impl IgnorePatterns {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns: Vec<String> = patterns.iter().map(|p| p.as_ref().to_string()).collect();
        let set = build_globset(&patterns)?;
        Ok(Self { patterns, set })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        let s = path.to_string_lossy().replace('\\', "/");
        self.set.is_match(s.as_str())
    }
}

impl Default for IgnorePatterns {
    fn default() -> Self {
        // The default patterns are static and known to compile.
        Self::new(DEFAULT_IGNORE_PATTERNS).unwrap_or_else(|_| Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        })
    }
}

/// Build a case-insensitive GlobSet from simple string patterns.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = GlobBuilder::new(pat)
            .case_insensitive(true)
            .literal_separator(false)
            .build()
            .with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
