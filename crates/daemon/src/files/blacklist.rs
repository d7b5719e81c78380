//! Pattern filter hiding virtual paths from listing and navigation.

use regex::{RegexSet, RegexSetBuilder};

use super::resolver::ROOT_MARKER;

/// Compiled, case-insensitive set of blacklist patterns.
///
/// A virtual path is blacklisted when any pattern matches anywhere in it
/// (search semantics). Patterns see the path with the root marker and any
/// leading separators stripped, so `^secret` matches `./secret/notes`.
#[derive(Debug, Clone)]
pub struct Blacklist {
    patterns: Option<RegexSet>,
}

impl Blacklist {
    /// Compile `patterns` case-insensitively.
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(|p| p.as_ref().to_string()).collect();
        if patterns.is_empty() {
            return Ok(Self::empty());
        }
        let set = RegexSetBuilder::new(&patterns)
            .case_insensitive(true)
            .build()?;
        Ok(Self {
            patterns: Some(set),
        })
    }

    /// A blacklist that hides nothing.
    pub fn empty() -> Self {
        Self { patterns: None }
    }

    /// Number of compiled patterns.
    pub fn len(&self) -> usize {
        self.patterns.as_ref().map_or(0, RegexSet::len)
    }

    /// Whether no patterns are configured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `virtual_path` matches any pattern.
    pub fn is_blacklisted(&self, virtual_path: &str) -> bool {
        let Some(set) = &self.patterns else {
            return false;
        };
        set.is_match(strip_root(virtual_path))
    }
}

fn strip_root(path: &str) -> &str {
    let path = if path == ROOT_MARKER {
        ""
    } else {
        path.strip_prefix("./").unwrap_or(path)
    };
    path.trim_start_matches('/')
}
