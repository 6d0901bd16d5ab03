//! Wildcard keyword matching over cluster values and synonyms
//!
//! The matching rule is decided purely from wildcard placement: a leading
//! `%` means suffix match, a trailing `%` means prefix match, both or
//! neither mean substring match. All comparisons are case-insensitive.

use crate::cluster::Cluster;

/// A parsed search keyword
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WildcardPattern {
    /// `keyword%` - value or synonym starts with the keyword
    Prefix(String),
    /// `%keyword` - value or synonym ends with the keyword
    Suffix(String),
    /// `keyword` or `%keyword%` - keyword appears anywhere
    Substring(String),
}

impl WildcardPattern {
    /// Parse a raw keyword, interpreting `%` wildcards at either end
    pub fn parse(keyword: &str) -> Self {
        let lower = keyword.to_lowercase();
        let leading = lower.starts_with('%');
        let trailing = lower.len() > 1 && lower.ends_with('%');
        let stripped = lower.trim_matches('%').to_string();

        match (leading, trailing) {
            (true, false) => WildcardPattern::Suffix(stripped),
            (false, true) => WildcardPattern::Prefix(stripped),
            _ => WildcardPattern::Substring(stripped),
        }
    }

    /// Check a single candidate string against the pattern
    pub fn matches_str(&self, candidate: &str) -> bool {
        let candidate = candidate.to_lowercase();
        match self {
            WildcardPattern::Prefix(k) => candidate.starts_with(k.as_str()),
            WildcardPattern::Suffix(k) => candidate.ends_with(k.as_str()),
            WildcardPattern::Substring(k) => candidate.contains(k.as_str()),
        }
    }

    /// Number of times a cluster is yielded for this pattern
    ///
    /// A value match yields the record once; otherwise the record is yielded
    /// once per matching synonym. Dedup is the caller's business.
    pub fn match_count(&self, cluster: &Cluster) -> usize {
        if self.matches_str(&cluster.value) {
            1
        } else {
            cluster
                .synonyms
                .iter()
                .filter(|s| self.matches_str(s))
                .count()
        }
    }
}
