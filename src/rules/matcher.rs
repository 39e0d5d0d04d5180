//! Compiled include/exclude matcher

use std::collections::HashSet;

use regex::Regex;
use tracing::warn;

use super::RuleSet;

/// A single configured pattern
#[derive(Debug, Clone)]
enum Pattern {
    Absent,
    Compiled(Regex),
    /// Present but failed to compile; matches nothing
    Invalid,
}

impl Pattern {
    fn compile(field: &str, source: &str) -> Self {
        if source.is_empty() {
            return Self::Absent;
        }
        match Regex::new(source) {
            Ok(regex) => Self::Compiled(regex),
            Err(e) => {
                warn!("Rule {} has an invalid pattern, matching nothing: {}", field, e);
                Self::Invalid
            }
        }
    }

    fn is_match(&self, candidate: &str) -> bool {
        match self {
            Self::Compiled(regex) => regex.is_match(candidate),
            Self::Absent | Self::Invalid => false,
        }
    }
}

/// Include/exclude pair for one dimension (URL or site)
#[derive(Debug, Clone)]
struct Scope {
    include: Pattern,
    exclude: Pattern,
}

impl Scope {
    fn admits(&self, candidate: &str) -> bool {
        if self.exclude.is_match(candidate) {
            return false;
        }
        match self.include {
            Pattern::Absent => true,
            _ => self.include.is_match(candidate),
        }
    }
}

/// Admission predicate compiled from a [`RuleSet`]
///
/// Logic per dimension:
/// 1. If the exclude pattern matches, reject.
/// 2. If there is no include pattern, admit.
/// 3. Otherwise admit only if the include pattern matches.
#[derive(Debug, Clone)]
pub struct RuleMatcher {
    url: Scope,
    site: Scope,
    banned_urls: HashSet<String>,
    banned_sites: HashSet<String>,
}

impl RuleMatcher {
    /// Compile the patterns and ban lists of a rule set
    pub fn compile(rules: &RuleSet) -> Self {
        Self {
            url: Scope {
                include: Pattern::compile("includeRegexp", &rules.include_regexp),
                exclude: Pattern::compile("excludeRegexp", &rules.exclude_regexp),
            },
            site: Scope {
                include: Pattern::compile("includeSiteRegexp", &rules.include_site_regexp),
                exclude: Pattern::compile("excludeSiteRegexp", &rules.exclude_site_regexp),
            },
            banned_urls: truthy_keys(&rules.banned_url),
            banned_sites: truthy_keys(&rules.banned_site),
        }
    }

    /// URL-level include/exclude check
    pub fn admits(&self, url: &str) -> bool {
        self.url.admits(url)
    }

    /// Site-level include/exclude check
    pub fn admits_site(&self, site: &str) -> bool {
        self.site.admits(site)
    }

    /// Full admission decision for a call: both patterns and both ban lists
    pub fn admits_call(&self, site: &str, url: &str) -> bool {
        !self.banned_urls.contains(url)
            && !self.banned_sites.contains(site)
            && self.admits(url)
            && self.admits_site(site)
    }
}

impl Default for RuleMatcher {
    fn default() -> Self {
        Self::compile(&RuleSet::default())
    }
}

fn truthy_keys(flags: &std::collections::BTreeMap<String, bool>) -> HashSet<String> {
    flags
        .iter()
        .filter(|(_, banned)| **banned)
        .map(|(key, _)| key.clone())
        .collect()
}
