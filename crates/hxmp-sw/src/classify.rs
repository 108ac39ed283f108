//! URL classification: which caching strategy serves a request.

use std::fmt;

use hxmp_core::WorkerConfig;
use tracing::trace;
use url::Url;

/// Fetch resolution algorithm for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Live fetch, cached copy only when the network fails.
    NetworkFirst,
    /// Cached copy when present, live fetch on a miss.
    CacheFirst,
    /// Cached copy now, refreshed in the background for the next request.
    StaleWhileRevalidate,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::NetworkFirst => write!(f, "network-first"),
            Strategy::CacheFirst => write!(f, "cache-first"),
            Strategy::StaleWhileRevalidate => write!(f, "stale-while-revalidate"),
        }
    }
}

/// Type of URL pattern. Both match against the URL path only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternType {
    /// Path contains substring.
    PathContains,
    /// Path ends with `.<extension>`.
    PathExtension,
}

/// URL pattern for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPattern {
    /// Pattern type.
    pub pattern_type: PatternType,
    /// Pattern string.
    pub pattern: String,
}

impl UrlPattern {
    /// Create a path-substring pattern.
    pub fn contains(substring: &str) -> Self {
        Self {
            pattern_type: PatternType::PathContains,
            pattern: substring.to_string(),
        }
    }

    /// Create a file-extension pattern (`"js"` matches `/app.js`).
    pub fn extension(extension: &str) -> Self {
        Self {
            pattern_type: PatternType::PathExtension,
            pattern: extension.trim_start_matches('.').to_string(),
        }
    }

    /// Check if a URL matches this pattern.
    pub fn matches(&self, url: &Url) -> bool {
        let path = url.path();
        match self.pattern_type {
            PatternType::PathContains => path.contains(&self.pattern),
            PatternType::PathExtension => path
                .rsplit_once('.')
                .is_some_and(|(stem, ext)| !stem.is_empty() && ext == self.pattern),
        }
    }
}

/// Rule mapping a pattern to a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRule {
    /// Pattern to match.
    pub pattern: UrlPattern,
    /// Strategy when the pattern matches.
    pub strategy: Strategy,
}

/// Ordered rules with a default; the first matching rule wins.
///
/// Classification is total: a request no rule matches gets the default.
#[derive(Debug, Clone)]
pub struct RequestClassifier {
    rules: Vec<ClassificationRule>,
    default_strategy: Strategy,
}

impl RequestClassifier {
    /// Create a classifier with no rules.
    pub fn new(default_strategy: Strategy) -> Self {
        Self {
            rules: Vec::new(),
            default_strategy,
        }
    }

    /// Network-first substrings, then cache-first extensions, else
    /// stale-while-revalidate.
    pub fn from_config(config: &WorkerConfig) -> Self {
        let mut classifier = Self::new(Strategy::StaleWhileRevalidate);
        for substring in &config.network_first {
            classifier.add_rule(UrlPattern::contains(substring), Strategy::NetworkFirst);
        }
        for extension in &config.cache_first_extensions {
            classifier.add_rule(UrlPattern::extension(extension), Strategy::CacheFirst);
        }
        classifier
    }

    /// Append a rule. Rules added earlier take precedence.
    pub fn add_rule(&mut self, pattern: UrlPattern, strategy: Strategy) {
        self.rules.push(ClassificationRule { pattern, strategy });
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Pick the strategy for `url`.
    pub fn classify(&self, url: &Url) -> Strategy {
        let strategy = self
            .rules
            .iter()
            .find(|rule| rule.pattern.matches(url))
            .map(|rule| rule.strategy)
            .unwrap_or(self.default_strategy);

        trace!(url = %url, %strategy, "Classified request");
        strategy
    }
}

impl Default for RequestClassifier {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> Url {
        Url::parse("https://hxmp.space/").unwrap().join(path).unwrap()
    }

    #[test]
    fn test_pattern_contains_checks_path_only() {
        let pattern = UrlPattern::contains("/api/");
        assert!(pattern.matches(&url("/api/users")));
        assert!(!pattern.matches(&url("/page.html?next=/api/users")));
    }

    #[test]
    fn test_pattern_extension() {
        let pattern = UrlPattern::extension(".css");
        assert!(pattern.matches(&url("/floating-nav.css")));
        assert!(pattern.matches(&url("/floating-nav.css?v=1.0.0-1")));
        assert!(!pattern.matches(&url("/floating-nav.css.map")));
        assert!(!pattern.matches(&url("/css")));
    }

    #[test]
    fn test_network_first_patterns() {
        let classifier = RequestClassifier::default();
        for path in ["/api/items", "/auth-login.html", "/admin-dashboard.html", "/supabase-config.js"] {
            assert_eq!(classifier.classify(&url(path)), Strategy::NetworkFirst, "{path}");
        }
    }

    #[test]
    fn test_network_first_wins_over_extension() {
        let classifier = RequestClassifier::default();
        assert_eq!(classifier.classify(&url("/api/logo.png")), Strategy::NetworkFirst);
    }

    #[test]
    fn test_cache_first_extensions() {
        let classifier = RequestClassifier::default();
        for path in ["/floating-nav.js", "/a/b.css", "/assets/xr2.png", "/f.woff2", "/p.JPEG.jpeg"] {
            assert_eq!(classifier.classify(&url(path)), Strategy::CacheFirst, "{path}");
        }
    }

    #[test]
    fn test_default_is_stale_while_revalidate() {
        let classifier = RequestClassifier::default();
        for path in ["/", "/xrhome.html", "/data.json", "/gallery"] {
            assert_eq!(
                classifier.classify(&url(path)),
                Strategy::StaleWhileRevalidate,
                "{path}"
            );
        }
    }

    #[test]
    fn test_custom_rules_in_order() {
        let mut classifier = RequestClassifier::new(Strategy::NetworkFirst);
        classifier.add_rule(UrlPattern::extension("html"), Strategy::CacheFirst);
        classifier.add_rule(UrlPattern::contains("/"), Strategy::StaleWhileRevalidate);

        assert_eq!(classifier.classify(&url("/x.html")), Strategy::CacheFirst);
        assert_eq!(classifier.classify(&url("/x")), Strategy::StaleWhileRevalidate);
        assert_eq!(classifier.rules().len(), 2);
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(Strategy::StaleWhileRevalidate.to_string(), "stale-while-revalidate");
    }
}
