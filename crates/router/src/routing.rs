//! Keyword classification of task text.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::RuleConfig;

type MatchFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Clone)]
enum Predicate {
    /// Any of the keywords appears as a substring of the lowered text.
    Keywords(Vec<String>),
    Custom { label: String, matches: MatchFn },
}

/// One `(predicate, backend)` pair.
#[derive(Clone)]
pub struct RoutingRule {
    backend: String,
    predicate: Predicate,
}

/// Which backend a task goes to and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub backend: String,
    /// The keyword or predicate label that matched.
    pub matched: String,
}

impl RoutingRule {
    pub fn keywords<S: AsRef<str>>(backend: impl Into<String>, keywords: &[S]) -> Self {
        Self {
            backend: backend.into().to_lowercase(),
            predicate: Predicate::Keywords(
                keywords
                    .iter()
                    .map(|k| k.as_ref().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
            ),
        }
    }

    /// A rule with an arbitrary predicate over the lowered task text.
    pub fn custom(
        backend: impl Into<String>,
        label: impl Into<String>,
        matches: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            backend: backend.into().to_lowercase(),
            predicate: Predicate::Custom {
                label: label.into(),
                matches: Arc::new(matches),
            },
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    fn evaluate(&self, lowered: &str) -> Option<String> {
        match &self.predicate {
            Predicate::Keywords(keywords) => keywords
                .iter()
                .find(|k| lowered.contains(k.as_str()))
                .cloned(),
            Predicate::Custom { label, matches } => matches(lowered).then(|| label.clone()),
        }
    }
}

impl From<&RuleConfig> for RoutingRule {
    fn from(config: &RuleConfig) -> Self {
        Self::keywords(&config.backend, &config.keywords)
    }
}

impl std::fmt::Debug for RoutingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("RoutingRule");
        s.field("backend", &self.backend);
        match &self.predicate {
            Predicate::Keywords(k) => s.field("keywords", k),
            Predicate::Custom { label, .. } => s.field("custom", label),
        };
        s.finish()
    }
}

/// Ordered rule list. The first matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<RoutingRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<RoutingRule>) -> Self {
        Self { rules }
    }

    pub fn from_config(rules: &[RuleConfig]) -> Self {
        Self::new(rules.iter().map(RoutingRule::from).collect())
    }

    pub fn push(&mut self, rule: RoutingRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    pub fn classify(&self, text: &str) -> Option<RouteDecision> {
        let lowered = text.to_lowercase();
        self.rules.iter().find_map(|rule| {
            rule.evaluate(&lowered).map(|matched| RouteDecision {
                backend: rule.backend.clone(),
                matched,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_rules;

    fn rules() -> RuleSet {
        RuleSet::from_config(&default_rules())
    }

    fn route(text: &str) -> Option<String> {
        rules().classify(text).map(|d| d.backend)
    }

    #[test]
    fn coding_wins_over_everything_else() {
        assert_eq!(
            route("Debug the Stripe refund webhook in the GitHub repo").as_deref(),
            Some("kate")
        );
    }

    #[test]
    fn routes_each_domain() {
        assert_eq!(route("Give me insight on seller churn").as_deref(), Some("grok"));
        assert_eq!(route("Optimize listing titles").as_deref(), Some("grok"));
        assert_eq!(route("Issue a refund for order 42").as_deref(), Some("stripe"));
        assert_eq!(route("Flush the session cache").as_deref(), Some("redis"));
        assert_eq!(route("Show the latest commit").as_deref(), Some("github"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let decision = rules().classify("PAYMENT overview").unwrap();
        assert_eq!(decision.backend, "stripe");
        assert_eq!(decision.matched, "payment");
    }

    #[test]
    fn no_match_is_none() {
        assert!(rules().classify("hello there").is_none());
    }

    #[test]
    fn classification_is_deterministic() {
        let set = rules();
        let text = "analyze the marketplace and store results";
        assert_eq!(set.classify(text), set.classify(text));
    }

    #[test]
    fn custom_rules_run_in_order() {
        let mut set = RuleSet::new(vec![RoutingRule::custom("ops", "long task", |t| {
            t.len() > 40
        })]);
        set.push(RoutingRule::keywords("redis", &["cache"]));

        assert_eq!(set.classify("cache").unwrap().backend, "redis");
        let long = "please warm the cache for every category page we have";
        let decision = set.classify(long).unwrap();
        assert_eq!(decision.backend, "ops");
        assert_eq!(decision.matched, "long task");
    }
}
