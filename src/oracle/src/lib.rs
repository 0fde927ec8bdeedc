//! Review Oracle - Label taxonomy and deterministic pre-filtering
//!
//! The oracle short-circuits obvious reviews (advertisements, rants from
//! people who never visited) with cheap textual rules, before any retrieval
//! or model inference happens. It also owns the fixed label set every other
//! stage classifies into.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

// ============ Labels ============

/// Reserved label for unparseable or out-of-set model output.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Reserved label for batch entries whose classification failed.
pub const ERROR_LABEL: &str = "error";

/// A classification label.
///
/// Labels are plain strings so that out-of-set model output can still be
/// tallied as its own bucket; [`LabelSet::normalize`] maps them back onto the
/// configured enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn unknown() -> Self {
        Self(UNKNOWN_LABEL.to_string())
    }

    pub fn error() -> Self {
        Self(ERROR_LABEL.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_LABEL
    }

    pub fn is_error(&self) -> bool {
        self.0 == ERROR_LABEL
    }

    /// Whether this label is one of the reserved, non-classifying labels
    pub fn is_reserved(&self) -> bool {
        self.is_unknown() || self.is_error()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The fixed, ordered enumeration of labels a review can be classified into.
///
/// Order matters: it is the order shown to models in the prompt and the
/// priority order used by label-priority tie-breaking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct LabelSet {
    labels: Vec<Label>,
}

impl LabelSet {
    /// Build a label set, rejecting empty sets, duplicates and reserved names.
    pub fn new<I, S>(labels: I) -> Result<Self, OracleError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<Label> = Vec::new();
        for raw in labels {
            let raw: String = raw.into();
            let name = raw.trim();
            if name.is_empty() {
                return Err(OracleError::InvalidLabelSet("empty label name".to_string()));
            }
            let label = Label::new(name);
            if label.is_reserved() {
                return Err(OracleError::InvalidLabelSet(format!(
                    "'{}' is reserved",
                    name
                )));
            }
            if out
                .iter()
                .any(|l| l.as_str().eq_ignore_ascii_case(label.as_str()))
            {
                return Err(OracleError::InvalidLabelSet(format!(
                    "duplicate label '{}'",
                    name
                )));
            }
            out.push(label);
        }

        if out.is_empty() {
            return Err(OracleError::InvalidLabelSet(
                "label set must not be empty".to_string(),
            ));
        }

        Ok(Self { labels: out })
    }

    /// The four policy categories for location reviews
    pub fn review_default() -> Self {
        Self {
            labels: DEFAULT_LABELS.iter().map(|l| Label::new(*l)).collect(),
        }
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn contains(&self, label: &Label) -> bool {
        self.labels.contains(label)
    }

    /// Position of a label in the enumeration, `None` for out-of-set labels.
    pub fn priority(&self, label: &Label) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Map raw model text onto the enumeration.
    ///
    /// Matching trims whitespace and ignores ASCII case, returning the
    /// canonical spelling. Anything else becomes `unknown`.
    pub fn normalize(&self, raw: &str) -> Label {
        let candidate = raw.trim();
        self.labels
            .iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(candidate))
            .cloned()
            .unwrap_or_else(Label::unknown)
    }

    /// Labels rendered the way the prompt lists them: `['A', 'B']`
    pub fn prompt_listing(&self) -> String {
        let quoted: Vec<String> = self
            .labels
            .iter()
            .map(|l| format!("'{}'", l.as_str()))
            .collect();
        format!("[{}]", quoted.join(", "))
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::review_default()
    }
}

impl TryFrom<Vec<String>> for LabelSet {
    type Error = OracleError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LabelSet> for Vec<String> {
    fn from(value: LabelSet) -> Self {
        value.labels.into_iter().map(|l| l.0).collect()
    }
}

pub const DEFAULT_LABELS: &[&str] = &[
    "Valid",
    "Advertisement",
    "Irrelevant Content",
    "Rant Without Visit",
];

// ============ Pre-filter Rules ============

/// One ordered pre-filter rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrefilterRule {
    pub name: String,
    pub label: Label,
    pub matcher: RuleMatcher,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleMatcher {
    /// Any marker occurs in the lower-cased review text
    Contains { markers: Vec<String> },
    /// The regex matches the lower-cased review text
    Pattern { regex: String },
}

/// Outcome of a pre-filter hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrefilterHit {
    pub rule: String,
    pub label: Label,
    /// The marker or matched text that triggered the rule
    pub evidence: String,
}

// ============ Errors ============

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Invalid label set: {0}")]
    InvalidLabelSet(String),
    #[error("Rule '{rule}' targets label '{label}' which is not in the label set")]
    UnknownRuleLabel { rule: String, label: String },
    #[error("Rule '{0}' has no markers")]
    EmptyRule(String),
    #[error("Invalid regex: {0}")]
    RegexError(#[from] regex::Error),
}

// ============ Pre-filter Implementation ============

enum CompiledMatcher {
    Contains(Vec<String>),
    Pattern(Regex),
}

struct CompiledRule {
    name: String,
    label: Label,
    matcher: CompiledMatcher,
}

/// Ordered, first-match-wins textual pre-filter
pub struct PreFilter {
    rules: Vec<CompiledRule>,
}

impl PreFilter {
    /// Compile rules, checking each targets a label in `labels`.
    pub fn new(rules: &[PrefilterRule], labels: &LabelSet) -> Result<Self, OracleError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            if !labels.contains(&rule.label) {
                return Err(OracleError::UnknownRuleLabel {
                    rule: rule.name.clone(),
                    label: rule.label.to_string(),
                });
            }

            let matcher = match &rule.matcher {
                RuleMatcher::Contains { markers } => {
                    let markers: Vec<String> = markers
                        .iter()
                        .map(|m| m.to_lowercase())
                        .filter(|m| !m.is_empty())
                        .collect();
                    if markers.is_empty() {
                        return Err(OracleError::EmptyRule(rule.name.clone()));
                    }
                    CompiledMatcher::Contains(markers)
                }
                RuleMatcher::Pattern { regex } => CompiledMatcher::Pattern(Regex::new(regex)?),
            };

            compiled.push(CompiledRule {
                name: rule.name.clone(),
                label: rule.label.clone(),
                matcher,
            });
        }

        Ok(Self { rules: compiled })
    }

    /// The default rules, compiled without a label set. Their labels all
    /// belong to [`LabelSet::review_default`].
    pub fn with_review_defaults() -> Self {
        let rules = DEFAULT_RULES
            .iter()
            .map(|(name, label, markers)| CompiledRule {
                name: name.to_string(),
                label: Label::new(*label),
                matcher: CompiledMatcher::Contains(markers.iter().map(|m| m.to_string()).collect()),
            })
            .collect();
        Self { rules }
    }

    /// Pre-filter label for a review, if any rule fires.
    pub fn prefilter(&self, text: &str) -> Option<Label> {
        self.check(text).map(|hit| hit.label)
    }

    /// Evaluate rules in order against the lower-cased text; first match wins.
    pub fn check(&self, text: &str) -> Option<PrefilterHit> {
        let lowered = text.to_lowercase();

        for rule in &self.rules {
            let evidence = match &rule.matcher {
                CompiledMatcher::Contains(markers) => markers
                    .iter()
                    .find(|m| lowered.contains(m.as_str()))
                    .cloned(),
                CompiledMatcher::Pattern(re) => re.find(&lowered).map(|m| m.as_str().to_string()),
            };

            if let Some(evidence) = evidence {
                debug!(rule = %rule.name, label = %rule.label, evidence = %evidence, "pre-filter hit");
                return Some(PrefilterHit {
                    rule: rule.name.clone(),
                    label: rule.label.clone(),
                    evidence,
                });
            }
        }

        None
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }
}

impl Default for PreFilter {
    fn default() -> Self {
        Self::with_review_defaults()
    }
}

// ============ Default Rules ============

/// Name, label and lower-case markers of each default rule, in match order.
const DEFAULT_RULES: &[(&str, &str, &[&str])] = &[
    ("promotional_link", "Advertisement", &["www.", "http", "use code"]),
    ("no_visit_admission", "Rant Without Visit", &["never been", "haven't visited"]),
];

/// Promotional links and codes, then reviewers admitting they never visited.
pub fn default_rules() -> Vec<PrefilterRule> {
    DEFAULT_RULES
        .iter()
        .map(|(name, label, markers)| PrefilterRule {
            name: name.to_string(),
            label: Label::new(*label),
            matcher: RuleMatcher::Contains {
                markers: markers.iter().map(|m| m.to_string()).collect(),
            },
        })
        .collect()
}

// ============ Tests ============

#[cfg(test)]
mod tests {
    use super::*;

    fn prefilter() -> PreFilter {
        PreFilter::with_review_defaults()
    }

    #[test]
    fn test_detects_link_as_advertisement() {
        let label = prefilter().prefilter("Visit WWW.PizzaPromo.com for a discount!");
        assert_eq!(label, Some(Label::new("Advertisement")));
    }

    #[test]
    fn test_detects_promo_code() {
        let hit = prefilter().check("Great food, use code SAVE10 at checkout").unwrap();
        assert_eq!(hit.label, Label::new("Advertisement"));
        assert_eq!(hit.rule, "promotional_link");
        assert_eq!(hit.evidence, "use code");
    }

    #[test]
    fn test_detects_rant_without_visit() {
        let label = prefilter().prefilter("Never been here but I heard it's terrible!");
        assert_eq!(label, Some(Label::new("Rant Without Visit")));

        let label = prefilter().prefilter("I haven't visited yet, looks awful");
        assert_eq!(label, Some(Label::new("Rant Without Visit")));
    }

    #[test]
    fn test_first_match_wins_on_overlap() {
        // Both rules fire; the advertisement rule is listed first.
        let label = prefilter().prefilter("Never been, but check http://deals.example");
        assert_eq!(label, Some(Label::new("Advertisement")));
    }

    #[test]
    fn test_reordered_rules_change_outcome() {
        let mut rules = default_rules();
        rules.reverse();
        let filter = PreFilter::new(&rules, &LabelSet::review_default()).unwrap();
        let label = filter.prefilter("Never been, but check http://deals.example");
        assert_eq!(label, Some(Label::new("Rant Without Visit")));
    }

    #[test]
    fn test_passes_ordinary_review() {
        assert_eq!(prefilter().prefilter("Best pizza in town! Highly recommend."), None);
    }

    #[test]
    fn test_pattern_rule() {
        let rules = vec![PrefilterRule {
            name: "phone_number".to_string(),
            label: Label::new("Advertisement"),
            matcher: RuleMatcher::Pattern {
                regex: r"call \d{3}-\d{4}".to_string(),
            },
        }];
        let filter = PreFilter::new(&rules, &LabelSet::review_default()).unwrap();
        let hit = filter.check("Call 555-1234 for catering").unwrap();
        assert_eq!(hit.evidence, "call 555-1234");
        assert!(filter.check("Lovely staff").is_none());
    }

    #[test]
    fn test_rule_label_must_be_in_set() {
        let rules = vec![PrefilterRule {
            name: "spam".to_string(),
            label: Label::new("Spam"),
            matcher: RuleMatcher::Contains {
                markers: vec!["buy now".to_string()],
            },
        }];
        let err = PreFilter::new(&rules, &LabelSet::review_default()).err().unwrap();
        assert!(matches!(err, OracleError::UnknownRuleLabel { .. }));
    }

    #[test]
    fn test_defaults_compile_through_new() {
        let filter = PreFilter::new(&default_rules(), &LabelSet::review_default()).unwrap();
        assert_eq!(filter.rule_count(), 2);
        assert_eq!(
            filter.rule_names().collect::<Vec<_>>(),
            vec!["promotional_link", "no_visit_admission"]
        );
    }

    #[test]
    fn test_review_defaults_agree_with_validated_rules() {
        let checked = PreFilter::new(&default_rules(), &LabelSet::review_default()).unwrap();
        let quick = PreFilter::with_review_defaults();
        assert_eq!(
            quick.rule_names().collect::<Vec<_>>(),
            checked.rule_names().collect::<Vec<_>>()
        );
        for text in [
            "Visit www.pizzapromo.com",
            "USE CODE SAVE10",
            "I haven't visited but it looks awful",
            "Never been, but check http://deals.example",
            "Great crust",
        ] {
            assert_eq!(quick.check(text), checked.check(text), "{}", text);
        }
    }

    #[test]
    fn test_label_set_normalize() {
        let labels = LabelSet::review_default();
        assert_eq!(labels.normalize("  valid "), Label::new("Valid"));
        assert_eq!(
            labels.normalize("RANT WITHOUT VISIT"),
            Label::new("Rant Without Visit")
        );
        assert!(labels.normalize("Spam").is_unknown());
        assert!(labels.normalize("").is_unknown());
    }

    #[test]
    fn test_label_set_rejects_reserved_and_duplicates() {
        assert!(LabelSet::new(["Valid", "unknown"]).is_err());
        assert!(LabelSet::new(["Valid", "valid"]).is_err());
        assert!(LabelSet::new(Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_label_set_priority_and_listing() {
        let labels = LabelSet::review_default();
        assert_eq!(labels.priority(&Label::new("Valid")), Some(0));
        assert_eq!(labels.priority(&Label::new("Rant Without Visit")), Some(3));
        assert_eq!(labels.priority(&Label::unknown()), None);
        assert_eq!(
            labels.prompt_listing(),
            "['Valid', 'Advertisement', 'Irrelevant Content', 'Rant Without Visit']"
        );
    }

    #[test]
    fn test_label_set_serde_roundtrip_validates() {
        let json = serde_json::to_string(&LabelSet::review_default()).unwrap();
        let parsed: LabelSet = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 4);

        let bad: Result<LabelSet, _> = serde_json::from_str(r#"["Valid", "error"]"#);
        assert!(bad.is_err());
    }
}
