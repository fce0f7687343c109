// Term Tables
// Configurable phrase lists and their compiled whole-word matchers

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

const URL_PATTERN: &str = r"(?i)(https?://|www\.)\S+";

const DEFAULT_PROMO_TERMS: &[&str] = &[
    "sale", "discount", "% off", "percent off", "limited time", "limited offer",
    "promo code", "use code", "coupon", "deal", "offer", "book now", "call now",
    "subscribe", "follow us", "visit our website", "click here", "official website",
    "free trial", "sign up", "order now", "link in bio",
];

const DEFAULT_VISIT_MARKERS: &[&str] = &[
    "i", "we", "my", "our", "me", "us", "i'm", "i’ve", "i was", "we were",
    "ordered", "ate", "drank", "menu", "dish", "coffee", "table", "queue", "waited",
    "staff", "service", "room", "counter", "cashier", "bill", "receipt", "ticket",
    "entrance", "parking", "restroom", "toilet", "seating", "reservation", "check in",
    "checked in", "checkout", "check-out", "walked", "sat", "stood", "line",
];

const DEFAULT_IRRELEVANT_HINTS: &[&str] = &[
    "hiring", "vacancy", "job opening", "lost phone", "lost wallet", "crypto",
    "bitcoin", "forex", "giveaway", "telegram", "whatsapp", "contact me",
];

/// Phrase lists consulted by the feature extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermTables {
    #[serde(default = "default_promo")]
    pub promo: Vec<String>,
    #[serde(default = "default_visit_markers")]
    pub visit_markers: Vec<String>,
    #[serde(default = "default_irrelevant_hints")]
    pub irrelevant_hints: Vec<String>,
}

impl Default for TermTables {
    fn default() -> Self {
        Self {
            promo: default_promo(),
            visit_markers: default_visit_markers(),
            irrelevant_hints: default_irrelevant_hints(),
        }
    }
}

fn to_owned_list(terms: &[&str]) -> Vec<String> {
    terms.iter().map(|t| t.to_string()).collect()
}

fn default_promo() -> Vec<String> { to_owned_list(DEFAULT_PROMO_TERMS) }
fn default_visit_markers() -> Vec<String> { to_owned_list(DEFAULT_VISIT_MARKERS) }
fn default_irrelevant_hints() -> Vec<String> { to_owned_list(DEFAULT_IRRELEVANT_HINTS) }

/// A single term and the pattern matching it as a whole word or phrase.
#[derive(Debug, Clone)]
struct CompiledTerm {
    term: String,
    pattern: Regex,
}

#[derive(Debug, Clone)]
struct TermSet {
    terms: Vec<CompiledTerm>,
}

impl TermSet {
    fn compile(family: &str, terms: &[String]) -> Self {
        let mut compiled: Vec<CompiledTerm> = Vec::with_capacity(terms.len());
        for raw in terms {
            let term = raw.trim();
            if term.is_empty() || compiled.iter().any(|c| c.term.eq_ignore_ascii_case(term)) {
                continue;
            }
            match Regex::new(&whole_term_pattern(term)) {
                Ok(pattern) => compiled.push(CompiledTerm {
                    term: term.to_string(),
                    pattern,
                }),
                Err(e) => warn!(family, term, error = %e, "skipping term that does not compile"),
            }
        }
        Self { terms: compiled }
    }

    /// Distinct matched terms, in table order.
    fn matches(&self, text: &str) -> Vec<String> {
        self.terms
            .iter()
            .filter(|c| c.pattern.is_match(text))
            .map(|c| c.term.clone())
            .collect()
    }

    fn count(&self, text: &str) -> usize {
        self.terms.iter().filter(|c| c.pattern.is_match(text)).count()
    }

    fn len(&self) -> usize {
        self.terms.len()
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Case-insensitive pattern for `term`. A word boundary is required on each
/// side whose edge character is a word character, so "call now" never matches
/// inside "recall nowhere" while "% off" still matches after "20".
fn whole_term_pattern(term: &str) -> String {
    let starts_word = term.chars().next().map_or(false, is_word_char);
    let ends_word = term.chars().last().map_or(false, is_word_char);
    format!(
        "(?i){}{}{}",
        if starts_word { r"\b" } else { "" },
        regex::escape(term),
        if ends_word { r"\b" } else { "" },
    )
}

/// Compiled, immutable matchers for all term families. Safe to share across threads.
#[derive(Debug, Clone)]
pub struct TermMatcher {
    url: Regex,
    promo: TermSet,
    visit: TermSet,
    irrelevant: TermSet,
}

impl TermMatcher {
    pub fn new(tables: &TermTables) -> Self {
        let url = Regex::new(URL_PATTERN).expect("URL pattern is a valid regex");
        Self {
            url,
            promo: TermSet::compile("promo", &tables.promo),
            visit: TermSet::compile("visit", &tables.visit_markers),
            irrelevant: TermSet::compile("irrelevant", &tables.irrelevant_hints),
        }
    }

    pub fn url_count(&self, text: &str) -> usize {
        self.url.find_iter(text).count()
    }

    pub fn promo_hits(&self, text: &str) -> Vec<String> {
        self.promo.matches(text)
    }

    pub fn irrelevant_hits(&self, text: &str) -> Vec<String> {
        self.irrelevant.matches(text)
    }

    /// Number of distinct visit markers present.
    pub fn visit_marker_count(&self, text: &str) -> usize {
        self.visit.count(text)
    }

    pub fn term_counts(&self) -> (usize, usize, usize) {
        (self.promo.len(), self.visit.len(), self.irrelevant.len())
    }
}

impl Default for TermMatcher {
    fn default() -> Self {
        Self::new(&TermTables::default())
    }
}
