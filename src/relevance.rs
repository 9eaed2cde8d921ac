// src/relevance.rs
//! Lexical relevance gate: length floor, exclude veto, topic roots, region
//! markers and the priority override.
//!
//! Roots are matched as case-insensitive substrings, so "wojn" matches
//! "wojna", "wojnie", ... and also any unrelated word sharing the root. That
//! imprecision is accepted; the classifier downstream catches most of it.

use serde::Deserialize;
use tracing::debug;

use crate::ingest::fold_for_match;
use crate::ingest::types::FeedItem;

pub const DEFAULT_MIN_TITLE_CHARS: usize = 15;
pub const DEFAULT_MIN_SUMMARY_CHARS: usize = 40;

/// The filter's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionClass {
    Reject,
    /// Unambiguous; skip semantic classification.
    Priority,
    /// On topic, still needs the classifier.
    Normal,
}

impl AdmissionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionClass::Reject => "reject",
            AdmissionClass::Priority => "priority",
            AdmissionClass::Normal => "normal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    TooShort,
    Excluded,
    NoTopic,
    NoRegion,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::TooShort => "too_short",
            RejectReason::Excluded => "excluded",
            RejectReason::NoTopic => "no_topic",
            RejectReason::NoRegion => "no_region",
        }
    }
}

/* ----------------------------
Config schema (from TOML)
---------------------------- */

/// Keyword roots. All four lists are case-insensitive substrings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct KeywordRuleSet {
    /// Topic signal.
    #[serde(default, alias = "include_roots")]
    pub include: Vec<String>,
    /// Hard veto, checked before anything else matches.
    #[serde(default, alias = "exclude_roots")]
    pub exclude: Vec<String>,
    /// Override: admitted items matching one of these skip classification.
    #[serde(default, alias = "priority_roots")]
    pub priority: Vec<String>,
    /// Country/region/demonym roots, matched in text, tags or source name.
    #[serde(default, alias = "region_markers")]
    pub region: Vec<String>,
}

impl KeywordRuleSet {
    /// Lower-case, trim, drop empties and duplicates (order kept).
    pub fn normalized(self) -> Self {
        Self {
            include: clean_roots(self.include),
            exclude: clean_roots(self.exclude),
            priority: clean_roots(self.priority),
            region: clean_roots(self.region),
        }
    }
}

fn clean_roots(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim().to_lowercase();
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct LengthFloor {
    #[serde(default = "default_min_title")]
    pub min_title_chars: usize,
    #[serde(default = "default_min_summary")]
    pub min_summary_chars: usize,
}

fn default_min_title() -> usize {
    DEFAULT_MIN_TITLE_CHARS
}
fn default_min_summary() -> usize {
    DEFAULT_MIN_SUMMARY_CHARS
}

impl Default for LengthFloor {
    fn default() -> Self {
        Self {
            min_title_chars: DEFAULT_MIN_TITLE_CHARS,
            min_summary_chars: DEFAULT_MIN_SUMMARY_CHARS,
        }
    }
}

/// Outcome of screening one item.
#[derive(Debug, Clone, PartialEq)]
pub struct Screening {
    pub class: AdmissionClass,
    pub reject: Option<RejectReason>,
    /// Matched markers, e.g. "include:prezydent", "region:polska@source".
    pub matched: Vec<String>,
    /// Lower-cased, markup-free title + summary.
    pub text: String,
}

impl Screening {
    fn rejected(reason: RejectReason, text: String, matched: Vec<String>) -> Self {
        Self {
            class: AdmissionClass::Reject,
            reject: Some(reason),
            matched,
            text,
        }
    }
}

// Short anonymized id so logs never carry article text at info level.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub(crate) fn truncate_vec<T: ToString>(v: &[T], max: usize) -> Vec<String> {
    v.iter().take(max).map(|x| x.to_string()).collect()
}

/* ----------------------------
Filter
---------------------------- */

#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    rules: KeywordRuleSet,
    floor: LengthFloor,
}

impl RelevanceFilter {
    pub fn new(rules: KeywordRuleSet, floor: LengthFloor) -> Self {
        Self {
            rules: rules.normalized(),
            floor,
        }
    }

    pub fn rules(&self) -> &KeywordRuleSet {
        &self.rules
    }

    /// Lexical verdict over raw text (title + summary), tags and source name.
    pub fn admission_class(&self, text: &str, tags: &[String], source: &str) -> AdmissionClass {
        self.screen_text(fold_for_match(text), tags, source).class
    }

    pub fn is_relevant(&self, text: &str, tags: &[String], source: &str) -> bool {
        self.admission_class(text, tags, source) != AdmissionClass::Reject
    }

    /// Full item screening: length floor first, then the lexical rules.
    pub fn screen(&self, item: &FeedItem) -> Screening {
        let title = fold_for_match(&item.title);
        let summary = fold_for_match(item.summary_or_empty());
        let text = if summary.is_empty() {
            title.clone()
        } else {
            format!("{title} {summary}")
        };

        let screening = if title.chars().count() < self.floor.min_title_chars
            && summary.chars().count() < self.floor.min_summary_chars
        {
            Screening::rejected(RejectReason::TooShort, text, Vec::new())
        } else {
            self.screen_text(text, &item.tags, item.source_or_empty())
        };

        debug!(
            target: "relevance",
            id = %anon_hash(&screening.text),
            class = screening.class.as_str(),
            reject = screening.reject.map(|r| r.as_str()),
            matched = ?truncate_vec(&screening.matched, 5),
            "screened"
        );
        screening
    }

    /// `folded` must already be lower-cased and markup-free.
    fn screen_text(&self, folded: String, tags: &[String], source: &str) -> Screening {
        // 1) Exclude is an absolute veto
        if let Some(root) = first_match(&self.rules.exclude, &folded) {
            let matched = vec![format!("exclude:{root}")];
            return Screening::rejected(RejectReason::Excluded, folded, matched);
        }

        // 2) Topic
        let Some(topic) = first_match(&self.rules.include, &folded) else {
            return Screening::rejected(RejectReason::NoTopic, folded, Vec::new());
        };
        let mut matched = vec![format!("include:{topic}")];

        // 3) Region: text OR any tag OR source name
        match self.region_hit(&folded, tags, source) {
            Some(hit) => matched.push(hit),
            None => return Screening::rejected(RejectReason::NoRegion, folded, matched),
        }

        // 4) Priority override
        let class = match first_match(&self.rules.priority, &folded) {
            Some(root) => {
                matched.push(format!("priority:{root}"));
                AdmissionClass::Priority
            }
            None => AdmissionClass::Normal,
        };

        Screening {
            class,
            reject: None,
            matched,
            text: folded,
        }
    }

    fn region_hit(&self, folded: &str, tags: &[String], source: &str) -> Option<String> {
        if let Some(root) = first_match(&self.rules.region, folded) {
            return Some(format!("region:{root}@text"));
        }
        for tag in tags {
            if let Some(root) = first_match(&self.rules.region, &tag.to_lowercase()) {
                return Some(format!("region:{root}@tag"));
            }
        }
        first_match(&self.rules.region, &source.to_lowercase())
            .map(|root| format!("region:{root}@source"))
    }
}

fn first_match<'a>(roots: &'a [String], haystack: &str) -> Option<&'a str> {
    roots
        .iter()
        .find(|r| haystack.contains(r.as_str()))
        .map(String::as_str)
}

/* ----------------------------
Tests
---------------------------- */
