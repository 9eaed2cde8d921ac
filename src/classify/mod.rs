// src/classify/mod.rs
//! Classification gate: PRIORITY items pass straight through, NORMAL items
//! are translated and ranked by the zero-shot classifier, then accepted only
//! when the top label reaches the threshold.

pub mod zero_shot;

use std::sync::Arc;

use metrics::counter;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::classify::zero_shot::TopicClassifier;
use crate::metrics::CLASSIFICATION_ERRORS;
use crate::relevance::{anon_hash, AdmissionClass};
use crate::translate::TranslatorChain;

pub const DEFAULT_THRESHOLD: f32 = 0.30;
pub const DEFAULT_CLASSIFY_LANGUAGE: &str = "en";
/// Topic reported for items that skipped the classifier.
pub const PASS_THROUGH_TOPIC: &str = "priority";

#[derive(Debug, Clone, PartialEq)]
pub struct TopicLabel {
    /// Final topic, already mapped from the model's label.
    pub label: String,
    pub confidence: f32,
    /// Set only for PRIORITY items, which never reach the classifier.
    pub pass_through: bool,
}

impl TopicLabel {
    pub fn pass_through() -> Self {
        Self {
            label: PASS_THROUGH_TOPIC.to_string(),
            confidence: 1.0,
            pass_through: true,
        }
    }

    pub fn is_pass_through(&self) -> bool {
        self.pass_through
    }
}

/// One candidate sent to the model and the topic it maps to.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LabelSpec {
    pub candidate: String,
    /// Defaults to `candidate`.
    #[serde(default)]
    pub topic: Option<String>,
    /// Off-topic decoy: winning with this label rejects the item.
    #[serde(default)]
    pub reject: bool,
}

impl LabelSpec {
    pub fn new(candidate: &str) -> Self {
        Self {
            candidate: candidate.to_string(),
            topic: None,
            reject: false,
        }
    }

    pub fn mapped(candidate: &str, topic: &str) -> Self {
        Self {
            candidate: candidate.to_string(),
            topic: Some(topic.to_string()),
            reject: false,
        }
    }

    pub fn decoy(candidate: &str) -> Self {
        Self {
            candidate: candidate.to_string(),
            topic: None,
            reject: true,
        }
    }

    pub fn topic(&self) -> &str {
        self.topic.as_deref().unwrap_or(&self.candidate)
    }
}

pub struct ClassificationGate {
    classifier: Arc<dyn TopicClassifier>,
    translator: TranslatorChain,
    labels: Vec<LabelSpec>,
    candidates: Vec<String>,
    threshold: f32,
    classify_language: String,
}

impl ClassificationGate {
    pub fn new(
        classifier: Arc<dyn TopicClassifier>,
        translator: TranslatorChain,
        labels: Vec<LabelSpec>,
        threshold: f32,
    ) -> Self {
        let candidates = labels.iter().map(|l| l.candidate.clone()).collect();
        Self {
            classifier,
            translator,
            labels,
            candidates,
            threshold: sanitize_threshold(threshold),
            classify_language: DEFAULT_CLASSIFY_LANGUAGE.to_string(),
        }
    }

    pub fn with_classify_language(mut self, lang: &str) -> Self {
        self.classify_language = lang.to_string();
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn labels(&self) -> &[LabelSpec] {
        &self.labels
    }

    /// `None` means rejected. Never called for REJECT items by the pipeline;
    /// if it is, the answer is still `None`.
    pub async fn classify(&self, class: AdmissionClass, normalized_text: &str) -> Option<TopicLabel> {
        match class {
            AdmissionClass::Reject => None,
            AdmissionClass::Priority => Some(TopicLabel::pass_through()),
            AdmissionClass::Normal => self.classify_normal(normalized_text).await,
        }
    }

    async fn classify_normal(&self, text: &str) -> Option<TopicLabel> {
        let id = anon_hash(text);
        if self.candidates.is_empty() {
            warn!(target: "classify", id = %id, "no candidate labels configured");
            counter!(CLASSIFICATION_ERRORS).increment(1);
            return None;
        }

        // A failed translation still classifies the original text
        let input = if self.translator.is_empty() {
            text.to_string()
        } else {
            self.translator.translate(text, &self.classify_language).await.text
        };

        let ranked = match self.classifier.rank(&input, &self.candidates).await {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "classify", id = %id, classifier = self.classifier.name(), error = %e, "classification failed");
                counter!(CLASSIFICATION_ERRORS).increment(1);
                return None;
            }
        };

        let Some((label, confidence)) = ranked
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            warn!(target: "classify", id = %id, "classifier returned no labels");
            counter!(CLASSIFICATION_ERRORS).increment(1);
            return None;
        };

        let Some(winner) = self.labels.iter().find(|l| l.candidate == label) else {
            warn!(target: "classify", id = %id, label = %label, "label outside candidate set");
            counter!(CLASSIFICATION_ERRORS).increment(1);
            return None;
        };

        if winner.reject {
            debug!(target: "classify", id = %id, label = %label, confidence, "off-topic label won");
            return None;
        }

        if confidence >= self.threshold {
            debug!(target: "classify", id = %id, label = %label, confidence, "accepted");
            Some(TopicLabel {
                label: winner.topic().to_string(),
                confidence,
                pass_through: false,
            })
        } else {
            debug!(target: "classify", id = %id, label = %label, confidence, threshold = self.threshold, "below threshold");
            None
        }
    }
}

/// Out-of-range or non-finite thresholds fall back to the default.
pub fn sanitize_threshold(t: f32) -> f32 {
    if t.is_finite() && (0.0..=1.0).contains(&t) {
        t
    } else {
        DEFAULT_THRESHOLD
    }
}
