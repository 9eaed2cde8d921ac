// src/pipeline.rs
//! One relay pass. Per item, cheapest reject first:
//! lexical screening, ledger lookup, classification, delivery, ledger record.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tracing::{debug, error, info, warn};

use crate::classify::ClassificationGate;
use crate::ingest::types::{FeedItem, FeedSource};
use crate::ingest::{fetch_all, normalize_text};
use crate::ledger::{now_unix, Ledger};
use crate::metrics::{
    ensure_metrics_described, ACCEPTED, DELIVERED, DELIVERY_ERRORS, DUPLICATES, LAST_RUN_TS,
    LEDGER_ERRORS, REJECTED,
};
use crate::notify::{DeliveryMessage, DeliverySink};
use crate::relevance::{anon_hash, AdmissionClass, RejectReason, RelevanceFilter};
use crate::translate::TranslatorChain;

/// Terminal state of one item.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Rejected(RejectReason),
    /// Already delivered within the ledger TTL.
    Skipped,
    /// Below threshold, or the classifier failed.
    ClassificationRejected,
    Delivered {
        topic: String,
        class: AdmissionClass,
    },
    /// Not recorded, so the next run retries it.
    DeliveryFailed {
        class: AdmissionClass,
    },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub fetched: usize,
    pub feed_errors: usize,
    pub rejected_too_short: usize,
    pub rejected_excluded: usize,
    pub rejected_no_topic: usize,
    pub rejected_no_region: usize,
    pub duplicates: usize,
    pub accepted_priority: usize,
    pub accepted_normal: usize,
    pub classification_rejects: usize,
    pub delivered: usize,
    pub delivery_failures: usize,
}

impl RunReport {
    pub fn rejected(&self) -> usize {
        self.rejected_too_short
            + self.rejected_excluded
            + self.rejected_no_topic
            + self.rejected_no_region
    }

    fn tally(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Rejected(RejectReason::TooShort) => self.rejected_too_short += 1,
            Outcome::Rejected(RejectReason::Excluded) => self.rejected_excluded += 1,
            Outcome::Rejected(RejectReason::NoTopic) => self.rejected_no_topic += 1,
            Outcome::Rejected(RejectReason::NoRegion) => self.rejected_no_region += 1,
            Outcome::Skipped => self.duplicates += 1,
            Outcome::ClassificationRejected => self.classification_rejects += 1,
            Outcome::Delivered { class, .. } => {
                self.count_accepted(*class);
                self.delivered += 1;
            }
            Outcome::DeliveryFailed { class } => {
                self.count_accepted(*class);
                self.delivery_failures += 1;
            }
        }
    }

    fn count_accepted(&mut self, class: AdmissionClass) {
        match class {
            AdmissionClass::Priority => self.accepted_priority += 1,
            AdmissionClass::Normal => self.accepted_normal += 1,
            AdmissionClass::Reject => {}
        }
    }
}

pub struct Pipeline {
    filter: RelevanceFilter,
    ledger: Ledger,
    gate: ClassificationGate,
    sink: Arc<dyn DeliverySink>,
    /// Translator and target language for delivered titles.
    title_translation: Option<(TranslatorChain, String)>,
}

impl Pipeline {
    pub fn new(
        filter: RelevanceFilter,
        ledger: Ledger,
        gate: ClassificationGate,
        sink: Arc<dyn DeliverySink>,
    ) -> Self {
        Self {
            filter,
            ledger,
            gate,
            sink,
            title_translation: None,
        }
    }

    pub fn with_delivery_language(mut self, translator: TranslatorChain, lang: &str) -> Self {
        self.title_translation = Some((translator, lang.to_string()));
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Drive one item to its terminal state. Never fails: every error is
    /// logged and mapped to an outcome.
    pub async fn process_item(&self, item: &FeedItem) -> Outcome {
        // 1-4) length floor, exclude, include, region
        let screening = self.filter.screen(item);
        if let Some(reason) = screening.reject {
            counter!(REJECTED, "reason" => reason.as_str()).increment(1);
            return Outcome::Rejected(reason);
        }
        let class = screening.class;
        let id = anon_hash(&screening.text);

        // 5) dedup
        let identity = item.identity();
        if self.ledger.contains_and_refresh(&identity) {
            debug!(target: "pipeline", id = %id, %identity, "already sent");
            counter!(DUPLICATES).increment(1);
            return Outcome::Skipped;
        }

        // 6) priority bypass or classification
        let text = display_text(item);
        let Some(topic) = self.gate.classify(class, &text).await else {
            counter!(REJECTED, "reason" => "classification").increment(1);
            return Outcome::ClassificationRejected;
        };
        counter!(ACCEPTED, "class" => class.as_str()).increment(1);

        // 7) format
        let msg = self.format(item, &topic.label).await;

        // 8) deliver
        if let Err(e) = self.sink.deliver(&msg).await {
            warn!(target: "pipeline", id = %id, sink = self.sink.name(), error = %e, "delivery failed, will retry next run");
            counter!(DELIVERY_ERRORS).increment(1);
            return Outcome::DeliveryFailed { class };
        }
        counter!(DELIVERED).increment(1);
        info!(target: "pipeline", id = %id, %identity, topic = %topic.label, class = class.as_str(), "delivered");
        debug!(target: "pipeline", title = %item.title, link = %item.link, "delivered item");

        // 9) record
        if self.sink.records_deliveries() {
            if let Err(e) = self.ledger.record(&identity) {
                error!(target: "pipeline", %identity, error = %e, "delivered but not recorded, duplicate likely next run");
                counter!(LEDGER_ERRORS).increment(1);
            }
        }

        Outcome::Delivered {
            topic: topic.label,
            class,
        }
    }

    async fn format(&self, item: &FeedItem, topic: &str) -> DeliveryMessage {
        let title = normalize_text(&item.title);
        let (title, untranslated) = match &self.title_translation {
            Some((chain, lang)) => {
                let t = chain.translate(&title, lang).await;
                (t.text, t.failed)
            }
            None => (title, false),
        };
        DeliveryMessage {
            title,
            topic: topic.to_string(),
            source: item.source_or_empty().to_string(),
            link: item.link.trim().to_string(),
            untranslated,
        }
    }

    /// Process items sequentially, in order.
    pub async fn run_batch(&self, items: &[FeedItem]) -> RunReport {
        ensure_metrics_described();
        let mut report = RunReport {
            fetched: items.len(),
            ..Default::default()
        };
        for item in items {
            let outcome = self.process_item(item).await;
            report.tally(&outcome);
        }
        gauge!(LAST_RUN_TS).set(now_unix() as f64);
        report
    }

    /// Fetch every source (bounded concurrency, per-source timeout), then
    /// process the merged items.
    pub async fn run_once(
        &self,
        sources: &[Arc<dyn FeedSource>],
        concurrency: usize,
        timeout: Duration,
    ) -> RunReport {
        let fetched = fetch_all(sources, concurrency, timeout).await;
        let mut report = self.run_batch(&fetched.items).await;
        report.feed_errors = fetched.failures.len();
        info!(
            target: "pipeline",
            sources = sources.len(),
            fetched = report.fetched,
            feed_errors = report.feed_errors,
            rejected = report.rejected(),
            duplicates = report.duplicates,
            classification_rejects = report.classification_rejects,
            delivered = report.delivered,
            delivery_failures = report.delivery_failures,
            "relay run finished"
        );
        report
    }
}

fn display_text(item: &FeedItem) -> String {
    let title = normalize_text(&item.title);
    let summary = normalize_text(item.summary_or_empty());
    if summary.is_empty() {
        title
    } else {
        format!("{title} {summary}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::zero_shot::DisabledClassifier;
    use crate::classify::LabelSpec;
    use crate::error::DeliveryError;
    use crate::relevance::{KeywordRuleSet, LengthFloor};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Capture(Mutex<Vec<DeliveryMessage>>);

    #[async_trait]
    impl DeliverySink for Capture {
        async fn deliver(&self, msg: &DeliveryMessage) -> Result<(), DeliveryError> {
            self.0.lock().push(msg.clone());
            Ok(())
        }
        fn name(&self) -> &str {
            "capture"
        }
    }

    fn pipeline(dir: &tempfile::TempDir, sink: Arc<dyn DeliverySink>) -> Pipeline {
        let rules = KeywordRuleSet {
            include: vec!["wojn".into()],
            exclude: vec!["horoskop".into()],
            priority: vec!["wojn".into()],
            region: vec!["ukrain".into()],
        };
        let gate = ClassificationGate::new(
            Arc::new(DisabledClassifier),
            TranslatorChain::default(),
            vec![LabelSpec::new("war")],
            0.3,
        );
        Pipeline::new(
            RelevanceFilter::new(rules, LengthFloor::default()),
            Ledger::new(dir.path().join("sent.txt"), 3600),
            gate,
            sink,
        )
    }

    #[tokio::test]
    async fn report_counts_terminal_states() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(Capture::default());
        let p = pipeline(&dir, sink.clone());
        let war = FeedItem::new("Wojna w Ukrainie trwa dalej", "https://x/1");
        let items = vec![
            war.clone(),
            war,
            FeedItem::new("Horoskop na wojnę w Ukrainie", "https://x/2"),
            FeedItem::new("Pogoda na weekend w górach", "https://x/3"),
        ];
        let r = p.run_batch(&items).await;
        assert_eq!(r.fetched, 4);
        assert_eq!(r.accepted_priority, 1);
        assert_eq!(r.delivered, 1);
        assert_eq!(r.duplicates, 1);
        assert_eq!(r.rejected_excluded, 1);
        assert_eq!(r.rejected_no_topic, 1);
        assert_eq!(r.rejected(), 2);

        let sent = sink.0.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "priority");
    }

    #[tokio::test]
    async fn disabled_classifier_rejects_normal_items() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(Capture::default());
        let mut p = pipeline(&dir, sink.clone());
        p.filter = RelevanceFilter::new(
            KeywordRuleSet {
                include: vec!["wojn".into()],
                region: vec!["ukrain".into()],
                ..Default::default()
            },
            LengthFloor::default(),
        );
        let out = p
            .process_item(&FeedItem::new("Wojna w Ukrainie trwa dalej", "https://x/1"))
            .await;
        assert_eq!(out, Outcome::ClassificationRejected);
        assert!(sink.0.lock().is_empty());
    }
}
