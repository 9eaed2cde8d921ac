// src/classify/zero_shot.rs
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ClassificationError;

/// Ranks `text` against a fixed candidate label set.
#[async_trait]
pub trait TopicClassifier: Send + Sync {
    /// `(label, confidence)` pairs, highest confidence first. Every label is
    /// one of `labels`.
    async fn rank(
        &self,
        text: &str,
        labels: &[String],
    ) -> Result<Vec<(String, f32)>, ClassificationError>;

    fn name(&self) -> &str;
}

/// Used when classification is switched off. NORMAL items are then rejected.
pub struct DisabledClassifier;

#[async_trait]
impl TopicClassifier for DisabledClassifier {
    async fn rank(
        &self,
        _text: &str,
        _labels: &[String],
    ) -> Result<Vec<(String, f32)>, ClassificationError> {
        Err(ClassificationError::Disabled)
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

/* ----------------------------
Zero-shot HTTP client
---------------------------- */

#[derive(Serialize)]
struct ZeroShotRequest<'a> {
    inputs: &'a str,
    parameters: ZeroShotParams<'a>,
    options: ZeroShotOptions,
}

#[derive(Serialize)]
struct ZeroShotParams<'a> {
    candidate_labels: &'a [String],
}

#[derive(Serialize)]
struct ZeroShotOptions {
    wait_for_model: bool,
}

#[derive(Deserialize)]
struct Columns {
    labels: Vec<String>,
    scores: Vec<f32>,
}

#[derive(Deserialize)]
struct LabelScore {
    label: String,
    score: f32,
}

/// Inference servers disagree on the response shape.
#[derive(Deserialize)]
#[serde(untagged)]
enum ZeroShotAny {
    Columns(Columns),
    Pairs(Vec<LabelScore>),
    Batched(Vec<Columns>),
}

fn flatten(any: ZeroShotAny) -> Result<Vec<(String, f32)>, ClassificationError> {
    match any {
        ZeroShotAny::Columns(c) => columns_to_pairs(c),
        ZeroShotAny::Pairs(p) => Ok(p.into_iter().map(|x| (x.label, x.score)).collect()),
        ZeroShotAny::Batched(mut b) => match b.len() {
            1 => columns_to_pairs(b.remove(0)),
            n => Err(ClassificationError::Malformed(format!(
                "expected one result, got {n}"
            ))),
        },
    }
}

fn columns_to_pairs(c: Columns) -> Result<Vec<(String, f32)>, ClassificationError> {
    if c.labels.len() != c.scores.len() {
        return Err(ClassificationError::Malformed(format!(
            "{} labels vs {} scores",
            c.labels.len(),
            c.scores.len()
        )));
    }
    Ok(c.labels.into_iter().zip(c.scores).collect())
}

/// Rejects scores outside [0,1] and labels nobody asked for, then sorts.
pub(crate) fn validate_ranking(
    mut ranked: Vec<(String, f32)>,
    candidates: &[String],
) -> Result<Vec<(String, f32)>, ClassificationError> {
    if ranked.is_empty() {
        return Err(ClassificationError::Malformed("empty ranking".into()));
    }
    for (label, score) in &ranked {
        if !score.is_finite() || !(0.0..=1.0).contains(score) {
            return Err(ClassificationError::Malformed(format!(
                "score {score} for {label:?}"
            )));
        }
        if !candidates.iter().any(|c| c == label) {
            return Err(ClassificationError::Malformed(format!(
                "unknown label {label:?}"
            )));
        }
    }
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    Ok(ranked)
}

pub struct HfZeroShotClassifier {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HfZeroShotClassifier {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("slavic-news-relay/0.1")
            .timeout(timeout)
            .build()?;
        Ok(Self::with_client(endpoint, api_key, client))
    }

    pub fn with_client(endpoint: &str, api_key: Option<String>, client: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.trim().to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client,
        }
    }
}

#[async_trait]
impl TopicClassifier for HfZeroShotClassifier {
    async fn rank(
        &self,
        text: &str,
        labels: &[String],
    ) -> Result<Vec<(String, f32)>, ClassificationError> {
        let body = ZeroShotRequest {
            inputs: text,
            parameters: ZeroShotParams {
                candidate_labels: labels,
            },
            options: ZeroShotOptions {
                wait_for_model: true,
            },
        };

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| ClassificationError::Http(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClassificationError::Status(status.as_u16()));
        }
        let raw = resp
            .text()
            .await
            .map_err(|e| ClassificationError::Http(e.to_string()))?;

        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Err(ClassificationError::Malformed("empty body".into()));
        }
        let any: ZeroShotAny = serde_json::from_str(trimmed)
            .map_err(|e| ClassificationError::Malformed(e.to_string()))?;

        let ranked = validate_ranking(flatten(any)?, labels)?;
        debug!(target: "classify", top = ?ranked.first(), "zero-shot ranked");
        Ok(ranked)
    }

    fn name(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["polityka krajowa".into(), "sport".into()]
    }

    fn parse(body: &str) -> Result<Vec<(String, f32)>, ClassificationError> {
        let any: ZeroShotAny =
            serde_json::from_str(body).map_err(|e| ClassificationError::Malformed(e.to_string()))?;
        validate_ranking(flatten(any)?, &labels())
    }

    #[test]
    fn columns_shape_is_ranked_descending() {
        let r = parse(r#"{"sequence":"x","labels":["sport","polityka krajowa"],"scores":[0.2,0.75]}"#)
            .unwrap();
        assert_eq!(r[0], ("polityka krajowa".to_string(), 0.75));
        assert_eq!(r[1].0, "sport");
    }

    #[test]
    fn pairs_and_batched_shapes_parse() {
        let r = parse(r#"[{"label":"sport","score":0.9},{"label":"polityka krajowa","score":0.1}]"#)
            .unwrap();
        assert_eq!(r[0].0, "sport");

        let r = parse(r#"[{"labels":["sport"],"scores":[0.4]}]"#).unwrap();
        assert_eq!(r, vec![("sport".to_string(), 0.4)]);
    }

    #[test]
    fn unknown_label_and_bad_scores_are_malformed() {
        assert!(matches!(
            parse(r#"{"labels":["pogoda"],"scores":[0.9]}"#),
            Err(ClassificationError::Malformed(_))
        ));
        assert!(matches!(
            parse(r#"{"labels":["sport"],"scores":[1.5]}"#),
            Err(ClassificationError::Malformed(_))
        ));
        assert!(matches!(
            parse(r#"{"labels":["sport","polityka krajowa"],"scores":[0.5]}"#),
            Err(ClassificationError::Malformed(_))
        ));
        assert!(matches!(parse("[]"), Err(ClassificationError::Malformed(_))));
    }

    #[tokio::test]
    async fn disabled_classifier_reports_disabled() {
        let r = DisabledClassifier.rank("x", &labels()).await;
        assert!(matches!(r, Err(ClassificationError::Disabled)));
    }
}
