// ============================================================
// Layer 3 — Loss Weights
// ============================================================
// Two scalars balance the question-level and answer-level parts
// of the training objective. They arrive from configuration as a
// string-keyed map, e.g. {"question": 1.0, "answer": 0.5}, and
// are validated once here so the rest of the system can rely on
// both being present and positive.

use std::collections::BTreeMap;

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::labels::LabelKind;

pub const QUESTION_KEY: &str = "question";
pub const ANSWER_KEY: &str = "answer";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct LossWeights {
    question: f64,
    answer:   f64,
}

impl LossWeights {
    pub fn new(question: f64, answer: f64) -> Result<Self> {
        for (key, value) in [(QUESTION_KEY, question), (ANSWER_KEY, answer)] {
            ensure!(
                value.is_finite() && value > 0.0,
                "loss weight '{key}' must be a positive number, got {value}"
            );
        }
        Ok(Self { question, answer })
    }

    /// Build from a configuration mapping.
    /// Both keys are required and no other key is accepted.
    pub fn from_map(map: &BTreeMap<String, f64>) -> Result<Self> {
        if let Some(unknown) = map
            .keys()
            .find(|k| k.as_str() != QUESTION_KEY && k.as_str() != ANSWER_KEY)
        {
            bail!("unknown loss weight key '{unknown}' (expected 'question' and 'answer')");
        }

        let question = *map
            .get(QUESTION_KEY)
            .with_context(|| format!("loss weights are missing the '{QUESTION_KEY}' key"))?;
        let answer = *map
            .get(ANSWER_KEY)
            .with_context(|| format!("loss weights are missing the '{ANSWER_KEY}' key"))?;

        Self::new(question, answer)
    }

    /// Parse repeated `key=value` CLI pairs into weights
    pub fn parse_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<Self> {
        let mut map = BTreeMap::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("expected key=value, got '{pair}'"))?;
            let value: f64 = value
                .trim()
                .parse()
                .with_context(|| format!("loss weight '{key}' is not a number: '{value}'"))?;
            if map.insert(key.trim().to_string(), value).is_some() {
                bail!("loss weight '{}' given more than once", key.trim());
            }
        }
        Self::from_map(&map)
    }

    pub fn question(&self) -> f64 {
        self.question
    }

    pub fn answer(&self) -> f64 {
        self.answer
    }

    pub fn for_kind(&self, kind: LabelKind) -> f64 {
        match kind {
            LabelKind::Question => self.question,
            LabelKind::Answer   => self.answer,
        }
    }
}

impl Default for LossWeights {
    fn default() -> Self {
        Self { question: 1.0, answer: 1.0 }
    }
}

impl TryFrom<BTreeMap<String, f64>> for LossWeights {
    type Error = anyhow::Error;

    fn try_from(map: BTreeMap<String, f64>) -> Result<Self> {
        Self::from_map(&map)
    }
}

impl From<LossWeights> for BTreeMap<String, f64> {
    fn from(w: LossWeights) -> Self {
        BTreeMap::from([
            (QUESTION_KEY.to_string(), w.question),
            (ANSWER_KEY.to_string(), w.answer),
        ])
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_from_complete_map() {
        let w = LossWeights::from_map(&map(&[("question", 1.0), ("answer", 0.5)])).unwrap();
        assert_eq!(w.question(), 1.0);
        assert_eq!(w.answer(), 0.5);
        assert_eq!(w.for_kind(LabelKind::Answer), 0.5);
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let err = LossWeights::from_map(&map(&[("question", 1.0)])).unwrap_err();
        assert!(err.to_string().contains("answer"));

        let err = LossWeights::from_map(&map(&[("answer", 1.0)])).unwrap_err();
        assert!(err.to_string().contains("question"));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let m = map(&[("question", 1.0), ("answer", 1.0), ("context", 1.0)]);
        assert!(LossWeights::from_map(&m).is_err());
    }

    #[test]
    fn test_non_positive_weight_is_rejected() {
        assert!(LossWeights::new(0.0, 1.0).is_err());
        assert!(LossWeights::new(1.0, -2.0).is_err());
        assert!(LossWeights::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_parse_cli_pairs() {
        let w = LossWeights::parse_pairs(&["question=2", "answer = 0.25"]).unwrap();
        assert_eq!(w.question(), 2.0);
        assert_eq!(w.answer(), 0.25);

        assert!(LossWeights::parse_pairs(&["question"]).is_err());
        assert!(LossWeights::parse_pairs(&["question=1", "question=2", "answer=1"]).is_err());
    }

    #[test]
    fn test_json_uses_mapping_form() {
        let w: LossWeights = serde_json::from_str(r#"{"question": 1.5, "answer": 0.5}"#).unwrap();
        assert_eq!(w, LossWeights::new(1.5, 0.5).unwrap());

        let back = serde_json::to_value(w).unwrap();
        assert_eq!(back["question"], 1.5);

        assert!(serde_json::from_str::<LossWeights>(r#"{"question": 1.0}"#).is_err());
    }
}
