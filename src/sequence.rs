//! Steps and the ordered sequences that own them.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Identifier of a step, unique within its sequence and stable across reloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        StepId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(s: &str) -> Self {
        StepId(s.to_string())
    }
}

impl From<String> for StepId {
    fn from(s: String) -> Self {
        StepId(s)
    }
}

/// One playable unit within a sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique id within the owning sequence
    pub id: StepId,
    /// Zero-based position in the sequence
    pub order_index: usize,
    /// Locator whose shape selects the media adapter
    pub source_ref: String,
    /// Expected length in seconds, display only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_hint: Option<f64>,
    /// Display title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Step {
    pub fn new(id: impl Into<StepId>, order_index: usize, source_ref: impl Into<String>) -> Self {
        Step {
            id: id.into(),
            order_index,
            source_ref: source_ref.into(),
            duration_hint: None,
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_duration_hint(mut self, seconds: f64) -> Self {
        self.duration_hint = Some(seconds);
        self
    }

    /// Title if present, otherwise the id
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(self.id.as_str())
    }
}

/// Wire shape of a sequence before validation
#[derive(Deserialize)]
struct RawSequence {
    id: String,
    steps: Vec<Step>,
}

/// An ordered, validated collection of steps belonging to one content item.
///
/// Steps are held sorted by `order_index`, so a step's position in
/// [`Sequence::steps`] equals its order index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sequence {
    id: String,
    steps: Vec<Step>,
}

impl Sequence {
    /// Validate and build a sequence.
    ///
    /// Fails with [`Error::InvalidSequence`] when the input is empty, when
    /// step ids repeat, or when `order_index` values are not a contiguous
    /// run starting at 0.
    pub fn new(id: impl Into<String>, mut steps: Vec<Step>) -> Result<Self> {
        let id = id.into();
        if steps.is_empty() {
            return Err(Error::InvalidSequence(format!("sequence '{}' has no steps", id)));
        }

        steps.sort_by_key(|s| s.order_index);
        for (expected, step) in steps.iter().enumerate() {
            if step.order_index != expected {
                let detail = if expected > 0 && steps[expected - 1].order_index == step.order_index {
                    format!("duplicate order_index {}", step.order_index)
                } else {
                    format!("expected order_index {}, found {}", expected, step.order_index)
                };
                return Err(Error::InvalidSequence(format!("sequence '{}': {}", id, detail)));
            }
        }

        let mut seen = HashSet::with_capacity(steps.len());
        for step in &steps {
            if !seen.insert(&step.id) {
                return Err(Error::InvalidSequence(format!(
                    "sequence '{}': duplicate step id '{}'",
                    id, step.id
                )));
            }
        }

        Ok(Sequence { id, steps })
    }

    /// Parse and validate a sequence from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawSequence = serde_json::from_str(json)?;
        Sequence::new(raw.id, raw.steps)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false for a validated sequence
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Step at `index`, or [`Error::InvalidStepIndex`]
    pub fn step(&self, index: usize) -> Result<&Step> {
        self.steps.get(index).ok_or(Error::InvalidStepIndex {
            index,
            len: self.steps.len(),
        })
    }

    pub fn index_of(&self, id: &StepId) -> Option<usize> {
        self.steps.iter().position(|s| &s.id == id)
    }

    /// Hex SHA-256 over the sequence id and every step's order and id.
    ///
    /// Sources are left out: two sequences with the same fingerprint gate
    /// identically even when a step's media moved, so a ledger snapshot
    /// taken against one can be restored into the other.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_bytes());
        for step in &self.steps {
            hasher.update([0u8]);
            hasher.update(step.order_index.to_le_bytes());
            hasher.update(step.id.as_str().as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

impl<'de> Deserialize<'de> for Sequence {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawSequence::deserialize(deserializer)?;
        Sequence::new(raw.id, raw.steps).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(orders: &[usize]) -> Vec<Step> {
        orders
            .iter()
            .map(|&o| Step::new(format!("s{}", o), o, format!("https://cdn.example.com/{}.mp4", o)))
            .collect()
    }

    #[test]
    fn sorts_steps_by_order_index() {
        let seq = Sequence::new("m1", steps(&[2, 0, 1])).unwrap();
        let orders: Vec<usize> = seq.steps().iter().map(|s| s.order_index).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert_eq!(seq.get(1).unwrap().id.as_str(), "s1");
    }

    #[test]
    fn rejects_gaps_and_duplicates() {
        let gap = Sequence::new("m1", steps(&[0, 2])).unwrap_err();
        assert!(gap.to_string().contains("expected order_index 1"));

        let dup = Sequence::new("m1", steps(&[0, 1, 1])).unwrap_err();
        assert!(dup.to_string().contains("duplicate order_index 1"));

        let late_start = Sequence::new("m1", steps(&[1, 2])).unwrap_err();
        assert!(matches!(late_start, Error::InvalidSequence(_)));
    }

    #[test]
    fn rejects_empty_and_repeated_ids() {
        assert!(matches!(Sequence::new("m1", vec![]), Err(Error::InvalidSequence(_))));

        let twins = vec![Step::new("a", 0, "x"), Step::new("a", 1, "y")];
        let err = Sequence::new("m1", twins).unwrap_err();
        assert!(err.to_string().contains("duplicate step id 'a'"));
    }

    #[test]
    fn deserializing_validates() {
        let ok = r#"{"id":"m1","steps":[{"id":"a","order_index":0,"source_ref":"https://x/a.mp4"}]}"#;
        let seq: Sequence = serde_json::from_str(ok).unwrap();
        assert_eq!(seq.len(), 1);

        let bad = r#"{"id":"m1","steps":[{"id":"a","order_index":3,"source_ref":"x"}]}"#;
        assert!(serde_json::from_str::<Sequence>(bad).is_err());
        assert!(matches!(Sequence::from_json(bad), Err(Error::InvalidSequence(_))));
    }

    #[test]
    fn fingerprint_tracks_shape() {
        let a = Sequence::new("m1", steps(&[0, 1])).unwrap();
        let b = Sequence::new("m1", steps(&[1, 0])).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        let c = Sequence::new("m1", steps(&[0, 1, 2])).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn fingerprint_ignores_rehosted_sources() {
        let a = Sequence::new("m1", steps(&[0, 1])).unwrap();
        let mut moved = steps(&[0, 1]);
        moved[0].source_ref = "https://mirror.example.com/s0.webm".to_string();
        let b = Sequence::new("m1", moved).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut renamed = steps(&[0, 1]);
        renamed[1].id = StepId::from("other");
        let c = Sequence::new("m1", renamed).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn step_lookup_reports_range() {
        let seq = Sequence::new("m1", steps(&[0])).unwrap();
        match seq.step(4) {
            Err(Error::InvalidStepIndex { index, len }) => {
                assert_eq!(index, 4);
                assert_eq!(len, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(seq.index_of(&StepId::from("s0")), Some(0));
    }
}
