//! Completion ledger and the lock state derived from it.
//!
//! A step is unlocked iff it is the first step or its immediate predecessor
//! is completed. Completion only ever grows during a session, so unlock
//! state is monotonic.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::events::{EventSink, ViewerEvent};
use crate::sequence::{Sequence, Step, StepId};
use crate::{Error, Result};

/// Persistable shape of a ledger, for session resume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub sequence_id: String,
    /// Fingerprint of the sequence the snapshot was taken against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Completed step ids in sequence order
    pub completed: Vec<StepId>,
}

/// Aggregated completion counts, useful for progress bars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub remaining: usize,
    pub is_complete: bool,
}

/// Per-sequence record of completed steps.
#[derive(Debug)]
pub struct ProgressLedger {
    sequence_id: String,
    fingerprint: String,
    index: HashMap<StepId, usize>,
    completed: HashSet<StepId>,
    // unlocked[i] caches the gating predicate for order index i
    unlocked: Vec<bool>,
    events: EventSink,
}

impl ProgressLedger {
    /// Empty ledger for `sequence`; only the first step is unlocked.
    pub fn new(sequence: &Sequence, events: EventSink) -> Self {
        let mut ledger = ProgressLedger {
            sequence_id: String::new(),
            fingerprint: String::new(),
            index: HashMap::new(),
            completed: HashSet::new(),
            unlocked: Vec::new(),
            events,
        };
        ledger.rebind(sequence);
        ledger
    }

    /// Rebuild a ledger from a snapshot.
    ///
    /// The snapshot must name the same sequence (and, if it carries one, the
    /// same fingerprint). Restored completions do not emit events.
    pub fn restore(sequence: &Sequence, snapshot: &LedgerSnapshot, events: EventSink) -> Result<Self> {
        if snapshot.sequence_id != sequence.id() {
            return Err(Error::SnapshotMismatch(format!(
                "snapshot is for sequence '{}', not '{}'",
                snapshot.sequence_id,
                sequence.id()
            )));
        }
        if let Some(fp) = &snapshot.fingerprint {
            if fp != &sequence.fingerprint() {
                return Err(Error::SnapshotMismatch(format!(
                    "sequence '{}' changed since the snapshot was taken",
                    sequence.id()
                )));
            }
        }

        let mut ledger = ProgressLedger::new(sequence, events);
        for id in &snapshot.completed {
            let idx = ledger.order_of(id)?;
            ledger.insert(id.clone(), idx);
        }
        log::debug!(
            "restored ledger for '{}' with {} completed step(s)",
            ledger.sequence_id,
            ledger.completed.len()
        );
        Ok(ledger)
    }

    pub fn sequence_id(&self) -> &str {
        &self.sequence_id
    }

    /// Mark a step completed.
    ///
    /// Returns `true` on the first insertion, which also emits
    /// [`ViewerEvent::StepCompleted`]. Repeat calls are silent no-ops.
    pub fn mark_completed(&mut self, step_id: &StepId) -> Result<bool> {
        let idx = self.order_of(step_id)?;
        if self.completed.contains(step_id) {
            return Ok(false);
        }
        self.insert(step_id.clone(), idx);
        log::info!("step '{}' completed in '{}'", step_id, self.sequence_id);
        self.events.emit(ViewerEvent::StepCompleted {
            step_id: step_id.clone(),
        });
        Ok(true)
    }

    pub fn is_unlocked(&self, step: &Step) -> bool {
        self.is_unlocked_at(step.order_index)
    }

    pub fn is_completed(&self, step: &Step) -> bool {
        self.completed.contains(&step.id)
    }

    /// Gating predicate by order index; out-of-range indices are locked.
    pub fn is_unlocked_at(&self, order_index: usize) -> bool {
        order_index == 0 || self.unlocked.get(order_index).copied().unwrap_or(false)
    }

    pub fn is_completed_id(&self, step_id: &StepId) -> bool {
        self.completed.contains(step_id)
    }

    /// Forget all completions. Used when switching to another sequence.
    pub fn reset(&mut self) {
        self.completed.clear();
        for (i, u) in self.unlocked.iter_mut().enumerate() {
            *u = i == 0;
        }
    }

    /// Reset and point the ledger at a different sequence
    pub(crate) fn rebind(&mut self, sequence: &Sequence) {
        self.sequence_id = sequence.id().to_string();
        self.fingerprint = sequence.fingerprint();
        self.index = sequence
            .steps()
            .iter()
            .map(|s| (s.id.clone(), s.order_index))
            .collect();
        self.unlocked = vec![false; sequence.len()];
        self.reset();
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn is_finished(&self) -> bool {
        !self.index.is_empty() && self.completed.len() == self.index.len()
    }

    pub fn progress(&self) -> Progress {
        let total = self.index.len();
        let completed = self.completed.len();
        Progress {
            total,
            completed,
            remaining: total - completed,
            is_complete: self.is_finished(),
        }
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut done: Vec<(usize, &StepId)> = self
            .completed
            .iter()
            .filter_map(|id| self.index.get(id).map(|&i| (i, id)))
            .collect();
        done.sort_by_key(|(i, _)| *i);
        LedgerSnapshot {
            sequence_id: self.sequence_id.clone(),
            fingerprint: Some(self.fingerprint.clone()),
            completed: done.into_iter().map(|(_, id)| id.clone()).collect(),
        }
    }

    fn order_of(&self, step_id: &StepId) -> Result<usize> {
        self.index
            .get(step_id)
            .copied()
            .ok_or_else(|| Error::UnknownStep(step_id.to_string()))
    }

    fn insert(&mut self, step_id: StepId, order_index: usize) {
        self.completed.insert(step_id);
        if let Some(next) = self.unlocked.get_mut(order_index + 1) {
            *next = true;
        }
    }
}
