//! The sequence state machine: current position, gating, and completion.
//!
//! Per-step states are derived rather than stored:
//!
//! | state | condition |
//! |---|---|
//! | `Locked` | predecessor not completed |
//! | `UnlockedNotStarted` | unlocked, not current, not completed |
//! | `Playing` | current step with live media |
//! | `Completed` | in the ledger and not currently playing |
//!
//! Unlocking a step never navigates to it. The caller selects the next
//! step explicitly.

use serde::Serialize;

use crate::events::{EventSink, ViewerEvent};
use crate::ledger::{LedgerSnapshot, Progress, ProgressLedger};
use crate::media::{MediaAdapter, MediaFactory, MediaHandle, MediaSignal, MediaState, RawMediaEvent, SourceKind};
use crate::sequence::{Sequence, Step};
use crate::Result;

/// Derived state of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Locked,
    UnlockedNotStarted,
    Playing,
    Completed,
}

/// Outcome of [`SequenceController::select_step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// The step is current and its media is mounted under `token`
    Mounted { token: u64 },
    /// The step is locked; nothing changed
    Denied,
    /// The step is current but cannot be played
    Unavailable,
}

/// Outcome of [`SequenceController::handle_media_event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaOutcome {
    /// The event belongs to media that is no longer mounted
    Stale,
    /// The adapter had nothing to say about the event
    Ignored,
    /// Media state changed
    Updated(MediaState),
    /// The event was a natural end and the step is now completed
    Completed,
}

/// Current position and media state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlaybackSession {
    pub current_step_index: usize,
    pub media_state: MediaState,
}

struct ActiveMedia {
    handle: MediaHandle,
    adapter: Box<dyn MediaAdapter>,
}

/// Owns one sequence's viewing session.
///
/// Build a fresh controller whenever a sequence is opened and drop it when
/// navigating away. All calls are synchronous; the host forwards player
/// events through [`handle_media_event`](Self::handle_media_event) tagged with
/// the token returned at mount time.
pub struct SequenceController {
    sequence: Sequence,
    ledger: ProgressLedger,
    media: MediaFactory,
    events: EventSink,
    current: usize,
    media_state: MediaState,
    active: Option<ActiveMedia>,
    next_token: u64,
}

impl SequenceController {
    pub fn new(sequence: Sequence, media: MediaFactory, events: EventSink) -> Self {
        let ledger = ProgressLedger::new(&sequence, events.clone());
        Self::with_ledger(sequence, ledger, media, events)
    }

    /// Validate raw steps and build a controller. Fails with
    /// [`crate::Error::InvalidSequence`] on malformed input.
    pub fn from_steps(
        sequence_id: impl Into<String>,
        steps: Vec<Step>,
        media: MediaFactory,
        events: EventSink,
    ) -> Result<Self> {
        let sequence = Sequence::new(sequence_id, steps)?;
        Ok(Self::new(sequence, media, events))
    }

    /// Resume a session from a persisted ledger snapshot
    pub fn resume(
        sequence: Sequence,
        snapshot: &LedgerSnapshot,
        media: MediaFactory,
        events: EventSink,
    ) -> Result<Self> {
        let ledger = ProgressLedger::restore(&sequence, snapshot, events.clone())?;
        Ok(Self::with_ledger(sequence, ledger, media, events))
    }

    fn with_ledger(sequence: Sequence, ledger: ProgressLedger, media: MediaFactory, events: EventSink) -> Self {
        log::debug!("opened sequence '{}' with {} steps", sequence.id(), sequence.len());
        SequenceController {
            sequence,
            ledger,
            media,
            events,
            current: 0,
            media_state: MediaState::Idle,
            active: None,
            next_token: 1,
        }
    }

    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn media_factory(&self) -> &MediaFactory {
        &self.media
    }

    pub fn current_step_index(&self) -> usize {
        self.current
    }

    pub fn current_step(&self) -> &Step {
        &self.sequence.steps()[self.current]
    }

    pub fn media_state(&self) -> MediaState {
        self.media_state
    }

    pub fn session(&self) -> PlaybackSession {
        PlaybackSession {
            current_step_index: self.current,
            media_state: self.media_state,
        }
    }

    /// Token of the mounted media, if any
    pub fn active_token(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.handle.token())
    }

    /// Source kind of the mounted media, if any
    pub fn active_kind(&self) -> Option<&SourceKind> {
        self.active.as_ref().map(|a| a.adapter.kind())
    }

    pub fn is_unlocked(&self, index: usize) -> bool {
        index < self.sequence.len() && self.ledger.is_unlocked_at(index)
    }

    pub fn is_completed(&self, index: usize) -> bool {
        self.sequence
            .get(index)
            .map(|s| self.ledger.is_completed(s))
            .unwrap_or(false)
    }

    pub fn is_finished(&self) -> bool {
        self.ledger.is_finished()
    }

    pub fn progress(&self) -> Progress {
        self.ledger.progress()
    }

    pub fn step_state(&self, index: usize) -> Result<StepState> {
        let step = self.sequence.step(index)?;
        let state = if index == self.current && self.media_state.is_active() && self.active.is_some() {
            StepState::Playing
        } else if self.ledger.is_completed(step) {
            StepState::Completed
        } else if self.ledger.is_unlocked(step) {
            StepState::UnlockedNotStarted
        } else {
            StepState::Locked
        };
        Ok(state)
    }

    /// First unlocked, not yet completed step after the current one.
    ///
    /// A hint for "next part" buttons; it does not navigate.
    pub fn next_unlocked_index(&self) -> Option<usize> {
        (self.current + 1..self.sequence.len()).find(|&i| self.is_unlocked(i) && !self.is_completed(i))
    }

    /// Navigate to step `index`.
    ///
    /// Out-of-range indices fail with [`crate::Error::InvalidStepIndex`]. Locked
    /// steps emit [`ViewerEvent::AccessDenied`] and leave the session
    /// untouched. Otherwise any mounted media is released and the step is
    /// mounted under a fresh token; a source no adapter can play leaves
    /// the step current in the `Errored` state and emits
    /// [`ViewerEvent::PlaybackUnavailable`].
    pub fn select_step(&mut self, index: usize) -> Result<Selection> {
        let step = self.sequence.step(index)?.clone();

        if !self.ledger.is_unlocked(&step) {
            log::info!("access denied to locked step '{}'", step.id);
            self.events.emit(ViewerEvent::AccessDenied { step_id: step.id });
            return Ok(Selection::Denied);
        }

        self.unmount_active();
        self.current = index;

        let mut adapter = match self.media.adapter_for(&step) {
            Ok(a) => a,
            Err(err) => {
                self.fail_current(&step, err.to_string());
                return Ok(Selection::Unavailable);
            }
        };

        let token = self.next_token;
        self.next_token += 1;
        let handle = MediaHandle::new(token, &step);
        if let Err(err) = adapter.mount(&handle) {
            adapter.unmount();
            self.fail_current(&step, err.to_string());
            return Ok(Selection::Unavailable);
        }

        log::debug!("step {} ('{}') mounted with token {}", index, step.id, token);
        self.media_state = handle.state();
        self.active = Some(ActiveMedia { handle, adapter });
        Ok(Selection::Mounted { token })
    }

    /// Feed a raw player event for the media mounted under `token`.
    ///
    /// Events for any other token are discarded. A natural end completes
    /// the current step at most once per mount. A failure makes the step
    /// unavailable, and every later event for that mount is ignored until
    /// the step is selected again.
    pub fn handle_media_event(&mut self, token: u64, event: RawMediaEvent) -> Result<MediaOutcome> {
        let active = match self.active.as_mut() {
            Some(a) if a.handle.token() == token => a,
            _ => {
                log::debug!("discarding stale media event {:?} for token {}", event, token);
                return Ok(MediaOutcome::Stale);
            }
        };

        if active.handle.failed {
            log::debug!("ignoring {:?} for failed mount {}", event, token);
            return Ok(MediaOutcome::Ignored);
        }

        let signal = match active.adapter.interpret(&event) {
            Some(s) => s,
            None => return Ok(MediaOutcome::Ignored),
        };

        let state = signal.state();
        active.handle.state = state;
        self.media_state = state;

        match signal {
            MediaSignal::Ended { natural: true } => {
                if active.handle.ended {
                    return Ok(MediaOutcome::Updated(state));
                }
                active.handle.ended = true;
                let step_id = active.handle.step_id().clone();
                self.ledger.mark_completed(&step_id)?;
                Ok(MediaOutcome::Completed)
            }
            MediaSignal::Failed(reason) => {
                active.handle.failed = true;
                let step_id = active.handle.step_id().clone();
                log::warn!("playback failed for step '{}': {}", step_id, reason);
                self.events.emit(ViewerEvent::PlaybackUnavailable { step_id, reason });
                Ok(MediaOutcome::Updated(state))
            }
            _ => Ok(MediaOutcome::Updated(state)),
        }
    }

    /// Explicit "mark as complete" override.
    ///
    /// Allowed for any unlocked step and has the same ledger effect as a
    /// natural end. A locked step emits [`ViewerEvent::AccessDenied`] and
    /// returns `false`, as does a step that was already completed.
    pub fn mark_completed(&mut self, index: usize) -> Result<bool> {
        let step = self.sequence.step(index)?;
        if !self.ledger.is_unlocked(step) {
            let step_id = step.id.clone();
            log::info!("refusing to complete locked step '{}'", step_id);
            self.events.emit(ViewerEvent::AccessDenied { step_id });
            return Ok(false);
        }
        let step_id = step.id.clone();
        self.ledger.mark_completed(&step_id)
    }

    /// Close the current session and open another sequence from scratch
    pub fn switch_sequence(&mut self, sequence: Sequence) {
        self.unmount_active();
        self.ledger.rebind(&sequence);
        log::debug!("switched from '{}' to '{}'", self.sequence.id(), sequence.id());
        self.sequence = sequence;
        self.current = 0;
        self.media_state = MediaState::Idle;
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.ledger.snapshot()
    }

    /// Release mounted media; the ledger is kept
    pub fn close(&mut self) {
        self.unmount_active();
        self.media_state = MediaState::Idle;
    }

    fn unmount_active(&mut self) {
        if let Some(mut active) = self.active.take() {
            log::debug!("unmounting token {}", active.handle.token());
            active.adapter.unmount();
        }
    }

    fn fail_current(&mut self, step: &Step, reason: String) {
        log::warn!("step '{}' is unavailable: {}", step.id, reason);
        self.media_state = MediaState::Errored;
        self.events.emit(ViewerEvent::PlaybackUnavailable {
            step_id: step.id.clone(),
            reason,
        });
    }
}

impl Drop for SequenceController {
    fn drop(&mut self) {
        self.unmount_active();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;
    use crate::media::{ElementEvent, ProviderLoader, ProviderRuntime, SourceRules};
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn controller(sources: &[&str]) -> (SequenceController, EventLog) {
        let steps = sources
            .iter()
            .enumerate()
            .map(|(i, src)| Step::new(format!("part-{}", i), i, *src))
            .collect();
        let sink = EventSink::new();
        let log = EventLog::attach(&sink);
        let c = SequenceController::from_steps("material", steps, MediaFactory::default(), sink).unwrap();
        (c, log)
    }

    const MP4: &str = "https://cdn.example.com/v.mp4";

    fn ended() -> RawMediaEvent {
        RawMediaEvent::Element(ElementEvent::Ended)
    }

    const EMBED: &str = "https://youtu.be/abcDEF12345";

    #[test]
    fn failed_mount_is_unavailable_then_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();
        let loader = ProviderLoader::with_bootstrap("api", move |url| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::NetworkError("script blocked".into()))
            } else {
                Ok(ProviderRuntime::new(url))
            }
        });
        let media = MediaFactory::new(SourceRules::default(), loader.clone());
        let sink = EventSink::new();
        let log = EventLog::attach(&sink);
        let steps = vec![Step::new("a", 0, EMBED), Step::new("b", 1, EMBED)];
        let mut c = SequenceController::from_steps("material", steps, media, sink).unwrap();

        assert_eq!(c.select_step(0).unwrap(), Selection::Unavailable);
        assert_eq!(c.media_state(), MediaState::Errored);
        assert!(c.active_token().is_none());
        assert!(matches!(
            log.events().as_slice(),
            [ViewerEvent::PlaybackUnavailable { .. }]
        ));

        assert!(matches!(c.select_step(0).unwrap(), Selection::Mounted { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn only_one_mount_is_alive() {
        let loader = ProviderLoader::new("api");
        let media = MediaFactory::new(SourceRules::default(), loader.clone());
        let steps = vec![Step::new("a", 0, EMBED), Step::new("b", 1, EMBED)];
        let mut c = SequenceController::from_steps("material", steps, media, EventSink::new()).unwrap();

        for _ in 0..3 {
            c.select_step(0).unwrap();
        }
        c.mark_completed(0).unwrap();
        c.select_step(1).unwrap();
        assert_eq!(loader.runtime().unwrap().live_players(), 1);

        let other = Sequence::new("other", vec![Step::new("x", 0, EMBED)]).unwrap();
        c.switch_sequence(other);
        assert_eq!(loader.runtime().unwrap().live_players(), 0);

        c.select_step(0).unwrap();
        assert_eq!(loader.runtime().unwrap().live_players(), 1);
        c.close();
        assert_eq!(loader.runtime().unwrap().live_players(), 0);
    }

    #[test]
    fn initial_states() {
        let (c, _) = controller(&[MP4, MP4, MP4]);
        assert_eq!(c.step_state(0).unwrap(), StepState::UnlockedNotStarted);
        assert_eq!(c.step_state(1).unwrap(), StepState::Locked);
        assert_eq!(c.media_state(), MediaState::Idle);
        assert_eq!(c.current_step_index(), 0);
    }

    #[test]
    fn select_mounts_and_plays() {
        let (mut c, _) = controller(&[MP4, MP4]);
        let token = match c.select_step(0).unwrap() {
            Selection::Mounted { token } => token,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(c.media_state(), MediaState::Loading);
        assert_eq!(c.step_state(0).unwrap(), StepState::Playing);
        let out = c
            .handle_media_event(token, RawMediaEvent::Element(ElementEvent::Playing))
            .unwrap();
        assert_eq!(out, MediaOutcome::Updated(MediaState::Playing));
    }

    #[test]
    fn loaded_media_is_not_paused() {
        let (mut c, _) = controller(&[MP4]);
        let Selection::Mounted { token } = c.select_step(0).unwrap() else { panic!() };
        let out = c
            .handle_media_event(token, RawMediaEvent::Element(ElementEvent::Loaded))
            .unwrap();
        assert_eq!(out, MediaOutcome::Updated(MediaState::Loading));
        c.handle_media_event(token, RawMediaEvent::Element(ElementEvent::Pause))
            .unwrap();
        assert_eq!(c.media_state(), MediaState::Paused);
    }

    #[test]
    fn natural_end_completes_without_advancing() {
        let (mut c, log) = controller(&[MP4, MP4]);
        let Selection::Mounted { token } = c.select_step(0).unwrap() else { panic!() };
        assert_eq!(c.handle_media_event(token, ended()).unwrap(), MediaOutcome::Completed);
        assert!(c.is_unlocked(1));
        assert_eq!(c.current_step_index(), 0);
        assert_eq!(c.step_state(1).unwrap(), StepState::UnlockedNotStarted);
        assert_eq!(c.next_unlocked_index(), Some(1));
        assert_eq!(log.count_completed(&"part-0".into()), 1);

        // A second end on the same mount changes nothing.
        assert_eq!(
            c.handle_media_event(token, ended()).unwrap(),
            MediaOutcome::Updated(MediaState::Ended)
        );
        assert_eq!(log.count_completed(&"part-0".into()), 1);
    }

    #[test]
    fn out_of_range_is_an_error() {
        let (mut c, _) = controller(&[MP4]);
        assert!(matches!(c.select_step(3), Err(Error::InvalidStepIndex { index: 3, len: 1 })));
        assert!(matches!(c.mark_completed(9), Err(Error::InvalidStepIndex { .. })));
        assert_eq!(c.current_step_index(), 0);
    }

    #[test]
    fn errors_never_complete() {
        let (mut c, log) = controller(&[MP4, MP4]);
        let Selection::Mounted { token } = c.select_step(0).unwrap() else { panic!() };
        let out = c
            .handle_media_event(token, RawMediaEvent::TransportError("404".into()))
            .unwrap();
        assert_eq!(out, MediaOutcome::Updated(MediaState::Errored));
        assert!(!c.is_completed(0));
        assert!(!c.is_unlocked(1));
        assert!(matches!(
            log.events().last(),
            Some(ViewerEvent::PlaybackUnavailable { .. })
        ));
    }

    #[test]
    fn manual_override_on_locked_step_is_denied() {
        let (mut c, log) = controller(&[MP4, MP4]);
        assert!(!c.mark_completed(1).unwrap());
        assert!(matches!(log.events()[0], ViewerEvent::AccessDenied { .. }));
        assert!(c.mark_completed(0).unwrap());
        assert!(!c.mark_completed(0).unwrap());
        assert!(c.mark_completed(1).unwrap());
        assert!(c.is_finished());
    }

    #[test]
    fn revisit_completed_step_replays() {
        let (mut c, log) = controller(&[MP4, MP4]);
        c.mark_completed(0).unwrap();
        let Selection::Mounted { token } = c.select_step(0).unwrap() else { panic!() };
        assert_eq!(c.step_state(0).unwrap(), StepState::Playing);
        c.handle_media_event(token, ended()).unwrap();
        assert_eq!(log.count_completed(&"part-0".into()), 1);
        assert_eq!(c.step_state(0).unwrap(), StepState::Playing);
        c.close();
        assert_eq!(c.step_state(0).unwrap(), StepState::Completed);
    }

    #[test]
    fn switching_sequences_resets_and_cancels() {
        let (mut c, _) = controller(&[MP4, MP4]);
        let Selection::Mounted { token } = c.select_step(0).unwrap() else { panic!() };
        c.mark_completed(0).unwrap();
        let other = Sequence::new("other", vec![Step::new("x", 0, MP4), Step::new("y", 1, MP4)]).unwrap();
        c.switch_sequence(other);
        assert_eq!(c.sequence().id(), "other");
        assert_eq!(c.ledger().completed_count(), 0);
        assert!(!c.is_unlocked(1));
        assert_eq!(c.active_token(), None);
        assert_eq!(c.handle_media_event(token, ended()).unwrap(), MediaOutcome::Stale);
    }

    #[test]
    fn resume_from_snapshot() {
        let (mut c, _) = controller(&[MP4, MP4, MP4]);
        c.mark_completed(0).unwrap();
        let snap = c.snapshot();
        let seq = c.sequence().clone();
        let resumed = SequenceController::resume(seq, &snap, MediaFactory::default(), EventSink::new()).unwrap();
        assert!(resumed.is_unlocked(1));
        assert!(!resumed.is_unlocked(2));
    }
}
