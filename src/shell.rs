//! Read-only projection of a controller for rendering a step list.

use serde::Serialize;

use crate::controller::{SequenceController, StepState};
use crate::ledger::Progress;
use crate::media::MediaState;
use crate::sequence::StepId;

/// One row of the step list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepView {
    pub index: usize,
    pub id: StepId,
    pub title: String,
    /// Source kind label: "embedded", "direct" or "unsupported"
    pub kind: &'static str,
    pub state: StepState,
    pub locked: bool,
    pub completed: bool,
    pub current: bool,
}

/// Everything a viewer needs to draw the current session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewerState {
    pub sequence_id: String,
    pub current_step_index: usize,
    pub media_state: MediaState,
    pub progress: Progress,
    pub steps: Vec<StepView>,
}

impl ViewerState {
    pub fn capture(controller: &SequenceController) -> Self {
        let factory = controller.media_factory();
        let current = controller.current_step_index();
        let steps = controller
            .sequence()
            .steps()
            .iter()
            .map(|step| {
                let index = step.order_index;
                StepView {
                    index,
                    id: step.id.clone(),
                    title: step.label().to_string(),
                    kind: factory.classify(&step.source_ref).label(),
                    state: controller.step_state(index).unwrap_or(StepState::Locked),
                    locked: !controller.is_unlocked(index),
                    completed: controller.is_completed(index),
                    current: index == current,
                }
            })
            .collect();

        ViewerState {
            sequence_id: controller.sequence().id().to_string(),
            current_step_index: current,
            media_state: controller.media_state(),
            progress: controller.progress(),
            steps,
        }
    }

    /// Plain-text step list, one line per step
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "{} [{}/{} completed]\n",
            self.sequence_id, self.progress.completed, self.progress.total
        );
        for s in &self.steps {
            let marker = if s.current { '>' } else { ' ' };
            let status = if s.completed {
                "done"
            } else if s.locked {
                "locked"
            } else {
                "open"
            };
            out.push_str(&format!(
                "{} {:>2}. {:<32} {:<7} {}\n",
                marker, s.index, s.title, status, s.kind
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventSink;
    use crate::media::MediaFactory;
    use crate::sequence::Step;

    #[test]
    fn projection_marks_lock_and_current() {
        let steps = vec![
            Step::new("intro", 0, "https://youtu.be/abc123").with_title("Introduction"),
            Step::new("body", 1, "https://cdn.example.com/body.mp4"),
            Step::new("notes", 2, "https://cdn.example.com/notes.pdf"),
        ];
        let mut c =
            SequenceController::from_steps("m", steps, MediaFactory::default(), EventSink::new()).unwrap();
        c.mark_completed(0).unwrap();

        let view = ViewerState::capture(&c);
        assert_eq!(view.steps.len(), 3);
        assert!(view.steps[0].completed && view.steps[0].current);
        assert_eq!(view.steps[0].kind, "embedded");
        assert!(!view.steps[1].locked);
        assert!(view.steps[2].locked);
        assert_eq!(view.steps[2].kind, "unsupported");
        assert_eq!(view.steps[1].title, "body");

        let text = view.render_text();
        assert!(text.starts_with("m [1/3 completed]"));
        assert!(text.contains("Introduction"));
        assert!(text.lines().nth(3).unwrap().contains("locked"));
    }
}
