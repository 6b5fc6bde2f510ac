//! Repair loop state machine.
//!
//! ```text
//! GENERATING -> TESTING -> DONE
//!                       -> CRITIQUING -> GENERATING
//! ```
//!
//! [`RepairState::on`] is the only place transitions are decided. The driver in
//! `crate::repair` performs the side effects and feeds back [`RepairEvent`]s.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    /// A program passed every test case.
    Solved,
    /// The generation budget ran out first.
    BudgetExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairState {
    Generating,
    Testing,
    Critiquing,
    Done(DoneReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairEvent {
    /// A syntactically valid program was produced.
    Generated,
    /// The developer exhausted its generation retries; the round scores 0.0.
    GenerationFailed,
    /// A test run finished; only a full pass on a non-empty suite solves.
    Tested { passed: usize, total: usize },
    Critiqued,
}

#[derive(Debug, Error, PartialEq)]
#[error("event {event:?} is not valid in state {state:?}")]
pub struct TransitionError {
    pub state: RepairState,
    pub event: RepairEvent,
}

impl RepairState {
    /// Entry state: a seeded program is tested first, otherwise one is generated.
    pub fn start(has_program: bool, generations: u32) -> Self {
        if has_program {
            RepairState::Testing
        } else if generations > 0 {
            RepairState::Generating
        } else {
            RepairState::Done(DoneReason::BudgetExhausted)
        }
    }

    pub fn is_done(self) -> bool {
        matches!(self, RepairState::Done(_))
    }

    /// Next state after `event`, given how many generations the budget still allows.
    pub fn on(self, event: RepairEvent, generations_left: u32) -> Result<Self, TransitionError> {
        let next = match (self, event) {
            (RepairState::Generating, RepairEvent::Generated) => RepairState::Testing,
            (RepairState::Generating, RepairEvent::GenerationFailed) => {
                if generations_left > 0 {
                    RepairState::Generating
                } else {
                    RepairState::Done(DoneReason::BudgetExhausted)
                }
            }
            (RepairState::Testing, RepairEvent::Tested { passed, total }) => {
                if total > 0 && passed == total {
                    RepairState::Done(DoneReason::Solved)
                } else if generations_left > 0 {
                    RepairState::Critiquing
                } else {
                    RepairState::Done(DoneReason::BudgetExhausted)
                }
            }
            (RepairState::Critiquing, RepairEvent::Critiqued) => RepairState::Generating,
            (state, event) => return Err(TransitionError { state, event }),
        };
        Ok(next)
    }
}
