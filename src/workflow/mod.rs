//! Workflow state machine.
//!
//! `WorkflowState` is the single mutable aggregate of a session. It is changed
//! only through `WorkflowState::apply`, a pure `(state, event) -> state`
//! function that enforces the phase order and the reference-image invariants.

pub mod state;

pub use state::{ReferenceSlot, WorkflowEvent, WorkflowState};
