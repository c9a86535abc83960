//! Explicit submission state for user actions.
//!
//! Each write flow owns one machine: Idle → Pending → Succeeded or Failed.
//! `begin` refuses re-entry while Pending, which is what keeps a second
//! submission from racing the first.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionState<T> {
    Idle,
    Pending,
    Succeeded(T),
    Failed(String),
}

impl<T> ActionState<T> {
    pub fn new() -> Self {
        ActionState::Idle
    }

    /// Enter Pending. Returns false (and changes nothing) when the action
    /// is already in flight; finished states may begin again for a retry.
    pub fn begin(&mut self) -> bool {
        if matches!(self, ActionState::Pending) {
            return false;
        }
        *self = ActionState::Pending;
        true
    }

    /// Record a success. Only meaningful from Pending; ignored otherwise.
    pub fn succeed(&mut self, value: T) {
        if matches!(self, ActionState::Pending) {
            *self = ActionState::Succeeded(value);
        }
    }

    /// Record a failure. Only meaningful from Pending; ignored otherwise.
    pub fn fail(&mut self, message: impl Into<String>) {
        if matches!(self, ActionState::Pending) {
            *self = ActionState::Failed(message.into());
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ActionState::Pending)
    }
}
