//! Command encoder lifecycle.
//!
//! ```text
//!            begin              end             submit (Recreate)
//!   Idle ───────────► Recording ─────► Ended ───────────────────► NeedsRecreate
//!    ▲                                   │ begin (Reset: reset pool)    │
//!    │                                   ▼                              │
//!    └──── reset ──── Ended         Recording ◄──── begin (allocate) ───┘
//! ```
//!
//! Backends whose native recording object survives submission use
//! [`RecyclePolicy::Reset`]. Backends whose object is consumed by finishing
//! use [`RecyclePolicy::Recreate`]: once ended, the next `begin` must build a
//! replacement, which [`EncoderLifecycle::begin`] reports as
//! [`BeginAction::Recreate`].

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncoderState {
    Idle,
    Recording,
    Ended,
    NeedsRecreate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecyclePolicy {
    Reset,
    Recreate,
}

/// What a backend must do to its native object before recording resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginAction {
    /// Object is fresh; start recording.
    Fresh,
    /// Reset the object (or its pool), then start recording.
    Reset,
    /// Discard the object and allocate a new one.
    Recreate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    Render,
    Compute,
}

#[derive(Debug, Clone)]
pub struct EncoderLifecycle {
    state: EncoderState,
    policy: RecyclePolicy,
    open_pass: Option<PassKind>,
}

impl EncoderLifecycle {
    pub fn new(policy: RecyclePolicy) -> Self {
        Self {
            state: EncoderState::Idle,
            policy,
            open_pass: None,
        }
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    pub fn policy(&self) -> RecyclePolicy {
        self.policy
    }

    pub fn open_pass(&self) -> Option<PassKind> {
        self.open_pass
    }

    pub fn begin(&mut self) -> Result<BeginAction> {
        let action = match (self.state, self.policy) {
            (EncoderState::Idle, _) => BeginAction::Fresh,
            (EncoderState::Recording, _) => {
                return Err(Error::invalid_state(
                    "begin called on an encoder that is already recording",
                ));
            }
            (EncoderState::Ended, RecyclePolicy::Reset) => BeginAction::Reset,
            (EncoderState::Ended, RecyclePolicy::Recreate)
            | (EncoderState::NeedsRecreate, _) => BeginAction::Recreate,
        };
        self.state = EncoderState::Recording;
        self.open_pass = None;
        Ok(action)
    }

    pub fn end(&mut self) -> Result<()> {
        self.require_recording()?;
        self.state = EncoderState::Ended;
        Ok(())
    }

    /// Return an ended encoder to `Idle`. On the recreate policy the native
    /// object is gone, so the encoder moves to `NeedsRecreate` instead.
    pub fn reset(&mut self) -> Result<EncoderState> {
        self.state = match (self.state, self.policy) {
            (EncoderState::Recording, _) => {
                return Err(Error::invalid_state(
                    "reset called while recording; end the encoder first",
                ));
            }
            (EncoderState::Idle, _) => EncoderState::Idle,
            (EncoderState::Ended, RecyclePolicy::Reset) => EncoderState::Idle,
            (EncoderState::Ended, RecyclePolicy::Recreate)
            | (EncoderState::NeedsRecreate, _) => EncoderState::NeedsRecreate,
        };
        Ok(self.state)
    }

    /// Check the encoder can be handed to a queue. A recording encoder is
    /// reported as needing [`EncoderLifecycle::end`] first.
    pub fn prepare_submit(&self) -> Result<bool> {
        match self.state {
            EncoderState::Recording if self.open_pass.is_some() => {
                Err(Error::invalid_state(
                    "cannot submit an encoder with an open pass",
                ))
            }
            EncoderState::Recording => Ok(true),
            EncoderState::Ended => Ok(false),
            EncoderState::Idle => Err(Error::invalid_state(
                "cannot submit an encoder that never began recording",
            )),
            EncoderState::NeedsRecreate => Err(Error::invalid_state(
                "encoder was already submitted; begin it again first",
            )),
        }
    }

    pub fn mark_submitted(&mut self) {
        if self.policy == RecyclePolicy::Recreate {
            self.state = EncoderState::NeedsRecreate;
        }
    }

    pub fn require_recording(&self) -> Result<()> {
        if self.state != EncoderState::Recording {
            return Err(Error::invalid_state(format!(
                "encoder is {:?}, expected Recording",
                self.state
            )));
        }
        if let Some(kind) = self.open_pass {
            return Err(Error::invalid_state(format!(
                "a {kind:?} pass is still open on this encoder"
            )));
        }
        Ok(())
    }

    pub fn require_pass(&self, kind: PassKind) -> Result<()> {
        if self.open_pass != Some(kind) {
            return Err(Error::invalid_state(format!(
                "no {kind:?} pass is open on this encoder"
            )));
        }
        Ok(())
    }

    pub fn begin_pass(&mut self, kind: PassKind) -> Result<()> {
        self.require_recording()?;
        self.open_pass = Some(kind);
        Ok(())
    }

    pub fn end_pass(&mut self, kind: PassKind) -> Result<()> {
        self.require_pass(kind)?;
        self.open_pass = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorded(policy: RecyclePolicy) -> EncoderLifecycle {
        let mut enc = EncoderLifecycle::new(policy);
        assert_eq!(enc.begin().unwrap(), BeginAction::Fresh);
        enc.end().unwrap();
        enc
    }

    #[test]
    fn reset_policy_reuses_after_submit() {
        let mut enc = recorded(RecyclePolicy::Reset);
        assert!(!enc.prepare_submit().unwrap());
        enc.mark_submitted();
        assert_eq!(enc.state(), EncoderState::Ended);
        assert_eq!(enc.begin().unwrap(), BeginAction::Reset);
        assert_eq!(enc.state(), EncoderState::Recording);
    }

    #[test]
    fn recreate_policy_recreates_on_next_begin() {
        let mut enc = recorded(RecyclePolicy::Recreate);
        enc.mark_submitted();
        assert_eq!(enc.state(), EncoderState::NeedsRecreate);
        assert!(enc.prepare_submit().is_err());
        assert_eq!(enc.begin().unwrap(), BeginAction::Recreate);
        enc.end().unwrap();
        assert!(!enc.prepare_submit().unwrap());
    }

    #[test]
    fn ended_but_unsubmitted_still_recreates() {
        let mut enc = recorded(RecyclePolicy::Recreate);
        assert_eq!(enc.begin().unwrap(), BeginAction::Recreate);
    }

    #[test]
    fn reset_moves_to_policy_specific_state() {
        let mut enc = recorded(RecyclePolicy::Reset);
        assert_eq!(enc.reset().unwrap(), EncoderState::Idle);
        assert_eq!(enc.begin().unwrap(), BeginAction::Fresh);

        let mut enc = recorded(RecyclePolicy::Recreate);
        assert_eq!(enc.reset().unwrap(), EncoderState::NeedsRecreate);
    }

    #[test]
    fn double_begin_is_rejected() {
        let mut enc = EncoderLifecycle::new(RecyclePolicy::Reset);
        enc.begin().unwrap();
        assert!(matches!(enc.begin(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn passes_must_close_before_end() {
        let mut enc = EncoderLifecycle::new(RecyclePolicy::Recreate);
        enc.begin().unwrap();
        enc.begin_pass(PassKind::Render).unwrap();
        assert!(enc.require_recording().is_err());
        assert!(enc.end().is_err());
        assert!(enc.prepare_submit().is_err());
        assert!(enc.end_pass(PassKind::Compute).is_err());
        enc.end_pass(PassKind::Render).unwrap();
        enc.end().unwrap();
    }

    #[test]
    fn recording_encoder_is_ended_by_submit() {
        let mut enc = EncoderLifecycle::new(RecyclePolicy::Reset);
        assert!(enc.prepare_submit().is_err());
        enc.begin().unwrap();
        assert!(enc.prepare_submit().unwrap());
    }
}
