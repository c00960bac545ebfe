//! Turn phase and the single-flight gate.
//!
//! One [`TurnGate`] is shared by the whole client. [`TurnGate::try_begin`]
//! claims it atomically (Idle -> Preparing) and hands back a [`TurnGuard`]
//! carrying that turn's cancellation token. Dropping the guard returns the
//! gate to Idle, so every exit path of a turn releases it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// What the active turn is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Idle,
    Preparing,
    Retrieving,
    VerifyingUsage,
    Generating,
}

impl TurnPhase {
    pub fn is_active(self) -> bool {
        self != TurnPhase::Idle
    }

    /// Everything before the first token is requested.
    pub fn is_preparing_to_generate(self) -> bool {
        matches!(
            self,
            TurnPhase::Preparing | TurnPhase::Retrieving | TurnPhase::VerifyingUsage
        )
    }

    pub fn is_doing_rag(self) -> bool {
        self == TurnPhase::Retrieving
    }

    pub fn is_checking_rag_usage(self) -> bool {
        self == TurnPhase::VerifyingUsage
    }

    pub fn is_generating(self) -> bool {
        self == TurnPhase::Generating
    }
}

#[derive(Debug)]
struct GateState {
    phase: TurnPhase,
    cancel: Option<CancellationToken>,
    turn: u64,
}

/// The app-wide "at most one active turn" gate.
#[derive(Debug, Clone)]
pub struct TurnGate {
    state: Arc<Mutex<GateState>>,
}

impl Default for TurnGate {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnGate {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState {
                phase: TurnPhase::Idle,
                cancel: None,
                turn: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> TurnPhase {
        self.lock().phase
    }

    /// Claim the gate. `None` while any turn is active.
    pub fn try_begin(&self) -> Option<TurnGuard> {
        let mut state = self.lock();
        if state.phase.is_active() {
            return None;
        }
        let token = CancellationToken::new();
        state.turn += 1;
        state.phase = TurnPhase::Preparing;
        state.cancel = Some(token.clone());
        Some(TurnGuard {
            gate: self.clone(),
            token,
            turn: state.turn,
        })
    }

    /// Cancel the active turn, if any. Returns whether a turn was signalled.
    pub fn cancel_active(&self) -> bool {
        let state = self.lock();
        match &state.cancel {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                tracing::info!(phase = ?state.phase, turn = state.turn, "active turn cancelled");
                true
            }
            _ => false,
        }
    }
}

/// Ownership of the gate for one turn.
#[derive(Debug)]
pub struct TurnGuard {
    gate: TurnGate,
    token: CancellationToken,
    turn: u64,
}

impl TurnGuard {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn set_phase(&self, phase: TurnPhase) {
        let mut state = self.gate.lock();
        if state.turn == self.turn {
            state.phase = phase;
        }
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        let mut state = self.gate.lock();
        if state.turn == self.turn {
            state.phase = TurnPhase::Idle;
            state.cancel = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_flight() {
        let gate = TurnGate::new();
        let guard = gate.try_begin().unwrap();
        assert_eq!(gate.phase(), TurnPhase::Preparing);
        assert!(gate.try_begin().is_none());

        guard.set_phase(TurnPhase::Generating);
        assert!(gate.phase().is_generating());
        assert!(gate.try_begin().is_none());

        drop(guard);
        assert_eq!(gate.phase(), TurnPhase::Idle);
        assert!(gate.try_begin().is_some());
    }

    #[test]
    fn test_cancel_active_signals_token_once() {
        let gate = TurnGate::new();
        assert!(!gate.cancel_active(), "nothing to cancel while idle");

        let guard = gate.try_begin().unwrap();
        assert!(gate.cancel_active());
        assert!(guard.is_cancelled());
        assert!(!gate.cancel_active());
    }

    #[test]
    fn test_each_turn_gets_fresh_token() {
        let gate = TurnGate::new();
        let first = gate.try_begin().unwrap();
        gate.cancel_active();
        drop(first);

        let second = gate.try_begin().unwrap();
        assert!(!second.is_cancelled());
    }

    #[test]
    fn test_flag_projections() {
        assert!(TurnPhase::Preparing.is_preparing_to_generate());
        assert!(TurnPhase::Retrieving.is_preparing_to_generate());
        assert!(TurnPhase::Retrieving.is_doing_rag());
        assert!(TurnPhase::VerifyingUsage.is_checking_rag_usage());
        assert!(!TurnPhase::Generating.is_preparing_to_generate());
        assert!(!TurnPhase::Idle.is_active());
    }
}
