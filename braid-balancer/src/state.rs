//! Subchannel connectivity states.

use braid_core::{Code, Status};

/// The connectivity lifecycle of a subchannel.
///
/// IDLE → CONNECTING → READY → (IDLE | TRANSIENT_FAILURE); SHUTDOWN is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Idle,
    Connecting,
    Ready,
    TransientFailure,
    Shutdown,
}

/// A connectivity state with the status that caused it. The status is
/// non-OK only for TRANSIENT_FAILURE.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectivityStateInfo {
    state: ConnectivityState,
    status: Status,
}

impl ConnectivityStateInfo {
    /// Info for any state other than TRANSIENT_FAILURE.
    pub fn for_state(state: ConnectivityState) -> Self {
        debug_assert!(state != ConnectivityState::TransientFailure);
        Self {
            state,
            status: Status::new(Code::Ok),
        }
    }

    /// Info for TRANSIENT_FAILURE with its cause.
    pub fn for_transient_failure(status: Status) -> Self {
        debug_assert!(!status.is_ok());
        Self {
            state: ConnectivityState::TransientFailure,
            status,
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn status(&self) -> &Status {
        &self.status
    }
}
