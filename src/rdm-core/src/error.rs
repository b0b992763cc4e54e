// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Error taxonomy for field controller exchanges and device state changes.

use thiserror::Error;

use crate::gate::GateArmState;

/// Errors raised while talking to field controllers or validating
/// requested device state changes.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// A failure the requesting operation anticipated, e.g. probing a
    /// capability the controller does not have. Swallowed by the comm
    /// engine without degrading the controller.
    #[error("expected failure: {0}")]
    Expected(String),

    /// No response arrived within the receive window.
    #[error("response timeout")]
    Timeout,

    /// Short or garbled response frame.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The transport closed underneath an exchange.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Unexpected but survivable device data, recorded as controller
    /// maintenance status while the operation continues.
    #[error("device status: {0}")]
    Status(String),

    /// An interlock vetoed the requested gate arm transition.
    #[error("interlock conflict")]
    InterlockConflict,

    /// The requested state is not reachable from the current state.
    #[error("invalid state change: {from} to {to}")]
    InvalidTransition {
        from: GateArmState,
        to: GateArmState,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type DeviceResult<T> = Result<T, DeviceError>;

impl DeviceError {
    /// Transient transport faults are retried against the same phase.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Malformed(_))
    }

    /// Expected failures never mark the controller degraded.
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::Expected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DeviceError::Timeout.is_transient());
        assert!(DeviceError::Malformed("short".into()).is_transient());
        assert!(!DeviceError::InterlockConflict.is_transient());
        assert!(!DeviceError::ConnectionLost("eof".into()).is_transient());
        assert!(!DeviceError::Expected("no cap".into()).is_transient());
    }

    #[test]
    fn test_expected_classification() {
        assert!(DeviceError::Expected("probe".into()).is_expected());
        assert!(!DeviceError::Timeout.is_expected());
    }

    #[test]
    fn test_invalid_transition_message() {
        let e = DeviceError::InvalidTransition {
            from: GateArmState::Open,
            to: GateArmState::Opening,
        };
        assert_eq!(e.to_string(), "invalid state change: OPEN to OPENING");
    }
}
