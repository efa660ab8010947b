//! This module defines the [`SessionError`] a client session may end with,
//! and the mapping from a session outcome to the close frame sent over the
//! wire.

use axum::extract::ws::{CloseFrame, close_code};

use crate::services::connections::CloseInfo;

/// All errors a running session may terminate with.
#[derive(Debug, thiserror::Error)]
pub(crate) enum SessionError {
    #[error("socket closed abnormally (code {}: {})", .0.code, .0.reason)]
    AbnormalClose(CloseInfo),
    #[error("session cancelled")]
    Cancelled,
    #[error("unexpected message type")]
    ProtocolViolation,
    #[error("read failed: {0}")]
    ReadFailed(String),
    #[error(transparent)]
    WriteFailed(axum::Error),
    #[error("connection too slow to keep up with messages")]
    SlowConsumer,
    #[error("could not send connect ack: {0}")]
    AckFailed(axum::Error),
}

impl SessionError {
    /// Whether this outcome is part of normal operation and logged quietly.
    pub(crate) fn is_quiet(&self) -> bool {
        match self {
            SessionError::Cancelled => true,
            SessionError::AbnormalClose(close) => close.code == close_code::AWAY,
            _ => false,
        }
    }
}

/// The close frame sent to the client for a finished session, if any.
pub(crate) fn close_frame_for(outcome: &Result<(), SessionError>) -> Option<CloseFrame> {
    match outcome {
        Ok(()) => Some(CloseFrame {
            code: close_code::NORMAL,
            reason: "".into(),
        }),
        Err(SessionError::Cancelled) => Some(CloseFrame {
            code: close_code::NORMAL,
            reason: "server shutting down".into(),
        }),
        Err(SessionError::AbnormalClose(_)) => {
            // nothing to do here, the peer is already gone
            None
        }
        Err(SessionError::ProtocolViolation) => Some(CloseFrame {
            code: close_code::POLICY,
            reason: "unexpected message type".into(),
        }),
        Err(SessionError::SlowConsumer) => Some(CloseFrame {
            code: close_code::POLICY,
            reason: "connection too slow to keep up with messages".into(),
        }),
        Err(
            SessionError::ReadFailed(_)
            | SessionError::WriteFailed(_)
            | SessionError::AckFailed(_),
        ) => Some(CloseFrame {
            code: close_code::ERROR,
            reason: "unexpected error".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_sessions_close_normally() {
        let frame = close_frame_for(&Ok(())).expect("frame expected");
        assert_eq!(frame.code, close_code::NORMAL);
    }

    #[test]
    fn slow_consumers_are_closed_with_policy_violation() {
        let frame =
            close_frame_for(&Err(SessionError::SlowConsumer)).expect("frame expected");
        assert_eq!(frame.code, close_code::POLICY);
    }

    #[test]
    fn no_close_frame_after_an_abnormal_peer_close() {
        let outcome = Err(SessionError::AbnormalClose(CloseInfo {
            code: close_code::ABNORMAL,
            reason: String::new(),
        }));
        assert!(close_frame_for(&outcome).is_none());
    }

    #[test]
    fn going_away_and_cancellation_are_quiet() {
        assert!(SessionError::Cancelled.is_quiet());
        assert!(
            SessionError::AbnormalClose(CloseInfo {
                code: close_code::AWAY,
                reason: String::new(),
            })
            .is_quiet()
        );
        assert!(!SessionError::ProtocolViolation.is_quiet());
    }
}
