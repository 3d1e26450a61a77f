//! Error taxonomy for the monitoring loop and the command channel beneath it.

use std::time::Duration;
use thiserror::Error;

/// Failures raised while servicing a single host.
///
/// Every variant except `Configuration` is recoverable: the scheduler logs it
/// against the host and tries again on the next pass.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("temperature source unavailable for '{host}': {reason}")]
    SourceUnavailable { host: String, reason: String },

    #[error("no temperature reading could be extracted for '{host}' (pattern matched {matches} time(s))")]
    ParseFailure { host: String, matches: usize },

    #[error("'{action}' failed for '{host}': {reason}")]
    ActuationFailure {
        host: String,
        action: &'static str,
        reason: String,
    },

    #[error("rolling window is empty")]
    EmptyWindow,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// Failures of the process/session command channel itself.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} timed out after {after:?} while {stage}")]
    Timeout {
        program: String,
        stage: &'static str,
        after: Duration,
    },

    #[error("i/o error talking to {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cancelled")]
    Cancelled,
}

impl ChannelError {
    /// Map into the temperature-acquisition failure for `host`.
    pub fn into_source_error(self, host: &str) -> MonitorError {
        match self {
            ChannelError::Cancelled => MonitorError::Cancelled,
            other => MonitorError::SourceUnavailable {
                host: host.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// Map into the actuation failure for `host`.
    pub fn into_actuation_error(self, host: &str, action: &'static str) -> MonitorError {
        match self {
            ChannelError::Cancelled => MonitorError::Cancelled,
            other => MonitorError::ActuationFailure {
                host: host.to_string(),
                action,
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_never_reported_as_host_failure() {
        assert!(matches!(
            ChannelError::Cancelled.into_source_error("r620"),
            MonitorError::Cancelled
        ));
        assert!(matches!(
            ChannelError::Cancelled.into_actuation_error("r620", "enable automatic"),
            MonitorError::Cancelled
        ));
    }

    #[test]
    fn exit_failure_maps_to_source_unavailable_with_host() {
        let err = ChannelError::Exit {
            program: "ipmitool".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "Unable to establish IPMI v2 / RMCP+ session".to_string(),
        }
        .into_source_error("r620");

        match err {
            MonitorError::SourceUnavailable { host, reason } => {
                assert_eq!(host, "r620");
                assert!(reason.contains("RMCP+"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
