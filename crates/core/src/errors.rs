use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
    #[error("counter store call timed out after {millis}ms")]
    Timeout { millis: u64 },
    #[error("value at `{key}` is not an integer")]
    NotAnInteger { key: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CountingError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("counting state key `{key}` holds non-integer value `{value}`")]
    CorruptState { key: String, value: String },
    #[error("gave up after {attempts} conflicting updates to the counting state")]
    Contention { attempts: u32 },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LeaderboardError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("leaderboard key `{key}` holds non-integer value `{value}`")]
    CorruptData { key: String, value: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable { .. } | Self::Internal { .. } => {
                "Something went wrong while loading the leaderboard :cry: Please try again later!"
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl LeaderboardError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        match self {
            Self::Store(error) => {
                InterfaceError::ServiceUnavailable { message: error.to_string(), correlation_id }
            }
            Self::CorruptData { .. } => {
                InterfaceError::Internal { message: self.to_string(), correlation_id }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{InterfaceError, LeaderboardError, StoreError};

    #[test]
    fn store_failure_maps_to_service_unavailable() {
        let interface = LeaderboardError::from(StoreError::Unavailable("connection reset".into()))
            .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::ServiceUnavailable { ref correlation_id, .. } if correlation_id == "req-1"
        ));
    }

    #[test]
    fn corrupt_data_maps_to_internal_with_user_safe_message() {
        let interface = LeaderboardError::CorruptData {
            key: "leaderboard:2026-10:U1".to_owned(),
            value: "many".to_owned(),
        }
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.correlation_id(), "req-2");
        assert!(interface.user_message().contains("Please try again later"));
        assert!(!interface.user_message().contains("many"));
    }
}
