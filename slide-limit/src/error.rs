use std::time::Duration;

/// Failures talking to a [`CounterStore`](crate::CounterStore).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached: connection refused, I/O failure,
    /// authentication failure or pool acquisition timeout.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    /// The store answered, but not with what we asked for.
    #[error("unexpected counter store response: {0}")]
    Response(String),
}

impl StoreError {
    /// Returns `true` if the store could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
            || err.kind() == redis::ErrorKind::AuthenticationFailed
        {
            Self::Unavailable(err.to_string())
        } else {
            Self::Response(err.to_string())
        }
    }
}

/// Invalid rate limit policies.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("rate limit period {0:?} is shorter than one millisecond")]
    PeriodTooShort(Duration),
}
