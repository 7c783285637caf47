use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Per-operation socket timeout used when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// How long an extra worker may sit idle before it exits
pub const WORKER_KEEP_ALIVE: Duration = Duration::from_secs(10);

/// Pause between redelivery flushes while buffered alerts remain
pub const REDELIVERY_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Pause between checks while the redelivery buffer is empty
pub const REDELIVERY_IDLE_INTERVAL: Duration = Duration::from_secs(60);

/// Run `fut` with a deadline, mapping expiry to `ProtocolError::Timeout`.
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

/// Run `fut` with a deadline, mapping expiry to a caller-chosen error.
pub async fn with_timeout_or<F, T>(fut: F, duration: Duration, on_timeout: ProtocolError) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expiry_maps_to_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        };
        let result = with_timeout_error(slow, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }

    #[tokio::test]
    async fn expiry_maps_to_custom_error() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        };
        let result = with_timeout_or(
            slow,
            Duration::from_millis(10),
            ProtocolError::HandshakeError("late".into()),
        )
        .await;
        assert!(matches!(result, Err(ProtocolError::HandshakeError(_))));
    }

    #[tokio::test]
    async fn fast_future_passes_through() {
        let result = with_timeout_error(async { Ok(7) }, Duration::from_secs(1)).await;
        assert_eq!(result.unwrap(), 7);
    }
}
