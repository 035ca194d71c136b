//! Timing defaults and async timeout wrappers.

use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Idle time after which a forwarder writes a keepalive frame.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Default bound for outbound connection attempts.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed for the listener task to wind down on shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Period between GetPeers requests sent to seeds.
pub const PEER_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Bound for a single discovery bootstrap attempt.
pub const DISCOVERY_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Run a future with a deadline, mapping expiry to [`ProtocolError::Timeout`].
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
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
        let result = with_timeout(Duration::from_millis(10), slow).await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }

    #[tokio::test]
    async fn inner_result_passes_through() {
        let value = with_timeout(Duration::from_secs(1), async { Ok(42) }).await;
        assert_eq!(value.unwrap(), 42);
    }
}
