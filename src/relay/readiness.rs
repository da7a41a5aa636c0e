//! TCP readiness probe for the streaming server

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::error::RelayError;

/// Poll `addr` until it accepts a connection.
///
/// Makes at most `attempts` connection attempts, `interval` apart, each
/// bounded by `interval`. Returns the attempt that succeeded.
pub async fn wait_for_port(
    addr: &str,
    interval: Duration,
    attempts: u32,
) -> Result<u32, RelayError> {
    for attempt in 1..=attempts {
        match tokio::time::timeout(interval, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => {
                info!("{} ready after {} attempt(s)", addr, attempt);
                return Ok(attempt);
            }
            Ok(Err(e)) => debug!("{} not ready ({}/{}): {}", addr, attempt, attempts, e),
            Err(_) => debug!("{} connect timed out ({}/{})", addr, attempt, attempts),
        }
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }

    Err(RelayError::ReadinessTimeout {
        addr: addr.to_string(),
        attempts,
    })
}
