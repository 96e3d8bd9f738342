// =============================================================================
// Notifier — delivery of formatted alert text
// =============================================================================
//
// Delivery failures are returned to the caller, which logs them and carries
// on. A failed notification never stops the scan loop.
// =============================================================================

pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

pub use telegram::TelegramNotifier;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text` to the configured destination.
    async fn notify(&self, text: &str) -> Result<()>;
}

/// Writes alerts to the log instead of a chat. Used when no messaging
/// credentials are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) -> Result<()> {
        info!(target: "alerts", "\n{text}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        assert!(LogNotifier.notify("hello").await.is_ok());
    }
}
