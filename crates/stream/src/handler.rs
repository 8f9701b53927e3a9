// Batch delivery callback

use anyhow::Result;
use async_trait::async_trait;
use relay_models::Entry;
use tracing::info;

/// Application-supplied callback that processes one batch of entries.
///
/// Returning an error tells the poll loop to back off and retry the
/// identical batch; handlers therefore see at-least-once delivery and
/// must be idempotent or deduplicate by entry id.
#[async_trait]
pub trait Handler: Send {
    async fn handle(&mut self, batch: &[Entry]) -> Result<()>;
}

/// Logs every entry it receives. Useful as a smoke-test consumer.
#[derive(Debug, Default)]
pub struct PrintHandler;

#[async_trait]
impl Handler for PrintHandler {
    async fn handle(&mut self, batch: &[Entry]) -> Result<()> {
        for entry in batch {
            let fields = entry
                .fields
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(" ");
            info!("📨 {} {}", entry.id, fields);
        }
        Ok(())
    }
}
