//! Built-in handlers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use chainsync_engine::{Handler, HandlerContext};
use chainsync_store::models::TRANSFERS_DDL;
use chainsync_store::{NewTransferRow, Store};

/// Materializes ERC-20 `Transfer` events into the `transfers` table.
///
/// Register it under `"<contract>:Transfer"` for any contract whose
/// Transfer follows the standard `(address from, address to, uint256
/// value)` shape.
pub struct TransferHandler;

#[async_trait]
impl Handler for TransferHandler {
    async fn handle(&self, ctx: &mut HandlerContext<'_>) -> Result<(), anyhow::Error> {
        let from = ctx
            .event
            .field("from")
            .and_then(|v| v.as_address())
            .ok_or_else(|| anyhow::anyhow!("missing 'from' parameter"))?;
        let to = ctx
            .event
            .field("to")
            .and_then(|v| v.as_address())
            .ok_or_else(|| anyhow::anyhow!("missing 'to' parameter"))?;
        // Absent when the log's data field was empty; store zero rather
        // than dropping the transfer.
        let value = ctx.event.field("value").and_then(|v| v.as_uint()).unwrap_or("0");

        Store::insert_transfer(
            ctx.tx,
            &NewTransferRow {
                block_number: ctx.log.block_number,
                tx_hash: ctx.log.tx_hash.to_string(),
                tx_index: ctx.log.tx_index,
                log_index: ctx.log.log_index,
                timestamp: DateTime::<Utc>::from_timestamp(ctx.block.timestamp, 0)
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                from_address: from.to_string(),
                to_address: to.to_string(),
                value: value.to_string(),
            },
        )
        .await?;
        Ok(())
    }

    fn table(&self) -> Option<&str> {
        Some("transfers")
    }

    fn migrations(&self) -> Vec<String> {
        TRANSFERS_DDL.iter().map(|s| s.to_string()).collect()
    }
}
