mod roam;

pub use roam::{block_uid, daily_page_title, render_blocks, RoamPublisher};

use sesslog_core::{LogEntry, PublishError};

/// Where an entry landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Page the entry was written to.
    pub page: String,
    /// Addressable id of the entry's parent block.
    pub block_uid: String,
}

/// Delivers a finished entry to the external graph.
///
/// Implementations must address the same target for the same entry on every
/// attempt, so a retry can never produce a second copy.
pub trait Publisher {
    fn publish(&self, entry: &LogEntry) -> Result<PublishReceipt, PublishError>;
}
