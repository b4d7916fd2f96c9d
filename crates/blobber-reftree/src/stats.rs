use serde::{Deserialize, Serialize};

use blobber_types::Timestamp;

/// Usage counters of one file, keyed by its lookup hash.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStats {
    /// Committed inserts and updates of the file's content.
    pub num_updates: u64,
    /// Successful downloads, one per served request.
    pub num_block_downloads: u64,
    pub last_updated_at: Option<Timestamp>,
    pub last_downloaded_at: Option<Timestamp>,
}

impl FileStats {
    pub fn record_update(&mut self, at: Timestamp) {
        self.num_updates += 1;
        self.last_updated_at = Some(at);
    }

    pub fn record_download(&mut self, at: Timestamp) {
        self.num_block_downloads += 1;
        self.last_downloaded_at = Some(at);
    }
}
