//! Display identifier allocation
//!
//! Identifiers are derived from list position, never from a separately
//! persisted counter: a reconciliation pass renumbers the whole merged list.

use super::types::WalletRecord;

/// Produce `PREFIX-{existing_len + offset + 1}`, zero-padded to three digits
pub fn format_display_id(prefix: &str, existing_len: usize, offset: usize) -> String {
    format!("{}-{:03}", prefix, existing_len + offset + 1)
}

/// Renumber every record in list order
pub fn assign_display_ids(records: &mut [WalletRecord], prefix: &str) {
    for (offset, record) in records.iter_mut().enumerate() {
        record.display_id = format_display_id(prefix, 0, offset);
    }
}
