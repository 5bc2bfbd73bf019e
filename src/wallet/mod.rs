//! Canonical alpha-wallet list
//!
//! Candidate wallets arrive from several discovery files, get merged into a
//! single deduplicated list with contiguous display ids, and are written back
//! atomically.
//!
//! # Flow
//!
//! ```text
//! sources (alpha / millionaire / imported / traders)
//!        ↓ normalize
//!    Candidate batches → reconcile → assign_display_ids → WalletStore::save
//! ```

pub mod ids;
pub mod reconcile;
pub mod sources;
pub mod store;
pub mod summary;
pub mod types;
pub mod validate;

pub use ids::{assign_display_ids, format_display_id};
pub use reconcile::{reconcile, MergePolicy, NotePolicy, ReconcileOutcome, ScorePolicy};
pub use sources::{load_sources, SourceShape, SourceSpec};
pub use store::{read_json, write_json_atomic, WalletStore};
pub use summary::FleetSummary;
pub use types::{Candidate, TierInfo, WalletRecord, WalletStats};
pub use validate::{validate_records, Finding, Severity, ValidationReport};
