//! Wallet record reconciliation
//!
//! Merges candidate lists from discovery sources into the canonical list:
//! - addresses are unique; within one pass the first-listed source wins
//! - known addresses keep their statistics bundle, only `updated_at` moves
//!   (plus score/note/tier according to [`MergePolicy`])
//! - new addresses get a fresh record with zeroed statistics
//! - the merged list is ordered by source priority and renumbered

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use super::ids::assign_display_ids;
use super::types::{Candidate, WalletRecord};

/// How a merge treats the score of an already-known record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorePolicy {
    /// Take the candidate score only when it is higher
    #[default]
    RaiseOnly,
    /// Always take the candidate score
    Overwrite,
    /// Never touch the existing score
    Keep,
}

/// How a merge treats the note of an already-known record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotePolicy {
    /// Replace with the candidate note unless the candidate note is empty
    #[default]
    Replace,
    /// Only write into an empty note
    FillEmpty,
    /// Never touch the existing note
    Keep,
}

/// Merge configuration
#[derive(Debug, Clone)]
pub struct MergePolicy {
    pub id_prefix: String,
    /// Source tags in output order; unlisted tags follow in first-seen order
    pub source_order: Vec<String>,
    pub score_policy: ScorePolicy,
    pub note_policy: NotePolicy,
}

impl MergePolicy {
    pub fn from_config(config: &crate::config::ReconcileConfig) -> Self {
        Self {
            id_prefix: config.id_prefix.clone(),
            source_order: config.source_order.clone(),
            score_policy: config.score_policy,
            note_policy: config.note_policy,
        }
    }
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::from_config(&crate::config::ReconcileConfig::default())
    }
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    pub records: Vec<WalletRecord>,
    /// Addresses that were not in the canonical list
    pub added: Vec<String>,
    /// Known addresses seen again in this pass
    pub refreshed: usize,
    /// Repeats of an address already taken earlier in this pass
    pub duplicates: usize,
    /// Candidates without an address
    pub skipped_invalid: usize,
}

impl ReconcileOutcome {
    pub fn count_by_source(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for record in &self.records {
            match counts.iter_mut().find(|(tag, _)| *tag == record.source) {
                Some((_, n)) => *n += 1,
                None => counts.push((record.source.clone(), 1)),
            }
        }
        counts
    }
}

/// Merge `batches` into `existing`
///
/// Batches are applied in order; `now` is the pass timestamp (ms).
pub fn reconcile(
    existing: Vec<WalletRecord>,
    batches: &[Vec<Candidate>],
    policy: &MergePolicy,
    now: i64,
) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();

    // Index the canonical list, dropping repeated addresses from a damaged file
    let mut records: Vec<WalletRecord> = Vec::with_capacity(existing.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    for record in existing {
        if index.contains_key(&record.address) {
            warn!("Dropping repeated canonical entry for {}", record.short_address());
            continue;
        }
        index.insert(record.address.clone(), records.len());
        records.push(record);
    }

    let mut taken: HashSet<String> = HashSet::new();

    for candidate in batches.iter().flatten() {
        let address = match candidate.valid_address() {
            Some(address) => address.to_string(),
            None => {
                outcome.skipped_invalid += 1;
                continue;
            }
        };

        if !taken.insert(address.clone()) {
            outcome.duplicates += 1;
            continue;
        }

        match index.get(&address) {
            Some(&idx) => {
                refresh_record(&mut records[idx], candidate, policy, now);
                outcome.refreshed += 1;
            }
            None => {
                debug!("New wallet {} from {}", address, candidate.source_tag);
                index.insert(address.clone(), records.len());
                records.push(candidate.to_record(&address, now));
                outcome.added.push(address);
            }
        }
    }

    order_by_source(&mut records, &policy.source_order);
    assign_display_ids(&mut records, &policy.id_prefix);

    outcome.records = records;
    outcome
}

/// Apply a candidate to a known record without touching its statistics
fn refresh_record(record: &mut WalletRecord, candidate: &Candidate, policy: &MergePolicy, now: i64) {
    record.updated_at = now;

    if let Some(score) = candidate.score {
        match policy.score_policy {
            ScorePolicy::RaiseOnly => record.score = record.score.max(score),
            ScorePolicy::Overwrite => record.score = score,
            ScorePolicy::Keep => {}
        }
    }

    if !candidate.note.is_empty() {
        match policy.note_policy {
            NotePolicy::Replace => record.note = candidate.note.clone(),
            NotePolicy::FillEmpty if record.note.is_empty() => {
                record.note = candidate.note.clone()
            }
            NotePolicy::FillEmpty | NotePolicy::Keep => {}
        }
    }

    if record.tier.is_unknown() {
        if let Some(tier) = &candidate.tier {
            record.tier = tier.clone();
        }
    }
}

/// Stable sort by source rank
fn order_by_source(records: &mut [WalletRecord], source_order: &[String]) {
    let mut ranks: HashMap<&str, usize> = source_order
        .iter()
        .enumerate()
        .map(|(rank, tag)| (tag.as_str(), rank))
        .collect();

    let mut keys = Vec::with_capacity(records.len());
    for record in records.iter() {
        let next = ranks.len();
        let rank = *ranks.entry(record.source.as_str()).or_insert(next);
        keys.push(rank);
    }

    let mut keyed: Vec<(usize, WalletRecord)> = keys
        .into_iter()
        .zip(records.iter().cloned())
        .collect();
    keyed.sort_by_key(|(rank, _)| *rank);

    for (slot, (_, record)) in records.iter_mut().zip(keyed) {
        *slot = record;
    }
}
