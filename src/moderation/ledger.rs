//! Violation ledger
//!
//! Holds per-user warning history and the active-mute index. Warnings are
//! append-only and chronological; mutes are keyed by user with at most one
//! live record per user across the whole process.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// One recorded warning. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub guild_id: u64,
    pub user_id: u64,
    pub reason: String,
    /// A real moderator, or the bot's own id for automod actions
    pub moderator_id: u64,
    pub timestamp: DateTime<Utc>,
}

/// An active timed mute. Permanent mutes create no record and are never
/// visible to the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuteRecord {
    pub user_id: u64,
    pub guild_id: u64,
    pub expires_at: DateTime<Utc>,
    /// Role granted at mute time; revoked on expiry
    pub role_id: u64,
}

/// Store of warnings and active mutes
#[derive(Clone, Default)]
pub struct ViolationLedger {
    warnings: Arc<DashMap<u64, Vec<ViolationRecord>>>,
    mutes: Arc<DashMap<u64, MuteRecord>>,
}

impl ViolationLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a warning to a user's history. Returns the user's total
    /// warning count in that guild after the append.
    pub fn record_warning(&self, record: ViolationRecord) -> usize {
        let guild_id = record.guild_id;
        let mut entry = self.warnings.entry(record.user_id).or_default();
        entry.push(record);
        entry.iter().filter(|w| w.guild_id == guild_id).count()
    }

    /// A user's warnings in one guild, oldest first.
    #[must_use]
    pub fn warnings_for(&self, guild_id: u64, user_id: u64) -> Vec<ViolationRecord> {
        self.warnings
            .get(&user_id)
            .map(|entry| {
                entry
                    .iter()
                    .filter(|w| w.guild_id == guild_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn warning_count(&self, guild_id: u64, user_id: u64) -> usize {
        self.warnings
            .get(&user_id)
            .map(|entry| entry.iter().filter(|w| w.guild_id == guild_id).count())
            .unwrap_or(0)
    }

    /// Insert or replace the mute record for a user. Re-muting overwrites the
    /// prior expiry (last-write-wins); the prior record, if any, is returned.
    pub fn set_mute(&self, record: MuteRecord) -> Option<MuteRecord> {
        self.mutes.insert(record.user_id, record)
    }

    /// Remove a user's mute record, if present.
    pub fn clear_mute(&self, user_id: u64) -> Option<MuteRecord> {
        self.mutes.remove(&user_id).map(|(_, record)| record)
    }

    #[must_use]
    pub fn active_mute(&self, user_id: u64) -> Option<MuteRecord> {
        self.mutes.get(&user_id).map(|entry| entry.clone())
    }

    /// Remove and return every mute whose expiry is at or before `now`.
    /// Each record is handed out exactly once; a record re-inserted with a
    /// later expiry between sweeps survives untouched.
    pub fn take_expired_mutes(&self, now: DateTime<Utc>) -> Vec<MuteRecord> {
        let due: Vec<u64> = self
            .mutes
            .iter()
            .filter(|entry| entry.expires_at <= now)
            .map(|entry| entry.user_id)
            .collect();

        due.into_iter()
            .filter_map(|user_id| {
                // Re-check under the entry lock in case of a concurrent re-mute
                self.mutes
                    .remove_if(&user_id, |_, record| record.expires_at <= now)
                    .map(|(_, record)| record)
            })
            .collect()
    }

    #[must_use]
    pub fn mute_count(&self) -> usize {
        self.mutes.len()
    }
}
