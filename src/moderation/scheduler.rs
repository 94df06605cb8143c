//! Deferred action scheduler
//!
//! Holds the reminder queue and the sweep task that fires expired mutes and
//! due reminders. The sweep itself takes the current time as a parameter so
//! tests can drive it with a fixed clock; the background task feeds it
//! `Utc::now()` on a fixed interval.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Receiver;
use tracing::{info, warn};

use crate::moderation::{
    ModResult, ModerationError, SweepRequest,
    actuator::{Actuator, LogSink},
    duration::parse_duration,
    ledger::ViolationLedger,
};

/// One scheduled reminder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub id: u64,
    pub user_id: u64,
    pub channel_id: u64,
    pub text: String,
    pub remind_at: DateTime<Utc>,
}

/// Pending reminders keyed by id
#[derive(Clone, Default)]
pub struct ReminderQueue {
    reminders: Arc<DashMap<u64, ReminderRecord>>,
    next_id: Arc<AtomicU64>,
}

impl ReminderQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a reminder. The duration must be a single segment like
    /// `45s`, `10m`, `2h` or `1d`.
    pub fn schedule(
        &self,
        user_id: u64,
        channel_id: u64,
        duration: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> ModResult<u64> {
        let delay = parse_duration(duration)
            .ok_or_else(|| ModerationError::InvalidDuration(duration.to_string()))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.reminders.insert(
            id,
            ReminderRecord {
                id,
                user_id,
                channel_id,
                text: text.to_string(),
                remind_at: now + delay,
            },
        );
        Ok(id)
    }

    /// Remove and return every reminder due at or before `now`.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<ReminderRecord> {
        let due_ids: Vec<u64> = self
            .reminders
            .iter()
            .filter(|entry| entry.remind_at <= now)
            .map(|entry| entry.id)
            .collect();

        let mut due = Vec::with_capacity(due_ids.len());
        for id in due_ids {
            // Re-check under the entry lock so a concurrent sweep cannot
            // fire the same reminder twice.
            if let Some((_, record)) = self.reminders.remove_if(&id, |_, r| r.remind_at <= now) {
                due.push(record);
            }
        }
        due.sort_by_key(|record| record.id);
        due
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.reminders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reminders.is_empty()
    }
}

/// What a sweep fired, for logging and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FiredAction {
    MuteExpired {
        guild_id: u64,
        user_id: u64,
        role_revoked: bool,
    },
    Reminder {
        id: u64,
        user_id: u64,
        channel_id: u64,
        delivered: bool,
    },
}

/// Periodically fires expired mutes and due reminders
#[derive(Clone)]
pub struct Sweeper {
    ledger: ViolationLedger,
    reminders: ReminderQueue,
    actuator: Arc<dyn Actuator>,
    log: Arc<dyn LogSink>,
}

impl Sweeper {
    #[must_use]
    pub fn new(
        ledger: ViolationLedger,
        reminders: ReminderQueue,
        actuator: Arc<dyn Actuator>,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            ledger,
            reminders,
            actuator,
            log,
        }
    }

    /// Fire everything due at or before `now`.
    ///
    /// Each subject is attempted exactly once: records are removed from
    /// their stores before delivery, so a failing actuator call is logged
    /// but never retried on a later sweep.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<FiredAction> {
        let mut fired = Vec::new();

        for record in self.ledger.take_expired_mutes(now) {
            let role_revoked = match self
                .actuator
                .revoke_role(record.guild_id, record.user_id, record.role_id, "Mute expired")
                .await
            {
                Ok(()) => {
                    self.log
                        .append(
                            record.guild_id,
                            &format!(
                                "<@{}> was automatically unmuted (mute expired)",
                                record.user_id
                            ),
                        )
                        .await;
                    true
                }
                Err(e) => {
                    warn!(
                        target: crate::ERROR_TARGET,
                        guild_id = %record.guild_id,
                        user_id = %record.user_id,
                        error = %e,
                        "Failed to revoke expired mute role"
                    );
                    false
                }
            };
            fired.push(FiredAction::MuteExpired {
                guild_id: record.guild_id,
                user_id: record.user_id,
                role_revoked,
            });
        }

        for record in self.reminders.take_due(now) {
            let delivered = match self
                .actuator
                .send_channel_message(
                    record.channel_id,
                    &format!(
                        "<@{}> You asked me to remind you about: {}",
                        record.user_id, record.text
                    ),
                )
                .await
            {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        target: crate::ERROR_TARGET,
                        reminder_id = %record.id,
                        channel_id = %record.channel_id,
                        error = %e,
                        "Failed to deliver reminder"
                    );
                    false
                }
            };
            fired.push(FiredAction::Reminder {
                id: record.id,
                user_id: record.user_id,
                channel_id: record.channel_id,
                delivered,
            });
        }

        fired
    }

    /// Spawn the background sweep task.
    pub fn spawn(self, rx: Receiver<SweepRequest>, interval_secs: u64) {
        tokio::spawn(async move {
            self.run(rx, interval_secs).await;
        });
    }

    /// The sweep loop: a fixed interval plus an on-demand channel.
    async fn run(&self, mut rx: Receiver<SweepRequest>, interval_secs: u64) {
        info!(
            target: crate::EVENT_TARGET,
            interval_secs, "Starting sweep task"
        );

        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));

        loop {
            tokio::select! {
                Some(request) = rx.recv() => {
                    match request {
                        SweepRequest::SweepNow => {
                            let fired = self.sweep_expired(Utc::now()).await;
                            if !fired.is_empty() {
                                info!(
                                    target: crate::EVENT_TARGET,
                                    count = fired.len(),
                                    "On-demand sweep fired deferred actions"
                                );
                            }
                        }
                        SweepRequest::Shutdown => {
                            info!(target: crate::EVENT_TARGET, "Sweep task received shutdown");
                            break;
                        }
                    }
                }

                _ = interval.tick() => {
                    let fired = self.sweep_expired(Utc::now()).await;
                    if !fired.is_empty() {
                        info!(
                            target: crate::EVENT_TARGET,
                            count = fired.len(),
                            "Periodic sweep fired deferred actions"
                        );
                    }
                }
            }
        }

        info!(target: crate::EVENT_TARGET, "Sweep task shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::actuator::{MockActuator, MockLogSink};
    use crate::moderation::ledger::MuteRecord;

    fn quiet_log() -> MockLogSink {
        let mut log = MockLogSink::new();
        log.expect_append().returning(|_, _| ());
        log
    }

    #[test]
    fn test_reminder_ids_start_at_zero() {
        let queue = ReminderQueue::new();
        let now = Utc::now();
        let first = queue.schedule(1, 2, "10m", "tea", now).unwrap();
        let second = queue.schedule(1, 2, "20m", "more tea", now).unwrap();
        assert_eq!(first, 0);
        assert_eq!(second, 1);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_schedule_rejects_invalid_duration() {
        let queue = ReminderQueue::new();
        let err = queue
            .schedule(1, 2, "soon", "tea", Utc::now())
            .unwrap_err();
        assert!(matches!(err, ModerationError::InvalidDuration(ref d) if d == "soon"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_take_due_only_returns_elapsed_reminders() {
        let queue = ReminderQueue::new();
        let now = Utc::now();
        queue.schedule(1, 2, "1m", "early", now).unwrap();
        queue.schedule(1, 2, "5m", "late", now).unwrap();

        // Nothing at T+59s
        assert!(queue.take_due(now + chrono::Duration::seconds(59)).is_empty());

        // The one-minute reminder at T+61s
        let due = queue.take_due(now + chrono::Duration::seconds(61));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].text, "early");
        assert_eq!(queue.len(), 1);

        // A repeat sweep at the same instant finds nothing
        assert!(queue.take_due(now + chrono::Duration::seconds(61)).is_empty());
    }

    #[tokio::test]
    async fn test_sweep_fires_expired_mute_and_revokes_role() {
        let ledger = ViolationLedger::new();
        let now = Utc::now();
        ledger.set_mute(MuteRecord {
            user_id: 40,
            guild_id: 10,
            expires_at: now,
            role_id: 555,
        });

        let mut actuator = MockActuator::new();
        actuator
            .expect_revoke_role()
            .times(1)
            .withf(|guild_id, user_id, role_id, reason| {
                *guild_id == 10 && *user_id == 40 && *role_id == 555 && reason == "Mute expired"
            })
            .returning(|_, _, _, _| Ok(()));

        let sweeper = Sweeper::new(
            ledger.clone(),
            ReminderQueue::new(),
            Arc::new(actuator),
            Arc::new(quiet_log()),
        );

        let fired = sweeper.sweep_expired(now).await;
        assert_eq!(
            fired,
            vec![FiredAction::MuteExpired {
                guild_id: 10,
                user_id: 40,
                role_revoked: true,
            }]
        );
        assert_eq!(ledger.mute_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_mute_is_removed_even_when_revoke_fails() {
        let ledger = ViolationLedger::new();
        let now = Utc::now();
        ledger.set_mute(MuteRecord {
            user_id: 40,
            guild_id: 10,
            expires_at: now,
            role_id: 555,
        });

        let mut actuator = MockActuator::new();
        actuator
            .expect_revoke_role()
            .times(1)
            .returning(|_, _, _, _| Err(ModerationError::Other("missing perms".to_string())));

        let sweeper = Sweeper::new(
            ledger.clone(),
            ReminderQueue::new(),
            Arc::new(actuator),
            Arc::new(MockLogSink::new()),
        );

        let fired = sweeper.sweep_expired(now).await;
        assert_eq!(
            fired,
            vec![FiredAction::MuteExpired {
                guild_id: 10,
                user_id: 40,
                role_revoked: false,
            }]
        );
        // Exactly-once: the record is gone and the next sweep is a no-op
        assert_eq!(ledger.mute_count(), 0);
        assert!(sweeper.sweep_expired(now).await.is_empty());
    }

    #[tokio::test]
    async fn test_unexpired_mute_is_untouched() {
        let ledger = ViolationLedger::new();
        let now = Utc::now();
        ledger.set_mute(MuteRecord {
            user_id: 40,
            guild_id: 10,
            expires_at: now + chrono::Duration::hours(1),
            role_id: 555,
        });

        let sweeper = Sweeper::new(
            ledger.clone(),
            ReminderQueue::new(),
            Arc::new(MockActuator::new()),
            Arc::new(MockLogSink::new()),
        );

        assert!(sweeper.sweep_expired(now).await.is_empty());
        assert_eq!(ledger.mute_count(), 1);
    }

    #[tokio::test]
    async fn test_due_reminder_is_delivered_once() {
        let queue = ReminderQueue::new();
        let now = Utc::now();
        queue.schedule(40, 20, "1m", "check the oven", now).unwrap();

        let mut actuator = MockActuator::new();
        actuator
            .expect_send_channel_message()
            .times(1)
            .withf(|channel_id, text| {
                *channel_id == 20
                    && text == "<@40> You asked me to remind you about: check the oven"
            })
            .returning(|_, _| Ok(()));

        let sweeper = Sweeper::new(
            ViolationLedger::new(),
            queue.clone(),
            Arc::new(actuator),
            Arc::new(MockLogSink::new()),
        );

        let later = now + chrono::Duration::minutes(2);
        let fired = sweeper.sweep_expired(later).await;
        assert_eq!(
            fired,
            vec![FiredAction::Reminder {
                id: 0,
                user_id: 40,
                channel_id: 20,
                delivered: true,
            }]
        );
        assert!(queue.is_empty());
        assert!(sweeper.sweep_expired(later).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_reminder_delivery_is_not_retried() {
        let queue = ReminderQueue::new();
        let now = Utc::now();
        queue.schedule(40, 20, "1m", "lost cause", now).unwrap();

        let mut actuator = MockActuator::new();
        actuator
            .expect_send_channel_message()
            .times(1)
            .returning(|_, _| Err(ModerationError::Other("channel deleted".to_string())));

        let sweeper = Sweeper::new(
            ViolationLedger::new(),
            queue.clone(),
            Arc::new(actuator),
            Arc::new(MockLogSink::new()),
        );

        let later = now + chrono::Duration::minutes(2);
        let fired = sweeper.sweep_expired(later).await;
        assert!(matches!(
            fired[0],
            FiredAction::Reminder { delivered: false, .. }
        ));
        assert!(queue.is_empty());
    }
}
