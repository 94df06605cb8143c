use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use poise::serenity_prelude as serenity;
use serenity::prelude::TypeMapKey;
use tokio::sync::mpsc::Sender;
use tracing::warn;

use crate::moderation::{
    Actuator, Dispatcher, LogSink, ReminderQueue, SweepRequest, Sweeper, ViolationLedger,
};
use crate::policy::PolicyStore;
use crate::reaction_roles::ReactionRoles;

/// Centralized data structure for the bot
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data").finish_non_exhaustive()
    }
}

// Implement TypeMapKey for Data to allow storing it in Serenity's data map
impl TypeMapKey for Data {
    type Value = Data;
}

/// Shared state behind [`Data`]
///
/// Every store is a cheaply cloneable handle over the same underlying maps,
/// so cloning `DataInner` never forks state.
#[derive(Clone)]
pub struct DataInner {
    /// Per-guild configuration
    pub policies: PolicyStore,
    /// Warnings and timed mutes
    pub ledger: ViolationLedger,
    /// Pending reminders
    pub reminders: ReminderQueue,
    /// Reaction-role bindings
    pub reaction_roles: ReactionRoles,
    /// Rule evaluation and punishment dispatch
    pub dispatcher: Dispatcher,
    /// Fires expired mutes and due reminders
    pub sweeper: Sweeper,
    /// Discord side effects, shared by every component
    pub actuator: Arc<dyn Actuator>,
    /// Channel to the background sweep task
    pub sweep_tx: Arc<Option<Sender<SweepRequest>>>,
}

impl Data {
    /// Wire up the full engine over the given Discord capabilities.
    #[must_use]
    pub fn new(actuator: Arc<dyn Actuator>, log: Arc<dyn LogSink>) -> Self {
        Self::with_policies(PolicyStore::new(), actuator, log)
    }

    /// Wire up the engine against the live Discord API.
    #[must_use]
    pub fn from_http(http: Arc<serenity::Http>) -> Self {
        let policies = PolicyStore::new();
        let actuator = Arc::new(crate::moderation::SerenityActuator::new(Arc::clone(&http)));
        let log = Arc::new(crate::moderation::ChannelLogSink::new(http, policies.clone()));
        Self::with_policies(policies, actuator, log)
    }

    fn with_policies(
        policies: PolicyStore,
        actuator: Arc<dyn Actuator>,
        log: Arc<dyn LogSink>,
    ) -> Self {
        let ledger = ViolationLedger::new();
        let reminders = ReminderQueue::new();
        let reaction_roles = ReactionRoles::new(Arc::clone(&actuator));
        let dispatcher = Dispatcher::new(
            policies.clone(),
            ledger.clone(),
            Arc::clone(&actuator),
            Arc::clone(&log),
        );
        let sweeper = Sweeper::new(
            ledger.clone(),
            reminders.clone(),
            Arc::clone(&actuator),
            log,
        );

        Self(Arc::new(DataInner {
            policies,
            ledger,
            reminders,
            reaction_roles,
            dispatcher,
            sweeper,
            actuator,
            sweep_tx: Arc::new(None),
        }))
    }

    /// Set the sweep task sender
    pub fn set_sweep_tx(&mut self, tx: Sender<SweepRequest>) {
        Arc::make_mut(&mut self.0).sweep_tx = Arc::new(Some(tx));
    }

    /// Record the bot's own user id once the gateway reports it
    pub fn set_bot_user_id(&self, id: u64) {
        self.dispatcher.set_bot_user_id(id);
    }

    /// Ask the sweep task to run immediately
    pub async fn request_sweep(&self) {
        if let Some(tx) = &*self.sweep_tx {
            if let Err(e) = tx.send(SweepRequest::SweepNow).await {
                warn!(target: crate::ERROR_TARGET, error = %e, "Failed to request sweep");
            }
        }
    }

    /// Ask the sweep task to shut down
    pub async fn shutdown_sweeper(&self) {
        if let Some(tx) = &*self.sweep_tx {
            if let Err(e) = tx.send(SweepRequest::Shutdown).await {
                warn!(target: crate::ERROR_TARGET, error = %e, "Failed to send sweeper shutdown");
            }
        }
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Data {
    fn deref_mut(&mut self) -> &mut Self::Target {
        Arc::make_mut(&mut self.0)
    }
}
