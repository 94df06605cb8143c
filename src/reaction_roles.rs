//! Reaction roles
//!
//! Maps `(message, emoji)` pairs to role ids and mirrors reaction add and
//! remove events onto role grants and revokes. Unbound reactions are
//! ignored, and role failures are logged rather than surfaced; a user
//! un-reacting must never crash the event path.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use crate::moderation::Actuator;

/// A reaction-role binding on one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleBinding {
    pub message_id: u64,
    pub emoji: String,
    pub role_id: u64,
}

/// Bindings keyed by `(message_id, emoji)`
#[derive(Clone)]
pub struct ReactionRoles {
    bindings: Arc<DashMap<(u64, String), u64>>,
    actuator: Arc<dyn Actuator>,
}

impl ReactionRoles {
    #[must_use]
    pub fn new(actuator: Arc<dyn Actuator>) -> Self {
        Self {
            bindings: Arc::new(DashMap::new()),
            actuator,
        }
    }

    /// Bind an emoji on a message to a role. Re-binding the same pair
    /// replaces the previous role.
    pub fn bind(&self, message_id: u64, emoji: &str, role_id: u64) {
        self.bindings
            .insert((message_id, emoji.to_string()), role_id);
    }

    /// Remove a binding. Returns the role id it pointed at, if any.
    pub fn unbind(&self, message_id: u64, emoji: &str) -> Option<u64> {
        self.bindings
            .remove(&(message_id, emoji.to_string()))
            .map(|(_, role_id)| role_id)
    }

    #[must_use]
    pub fn role_for(&self, message_id: u64, emoji: &str) -> Option<u64> {
        self.bindings
            .get(&(message_id, emoji.to_string()))
            .map(|entry| *entry)
    }

    /// All bindings on one message, for the listing command.
    #[must_use]
    pub fn bindings_for_message(&self, message_id: u64) -> Vec<RoleBinding> {
        let mut bindings: Vec<RoleBinding> = self
            .bindings
            .iter()
            .filter(|entry| entry.key().0 == message_id)
            .map(|entry| RoleBinding {
                message_id,
                emoji: entry.key().1.clone(),
                role_id: *entry.value(),
            })
            .collect();
        bindings.sort_by(|a, b| a.emoji.cmp(&b.emoji));
        bindings
    }

    /// Grant the bound role for a reaction add. Unbound reactions are a
    /// silent no-op.
    pub async fn on_reaction_add(&self, guild_id: u64, message_id: u64, emoji: &str, user_id: u64) {
        let Some(role_id) = self.role_for(message_id, emoji) else {
            return;
        };
        match self
            .actuator
            .grant_role(guild_id, user_id, role_id, "Reaction role")
            .await
        {
            Ok(()) => {
                info!(
                    target: crate::EVENT_TARGET,
                    user_id = %user_id,
                    role_id = %role_id,
                    "Granted reaction role"
                );
            }
            Err(e) => {
                warn!(
                    target: crate::ERROR_TARGET,
                    user_id = %user_id,
                    role_id = %role_id,
                    error = %e,
                    "Failed to grant reaction role"
                );
            }
        }
    }

    /// Revoke the bound role for a reaction remove. Unbound reactions are a
    /// silent no-op.
    pub async fn on_reaction_remove(
        &self,
        guild_id: u64,
        message_id: u64,
        emoji: &str,
        user_id: u64,
    ) {
        let Some(role_id) = self.role_for(message_id, emoji) else {
            return;
        };
        match self
            .actuator
            .revoke_role(guild_id, user_id, role_id, "Reaction role removed")
            .await
        {
            Ok(()) => {
                info!(
                    target: crate::EVENT_TARGET,
                    user_id = %user_id,
                    role_id = %role_id,
                    "Revoked reaction role"
                );
            }
            Err(e) => {
                warn!(
                    target: crate::ERROR_TARGET,
                    user_id = %user_id,
                    role_id = %role_id,
                    error = %e,
                    "Failed to revoke reaction role"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::ModerationError;
    use crate::moderation::actuator::MockActuator;

    #[test]
    fn test_bind_replaces_previous_role() {
        let rr = ReactionRoles::new(Arc::new(MockActuator::new()));
        rr.bind(100, "🎉", 1);
        rr.bind(100, "🎉", 2);
        assert_eq!(rr.role_for(100, "🎉"), Some(2));
    }

    #[test]
    fn test_unbind_returns_role() {
        let rr = ReactionRoles::new(Arc::new(MockActuator::new()));
        rr.bind(100, "🎉", 1);
        assert_eq!(rr.unbind(100, "🎉"), Some(1));
        assert_eq!(rr.unbind(100, "🎉"), None);
        assert_eq!(rr.role_for(100, "🎉"), None);
    }

    #[test]
    fn test_bindings_are_scoped_to_message_and_emoji() {
        let rr = ReactionRoles::new(Arc::new(MockActuator::new()));
        rr.bind(100, "🎉", 1);
        rr.bind(100, "🔥", 2);
        rr.bind(200, "🎉", 3);

        assert_eq!(rr.role_for(100, "🔥"), Some(2));
        assert_eq!(rr.role_for(200, "🎉"), Some(3));
        assert_eq!(rr.bindings_for_message(100).len(), 2);
        assert_eq!(rr.bindings_for_message(200).len(), 1);
    }

    #[tokio::test]
    async fn test_reaction_add_grants_bound_role() {
        let mut actuator = MockActuator::new();
        actuator
            .expect_grant_role()
            .times(1)
            .withf(|guild_id, user_id, role_id, _| {
                *guild_id == 10 && *user_id == 40 && *role_id == 7
            })
            .returning(|_, _, _, _| Ok(()));

        let rr = ReactionRoles::new(Arc::new(actuator));
        rr.bind(100, "🎉", 7);
        rr.on_reaction_add(10, 100, "🎉", 40).await;
    }

    #[tokio::test]
    async fn test_unbound_reaction_is_ignored() {
        // No actuator expectations: any call would fail the test
        let rr = ReactionRoles::new(Arc::new(MockActuator::new()));
        rr.on_reaction_add(10, 100, "🎉", 40).await;
        rr.on_reaction_remove(10, 100, "🎉", 40).await;
    }

    #[tokio::test]
    async fn test_reaction_remove_revokes_and_swallows_failure() {
        let mut actuator = MockActuator::new();
        actuator
            .expect_revoke_role()
            .times(1)
            .returning(|_, _, _, _| Err(ModerationError::Other("role deleted".to_string())));

        let rr = ReactionRoles::new(Arc::new(actuator));
        rr.bind(100, "🎉", 7);
        rr.on_reaction_remove(10, 100, "🎉", 40).await;
    }
}
