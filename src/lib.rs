pub mod commands;
pub mod data;
pub mod handlers;
pub mod logging;
pub mod moderation;
pub mod policy;
pub mod reaction_roles;

pub const BOT_NAME: &str = "warden_daemon";
pub const COMMAND_TARGET: &str = "warden_daemon::command";
pub const ERROR_TARGET: &str = "warden_daemon::error";
pub const EVENT_TARGET: &str = "warden_daemon::handlers";
pub const CONSOLE_TARGET: &str = "warden_daemon";

/// Seconds between background sweeps of expired mutes and due reminders
pub const SWEEP_INTERVAL_SECS: u64 = 60;

pub use data::{Data, DataInner};
pub use moderation::{Dispatcher, ModerationError, Sweeper};
pub use policy::{GuildPolicy, PolicyStore, PunishmentLevel};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
