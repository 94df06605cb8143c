//! Moderation engine
//!
//! Rule evaluation, punishment dispatch, the violation ledger, and the
//! deferred action scheduler. The engine talks to Discord only through the
//! [`actuator::Actuator`] and [`actuator::LogSink`] capabilities, which keeps
//! every decision path testable without a gateway connection.

pub mod actuator;
pub mod dispatch;
pub mod duration;
pub mod error;
pub mod ledger;
pub mod rules;
pub mod scheduler;

pub use actuator::{Actuator, ChannelLogSink, LogSink, SerenityActuator};
pub use dispatch::{DispatchOutcome, Dispatcher, MuteOutcome};
pub use duration::parse_duration;
pub use error::{ModResult, ModerationError};
pub use ledger::{MuteRecord, ViolationLedger, ViolationRecord};
pub use rules::{MessageView, Violation};
pub use scheduler::{FiredAction, ReminderQueue, ReminderRecord, Sweeper};

/// Requests accepted by the background sweep task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepRequest {
    /// Run a sweep immediately instead of waiting for the interval
    SweepNow,
    /// Stop the sweep task
    Shutdown,
}
