use crate::{COMMAND_TARGET, CONSOLE_TARGET, Data, ERROR_TARGET, Error};
use poise::{Context, FrameworkError};
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log directory name
pub const LOG_DIR: &str = "logs";
/// Command log file name
pub const COMMAND_LOG_FILE: &str = "warden";

/// Initialize the logging system with console and file outputs
pub fn init() -> Result<(), Error> {
    if !Path::new(LOG_DIR).exists() {
        std::fs::create_dir_all(LOG_DIR)?;
    }

    // Daily-rotated JSON log of command activity, human-readable console
    let command_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, COMMAND_LOG_FILE);

    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true);

    let command_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(command_file);

    // Default to INFO and silence serenity's gateway chatter unless RUST_LOG
    // says otherwise
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info").add_directive("serenity=error".parse().expect("static directive"))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(command_layer)
        .init();

    info!("Logging system initialized");
    Ok(())
}

// Start time of the command currently running on this worker
thread_local! {
    static COMMAND_START_TIME: std::cell::RefCell<Option<Instant>> = const { std::cell::RefCell::new(None) };
}

fn guild_label(ctx: &Context<'_, Data, Error>) -> String {
    ctx.guild_id()
        .map_or_else(|| "DM".to_string(), |id| id.get().to_string())
}

/// Log the start of a command execution (pre-command hook)
pub fn log_command_start(ctx: Context<'_, Data, Error>) {
    COMMAND_START_TIME.with(|cell| {
        *cell.borrow_mut() = Some(Instant::now());
    });

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(&ctx),
        user_id = %ctx.author().id.get(),
        invocation = %ctx.invocation_string(),
        event = "start",
        "Command execution started"
    );
}

/// Log the end of a command execution (post-command hook)
pub fn log_command_end(ctx: Context<'_, Data, Error>) {
    let duration =
        COMMAND_START_TIME.with(|cell| cell.borrow_mut().take().map(|start| start.elapsed()));
    let duration_ms = u64::try_from(duration.map_or(0, |d| d.as_millis())).unwrap_or_default();

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(&ctx),
        user_id = %ctx.author().id.get(),
        duration_ms = duration_ms,
        event = "end",
        "Command execution completed"
    );
}

/// Log errors that occur during command execution
pub fn log_command_error(error: &FrameworkError<'_, Data, Error>) {
    match error {
        FrameworkError::Command { error, ctx, .. } => {
            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(ctx),
                user_id = %ctx.author().id.get(),
                error = %error,
                "Command error"
            );
        }
        FrameworkError::ArgumentParse { error, input, ctx, .. } => {
            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(ctx),
                input = %input.as_deref().unwrap_or(""),
                error = %error,
                "Argument parse error"
            );
        }
        FrameworkError::CommandCheckFailed { error, ctx, .. } => {
            let error_msg = error
                .as_ref()
                .map_or_else(|| "Check failed".to_string(), ToString::to_string);
            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(ctx),
                user_id = %ctx.author().id.get(),
                error = %error_msg,
                "Command check failed"
            );
        }
        err => {
            error!(
                target: ERROR_TARGET,
                error = ?err,
                "Other framework error"
            );
        }
    }
}

pub fn log_console(message: String) {
    info!(
        target: CONSOLE_TARGET,
        message = %message,
        event = "console",
    );
}
