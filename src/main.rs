use std::env;
use std::sync::Arc;

use poise::serenity_prelude::{self as serenity};
use serenity::GatewayIntents;
use tokio::sync::mpsc;
use tracing::info;

use warden_daemon::moderation::SweepRequest;
use warden_daemon::{Data, Error, SWEEP_INTERVAL_SECS, commands, handlers, logging};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    // Initialize logging
    logging::init()?;

    // Load environment variables
    let token = env::var("DISCORD_TOKEN").expect("DISCORD_TOKEN must be set");

    // Configure the Poise framework
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            pre_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_start(ctx);
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_end(ctx);
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    // Tell the invoker what went wrong, then log it
                    if let poise::FrameworkError::Command { ref error, ctx, .. } = error {
                        let _ = ctx.say(format!("Error: {error}")).await;
                    }
                    logging::log_command_error(&error);
                })
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                // Wire the engine to the live HTTP client and start the
                // background sweep task
                let mut data = Data::from_http(Arc::clone(&ctx.http));
                let (tx, rx) = mpsc::channel::<SweepRequest>(100);
                data.set_sweep_tx(tx);
                data.sweeper.clone().spawn(rx, SWEEP_INTERVAL_SECS);

                // Event handlers read the same Data out of serenity's map
                ctx.data.write().await.insert::<Data>(data.clone());

                logging::log_console("Engine wired, sweep task running".to_string());
                Ok(data)
            })
        })
        .build();

    // Configure the Serenity client
    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;
    let mut client = serenity::ClientBuilder::new(token, intents)
        .event_handler(handlers::Handler)
        .framework(framework)
        .await
        .expect("Failed to create client");

    info!("Starting bot...");
    // Start the bot
    if let Err(err) = client.start().await {
        eprintln!("Error starting the bot: {}", err);
    }

    Ok(())
}

fn main() {
    // Run the async main function
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async_main());

    // Handle any errors that occurred during execution
    if let Err(err) = result {
        eprintln!("Error: {}", err);
    }
}
