mod bot;
mod classify;
mod cleanup;
mod compress;
mod config;
mod cookies;
mod downloader;
mod failure;
mod messages;

use std::sync::Arc;

use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::bot::BotState;
use crate::config::{Config, ConfigError};
use crate::cookies::CookieStore;
use crate::downloader::Downloader;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(error) = run().await {
        tracing::error!("Startup failed: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ConfigError> {
    let config = Arc::new(Config::from_env()?);
    info!(
        "Starting bot (max file size {} MB, temp dir {})",
        config.max_file_size / (1024 * 1024),
        config.temp_dir.display()
    );

    let cookies = CookieStore::load();
    if cookies.instagram.is_some() {
        info!("Instagram cookies loaded");
    }
    if cookies.facebook.is_some() {
        info!("Facebook cookies loaded");
    }
    if cookies.session.is_some() {
        info!("Persisted Instagram session loaded");
    }

    let http = config.http_client()?;

    let downloader = Arc::new(Downloader::new(Arc::clone(&config), cookies, http));

    // Clear leftovers from a previous run, then keep sweeping in the background.
    cleanup::sweep_stale_files(&config.temp_dir, cleanup::STALE_FILE_AGE).await;
    tokio::spawn(cleanup::sweep_loop(config.temp_dir.clone()));

    let telegram = Bot::new(config.bot_token.clone());
    let state = BotState::new(config, downloader);

    info!("Bot is running");
    Dispatcher::builder(telegram, bot::handler_tree())
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
