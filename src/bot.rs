//! Telegram front-end: message and callback handlers, the two-step YouTube
//! format choice, file delivery with the compression fallback, and the
//! never-crash policy (every failure collapses to a localized message).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile};
use teloxide::utils::command::BotCommands;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::classify::{LinkCheck, Platform, classify};
use crate::cleanup::cleanup_file;
use crate::compress::compress_to_fit;
use crate::config::Config;
use crate::downloader::{Downloader, MediaKind};
use crate::failure::DownloadFailure;
use crate::messages;

const CALLBACK_YOUTUBE_VIDEO: &str = "yt_video";
const CALLBACK_YOUTUBE_AUDIO: &str = "yt_audio";

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    Start,
}

/// Shared handler state. The pending map is the single per-chat slot for the
/// two-step YouTube interaction; a new link overwrites the previous one.
#[derive(Clone)]
pub struct BotState {
    pub config: Arc<Config>,
    pub downloader: Arc<Downloader>,
    pub pending: Arc<Mutex<HashMap<ChatId, String>>>,
}

impl BotState {
    pub fn new(config: Arc<Config>, downloader: Arc<Downloader>) -> Self {
        Self {
            config,
            downloader,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

pub fn handler_tree() -> teloxide::dispatching::UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .endpoint(handle_message),
        )
        .branch(Update::filter_callback_query().endpoint(handle_callback))
}

async fn handle_command(bot: Bot, msg: Message, command: Command) -> ResponseResult<()> {
    match command {
        Command::Start => {
            bot.send_message(msg.chat.id, messages::START).await?;
            info!("Start command answered for chat {}", msg.chat.id);
        }
    }
    Ok(())
}

async fn handle_message(bot: Bot, msg: Message, state: BotState) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;
    info!("Received message from chat {chat_id}");

    match classify(text) {
        LinkCheck::Invalid => {
            bot.send_message(chat_id, messages::INVALID_LINK).await?;
        }
        LinkCheck::Unsupported => {
            let text = messages::for_failure(DownloadFailure::UnsupportedPlatform, false);
            bot.send_message(chat_id, text).await?;
        }
        LinkCheck::Supported(Platform::YouTube) => {
            // Two-step interaction: park the URL, ask for the format.
            state
                .pending
                .lock()
                .await
                .insert(chat_id, text.trim().to_string());

            let keyboard = InlineKeyboardMarkup::new(vec![vec![
                InlineKeyboardButton::callback(messages::BUTTON_VIDEO, CALLBACK_YOUTUBE_VIDEO),
                InlineKeyboardButton::callback(messages::BUTTON_AUDIO, CALLBACK_YOUTUBE_AUDIO),
            ]]);
            bot.send_message(chat_id, messages::CHOOSE_FORMAT)
                .reply_markup(keyboard)
                .await?;
        }
        LinkCheck::Supported(platform) => {
            process_download(&bot, chat_id, &state, text.trim(), platform, MediaKind::Video).await;
        }
    }

    Ok(())
}

async fn handle_callback(bot: Bot, q: CallbackQuery, state: BotState) -> ResponseResult<()> {
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };
    let Some(message) = q.message.as_ref() else {
        return Ok(());
    };
    let chat_id = message.chat().id;

    let kind = match data {
        CALLBACK_YOUTUBE_VIDEO => MediaKind::Video,
        CALLBACK_YOUTUBE_AUDIO => MediaKind::Audio,
        other => {
            warn!("Ignoring unknown callback data {other:?}");
            return Ok(());
        }
    };

    let pending_url = state.pending.lock().await.remove(&chat_id);
    let Some(url) = pending_url else {
        // Slot already consumed or the bot restarted in between.
        bot.send_message(chat_id, messages::START).await?;
        return Ok(());
    };

    // The keyboard served its purpose.
    let _ = bot.delete_message(chat_id, message.id()).await;

    process_download(&bot, chat_id, &state, &url, Platform::YouTube, kind).await;
    Ok(())
}

/// Runs one download end to end: status message, extraction, delivery,
/// cleanup. Never returns an error; every failure ends in a localized reply.
async fn process_download(
    bot: &Bot,
    chat_id: ChatId,
    state: &BotState,
    url: &str,
    platform: Platform,
    kind: MediaKind,
) {
    let status = bot.send_message(chat_id, messages::PROCESSING).await.ok();

    match state.downloader.download(url, platform, kind).await {
        Ok(downloaded) => {
            info!("Sending '{}' to chat {chat_id}", downloaded.title);
            deliver(bot, chat_id, state, &downloaded.path, kind).await;
        }
        Err(failure) => {
            error!("Download failed for chat {chat_id}: {}", failure.code());
            let text = messages::for_failure(failure, platform == Platform::Instagram);
            if let Err(error) = bot.send_message(chat_id, text).await {
                error!("Could not send failure message: {error}");
            }
        }
    }

    if let Some(status) = status {
        let _ = bot.delete_message(chat_id, status.id).await;
    }
}

/// Sends the media file, falling back to compression when Telegram itself
/// rejects the upload as too large. The temp file is always removed before
/// returning.
async fn deliver(bot: &Bot, chat_id: ChatId, state: &BotState, path: &Path, kind: MediaKind) {
    match send_media(bot, chat_id, path, kind).await {
        Ok(()) => {
            info!("Media sent to chat {chat_id}");
            cleanup_file(path).await;
        }
        Err(error) if is_too_big_rejection(&error) => {
            warn!("Telegram rejected the file as too large; trying compression");
            let _ = bot.send_message(chat_id, messages::COMPRESSING).await;

            match compress_to_fit(path, state.config.max_file_size).await {
                Some(compressed) => {
                    // compress_to_fit already removed the original.
                    match send_media(bot, chat_id, &compressed, kind).await {
                        Ok(()) => info!("Compressed media sent to chat {chat_id}"),
                        Err(error) => {
                            error!("Could not send compressed file: {error}");
                            let _ = bot.send_message(chat_id, messages::FILE_TOO_LARGE).await;
                        }
                    }
                    cleanup_file(&compressed).await;
                }
                None => {
                    let _ = bot.send_message(chat_id, messages::FILE_TOO_LARGE).await;
                    cleanup_file(path).await;
                }
            }
        }
        Err(error) => {
            error!("Could not send media to chat {chat_id}: {error}");
            let _ = bot.send_message(chat_id, messages::DOWNLOAD_FAILED).await;
            cleanup_file(path).await;
        }
    }
}

async fn send_media(
    bot: &Bot,
    chat_id: ChatId,
    path: &Path,
    kind: MediaKind,
) -> Result<(), teloxide::RequestError> {
    let file = InputFile::file(path.to_path_buf());
    match kind {
        MediaKind::Video => {
            bot.send_video(chat_id, file)
                .caption(messages::COMPLETED)
                .supports_streaming(true)
                .await?;
        }
        MediaKind::Audio => {
            bot.send_audio(chat_id, file)
                .caption(messages::COMPLETED)
                .await?;
        }
    }
    Ok(())
}

/// Matches Telegram's "Request Entity Too Large" / "file is too big"
/// rejections by message text, like the original handler did.
fn is_too_big_rejection(error: &teloxide::RequestError) -> bool {
    let text = error.to_string().to_ascii_lowercase();
    text.contains("too big") || text.contains("too large")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pending_slot_holds_one_url_per_chat() {
        let state_map: Mutex<HashMap<ChatId, String>> = Mutex::new(HashMap::new());
        let chat = ChatId(42);

        state_map
            .lock()
            .await
            .insert(chat, "https://youtu.be/first".to_string());
        state_map
            .lock()
            .await
            .insert(chat, "https://youtu.be/second".to_string());

        // Last link wins, and taking it empties the slot.
        let taken = state_map.lock().await.remove(&chat);
        assert_eq!(taken.as_deref(), Some("https://youtu.be/second"));
        assert_eq!(state_map.lock().await.remove(&chat), None);
    }
}
