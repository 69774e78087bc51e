use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use teloxide::prelude::*;
use teloxide::types::{FileId, ReplyParameters};
use tracing::{info, warn};

use crate::llm::media::{detect_mime_type, download_image, extension_for_mime};
use crate::state::{AppState, StagedOutfit};
use crate::stylist::ItemType;
use crate::utils::timing::{complete_command_timer, start_command_timer};

/// Reads the garment slot from the first word of a photo caption.
pub fn parse_item_caption(caption: Option<&str>) -> Option<ItemType> {
    let word = caption?
        .split_whitespace()
        .next()?
        .trim_start_matches('/')
        .trim_end_matches(|ch: char| !ch.is_alphanumeric());
    word.parse::<ItemType>().ok()
}

pub fn upload_path(
    upload_dir: &Path,
    chat_id: i64,
    item_type: ItemType,
    extension: &str,
) -> PathBuf {
    upload_dir
        .join(chat_id.to_string())
        .join(format!("{}.{}", item_type, extension))
}

pub fn describe_staged(staged: &StagedOutfit) -> String {
    let missing = staged.missing_required();
    if missing.is_empty() {
        let jacket = if staged.jacket.is_some() {
            " with a jacket"
        } else {
            " (optionally send a jacket too)"
        };
        return format!("Outfit ready{jacket}. Send /generate to render it.");
    }
    let names = missing
        .iter()
        .map(|item| item.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!("Still needed: {names}.")
}

fn photo_file_id(message: &Message) -> Option<FileId> {
    if let Some(photo) = message.photo().and_then(|sizes| sizes.last()) {
        return Some(photo.file.id.clone());
    }
    let document = message.document()?;
    let is_image = document
        .mime_type
        .as_ref()
        .map(|mime| mime.essence_str().starts_with("image/"))
        .unwrap_or(false);
    is_image.then(|| document.file.id.clone())
}

async fn fetch_telegram_file(bot: &Bot, state: &AppState, file_id: &FileId) -> Result<Vec<u8>> {
    let file = bot.get_file(file_id.clone()).await?;
    let url = format!(
        "https://api.telegram.org/file/bot{}/{}",
        state.config.bot_token, file.path
    );
    download_image(&url, state.config.image_download_timeout())
        .await
        .ok_or_else(|| anyhow!("Telegram file download failed"))
}

async fn save_upload(
    state: &AppState,
    chat_id: i64,
    item_type: ItemType,
    bytes: &[u8],
) -> Result<PathBuf> {
    let mime_type = detect_mime_type(bytes).unwrap_or_else(|| "image/jpeg".to_string());
    let path = upload_path(
        &state.config.upload_dir,
        chat_id,
        item_type,
        extension_for_mime(&mime_type),
    );
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

pub async fn photo_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(file_id) = photo_file_id(&message) else {
        return Ok(());
    };
    let Some(item_type) = parse_item_caption(message.caption()) else {
        bot.send_message(
            message.chat.id,
            "Caption the photo with the garment it shows: top, bottom, shoes or jacket.",
        )
        .reply_parameters(ReplyParameters::new(message.id))
        .await?;
        return Ok(());
    };

    let mut timer = start_command_timer("upload", &message);
    let chat_id = message.chat.id.0;

    let saved = match fetch_telegram_file(&bot, &state, &file_id).await {
        Ok(bytes) => save_upload(&state, chat_id, item_type, &bytes).await,
        Err(err) => Err(err),
    };

    let path = match saved {
        Ok(path) => path,
        Err(err) => {
            warn!("Failed to store {} photo for chat {}: {:#}", item_type, chat_id, err);
            complete_command_timer(&mut timer, "error", Some(err.to_string()));
            bot.send_message(
                message.chat.id,
                format!("I couldn't save that {} photo. Please send it again.", item_type),
            )
            .reply_parameters(ReplyParameters::new(message.id))
            .await?;
            return Ok(());
        }
    };

    info!("Stored {} photo for chat {} at {}", item_type, chat_id, path.display());
    let staged = state.stage(chat_id, item_type, path);
    bot.send_message(
        message.chat.id,
        format!("Got the {}. {}", item_type, describe_staged(&staged)),
    )
    .reply_parameters(ReplyParameters::new(message.id))
    .await?;
    complete_command_timer(&mut timer, "success", Some(item_type.to_string()));
    Ok(())
}
