use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{
    ChatAction, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId, ReplyParameters,
};
use tracing::{error, info, warn};

use crate::handlers::uploads::describe_staged;
use crate::state::AppState;
use crate::stylist::{GeneratedImage, StylistError};
use crate::utils::telegram::start_chat_action_heartbeat;
use crate::utils::timing::{complete_command_timer, start_command_timer, CommandTimer};

pub const TRY_CALLBACK_PREFIX: &str = "try:";
const TRY_ALL_CALLBACK_DATA: &str = "try:all";
const BUSY_TEXT: &str = "Still working on your last request. Please wait for it to finish.";
const IMAGE_CAPTION_LIMIT: usize = 1000;
const NO_IMAGE_TEXT: &str =
    "The image was generated but could not be downloaded. Your previous image still stands; try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrySelection {
    One(usize),
    All,
}

impl TrySelection {
    /// Parses a 1-based suggestion number or "all".
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("all") {
            return Some(TrySelection::All);
        }
        match value.parse::<usize>() {
            Ok(number) if number >= 1 => Some(TrySelection::One(number - 1)),
            _ => None,
        }
    }

    fn label(self) -> String {
        match self {
            TrySelection::One(index) => format!("try {}", index + 1),
            TrySelection::All => "try all".to_string(),
        }
    }
}

pub fn build_suggestion_keyboard(count: usize) -> InlineKeyboardMarkup {
    let tries = (1..=count)
        .map(|number| {
            InlineKeyboardButton::callback(
                format!("Try {}", number),
                format!("{}{}", TRY_CALLBACK_PREFIX, number),
            )
        })
        .collect::<Vec<_>>();
    let all = vec![InlineKeyboardButton::callback(
        "Try all",
        TRY_ALL_CALLBACK_DATA,
    )];
    InlineKeyboardMarkup::new(vec![tries, all])
}

pub fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        return "No suggestions available right now. Try /suggest again later.".to_string();
    }
    let mut text = String::from("Styling suggestions:\n");
    for (index, suggestion) in suggestions.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", index + 1, suggestion));
    }
    text.push_str("\nTap a button or use /try <n> or /tryall.");
    text
}

fn describe_stylist_error(err: &StylistError) -> String {
    match err {
        StylistError::NoOutfit => {
            "Generate an outfit first: send the photos, then /generate.".to_string()
        }
        StylistError::NoSuggestion(_) | StylistError::NoSuggestions => {
            format!("{}. Use /suggest to get fresh ideas.", capitalize(&err.to_string()))
        }
        StylistError::Synthesis(inner) => format!("Image generation failed: {}", inner),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

async fn reply_text(
    bot: &Bot,
    chat_id: ChatId,
    reply_to: Option<MessageId>,
    text: &str,
) -> Result<()> {
    let mut request = bot.send_message(chat_id, text.to_string());
    if let Some(reply_to) = reply_to {
        request = request.reply_parameters(ReplyParameters::new(reply_to));
    }
    request.await?;
    Ok(())
}

async fn send_generated_image(
    bot: &Bot,
    chat_id: ChatId,
    reply_to: Option<MessageId>,
    image: &GeneratedImage,
    caption: &str,
) -> Result<()> {
    let mut request = bot
        .send_photo(chat_id, InputFile::memory(image.bytes.clone()).file_name("outfit.png"))
        .caption(caption.chars().take(IMAGE_CAPTION_LIMIT).collect::<String>());
    if let Some(reply_to) = reply_to {
        request = request.reply_parameters(ReplyParameters::new(reply_to));
    }
    request.await?;
    Ok(())
}

async fn finish_render(
    bot: &Bot,
    chat_id: ChatId,
    reply_to: Option<MessageId>,
    timer: &mut CommandTimer,
    result: Result<Option<GeneratedImage>, StylistError>,
    caption: &str,
) -> Result<()> {
    match result {
        Ok(Some(image)) => {
            send_generated_image(bot, chat_id, reply_to, &image, caption).await?;
            complete_command_timer(timer, "success", Some(format!("seed={}", image.seed)));
        }
        Ok(None) => {
            reply_text(bot, chat_id, reply_to, NO_IMAGE_TEXT).await?;
            complete_command_timer(timer, "no_image", None);
        }
        Err(err) => {
            if matches!(err, StylistError::Synthesis(_)) {
                error!("Render failed for chat {}: {}", chat_id.0, err);
            }
            reply_text(bot, chat_id, reply_to, &describe_stylist_error(&err)).await?;
            complete_command_timer(timer, "error", Some(err.to_string()));
        }
    }
    Ok(())
}

pub async fn start_handler(bot: Bot, message: Message) -> Result<()> {
    bot.send_message(
        message.chat.id,
        "Hi! I put outfits together. Send photos of a top, bottom and shoes (plus an optional jacket), \
         captioning each with its name, then use /generate. See /help for more.",
    )
    .reply_parameters(ReplyParameters::new(message.id))
    .await?;
    Ok(())
}

pub async fn help_handler(bot: Bot, message: Message) -> Result<()> {
    let help_text = "Outfit Stylist commands

Send a photo captioned top, bottom, shoes or jacket to stage a garment.

/generate - Describe the staged garments and render the outfit
/suggest - Ask for three styling additions to the current outfit
/try <n> - Render the outfit with suggestion n
/tryall - Render the outfit with every suggestion
/status - Show staged photos, the current outfit and suggestions
/reset - Forget staged photos and the current outfit";

    bot.send_message(message.chat.id, help_text)
        .reply_parameters(ReplyParameters::new(message.id))
        .await?;
    Ok(())
}

pub async fn generate_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let mut timer = start_command_timer("generate", &message);
    let chat_id = message.chat.id;

    let staged = state.staged(chat_id.0);
    let Some(images) = staged.to_images() else {
        reply_text(&bot, chat_id, Some(message.id), &describe_staged(&staged)).await?;
        complete_command_timer(&mut timer, "rejected", Some("missing photos".to_string()));
        return Ok(());
    };

    let Ok(mut session) = state.sessions.try_acquire(chat_id.0) else {
        reply_text(&bot, chat_id, Some(message.id), BUSY_TEXT).await?;
        complete_command_timer(&mut timer, "busy", None);
        return Ok(());
    };

    let _chat_action = start_chat_action_heartbeat(bot.clone(), chat_id, ChatAction::UploadPhoto);
    let result = state.stylist.generate(&mut session, images).await;
    drop(session);

    let result = result.map(|report| {
        let fallbacks = report.fallback_items();
        if !fallbacks.is_empty() {
            warn!(
                "Chat {} outfit used placeholder descriptions for {:?}",
                chat_id.0, fallbacks
            );
        }
        report.image
    });

    finish_render(
        &bot,
        chat_id,
        Some(message.id),
        &mut timer,
        result,
        "Here is your outfit. Use /suggest for styling ideas.",
    )
    .await
}

async fn run_suggest(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    reply_to: Option<MessageId>,
    timer: &mut CommandTimer,
) -> Result<()> {
    let Ok(mut session) = state.sessions.try_acquire(chat_id.0) else {
        reply_text(bot, chat_id, reply_to, BUSY_TEXT).await?;
        complete_command_timer(timer, "busy", None);
        return Ok(());
    };

    let _chat_action = start_chat_action_heartbeat(bot.clone(), chat_id, ChatAction::Typing);
    let result = state.stylist.refresh_suggestions(&mut session).await;
    drop(session);

    match result {
        Ok(suggestions) => {
            let mut request = bot.send_message(chat_id, format_suggestions(&suggestions));
            if let Some(reply_to) = reply_to {
                request = request.reply_parameters(ReplyParameters::new(reply_to));
            }
            if !suggestions.is_empty() {
                request = request.reply_markup(build_suggestion_keyboard(suggestions.len()));
            }
            request.await?;
            complete_command_timer(
                timer,
                "success",
                Some(format!("count={}", suggestions.len())),
            );
        }
        Err(err) => {
            reply_text(bot, chat_id, reply_to, &describe_stylist_error(&err)).await?;
            complete_command_timer(timer, "error", Some(err.to_string()));
        }
    }
    Ok(())
}

pub async fn suggest_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let mut timer = start_command_timer("suggest", &message);
    run_suggest(&bot, &state, message.chat.id, Some(message.id), &mut timer).await
}

async fn run_try(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    reply_to: Option<MessageId>,
    selection: TrySelection,
    timer: &mut CommandTimer,
) -> Result<()> {
    let Ok(mut session) = state.sessions.try_acquire(chat_id.0) else {
        reply_text(bot, chat_id, reply_to, BUSY_TEXT).await?;
        complete_command_timer(timer, "busy", None);
        return Ok(());
    };

    let caption = match selection {
        TrySelection::One(index) => session
            .suggestion(index)
            .map(|text| format!("Suggestion {}: {}", index + 1, text))
            .unwrap_or_default(),
        TrySelection::All => format!("All suggestions: {}", session.suggestions.join(", ")),
    };

    info!("Chat {} requested {}", chat_id.0, selection.label());
    let _chat_action = start_chat_action_heartbeat(bot.clone(), chat_id, ChatAction::UploadPhoto);
    let result = match selection {
        TrySelection::One(index) => state.stylist.apply_suggestion(&mut session, index).await,
        TrySelection::All => state.stylist.apply_all_suggestions(&mut session).await,
    };
    drop(session);

    finish_render(bot, chat_id, reply_to, timer, result, &caption).await
}

pub async fn try_handler(
    bot: Bot,
    state: AppState,
    message: Message,
    arg: Option<String>,
) -> Result<()> {
    let mut timer = start_command_timer("try", &message);
    let Some(selection) = arg.as_deref().and_then(TrySelection::parse) else {
        reply_text(
            &bot,
            message.chat.id,
            Some(message.id),
            "Usage: /try <n>, for example /try 1",
        )
        .await?;
        complete_command_timer(&mut timer, "rejected", Some("bad argument".to_string()));
        return Ok(());
    };
    run_try(&bot, &state, message.chat.id, Some(message.id), selection, &mut timer).await
}

pub async fn tryall_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let mut timer = start_command_timer("tryall", &message);
    run_try(&bot, &state, message.chat.id, Some(message.id), TrySelection::All, &mut timer).await
}

pub async fn try_selection_callback(bot: Bot, state: AppState, query: CallbackQuery) -> Result<()> {
    let _ = bot.answer_callback_query(query.id.clone()).await;
    let Some(data) = &query.data else {
        return Ok(());
    };
    let Some(selection) = data
        .strip_prefix(TRY_CALLBACK_PREFIX)
        .and_then(TrySelection::parse)
    else {
        return Ok(());
    };
    let Some(message) = &query.message else {
        return Ok(());
    };

    let chat_id = message.chat().id;
    let mut timer = CommandTimer::new(&format!("callback:{}", selection.label()), Some(chat_id.0));
    timer.log_received();
    run_try(&bot, &state, chat_id, Some(message.id()), selection, &mut timer).await
}

pub async fn status_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let chat_id = message.chat.id;
    let staged = state.staged(chat_id.0);
    let mut text = format!("Staged photos: {}\n", describe_staged(&staged));

    match state.sessions.try_acquire(chat_id.0) {
        Ok(session) => match &session.outfit {
            Some(outfit) => {
                text.push_str("\nCurrent outfit:\n");
                for description in outfit.descriptions.iter() {
                    text.push_str(&format!(
                        "- {}: {}\n",
                        description.item_type.label(),
                        description.text
                    ));
                }
                text.push('\n');
                text.push_str(&format_suggestions(&session.suggestions));
            }
            None => text.push_str("\nNo outfit generated yet."),
        },
        Err(_) => text.push_str("\nA request is running right now."),
    }

    reply_text(&bot, chat_id, Some(message.id), &text).await
}

pub async fn reset_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let chat_id = message.chat.id;
    if state.reset_chat(chat_id.0).is_err() {
        return reply_text(&bot, chat_id, Some(message.id), BUSY_TEXT).await;
    }
    reply_text(
        &bot,
        chat_id,
        Some(message.id),
        "Cleared your photos and outfit. Send new photos to start over.",
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_selection_is_one_based() {
        assert_eq!(TrySelection::parse("1"), Some(TrySelection::One(0)));
        assert_eq!(TrySelection::parse(" 3 "), Some(TrySelection::One(2)));
        assert_eq!(TrySelection::parse("ALL"), Some(TrySelection::All));
        assert_eq!(TrySelection::parse("0"), None);
        assert_eq!(TrySelection::parse("two"), None);
    }

    #[test]
    fn keyboard_has_one_button_per_suggestion_and_try_all() {
        let keyboard = build_suggestion_keyboard(2);
        assert_eq!(keyboard.inline_keyboard.len(), 2);
        assert_eq!(keyboard.inline_keyboard[0].len(), 2);
        assert_eq!(keyboard.inline_keyboard[1][0].text, "Try all");
    }

    #[test]
    fn suggestion_list_is_numbered() {
        let text = format_suggestions(&["Add a belt".to_string(), "Gold earrings".to_string()]);
        assert!(text.contains("1. Add a belt\n2. Gold earrings\n"));
        assert!(format_suggestions(&[]).starts_with("No suggestions available"));
    }

    #[test]
    fn precondition_errors_read_as_guidance() {
        assert_eq!(
            describe_stylist_error(&StylistError::NoSuggestion(2)),
            "There is no suggestion #3. Use /suggest to get fresh ideas."
        );
    }
}
