use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use dotenvy::dotenv;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info};

mod config;
mod handlers;
mod llm;
mod render;
mod state;
mod stylist;
mod utils;

use config::Config;
use handlers::commands::TRY_CALLBACK_PREFIX;
use handlers::{commands, uploads};
use llm::{OpenAiClient, ReplicateClient};
use render::{run_render, RenderArgs};
use state::AppState;
use stylist::{OutfitImages, Stylist};
use utils::logging::init_logging;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum Command {
    Start,
    Help,
    Generate,
    Suggest,
    Try(String),
    Tryall,
    Status,
    Reset,
}

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

fn render_usage() -> &'static str {
    "Usage: cargo run -- render --top <path> --bottom <path> --shoes <path> [--jacket <path>] [--out <path>] [--suggest] [--try <n>] [--try-all]"
}

fn parse_render_args(args: &[String]) -> anyhow::Result<Option<RenderArgs>> {
    if args.get(1).map(|value| value.as_str()) != Some("render") {
        return Ok(None);
    }

    let mut top: Option<PathBuf> = None;
    let mut bottom: Option<PathBuf> = None;
    let mut shoes: Option<PathBuf> = None;
    let mut jacket: Option<PathBuf> = None;
    let mut out = PathBuf::from("outfit.png");
    let mut suggest = false;
    let mut try_index = None;
    let mut try_all = false;

    let mut index = 2;
    while index < args.len() {
        let flag = args[index].as_str();
        let mut value = || {
            index += 1;
            args.get(index)
                .cloned()
                .ok_or_else(|| anyhow!("Missing value for {flag}"))
        };
        match flag {
            "--top" => top = Some(PathBuf::from(value()?)),
            "--bottom" => bottom = Some(PathBuf::from(value()?)),
            "--shoes" => shoes = Some(PathBuf::from(value()?)),
            "--jacket" => jacket = Some(PathBuf::from(value()?)),
            "--out" => out = PathBuf::from(value()?),
            "--suggest" => suggest = true,
            "--try" => {
                let raw = value()?;
                let number = raw
                    .parse::<usize>()
                    .ok()
                    .filter(|number| *number >= 1)
                    .ok_or_else(|| anyhow!("Invalid --try value: {raw}"))?;
                try_index = Some(number - 1);
            }
            "--try-all" => try_all = true,
            "--help" | "-h" => return Err(anyhow!(render_usage())),
            other => {
                return Err(anyhow!(
                    "Unknown render argument: {other}\n{}",
                    render_usage()
                ));
            }
        }
        index += 1;
    }

    Ok(Some(RenderArgs {
        images: OutfitImages {
            top: top.ok_or_else(|| anyhow!("--top is required"))?,
            bottom: bottom.ok_or_else(|| anyhow!("--bottom is required"))?,
            shoes: shoes.ok_or_else(|| anyhow!("--shoes is required"))?,
            jacket,
        },
        out,
        suggest,
        try_index,
        try_all,
    }))
}

fn build_stylist(config: &Config) -> Stylist {
    Stylist::from_config(
        config,
        Arc::new(OpenAiClient::from_config(config)),
        Arc::new(ReplicateClient::from_config(config)),
    )
}

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();

    // Both API credentials are checked before anything else starts.
    let config = match Config::load() {
        Ok(config) => Arc::new(config),
        Err(err) => {
            eprintln!("Refusing to start: {err}");
            return Err(err.into());
        }
    };
    let _guards = init_logging(&config.log_level);
    let stylist = build_stylist(&config);

    let args: Vec<String> = std::env::args().collect();
    if let Some(render_args) = parse_render_args(&args)? {
        let summary = run_render(&stylist, render_args).await?;
        info!(
            "Render summary: renders={} fallbacks={} suggestions={} written={:?} seed={:?}",
            summary.renders,
            summary.fallback_items,
            summary.suggestions.len(),
            summary.written,
            summary.written_seed
        );
        for line in &summary.descriptions {
            info!("{line}");
        }
        return Ok(());
    }

    if config.bot_token.is_empty() {
        return Err("BOT_TOKEN is required unless running render".into());
    }

    let bot = Bot::new(config.bot_token.clone());
    info!("Starting Outfit Stylist bot");
    let state = AppState::new(config, stylist);

    let command_handler = dptree::entry()
        .filter_command::<Command>()
        .endpoint(handle_command);

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(
            dptree::filter(|msg: Message| msg.photo().is_some() || msg.document().is_some())
                .endpoint(handle_photo),
        )
        .endpoint(ignore_message);

    let callback_handler = Update::filter_callback_query().endpoint(handle_callback_query);

    let handler = dptree::entry()
        .branch(message_handler)
        .branch(callback_handler);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_command(
    bot: Bot,
    state: AppState,
    message: Message,
    command: Command,
) -> HandlerResult {
    fn optional_arg(arg: String) -> Option<String> {
        if arg.trim().is_empty() {
            None
        } else {
            Some(arg)
        }
    }

    match command {
        Command::Start => commands::start_handler(bot, message).await?,
        Command::Help => commands::help_handler(bot, message).await?,
        Command::Status => commands::status_handler(bot, state, message).await?,
        Command::Reset => commands::reset_handler(bot, state, message).await?,
        Command::Generate => {
            tokio::spawn(async move {
                if let Err(err) = commands::generate_handler(bot, state, message).await {
                    error!("generate handler failed: {err}");
                }
            });
        }
        Command::Suggest => {
            tokio::spawn(async move {
                if let Err(err) = commands::suggest_handler(bot, state, message).await {
                    error!("suggest handler failed: {err}");
                }
            });
        }
        Command::Try(arg) => {
            let arg = optional_arg(arg);
            tokio::spawn(async move {
                if let Err(err) = commands::try_handler(bot, state, message, arg).await {
                    error!("try handler failed: {err}");
                }
            });
        }
        Command::Tryall => {
            tokio::spawn(async move {
                if let Err(err) = commands::tryall_handler(bot, state, message).await {
                    error!("tryall handler failed: {err}");
                }
            });
        }
    }
    Ok(())
}

async fn handle_callback_query(bot: Bot, state: AppState, query: CallbackQuery) -> HandlerResult {
    let Some(data) = query.data.as_deref() else {
        return Ok(());
    };
    if data.starts_with(TRY_CALLBACK_PREFIX) {
        tokio::spawn(async move {
            if let Err(err) = commands::try_selection_callback(bot, state, query).await {
                error!("try selection callback failed: {err}");
            }
        });
    }
    Ok(())
}

async fn handle_photo(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    tokio::spawn(async move {
        if let Err(err) = uploads::photo_handler(bot, state, message).await {
            error!("photo handler failed: {err}");
        }
    });
    Ok(())
}

async fn ignore_message(_message: Message) -> HandlerResult {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        std::iter::once("outfit_stylist_bot")
            .chain(items.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn non_render_invocations_are_ignored() {
        assert!(parse_render_args(&argv(&[])).unwrap().is_none());
        assert!(parse_render_args(&argv(&["serve"])).unwrap().is_none());
    }

    #[test]
    fn render_args_parse_with_optional_jacket() {
        let parsed = parse_render_args(&argv(&[
            "render", "--top", "t.jpg", "--bottom", "b.jpg", "--shoes", "s.jpg", "--try", "2",
            "--out", "out/look.png",
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(parsed.images.top, PathBuf::from("t.jpg"));
        assert_eq!(parsed.images.jacket, None);
        assert_eq!(parsed.try_index, Some(1));
        assert_eq!(parsed.out, PathBuf::from("out/look.png"));
        assert!(!parsed.try_all);
    }

    #[test]
    fn render_requires_the_three_base_items() {
        let err = parse_render_args(&argv(&["render", "--top", "t.jpg", "--bottom", "b.jpg"]))
            .unwrap_err();
        assert!(err.to_string().contains("--shoes is required"));
    }

    #[test]
    fn render_rejects_zero_try_index() {
        assert!(parse_render_args(&argv(&[
            "render", "--top", "t", "--bottom", "b", "--shoes", "s", "--try", "0"
        ]))
        .is_err());
    }
}
