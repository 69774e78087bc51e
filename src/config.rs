use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    MissingCredential(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub replicate_api_token: String,
    pub bot_token: String,
    pub log_level: String,
    pub openai_base_url: String,
    pub vision_model: String,
    pub suggestion_model: String,
    pub describe_max_tokens: u32,
    pub suggestion_max_tokens: u32,
    pub llm_timeout_seconds: u64,
    pub replicate_base_url: String,
    pub image_model: String,
    pub image_aspect_ratio: String,
    pub image_steps: u32,
    pub synthesis_timeout_seconds: u64,
    pub synthesis_poll_interval_ms: u64,
    pub image_download_timeout_seconds: u64,
    pub upload_dir: PathBuf,
}

fn lookup_string<F>(lookup: &F, name: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).unwrap_or_else(|| default.to_string())
}

fn lookup_u32<F>(lookup: &F, name: &str, default: u32) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn lookup_u64<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn require_credential<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name).unwrap_or_default();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::MissingCredential(name));
    }
    Ok(trimmed.to_string())
}

fn normalize_aspect_ratio(value: String) -> String {
    let trimmed = value.trim();
    let valid = trimmed
        .split_once(':')
        .map(|(w, h)| {
            w.parse::<u32>().map(|w| w > 0).unwrap_or(false)
                && h.parse::<u32>().map(|h| h > 0).unwrap_or(false)
        })
        .unwrap_or(false);
    if valid {
        return trimmed.to_string();
    }
    warn!(
        "Unknown IMAGE_ASPECT_RATIO value '{}'; defaulting to 2:3.",
        value
    );
    "2:3".to_string()
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let openai_api_key = require_credential(&lookup, "OPENAI_API_KEY")?;
        let replicate_api_token = require_credential(&lookup, "REPLICATE_API_TOKEN")?;

        Ok(Config {
            openai_api_key,
            replicate_api_token,
            bot_token: lookup_string(&lookup, "BOT_TOKEN", "").trim().to_string(),
            log_level: lookup_string(&lookup, "LOG_LEVEL", "info").to_lowercase(),
            openai_base_url: lookup_string(&lookup, "OPENAI_BASE_URL", "https://api.openai.com/v1"),
            vision_model: lookup_string(&lookup, "VISION_MODEL", "gpt-4-turbo-2024-04-09"),
            suggestion_model: lookup_string(&lookup, "SUGGESTION_MODEL", "gpt-4-turbo-2024-04-09"),
            describe_max_tokens: lookup_u32(&lookup, "DESCRIBE_MAX_TOKENS", 150),
            suggestion_max_tokens: lookup_u32(&lookup, "SUGGESTION_MAX_TOKENS", 300),
            llm_timeout_seconds: lookup_u64(&lookup, "LLM_TIMEOUT_SECONDS", 60).max(1),
            replicate_base_url: lookup_string(
                &lookup,
                "REPLICATE_BASE_URL",
                "https://api.replicate.com/v1",
            ),
            image_model: lookup_string(&lookup, "IMAGE_MODEL", "ideogram-ai/ideogram-v3-turbo"),
            image_aspect_ratio: normalize_aspect_ratio(lookup_string(
                &lookup,
                "IMAGE_ASPECT_RATIO",
                "2:3",
            )),
            image_steps: lookup_u32(&lookup, "IMAGE_STEPS", 60).max(1),
            synthesis_timeout_seconds: lookup_u64(&lookup, "SYNTHESIS_TIMEOUT_SECONDS", 180).max(1),
            synthesis_poll_interval_ms: lookup_u64(&lookup, "SYNTHESIS_POLL_INTERVAL_MS", 1000)
                .max(50),
            image_download_timeout_seconds: lookup_u64(
                &lookup,
                "IMAGE_DOWNLOAD_TIMEOUT_SECONDS",
                30,
            )
            .max(1),
            upload_dir: PathBuf::from(lookup_string(&lookup, "UPLOAD_DIR", "uploads")),
        })
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_seconds)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_timeout_seconds)
    }

    pub fn synthesis_poll_interval(&self) -> Duration {
        Duration::from_millis(self.synthesis_poll_interval_ms)
    }

    pub fn image_download_timeout(&self) -> Duration {
        Duration::from_secs(self.image_download_timeout_seconds)
    }
}

pub const IDENTITY_PROMPT: &str = "A full-body editorial photo of a young Japanese woman in a Tokyo apartment, standing facing the camera naturally with relaxed posture. Neutral expression, realistic skin tone, long straight hair. iPhone 15 Pro photo with ISO 800, 85mm lens, f/1.8, shallow depth of field. Soft natural light from window, subtle film grain. White backdrop with soft shadow and texture. Full-body visible, including shoes. No cropping.";

pub const NEGATIVE_PROMPT: &str = "cartoon, surreal, painterly, extra clothing, floating accessories, cropped feet, altered face, misshaped limbs, logos, abstract";

pub const DESCRIBE_CLOTHING_PROMPT: &str = "Describe this clothing item in 1 sentence with precision: fabric, color, cut, collar/sleeve/hem, logos, and fit. Don't guess use cases.";

pub const STYLE_SUGGESTION_PROMPT: &str = "Top: {top}\nBottom: {bottom}\nShoes: {shoes}\nSuggest 3 realistic styling additions (e.g., add belt, earrings, jacket) to improve the look without changing the items.";

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn loads_defaults_when_credentials_are_present() {
        let config = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("REPLICATE_API_TOKEN", "r8-test"),
        ]))
        .unwrap();

        assert_eq!(config.vision_model, "gpt-4-turbo-2024-04-09");
        assert_eq!(config.image_model, "ideogram-ai/ideogram-v3-turbo");
        assert_eq!(config.image_aspect_ratio, "2:3");
        assert_eq!(config.image_steps, 60);
        assert_eq!(config.describe_max_tokens, 150);
        assert_eq!(config.suggestion_max_tokens, 300);
        assert_eq!(config.image_download_timeout(), Duration::from_secs(30));
        assert!(config.bot_token.is_empty());
    }

    #[test]
    fn rejects_missing_openai_key() {
        let err = Config::from_lookup(lookup_from(&[("REPLICATE_API_TOKEN", "r8-test")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential("OPENAI_API_KEY")));
    }

    #[test]
    fn rejects_blank_replicate_token() {
        let err = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("REPLICATE_API_TOKEN", "   "),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingCredential("REPLICATE_API_TOKEN")
        ));
    }

    #[test]
    fn invalid_aspect_ratio_falls_back() {
        let config = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("REPLICATE_API_TOKEN", "r8-test"),
            ("IMAGE_ASPECT_RATIO", "tall"),
        ]))
        .unwrap();
        assert_eq!(config.image_aspect_ratio, "2:3");
    }
}
