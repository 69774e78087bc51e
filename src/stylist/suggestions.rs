use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::config::STYLE_SUGGESTION_PROMPT;
use crate::llm::{ChatModel, ChatRequest};

pub const MAX_SUGGESTIONS: usize = 3;

// "1.", "2)", "3:", "4 " numbering and "-", "*", "•" bullets.
static LIST_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[-*•]+|\d+\s*[.):]|\d+\s)\s*").expect("list marker regex is valid")
});

pub fn build_suggestion_prompt(top: &str, bottom: &str, shoes: &str) -> String {
    STYLE_SUGGESTION_PROMPT
        .replace("{top}", top)
        .replace("{bottom}", bottom)
        .replace("{shoes}", shoes)
}

/// Lines ending in ':' are lead-ins such as "Here are three ideas:" and are skipped.
pub fn parse_suggestions(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| LIST_MARKER.replace(line, "").trim().to_string())
        .filter(|line| !line.ends_with(':'))
        .map(|line| line.trim_end_matches('.').trim().to_string())
        .filter(|line| !line.is_empty())
        .take(MAX_SUGGESTIONS)
        .collect()
}

/// Asks the language model for styling additions to the current outfit.
#[derive(Clone)]
pub struct SuggestionEngine {
    model: Arc<dyn ChatModel>,
    model_name: String,
    max_tokens: u32,
}

impl SuggestionEngine {
    pub fn new(model: Arc<dyn ChatModel>, model_name: &str, max_tokens: u32) -> Self {
        SuggestionEngine {
            model,
            model_name: model_name.to_string(),
            max_tokens,
        }
    }

    /// Up to three suggestions; any failure is an empty list.
    pub async fn suggest(&self, top: &str, bottom: &str, shoes: &str) -> Vec<String> {
        let request = ChatRequest {
            model: self.model_name.clone(),
            operation: "suggest".to_string(),
            text: build_suggestion_prompt(top, bottom, shoes),
            images: Vec::new(),
            max_tokens: self.max_tokens,
        };

        match self.model.complete(&request).await {
            Ok(text) => {
                let suggestions = parse_suggestions(&text);
                info!("Style suggestions: {:?}", suggestions);
                suggestions
            }
            Err(err) => {
                warn!("Suggestion generation failed: {}", err);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::llm::ChatError;

    struct CannedModel(Result<&'static str, u16>);

    #[async_trait]
    impl ChatModel for CannedModel {
        async fn complete(&self, _: &ChatRequest) -> Result<String, ChatError> {
            match self.0 {
                Ok(text) => Ok(text.to_string()),
                Err(status) => Err(ChatError::Status {
                    status,
                    detail: "rate limited".to_string(),
                }),
            }
        }
    }

    fn engine(reply: Result<&'static str, u16>) -> SuggestionEngine {
        SuggestionEngine::new(Arc::new(CannedModel(reply)), "gpt-test", 300)
    }

    #[test]
    fn strips_numbering_and_blank_lines() {
        assert_eq!(
            parse_suggestions("1. Add a belt\n2. Gold earrings\n\n3. Light scarf"),
            vec!["Add a belt", "Gold earrings", "Light scarf"]
        );
    }

    #[test]
    fn strips_bullets_and_truncates_to_three() {
        assert_eq!(
            parse_suggestions("- A tan belt.\n* Hoop earrings\n• A silk scarf\n- A watch"),
            vec!["A tan belt", "Hoop earrings", "A silk scarf"]
        );
    }

    #[test]
    fn two_lines_are_not_padded() {
        assert_eq!(
            parse_suggestions("1) Add a belt\n\n   \n2) Gold earrings"),
            vec!["Add a belt", "Gold earrings"]
        );
    }

    #[test]
    fn lead_in_line_does_not_take_a_slot() {
        assert_eq!(
            parse_suggestions("Here are three ideas:\nAdd a belt\nEarrings\nA tote bag"),
            vec!["Add a belt", "Earrings", "A tote bag"]
        );
    }

    #[test]
    fn prompt_mentions_each_garment() {
        let prompt = build_suggestion_prompt("a tee", "jeans", "loafers");
        assert!(prompt.starts_with("Top: a tee\nBottom: jeans\nShoes: loafers\n"));
        assert!(prompt.contains("Suggest 3 realistic styling additions"));
    }

    #[tokio::test]
    async fn parses_model_reply() {
        let suggestions = engine(Ok("1. Add a belt\n2. Gold earrings\n\n3. Light scarf"))
            .suggest("a", "b", "c")
            .await;
        assert_eq!(suggestions, vec!["Add a belt", "Gold earrings", "Light scarf"]);
    }

    #[tokio::test]
    async fn failure_is_an_empty_list() {
        assert!(engine(Err(429)).suggest("a", "b", "c").await.is_empty());
    }
}
