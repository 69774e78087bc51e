use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::DESCRIBE_CLOTHING_PROMPT;
use crate::llm::{ChatModel, ChatRequest};
use crate::stylist::types::{ClothingDescription, DescriptionOutcome, Gender, ItemType};

pub fn fallback_description(item_type: ItemType) -> &'static str {
    match item_type {
        ItemType::Top => "a plain long-sleeve cotton shirt",
        ItemType::Bottom => "a short black pleated skirt",
        ItemType::Shoes => "a pair of white low-top sneakers",
        ItemType::Jacket => "a simple light denim jacket",
    }
}

pub fn infer_gender(item_type: ItemType, text: &str) -> Gender {
    let applies = matches!(item_type, ItemType::Bottom | ItemType::Jacket);
    if applies && text.to_lowercase().contains("skirt") {
        Gender::Female
    } else {
        Gender::Unisex
    }
}

/// Turns one garment photo into a one-sentence description.
#[derive(Clone)]
pub struct VisionDescriber {
    model: Arc<dyn ChatModel>,
    model_name: String,
    max_tokens: u32,
}

impl VisionDescriber {
    pub fn new(model: Arc<dyn ChatModel>, model_name: &str, max_tokens: u32) -> Self {
        VisionDescriber {
            model,
            model_name: model_name.to_string(),
            max_tokens,
        }
    }

    /// Never fails: read or model errors yield the fixed per-item fallback.
    pub async fn describe(&self, image_path: &Path, item_type: ItemType) -> DescriptionOutcome {
        match self.request_description(image_path, item_type).await {
            Ok(text) => {
                info!("{} description: {}", item_type.label(), text);
                DescriptionOutcome::Described(ClothingDescription {
                    item_type,
                    inferred_gender: infer_gender(item_type, &text),
                    text,
                })
            }
            Err(reason) => {
                warn!("Vision description failed for {}: {}", item_type, reason);
                DescriptionOutcome::Fallback {
                    description: ClothingDescription {
                        item_type,
                        text: fallback_description(item_type).to_string(),
                        inferred_gender: Gender::Unisex,
                    },
                    reason,
                }
            }
        }
    }

    async fn request_description(
        &self,
        image_path: &Path,
        item_type: ItemType,
    ) -> Result<String, String> {
        let bytes = tokio::fs::read(image_path)
            .await
            .map_err(|err| format!("failed to read {}: {}", image_path.display(), err))?;

        let request = ChatRequest {
            model: self.model_name.clone(),
            operation: format!("describe:{}", item_type),
            text: DESCRIBE_CLOTHING_PROMPT.to_string(),
            images: vec![bytes],
            max_tokens: self.max_tokens,
        };
        let text = self
            .model
            .complete(&request)
            .await
            .map_err(|err| err.to_string())?;
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::llm::ChatError;

    struct ScriptedModel {
        reply: Result<String, ()>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, request: &ChatRequest) -> Result<String, ChatError> {
            self.requests.lock().push(request.clone());
            self.reply
                .clone()
                .map_err(|_| ChatError::Transport("connection refused".to_string()))
        }
    }

    fn describer(reply: Result<&str, ()>) -> (VisionDescriber, Arc<ScriptedModel>) {
        let model = Arc::new(ScriptedModel {
            reply: reply.map(|text| text.to_string()),
            requests: Mutex::new(Vec::new()),
        });
        (VisionDescriber::new(model.clone(), "gpt-test", 150), model)
    }

    fn garment_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'])
            .unwrap();
        file
    }

    #[test]
    fn skirt_implies_female_only_for_bottoms_and_jackets() {
        assert_eq!(infer_gender(ItemType::Bottom, "A pleated SKIRT"), Gender::Female);
        assert_eq!(infer_gender(ItemType::Jacket, "skirted peplum jacket"), Gender::Female);
        assert_eq!(infer_gender(ItemType::Top, "a skirt-length tunic"), Gender::Unisex);
        assert_eq!(infer_gender(ItemType::Shoes, "skirt-matching flats"), Gender::Unisex);
        assert_eq!(infer_gender(ItemType::Bottom, "slim denim jeans"), Gender::Unisex);
    }

    #[tokio::test]
    async fn network_failure_yields_fallback_for_every_item() {
        let file = garment_file();
        let (describer, _) = describer(Err(()));
        for item_type in [ItemType::Top, ItemType::Bottom, ItemType::Shoes, ItemType::Jacket] {
            let outcome = describer.describe(file.path(), item_type).await;
            assert!(outcome.is_fallback());
            let description = outcome.description();
            assert_eq!(description.text, fallback_description(item_type));
            assert_eq!(description.inferred_gender, Gender::Unisex);
        }
    }

    #[tokio::test]
    async fn unreadable_file_yields_fallback_without_calling_the_model() {
        let (describer, model) = describer(Ok("unused"));
        let outcome = describer
            .describe(Path::new("/nonexistent/outfit/top.jpg"), ItemType::Top)
            .await;
        assert!(outcome.is_fallback());
        assert!(model.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn success_trims_text_and_infers_gender() {
        let file = garment_file();
        let (describer, model) = describer(Ok("  A black satin midi skirt with a side slit. "));
        let outcome = describer.describe(file.path(), ItemType::Bottom).await;

        assert!(!outcome.is_fallback());
        let description = outcome.into_description();
        assert_eq!(description.text, "A black satin midi skirt with a side slit.");
        assert_eq!(description.inferred_gender, Gender::Female);

        let requests = model.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].images.len(), 1);
        assert_eq!(requests[0].max_tokens, 150);
        assert_eq!(requests[0].text, DESCRIBE_CLOTHING_PROMPT);
    }
}
