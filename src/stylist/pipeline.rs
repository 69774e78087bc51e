use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::llm::{ChatModel, ImageBackend, SynthesisError};
use crate::stylist::composer::{
    all_suggestions_appendix, append_suggestion, compose_outfit, single_suggestion_appendix,
};
use crate::stylist::describer::VisionDescriber;
use crate::stylist::session::{OutfitRecord, SessionState};
use crate::stylist::suggestions::SuggestionEngine;
use crate::stylist::synthesizer::ImageSynthesizer;
use crate::stylist::types::{
    DescriptionOutcome, GeneratedImage, ItemType, OutfitDescriptions, OutfitImages,
};

#[derive(Debug, thiserror::Error)]
pub enum StylistError {
    #[error("no outfit has been generated yet")]
    NoOutfit,
    #[error("there is no suggestion #{}", .0 + 1)]
    NoSuggestion(usize),
    #[error("there are no suggestions to apply")]
    NoSuggestions,
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}

/// What a fresh generation produced.
#[derive(Debug)]
pub struct GenerationReport {
    pub outcomes: Vec<DescriptionOutcome>,
    pub image: Option<GeneratedImage>,
}

impl GenerationReport {
    pub fn fallback_items(&self) -> Vec<ItemType> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.is_fallback())
            .map(|outcome| outcome.description().item_type)
            .collect()
    }
}

/// The command interface driven by every frontend.
#[derive(Clone)]
pub struct Stylist {
    describer: VisionDescriber,
    synthesizer: ImageSynthesizer,
    suggestions: SuggestionEngine,
}

impl Stylist {
    pub fn new(
        describer: VisionDescriber,
        synthesizer: ImageSynthesizer,
        suggestions: SuggestionEngine,
    ) -> Self {
        Stylist {
            describer,
            synthesizer,
            suggestions,
        }
    }

    pub fn from_config(
        config: &Config,
        chat: Arc<dyn ChatModel>,
        images: Arc<dyn ImageBackend>,
    ) -> Self {
        Stylist::new(
            VisionDescriber::new(
                chat.clone(),
                &config.vision_model,
                config.describe_max_tokens,
            ),
            ImageSynthesizer::new(images, &config.image_aspect_ratio, config.image_steps),
            SuggestionEngine::new(chat, &config.suggestion_model, config.suggestion_max_tokens),
        )
    }

    /// Describes every garment, replaces the stored outfit and renders it.
    pub async fn generate(
        &self,
        session: &mut SessionState,
        images: OutfitImages,
    ) -> Result<GenerationReport, StylistError> {
        let top = self.describer.describe(&images.top, ItemType::Top).await;
        let bottom = self.describer.describe(&images.bottom, ItemType::Bottom).await;
        let shoes = self.describer.describe(&images.shoes, ItemType::Shoes).await;
        let jacket = match &images.jacket {
            Some(path) => Some(self.describer.describe(path, ItemType::Jacket).await),
            None => None,
        };

        let mut outcomes = vec![top.clone(), bottom.clone(), shoes.clone()];
        outcomes.extend(jacket.clone());

        let descriptions = OutfitDescriptions {
            top: top.into_description(),
            bottom: bottom.into_description(),
            shoes: shoes.into_description(),
            jacket: jacket.map(DescriptionOutcome::into_description),
        };
        let base_prompt = compose_outfit(&descriptions);
        let inferred_gender = descriptions.inferred_gender();
        info!(
            "Composed base outfit prompt (inferred gender: {})",
            inferred_gender.as_str()
        );

        session.outfit = Some(OutfitRecord {
            images,
            inferred_gender,
            descriptions,
            base_prompt: base_prompt.clone(),
        });
        session.suggestions.clear();
        session.applied_extras.clear();

        let image = self.render(&base_prompt).await?;
        Ok(GenerationReport { outcomes, image })
    }

    /// Replaces the suggestion list; a failed request clears it.
    pub async fn refresh_suggestions(
        &self,
        session: &mut SessionState,
    ) -> Result<Vec<String>, StylistError> {
        let outfit = session.outfit.as_ref().ok_or(StylistError::NoOutfit)?;
        let descriptions = &outfit.descriptions;
        let suggestions = self
            .suggestions
            .suggest(
                &descriptions.top.text,
                &descriptions.bottom.text,
                &descriptions.shoes.text,
            )
            .await;
        session.suggestions = suggestions.clone();
        Ok(suggestions)
    }

    /// Renders the stored outfit plus suggestion `index` (0-based).
    pub async fn apply_suggestion(
        &self,
        session: &mut SessionState,
        index: usize,
    ) -> Result<Option<GeneratedImage>, StylistError> {
        let outfit = session.outfit.as_ref().ok_or(StylistError::NoOutfit)?;
        let suggestion = session
            .suggestion(index)
            .ok_or(StylistError::NoSuggestion(index))?;
        let prompt = append_suggestion(
            &outfit.base_prompt,
            &single_suggestion_appendix(suggestion),
        );
        info!("Applying suggestion #{}: {}", index + 1, suggestion);
        self.render(&prompt).await
    }

    /// Renders the stored outfit with every current suggestion.
    pub async fn apply_all_suggestions(
        &self,
        session: &mut SessionState,
    ) -> Result<Option<GeneratedImage>, StylistError> {
        let outfit = session.outfit.as_ref().ok_or(StylistError::NoOutfit)?;
        if session.suggestions.is_empty() {
            return Err(StylistError::NoSuggestions);
        }
        let prompt = append_suggestion(
            &outfit.base_prompt,
            &all_suggestions_appendix(&session.suggestions),
        );
        session.applied_extras = session.suggestions.clone();
        info!("Applying all {} suggestions", session.suggestions.len());
        self.render(&prompt).await
    }

    /// The image goes straight back to the caller; sessions never hold it.
    async fn render(&self, prompt: &str) -> Result<Option<GeneratedImage>, StylistError> {
        Ok(self.synthesizer.synthesize(prompt).await?)
    }
}
