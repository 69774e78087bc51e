use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use crate::stylist::{GeneratedImage, OutfitImages, SessionState, Stylist};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderArgs {
    pub images: OutfitImages,
    pub out: PathBuf,
    pub suggest: bool,
    /// 0-based suggestion to apply after generation.
    pub try_index: Option<usize>,
    pub try_all: bool,
}

impl RenderArgs {
    fn wants_suggestions(&self) -> bool {
        self.suggest || self.try_index.is_some() || self.try_all
    }
}

#[derive(Debug, Default)]
pub struct RenderSummary {
    pub descriptions: Vec<String>,
    pub fallback_items: usize,
    pub suggestions: Vec<String>,
    pub renders: usize,
    /// Seed of the image that was written, if any.
    pub written_seed: Option<u64>,
    pub written: Option<PathBuf>,
}

fn check_inputs(images: &OutfitImages) -> Result<()> {
    for (item_type, path) in images.iter() {
        if !path.is_file() {
            return Err(anyhow!("{} image not found: {}", item_type, path.display()));
        }
    }
    Ok(())
}

/// A render that could not be downloaded leaves the previous image in place.
fn keep_latest(latest: &mut Option<GeneratedImage>, image: Option<GeneratedImage>) {
    match image {
        Some(image) => *latest = Some(image),
        None => warn!("Outfit image could not be downloaded; keeping the previous one"),
    }
}

/// Runs one session end to end and writes the last image produced.
pub async fn run_render(stylist: &Stylist, args: RenderArgs) -> Result<RenderSummary> {
    check_inputs(&args.images)?;
    let mut session = SessionState::new();
    let mut summary = RenderSummary::default();
    let mut latest = None;

    let report = stylist.generate(&mut session, args.images.clone()).await?;
    summary.renders += 1;
    summary.fallback_items = report.fallback_items().len();
    summary.descriptions = report
        .outcomes
        .iter()
        .map(|outcome| {
            let description = outcome.description();
            format!("{}: {}", description.item_type.label(), description.text)
        })
        .collect();
    keep_latest(&mut latest, report.image);

    if args.wants_suggestions() {
        summary.suggestions = stylist.refresh_suggestions(&mut session).await?;
        for (index, suggestion) in summary.suggestions.iter().enumerate() {
            info!("Suggestion {}: {}", index + 1, suggestion);
        }
    }

    if let Some(index) = args.try_index {
        let image = stylist.apply_suggestion(&mut session, index).await?;
        summary.renders += 1;
        keep_latest(&mut latest, image);
    }
    if args.try_all {
        let image = stylist.apply_all_suggestions(&mut session).await?;
        summary.renders += 1;
        keep_latest(&mut latest, image);
    }

    if let Some(image) = latest {
        if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        image
            .bitmap
            .save(&args.out)
            .with_context(|| format!("failed to write {}", args.out.display()))?;
        info!("Wrote outfit image to {}", args.out.display());
        summary.written_seed = Some(image.seed);
        summary.written = Some(args.out.clone());
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    use super::*;
    use crate::llm::{ChatError, ChatModel, ChatRequest, ImageBackend, SynthesisError, SynthesisRequest};
    use crate::stylist::describer::VisionDescriber;
    use crate::stylist::suggestions::SuggestionEngine;
    use crate::stylist::synthesizer::tests::tiny_png;
    use crate::stylist::synthesizer::ImageSynthesizer;

    struct Unreachable;

    #[async_trait]
    impl ChatModel for Unreachable {
        async fn complete(&self, _: &ChatRequest) -> Result<String, ChatError> {
            panic!("chat model must not be called");
        }
    }

    #[async_trait]
    impl ImageBackend for Unreachable {
        async fn render(&self, _: &SynthesisRequest) -> Result<Option<Vec<u8>>, SynthesisError> {
            panic!("image backend must not be called");
        }
    }

    struct CannedChat;

    #[async_trait]
    impl ChatModel for CannedChat {
        async fn complete(&self, request: &ChatRequest) -> Result<String, ChatError> {
            if request.operation == "suggest" {
                Ok("- Add a belt\n- Gold earrings".to_string())
            } else {
                Ok("a plain garment".to_string())
            }
        }
    }

    /// Downloads succeed only for the first render.
    struct FirstDownloadOnly {
        seeds: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl ImageBackend for FirstDownloadOnly {
        async fn render(&self, request: &SynthesisRequest) -> Result<Option<Vec<u8>>, SynthesisError> {
            let mut seeds = self.seeds.lock();
            seeds.push(request.seed);
            Ok((seeds.len() == 1).then(tiny_png))
        }
    }

    fn outfit_in(dir: &TempDir) -> OutfitImages {
        let write = |name: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, [0xFFu8, 0xD8, 0xFF, 0xE0]).unwrap();
            path
        };
        OutfitImages {
            top: write("top.jpg"),
            bottom: write("bottom.jpg"),
            shoes: write("shoes.jpg"),
            jacket: None,
        }
    }

    #[tokio::test]
    async fn missing_input_files_are_rejected_before_any_call() {
        let stylist = Stylist::new(
            VisionDescriber::new(Arc::new(Unreachable), "m", 150),
            ImageSynthesizer::new(Arc::new(Unreachable), "2:3", 60),
            SuggestionEngine::new(Arc::new(Unreachable), "m", 300),
        );
        let args = RenderArgs {
            images: OutfitImages {
                top: PathBuf::from("/nonexistent/top.jpg"),
                bottom: PathBuf::from("/nonexistent/bottom.jpg"),
                shoes: PathBuf::from("/nonexistent/shoes.jpg"),
                jacket: None,
            },
            out: PathBuf::from("outfit.png"),
            suggest: false,
            try_index: None,
            try_all: false,
        };

        let err = run_render(&stylist, args).await.unwrap_err();
        assert!(err.to_string().contains("top image not found"));
    }

    #[tokio::test]
    async fn failed_download_keeps_the_previous_image() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FirstDownloadOnly {
            seeds: Mutex::new(Vec::new()),
        });
        let stylist = Stylist::new(
            VisionDescriber::new(Arc::new(CannedChat), "m", 150),
            ImageSynthesizer::new(backend.clone(), "2:3", 60),
            SuggestionEngine::new(Arc::new(CannedChat), "m", 300),
        );
        let out = dir.path().join("out/look.png");
        let args = RenderArgs {
            images: outfit_in(&dir),
            out: out.clone(),
            suggest: false,
            try_index: Some(1),
            try_all: false,
        };

        let summary = run_render(&stylist, args).await.unwrap();

        let seeds = backend.seeds.lock().clone();
        assert_eq!(seeds.len(), 2);
        assert_eq!(summary.renders, 2);
        assert_eq!(summary.suggestions, vec!["Add a belt", "Gold earrings"]);
        assert_eq!(summary.written_seed, Some(seeds[0]));
        assert_eq!(summary.written, Some(out.clone()));
        assert!(out.is_file());
    }
}
