use std::ops::RangeInclusive;
use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use crate::config::NEGATIVE_PROMPT;
use crate::llm::{ImageBackend, SynthesisError, SynthesisRequest};
use crate::stylist::types::GeneratedImage;

pub const SEED_RANGE: RangeInclusive<u64> = 100_000..=9_999_999;

pub fn random_seed() -> u64 {
    rand::rng().random_range(SEED_RANGE)
}

/// Sends prompts to the image backend and decodes what comes back.
#[derive(Clone)]
pub struct ImageSynthesizer {
    backend: Arc<dyn ImageBackend>,
    aspect_ratio: String,
    steps: u32,
}

impl ImageSynthesizer {
    pub fn new(backend: Arc<dyn ImageBackend>, aspect_ratio: &str, steps: u32) -> Self {
        ImageSynthesizer {
            backend,
            aspect_ratio: aspect_ratio.to_string(),
            steps,
        }
    }

    pub fn build_request(&self, prompt: &str) -> SynthesisRequest {
        SynthesisRequest {
            prompt: prompt.to_string(),
            negative_prompt: NEGATIVE_PROMPT.to_string(),
            aspect_ratio: self.aspect_ratio.clone(),
            steps: self.steps,
            seed: random_seed(),
        }
    }

    /// `Ok(None)` when the image could not be downloaded or decoded;
    /// service failures are returned as errors.
    pub async fn synthesize(&self, prompt: &str) -> Result<Option<GeneratedImage>, SynthesisError> {
        let request = self.build_request(prompt);
        info!("Synthesizing outfit image (seed={}):\n{}", request.seed, prompt);

        let Some(bytes) = self.backend.render(&request).await? else {
            warn!("Image synthesis produced no downloadable image");
            return Ok(None);
        };

        match image::load_from_memory(&bytes) {
            Ok(bitmap) => {
                info!(
                    "Decoded generated image {}x{} ({} bytes)",
                    bitmap.width(),
                    bitmap.height(),
                    bytes.len()
                );
                Ok(Some(GeneratedImage {
                    bytes,
                    bitmap,
                    seed: request.seed,
                }))
            }
            Err(err) => {
                warn!("Generated image could not be decoded: {}", err);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;

    use async_trait::async_trait;
    use image::{ImageFormat, Rgb, RgbImage};
    use parking_lot::Mutex;

    use super::*;

    pub(crate) fn tiny_png() -> Vec<u8> {
        let image = RgbImage::from_pixel(2, 3, Rgb([200, 180, 160]));
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    struct FixedBackend {
        reply: Option<Vec<u8>>,
        requests: Mutex<Vec<SynthesisRequest>>,
    }

    #[async_trait]
    impl ImageBackend for FixedBackend {
        async fn render(&self, request: &SynthesisRequest) -> Result<Option<Vec<u8>>, SynthesisError> {
            self.requests.lock().push(request.clone());
            Ok(self.reply.clone())
        }
    }

    fn synthesizer(reply: Option<Vec<u8>>) -> (ImageSynthesizer, Arc<FixedBackend>) {
        let backend = Arc::new(FixedBackend {
            reply,
            requests: Mutex::new(Vec::new()),
        });
        (ImageSynthesizer::new(backend.clone(), "2:3", 60), backend)
    }

    #[test]
    fn seeds_stay_in_range() {
        for _ in 0..1000 {
            assert!(SEED_RANGE.contains(&random_seed()));
        }
    }

    #[tokio::test]
    async fn request_carries_fixed_generation_parameters() {
        let (synthesizer, backend) = synthesizer(Some(tiny_png()));
        let image = synthesizer.synthesize("a prompt").await.unwrap().unwrap();
        assert_eq!((image.bitmap.width(), image.bitmap.height()), (2, 3));

        let requests = backend.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].prompt, "a prompt");
        assert_eq!(requests[0].negative_prompt, NEGATIVE_PROMPT);
        assert_eq!(requests[0].aspect_ratio, "2:3");
        assert_eq!(requests[0].steps, 60);
        assert_eq!(requests[0].seed, image.seed);
    }

    #[tokio::test]
    async fn missing_download_is_none() {
        let (synthesizer, _) = synthesizer(None);
        assert!(synthesizer.synthesize("a prompt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn undecodable_bytes_are_none() {
        let (synthesizer, _) = synthesizer(Some(b"<html>not an image</html>".to_vec()));
        assert!(synthesizer.synthesize("a prompt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn service_errors_propagate() {
        struct BrokenBackend;

        #[async_trait]
        impl ImageBackend for BrokenBackend {
            async fn render(&self, _: &SynthesisRequest) -> Result<Option<Vec<u8>>, SynthesisError> {
                Err(SynthesisError::Failed("model offline".to_string()))
            }
        }

        let synthesizer = ImageSynthesizer::new(Arc::new(BrokenBackend), "2:3", 60);
        let err = synthesizer.synthesize("a prompt").await.unwrap_err();
        assert!(matches!(err, SynthesisError::Failed(_)));
    }
}
