use std::time::Duration;

use tracing::{error, warn};

use crate::llm::openai::truncate_for_log;
use crate::utils::http::get_http_client;

const DOWNLOAD_ERROR_BODY_LIMIT: usize = 800;

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/heic" => "heic",
        _ => "jpg",
    }
}

/// Single-attempt download. Any failure, including a non-2xx status, is `None`.
pub async fn download_image(url: &str, timeout: Duration) -> Option<Vec<u8>> {
    let response = match get_http_client().get(url).timeout(timeout).send().await {
        Ok(resp) => resp,
        Err(err) => {
            warn!(
                "Failed to fetch image {url}: {err} (timeout={}, connect={})",
                err.is_timeout(),
                err.is_connect()
            );
            return None;
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!(
            "Image download failed for {url} with status {}: {}",
            status,
            truncate_for_log(&body, DOWNLOAD_ERROR_BODY_LIMIT)
        );
        return None;
    }

    match response.bytes().await {
        Ok(bytes) => Some(bytes.to_vec()),
        Err(err) => {
            error!("Failed to read image bytes {url}: {err}");
            None
        }
    }
}
