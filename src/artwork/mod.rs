use reqwest::Client;
use std::sync::Arc;
use tracing::debug;

use crate::models::Artwork;

#[derive(Debug, thiserror::Error)]
pub enum ArtworkError {
    #[error("artwork download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("artwork decode failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("artwork decode task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Turns downloaded bytes into a displayable bitmap.
pub trait ArtworkDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<image::RgbaImage, ArtworkError>;
}

/// Decodes PNG and JPEG covers with the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageDecoder;

impl ArtworkDecoder for ImageDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<image::RgbaImage, ArtworkError> {
        Ok(image::load_from_memory(bytes)?.to_rgba8())
    }
}

#[derive(Clone)]
pub struct ArtworkFetcher {
    http: Client,
    decoder: Arc<dyn ArtworkDecoder>,
}

impl ArtworkFetcher {
    pub fn new(http: Client) -> Self {
        Self::with_decoder(http, Arc::new(ImageDecoder))
    }

    pub fn with_decoder(http: Client, decoder: Arc<dyn ArtworkDecoder>) -> Self {
        Self { http, decoder }
    }

    /// Downloads and decodes `url`. Failures yield `None` and are never retried.
    pub async fn fetch(&self, url: &str) -> Option<Artwork> {
        match self.try_fetch(url).await {
            Ok(artwork) => Some(artwork),
            Err(e) => {
                debug!("No artwork for {url}: {e}");
                None
            }
        }
    }

    async fn try_fetch(&self, url: &str) -> Result<Artwork, ArtworkError> {
        let bytes = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let decoder = Arc::clone(&self.decoder);
        let image = tokio::task::spawn_blocking(move || decoder.decode(&bytes)).await??;

        Ok(Artwork {
            url: url.to_string(),
            image: Arc::new(image),
        })
    }
}
