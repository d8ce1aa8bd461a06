//! Wire models for the HTTP surface.
//!
//! `GET /resolve?url=<page url>` answers with a [`ResolveResponse`]:
//!
//! ```json
//! {
//!   "url": "https://upos-sz-mirror.example.com/ugc/123-1-16.mp4?e=...",
//!   "container_type": "mp4",
//!   "provenance": "primary_api",
//!   "title": "Episode 12",
//!   "duration_secs": 1834,
//!   "strategy": "html5-download",
//!   "headers": {
//!     "Referer": "https://www.bilibili.com/",
//!     "User-Agent": "Mozilla/5.0 ..."
//!   },
//!   "mime_type": "video/mp4"
//! }
//! ```
//!
//! `headers` lists what a proxy must send for the CDN to serve the file.

use serde::{Deserialize, Serialize};

use crate::resolver::ResolvedMedia;

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResolveResponse {
    #[serde(flatten)]
    pub media: ResolvedMedia,
    /// Value for the RSS enclosure `type` attribute
    pub mime_type: String,
}

impl From<ResolvedMedia> for ResolveResponse {
    fn from(media: ResolvedMedia) -> Self {
        let mime_type = media.mime().to_string();
        Self { media, mime_type }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub strategies: usize,
    pub fallback_enabled: bool,
    pub version: String,
}
