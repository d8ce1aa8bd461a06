//! Data carried through a resolution: signing material, raw play data and
//! the final [`ResolvedMedia`].

use mime::Mime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Media containers a plain HTTP client can fetch as one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerType {
    Mp4,
    M4v,
    Mov,
    Mkv,
    Webm,
    Flv,
    M4a,
    Mp3,
    Aac,
    Flac,
    Ogg,
    Opus,
    Wav,
}

impl ContainerType {
    /// Match a bare file extension, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let container = match ext.to_ascii_lowercase().as_str() {
            "mp4" => Self::Mp4,
            "m4v" => Self::M4v,
            "mov" => Self::Mov,
            "mkv" => Self::Mkv,
            "webm" => Self::Webm,
            "flv" => Self::Flv,
            "m4a" => Self::M4a,
            "mp3" => Self::Mp3,
            "aac" => Self::Aac,
            "flac" => Self::Flac,
            "ogg" | "oga" => Self::Ogg,
            "opus" => Self::Opus,
            "wav" => Self::Wav,
            _ => return None,
        };
        Some(container)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::M4v => "m4v",
            Self::Mov => "mov",
            Self::Mkv => "mkv",
            Self::Webm => "webm",
            Self::Flv => "flv",
            Self::M4a => "m4a",
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::Flac => "flac",
            Self::Ogg => "ogg",
            Self::Opus => "opus",
            Self::Wav => "wav",
        }
    }

    pub fn is_audio_only(&self) -> bool {
        matches!(
            self,
            Self::M4a | Self::Mp3 | Self::Aac | Self::Flac | Self::Ogg | Self::Opus | Self::Wav
        )
    }

    /// MIME type for the RSS enclosure `type` attribute
    pub fn mime(&self) -> Mime {
        let essence = match self {
            Self::Mp4 | Self::M4v => "video/mp4",
            Self::Mov => "video/quicktime",
            Self::Mkv => "video/x-matroska",
            Self::Webm => "video/webm",
            Self::Flv => "video/x-flv",
            Self::M4a => "audio/mp4",
            Self::Mp3 => "audio/mpeg",
            Self::Aac => "audio/aac",
            Self::Flac => "audio/flac",
            Self::Ogg => "audio/ogg",
            Self::Opus => "audio/opus",
            Self::Wav => "audio/wav",
        };
        essence.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
    }

    /// Ranking used when several candidates share a tier; higher wins.
    pub fn preference(&self) -> u8 {
        match self {
            Self::Mp4 => 100,
            Self::M4a => 100,
            Self::Mp3 => 90,
            Self::Aac => 80,
            Self::M4v => 75,
            Self::Webm => 70,
            Self::Ogg => 60,
            Self::Opus => 55,
            Self::Flv => 50,
            Self::Flac => 45,
            Self::Mov => 40,
            Self::Mkv => 35,
            Self::Wav => 30,
        }
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Which resolution path produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    PrimaryApi,
    Fallback,
    None,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::PrimaryApi => f.write_str("primary API"),
            Provenance::Fallback => f.write_str("fallback extractor"),
            Provenance::None => f.write_str("none"),
        }
    }
}

/// Final output of a resolution.
///
/// `url` has always passed link inspection as a complete, playable file.
/// `headers` lists what a downstream proxy must send for the CDN to accept
/// the request; it is empty when a generic client suffices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMedia {
    pub url: String,
    pub container_type: ContainerType,
    pub provenance: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl ResolvedMedia {
    pub(crate) fn new(url: impl Into<String>, container_type: ContainerType, provenance: Provenance) -> Self {
        Self {
            url: url.into(),
            container_type,
            provenance,
            title: None,
            duration_secs: None,
            strategy: None,
            headers: BTreeMap::new(),
        }
    }

    pub fn mime(&self) -> Mime {
        self.container_type.mime()
    }
}

/// The two signing secrets plus the moment they were fetched.
///
/// Replaced wholesale on refresh, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKeyPair {
    img_key: String,
    sub_key: String,
    fetched_at: Instant,
}

impl SigningKeyPair {
    pub fn new(img_key: impl Into<String>, sub_key: impl Into<String>) -> Self {
        Self::with_fetched_at(img_key, sub_key, Instant::now())
    }

    pub fn with_fetched_at(img_key: impl Into<String>, sub_key: impl Into<String>, at: Instant) -> Self {
        Self {
            img_key: img_key.into(),
            sub_key: sub_key.into(),
            fetched_at: at,
        }
    }

    pub fn img_key(&self) -> &str {
        &self.img_key
    }

    pub fn sub_key(&self) -> &str {
        &self.sub_key
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.age() > ttl
    }

    /// The permutation table indexes 64 characters of `img_key + sub_key`.
    pub fn is_usable(&self) -> bool {
        let combined = self.img_key.len() + self.sub_key.len();
        combined >= 64 && self.img_key.is_ascii() && self.sub_key.is_ascii()
    }
}

/// Raw play data for one (reference, strategy) attempt
#[derive(Debug, Clone, PartialEq)]
pub enum PlayResponse {
    Direct(DirectLinks),
    Segmented(SegmentedManifest),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectLinks {
    pub links: Vec<DirectLink>,
    /// Platform format label, e.g. `mp4720` or `flv480`
    pub format: Option<String>,
    pub quality: Option<u32>,
    pub timelength_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectLink {
    pub url: String,
    pub backup_urls: Vec<String>,
    pub declared_container: Option<String>,
    pub size: Option<u64>,
}

impl DirectLink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Primary URL first, then mirrors
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.url.as_str()).chain(self.backup_urls.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentedManifest {
    pub video: Vec<StreamRepresentation>,
    pub audio: Vec<StreamRepresentation>,
    pub duration_secs: Option<u64>,
}

impl SegmentedManifest {
    pub fn is_empty(&self) -> bool {
        self.video.is_empty() && self.audio.is_empty()
    }
}

/// One DASH representation; needs client-side segment assembly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamRepresentation {
    pub id: u32,
    pub url: String,
    pub backup_urls: Vec<String>,
    pub mime_type: Option<String>,
    pub codecs: Option<String>,
    pub bandwidth: Option<u64>,
}

/// A looked-up video page, ready for play-data requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayTarget {
    pub bvid: Option<String>,
    pub aid: Option<u64>,
    pub cid: u64,
    pub page: u32,
    pub title: Option<String>,
    pub duration_secs: Option<u64>,
    /// Watch-page URL, also handed to the fallback extractor
    pub page_url: String,
}

impl PlayTarget {
    /// Identifier fields the play-data endpoint expects
    pub fn id_params(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("cid".to_string(), self.cid.to_string());
        if let Some(bvid) = &self.bvid {
            params.insert("bvid".to_string(), bvid.clone());
        } else if let Some(aid) = self.aid {
            params.insert("avid".to_string(), aid.to_string());
        }
        params
    }
}
