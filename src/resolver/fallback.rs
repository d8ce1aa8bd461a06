//! Fallback through an external general-purpose extractor (`yt-dlp`).

use async_trait::async_trait;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::classify::playable_container;
use super::types::{ContainerType, Provenance, ResolvedMedia};
use crate::config::FallbackConfig;

/// Protocols whose URLs point at manifests, not files
const SEGMENTED_PROTOCOLS: &[&str] = &["dash", "m3u8", "f4m", "ism", "http_dash_segments"];

/// Extractor headers worth forwarding to a downstream fetcher
const FORWARDED_HEADERS: &[&str] = &["User-Agent", "Referer"];

/// Longest stderr excerpt kept in an error
const STDERR_EXCERPT: usize = 512;

#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("failed to launch {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("extractor timed out after {0:?}")]
    Timeout(Duration),

    #[error("extractor exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("extractor output malformed: {0}")]
    Malformed(String),

    #[error("no playable format among {0} candidates")]
    NoPlayableFormat(usize),
}

/// One format offered by the extractor
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormatCandidate {
    #[serde(default)]
    pub format_id: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    /// Total bitrate, kbit/s
    #[serde(default)]
    pub tbr: Option<f64>,
    /// Audio bitrate, kbit/s
    #[serde(default)]
    pub abr: Option<f64>,
    #[serde(default)]
    pub http_headers: BTreeMap<String, String>,
}

/// Preference tier; declaration order is ascending preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FormatTier {
    Other,
    AudioOnly,
    Combined,
}

fn has_codec(codec: &Option<String>) -> Option<bool> {
    codec.as_deref().map(|c| !c.is_empty() && c != "none")
}

impl FormatCandidate {
    pub fn tier(&self, container: ContainerType) -> FormatTier {
        match (has_codec(&self.acodec), has_codec(&self.vcodec)) {
            (Some(true), Some(true)) => FormatTier::Combined,
            (Some(true), Some(false)) => FormatTier::AudioOnly,
            (None, None) if container.is_audio_only() => FormatTier::AudioOnly,
            (Some(true), None) if container.is_audio_only() => FormatTier::AudioOnly,
            _ => FormatTier::Other,
        }
    }

    fn bitrate(&self) -> f64 {
        self.tbr.or(self.abr).unwrap_or(0.0)
    }

    fn is_segmented_protocol(&self) -> bool {
        self.protocol
            .as_deref()
            .map(|p| {
                let p = p.to_ascii_lowercase();
                SEGMENTED_PROTOCOLS.iter().any(|s| p.contains(s))
            })
            .unwrap_or(false)
    }
}

/// `--dump-single-json` output, reduced to what selection needs
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractedMedia {
    #[serde(default)]
    pub title: Option<String>,
    /// Seconds; the extractor reports fractions
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub webpage_url: Option<String>,
    #[serde(default)]
    pub formats: Vec<FormatCandidate>,
    /// Set when the extractor settled on a single format itself
    #[serde(flatten)]
    pub selected: FormatCandidate,
}

impl ExtractedMedia {
    /// Explicit format list, or the single selected format when none is given.
    pub fn candidates(&self) -> Vec<&FormatCandidate> {
        if !self.formats.is_empty() {
            self.formats.iter().collect()
        } else if !self.selected.url.is_empty() {
            vec![&self.selected]
        } else {
            Vec::new()
        }
    }
}

/// Pick the single best fetchable candidate.
///
/// Candidates are re-inspected with the same link rules the primary path
/// uses; manifests and fragments never qualify.
pub fn select_best(media: &ExtractedMedia) -> Option<(&FormatCandidate, ContainerType)> {
    media
        .candidates()
        .into_iter()
        .filter(|candidate| !candidate.is_segmented_protocol())
        .filter_map(|candidate| playable_container(&candidate.url).map(|container| (candidate, container)))
        .max_by(|(a, a_container), (b, b_container)| {
            a.tier(*a_container)
                .cmp(&b.tier(*b_container))
                .then(a_container.preference().cmp(&b_container.preference()))
                .then(a.bitrate().partial_cmp(&b.bitrate()).unwrap_or(Ordering::Equal))
        })
}

/// An external extraction capability
#[async_trait]
pub trait ExternalExtractor: Send + Sync {
    async fn extract(&self, page_url: &str) -> Result<ExtractedMedia, FallbackError>;
}

/// Runs `yt-dlp` as a child process.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: String,
    timeout: Duration,
    extra_args: Vec<String>,
}

impl YtDlp {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            extra_args: Vec::new(),
        }
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn from_config(config: &FallbackConfig) -> Self {
        Self::new(config.program.clone(), config.timeout.as_duration())
            .with_extra_args(config.extra_args.clone())
    }
}

#[async_trait]
impl ExternalExtractor for YtDlp {
    async fn extract(&self, page_url: &str) -> Result<ExtractedMedia, FallbackError> {
        debug!(program = %self.program, url = page_url, "Invoking extractor");

        let mut command = Command::new(&self.program);
        command
            .args(&self.extra_args)
            .arg("--dump-single-json")
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg(page_url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| FallbackError::Timeout(self.timeout))?
            .map_err(|e| FallbackError::Spawn {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FallbackError::Failed {
                status: output.status.to_string(),
                stderr: stderr.trim().chars().take(STDERR_EXCERPT).collect(),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| FallbackError::Malformed(e.to_string()))
    }
}

/// Turns an extractor run into a [`ResolvedMedia`].
#[derive(Clone)]
pub struct FallbackAdapter {
    extractor: Arc<dyn ExternalExtractor>,
}

impl FallbackAdapter {
    pub fn new(extractor: Arc<dyn ExternalExtractor>) -> Self {
        Self { extractor }
    }

    pub async fn resolve(&self, page_url: &str) -> Result<ResolvedMedia, FallbackError> {
        let media = self.extractor.extract(page_url).await?;
        let offered = media.candidates().len();

        let Some((candidate, container)) = select_best(&media) else {
            warn!(url = page_url, offered, "Extractor offered nothing playable");
            return Err(FallbackError::NoPlayableFormat(offered));
        };

        info!(
            url = page_url,
            format_id = ?candidate.format_id,
            container = %container,
            tier = ?candidate.tier(container),
            "Fallback selected format"
        );

        let mut resolved = ResolvedMedia::new(candidate.url.clone(), container, Provenance::Fallback);
        resolved.title = media.title.clone();
        resolved.duration_secs = media
            .duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(|d| d.round() as u64);
        resolved.headers = candidate
            .http_headers
            .iter()
            .filter(|(name, _)| FORWARDED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Ok(resolved)
    }
}
