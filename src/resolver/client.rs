//! Platform API client: video lookup and signed play-data requests.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::AttemptError;
use super::http::{HttpClient, HttpConfig, HttpSetupError};
use super::keys::{KeyCache, NavKeySource};
use super::reference::{ReferenceError, VideoId, VideoReference};
use super::signing;
use super::strategy::RequestStrategy;
use super::types::{
    ContainerType, DirectLink, DirectLinks, PlayResponse, PlayTarget, SegmentedManifest, StreamRepresentation,
};
use crate::config::PlatformConfig;
use crate::observability::Metrics;

/// Platform code for a request the signature check rejected
const SIGNATURE_REJECTED: i64 = -403;

/// The primary path as seen by the engine
#[async_trait]
pub trait PlayApi: Send + Sync {
    /// Resolve the reference to a concrete page (expanding short links).
    async fn lookup(&self, reference: &VideoReference) -> Result<PlayTarget, AttemptError>;

    /// One signed play-data request using `strategy`.
    async fn fetch_play_data(
        &self,
        target: &PlayTarget,
        strategy: &RequestStrategy,
    ) -> Result<PlayResponse, AttemptError>;

    /// Headers a downstream fetcher must send for links from this API
    fn media_headers(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Page URL handed to the fallback extractor when lookup failed
    fn page_url(&self, reference: &VideoReference) -> String {
        reference.original().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct PlatformEndpoints {
    pub api_base: String,
    pub page_base: String,
    pub short_link_base: String,
}

impl PlatformEndpoints {
    fn api(&self, path: &str) -> String {
        format!("{}{}", self.api_base.trim_end_matches('/'), path)
    }

    fn page(&self) -> &str {
        self.page_base.trim_end_matches('/')
    }
}

pub struct PlatformClient {
    http: HttpClient,
    keys: Arc<KeyCache>,
    endpoints: PlatformEndpoints,
    quality: u32,
}

impl PlatformClient {
    pub fn new(http: HttpClient, keys: Arc<KeyCache>, endpoints: PlatformEndpoints, quality: u32) -> Self {
        Self {
            http,
            keys,
            endpoints,
            quality,
        }
    }

    /// Build the HTTP client, key cache and client from configuration.
    pub fn from_config(config: &PlatformConfig, metrics: Arc<Metrics>) -> Result<Self, HttpSetupError> {
        let http = HttpClient::new(
            HttpConfig {
                connect_timeout: config.connect_timeout.as_duration(),
                read_timeout: config.read_timeout.as_duration(),
                user_agent: config.user_agent.clone(),
            },
            config.proxy.as_deref(),
        )?;

        let source = NavKeySource::new(http.inner().clone(), &config.api_base);
        let keys = KeyCache::new(Arc::new(source), config.key_ttl.as_duration()).with_metrics(metrics);

        Ok(Self::new(
            http,
            Arc::new(keys),
            PlatformEndpoints {
                api_base: config.api_base.clone(),
                page_base: config.page_base.clone(),
                short_link_base: config.short_link_base.clone(),
            },
            config.quality,
        ))
    }

    pub fn keys(&self) -> &Arc<KeyCache> {
        &self.keys
    }

    async fn expand_short_link(&self, reference: &VideoReference) -> Result<VideoReference, AttemptError> {
        let VideoId::ShortLink(code) = reference.id() else {
            return Ok(reference.clone());
        };
        let short_url = format!("{}/{}", self.endpoints.short_link_base.trim_end_matches('/'), code);
        let landed = self.http.final_url(&short_url).await?;
        let expanded = VideoReference::from_expanded(reference, &landed)?;
        debug!(short = %short_url, expanded = %expanded, "Short link expanded");
        Ok(expanded)
    }
}

#[async_trait]
impl PlayApi for PlatformClient {
    async fn lookup(&self, reference: &VideoReference) -> Result<PlayTarget, AttemptError> {
        let reference = self.expand_short_link(reference).await?;

        let query = match reference.id() {
            VideoId::Bvid(bvid) => vec![("bvid", bvid.clone())],
            VideoId::Aid(aid) => vec![("aid", aid.to_string())],
            VideoId::ShortLink(_) => {
                return Err(ReferenceError::ShortLinkLoop(reference.original().to_string()).into());
            }
        };

        let referer = format!("{}/", self.endpoints.page());
        let envelope: Envelope<ViewData> = self
            .http
            .get_json(
                &self.endpoints.api("/x/web-interface/view"),
                &query,
                &[("Referer", referer.as_str())],
            )
            .await?;
        let view = envelope.into_data()?;

        let target = view.into_target(&reference, self.endpoints.page())?;
        debug!(bvid = ?target.bvid, cid = target.cid, page = target.page, "Video looked up");
        Ok(target)
    }

    async fn fetch_play_data(
        &self,
        target: &PlayTarget,
        strategy: &RequestStrategy,
    ) -> Result<PlayResponse, AttemptError> {
        let keys = self.keys.get_signing_keys().await?;
        let signed = signing::sign(strategy.request_params(target, self.quality), &keys)?;

        let referer = match &target.bvid {
            Some(bvid) => format!("{}/video/{}", self.endpoints.page(), bvid),
            None => target.page_url.clone(),
        };

        let envelope: Envelope<PlayData> = self
            .http
            .get_json(
                &self.endpoints.api("/x/player/wbi/playurl"),
                &signed,
                &[("Referer", referer.as_str()), ("Origin", self.endpoints.page())],
            )
            .await?;

        if envelope.code == SIGNATURE_REJECTED {
            warn!(strategy = %strategy.name, "Signature rejected, dropping cached keys");
            self.keys.invalidate().await;
        }

        Ok(envelope.into_data()?.into_response())
    }

    fn media_headers(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("Referer".to_string(), format!("{}/", self.endpoints.page())),
            ("User-Agent".to_string(), self.http.user_agent().to_string()),
        ])
    }

    fn page_url(&self, reference: &VideoReference) -> String {
        reference.page_url(self.endpoints.page())
    }
}

/// `{code, message, data}` wrapper used by every endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T, AttemptError> {
        if self.code != 0 {
            return Err(AttemptError::Api {
                code: self.code,
                message: self.message,
            });
        }
        self.data
            .ok_or_else(|| AttemptError::Decode("response has no data".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ViewData {
    #[serde(default)]
    bvid: String,
    #[serde(default)]
    aid: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    duration: Option<u64>,
    #[serde(default)]
    pages: Vec<ViewPage>,
}

#[derive(Debug, Deserialize)]
struct ViewPage {
    cid: u64,
    page: u32,
    #[serde(default)]
    part: String,
    #[serde(default)]
    duration: Option<u64>,
}

impl ViewData {
    fn into_target(self, reference: &VideoReference, page_base: &str) -> Result<PlayTarget, AttemptError> {
        let requested = reference.page();
        let available = self.pages.len();
        let page = self
            .pages
            .iter()
            .find(|p| p.page == requested)
            .ok_or(AttemptError::PageNotFound {
                page: requested,
                available,
            })?;

        let title = match (self.title.is_empty(), page.part.is_empty()) {
            (true, true) => None,
            (true, false) => Some(page.part.clone()),
            (false, _) if available > 1 && !page.part.is_empty() && page.part != self.title => {
                Some(format!("{} - {}", self.title, page.part))
            }
            (false, _) => Some(self.title.clone()),
        };

        Ok(PlayTarget {
            bvid: (!self.bvid.is_empty()).then(|| self.bvid.clone()),
            aid: (self.aid != 0).then_some(self.aid),
            cid: page.cid,
            page: page.page,
            title,
            duration_secs: page.duration.or(self.duration),
            page_url: reference.page_url(page_base),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct PlayData {
    #[serde(default)]
    durl: Option<Vec<Durl>>,
    #[serde(default)]
    dash: Option<Dash>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    timelength: Option<u64>,
    #[serde(default)]
    quality: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Durl {
    url: String,
    #[serde(default)]
    backup_url: Option<Vec<String>>,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Dash {
    #[serde(default)]
    video: Option<Vec<DashStream>>,
    #[serde(default)]
    audio: Option<Vec<DashStream>>,
    #[serde(default)]
    duration: Option<u64>,
}

/// The platform sends camelCase and snake_case spellings side by side,
/// so each one is its own field.
#[derive(Debug, Deserialize)]
struct DashStream {
    #[serde(default)]
    id: u32,
    #[serde(default, rename = "baseUrl")]
    base_url_camel: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default, rename = "backupUrl")]
    backup_url_camel: Option<Vec<String>>,
    #[serde(default)]
    backup_url: Option<Vec<String>>,
    #[serde(default, rename = "mimeType")]
    mime_type_camel: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    codecs: Option<String>,
    #[serde(default)]
    bandwidth: Option<u64>,
}

impl From<DashStream> for StreamRepresentation {
    fn from(stream: DashStream) -> Self {
        StreamRepresentation {
            id: stream.id,
            url: stream.base_url_camel.or(stream.base_url).unwrap_or_default(),
            backup_urls: stream
                .backup_url_camel
                .or(stream.backup_url)
                .unwrap_or_default(),
            mime_type: stream.mime_type_camel.or(stream.mime_type),
            codecs: stream.codecs,
            bandwidth: stream.bandwidth,
        }
    }
}

impl PlayData {
    /// Direct list when `durl` has entries, otherwise the DASH manifest.
    fn into_response(self) -> PlayResponse {
        let declared = self.format.as_deref().map(declared_container);

        match (self.durl, self.dash) {
            (Some(durl), _) if !durl.is_empty() => PlayResponse::Direct(DirectLinks {
                links: durl
                    .into_iter()
                    .map(|entry| DirectLink {
                        url: entry.url,
                        backup_urls: entry.backup_url.unwrap_or_default(),
                        declared_container: declared.clone(),
                        size: entry.size,
                    })
                    .collect(),
                format: self.format,
                quality: self.quality,
                timelength_ms: self.timelength,
            }),
            (_, Some(dash)) => PlayResponse::Segmented(SegmentedManifest {
                video: dash.video.unwrap_or_default().into_iter().map(Into::into).collect(),
                audio: dash.audio.unwrap_or_default().into_iter().map(Into::into).collect(),
                duration_secs: dash.duration,
            }),
            _ => PlayResponse::Direct(DirectLinks {
                links: Vec::new(),
                format: self.format,
                quality: self.quality,
                timelength_ms: self.timelength,
            }),
        }
    }
}

/// `mp4720` -> `mp4`, `flv480` -> `flv`, `flv_p60` -> `flv`.
///
/// Longest prefix naming a known container wins; unknown labels lose their
/// trailing quality digits.
fn declared_container(format: &str) -> String {
    let lowered = format.to_ascii_lowercase();
    (1..=lowered.len())
        .rev()
        .filter(|&end| lowered.is_char_boundary(end))
        .map(|end| &lowered[..end])
        .find(|prefix| ContainerType::from_extension(prefix).is_some())
        .unwrap_or_else(|| lowered.trim_end_matches(|c: char| c.is_ascii_digit()))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> PlayResponse {
        let envelope: Envelope<PlayData> = serde_json::from_str(json).unwrap();
        envelope.into_data().unwrap().into_response()
    }

    #[test]
    fn test_decode_durl_response() {
        let response = decode(
            r#"{"code":0,"message":"0","data":{
                "format":"mp4720","quality":64,"timelength":215000,
                "durl":[{"order":1,"length":215000,"size":1048576,
                         "url":"https://upos-sz.example.com/x.mp4?e=1",
                         "backup_url":["https://upos-hz.example.com/x.mp4?e=1"]}]}}"#,
        );

        let PlayResponse::Direct(direct) = response else {
            panic!("expected direct response");
        };
        assert_eq!(direct.links.len(), 1);
        assert_eq!(direct.links[0].url, "https://upos-sz.example.com/x.mp4?e=1");
        assert_eq!(direct.links[0].backup_urls.len(), 1);
        assert_eq!(direct.links[0].declared_container.as_deref(), Some("mp4"));
        assert_eq!(direct.links[0].size, Some(1048576));
        assert_eq!(direct.timelength_ms, Some(215000));
    }

    #[test]
    fn test_decode_dash_response() {
        let response = decode(
            r#"{"code":0,"data":{"dash":{"duration":215,
                "video":[{"id":80,"baseUrl":"https://cdn/v.m4s","backupUrl":null,
                          "mimeType":"video/mp4","codecs":"avc1.640032","bandwidth":900000}],
                "audio":[{"id":30280,"base_url":"https://cdn/a.m4s","mime_type":"audio/mp4"}]}}}"#,
        );

        let PlayResponse::Segmented(manifest) = response else {
            panic!("expected segmented response");
        };
        assert_eq!(manifest.video[0].url, "https://cdn/v.m4s");
        assert_eq!(manifest.video[0].codecs.as_deref(), Some("avc1.640032"));
        assert_eq!(manifest.audio[0].url, "https://cdn/a.m4s");
        assert_eq!(manifest.audio[0].mime_type.as_deref(), Some("audio/mp4"));
        assert_eq!(manifest.duration_secs, Some(215));
    }

    #[test]
    fn test_decode_dash_with_null_audio() {
        let response = decode(
            r#"{"code":0,"data":{"durl":[],"dash":{"video":[{"id":16,"baseUrl":"https://cdn/v.m4s"}],"audio":null}}}"#,
        );
        let PlayResponse::Segmented(manifest) = response else {
            panic!("expected segmented response");
        };
        assert_eq!(manifest.video.len(), 1);
        assert!(manifest.audio.is_empty());
    }

    #[test]
    fn test_decode_empty_payload_is_empty_direct_list() {
        let response = decode(r#"{"code":0,"data":{"quality":80}}"#);
        assert_eq!(
            response,
            PlayResponse::Direct(DirectLinks {
                quality: Some(80),
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_api_error_code() {
        let envelope: Envelope<PlayData> =
            serde_json::from_str(r#"{"code":-404,"message":"not found","data":null}"#).unwrap();
        let err = envelope.into_data().unwrap_err();
        assert!(matches!(err, AttemptError::Api { code: -404, .. }));
    }

    #[test]
    fn test_view_into_target_multi_page() {
        let view: ViewData = serde_json::from_str(
            r#"{"bvid":"BV1xx411c7mD","aid":170001,"title":"Lecture","duration":1200,
                "pages":[{"cid":11,"page":1,"part":"Intro","duration":600},
                         {"cid":22,"page":2,"part":"Q&A","duration":600}]}"#,
        )
        .unwrap();
        let reference = VideoReference::parse("https://www.bilibili.com/video/BV1xx411c7mD?p=2").unwrap();

        let target = view.into_target(&reference, "https://www.bilibili.com").unwrap();
        assert_eq!(target.cid, 22);
        assert_eq!(target.aid, Some(170001));
        assert_eq!(target.title.as_deref(), Some("Lecture - Q&A"));
        assert_eq!(target.duration_secs, Some(600));
        assert_eq!(target.page_url, "https://www.bilibili.com/video/BV1xx411c7mD?p=2");
    }

    #[test]
    fn test_view_missing_page() {
        let view: ViewData =
            serde_json::from_str(r#"{"bvid":"BV1xx411c7mD","title":"t","pages":[{"cid":11,"page":1}]}"#).unwrap();
        let reference = VideoReference::parse("BV1xx411c7mD?p=4").unwrap();

        let err = view.into_target(&reference, "https://www.bilibili.com").unwrap_err();
        assert!(matches!(err, AttemptError::PageNotFound { page: 4, available: 1 }));
    }

    #[test]
    fn test_declared_container() {
        assert_eq!(declared_container("mp4720"), "mp4");
        assert_eq!(declared_container("flv480"), "flv");
        assert_eq!(declared_container("mp4"), "mp4");
        assert_eq!(declared_container("flv_p60"), "flv");
        assert_eq!(declared_container("M4A192"), "m4a");
        assert_eq!(declared_container("hdflv2"), "hdflv");
    }

    #[test]
    fn test_decode_dash_with_both_spellings() {
        let response = decode(
            r#"{"code":0,"data":{"dash":{"duration":215,
                "video":[{"id":80,"baseUrl":"https://cdn/v.m4s","base_url":"https://cdn/v.m4s",
                          "backupUrl":["https://mirror/v.m4s"],"backup_url":["https://mirror/v.m4s"],
                          "mimeType":"video/mp4","mime_type":"video/mp4","codecs":"avc1.640032"}],
                "audio":[{"id":30280,"baseUrl":"https://cdn/a.m4s","base_url":"https://cdn/a.m4s",
                          "backupUrl":null,"backup_url":null,
                          "mimeType":"audio/mp4","mime_type":"audio/mp4"}]}}}"#,
        );

        let PlayResponse::Segmented(manifest) = response else {
            panic!("expected segmented response");
        };
        assert_eq!(manifest.video[0].url, "https://cdn/v.m4s");
        assert_eq!(manifest.video[0].backup_urls, vec!["https://mirror/v.m4s".to_string()]);
        assert_eq!(manifest.video[0].mime_type.as_deref(), Some("video/mp4"));
        assert_eq!(manifest.audio[0].url, "https://cdn/a.m4s");
        assert!(manifest.audio[0].backup_urls.is_empty());
    }
}
