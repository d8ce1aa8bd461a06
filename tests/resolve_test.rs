//! End-to-end resolution against a mock platform served by axum.

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::get,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, sleep};

use enclosure::observability::Metrics;
use enclosure::resolver::fallback::ExtractedMedia;
use enclosure::resolver::http::{HttpClient, HttpConfig};
use enclosure::resolver::{
    ContainerType, ExternalExtractor, FallbackAdapter, FallbackError, KeyCache, NavKeySource,
    PlatformClient, PlatformEndpoints, Provenance, ResolveError, Resolver,
};

const BVID: &str = "BV1xx411c7mD";

/// How the mock answers play-data requests
#[derive(Clone, Copy)]
enum Mode {
    /// Every preset gets a progressive mp4
    Direct,
    /// Only the android preset gets a durl list
    AndroidOnly,
    /// Every preset gets DASH
    SegmentedOnly,
    /// First request is rejected with -403, later ones succeed
    RejectFirstSignature,
}

struct MockPlatform {
    base: String,
    mode: Mode,
    nav_down: bool,
    nav_hits: AtomicUsize,
    play_requests: Mutex<Vec<HashMap<String, String>>>,
}

impl MockPlatform {
    fn play_requests(&self) -> Vec<HashMap<String, String>> {
        self.play_requests.lock().unwrap().clone()
    }
}

async fn nav(State(mock): State<Arc<MockPlatform>>) -> impl IntoResponse {
    mock.nav_hits.fetch_add(1, Ordering::SeqCst);
    if mock.nav_down {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))).into_response();
    }
    // Anonymous sessions are "not logged in" but still get key material
    Json(json!({
        "code": -101,
        "message": "not logged in",
        "data": {
            "isLogin": false,
            "wbi_img": {
                "img_url": "https://i0.hdslb.com/bfs/wbi/7cd084941338484aae1ad9425b84077c.png",
                "sub_url": "https://i0.hdslb.com/bfs/wbi/4932caff0ff746eab6f01bf08b70ac45.png"
            }
        }
    }))
    .into_response()
}

async fn view(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    if query.get("bvid").map(String::as_str) != Some(BVID) && query.get("aid").is_none() {
        return Json(json!({"code": -404, "message": "not found", "data": null}));
    }
    Json(json!({
        "code": 0,
        "message": "0",
        "data": {
            "bvid": BVID,
            "aid": 170001,
            "title": "Weekly Show",
            "duration": 1200,
            "pages": [
                {"cid": 1001, "page": 1, "part": "Weekly Show", "duration": 600},
                {"cid": 1002, "page": 2, "part": "Bonus", "duration": 600}
            ]
        }
    }))
}

fn durl(url: &str) -> Value {
    json!({
        "code": 0,
        "message": "0",
        "data": {
            "format": "mp4720",
            "quality": 64,
            "timelength": 600000,
            "durl": [{"order": 1, "size": 4096, "url": url, "backup_url": null}]
        }
    })
}

fn dash() -> Value {
    json!({
        "code": 0,
        "message": "0",
        "data": {
            "dash": {
                "duration": 600,
                "video": [{"id": 80, "baseUrl": "https://upos.example.com/v/1001-80.m4s", "bandwidth": 900000}],
                "audio": [{"id": 30280, "baseUrl": "https://upos.example.com/a/1001-30280.m4s"}]
            }
        }
    })
}

async fn playurl(
    State(mock): State<Arc<MockPlatform>>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let signed = query.get("w_rid").is_some_and(|r| r.len() == 32) && query.contains_key("wts");
    let first = {
        let mut requests = mock.play_requests.lock().unwrap();
        requests.push(query.clone());
        requests.len() == 1
    };
    if !signed {
        return Json(json!({"code": -403, "message": "unsigned", "data": null}));
    }

    let platform = query.get("platform").map(String::as_str).unwrap_or_default();
    let body = match mock.mode {
        Mode::Direct => durl("https://upos.example.com/ugc/1001-1-64.mp4?deadline=1&os=upos"),
        Mode::AndroidOnly if platform == "android" => {
            durl("https://upos.example.com/ugc/1001-1-32.flv?deadline=1")
        }
        Mode::RejectFirstSignature if first => {
            json!({"code": -403, "message": "access denied", "data": null})
        }
        Mode::RejectFirstSignature => durl("https://upos.example.com/ugc/1001-1-64.mp4"),
        Mode::AndroidOnly | Mode::SegmentedOnly => dash(),
    };
    Json(body)
}

async fn short_link(State(mock): State<Arc<MockPlatform>>, Path(code): Path<String>) -> Redirect {
    assert_eq!(code, "aBc123");
    Redirect::temporary(&format!("{}/video/{}?p=2", mock.base, BVID))
}

async fn watch_page() -> &'static str {
    "<html></html>"
}

/// Serve the mock on an ephemeral port; returns its state.
async fn start_mock_platform(mode: Mode, nav_down: bool) -> Arc<MockPlatform> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mock = Arc::new(MockPlatform {
        base: format!("http://{}", addr),
        mode,
        nav_down,
        nav_hits: AtomicUsize::new(0),
        play_requests: Mutex::new(Vec::new()),
    });

    let app = Router::new()
        .route("/x/web-interface/nav", get(nav))
        .route("/x/web-interface/view", get(view))
        .route("/x/player/wbi/playurl", get(playurl))
        .route("/s/{code}", get(short_link))
        .route("/video/{id}", get(watch_page))
        .with_state(mock.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give server time to start
    sleep(Duration::from_millis(50)).await;

    mock
}

fn platform_client(mock: &MockPlatform, metrics: Arc<Metrics>) -> PlatformClient {
    let http = HttpClient::new(HttpConfig::default(), None).unwrap();
    let source = NavKeySource::new(http.inner().clone(), &mock.base);
    let keys = KeyCache::new(Arc::new(source), Duration::from_secs(600)).with_metrics(metrics);

    PlatformClient::new(
        http,
        Arc::new(keys),
        PlatformEndpoints {
            api_base: mock.base.clone(),
            page_base: mock.base.clone(),
            short_link_base: format!("{}/s", mock.base),
        },
        64,
    )
}

/// Extractor stub that records the page it was asked about.
struct StubExtractor {
    output: Value,
    pages: Mutex<Vec<String>>,
}

impl StubExtractor {
    fn new(output: Value) -> Arc<Self> {
        Arc::new(Self {
            output,
            pages: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ExternalExtractor for StubExtractor {
    async fn extract(&self, page_url: &str) -> Result<ExtractedMedia, FallbackError> {
        self.pages.lock().unwrap().push(page_url.to_string());
        serde_json::from_value(self.output.clone()).map_err(|e| FallbackError::Malformed(e.to_string()))
    }
}

fn audio_formats() -> Value {
    json!({
        "title": "Weekly Show (extracted)",
        "duration": 600.4,
        "formats": [
            {"format_id": "dash-80", "url": "https://upos.example.com/v/1001-80.m4s",
             "protocol": "http_dash_segments", "vcodec": "avc1", "acodec": "none"},
            {"format_id": "30280", "url": "https://upos.example.com/a/1001-30280.m4a",
             "protocol": "https", "vcodec": "none", "acodec": "mp4a.40.2", "abr": 192.0,
             "http_headers": {"Referer": "https://www.bilibili.com/", "Accept": "*/*"}}
        ]
    })
}

fn resolver(mock: &MockPlatform, fallback: Option<FallbackAdapter>) -> Resolver {
    let metrics = Arc::new(Metrics::new());
    Resolver::builder()
        .api(Arc::new(platform_client(mock, metrics.clone())))
        .maybe_fallback(fallback)
        .metrics(metrics)
        .build()
}

#[tokio::test]
async fn test_direct_link_from_first_strategy() {
    let mock = start_mock_platform(Mode::Direct, false).await;
    let resolver = resolver(&mock, None);

    let media = resolver
        .resolve(&format!("https://www.bilibili.com/video/{}", BVID))
        .await
        .unwrap();

    assert_eq!(media.provenance, Provenance::PrimaryApi);
    assert_eq!(media.container_type, ContainerType::Mp4);
    assert_eq!(media.url, "https://upos.example.com/ugc/1001-1-64.mp4?deadline=1&os=upos");
    assert_eq!(media.strategy.as_deref(), Some("html5-download"));
    assert_eq!(media.title.as_deref(), Some("Weekly Show"));
    assert_eq!(media.headers.get("Referer"), Some(&format!("{}/", mock.base)));

    let requests = mock.play_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].get("bvid").map(String::as_str), Some(BVID));
    assert_eq!(requests[0].get("cid").map(String::as_str), Some("1001"));
    assert_eq!(requests[0].get("platform").map(String::as_str), Some("html5"));
    assert_eq!(mock.nav_hits.load(Ordering::SeqCst), 1);

    let snapshot = resolver.metrics().snapshot();
    assert_eq!(snapshot.resolved_primary, 1);
    assert_eq!(snapshot.key_refreshes, 1);
}

#[tokio::test]
async fn test_segmented_responses_are_skipped() {
    let mock = start_mock_platform(Mode::AndroidOnly, false).await;
    let resolver = resolver(&mock, None);

    let media = resolver.resolve(BVID).await.unwrap();

    assert_eq!(media.container_type, ContainerType::Flv);
    assert_eq!(media.strategy.as_deref(), Some("android-durl"));
    assert_eq!(mock.play_requests().len(), 2);
    assert_eq!(resolver.metrics().snapshot().unusable_verdicts, 1);
}

#[tokio::test]
async fn test_segmented_only_without_fallback_is_exhausted() {
    let mock = start_mock_platform(Mode::SegmentedOnly, false).await;
    let resolver = resolver(&mock, None);

    let err = resolver.resolve(BVID).await.unwrap_err();

    assert!(matches!(err, ResolveError::AllStrategiesExhausted { attempted: 3 }));
    assert_eq!(mock.play_requests().len(), 3);
    // Keys fetched once and reused across strategies
    assert_eq!(mock.nav_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_segmented_only_falls_back_to_extractor() {
    let mock = start_mock_platform(Mode::SegmentedOnly, false).await;
    let extractor = StubExtractor::new(audio_formats());
    let resolver = resolver(&mock, Some(FallbackAdapter::new(extractor.clone())));

    let media = resolver.resolve(BVID).await.unwrap();

    assert_eq!(media.provenance, Provenance::Fallback);
    assert_eq!(media.container_type, ContainerType::M4a);
    assert_eq!(media.url, "https://upos.example.com/a/1001-30280.m4a");
    assert_eq!(media.title.as_deref(), Some("Weekly Show (extracted)"));
    assert_eq!(media.duration_secs, Some(600));
    assert!(media.headers.contains_key("Referer"));
    assert!(!media.headers.contains_key("Accept"));

    let pages = extractor.pages.lock().unwrap().clone();
    assert_eq!(pages, vec![format!("{}/video/{}", mock.base, BVID)]);
    assert_eq!(resolver.metrics().snapshot().resolved_fallback, 1);
}

#[tokio::test]
async fn test_short_link_expands_to_requested_page() {
    let mock = start_mock_platform(Mode::Direct, false).await;
    let resolver = resolver(&mock, None);

    let media = resolver.resolve("https://b23.tv/aBc123").await.unwrap();

    assert_eq!(media.title.as_deref(), Some("Weekly Show - Bonus"));
    let requests = mock.play_requests();
    assert_eq!(requests[0].get("cid").map(String::as_str), Some("1002"));
}

#[tokio::test]
async fn test_signature_rejection_refreshes_keys() {
    let mock = start_mock_platform(Mode::RejectFirstSignature, false).await;
    let resolver = resolver(&mock, None);

    let media = resolver.resolve(BVID).await.unwrap();

    assert_eq!(media.strategy.as_deref(), Some("android-durl"));
    assert_eq!(mock.nav_hits.load(Ordering::SeqCst), 2);
    assert_eq!(resolver.metrics().snapshot().strategy_attempt_failures, 1);
}

#[tokio::test]
async fn test_key_endpoint_down() {
    let mock = start_mock_platform(Mode::Direct, true).await;
    let resolver = resolver(&mock, None);

    let err = resolver.resolve(BVID).await.unwrap_err();

    assert!(matches!(err, ResolveError::KeyFetchFailed(_)));
    assert!(mock.play_requests().is_empty());
    assert_eq!(resolver.metrics().snapshot().key_refresh_failures, 1);
}

#[tokio::test]
async fn test_key_endpoint_down_with_fallback() {
    let mock = start_mock_platform(Mode::Direct, true).await;
    let extractor = StubExtractor::new(audio_formats());
    let resolver = resolver(&mock, Some(FallbackAdapter::new(extractor)));

    let media = resolver.resolve(BVID).await.unwrap();

    assert_eq!(media.provenance, Provenance::Fallback);
    assert!(mock.play_requests().is_empty());
}
