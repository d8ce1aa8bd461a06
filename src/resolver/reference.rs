use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

static BVID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(BV[0-9A-Za-z]{10})\b").expect("valid bvid regex"));
static AID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|/|\b)av(\d{1,19})\b").expect("valid aid regex"));
static SHORT_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?://)?(?:www\.)?(?:b23\.tv|bili2233\.cn)/([0-9A-Za-z]+)/?(?:[?#].*)?$")
        .expect("valid short link regex")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("empty video reference")]
    Empty,
    #[error("unsupported video reference: {0}")]
    Unsupported(String),
    #[error("short link {0} expanded to another short link")]
    ShortLinkLoop(String),
    #[error("not a video platform link (host {host}): {input}")]
    ForeignHost { host: String, input: String },
}

/// Registrable domain of the watch pages; any subdomain is accepted.
const PLATFORM_DOMAIN: &str = "bilibili.com";

/// Platform identifier for a video
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VideoId {
    Bvid(String),
    Aid(u64),
    /// `b23.tv` code; must be expanded before the API can use it
    ShortLink(String),
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoId::Bvid(bvid) => f.write_str(bvid),
            VideoId::Aid(aid) => write!(f, "av{}", aid),
            VideoId::ShortLink(code) => write!(f, "b23.tv/{}", code),
        }
    }
}

/// Parsed, immutable reference to one page of a video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoReference {
    id: VideoId,
    page: u32,
    original: String,
}

impl VideoReference {
    /// Parse canonical links, mobile links, bare `BV`/`av` ids and short links.
    ///
    /// Links on other hosts are rejected even when they contain something
    /// shaped like a video id.
    pub fn parse(raw: &str) -> Result<Self, ReferenceError> {
        Self::parse_with(raw, true)
    }

    fn parse_with(raw: &str, check_host: bool) -> Result<Self, ReferenceError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ReferenceError::Empty);
        }

        if let Some(caps) = SHORT_LINK_RE.captures(trimmed) {
            return Ok(Self {
                id: VideoId::ShortLink(caps[1].to_string()),
                page: 1,
                original: trimmed.to_string(),
            });
        }

        if check_host {
            ensure_platform_host(trimmed)?;
        }

        let page = page_param(trimmed).unwrap_or(1);

        let id = if let Some(caps) = BVID_RE.captures(trimmed) {
            VideoId::Bvid(normalize_bvid(&caps[1]))
        } else if let Some(aid) = AID_RE
            .captures(trimmed)
            .and_then(|caps| caps[1].parse::<u64>().ok())
        {
            VideoId::Aid(aid)
        } else {
            return Err(ReferenceError::Unsupported(trimmed.to_string()));
        };

        Ok(Self {
            id,
            page,
            original: trimmed.to_string(),
        })
    }

    pub fn id(&self) -> &VideoId {
        &self.id
    }

    /// 1-based page (part) index
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn is_short_link(&self) -> bool {
        matches!(self.id, VideoId::ShortLink(_))
    }

    /// Canonical watch-page URL, or the original input for short links.
    pub fn page_url(&self, page_base: &str) -> String {
        let base = page_base.trim_end_matches('/');
        let path = match &self.id {
            VideoId::Bvid(bvid) => format!("{}/video/{}", base, bvid),
            VideoId::Aid(aid) => format!("{}/video/av{}", base, aid),
            VideoId::ShortLink(_) => return self.original.clone(),
        };
        if self.page > 1 {
            format!("{}?p={}", path, self.page)
        } else {
            path
        }
    }

    /// Re-parse the target of an expanded short link, keeping the short
    /// link as the original input. The redirect target is whatever host
    /// the short-link service chose, so it is not host-checked.
    pub fn from_expanded(short: &VideoReference, expanded_url: &str) -> Result<Self, ReferenceError> {
        let parsed = Self::parse_with(expanded_url, false)?;
        if parsed.is_short_link() {
            return Err(ReferenceError::ShortLinkLoop(short.original.clone()));
        }
        Ok(Self {
            original: short.original.clone(),
            ..parsed
        })
    }
}

impl fmt::Display for VideoReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.page > 1 {
            write!(f, "{} p{}", self.id, self.page)
        } else {
            write!(f, "{}", self.id)
        }
    }
}

/// The platform treats the `BV` prefix case-insensitively; the body is case-sensitive.
fn normalize_bvid(raw: &str) -> String {
    format!("BV{}", &raw[2..])
}

fn with_scheme(raw: &str) -> String {
    if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    }
}

/// Inputs with a scheme or a dotted leading segment are links; bare ids
/// (`BV…`, `av…?p=2`) are not.
fn looks_like_link(raw: &str) -> bool {
    raw.contains("://")
        || raw
            .split(['/', '?', '#'])
            .next()
            .is_some_and(|head| head.contains('.'))
}

fn ensure_platform_host(raw: &str) -> Result<(), ReferenceError> {
    if !looks_like_link(raw) {
        return Ok(());
    }
    let url = Url::parse(&with_scheme(raw)).map_err(|_| ReferenceError::Unsupported(raw.to_string()))?;
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let on_platform = host == PLATFORM_DOMAIN
        || host
            .strip_suffix(PLATFORM_DOMAIN)
            .is_some_and(|prefix| prefix.ends_with('.'));
    if on_platform {
        Ok(())
    } else {
        Err(ReferenceError::ForeignHost {
            host,
            input: raw.to_string(),
        })
    }
}

fn page_param(raw: &str) -> Option<u32> {
    let url = Url::parse(&with_scheme(raw)).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "p")
        .and_then(|(_, value)| value.parse::<u32>().ok())
        .filter(|page| *page >= 1)
}
