//! Decides whether a play response contains a link a plain HTTP client can
//! fetch end-to-end as one file.
//!
//! The path extension is the primary signal. Hard markers (player API
//! paths, segment-index hints) veto a link regardless of its extension;
//! soft markers that merely hint at a segmented-delivery variant do not
//! override a full container extension.

use std::fmt;
use tracing::debug;
use url::Url;

use super::types::{ContainerType, DirectLink, PlayResponse, Provenance, ResolvedMedia};

/// Extensions of pieces that only make sense with a manifest
const FRAGMENT_EXTENSIONS: &[&str] = &["m4s", "ts", "m3u8", "mpd", "f4m"];

/// Substrings (matched case-insensitively against the whole URL) that mark
/// a segmented-delivery API response rather than a media file.
const HARD_MARKERS: &[&str] = &[
    "/x/player/",
    "initialization",
    "segment_base",
    "http_dash_segments",
];

/// Hosts that serve API responses, never media bytes
const API_HOSTS: &[&str] = &["interface.bilibili.com"];

/// Query markers seen on segmented variants; informational only
const SOFT_MARKERS: &[&str] = &["gen=playurlv3", "platform=pc", "agrr=", "bvc=vod", "fnval=4048"];

/// Result of inspecting one URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Playable(ContainerType),
    Fragment,
    Unrecognized,
}

/// Inspect a single URL.
pub fn inspect_link(raw: &str) -> LinkKind {
    let Ok(url) = Url::parse(raw) else {
        return LinkKind::Unrecognized;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return LinkKind::Unrecognized;
    }

    let lowered = raw.to_ascii_lowercase();
    if HARD_MARKERS.iter().any(|marker| lowered.contains(marker)) || is_api_host(&url) {
        return LinkKind::Fragment;
    }

    let Some(extension) = path_extension(&url) else {
        return LinkKind::Unrecognized;
    };
    if FRAGMENT_EXTENSIONS.contains(&extension.as_str()) {
        return LinkKind::Fragment;
    }

    match ContainerType::from_extension(&extension) {
        Some(container) => {
            if SOFT_MARKERS.iter().any(|marker| lowered.contains(marker)) {
                debug!(url = raw, container = %container, "Soft segmented marker on full container, accepting");
            }
            LinkKind::Playable(container)
        }
        None => LinkKind::Unrecognized,
    }
}

/// Convenience for guards: the container if `raw` is playable.
pub fn playable_container(raw: &str) -> Option<ContainerType> {
    match inspect_link(raw) {
        LinkKind::Playable(container) => Some(container),
        _ => None,
    }
}

fn is_api_host(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    if API_HOSTS.contains(&host.as_str()) {
        return true;
    }
    host == "api.bilibili.com" && url.path().contains("playurl")
}

fn path_extension(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Why a response produced nothing usable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusableReason {
    /// Only a segmented manifest came back
    SegmentedOnly,
    /// No link entries at all
    NoEntries,
    /// Entries existed but none was a full container file
    NoPlayableLink,
}

impl fmt::Display for UnusableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnusableReason::SegmentedOnly => f.write_str("segmented manifest only"),
            UnusableReason::NoEntries => f.write_str("no link entries"),
            UnusableReason::NoPlayableLink => f.write_str("no playable container link"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Usable(ResolvedMedia),
    Unusable(UnusableReason),
}

/// Classify a play response.
///
/// Only direct-link entries can yield [`Verdict::Usable`]; the first
/// playable URL wins, primary URLs before their mirrors.
pub fn classify(response: &PlayResponse) -> Verdict {
    match response {
        PlayResponse::Direct(direct) if direct.links.is_empty() => Verdict::Unusable(UnusableReason::NoEntries),
        PlayResponse::Direct(direct) => match first_playable(&direct.links) {
            Some((url, container)) => {
                Verdict::Usable(ResolvedMedia::new(url, container, Provenance::PrimaryApi))
            }
            None => Verdict::Unusable(UnusableReason::NoPlayableLink),
        },
        PlayResponse::Segmented(manifest) if manifest.is_empty() => {
            Verdict::Unusable(UnusableReason::NoEntries)
        }
        PlayResponse::Segmented(_) => Verdict::Unusable(UnusableReason::SegmentedOnly),
    }
}

fn first_playable(links: &[DirectLink]) -> Option<(&str, ContainerType)> {
    links.iter().find_map(|link| {
        let found = link
            .candidates()
            .find_map(|url| playable_container(url).map(|container| (url, container)));
        if found.is_none() {
            debug!(
                url = %link.url,
                declared = ?link.declared_container,
                "Direct entry has no playable link"
            );
        }
        found
    })
}
