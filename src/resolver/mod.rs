//! Media-link resolution for video pages.
//!
//! A [`Resolver`] turns a page reference into a [`ResolvedMedia`]: it looks
//! the video up, tries each [`RequestStrategy`] against the signed play-data
//! endpoint, keeps only links that [`classify`] accepts as complete files and
//! falls back to an external extractor when the platform path is exhausted.

pub mod classify;
pub mod client;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod http;
pub mod keys;
pub mod reference;
pub mod signing;
pub mod strategy;
pub mod types;

pub use classify::{LinkKind, UnusableReason, Verdict, classify, inspect_link};
pub use client::{PlatformClient, PlatformEndpoints, PlayApi};
pub use engine::Resolver;
pub use error::{AttemptError, FailureStage, KeyError, ResolveError};
pub use fallback::{ExternalExtractor, FallbackAdapter, FallbackError, YtDlp};
pub use keys::{KeyCache, KeySource, NavKeySource, StaticKeys};
pub use reference::{ReferenceError, VideoId, VideoReference};
pub use strategy::{RequestStrategy, ResponseShape, default_strategies};
pub use types::{ContainerType, PlayResponse, PlayTarget, Provenance, ResolvedMedia, SigningKeyPair};
