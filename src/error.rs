// src/error.rs

use thiserror::Error;

/// Failure categories raised by the probing stages.
///
/// Every stage catches its own category at its boundary and turns it into the
/// null/default value of the matching `SiteReport` field. Only `InvalidTarget`
/// and `Config` ever reach a caller.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid target '{input}': {reason}")]
    InvalidTarget { input: String, reason: String },

    #[error("DNS resolution failed: {0}")]
    Resolution(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("certificate inspection failed: {0}")]
    Certificate(String),

    #[error("detector '{detector}' failed: {reason}")]
    Detector { detector: &'static str, reason: String },

    #[error("resource fetch failed for {url}: {reason}")]
    ResourceFetch { url: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl ProbeError {
    pub fn invalid_target(input: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidTarget { input: input.to_string(), reason: reason.to_string() }
    }

    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn certificate(err: impl std::fmt::Display) -> Self {
        Self::Certificate(err.to_string())
    }

    pub fn detector(detector: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Detector { detector, reason: err.to_string() }
    }

    pub fn resource(url: &str, err: impl std::fmt::Display) -> Self {
        Self::ResourceFetch { url: url.to_string(), reason: err.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, ProbeError>;
