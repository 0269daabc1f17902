//! Publisher error types.
//!
//! Publish failures are categorized up front so the retry policy never has to
//! inspect error details:
//!
//! - **Retryable** failures are transient (5xx, rate limits, timeouts) and
//!   may be rescheduled with backoff.
//! - **Permanent** failures need operator attention (bad credentials,
//!   unknown repository, rejected payload).
//! - **Fatal** failures are bugs: a publisher panicked or violated its
//!   contract. They are reported like permanent failures but flagged so
//!   operators can tell them apart.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// The kind of publisher error, categorized for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublisherErrorKind {
    /// Transient error - safe to retry with backoff.
    Retryable,

    /// Permanent error - requires human intervention.
    Permanent,

    /// Programming error inside a publisher.
    Fatal,
}

impl PublisherErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PublisherErrorKind::Retryable)
    }
}

impl fmt::Display for PublisherErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublisherErrorKind::Retryable => f.write_str("retryable"),
            PublisherErrorKind::Permanent => f.write_str("permanent"),
            PublisherErrorKind::Fatal => f.write_str("fatal"),
        }
    }
}

/// A failed publish attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub struct PublisherError {
    pub kind: PublisherErrorKind,

    /// The HTTP status code returned by the hosting service, if any.
    pub status_code: Option<u16>,

    /// A human-readable description of the error.
    pub message: String,
}

impl fmt::Display for PublisherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} (HTTP {})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

impl PublisherError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            kind: PublisherErrorKind::Retryable,
            status_code: None,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: PublisherErrorKind::Permanent,
            status_code: None,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: PublisherErrorKind::Fatal,
            status_code: None,
            message: message.into(),
        }
    }

    /// Categorizes an HTTP response status returned by a hosting service.
    ///
    /// 429 and 5xx are retryable; 408 (request timeout) too. Everything else is
    /// permanent.
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let kind = match status_code {
            408 | 429 => PublisherErrorKind::Retryable,
            code if (500..600).contains(&code) => PublisherErrorKind::Retryable,
            _ => PublisherErrorKind::Permanent,
        };
        Self {
            kind,
            status_code: Some(status_code),
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}
