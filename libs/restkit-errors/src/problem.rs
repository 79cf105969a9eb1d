//! RFC 9457 Problem Details as received by a client (pure data model)
//!
//! Servers are not trusted to send well-formed problems: every member is
//! optional, and [`ProblemBody::parse`] never fails. A body that is not a
//! problem-shaped JSON object degrades to its raw text.

use serde::{Deserialize, Deserializer, Serialize};

/// Maximum number of characters of a non-problem body kept as a message.
pub const TEXT_PREVIEW_LIMIT: usize = 512;

/// Accepts `404` as well as `"404"`; anything else becomes `None`.
fn deserialize_lenient_status<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// RFC 9457 Problem Details for HTTP APIs, client side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub struct Problem {
    /// A URI reference that identifies the problem type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_url: Option<String>,
    /// A short, human-readable summary of the problem type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// The HTTP status code the server attributed to this occurrence.
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_status",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<u16>,
    /// A human-readable explanation specific to this occurrence of the problem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// A URI reference that identifies the specific occurrence of the problem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Machine-readable error code defined by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Server-side trace id, when the service exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Per-field failures, usually attached to 400 responses.
    #[serde(
        default,
        alias = "invalid-params",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub invalid_parameters: Vec<InvalidParameter>,
}

/// A single rejected request parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidParameter {
    /// Field path, e.g. "email" or "user.email"
    #[serde(alias = "name")]
    pub field: String,
    /// Why the value was rejected
    #[serde(default, alias = "reason")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Problem {
    pub fn new(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            detail: Some(detail.into()),
            ..Self::default()
        }
    }

    /// True when none of the problem members were present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.type_url.is_none()
            && self.title.is_none()
            && self.status.is_none()
            && self.detail.is_none()
            && self.instance.is_none()
            && self.code.is_none()
            && self.trace_id.is_none()
            && self.invalid_parameters.is_empty()
    }

    /// `"title: detail"`, or whichever of the two is present.
    #[must_use]
    pub fn summary(&self) -> Option<String> {
        match (self.title.as_deref(), self.detail.as_deref()) {
            (Some(title), Some(detail)) if !detail.is_empty() => Some(format!("{title}: {detail}")),
            (Some(title), _) => Some(title.to_owned()),
            (None, Some(detail)) => Some(detail.to_owned()),
            (None, None) => None,
        }
    }
}

/// Outcome of reading an error body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProblemBody {
    /// The body was a JSON object carrying at least one problem member.
    Structured(Problem),
    /// Anything else, kept as (truncated) text.
    Text(String),
    /// No body, or whitespace only.
    Empty,
}

impl ProblemBody {
    /// Parse an error body. Never fails; malformed input degrades to `Text`.
    #[must_use]
    pub fn parse(body: &[u8]) -> Self {
        let text = String::from_utf8_lossy(body);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }

        if trimmed.starts_with('{')
            && let Ok(problem) = serde_json::from_str::<Problem>(trimmed)
            && !problem.is_empty()
        {
            return Self::Structured(problem);
        }

        Self::Text(truncate_chars(trimmed, TEXT_PREVIEW_LIMIT))
    }

    #[must_use]
    pub fn problem(&self) -> Option<&Problem> {
        match self {
            Self::Structured(problem) => Some(problem),
            Self::Text(_) | Self::Empty => None,
        }
    }

    #[must_use]
    pub fn into_problem(self) -> Option<Problem> {
        match self {
            Self::Structured(problem) => Some(problem),
            Self::Text(_) | Self::Empty => None,
        }
    }

    /// Best human-readable message the body offers.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Structured(problem) => problem.summary(),
            Self::Text(text) => Some(text.clone()),
            Self::Empty => None,
        }
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_owned(),
    }
}
