use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Reason attached to the verdict synthesized when the backend can't be reached.
pub const FALLBACK_REASON: &str = "Error checking site";

/// Opaque identifier of a browsing context (tab or frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DestinationId(pub u64);

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab:{}", self.0)
    }
}

/// A completed navigation reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationEvent {
    pub destination: DestinationId,
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

impl NavigationEvent {
    pub fn new(destination: DestinationId, url: impl Into<String>) -> Self {
        Self {
            destination,
            url: url.into(),
            timestamp: Utc::now(),
        }
    }

    /// Only http(s) navigations are classified.
    pub fn is_web(&self) -> bool {
        is_web_url(&self.url)
    }
}

pub fn is_web_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Three-level site classification, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Trusted,
    Unknown,
    Risky,
}

impl RiskLevel {
    /// Map the backend's numeric encoding. Unrecognized codes are `Unknown`.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Trusted,
            2 => Self::Risky,
            _ => Self::Unknown,
        }
    }

    /// Lenient mapping from an arbitrary JSON value (`2`, `2.0`, `"2"`).
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_json(value: &Value) -> Self {
        let code = match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        code.map_or(Self::Unknown, Self::from_code)
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Trusted => 0,
            Self::Unknown => 1,
            Self::Risky => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Trusted => "Trusted",
            Self::Unknown => "Unknown",
            Self::Risky => "Risky",
        }
    }

    /// Whether this level produces a page alert and a desktop notification.
    pub fn is_alert(self) -> bool {
        !matches!(self, Self::Trusted)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Serde adapter for the numeric wire encoding of [`RiskLevel`].
///
/// Use with `#[serde(with = "safesurf_core::risk_code")]`.
pub mod risk_code {
    use super::RiskLevel;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(level: &RiskLevel, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(level.code())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RiskLevel, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(RiskLevel::from_json(&value))
    }
}

/// Classification of a single URL. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskVerdict {
    pub url: String,
    pub risk: RiskLevel,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
}

impl RiskVerdict {
    pub fn new(url: impl Into<String>, risk: RiskLevel, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            risk,
            reason: reason.into(),
            confidence: None,
        }
    }

    /// The verdict used when every classification attempt failed.
    pub fn fallback(url: impl Into<String>, risk: RiskLevel) -> Self {
        Self::new(url, risk, FALLBACK_REASON)
    }
}

/// Body of a successful `/check_url` response, before level mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckResponse {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub risk: Value,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub confidence: Option<Value>,
}

impl CheckResponse {
    pub fn new(risk: i64, reason: impl Into<String>) -> Self {
        Self {
            url: None,
            risk: Value::from(risk),
            reason: Some(reason.into()),
            confidence: None,
        }
    }

    /// Map into a verdict for `url`. The requested URL wins over any echoed one.
    pub fn into_verdict(self, url: &str) -> RiskVerdict {
        let risk = RiskLevel::from_json(&self.risk);
        let confidence = self.confidence.and_then(|c| match c {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        });
        RiskVerdict {
            url: url.to_owned(),
            risk,
            reason: self.reason.unwrap_or_default(),
            confidence,
        }
    }
}

/// User actions available from the page alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Override,
    Report,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Override => "override",
            Self::Report => "report",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An override or report requested from a page context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub id: Uuid,
    pub url: String,
    pub kind: ActionKind,
}

impl ActionRequest {
    pub fn new(url: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            kind,
        }
    }
}

/// Terminal result of an [`ActionRequest`]. Failures are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionOutcome {
    Acknowledged,
    Failed(String),
}

impl ActionOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Acknowledged)
    }
}

/// A desktop notification for an alerting verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

impl Notification {
    /// `None` for trusted verdicts: those are only logged.
    pub fn for_verdict(verdict: &RiskVerdict) -> Option<Self> {
        let title = match verdict.risk {
            RiskLevel::Trusted => return None,
            RiskLevel::Unknown => "ℹ️ Site May Be Risky",
            RiskLevel::Risky => "⚠️ Risky Site Detected!",
        };
        Some(Self {
            title: title.to_owned(),
            message: format!("{}\nReason: {}", verdict.url, verdict.reason),
        })
    }
}
