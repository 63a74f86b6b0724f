use safesurf_core::{
    ActionKind, ActionOutcome, ActionRequest, DestinationId, RiskLevel, RiskVerdict, risk_code,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PROTOCOL_VERSION: u32 = 1;

/// Page contexts and the host's navigation feed → monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Hello {
        version: u32,
    },
    /// Register this connection as the page context for `destination`.
    Attach {
        destination: DestinationId,
    },
    /// A navigation completed in `destination`.
    Navigated {
        destination: DestinationId,
        url: String,
    },
    Action {
        id: Uuid,
        url: String,
        kind: ActionKind,
    },
}

impl ClientMessage {
    pub fn action(request: &ActionRequest) -> Self {
        Self::Action {
            id: request.id,
            url: request.url.clone(),
            kind: request.kind,
        }
    }
}

/// Monitor → page context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ServerMessage {
    Hello {
        version: u32,
    },
    ShowWarning {
        url: String,
        reason: String,
        #[serde(with = "risk_code")]
        risk: RiskLevel,
    },
    ShowInfo {
        url: String,
        reason: String,
        #[serde(with = "risk_code")]
        risk: RiskLevel,
    },
    ActionResult {
        id: Uuid,
        kind: ActionKind,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl ServerMessage {
    /// The page message for a verdict; `None` for trusted sites.
    pub fn from_verdict(verdict: &RiskVerdict) -> Option<Self> {
        let url = verdict.url.clone();
        let reason = verdict.reason.clone();
        let risk = verdict.risk;
        match risk {
            RiskLevel::Trusted => None,
            RiskLevel::Unknown => Some(Self::ShowInfo { url, reason, risk }),
            RiskLevel::Risky => Some(Self::ShowWarning { url, reason, risk }),
        }
    }

    /// Recover the verdict carried by a show message.
    pub fn into_verdict(self) -> Option<RiskVerdict> {
        match self {
            Self::ShowWarning { url, reason, risk } | Self::ShowInfo { url, reason, risk } => {
                Some(RiskVerdict::new(url, risk, reason))
            }
            Self::Hello { .. } | Self::ActionResult { .. } => None,
        }
    }

    pub fn action_result(request: &ActionRequest, outcome: &ActionOutcome) -> Self {
        let (ok, detail) = match outcome {
            ActionOutcome::Acknowledged => (true, None),
            ActionOutcome::Failed(reason) => (false, Some(reason.clone())),
        };
        Self::ActionResult {
            id: request.id,
            kind: request.kind,
            ok,
            detail,
        }
    }
}

/// Outcome carried by an `actionResult` message.
pub fn outcome_of(ok: bool, detail: Option<String>) -> ActionOutcome {
    if ok {
        ActionOutcome::Acknowledged
    } else {
        ActionOutcome::Failed(detail.unwrap_or_else(|| "action failed".to_owned()))
    }
}
