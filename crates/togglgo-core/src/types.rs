//! Core types: Intent, FlowState, SessionData, Turn, Reply.

use serde::{Deserialize, Serialize};

// ── Intents ──

/// Intents the fulfillment handler knows how to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    StartTimer,
    StopTimer,
    ApiKey,
    SignIn,
    SignInSwitch,
}

impl Intent {
    /// Map a platform intent display name to an intent.
    pub fn from_display_name(name: &str) -> Option<Self> {
        match name {
            "Start timer" => Some(Intent::StartTimer),
            "Stop timer" => Some(Intent::StopTimer),
            "API Key" => Some(Intent::ApiKey),
            "Sign in" => Some(Intent::SignIn),
            "Sign in - api" => Some(Intent::SignInSwitch),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Intent::StartTimer => "Start timer",
            Intent::StopTimer => "Stop timer",
            Intent::ApiKey => "API Key",
            Intent::SignIn => "Sign in",
            Intent::SignInSwitch => "Sign in - api",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

// ── Flow state ──

/// Action to resume once the sign-in / API key sub-dialogue completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingAction {
    Start,
    Stop,
}

/// Where the conversation is in the credential acquisition flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "pending", rename_all = "snake_case")]
pub enum FlowState {
    #[default]
    Idle,
    AwaitingSignIn(Option<PendingAction>),
    AwaitingScreenHandoff(Option<PendingAction>),
    AwaitingApiKey(Option<PendingAction>),
}

impl FlowState {
    pub fn pending_action(&self) -> Option<PendingAction> {
        match self {
            FlowState::Idle => None,
            FlowState::AwaitingSignIn(a)
            | FlowState::AwaitingScreenHandoff(a)
            | FlowState::AwaitingApiKey(a) => *a,
        }
    }
}

/// Per-conversation data carried by the platform between turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    /// Cached credential for the rest of the conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apikey: Option<String>,
    #[serde(default)]
    pub flow: FlowState,
}

// ── Turn input ──

/// What the current and linked devices can display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub has_screen: bool,
    pub screen_available: bool,
}

/// Outcome of a platform helper (sign-in or surface switch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperStatus {
    Ok,
    Declined,
}

impl HelperStatus {
    /// Anything other than the literal `OK` status counts as declined.
    pub fn from_platform(status: &str) -> Self {
        if status == "OK" {
            HelperStatus::Ok
        } else {
            HelperStatus::Declined
        }
    }
}

/// One conversational turn, already decoded from the platform format.
#[derive(Debug, Clone)]
pub struct Turn {
    pub intent: Intent,
    /// Locale tag as reported by the platform (e.g. `fr-FR`).
    pub locale: String,
    /// Subject of the verified identity assertion, if the user signed in.
    pub user_id: Option<String>,
    pub session: SessionData,
    pub surface: SurfaceInfo,
    pub sign_in: Option<HelperStatus>,
    pub new_surface: Option<HelperStatus>,
    pub api_key: Option<String>,
}

// ── Reply ──

/// Capability requested when handing the conversation to a screen device.
pub const SCREEN_OUTPUT: &str = "actions.capability.SCREEN_OUTPUT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyKind {
    /// End the conversation.
    Close,
    /// Keep the microphone open.
    Ask,
    /// Ask the platform to run account linking.
    SignIn { context: String },
    /// Ask the platform to move the conversation to a screen device.
    NewSurface {
        context: String,
        notification: String,
        capabilities: Vec<String>,
    },
}

/// The single reply sent for a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub speech: Vec<String>,
    pub kind: ReplyKind,
}

impl Reply {
    pub fn close(text: impl Into<String>) -> Self {
        Self {
            speech: vec![text.into()],
            kind: ReplyKind::Close,
        }
    }

    pub fn ask(text: impl Into<String>) -> Self {
        Self {
            speech: vec![text.into()],
            kind: ReplyKind::Ask,
        }
    }

    pub fn sign_in(context: impl Into<String>) -> Self {
        Self {
            speech: Vec::new(),
            kind: ReplyKind::SignIn {
                context: context.into(),
            },
        }
    }

    pub fn new_surface(context: impl Into<String>, notification: impl Into<String>) -> Self {
        Self {
            speech: Vec::new(),
            kind: ReplyKind::NewSurface {
                context: context.into(),
                notification: notification.into(),
                capabilities: vec![SCREEN_OUTPUT.to_string()],
            },
        }
    }

    /// Put `text` in front of whatever this reply already says.
    pub fn preceded_by(mut self, text: impl Into<String>) -> Self {
        self.speech.insert(0, text.into());
        self
    }

    /// Whether the platform should keep listening after this reply.
    pub fn expects_user_response(&self) -> bool {
        !matches!(self.kind, ReplyKind::Close)
    }

    /// Short label for logs.
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            ReplyKind::Close => "close",
            ReplyKind::Ask => "ask",
            ReplyKind::SignIn { .. } => "sign_in",
            ReplyKind::NewSurface { .. } => "new_surface",
        }
    }
}

/// Reply plus the session to hand back to the platform.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: Reply,
    pub session: SessionData,
}
