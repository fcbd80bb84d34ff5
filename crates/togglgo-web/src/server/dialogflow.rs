//! Dialogflow v2 webhook format with the Actions on Google payload.
//!
//! Only the fields the fulfillment reads are modelled; everything else in
//! the request is ignored.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use togglgo_core::types::{HelperStatus, Reply, ReplyKind, SessionData, SurfaceInfo, SCREEN_OUTPUT};

/// Context the platform library uses to carry conversation data.
pub const SESSION_CONTEXT: &str = "_actions_on_google";
const SESSION_LIFESPAN: u32 = 99;
/// Helper intents need some speech; the platform never plays this text.
const HELPER_PLACEHOLDER: &str = "PLACEHOLDER";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    #[serde(default)]
    pub response_id: String,
    #[serde(default)]
    pub session: String,
    pub query_result: QueryResult,
    #[serde(default)]
    pub original_detect_intent_request: Option<OriginalRequest>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    #[serde(default)]
    pub query_text: String,
    #[serde(default)]
    pub language_code: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub intent: Option<IntentRef>,
    #[serde(default)]
    pub output_contexts: Vec<OutputContext>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRef {
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputContext {
    pub name: String,
    #[serde(default)]
    pub lifespan_count: Option<u32>,
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalRequest {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub payload: GooglePayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GooglePayload {
    #[serde(default)]
    pub user: GoogleUser,
    #[serde(default)]
    pub surface: Surface,
    #[serde(default)]
    pub available_surfaces: Vec<Surface>,
    #[serde(default)]
    pub inputs: Vec<Input>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleUser {
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Surface {
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

impl Surface {
    fn has(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c.name == capability)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Capability {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Input {
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub arguments: Vec<Argument>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Argument {
    pub name: String,
    #[serde(default)]
    pub extension: Option<Value>,
}

impl WebhookRequest {
    fn payload(&self) -> Option<&GooglePayload> {
        self.original_detect_intent_request
            .as_ref()
            .map(|r| &r.payload)
    }

    pub fn intent_name(&self) -> &str {
        self.query_result
            .intent
            .as_ref()
            .map(|i| i.display_name.as_str())
            .unwrap_or("")
    }

    /// User locale, then the agent's language, then English.
    pub fn locale(&self) -> String {
        self.payload()
            .and_then(|p| p.user.locale.clone())
            .filter(|l| !l.is_empty())
            .or_else(|| {
                Some(self.query_result.language_code.clone()).filter(|l| !l.is_empty())
            })
            .unwrap_or_else(|| "en".to_string())
    }

    pub fn id_token(&self) -> Option<&str> {
        self.payload().and_then(|p| p.user.id_token.as_deref())
    }

    pub fn surface_info(&self) -> SurfaceInfo {
        match self.payload() {
            Some(p) => SurfaceInfo {
                has_screen: p.surface.has(SCREEN_OUTPUT),
                screen_available: p.available_surfaces.iter().any(|s| s.has(SCREEN_OUTPUT)),
            },
            None => SurfaceInfo::default(),
        }
    }

    /// Status reported by a helper intent argument (`SIGN_IN`, `NEW_SURFACE`).
    pub fn helper_status(&self, argument: &str) -> Option<HelperStatus> {
        self.payload()?
            .inputs
            .iter()
            .flat_map(|i| i.arguments.iter())
            .find(|a| a.name == argument)
            .and_then(|a| a.extension.as_ref())
            .and_then(|ext| ext.get("status"))
            .and_then(|s| s.as_str())
            .map(HelperStatus::from_platform)
    }

    pub fn api_key(&self) -> Option<String> {
        self.query_result
            .parameters
            .get("APIKEY")
            .and_then(|v| v.as_str())
            .map(String::from)
    }

    /// Session data from the platform context, or a fresh session.
    pub fn session_data(&self) -> SessionData {
        let suffix = format!("/contexts/{}", SESSION_CONTEXT);
        let Some(ctx) = self
            .query_result
            .output_contexts
            .iter()
            .find(|c| c.name.ends_with(&suffix))
        else {
            return SessionData::default();
        };

        let Some(raw) = ctx.parameters.get("data").and_then(|d| d.as_str()) else {
            return SessionData::default();
        };
        match serde_json::from_str(raw) {
            Ok(data) => data,
            Err(e) => {
                warn!("Discarding undecodable session data: {}", e);
                SessionData::default()
            }
        }
    }
}

fn system_intent(kind: &ReplyKind) -> Option<Value> {
    match kind {
        ReplyKind::Close | ReplyKind::Ask => None,
        ReplyKind::SignIn { context } => Some(json!({
            "intent": "actions.intent.SIGN_IN",
            "data": {
                "@type": "type.googleapis.com/google.actions.v2.SignInValueSpec",
                "optContext": context,
            }
        })),
        ReplyKind::NewSurface {
            context,
            notification,
            capabilities,
        } => Some(json!({
            "intent": "actions.intent.NEW_SURFACE",
            "data": {
                "@type": "type.googleapis.com/google.actions.v2.NewSurfaceValueSpec",
                "context": context,
                "notificationTitle": notification,
                "capabilities": capabilities,
            }
        })),
    }
}

/// Encode a reply and the session to carry into the next turn.
pub fn webhook_response(session_path: &str, reply: &Reply, session: &SessionData) -> Value {
    let mut speech: Vec<&str> = reply.speech.iter().map(String::as_str).collect();
    if speech.is_empty() {
        speech.push(HELPER_PLACEHOLDER);
    }
    let items: Vec<Value> = speech
        .iter()
        .map(|text| json!({ "simpleResponse": { "textToSpeech": text } }))
        .collect();

    let mut google = json!({
        "expectUserResponse": reply.expects_user_response(),
        "richResponse": { "items": items },
    });
    if let Some(intent) = system_intent(&reply.kind) {
        google["systemIntent"] = intent;
    }

    let data = serde_json::to_string(session).unwrap_or_else(|_| "{}".to_string());
    json!({
        "payload": { "google": google },
        "outputContexts": [{
            "name": format!("{}/contexts/{}", session_path, SESSION_CONTEXT),
            "lifespanCount": SESSION_LIFESPAN,
            "parameters": { "data": data },
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use togglgo_core::types::{FlowState, PendingAction};

    const SESSION: &str = "projects/togglgo/agent/sessions/abc";

    fn request(value: Value) -> WebhookRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_decode_start_request() {
        let req = request(json!({
            "responseId": "r1",
            "session": SESSION,
            "queryResult": {
                "queryText": "start a timer",
                "languageCode": "en",
                "parameters": {},
                "intent": { "displayName": "Start timer" },
            },
            "originalDetectIntentRequest": {
                "source": "google",
                "payload": {
                    "user": { "locale": "fr-FR", "idToken": "a.b.c" },
                    "surface": { "capabilities": [
                        { "name": "actions.capability.AUDIO_OUTPUT" },
                        { "name": "actions.capability.SCREEN_OUTPUT" }
                    ]},
                    "availableSurfaces": [],
                }
            }
        }));

        assert_eq!(req.intent_name(), "Start timer");
        assert_eq!(req.locale(), "fr-FR");
        assert_eq!(req.id_token(), Some("a.b.c"));
        assert_eq!(
            req.surface_info(),
            SurfaceInfo {
                has_screen: true,
                screen_available: false
            }
        );
        assert_eq!(req.session_data(), SessionData::default());
    }

    #[test]
    fn test_locale_falls_back_to_language_code() {
        let req = request(json!({
            "queryResult": { "languageCode": "fr", "intent": { "displayName": "Stop timer" } }
        }));
        assert_eq!(req.locale(), "fr");

        let req = request(json!({ "queryResult": {} }));
        assert_eq!(req.locale(), "en");
        assert_eq!(req.intent_name(), "");
    }

    #[test]
    fn test_helper_status_and_api_key() {
        let req = request(json!({
            "queryResult": {
                "parameters": { "APIKEY": "1971800d4d82861d8f2c1651fea4d212" },
                "intent": { "displayName": "Sign in" },
            },
            "originalDetectIntentRequest": { "payload": {
                "inputs": [{
                    "intent": "actions.intent.SIGN_IN",
                    "arguments": [{ "name": "SIGN_IN", "extension": {
                        "@type": "type.googleapis.com/google.actions.v2.SignInValue",
                        "status": "CANCELLED"
                    }}]
                }],
                "availableSurfaces": [{ "capabilities": [{ "name": "actions.capability.SCREEN_OUTPUT" }] }]
            }}
        }));

        assert_eq!(req.helper_status("SIGN_IN"), Some(HelperStatus::Declined));
        assert_eq!(req.helper_status("NEW_SURFACE"), None);
        assert_eq!(req.api_key().as_deref(), Some("1971800d4d82861d8f2c1651fea4d212"));
        assert!(req.surface_info().screen_available);
    }

    #[test]
    fn test_session_data_from_context() {
        let session = SessionData {
            apikey: None,
            flow: FlowState::AwaitingApiKey(Some(PendingAction::Start)),
        };
        let req = request(json!({
            "session": SESSION,
            "queryResult": { "outputContexts": [
                { "name": format!("{}/contexts/other", SESSION), "parameters": {} },
                {
                    "name": format!("{}/contexts/_actions_on_google", SESSION),
                    "lifespanCount": 98,
                    "parameters": { "data": serde_json::to_string(&session).unwrap() }
                }
            ]}
        }));
        assert_eq!(req.session_data(), session);
    }

    #[test]
    fn test_garbled_session_data_is_reset() {
        let req = request(json!({
            "queryResult": { "outputContexts": [{
                "name": format!("{}/contexts/_actions_on_google", SESSION),
                "parameters": { "data": "{not json" }
            }]}
        }));
        assert_eq!(req.session_data(), SessionData::default());
    }

    #[test]
    fn test_close_response() {
        let reply = Reply::close("I started the timer").preceded_by("Great, let me save that");
        let out = webhook_response(SESSION, &reply, &SessionData::default());

        let google = &out["payload"]["google"];
        assert_eq!(google["expectUserResponse"], false);
        assert_eq!(google["richResponse"]["items"].as_array().unwrap().len(), 2);
        assert_eq!(
            google["richResponse"]["items"][1]["simpleResponse"]["textToSpeech"],
            "I started the timer"
        );
        assert!(google.get("systemIntent").is_none());
        assert_eq!(
            out["outputContexts"][0]["name"],
            format!("{}/contexts/_actions_on_google", SESSION)
        );
    }

    #[test]
    fn test_sign_in_response() {
        let session = SessionData {
            apikey: None,
            flow: FlowState::AwaitingSignIn(Some(PendingAction::Stop)),
        };
        let out = webhook_response(SESSION, &Reply::sign_in("In order to save your key"), &session);

        let google = &out["payload"]["google"];
        assert_eq!(google["expectUserResponse"], true);
        assert_eq!(google["systemIntent"]["intent"], "actions.intent.SIGN_IN");
        assert_eq!(
            google["systemIntent"]["data"]["optContext"],
            "In order to save your key"
        );
        assert_eq!(
            google["richResponse"]["items"][0]["simpleResponse"]["textToSpeech"],
            "PLACEHOLDER"
        );

        let data = out["outputContexts"][0]["parameters"]["data"].as_str().unwrap();
        let back: SessionData = serde_json::from_str(data).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_new_surface_response() {
        let out = webhook_response(
            SESSION,
            &Reply::new_surface("context", "notification"),
            &SessionData::default(),
        );
        let intent = &out["payload"]["google"]["systemIntent"];
        assert_eq!(intent["intent"], "actions.intent.NEW_SURFACE");
        assert_eq!(intent["data"]["notificationTitle"], "notification");
        assert_eq!(intent["data"]["capabilities"][0], SCREEN_OUTPUT);
    }
}
