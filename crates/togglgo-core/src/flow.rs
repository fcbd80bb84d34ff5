//! Conversation flow: intent dispatch and the sign-in / API key state machine.
//!
//! Every turn resolves the user's locale, runs one intent handler and
//! produces exactly one `Reply` together with the session to hand back to
//! the platform. Upstream failures never escape a handler: they are logged
//! and turned into a closing message.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::credentials::Credentials;
use crate::messages::{language_of, MessageError, MessageKey, Messages};
use crate::timer_api::TimerApi;
use crate::types::*;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("unsupported locale: {0:?}")]
    UnsupportedLocale(String),
    #[error(transparent)]
    Message(#[from] MessageError),
}

#[derive(Debug, Clone, Default)]
pub struct FlowOptions {
    /// Language used when the user's own has no table.
    pub fallback_locale: Option<String>,
    /// Report a failed current-entry lookup as a stop failure rather than
    /// as "no timer running".
    pub distinguish_current_entry_errors: bool,
}

impl FlowOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fallback_locale: config.fallback_locale.as_deref().map(language_of),
            distinguish_current_entry_errors: config.distinguish_current_entry_errors,
        }
    }
}

/// Mutable state of the turn being handled.
struct TurnContext {
    lang: String,
    user_id: Option<String>,
    session: SessionData,
}

/// The fulfillment logic, shared by all requests.
pub struct Conversation {
    timer_api: Arc<dyn TimerApi>,
    credentials: Credentials,
    messages: Arc<Messages>,
    options: FlowOptions,
}

impl Conversation {
    pub fn new(
        timer_api: Arc<dyn TimerApi>,
        credentials: Credentials,
        messages: Arc<Messages>,
        options: FlowOptions,
    ) -> Self {
        Self {
            timer_api,
            credentials,
            messages,
            options,
        }
    }

    /// Handle one turn for a recognized intent.
    pub async fn handle(&self, turn: Turn) -> Result<TurnOutcome, FlowError> {
        let mut ctx = TurnContext {
            lang: self.resolve_language(&turn.locale)?,
            user_id: turn.user_id,
            session: turn.session,
        };
        let before = ctx.session.flow;

        let reply = match turn.intent {
            Intent::StartTimer => self.start_timer(&mut ctx).await?,
            Intent::StopTimer => self.stop_timer(&mut ctx).await?,
            Intent::SignIn => self.sign_in(&mut ctx, turn.sign_in, turn.surface)?,
            Intent::SignInSwitch => self.screen_handoff(&mut ctx, turn.new_surface)?,
            Intent::ApiKey => self.api_key(&mut ctx, turn.api_key).await?,
        };

        info!(
            "[{}] lang={} {:?} -> {:?} reply={}",
            turn.intent,
            ctx.lang,
            before,
            ctx.session.flow,
            reply.kind_label()
        );
        Ok(TurnOutcome {
            reply,
            session: ctx.session,
        })
    }

    /// Close politely for an intent this handler does not serve.
    pub fn unknown_intent(
        &self,
        intent_name: &str,
        locale: &str,
        session: SessionData,
    ) -> Result<TurnOutcome, FlowError> {
        let lang = self.resolve_language(locale)?;
        warn!("No handler for intent {:?}", intent_name);
        Ok(TurnOutcome {
            reply: Reply::close(self.say(&lang, MessageKey::UnknownIntent)?),
            session,
        })
    }

    // ── Localization ──

    fn resolve_language(&self, locale: &str) -> Result<String, FlowError> {
        let lang = language_of(locale);
        if self.messages.supports(&lang) {
            return Ok(lang);
        }
        match self.options.fallback_locale {
            Some(ref fallback) if self.messages.supports(fallback) => {
                warn!("No messages for locale {:?}, using {:?}", locale, fallback);
                Ok(fallback.clone())
            }
            _ => Err(FlowError::UnsupportedLocale(locale.to_string())),
        }
    }

    fn say(&self, lang: &str, key: MessageKey) -> Result<String, FlowError> {
        match self.messages.get(lang, key) {
            Ok(text) => Ok(text.to_string()),
            Err(MessageError::MissingMessage { .. }) => match self.options.fallback_locale {
                Some(ref fallback) if fallback != lang => {
                    Ok(self.messages.get(fallback, key)?.to_string())
                }
                _ => Err(MessageError::MissingMessage {
                    locale: lang.to_string(),
                    key,
                }
                .into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    // ── Credentials ──

    /// Session cache first, then the store. Failures look like "not configured".
    async fn resolve_credential(&self, ctx: &mut TurnContext) -> Option<String> {
        if let Some(ref key) = ctx.session.apikey {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }
        let user_id = ctx.user_id.as_deref()?;
        let secret = self.credentials.get(user_id).await.into_secret()?;
        ctx.session.apikey = Some(secret.clone());
        Some(secret)
    }

    fn request_sign_in(
        &self,
        ctx: &mut TurnContext,
        pending: Option<PendingAction>,
    ) -> Result<Reply, FlowError> {
        ctx.session.flow = FlowState::AwaitingSignIn(pending);
        Ok(Reply::sign_in(self.say(&ctx.lang, MessageKey::ContextSignIn)?))
    }

    // ── Intent handlers ──

    async fn start_timer(&self, ctx: &mut TurnContext) -> Result<Reply, FlowError> {
        let Some(token) = self.resolve_credential(ctx).await else {
            return self.request_sign_in(ctx, Some(PendingAction::Start));
        };
        ctx.session.flow = FlowState::Idle;

        let profile = match self.timer_api.profile(&token).await {
            Ok(p) => p,
            Err(e) => {
                warn!("Start aborted: {}", e);
                return Ok(Reply::close(self.say(&ctx.lang, MessageKey::StartNoWid)?));
            }
        };

        let key = match self
            .timer_api
            .start_timer(&token, profile.default_workspace_id)
            .await
        {
            Ok(_) => MessageKey::StartOk,
            Err(e) => {
                warn!("Start failed: {}", e);
                MessageKey::StartError
            }
        };
        Ok(Reply::close(self.say(&ctx.lang, key)?))
    }

    async fn stop_timer(&self, ctx: &mut TurnContext) -> Result<Reply, FlowError> {
        let Some(token) = self.resolve_credential(ctx).await else {
            return self.request_sign_in(ctx, Some(PendingAction::Stop));
        };
        ctx.session.flow = FlowState::Idle;

        let entry = match self.timer_api.current_entry(&token).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                return Ok(Reply::close(self.say(&ctx.lang, MessageKey::StopNoTimer)?));
            }
            Err(e) => {
                warn!("Stop aborted: {}", e);
                let key = if self.options.distinguish_current_entry_errors {
                    MessageKey::StopError
                } else {
                    MessageKey::StopNoTimer
                };
                return Ok(Reply::close(self.say(&ctx.lang, key)?));
            }
        };

        let key = match self.timer_api.stop_timer(&token, entry.id).await {
            Ok(()) => MessageKey::StopOk,
            Err(e) => {
                warn!("Stop failed: {}", e);
                MessageKey::StopError
            }
        };
        Ok(Reply::close(self.say(&ctx.lang, key)?))
    }

    fn sign_in(
        &self,
        ctx: &mut TurnContext,
        status: Option<HelperStatus>,
        surface: SurfaceInfo,
    ) -> Result<Reply, FlowError> {
        let pending = ctx.session.flow.pending_action();

        if status != Some(HelperStatus::Ok) {
            ctx.session.flow = FlowState::Idle;
            return Ok(Reply::close(self.say(&ctx.lang, MessageKey::SignInRefused)?));
        }

        if surface.has_screen {
            ctx.session.flow = FlowState::AwaitingApiKey(pending);
            Ok(Reply::ask(self.say(&ctx.lang, MessageKey::OnScreen)?))
        } else if surface.screen_available {
            ctx.session.flow = FlowState::AwaitingScreenHandoff(pending);
            Ok(Reply::new_surface(
                self.say(&ctx.lang, MessageKey::HasScreenContext)?,
                self.say(&ctx.lang, MessageKey::HasScreenNotification)?,
            ))
        } else {
            ctx.session.flow = FlowState::Idle;
            Ok(Reply::close(self.say(&ctx.lang, MessageKey::NoScreen)?))
        }
    }

    fn screen_handoff(
        &self,
        ctx: &mut TurnContext,
        status: Option<HelperStatus>,
    ) -> Result<Reply, FlowError> {
        let pending = ctx.session.flow.pending_action();

        if status == Some(HelperStatus::Ok) {
            ctx.session.flow = FlowState::AwaitingApiKey(pending);
            Ok(Reply::ask(
                self.say(&ctx.lang, MessageKey::HasScreenSwitchSuccesful)?,
            ))
        } else {
            ctx.session.flow = FlowState::Idle;
            Ok(Reply::close(
                self.say(&ctx.lang, MessageKey::HasScreenSwitchFailed)?,
            ))
        }
    }

    async fn api_key(
        &self,
        ctx: &mut TurnContext,
        api_key: Option<String>,
    ) -> Result<Reply, FlowError> {
        let pending = ctx.session.flow.pending_action();

        let Some(key) = api_key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) else {
            ctx.session.flow = FlowState::AwaitingApiKey(pending);
            return Ok(Reply::ask(self.say(&ctx.lang, MessageKey::OnScreen)?));
        };
        let Some(user_id) = ctx.user_id.clone() else {
            return self.request_sign_in(ctx, pending);
        };

        self.credentials.set(&user_id, &key).await;
        ctx.session.apikey = Some(key);
        ctx.session.flow = FlowState::Idle;
        let ack = self.say(&ctx.lang, MessageKey::ApiKeyGiven)?;

        let reply = match pending {
            Some(PendingAction::Start) => self.start_timer(ctx).await?.preceded_by(ack),
            Some(PendingAction::Stop) => self.stop_timer(ctx).await?.preceded_by(ack),
            None => Reply::ask(ack),
        };
        Ok(reply)
    }
}
