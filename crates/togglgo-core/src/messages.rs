//! Localized reply strings, keyed by two-letter locale and message key.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKey {
    StartOk,
    StartError,
    StartNoWid,
    StopOk,
    StopError,
    StopNoTimer,
    ContextSignIn,
    SignInRefused,
    NoScreen,
    HasScreenNotification,
    HasScreenContext,
    HasScreenSwitchSuccesful,
    HasScreenSwitchFailed,
    OnScreen,
    ApiKeyGiven,
    UnknownIntent,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("unsupported locale: {0:?}")]
    UnsupportedLocale(String),
    #[error("no {key:?} message for locale {locale:?}")]
    MissingMessage { locale: String, key: MessageKey },
}

const EN: &[(MessageKey, &str)] = &[
    (MessageKey::StartOk, "I started the timer"),
    (MessageKey::StartError, "Oops, I couldn't start the timer"),
    (MessageKey::StartNoWid, "I failed starting the timer"),
    (MessageKey::StopOk, "I stopped the timer"),
    (MessageKey::StopError, "I couldn't stop the timer"),
    (MessageKey::StopNoTimer, "There is no timer actually running"),
    (MessageKey::ContextSignIn, "In order to save your key"),
    (MessageKey::SignInRefused, "Ok, let's do it next time"),
    (MessageKey::NoScreen, "You need a screen device to enter your API key"),
    (
        MessageKey::HasScreenNotification,
        "Enter your Toggl API key in order to start or stop a timer",
    ),
    (
        MessageKey::HasScreenContext,
        "Now your Toggl API key is needed to complete your account configuration",
    ),
    (MessageKey::HasScreenSwitchSuccesful, "Please enter your Toggl API key"),
    (
        MessageKey::HasScreenSwitchFailed,
        "You need a screen device to enter your API key, once your account configuration is over, you can use Toggl Go with your voice",
    ),
    (
        MessageKey::OnScreen,
        "Now your Toggl API key is needed to complete your account configuration",
    ),
    (MessageKey::ApiKeyGiven, "Great, let me save that"),
    (
        MessageKey::UnknownIntent,
        "Sorry, I can only start or stop a timer",
    ),
];

const FR: &[(MessageKey, &str)] = &[
    (MessageKey::StartOk, "Je viens de lancer le timer"),
    (MessageKey::StartError, "Oups, je n'ai pas pu lancer le timer"),
    (MessageKey::StartNoWid, "Je n'ai pas réussi à lancer le timer"),
    (MessageKey::StopOk, "Je viens d'arrêter le timer"),
    (MessageKey::StopError, "Oups, je n'ai pas pu arrêter le timer"),
    (MessageKey::StopNoTimer, "Il me semble qu'aucun timer n'est en cours"),
    (MessageKey::ContextSignIn, "Pour stocker votre clé API Toggl"),
    (MessageKey::SignInRefused, "Très bien, faisons cela une prochaine fois."),
    (
        MessageKey::NoScreen,
        "Il faut un appareil avec écran pour entrer votre clé API Toggl",
    ),
    (
        MessageKey::HasScreenNotification,
        "Ecrivez votre clé API Toggl pour pouvoir lancer ou arrêter un timer",
    ),
    (
        MessageKey::HasScreenContext,
        "Maintenant, j'ai besoin de votre clé API Toggl afin de finir la configuration de votre compte",
    ),
    (
        MessageKey::HasScreenSwitchSuccesful,
        "Merci d'entrer votre clé API Toggl pour lancer ou arrêter un timer",
    ),
    (
        MessageKey::HasScreenSwitchFailed,
        "Il faut un appareil avec écran pour entrer votre clé API Toggl, une fois votre compte configuré vous n'aurez plus besoin d'un appareil avec écran",
    ),
    (
        MessageKey::OnScreen,
        "Maintenant, j'ai besoin de votre clé API Toggl afin de finir la configuration de votre compte",
    ),
    (MessageKey::ApiKeyGiven, "Super, je sauvegarde votre clé Toggl"),
    (
        MessageKey::UnknownIntent,
        "Désolé, je sais seulement lancer ou arrêter un timer",
    ),
];

/// Reduce a platform locale tag (`en-US`, `fr_FR`) to the table key (`en`, `fr`).
pub fn language_of(locale: &str) -> String {
    locale.chars().take(2).collect::<String>().to_lowercase()
}

/// Immutable locale table, built once at startup.
#[derive(Debug, Clone)]
pub struct Messages {
    tables: HashMap<String, HashMap<MessageKey, String>>,
}

impl Messages {
    /// The built-in English and French tables.
    pub fn builtin() -> Self {
        let mut tables = HashMap::new();
        for (lang, entries) in [("en", EN), ("fr", FR)] {
            let table = entries
                .iter()
                .map(|(k, v)| (*k, v.to_string()))
                .collect::<HashMap<_, _>>();
            tables.insert(lang.to_string(), table);
        }
        Self { tables }
    }

    /// Built-in tables overlaid with a YAML file of the form
    /// `{ de: { START_OK: "..." , ... }, en: { ... } }`.
    pub fn load_with_overrides(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read messages: {}", path.display()))?;
        let overrides: HashMap<String, HashMap<MessageKey, String>> =
            serde_yaml::from_str(&content).context("Failed to parse messages file")?;

        let mut messages = Self::builtin();
        for (lang, entries) in overrides {
            messages
                .tables
                .entry(language_of(&lang))
                .or_default()
                .extend(entries);
        }
        Ok(messages)
    }

    pub fn supports(&self, lang: &str) -> bool {
        self.tables.contains_key(lang)
    }

    pub fn languages(&self) -> Vec<&str> {
        let mut langs: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        langs.sort();
        langs
    }

    pub fn get(&self, lang: &str, key: MessageKey) -> Result<&str, MessageError> {
        let table = self
            .tables
            .get(lang)
            .ok_or_else(|| MessageError::UnsupportedLocale(lang.to_string()))?;
        table
            .get(&key)
            .map(String::as_str)
            .ok_or_else(|| MessageError::MissingMessage {
                locale: lang.to_string(),
                key,
            })
    }
}

impl Default for Messages {
    fn default() -> Self {
        Self::builtin()
    }
}
