// ABOUTME: Assistant and storage settings resolved from the environment
// ABOUTME: Missing variables fall back to defaults; invalid values are rejected

use std::env;
use std::time::Duration;

use formpilot_protocol::ApplyPolicy;
use tracing::{debug, info};

use crate::constants::*;
use crate::validation::{
    validate_float, validate_integer, validate_url, Result, ValidationError,
};

/// Settings needed to talk to the model and persist forms
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantSettings {
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub apply_policy: ApplyPolicy,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub database_url: String,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            apply_policy: ApplyPolicy::default(),
            request_timeout: Duration::from_secs(DEFAULT_HTTP_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_HTTP_CONNECT_TIMEOUT_SECS),
            database_url: DEFAULT_DATABASE_URL.to_string(),
        }
    }
}

impl AssistantSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve settings through an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        settings.api_key = get(ANTHROPIC_API_KEY);
        if settings.api_key.is_none() {
            info!("{} not set - assistant requests will fail until a key is provided", ANTHROPIC_API_KEY);
        }

        if let Some(url) = get(FORMPILOT_API_URL) {
            validate_url(FORMPILOT_API_URL, &url)?;
            settings.api_url = url.trim_end_matches('/').to_string();
        }

        if let Some(model) = get(ANTHROPIC_MODEL) {
            info!("Using custom Anthropic model: {}", model);
            settings.model = model;
        }

        if let Some(value) = get(FORMPILOT_MAX_TOKENS) {
            let tokens = validate_integer(FORMPILOT_MAX_TOKENS, &value, Some(1), Some(64_000))?;
            settings.max_tokens = tokens as u32;
        }

        if let Some(value) = get(FORMPILOT_TEMPERATURE) {
            settings.temperature = validate_float(FORMPILOT_TEMPERATURE, &value, 0.0, 1.0)?;
        }

        if let Some(value) = get(FORMPILOT_APPLY_POLICY) {
            settings.apply_policy = value.parse().map_err(|_| {
                let allowed: Vec<&str> = ApplyPolicy::ALL.iter().map(|p| p.as_str()).collect();
                ValidationError::InvalidEnum(
                    FORMPILOT_APPLY_POLICY.to_string(),
                    value.clone(),
                    allowed.join(", "),
                )
            })?;
        }

        if let Some(value) = get(FORMPILOT_HTTP_REQUEST_TIMEOUT_SECS) {
            let secs = validate_integer(FORMPILOT_HTTP_REQUEST_TIMEOUT_SECS, &value, Some(1), Some(3600))?;
            settings.request_timeout = Duration::from_secs(secs);
        }

        if let Some(value) = get(FORMPILOT_HTTP_CONNECT_TIMEOUT_SECS) {
            let secs = validate_integer(FORMPILOT_HTTP_CONNECT_TIMEOUT_SECS, &value, Some(1), Some(300))?;
            settings.connect_timeout = Duration::from_secs(secs);
        }

        if let Some(url) = get(FORMPILOT_DATABASE_URL) {
            if !url.starts_with("sqlite:") {
                return Err(ValidationError::InvalidUrl(
                    FORMPILOT_DATABASE_URL.to_string(),
                    "Database URL must start with sqlite:".to_string(),
                ));
            }
            settings.database_url = url;
        }

        debug!(
            "Resolved assistant settings: model={}, max_tokens={}, policy={}",
            settings.model,
            settings.max_tokens,
            settings.apply_policy.as_str()
        );
        Ok(settings)
    }

    /// Endpoint of the Messages API
    pub fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.api_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let settings = AssistantSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, AssistantSettings::default());
        assert_eq!(settings.messages_url(), "https://api.anthropic.com/v1/messages");
    }

    #[test]
    fn test_overrides() {
        let settings = AssistantSettings::from_lookup(lookup(&[
            (ANTHROPIC_API_KEY, "sk-test"),
            (FORMPILOT_API_URL, "http://127.0.0.1:9000/"),
            (FORMPILOT_MAX_TOKENS, "2048"),
            (FORMPILOT_APPLY_POLICY, "EDITS_PREEMPT_ADDS"),
            (FORMPILOT_HTTP_REQUEST_TIMEOUT_SECS, "30"),
        ]))
        .unwrap();

        assert_eq!(settings.api_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.messages_url(), "http://127.0.0.1:9000/v1/messages");
        assert_eq!(settings.max_tokens, 2048);
        assert_eq!(settings.apply_policy, ApplyPolicy::EditsPreemptAdds);
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_default_policy_is_textual_order() {
        let settings = AssistantSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.apply_policy, ApplyPolicy::TextualOrder);

        let settings =
            AssistantSettings::from_lookup(lookup(&[(FORMPILOT_APPLY_POLICY, " legacy ")])).unwrap();
        assert_eq!(settings.apply_policy, ApplyPolicy::EditsPreemptAdds);
    }

    #[test]
    fn test_unknown_policy_lists_accepted_values() {
        assert_eq!(
            AssistantSettings::from_lookup(lookup(&[(FORMPILOT_APPLY_POLICY, "random")])),
            Err(ValidationError::InvalidEnum(
                FORMPILOT_APPLY_POLICY.to_string(),
                "random".to_string(),
                "textual_order, edits_preempt_adds".to_string()
            ))
        );
    }

    #[test]
    fn test_blank_values_are_unset() {
        let settings =
            AssistantSettings::from_lookup(lookup(&[(ANTHROPIC_API_KEY, "  ")])).unwrap();
        assert_eq!(settings.api_key, None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            AssistantSettings::from_lookup(lookup(&[(FORMPILOT_MAX_TOKENS, "0")])),
            Err(ValidationError::InvalidInteger(..))
        ));
        assert!(matches!(
            AssistantSettings::from_lookup(lookup(&[(FORMPILOT_APPLY_POLICY, "random")])),
            Err(ValidationError::InvalidEnum(..))
        ));
        assert!(matches!(
            AssistantSettings::from_lookup(lookup(&[(FORMPILOT_DATABASE_URL, "postgres://x")])),
            Err(ValidationError::InvalidUrl(..))
        ));
    }
}
