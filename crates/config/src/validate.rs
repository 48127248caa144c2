//! Semantic checks on a parsed configuration.
//!
//! Syntax and unknown keys are caught while parsing; this pass looks at
//! values that parse fine but cannot work together.

use secrecy::ExposeSecret;

use crate::schema::CourierConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. `polling.timeout_secs`.
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}: {}", self.severity, self.path, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Error, path, message);
    }

    fn warning(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Warning, path, message);
    }

    fn push(&mut self, severity: Severity, path: impl Into<String>, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Check `config` and return every finding; nothing short-circuits.
#[must_use]
pub fn validate(config: &CourierConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    match &config.token {
        None => result.error("token", "no bot token configured (set `token` or COURIER_TOKEN)"),
        Some(token) if token.expose_secret().trim().is_empty() => {
            result.error("token", "bot token is empty");
        },
        Some(token) if token.expose_secret().contains("${") => {
            result.error("token", "bot token contains an unresolved ${...} placeholder");
        },
        Some(_) => {},
    }

    if url::Url::parse(&config.api_url).is_err() {
        result.error("api_url", format!("{:?} is not a valid URL", config.api_url));
    }

    if config.polling.is_some() && config.webhook.is_some() {
        result.error(
            "webhook",
            "both [polling] and [webhook] are configured; keep only one",
        );
    }

    if config.dispatch.workers == Some(0) {
        result.error("dispatch.workers", "must be at least 1");
    }
    if config.dispatch.queue_capacity == 0 {
        result.error("dispatch.queue_capacity", "must be at least 1");
    }

    if let Some(polling) = &config.polling {
        if polling.timeout_secs >= config.request_timeout_secs {
            result.error(
                "polling.timeout_secs",
                format!(
                    "long-poll timeout ({}s) must be shorter than request_timeout_secs ({}s)",
                    polling.timeout_secs, config.request_timeout_secs
                ),
            );
        }
        if !(1..=100).contains(&polling.limit) {
            result.error("polling.limit", "must be between 1 and 100");
        }
    }

    if let Some(webhook) = &config.webhook {
        match url::Url::parse(&webhook.url) {
            Ok(url) if url.scheme() == "https" => {},
            Ok(_) => result.warning(
                "webhook.url",
                "the Bot API only delivers to https URLs; use http only behind a TLS proxy",
            ),
            Err(e) => result.error("webhook.url", format!("{:?}: {e}", webhook.url)),
        }
        if webhook.secret_token.is_none() {
            result.warning(
                "webhook.secret_token",
                "without a secret token anyone who finds the URL can inject updates",
            );
        }
        if let Some(path) = &webhook.certificate_path
            && !path.exists()
        {
            result.error(
                "webhook.certificate_path",
                format!("{} does not exist", path.display()),
            );
        }
        if let Some(max) = webhook.max_connections
            && !(1..=100).contains(&max)
        {
            result.error("webhook.max_connections", "must be between 1 and 100");
        }
    }

    for (i, command) in config.commands.iter().enumerate() {
        if command.description.is_none() && command.locales.is_empty() {
            result.error(
                format!("commands[{i}]"),
                format!("command {:?} needs a description or locales", command.name),
            );
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::schema::{PollingConfig, WebhookConfig},
        secrecy::Secret,
    };

    fn valid() -> CourierConfig {
        CourierConfig {
            token: Some(Secret::new("123:abc".to_string())),
            ..CourierConfig::default()
        }
    }

    fn webhook(url: &str) -> WebhookConfig {
        toml::from_str(&format!("url = {url:?}\nsecret_token = \"s\"")).unwrap()
    }

    fn error_paths(result: &ValidationResult) -> Vec<&str> {
        result.errors().map(|d| d.path.as_str()).collect()
    }

    #[test]
    fn defaults_with_a_token_are_valid() {
        let result = validate(&valid());
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
    }

    #[test]
    fn missing_token_is_an_error() {
        let result = validate(&CourierConfig::default());
        assert_eq!(error_paths(&result), vec!["token"]);
    }

    #[test]
    fn every_problem_is_reported() {
        let mut config = valid();
        config.polling = Some(PollingConfig {
            timeout_secs: 60,
            ..PollingConfig::default()
        });
        config.webhook = Some(webhook("https://bot.example.com"));
        config.dispatch.workers = Some(0);

        let result = validate(&config);
        assert_eq!(error_paths(&result), vec![
            "webhook",
            "dispatch.workers",
            "polling.timeout_secs",
        ]);
    }

    #[test]
    fn plain_http_webhook_is_only_a_warning() {
        let mut config = valid();
        config.webhook = Some(webhook("http://bot.internal:8080"));
        let result = validate(&config);
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);
    }

    #[test]
    fn unresolved_placeholder_in_token_is_caught() {
        let config = CourierConfig {
            token: Some(Secret::new("${COURIER_TOKEN}".to_string())),
            ..CourierConfig::default()
        };
        let result = validate(&config);
        assert!(result.diagnostics[0].message.contains("placeholder"));
    }
}
