//! Configuration schema for the `courier` binary.
//!
//! Every section is optional in the file; missing values fall back to the
//! defaults below. Unknown keys are rejected so typos surface at load time.

use std::{collections::BTreeMap, net::SocketAddr, path::PathBuf, time::Duration};

use {courier_api::BotCommandScope, secrecy::Secret, serde::Deserialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Bot token. May also come from `--token` / `COURIER_TOKEN`.
    #[serde(default)]
    pub token: Option<Secret<String>>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// HTTP timeout per Bot API call. Must exceed the long-poll timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    pub polling: Option<PollingConfig>,
    pub webhook: Option<WebhookConfig>,
    #[serde(default)]
    pub commands: Vec<CommandConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout_secs(),
            dispatch: DispatchConfig::default(),
            polling: None,
            webhook: None,
            commands: Vec::new(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl CourierConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Polling settings in effect: the configured ones, or the defaults when
    /// no webhook is configured either.
    pub fn effective_polling(&self) -> Option<PollingConfig> {
        match (&self.polling, &self.webhook) {
            (Some(polling), _) => Some(polling.clone()),
            (None, None) => Some(PollingConfig::default()),
            (None, Some(_)) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Worker tasks; defaults to the number of cores.
    pub workers: Option<usize>,
    pub queue_capacity: usize,
    /// Call `close` on shutdown.
    pub close_on_shutdown: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: None,
            queue_capacity: 100,
            close_on_shutdown: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollingConfig {
    pub limit: u32,
    pub timeout_secs: u64,
    pub idle_delay_ms: u64,
    pub clear_webhook: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            timeout_secs: 30,
            idle_delay_ms: 1000,
            clear_webhook: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Public base URL, e.g. `https://bot.example.com:8443`.
    pub url: String,
    #[serde(default = "default_webhook_path")]
    pub path: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    pub secret_token: Option<Secret<String>>,
    /// PEM certificate uploaded with the registration (self-signed setups).
    pub certificate_path: Option<PathBuf>,
    pub ip_address: Option<String>,
    pub max_connections: Option<u32>,
    #[serde(default)]
    pub drop_pending_updates: bool,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

/// A command published in the menu and answered with a fixed reply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandConfig {
    pub name: String,
    /// Description for the unlocalized menu.
    pub description: Option<String>,
    /// Per-locale descriptions, keyed by two-letter language code.
    #[serde(default)]
    pub locales: BTreeMap<String, String>,
    /// Scopes to publish in; the default scope when empty.
    #[serde(default)]
    pub scopes: Vec<BotCommandScope>,
    /// Text sent back when the command is used.
    pub reply: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Serve Prometheus text on `GET /metrics` at this address.
    pub listen_addr: Option<SocketAddr>,
}

fn default_api_url() -> String {
    courier_api::DEFAULT_API_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    45
}

fn default_webhook_path() -> String {
    "/".to_string()
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8443))
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn empty_file_uses_defaults() {
        let config: CourierConfig = toml::from_str("").unwrap();
        assert!(config.token.is_none());
        assert_eq!(config.api_url, "https://api.telegram.org");
        assert_eq!(config.request_timeout_secs, 45);
        assert_eq!(config.dispatch, DispatchConfig::default());
        assert_eq!(config.effective_polling(), Some(PollingConfig::default()));
    }

    #[test]
    fn parses_a_webhook_setup() {
        let config: CourierConfig = toml::from_str(
            r#"
            token = "123:abc"

            [dispatch]
            workers = 4

            [webhook]
            url = "https://bot.example.com"
            path = "hook"
            secret_token = "s3cret"

            [[commands]]
            name = "start"
            description = "begin"
            locales = { de = "starten" }
            scopes = [{ type = "all_private_chats" }, { type = "chat", chat_id = -100 }]
            reply = "hello"
            "#,
        )
        .unwrap();

        assert_eq!(config.token.as_ref().map(|t| t.expose_secret().as_str()), Some("123:abc"));
        assert_eq!(config.dispatch.workers, Some(4));
        assert_eq!(config.dispatch.queue_capacity, 100);
        assert!(config.effective_polling().is_none());

        let webhook = config.webhook.unwrap();
        assert_eq!(webhook.listen_addr, default_listen_addr());
        assert_eq!(webhook.shutdown_grace_secs, 30);
        assert!(format!("{webhook:?}").contains("REDACTED"));

        let command = &config.commands[0];
        assert_eq!(command.locales.get("de").map(String::as_str), Some("starten"));
        assert_eq!(command.scopes, vec![
            BotCommandScope::AllPrivateChats,
            BotCommandScope::Chat {
                chat_id: courier_api::ChatTarget::Id(-100)
            },
        ]);
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = toml::from_str::<CourierConfig>("[polling]\nlimt = 5\n").unwrap_err();
        assert!(err.to_string().contains("limt"), "{err}");
    }
}
