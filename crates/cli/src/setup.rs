//! Turning a loaded [`CourierConfig`] into a client and a dispatcher.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use {
    anyhow::{Context as _, bail},
    courier_api::{InputFile, ScopeKey},
    courier_client::Client,
    courier_config::{CommandConfig, CourierConfig, PollingConfig, WebhookConfig},
    courier_dispatch::{
        BoxError, Context, Dispatcher, Handler, Polling, Webhook, handler_fn, middleware,
    },
    secrecy::{ExposeSecret, Secret},
    tracing::debug,
};

/// Config as loaded from disk, with CLI overrides applied.
pub struct Loaded {
    pub config: CourierConfig,
    pub path: Option<PathBuf>,
}

pub fn load(path: Option<&Path>, token: Option<String>) -> anyhow::Result<Loaded> {
    let (mut config, path) = match path {
        Some(path) => (courier_config::load_config(path)?, Some(path.to_path_buf())),
        None => courier_config::discover_and_load()?,
    };
    if let Some(token) = token {
        config.token = Some(Secret::new(token));
    }
    Ok(Loaded { config, path })
}

/// Validate and fail on errors; warnings are logged.
pub fn validated(loaded: Loaded) -> anyhow::Result<CourierConfig> {
    let (config, diagnostics) = loaded.config.validated()?;
    for diagnostic in diagnostics {
        tracing::warn!(path = %diagnostic.path, "{}", diagnostic.message);
    }
    Ok(config)
}

pub fn client(config: &CourierConfig) -> anyhow::Result<Client> {
    let Some(token) = &config.token else {
        bail!("no bot token configured");
    };
    Ok(Client::builder(token.expose_secret().clone())
        .api_url(&config.api_url)
        .timeout(config.request_timeout())
        .build()?)
}

pub fn dispatcher(config: &CourierConfig, client: Client) -> anyhow::Result<Dispatcher> {
    let mut builder = Dispatcher::builder(client)
        .queue_capacity(config.dispatch.queue_capacity)
        .close_on_shutdown(config.dispatch.close_on_shutdown)
        .middleware(middleware::logging())
        .middleware(middleware::recovery());

    if let Some(workers) = config.dispatch.workers {
        builder = builder.workers(workers);
    }
    if let Some(polling) = config.effective_polling() {
        builder = builder.polling(polling_source(&polling));
    }
    if let Some(webhook) = &config.webhook {
        builder = builder.webhook(webhook_source(webhook)?);
    }

    for command in &config.commands {
        let handler = reply_handler(command);
        let scopes: Vec<ScopeKey> = command.scopes.iter().cloned().map(ScopeKey::from).collect();
        if let Some(description) = &command.description {
            builder = builder.command(&command.name, description, handler.clone(), scopes.clone());
        }
        if !command.locales.is_empty() {
            builder = builder.localized_command(&command.name, &command.locales, handler, scopes);
        }
    }

    Ok(builder.build())
}

fn polling_source(config: &PollingConfig) -> Polling {
    Polling {
        limit: config.limit,
        timeout: Duration::from_secs(config.timeout_secs),
        idle_delay: Duration::from_millis(config.idle_delay_ms),
        clear_webhook: config.clear_webhook,
    }
}

fn webhook_source(config: &WebhookConfig) -> anyhow::Result<Webhook> {
    let certificate = match &config.certificate_path {
        Some(path) => {
            let data = std::fs::read(path)
                .with_context(|| format!("failed to read certificate {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "certificate.pem".to_string());
            Some(InputFile::upload(file_name, data))
        },
        None => None,
    };

    Ok(Webhook {
        path: config.path.clone(),
        secret_token: config.secret_token.clone(),
        certificate,
        ip_address: config.ip_address.clone(),
        max_connections: config.max_connections,
        drop_pending_updates: config.drop_pending_updates,
        shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
        ..Webhook::new(config.url.clone(), config.listen_addr)
    })
}

/// Answer the command with its configured text, if any.
fn reply_handler(command: &CommandConfig) -> Handler {
    let reply = command.reply.clone();
    handler_fn(move |ctx: Context| {
        let reply = reply.clone();
        async move {
            match reply {
                Some(text) => {
                    ctx.reply(text).await?;
                },
                None => debug!(
                    update_id = ctx.update_id(),
                    command = ctx.command().unwrap_or_default(),
                    "command has no configured reply"
                ),
            }
            Ok::<(), BoxError>(())
        }
    })
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        courier_api::{BotCommandScope, UpdateType},
        std::io::Write,
    };

    fn config(toml: &str) -> CourierConfig {
        toml::from_str(toml).unwrap()
    }

    fn offline_client() -> Client {
        Client::builder("1:T")
            .api_url("http://127.0.0.1:9")
            .build()
            .unwrap()
    }

    #[test]
    fn cli_token_overrides_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.toml");
        std::fs::write(&path, "token = \"1:file\"\n").unwrap();

        let loaded = load(Some(&path), Some("2:cli".to_string())).unwrap();
        assert_eq!(
            loaded.config.token.unwrap().expose_secret().as_str(),
            "2:cli"
        );
        assert_eq!(loaded.path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn validation_errors_are_fatal() {
        let loaded = Loaded {
            config: CourierConfig::default(),
            path: None,
        };
        let err = validated(loaded).err().unwrap();
        assert!(err.to_string().contains("token"), "{err}");
    }

    #[test]
    fn configured_commands_are_registered_in_every_scope_and_locale() {
        let config = config(
            r#"
            token = "1:T"

            [[commands]]
            name = "start"
            description = "begin"
            locales = { de = "beginnen" }
            scopes = [{ type = "all_private_chats" }]
            reply = "hi"

            [[commands]]
            name = "help"
            description = "usage"
            "#,
        );
        let dispatcher = dispatcher(&config, offline_client()).unwrap();
        let commands = dispatcher.commands();

        let private = ScopeKey::from(BotCommandScope::AllPrivateChats);
        assert_eq!(commands.get_commands(&private).len(), 1);
        assert_eq!(
            commands.get_commands(&private.clone().with_locale("de"))[0].description,
            "beginnen"
        );
        assert_eq!(commands.get_commands(&ScopeKey::default())[0].command, "help");
        assert_eq!(dispatcher.allowed_updates(), vec![UpdateType::Message]);
    }

    #[test]
    fn webhook_settings_carry_over() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("bot.pem");
        std::fs::File::create(&cert)
            .unwrap()
            .write_all(b"-----BEGIN CERTIFICATE-----")
            .unwrap();

        let webhook: WebhookConfig = toml::from_str(&format!(
            "url = \"https://bot.example.com\"\n\
             path = \"hook\"\n\
             secret_token = \"s3cret\"\n\
             certificate_path = {:?}\n\
             shutdown_grace_secs = 5\n",
            cert.display().to_string()
        ))
        .unwrap();
        let source = webhook_source(&webhook).unwrap();

        assert_eq!(source.webhook_url().unwrap(), "https://bot.example.com/hook");
        assert_eq!(source.shutdown_grace, Duration::from_secs(5));
        assert!(source.certificate.is_some_and(|c| c.is_upload()));
        assert!(source.secret_token.is_some());
    }

    #[test]
    fn missing_certificate_is_reported() {
        let webhook: WebhookConfig =
            toml::from_str("url = \"https://bot.example.com\"\ncertificate_path = \"/nonexistent.pem\"\n")
                .unwrap();
        let err = webhook_source(&webhook).unwrap_err();
        assert!(err.to_string().contains("nonexistent.pem"), "{err}");
    }

    #[test]
    fn polling_settings_carry_over() {
        let polling = polling_source(&PollingConfig {
            limit: 10,
            timeout_secs: 5,
            idle_delay_ms: 250,
            clear_webhook: false,
        });
        assert_eq!(polling, Polling {
            limit: 10,
            timeout: Duration::from_secs(5),
            idle_delay: Duration::from_millis(250),
            clear_webhook: false,
        });
    }
}
