//! Scope-aware command registry and command menu synchronisation.
//!
//! Commands are indexed twice: by [`ScopeKey`] for publishing the menu, and
//! by name for dispatch. A name always resolves to a single handler, however
//! many scopes list it.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use {
    courier_api::{
        BotCommand, ScopeKey,
        methods::{GetMyCommands, SetMyCommands},
    },
    courier_client::Client,
    tracing::{debug, info},
};

#[cfg(feature = "metrics")]
use courier_metrics::{commands as command_metrics, counter};

use crate::{error::ConfigError, handler::Handler};

const MAX_DESCRIPTION_CHARS: usize = 256;
const MAX_NAME_CHARS: usize = 32;

struct Registered {
    handler: Handler,
    scopes: BTreeSet<ScopeKey>,
}

#[derive(Default)]
pub struct CommandRegistry {
    by_scope: HashMap<ScopeKey, BTreeMap<String, String>>,
    by_name: HashMap<String, Registered>,
    errors: Vec<ConfigError>,
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.by_name.keys().collect::<BTreeSet<_>>())
            .field("scopes", &self.scopes())
            .field("errors", &self.errors)
            .finish()
    }
}

/// Outcome of [`CommandRegistry::sync`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Scopes whose remote list was replaced.
    pub updated: Vec<ScopeKey>,
    /// Scopes that already matched.
    pub unchanged: Vec<ScopeKey>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` for every scope in `scopes`, or for the default scope
    /// when none are given.
    ///
    /// Invalid input is recorded and reported when serving starts. Registering
    /// a name again adds the new scopes to the previous ones and replaces the
    /// handler everywhere.
    pub fn add_command(
        &mut self,
        name: &str,
        description: &str,
        handler: Handler,
        scopes: impl IntoIterator<Item = ScopeKey>,
    ) -> &mut Self {
        let name = name.strip_prefix('/').unwrap_or(name);
        let mut scopes: Vec<ScopeKey> = scopes.into_iter().collect();
        if scopes.is_empty() {
            scopes.push(ScopeKey::default());
        }

        let errors = validate(name, description, &scopes);
        if !errors.is_empty() {
            self.errors.extend(errors);
            return self;
        }

        for scope in &scopes {
            self.by_scope
                .entry(scope.clone())
                .or_default()
                .insert(name.to_string(), description.to_string());
        }

        match self.by_name.get_mut(name) {
            Some(existing) => {
                existing.handler = handler;
                existing.scopes.extend(scopes);
            },
            None => {
                self.by_name.insert(name.to_string(), Registered {
                    handler,
                    scopes: scopes.into_iter().collect(),
                });
            },
        }
        self
    }

    /// Register `name` once per locale, each with its own description, under
    /// every given scope (default scope when none).
    pub fn add_localized_command<L, D>(
        &mut self,
        name: &str,
        descriptions: impl IntoIterator<Item = (L, D)>,
        handler: Handler,
        scopes: impl IntoIterator<Item = ScopeKey>,
    ) -> &mut Self
    where
        L: Into<String>,
        D: AsRef<str>,
    {
        let mut scopes: Vec<ScopeKey> = scopes.into_iter().collect();
        if scopes.is_empty() {
            scopes.push(ScopeKey::default());
        }
        for (locale, description) in descriptions {
            let locale = locale.into();
            let localized = scopes
                .iter()
                .map(|scope| scope.clone().with_locale(locale.clone()));
            self.add_command(name, description.as_ref(), handler.clone(), localized);
        }
        self
    }

    pub fn get_handler(&self, name: &str) -> Option<&Handler> {
        self.by_name.get(name).map(|registered| &registered.handler)
    }

    /// Commands visible in `scope`, sorted by name. Only exact scope matches
    /// count; nothing is inherited from broader scopes.
    pub fn get_commands(&self, scope: &ScopeKey) -> Vec<BotCommand> {
        self.by_scope
            .get(scope)
            .map(|commands| {
                commands
                    .iter()
                    .map(|(name, description)| BotCommand::new(name, description))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Scopes the command `name` is registered under.
    pub fn scopes_of(&self, name: &str) -> Vec<&ScopeKey> {
        self.by_name
            .get(name)
            .map(|registered| registered.scopes.iter().collect())
            .unwrap_or_default()
    }

    /// Every scope with at least one command, in a stable order.
    pub fn scopes(&self) -> Vec<&ScopeKey> {
        let mut scopes: Vec<&ScopeKey> = self
            .by_scope
            .iter()
            .filter(|(_, commands)| !commands.is_empty())
            .map(|(scope, _)| scope)
            .collect();
        scopes.sort();
        scopes
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Registration problems collected so far.
    pub fn errors(&self) -> &[ConfigError] {
        &self.errors
    }

    pub(crate) fn wrap_handlers(&mut self, wrap: impl Fn(Handler) -> Handler) {
        for registered in self.by_name.values_mut() {
            registered.handler = wrap(registered.handler.clone());
        }
    }

    /// Bring the remote command menu in line with the registry.
    ///
    /// For each scope the remote list is fetched and compared as a set of
    /// `(name, description)` pairs; a single `setMyCommands` is issued only
    /// when they differ.
    pub async fn sync(&self, client: &Client) -> courier_client::Result<SyncReport> {
        let mut report = SyncReport::default();
        for scope in self.scopes() {
            let local = self.get_commands(scope);
            let remote = client.send(&GetMyCommands::for_scope(scope)).await?;

            let wanted: BTreeSet<&BotCommand> = local.iter().collect();
            let current: BTreeSet<&BotCommand> = remote.iter().collect();
            if wanted == current {
                debug!(%scope, count = local.len(), "command menu up to date");
                #[cfg(feature = "metrics")]
                counter!(command_metrics::SCOPES_UNCHANGED_TOTAL).increment(1);
                report.unchanged.push(scope.clone());
                continue;
            }

            let count = local.len();
            client.send(&SetMyCommands::for_scope(scope, local)).await?;
            info!(%scope, count, previous = remote.len(), "command menu updated");
            #[cfg(feature = "metrics")]
            counter!(command_metrics::SCOPES_UPDATED_TOTAL).increment(1);
            report.updated.push(scope.clone());
        }
        Ok(report)
    }
}

fn validate(name: &str, description: &str, scopes: &[ScopeKey]) -> Vec<ConfigError> {
    let mut errors = Vec::new();
    let command = name.to_string();

    let valid_name = !name.is_empty()
        && name.chars().count() <= MAX_NAME_CHARS
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid_name {
        errors.push(ConfigError::InvalidCommandName {
            command: command.clone(),
        });
    }

    let len = description.chars().count();
    if len == 0 {
        errors.push(ConfigError::EmptyDescription {
            command: command.clone(),
        });
    } else if len > MAX_DESCRIPTION_CHARS {
        errors.push(ConfigError::DescriptionTooLong {
            command: command.clone(),
            len,
        });
    }

    let bad_locales: BTreeSet<&str> = scopes
        .iter()
        .filter_map(|scope| scope.language_code.as_deref())
        .filter(|locale| !is_language_code(locale))
        .collect();
    for locale in bad_locales {
        errors.push(ConfigError::InvalidLocale {
            command: command.clone(),
            locale: locale.to_string(),
        });
    }
    errors
}

fn is_language_code(locale: &str) -> bool {
    locale.len() == 2 && locale.bytes().all(|b| b.is_ascii_lowercase())
}
