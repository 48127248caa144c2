use std::net::SocketAddr;

/// A setup problem found before serving. Registration calls collect these so
/// that every mistake is reported together at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("command /{command}: description must not be empty")]
    EmptyDescription { command: String },

    #[error("command /{command}: description is {len} characters, at most 256 are allowed")]
    DescriptionTooLong { command: String, len: usize },

    #[error("command /{command}: invalid locale {locale:?}, expected a two-letter language code")]
    InvalidLocale { command: String, locale: String },

    #[error(
        "invalid command name {command:?}: use 1-32 lowercase letters, digits or underscores"
    )]
    InvalidCommandName { command: String },

    #[error("both a webhook and a polling source are configured")]
    ConflictingSources,

    #[error("worker count must be at least 1")]
    ZeroWorkers,

    #[error("queue capacity must be at least 1")]
    ZeroQueueCapacity,

    #[error("invalid webhook url {url:?}: {reason}")]
    InvalidWebhookUrl { url: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{}", join(.0))]
    Config(Vec<ConfigError>),

    #[error(transparent)]
    Client(#[from] courier_client::Error),

    #[error("webhook listener on {addr}: {source}")]
    Listener {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    /// The aggregated setup errors, empty for any other kind.
    #[must_use]
    pub fn config_errors(&self) -> &[ConfigError] {
        match self {
            Self::Config(errors) => errors,
            _ => &[],
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(vec![err])
    }
}

fn join(errors: &[ConfigError]) -> String {
    let parts: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("invalid configuration: {}", parts.join("; "))
}

pub type Result<T> = std::result::Result<T, Error>;
