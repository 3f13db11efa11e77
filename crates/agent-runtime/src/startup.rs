//! Process Startup
//!
//! Environment loading and console logging, done once and explicitly by the
//! host program rather than as a side effect of linking the library.
//!
//! ```rust,ignore
//! agent_runtime::Startup::new().ansi(true).init()?;
//! let provider = OpenAiProvider::from_env()?;
//! ```

use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Startup failures
#[derive(Error, Debug)]
pub enum StartupError {
    /// `.env` exists but could not be read
    #[error("failed to load .env: {0}")]
    Dotenv(#[from] dotenvy::Error),

    /// Log filter directive did not parse
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
}

/// What happened during [`Startup::init`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StartupReport {
    /// A `.env` file was found and loaded
    pub dotenv_loaded: bool,
    /// This call installed the global subscriber (false if one already existed)
    pub logging_installed: bool,
}

/// One-time process setup
#[derive(Clone, Debug)]
pub struct Startup {
    load_dotenv: bool,
    default_filter: String,
    ansi: bool,
}

impl Default for Startup {
    fn default() -> Self {
        Self {
            load_dotenv: true,
            default_filter: "info".into(),
            ansi: true,
        }
    }
}

impl Startup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a `.env` file from the working directory or its parents
    #[must_use]
    pub const fn dotenv(mut self, load: bool) -> Self {
        self.load_dotenv = load;
        self
    }

    /// Filter used when `RUST_LOG` is unset
    #[must_use]
    pub fn default_filter(mut self, directives: impl Into<String>) -> Self {
        self.default_filter = directives.into();
        self
    }

    /// Colored console output
    #[must_use]
    pub const fn ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    fn filter(&self) -> Result<EnvFilter, StartupError> {
        match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(directives) if !directives.trim().is_empty() => Ok(EnvFilter::try_new(directives)?),
            _ => Ok(EnvFilter::try_new(&self.default_filter)?),
        }
    }

    /// Load the environment, then install the tracing subscriber.
    ///
    /// The environment comes first so `RUST_LOG` may live in `.env`. Calling
    /// this twice is harmless: the second call leaves the existing subscriber
    /// in place.
    pub fn init(self) -> Result<StartupReport, StartupError> {
        let dotenv_loaded = if self.load_dotenv {
            match dotenvy::dotenv() {
                Ok(_) => true,
                Err(e) if e.not_found() => false,
                Err(e) => return Err(e.into()),
            }
        } else {
            false
        };

        let logging_installed = tracing_subscriber::registry()
            .with(self.filter()?)
            .with(tracing_subscriber::fmt::layer().with_ansi(self.ansi))
            .try_init()
            .is_ok();

        tracing::debug!(dotenv_loaded, logging_installed, "Startup complete");

        Ok(StartupReport {
            dotenv_loaded,
            logging_installed,
        })
    }
}
