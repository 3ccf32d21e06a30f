//! Config handling

use std::path::PathBuf;
use std::time::Duration;

use tracing::log::LevelFilter;
use url::Url;

use crate::catalog::{Catalog, CatalogError};
use crate::cli::CliOptions;
use crate::inference::{GenerationParameters, InferenceClient, InferenceError};
use crate::prompt::PromptBuilder;

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("reqwest", LevelFilter::Info)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// Reasons the service refuses to start.
#[derive(Debug)]
pub enum ConfigError {
    /// The inference token is empty
    MissingToken,
    /// The endpoint isn't a URL
    InvalidApiUrl(url::ParseError),
    /// The HTTP client couldn't be built
    Client(InferenceError),
    /// The bundled catalog is broken
    Catalog(CatalogError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingToken => write!(f, "HF_API_TOKEN is set but empty"),
            Self::InvalidApiUrl(err) => write!(f, "Invalid inference API URL: {err}"),
            Self::Client(err) => write!(f, "{err}"),
            Self::Catalog(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Everything the handlers need, built once at startup and never changed.
#[derive(Debug)]
pub struct AppConfig {
    /// Generated images go here; reference images live in its `images/` subdir
    pub static_dir: PathBuf,
    /// Reference images
    pub catalog: Catalog,
    /// Keyword to prompt rules
    pub prompts: PromptBuilder,
    /// Fixed generation settings
    pub parameters: GenerationParameters,
    /// Upstream client
    pub inference: InferenceClient,
}

impl AppConfig {
    /// Validates the CLI options and loads the bundled catalog.
    pub fn from_cli(cli: &CliOptions) -> Result<Self, ConfigError> {
        let token = cli.hf_api_token.trim();
        if token.is_empty() {
            return Err(ConfigError::MissingToken);
        }
        let endpoint = Url::parse(&cli.api_url).map_err(ConfigError::InvalidApiUrl)?;
        let timeout = cli.upstream_timeout_secs.map(Duration::from_secs);
        let inference = InferenceClient::new(endpoint, token.to_string(), timeout)
            .map_err(ConfigError::Client)?;

        Ok(Self {
            static_dir: cli.static_dir.clone(),
            catalog: Catalog::bundled().map_err(ConfigError::Catalog)?,
            prompts: PromptBuilder::default(),
            parameters: GenerationParameters::default(),
            inference,
        })
    }
}
