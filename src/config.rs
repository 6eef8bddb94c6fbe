//! Config handling

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::log::LevelFilter;

use crate::cli::CliOptions;
use crate::constants::{HISTORY_DIR, HISTORY_FILE, OUTPUT_DIR, UPLOADS_DIR};
use crate::cost::CostRates;

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
            .with_module_level("reqwest", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// Errors found while validating startup configuration.
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// The API credential was empty.
    MissingApiKey,
    /// A numeric setting was outside its allowed range.
    OutOfRange {
        /// Option name
        name: &'static str,
        /// What was supplied
        value: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingApiKey => write!(f, "An Anthropic API key is required"),
            Self::OutOfRange { name, value } => {
                write!(f, "Invalid value for --{name}: {value}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Immutable runtime configuration, built once at startup and shared.
#[derive(Clone)]
pub struct Config {
    /// Anthropic API key.
    pub api_key: String,
    /// Base URL of the messages API.
    pub api_base: String,
    /// Listen address.
    pub listen_address: String,
    /// Listen port.
    pub port: u16,
    /// Model identifier.
    pub model: String,
    /// Output token cap.
    pub max_tokens: u32,
    /// Longest edge of the image sent to the model.
    pub max_image_dimension: u32,
    /// JPEG quality of the image sent to the model.
    pub image_quality: u8,
    /// Thumbnail edge length.
    pub thumbnail_size: u32,
    /// Thumbnail JPEG quality.
    pub thumbnail_quality: u8,
    /// Token pricing.
    pub rates: CostRates,
    /// Root of all persisted state.
    pub data_dir: PathBuf,
    /// Model call timeout.
    pub request_timeout: Duration,
    /// Upload body limit.
    pub max_upload_bytes: usize,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("listen_address", &self.listen_address)
            .field("port", &self.port)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("max_image_dimension", &self.max_image_dimension)
            .field("image_quality", &self.image_quality)
            .field("thumbnail_size", &self.thumbnail_size)
            .field("thumbnail_quality", &self.thumbnail_quality)
            .field("rates", &self.rates)
            .field("data_dir", &self.data_dir)
            .field("request_timeout", &self.request_timeout)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

fn out_of_range(name: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::OutOfRange {
        name,
        value: value.to_string(),
    }
}

fn check_quality(name: &'static str, value: u8) -> Result<u8, ConfigError> {
    if (1..=100).contains(&value) {
        Ok(value)
    } else {
        Err(out_of_range(name, value))
    }
}

impl TryFrom<&CliOptions> for Config {
    type Error = ConfigError;

    fn try_from(cli: &CliOptions) -> Result<Self, Self::Error> {
        let api_key = cli.anthropic_api_key.trim();
        if api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if cli.max_image_dimension == 0 {
            return Err(out_of_range("max-image-dimension", cli.max_image_dimension));
        }
        if cli.thumbnail_size == 0 {
            return Err(out_of_range("thumbnail-size", cli.thumbnail_size));
        }
        if cli.max_tokens == 0 {
            return Err(out_of_range("max-tokens", cli.max_tokens));
        }
        if cli.request_timeout_secs == 0 {
            return Err(out_of_range(
                "request-timeout-secs",
                cli.request_timeout_secs,
            ));
        }
        for (name, price) in [
            ("input-price-per-million", cli.input_price_per_million),
            ("output-price-per-million", cli.output_price_per_million),
        ] {
            if !price.is_finite() || price < 0.0 {
                return Err(out_of_range(name, price));
            }
        }

        Ok(Self {
            api_key: api_key.to_string(),
            api_base: cli.api_base.trim_end_matches('/').to_string(),
            listen_address: cli.listen_address.clone(),
            port: cli.port.get(),
            model: cli.model.clone(),
            max_tokens: cli.max_tokens,
            max_image_dimension: cli.max_image_dimension,
            image_quality: check_quality("image-quality", cli.image_quality)?,
            thumbnail_size: cli.thumbnail_size,
            thumbnail_quality: check_quality("thumbnail-quality", cli.thumbnail_quality)?,
            rates: CostRates {
                input_per_million: cli.input_price_per_million,
                output_per_million: cli.output_price_per_million,
            },
            data_dir: cli.data_dir.clone(),
            request_timeout: Duration::from_secs(cli.request_timeout_secs),
            max_upload_bytes: cli.max_upload_bytes,
        })
    }
}

impl Config {
    /// Where raw and normalized uploads are written.
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join(UPLOADS_DIR)
    }

    /// Root of the prototype output tree.
    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join(OUTPUT_DIR)
    }

    /// Location of the history document.
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(HISTORY_DIR).join(HISTORY_FILE)
    }

    /// Creates the directories the server writes into.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.uploads_dir(),
            self.output_dir(),
            self.data_dir.join(HISTORY_DIR),
        ] {
            tokio::fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }

    /// Test configuration rooted at `data_dir`.
    #[cfg(test)]
    #[allow(clippy::expect_used)]
    pub(crate) fn for_tests(data_dir: &Path) -> Self {
        let data_dir = data_dir.to_string_lossy().into_owned();
        let cli = CliOptions::parse_ignoring_env([
            "boardsmith",
            "--anthropic-api-key",
            "test-key",
            "--data-dir",
            data_dir.as_str(),
        ]);
        Self::try_from(&cli).expect("valid test config")
    }

    /// `path` relative to the data dir, for display in responses.
    pub fn relative_to_data_dir(&self, path: &Path) -> String {
        path.strip_prefix(&self.data_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}
