//! CLI parser
use clap::Parser;
use std::num::NonZeroU16;
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_API_BASE, DEFAULT_IMAGE_QUALITY, DEFAULT_INPUT_PRICE_PER_MILLION,
    DEFAULT_MAX_IMAGE_DIMENSION, DEFAULT_MAX_TOKENS, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_MODEL,
    DEFAULT_OUTPUT_PRICE_PER_MILLION, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_THUMBNAIL_QUALITY,
    DEFAULT_THUMBNAIL_SIZE,
};

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "BOARDSMITH_DEBUG")]
    /// Enable debug logging. Env: BOARDSMITH_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "3000", env = "BOARDSMITH_PORT")]
    /// http listener, defaults to `3000`.
    /// Env: BOARDSMITH_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "BOARDSMITH_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: BOARDSMITH_LISTEN_ADDRESS
    pub listen_address: String,

    #[arg(required = true, long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    /// Anthropic API key. Env: ANTHROPIC_API_KEY
    pub anthropic_api_key: String,

    #[clap(long, default_value = DEFAULT_API_BASE, env = "BOARDSMITH_API_BASE")]
    /// Base URL of the messages API. Env: BOARDSMITH_API_BASE
    pub api_base: String,

    #[clap(long, default_value = DEFAULT_MODEL, env = "BOARDSMITH_MODEL")]
    /// Model used to build prototypes. Env: BOARDSMITH_MODEL
    pub model: String,

    #[clap(long, default_value_t = DEFAULT_MAX_TOKENS, env = "BOARDSMITH_MAX_TOKENS")]
    /// Maximum output tokens per build. Env: BOARDSMITH_MAX_TOKENS
    pub max_tokens: u32,

    #[clap(
        long,
        default_value_t = DEFAULT_MAX_IMAGE_DIMENSION,
        env = "BOARDSMITH_MAX_IMAGE_DIMENSION"
    )]
    /// Longest edge, in pixels, of the image sent to the model.
    /// Env: BOARDSMITH_MAX_IMAGE_DIMENSION
    pub max_image_dimension: u32,

    #[clap(long, default_value_t = DEFAULT_IMAGE_QUALITY, env = "BOARDSMITH_IMAGE_QUALITY")]
    /// JPEG quality (1-100) of the image sent to the model.
    pub image_quality: u8,

    #[clap(long, default_value_t = DEFAULT_THUMBNAIL_SIZE, env = "BOARDSMITH_THUMBNAIL_SIZE")]
    /// Edge length of the square thumbnail.
    pub thumbnail_size: u32,

    #[clap(
        long,
        default_value_t = DEFAULT_THUMBNAIL_QUALITY,
        env = "BOARDSMITH_THUMBNAIL_QUALITY"
    )]
    /// JPEG quality (1-100) of the thumbnail.
    pub thumbnail_quality: u8,

    #[clap(
        long,
        default_value_t = DEFAULT_INPUT_PRICE_PER_MILLION,
        env = "BOARDSMITH_INPUT_PRICE"
    )]
    /// USD per million input tokens. Env: BOARDSMITH_INPUT_PRICE
    pub input_price_per_million: f64,

    #[clap(
        long,
        default_value_t = DEFAULT_OUTPUT_PRICE_PER_MILLION,
        env = "BOARDSMITH_OUTPUT_PRICE"
    )]
    /// USD per million output tokens. Env: BOARDSMITH_OUTPUT_PRICE
    pub output_price_per_million: f64,

    #[clap(long, default_value = ".", env = "BOARDSMITH_DATA_DIR")]
    /// Directory holding `uploads/`, `__output__/` and `history/`.
    /// Env: BOARDSMITH_DATA_DIR
    pub data_dir: PathBuf,

    #[clap(
        long,
        default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS,
        env = "BOARDSMITH_REQUEST_TIMEOUT_SECS"
    )]
    /// Timeout for the model call, in seconds.
    pub request_timeout_secs: u64,

    #[clap(
        long,
        default_value_t = DEFAULT_MAX_UPLOAD_BYTES,
        env = "BOARDSMITH_MAX_UPLOAD_BYTES"
    )]
    /// Largest accepted upload body, in bytes.
    pub max_upload_bytes: usize,
}

#[cfg(test)]
impl CliOptions {
    /// Parses `args` ignoring `BOARDSMITH_*` and `ANTHROPIC_API_KEY` from the
    /// environment.
    #[allow(clippy::expect_used)]
    pub(crate) fn parse_ignoring_env<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        use clap::{CommandFactory, FromArgMatches};

        let matches = Self::command()
            .mut_args(|arg| arg.env(None::<&'static str>))
            .get_matches_from(args);
        Self::from_arg_matches(&matches).expect("cli options")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_is_ignored_when_asked() {
        let cli = CliOptions::parse_ignoring_env(["boardsmith", "--anthropic-api-key", "k"]);
        assert_eq!(cli.port.get(), 3000);
        assert_eq!(cli.max_image_dimension, DEFAULT_MAX_IMAGE_DIMENSION);
        assert_eq!(cli.input_price_per_million, DEFAULT_INPUT_PRICE_PER_MILLION);
        assert_eq!(cli.data_dir, PathBuf::from("."));
    }
}
