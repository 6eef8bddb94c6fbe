//! Shared constants/defaults for things
//!

/// Default base URL for the Anthropic messages API.
pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com";

/// API version header value sent with every model request.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default cap on output tokens.
pub const DEFAULT_MAX_TOKENS: u32 = 16_000;

/// Default longest edge for the image sent to the model.
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 1568;

/// Default JPEG quality for the image sent to the model.
pub const DEFAULT_IMAGE_QUALITY: u8 = 85;

/// Default thumbnail edge length.
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 200;

/// Default thumbnail JPEG quality.
pub const DEFAULT_THUMBNAIL_QUALITY: u8 = 70;

/// Default USD price per million input tokens.
pub const DEFAULT_INPUT_PRICE_PER_MILLION: f64 = 3.0;

/// Default USD price per million output tokens.
pub const DEFAULT_OUTPUT_PRICE_PER_MILLION: f64 = 15.0;

/// Default model call timeout, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Default upload body limit (20 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Most sessions kept in the history file.
pub const MAX_HISTORY_ENTRIES: usize = 100;

/// Sessions shown on the upload page.
pub const RECENT_SESSIONS_ON_INDEX: usize = 10;

/// Raw and normalized uploads live here, under the data dir.
pub const UPLOADS_DIR: &str = "uploads";

/// Generated prototypes live here, under the data dir.
pub const OUTPUT_DIR: &str = "__output__";

/// The history document lives here, under the data dir.
pub const HISTORY_DIR: &str = "history";

/// Name of the history document.
pub const HISTORY_FILE: &str = "sessions.json";

/// Prefix for each prototype directory.
pub const PROTOTYPE_DIR_PREFIX: &str = "prototype";

/// URL prefix the output tree is served under.
pub const DEMOS_URL_PREFIX: &str = "/demos";

/// Artifact file name inside a prototype directory.
pub const PROTOTYPE_FILE: &str = "index.html";

/// Thumbnail file name inside a prototype directory.
pub const THUMBNAIL_FILE: &str = "thumbnail.jpg";

/// Length of generated session ids.
pub const SESSION_ID_LENGTH: usize = 12;
