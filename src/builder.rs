//! Turns a normalized whiteboard photo into a prototype directory on disk.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Instant;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::constants::{DEMOS_URL_PREFIX, PROTOTYPE_DIR_PREFIX, PROTOTYPE_FILE, THUMBNAIL_FILE};
use crate::cost::{CostBreakdown, calculate};
use crate::error::AppError;
use crate::history::TokenUsage;
use crate::imaging::{self, NormalizedImage};
use crate::model::{ModelClient, ModelRequest};
use crate::prompt::build_prompt;

/// Declaration every artifact starts with.
pub const DOCTYPE: &str = "<!DOCTYPE html>";

static OPENING_FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_+.-]*[ \t]*\r?\n").ok());
static CLOSING_FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*```[ \t]*\r?$").ok());

const DOCTYPE_PREFIX: &str = "<!doctype";

/// Pulls the markup out of a model reply and makes sure it starts with a
/// doctype.
///
/// A reply that already starts with markup is kept as is. Otherwise the first
/// fenced block (plain or language-tagged) wins and any chatter around it is
/// dropped.
pub fn sanitize_markup(raw: &str) -> String {
    let text = extract_fenced(raw.trim()).trim();

    let has_doctype = text
        .get(..DOCTYPE_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(DOCTYPE_PREFIX));
    if has_doctype {
        text.to_string()
    } else {
        format!("{DOCTYPE}\n{text}")
    }
}

fn extract_fenced(text: &str) -> &str {
    if text.starts_with('<') {
        return text;
    }
    let Some(opening) = OPENING_FENCE.as_ref().and_then(|re| re.find(text)) else {
        return text;
    };
    let body = &text[opening.end()..];
    match CLOSING_FENCE.as_ref().and_then(|re| re.find(body)) {
        Some(closing) => &body[..closing.start()],
        // unterminated, or closed on the last markup line
        None => {
            let body = body.trim_end();
            body.strip_suffix("```").unwrap_or(body)
        }
    }
}

/// Name of the prototype directory for a build started at `started` by
/// session `session_id`.
pub fn prototype_dir_name(started: &DateTime<Utc>, session_id: &str) -> String {
    format!(
        "{}-{}-{}",
        PROTOTYPE_DIR_PREFIX,
        started.format("%Y%m%dT%H%M%S%3fZ"),
        session_id
    )
}

/// Everything a successful build produced.
#[derive(Clone, Debug)]
pub struct BuildResult {
    /// Absolute (or data-dir based) path of the prototype directory.
    pub output_dir: PathBuf,
    /// Directory name under the output tree.
    pub dir_name: String,
    /// URL of `index.html`.
    pub prototype_url: String,
    /// URL of the thumbnail, absent when it could not be written.
    pub thumbnail_url: Option<String>,
    /// Token usage reported by the model.
    pub tokens: TokenUsage,
    /// Cost breakdown.
    pub costs: CostBreakdown,
    /// Seconds spent waiting on the model.
    pub duration: f64,
    /// Model identifier.
    pub model: String,
    /// Files written into `output_dir`.
    pub files: Vec<String>,
    /// Why the thumbnail is missing, if it is.
    pub thumbnail_error: Option<String>,
}

/// One build: inputs for [`build_prototype`].
#[derive(Debug)]
pub struct BuildRequest<'a> {
    /// Per-request id.
    pub session_id: &'a str,
    /// When the request arrived.
    pub started: DateTime<Utc>,
    /// The working copy to send.
    pub image: &'a NormalizedImage,
    /// The user's instruction, if any.
    pub custom_prompt: Option<&'a str>,
}

/// Creates a fresh prototype directory, asks the model for a prototype,
/// writes `index.html` and a thumbnail into it.
///
/// The directory is removed again if anything fatal happens after it was
/// created.
#[instrument(skip_all, fields(session_id = %request.session_id))]
pub async fn build_prototype(
    config: &Config,
    client: &dyn ModelClient,
    request: &BuildRequest<'_>,
) -> Result<BuildResult, AppError> {
    let dir_name = prototype_dir_name(&request.started, request.session_id);
    let output_dir = config.output_dir().join(&dir_name);
    tokio::fs::create_dir_all(&output_dir).await.map_err(|err| {
        AppError::InternalServerError(format!(
            "Failed to create {}: {}",
            output_dir.display(),
            err
        ))
    })?;

    match write_prototype(config, client, request, &dir_name, &output_dir).await {
        Ok(result) => Ok(result),
        Err(err) => {
            if let Err(cleanup) = tokio::fs::remove_dir_all(&output_dir).await {
                warn!(
                    "[{}] Failed to clean up {} after error: {}",
                    request.session_id,
                    output_dir.display(),
                    cleanup
                );
            }
            Err(err)
        }
    }
}

async fn write_prototype(
    config: &Config,
    client: &dyn ModelClient,
    request: &BuildRequest<'_>,
    dir_name: &str,
    output_dir: &Path,
) -> Result<BuildResult, AppError> {
    let prompt = build_prompt(request.custom_prompt);
    let model_request = ModelRequest {
        model: &config.model,
        max_tokens: config.max_tokens,
        prompt: &prompt,
        image: &request.image.bytes,
        media_type: request.image.media_type,
    };

    info!(
        "[{}] Sending {}x{} image to {} ({} bytes)",
        request.session_id,
        request.image.width,
        request.image.height,
        config.model,
        request.image.bytes.len()
    );
    let call_started = Instant::now();
    let response = client.generate(&model_request).await.map_err(|err| {
        error!("[{}] Model call failed: {}", request.session_id, err);
        AppError::from(err)
    })?;
    let duration = call_started.elapsed().as_secs_f64();

    let html = sanitize_markup(&response.text);
    tokio::fs::write(output_dir.join(PROTOTYPE_FILE), html.as_bytes()).await?;
    let mut files = vec![PROTOTYPE_FILE.to_string()];

    let costs = calculate(&config.rates, response.input_tokens, response.output_tokens);
    info!(
        "[{}] Built prototype in {:.1}s: {} in / {} out tokens, ${}",
        request.session_id,
        duration,
        response.input_tokens,
        response.output_tokens,
        costs.total_cost
    );

    let url_base = format!("{DEMOS_URL_PREFIX}/{dir_name}");
    let thumbnail_error = match write_thumbnail(config, request.image, output_dir).await {
        Ok(()) => {
            files.push(THUMBNAIL_FILE.to_string());
            None
        }
        Err(err) => {
            warn!("[{}] Thumbnail generation failed: {}", request.session_id, err);
            Some(err)
        }
    };
    let thumbnail_url = thumbnail_error
        .is_none()
        .then(|| format!("{url_base}/{THUMBNAIL_FILE}"));

    Ok(BuildResult {
        output_dir: output_dir.to_path_buf(),
        dir_name: dir_name.to_string(),
        prototype_url: format!("{url_base}/{PROTOTYPE_FILE}"),
        thumbnail_url,
        tokens: TokenUsage {
            input: response.input_tokens,
            output: response.output_tokens,
        },
        costs,
        duration,
        model: response.model.unwrap_or_else(|| config.model.clone()),
        files,
        thumbnail_error,
    })
}

async fn write_thumbnail(
    config: &Config,
    image: &NormalizedImage,
    output_dir: &Path,
) -> Result<(), String> {
    let bytes = image.bytes.clone();
    let size = config.thumbnail_size;
    let quality = config.thumbnail_quality;
    let thumb = tokio::task::spawn_blocking(move || imaging::thumbnail(&bytes, size, quality))
        .await
        .map_err(|err| err.to_string())?
        .map_err(|err| err.to_string())?;
    tokio::fs::write(output_dir.join(THUMBNAIL_FILE), thumb)
        .await
        .map_err(|err| err.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{ModelError, ModelResponse};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replies with canned text and remembers the prompts it saw.
    pub(crate) struct FakeModel {
        pub(crate) reply: Result<String, u16>,
        pub(crate) calls: AtomicUsize,
        pub(crate) prompts: Mutex<Vec<String>>,
        /// Output root whose prototype dirs get a directory where the
        /// thumbnail should go, so writing it fails.
        pub(crate) block_thumbnails_in: Option<PathBuf>,
    }

    impl FakeModel {
        pub(crate) fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
                block_thumbnails_in: None,
            }
        }

        pub(crate) fn failing(status: u16) -> Self {
            Self {
                reply: Err(status),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
                block_thumbnails_in: None,
            }
        }

        pub(crate) fn blocking_thumbnails(mut self, output_root: &Path) -> Self {
            self.block_thumbnails_in = Some(output_root.to_path_buf());
            self
        }
    }

    #[async_trait]
    impl ModelClient for FakeModel {
        async fn generate(
            &self,
            request: &ModelRequest<'_>,
        ) -> Result<ModelResponse, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts
                .lock()
                .expect("prompts lock")
                .push(request.prompt.to_string());
            if let Some(root) = &self.block_thumbnails_in {
                for entry in std::fs::read_dir(root).expect("output root") {
                    let prototype = entry.expect("entry").path();
                    std::fs::create_dir_all(prototype.join(THUMBNAIL_FILE)).expect("blocker");
                }
            }
            match &self.reply {
                Ok(text) => Ok(ModelResponse {
                    text: text.clone(),
                    input_tokens: 1_500,
                    output_tokens: 4_000,
                    model: None,
                }),
                Err(status) => Err(ModelError::Api {
                    status: *status,
                    message: "overloaded".to_string(),
                }),
            }
        }
    }

    #[test]
    fn generic_and_tagged_fences_strip_the_same() {
        let body = "<html><body>hi</body></html>";
        let plain = sanitize_markup(&format!("```\n{body}\n```"));
        let tagged = sanitize_markup(&format!("```html\n{body}\n```\n"));
        let bare = sanitize_markup(body);
        assert_eq!(plain, tagged);
        assert_eq!(plain, bare);
        assert_eq!(plain, format!("{DOCTYPE}\n{body}"));
    }

    #[test]
    fn keeps_existing_doctype() {
        let doc = "<!doctype html>\n<html></html>";
        assert_eq!(sanitize_markup(doc), doc);
        let fenced = format!("```HTML\r\n{DOCTYPE}\r\n<html></html>\r\n```");
        assert_eq!(sanitize_markup(&fenced), format!("{DOCTYPE}\r\n<html></html>"));
    }

    #[test]
    fn drops_chatter_around_the_fence() {
        let expected = format!("{DOCTYPE}\n<html></html>");
        let trailing = "```html\n<html></html>\n```\nLet me know if you need changes.";
        assert_eq!(sanitize_markup(trailing), expected);
        let preamble = "Here is the prototype:\n```html\n<html></html>\n```";
        assert_eq!(sanitize_markup(preamble), expected);
        let both = "Sure!\n\n```\n<html></html>\n```\n\nNotes:\n```css\nbody {}\n```";
        assert_eq!(sanitize_markup(both), expected);
        let unterminated = "Here you go:\n```html\n<html></html>```";
        assert_eq!(sanitize_markup(unterminated), expected);
    }

    #[test]
    fn any_doctype_counts() {
        let legacy = "<!DOCTYPE HTML PUBLIC \"-//W3C//DTD HTML 4.01//EN\">\n<html></html>";
        assert_eq!(sanitize_markup(legacy), legacy);
        assert_eq!(sanitize_markup(legacy).matches("DOCTYPE").count(), 1);
        let lower = "<!doctype html><html></html>";
        assert_eq!(sanitize_markup(lower), lower);
    }

    #[test]
    fn leaves_inner_fences_alone() {
        let doc = "<!DOCTYPE html><pre>```rust\nfn main() {}\n```</pre>";
        assert_eq!(sanitize_markup(doc), doc);
    }

    #[test]
    fn dir_name_pairs_timestamp_and_session() {
        let started = DateTime::parse_from_rfc3339("2026-10-18T05:31:02.123Z")
            .expect("ts")
            .with_timezone(&Utc);
        assert_eq!(
            prototype_dir_name(&started, "abc123"),
            "prototype-20261018T053102123Z-abc123"
        );
    }

    #[tokio::test]
    async fn writes_prototype_and_thumbnail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::for_tests(dir.path());
        let image = imaging::normalize(&imaging::tests::png_bytes(400, 300), 256, 80)
            .expect("normalize");
        let model = FakeModel::replying("```html\n<html><body>board</body></html>\n```");
        let request = BuildRequest {
            session_id: "s1",
            started: Utc::now(),
            image: &image,
            custom_prompt: Some("make it blue"),
        };

        let result = build_prototype(&config, &model, &request)
            .await
            .expect("build");

        let html = std::fs::read_to_string(result.output_dir.join("index.html")).expect("html");
        assert_eq!(html, "<!DOCTYPE html>\n<html><body>board</body></html>");
        assert!(result.output_dir.join("thumbnail.jpg").is_file());
        assert!(result.output_dir.starts_with(config.output_dir()));
        assert_eq!(result.files, vec!["index.html", "thumbnail.jpg"]);
        assert_eq!(
            result.prototype_url,
            format!("/demos/{}/index.html", result.dir_name)
        );
        assert!(result.thumbnail_error.is_none());
        assert_eq!(result.tokens, TokenUsage { input: 1_500, output: 4_000 });
        assert_eq!(result.costs.total_cost, "0.064500");
        assert_eq!(result.model, config.model);

        let prompts = model.prompts.lock().expect("lock");
        assert!(prompts[0].starts_with(crate::prompt::DESIGN_PROMPT));
        assert!(prompts[0].ends_with("make it blue"));
    }

    #[tokio::test]
    async fn model_failure_removes_the_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::for_tests(dir.path());
        let image = imaging::normalize(&imaging::tests::png_bytes(40, 30), 256, 80)
            .expect("normalize");
        let model = FakeModel::failing(529);
        let request = BuildRequest {
            session_id: "s2",
            started: Utc::now(),
            image: &image,
            custom_prompt: None,
        };

        let err = build_prototype(&config, &model, &request)
            .await
            .expect_err("should fail");
        assert!(err.to_string().contains("overloaded"));
        let leftover = std::fs::read_dir(config.output_dir())
            .expect("output dir")
            .count();
        assert_eq!(leftover, 0);
    }

    #[tokio::test]
    async fn unreadable_thumbnail_source_is_not_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::for_tests(dir.path());
        let image = NormalizedImage {
            bytes: b"not really a jpeg".to_vec(),
            width: 1,
            height: 1,
            media_type: imaging::JPEG_MEDIA_TYPE,
        };
        let model = FakeModel::replying("<!DOCTYPE html><html></html>");
        let request = BuildRequest {
            session_id: "s3",
            started: Utc::now(),
            image: &image,
            custom_prompt: None,
        };

        let result = build_prototype(&config, &model, &request)
            .await
            .expect("build");
        assert!(result.thumbnail_error.is_some());
        assert!(result.thumbnail_url.is_none());
        assert_eq!(result.files, vec!["index.html"]);
        assert!(result.output_dir.join("index.html").is_file());
    }
}
