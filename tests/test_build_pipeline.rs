use std::io::Cursor;

use async_trait::async_trait;
use boardsmith::builder::{BuildRequest, build_prototype};
use boardsmith::cli::CliOptions;
use boardsmith::config::{Config, setup_logging};
use boardsmith::history::{HistoryStore, Session};
use boardsmith::imaging::normalize;
use boardsmith::model::{ModelClient, ModelError, ModelRequest, ModelResponse};
use chrono::Utc;
use clap::{CommandFactory, FromArgMatches};
use image::{DynamicImage, ImageFormat, RgbImage};

struct EchoModel;

#[async_trait]
impl ModelClient for EchoModel {
    async fn generate(&self, request: &ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        Ok(ModelResponse {
            text: format!(
                "```\n<html><body data-bytes=\"{}\"></body></html>\n```",
                request.image.len()
            ),
            input_tokens: 1_000_000,
            output_tokens: 0,
            model: Some(request.model.to_string()),
        })
    }
}

fn config(data_dir: &std::path::Path) -> Config {
    let data_dir = data_dir.to_string_lossy().into_owned();
    let matches = CliOptions::command()
        .mut_args(|arg| arg.env(None::<&'static str>))
        .get_matches_from([
        "boardsmith",
        "--anthropic-api-key",
        "sk-integration",
        "--data-dir",
        data_dir.as_str(),
        "--max-image-dimension",
        "512",
        "--input-price-per-million",
        "2.5",
    ]);
    let cli = CliOptions::from_arg_matches(&matches).expect("cli options");
    Config::try_from(&cli).expect("config")
}

fn jpeg_photo(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([240, 240, 235])))
        .write_to(&mut out, ImageFormat::Jpeg)
        .expect("encode");
    out.into_inner()
}

#[tokio::test]
async fn photo_to_prototype_and_history() {
    let _ = setup_logging(true);
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path());
    config.ensure_dirs().await.expect("dirs");

    let image = normalize(
        &jpeg_photo(2048, 1536),
        config.max_image_dimension,
        config.image_quality,
    )
    .expect("normalize");
    assert_eq!((image.width, image.height), (512, 384));

    let request = BuildRequest {
        session_id: "integration",
        started: Utc::now(),
        image: &image,
        custom_prompt: None,
    };
    let result = build_prototype(&config, &EchoModel, &request)
        .await
        .expect("build");

    let html = std::fs::read_to_string(result.output_dir.join("index.html")).expect("html");
    assert!(html.starts_with("<!DOCTYPE html>\n<html>"));
    assert!(!html.contains("```"));
    assert_eq!(result.costs.input_cost, "2.500000");
    assert_eq!(result.costs.output_cost, "0.000000");
    assert_eq!(result.model, config.model);

    let store = HistoryStore::new(config.history_path());
    let session = Session {
        session_id: "integration".to_string(),
        timestamp: request.started,
        original_filename: "board.jpg".to_string(),
        custom_prompt: String::new(),
        output_dir: config.relative_to_data_dir(&result.output_dir),
        prototype_url: result.prototype_url.clone(),
        thumbnail_url: result.thumbnail_url.clone(),
        tokens: result.tokens,
        cost: result.costs.total(),
        costs: result.costs.clone(),
        duration: result.duration,
        model: result.model.clone(),
        success: true,
    };
    store.append(session.clone()).await.expect("append");

    let loaded = store.load().await.sessions;
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].session_id, session.session_id);
    assert_eq!(loaded[0].prototype_url, session.prototype_url);
    assert_eq!(loaded[0].costs, session.costs);
    assert_eq!(loaded[0].tokens, session.tokens);
    assert!(loaded[0].output_dir.starts_with("__output__/prototype-"));
}
