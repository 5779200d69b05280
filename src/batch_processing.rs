//! Batch pipeline orchestration: collect images, upload the batch, render
//! overlays, and emit reports and metadata per file.

use anyhow::Result;
use chrono::Utc;
use image::{DynamicImage, RgbaImage};
use std::path::Path;
use std::time::Instant;

use crate::color_utils::symbols;
use crate::config::PredictConfig;
use crate::detections::{annotate_duplicates, BatchResult};
use crate::image_input::{collect_images_from_sources, ImageInputConfig};
use crate::output_manager::{batch_dump_path, OutputManager};
use crate::render::render_overlay;
use crate::report;
use crate::run_metadata::{save_predict_sections, ExecutionContext, PredictSections};
use crate::session::PredictSession;
use crate::transport::Transport;
use crate::upload::{load_upload_files, upload_batch, UploadFile};

/// Run one full predict batch. Returns the number of files processed.
///
/// The upload happens once for the whole batch (two requests, damages then
/// plates); rendering and reporting then proceed per file. A terminal
/// transport failure aborts before any per-file output exists, so there is
/// never a partial render of a failed batch.
pub fn run_batch_prediction(config: &PredictConfig) -> Result<usize> {
    let pipeline_start = Instant::now();
    let start_timestamp = Utc::now();
    let command_line: Vec<String> = std::env::args().collect();

    let image_config = ImageInputConfig::from_strict_flag(config.base.strict);
    let image_paths = collect_images_from_sources(&config.base.sources, &image_config)?;

    if image_paths.is_empty() {
        log::warn!("No valid images found to upload");
        return Ok(0);
    }

    log::info!("🎯 Found {} image(s) for prediction", image_paths.len());

    let files = load_upload_files(&image_paths)?;

    let transport = Transport::new()?;
    let mut session = PredictSession::new();
    let batch = session.begin(files);

    let car_info = config.car_info();
    let mut result = upload_batch(&transport, &config.api_url, &batch.files, car_info.as_ref())?;
    annotate_duplicates(&mut result);

    if !session.complete(batch.id, result) {
        // The batch was superseded while in flight; its results are gone
        return Ok(0);
    }
    let result = session.result().cloned().unwrap_or_default();

    log::info!(
        "{} {} damage(s), {} plate(s) across {} file(s)",
        symbols::completed_successfully(),
        result.damages.len(),
        result.plates.len(),
        batch.files.len()
    );

    let progress = crate::color_utils::progress::create_batch_progress_bar(batch.files.len());

    for (image_path, file) in image_paths.iter().zip(&batch.files) {
        let section = report::file_report(file, &result);
        crate::progress::suspend(|| print!("{section}"));

        let output_manager = OutputManager::new(config, image_path);

        if config.annotate {
            match render_overlay(file, &result, config.display_size) {
                Ok(canvas) => {
                    let overlay_path = output_manager.annotated_image_path()?;
                    save_overlay(&canvas, &overlay_path)?;
                    log::info!(
                        "{} Overlay saved to: {}",
                        symbols::completed_successfully(),
                        overlay_path.display()
                    );
                }
                Err(e) => {
                    if config.base.strict {
                        return Err(e);
                    }
                    log::warn!(
                        "{} Failed to render {}: {e}",
                        symbols::warning(),
                        file.name
                    );
                }
            }
        }

        if !config.base.skip_metadata {
            let sections = predict_sections_for_file(
                config,
                file,
                &result,
                &command_line,
                start_timestamp,
            )?;
            save_predict_sections(&output_manager.metadata_path()?, sections)?;
        }

        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    if config.json_dump {
        let dump_path = batch_dump_path(config.base.output_dir.as_deref());
        if let Some(parent) = dump_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&dump_path, report::raw_json_dump(&result)?)?;
        log::info!("📋 Raw predictions saved to: {}", dump_path.display());
    }

    log::info!(
        "{} Processed {} file(s) in {:.1}s",
        symbols::completed_successfully(),
        batch.files.len(),
        pipeline_start.elapsed().as_secs_f64()
    );

    Ok(batch.files.len())
}

fn predict_sections_for_file(
    config: &PredictConfig,
    file: &UploadFile,
    result: &BatchResult,
    command_line: &[String],
    start_timestamp: chrono::DateTime<Utc>,
) -> Result<PredictSections> {
    Ok(PredictSections {
        damages: result.damages_for(&file.name).cloned().collect(),
        plates: result.plates_for(&file.name).cloned().collect(),
        config: Some(toml::Value::try_from(config)?),
        execution: Some(ExecutionContext {
            timestamp: Some(start_timestamp),
            fender_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            command_line: Some(command_line.to_vec()),
            api_url: Some(config.api_url.clone()),
        }),
    })
}

/// Write the overlay, converting to RGB for JPEG output (PNG keeps alpha).
fn save_overlay(canvas: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let preserve_alpha = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase() == "png")
        .unwrap_or(false);

    let output_img = if preserve_alpha {
        DynamicImage::ImageRgba8(canvas.clone())
    } else {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas.clone()).to_rgb8())
    };

    output_img.save(path)?;
    Ok(())
}
