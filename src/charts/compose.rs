use std::path::{Path, PathBuf};

use image::{imageops, DynamicImage, Rgb, RgbImage};
use tracing::{info, warn};

use crate::error::{AppError, Result};

/// Stack images top to bottom on a white canvas, each centred horizontally,
/// with `padding` pixels around and between them.
pub fn stack_vertically(images: &[DynamicImage], padding: u32) -> RgbImage {
    let max_width = images.iter().map(DynamicImage::width).max().unwrap_or(0);
    let total_height: u32 = images.iter().map(DynamicImage::height).sum();
    let rows = images.len() as u32;

    let mut canvas = RgbImage::from_pixel(
        max_width + 2 * padding,
        total_height + (rows + 1) * padding,
        Rgb([255, 255, 255]),
    );

    let mut y = padding;
    for img in images {
        let x = padding + (max_width - img.width()) / 2;
        imageops::replace(&mut canvas, &img.to_rgb8(), i64::from(x), i64::from(y));
        y += img.height() + padding;
    }
    canvas
}

/// Files in `dir`, sorted by name.
fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Combine every chart in `temp_dir` into one PNG under `output_dir`, then
/// clear the temp charts. Returns the written path.
pub fn combine_images(temp_dir: &Path, output_dir: &Path, padding: u32) -> Result<PathBuf> {
    if !temp_dir.exists() {
        return Err(AppError::InvalidInput(format!(
            "Temporary folder '{}' does not exist!",
            temp_dir.display()
        )));
    }

    let paths = list_files(temp_dir)?;
    let mut images = Vec::with_capacity(paths.len());
    for path in &paths {
        match image::load_from_memory(&std::fs::read(path)?) {
            Ok(img) => images.push(img),
            Err(e) => warn!("Skipping unreadable chart {}: {e}", path.display()),
        }
    }
    if images.is_empty() {
        return Err(AppError::InvalidInput("No images found in temp folder!".to_string()));
    }

    let canvas = stack_vertically(&images, padding);

    std::fs::create_dir_all(output_dir)?;
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let out_path = output_dir.join(format!("combined_chart_{stamp}.png"));
    canvas.save(&out_path)?;
    info!("Saved {}", out_path.display());

    for path in &paths {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove {}: {e}", path.display());
        }
    }
    Ok(out_path)
}
