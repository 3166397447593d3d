use std::path::{Path, PathBuf};

use anyhow::Result;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use tracing::debug;

use crate::models::{BoundingBox, DefectType, InspectionReport, Severity};

const OUTLINE_THICKNESS: i32 = 3;

/// Crop the box plus `padding` pixels of context, clamped to the image
pub fn crop_region(image: &DynamicImage, bbox: &BoundingBox, padding: u32) -> DynamicImage {
    let pad = padding as f64;
    let x1 = ((bbox.x1 - pad).floor().max(0.0) as u32).min(image.width().saturating_sub(1));
    let y1 = ((bbox.y1 - pad).floor().max(0.0) as u32).min(image.height().saturating_sub(1));
    let x2 = ((bbox.x2 + pad).ceil().max(0.0) as u32).min(image.width());
    let y2 = ((bbox.y2 + pad).ceil().max(0.0) as u32).min(image.height());

    image.crop_imm(x1, y1, x2.saturating_sub(x1).max(1), y2.saturating_sub(y1).max(1))
}

fn tier_color(tier: Severity) -> Rgb<u8> {
    match tier {
        Severity::High => Rgb([220, 30, 30]),
        Severity::Medium => Rgb([245, 150, 20]),
        Severity::Low => Rgb([240, 220, 40]),
    }
}

/// Draw every reported box over the image, coloured by tier
pub fn annotate(image: &DynamicImage, report: &InspectionReport) -> RgbImage {
    let mut canvas = image.to_rgb8();

    for item in &report.detections {
        let bbox = &item.detection.bounding_box;
        let color = tier_color(item.severity.tier);

        for t in 0..OUTLINE_THICKNESS {
            let x = bbox.x1.round() as i32 - t;
            let y = bbox.y1.round() as i32 - t;
            let w = (bbox.width().round() as i32 + 2 * t).max(1) as u32;
            let h = (bbox.height().round() as i32 + 2 * t).max(1) as u32;
            draw_hollow_rect_mut(&mut canvas, Rect::at(x, y).of_size(w, h), color);
        }
    }

    canvas
}

pub fn save_annotated(image: &DynamicImage, report: &InspectionReport, path: &Path) -> Result<()> {
    annotate(image, report)
        .save(path)
        .map_err(|e| anyhow::anyhow!("Failed to save annotated image: {}", e))
}

/// Directory receiving the model input crop of every detection
#[derive(Debug, Clone)]
pub struct DebugOutput {
    dir: PathBuf,
}

impl DebugOutput {
    /// The directory must be empty or non-existent
    pub fn prepare(dir: PathBuf) -> Result<Self> {
        if dir.exists() {
            let entries = std::fs::read_dir(&dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for the crop of detection `index` (e.g. "03_crack.png")
    pub fn region_filename(index: usize, defect_type: DefectType) -> String {
        format!("{:02}_{}.png", index + 1, defect_type)
    }

    pub fn save_region(
        &self,
        index: usize,
        defect_type: DefectType,
        region: &DynamicImage,
    ) -> Result<()> {
        let filename = Self::region_filename(index, defect_type);
        region
            .save(self.dir.join(&filename))
            .map_err(|e| anyhow::anyhow!("Failed to save debug region: {}", e))?;
        debug!("Debug: saved {}", filename);
        Ok(())
    }
}
