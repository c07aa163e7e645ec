//! Screenshot post-processing.

use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;
use tracing::debug;

use crate::core::coords::Rotation;

/// Rotate a captured screenshot clockwise in place so it matches how the app is held.
pub fn rotate_in_place(path: &Path, rotation: Rotation) -> Result<()> {
    if rotation == Rotation::Deg0 {
        return Ok(());
    }
    let image = image::open(path).with_context(|| format!("open {}", path.display()))?;
    let rotated = rotate(image, rotation);
    rotated
        .save(path)
        .with_context(|| format!("save rotated {}", path.display()))?;
    debug!(path = %path.display(), degrees = rotation.degrees(), "rotated screenshot");
    Ok(())
}

fn rotate(image: DynamicImage, rotation: Rotation) -> DynamicImage {
    match rotation {
        Rotation::Deg0 => image,
        Rotation::Deg90 => image.rotate90(),
        Rotation::Deg180 => image.rotate180(),
        Rotation::Deg270 => image.rotate270(),
    }
}
