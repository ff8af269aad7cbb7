//! Attachment metadata generation
//!
//! Reads an image's dimensions and, when enabled, writes the registered size
//! variants next to it (`<stem>-<w>x<h>.<ext>`).

use image::{GenericImageView, imageops::FilterType};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::library::{AttachmentMetadata, SizeVariant};
use crate::slug::split_extension;

/// Errors raised while deriving metadata from an image file
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The image could not be decoded or a variant could not be encoded
    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    /// IO error while reading or writing files
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The file is not below the storage root
    #[error("{} is outside the storage root {}", .0.display(), .1.display())]
    OutsideStorageRoot(PathBuf, PathBuf),
}

pub type Result<T> = std::result::Result<T, MetadataError>;

/// A registered image size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeSpec {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    /// Crop to the exact box instead of fitting inside it
    pub crop: bool,
}

/// Sizes created for every uploaded image
pub const REGISTERED_SIZES: [SizeSpec; 4] = [
    SizeSpec { name: "thumbnail", width: 150, height: 150, crop: true },
    SizeSpec { name: "medium", width: 300, height: 300, crop: false },
    SizeSpec { name: "medium_large", width: 768, height: u32::MAX, crop: false },
    SizeSpec { name: "large", width: 1024, height: 1024, crop: false },
];

impl SizeSpec {
    /// Dimensions of this size for a source image, or `None` if the source
    /// is already small enough (images are never upscaled)
    #[must_use]
    pub fn target(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        if width == 0 || height == 0 {
            return None;
        }
        if self.crop {
            if width <= self.width && height <= self.height {
                return None;
            }
            return Some((width.min(self.width), height.min(self.height)));
        }
        if width <= self.width && height <= self.height {
            return None;
        }
        let ratio = f64::min(
            f64::from(self.width) / f64::from(width),
            f64::from(self.height) / f64::from(height),
        );
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let scaled = (
            ((f64::from(width) * ratio).round() as u32).max(1),
            ((f64::from(height) * ratio).round() as u32).max(1),
        );
        Some(scaled)
    }
}

/// MIME type for a lower-cased file extension
#[must_use]
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}

/// MIME type for a path, from its extension
#[must_use]
pub fn mime_for_path(path: &Path) -> &'static str {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| split_extension(n).1)
        .map_or("application/octet-stream", |ext| mime_for_extension(&ext))
}

/// Path of `path` relative to `root`, with `/` separators
///
/// # Errors
///
/// Returns `MetadataError::OutsideStorageRoot` if `path` is not below `root`.
pub fn relative_path(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| MetadataError::OutsideStorageRoot(path.to_path_buf(), root.to_path_buf()))?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

/// Generate metadata for the image at `path`
///
/// With `create_sizes`, every registered size smaller than the source is
/// written next to it and recorded under `sizes`.
///
/// # Errors
///
/// Returns `MetadataError` if the file is outside `storage_root`, cannot be
/// decoded, or a size variant cannot be written.
pub fn generate(path: &Path, storage_root: &Path, create_sizes: bool) -> Result<AttachmentMetadata> {
    let file = relative_path(storage_root, path)?;

    if !create_sizes {
        let (width, height) = image::image_dimensions(path)?;
        return Ok(AttachmentMetadata {
            width,
            height,
            file,
            sizes: BTreeMap::new(),
            original_image: None,
        });
    }

    let img = image::open(path)?;
    let (width, height) = img.dimensions();
    let dir = path.parent().unwrap_or(storage_root);
    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, ext) = split_extension(&basename);
    let ext = ext.unwrap_or_else(|| "png".to_string());
    let mime_type = mime_for_extension(&ext).to_string();

    let mut sizes = BTreeMap::new();
    for size in REGISTERED_SIZES {
        let Some((w, h)) = size.target(width, height) else {
            continue;
        };
        let resized = if size.crop {
            img.resize_to_fill(w, h, FilterType::Lanczos3)
        } else {
            img.resize_exact(w, h, FilterType::Lanczos3)
        };
        let variant_file = format!("{stem}-{w}x{h}.{ext}");
        resized.save(dir.join(&variant_file))?;
        sizes.insert(
            size.name.to_string(),
            SizeVariant {
                file: variant_file,
                width: w,
                height: h,
                mime_type: mime_type.clone(),
            },
        );
    }

    Ok(AttachmentMetadata {
        width,
        height,
        file,
        sizes,
        original_image: None,
    })
}
