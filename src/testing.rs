//! Testing utilities for slugshot
//!
//! This module provides a `TestLibrary` wrapper for temporary library
//! management and helpers that place real image files in a storage root.
//!
//! Only available when compiled with `cfg(test)`.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::library::{
    Attachment, AttachmentId, AttachmentMetadata, ContentItem, ContentStatus, ItemId, Library,
};
use crate::metadata::{mime_for_path, relative_path};

/// Base URL used for attachment GUIDs in tests
pub const TEST_BASE_URL: &str = "https://media.test/uploads";

/// A temporary library plus a storage root, both removed on drop
pub struct TestLibrary {
    library: Library,
    storage_root: PathBuf,
    // Held for its Drop
    _dir: TempDir,
}

impl TestLibrary {
    /// Create an empty library and storage root in a fresh temporary directory
    ///
    /// # Panics
    /// Panics if the temporary directory or the database cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let library = Library::open(dir.path().join("library")).expect("Failed to open test library");
        let storage_root = dir.path().join("uploads");
        std::fs::create_dir_all(&storage_root).expect("Failed to create storage root");
        Self {
            library,
            storage_root,
            _dir: dir,
        }
    }

    #[must_use]
    pub const fn library(&self) -> &Library {
        &self.library
    }

    #[must_use]
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Write a PNG at `relative` below the storage root and register it as an attachment
    ///
    /// # Panics
    /// Panics if the file or the record cannot be written.
    pub fn add_image(&self, relative: &str, width: u32, height: u32) -> Attachment {
        let path = self.storage_root.join(relative);
        write_png(&path, width, height);
        self.register_file(&path)
    }

    /// Register an existing file below the storage root as an attachment
    ///
    /// # Panics
    /// Panics if the file is outside the storage root or the record cannot be written.
    pub fn register_file(&self, path: &Path) -> Attachment {
        let id = AttachmentId(self.library.next_id().expect("id"));
        let relative = relative_path(&self.storage_root, path).expect("inside storage root");
        let attachment = Attachment {
            id,
            file: path.to_path_buf(),
            relative_file: relative.clone(),
            mime_type: mime_for_path(path).to_string(),
            guid: format!("{TEST_BASE_URL}/{relative}"),
            name: String::new(),
            metadata: AttachmentMetadata {
                file: relative,
                ..AttachmentMetadata::default()
            },
        };
        self.library.put_attachment(&attachment).expect("put attachment");
        attachment
    }

    /// Create a content item, optionally featuring an attachment
    ///
    /// # Panics
    /// Panics if the record cannot be written.
    pub fn add_item(
        &self,
        title: &str,
        status: ContentStatus,
        featured: Option<AttachmentId>,
    ) -> ContentItem {
        let id = ItemId(self.library.next_id().expect("id"));
        let mut item = ContentItem::new(id, title, status);
        item.featured_image = featured;
        self.library.put_item(&item).expect("put item");
        item
    }
}

impl Default for TestLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Write a solid-colour PNG, creating parent directories
///
/// # Panics
/// Panics if the directory or the image cannot be written.
pub fn write_png(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create image directory");
    }
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 90]));
    img.save(path).expect("Failed to write test image");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_cleanup() {
        let root;
        {
            let test_library = TestLibrary::new();
            root = test_library.storage_root().to_path_buf();
            assert!(root.exists());
        }
        assert!(!root.exists());
    }

    #[test]
    fn test_add_image_registers_attachment() {
        let test_library = TestLibrary::new();
        let attachment = test_library.add_image("2024/05/photo.png", 8, 8);

        assert!(attachment.file.exists());
        assert_eq!(attachment.relative_file, "2024/05/photo.png");
        assert_eq!(attachment.mime_type, "image/png");
        let stored = test_library
            .library()
            .get_attachment(attachment.id)
            .unwrap();
        assert_eq!(stored, Some(attachment));
    }
}
