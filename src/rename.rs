//! Rename engine
//!
//! Renames an attachment's backing file so its basename matches the slug of
//! the title of the content item that features it, and keeps the attachment
//! record consistent with the new location.
//!
//! The operation is idempotent rather than transactional. A crash between
//! the move and the record update leaves the record pointing at a path that
//! no longer exists; the next pass reports that attachment as skipped.

use std::fmt;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::StorageConfig;
use crate::library::{Attachment, AttachmentId, ItemId, Library, LibraryError};
use crate::metadata::{self, relative_path};
use crate::options::Settings;
use crate::slug::{sanitize_title, split_extension, unique_filename};
use crate::variants::sibling_path;

/// Why a rename was not attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No attachment record, or its file is not on disk
    MissingFile,
    /// The attachment is not an image
    NotAnImage,
    /// The item is missing, has a blank title, or is an auto-draft
    IneligibleItem,
    /// Another item featuring the same attachment names it
    NotOwner,
    /// The title produces an empty slug
    EmptySlug,
    /// The file has no extension to preserve
    NoExtension,
    /// The file already carries the wanted name
    AlreadyNamed,
}

impl SkipReason {
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::MissingFile => "file missing",
            Self::NotAnImage => "not an image",
            Self::IneligibleItem => "item not eligible",
            Self::NotOwner => "named by another item",
            Self::EmptySlug => "title has no usable characters",
            Self::NoExtension => "file has no extension",
            Self::AlreadyNamed => "already named",
        }
    }
}

/// A rename that started mutating state and could not finish
#[derive(Debug, Error)]
pub enum RenameFailure {
    /// The file could not be moved; the record is untouched
    #[error("failed to move {}: {source}", path.display())]
    Move {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The moved file is not below the storage root
    #[error("{} is outside the storage root", .0.display())]
    OutsideStorageRoot(PathBuf),

    /// The library could not be read or updated
    #[error(transparent)]
    Store(#[from] LibraryError),
}

/// Result of one rename attempt
#[derive(Debug)]
pub enum RenameOutcome {
    Renamed { from: PathBuf, to: PathBuf },
    Skipped(SkipReason),
    Failed(RenameFailure),
}

impl RenameOutcome {
    #[must_use]
    pub const fn is_renamed(&self) -> bool {
        matches!(self, Self::Renamed { .. })
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for RenameOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Renamed { from, to } => {
                write!(f, "renamed {} -> {}", from.display(), to.display())
            }
            Self::Skipped(reason) => write!(f, "skipped ({})", reason.describe()),
            Self::Failed(failure) => write!(f, "error: {failure}"),
        }
    }
}

/// Receives attachments whose metadata was regenerated
pub trait MetadataHook {
    fn metadata_generated(&self, attachment: &Attachment);
}

/// Renames attachment files after their items' titles
pub struct RenameEngine<'a> {
    library: &'a Library,
    storage: &'a StorageConfig,
    settings: &'a Settings,
    hook: Option<&'a dyn MetadataHook>,
}

impl<'a> RenameEngine<'a> {
    #[must_use]
    pub const fn new(library: &'a Library, storage: &'a StorageConfig, settings: &'a Settings) -> Self {
        Self {
            library,
            storage,
            settings,
            hook: None,
        }
    }

    /// Notify `hook` after metadata is regenerated for a renamed file
    #[must_use]
    pub const fn with_hook(mut self, hook: &'a dyn MetadataHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Rename the attachment's file to the slug of the item's title
    ///
    /// Never panics and never returns `Err`: every failure is reported as an
    /// outcome so batch callers can tally it and move on.
    pub fn rename(&self, attachment_id: AttachmentId, item_id: ItemId) -> RenameOutcome {
        let outcome = self
            .try_rename(attachment_id, item_id)
            .unwrap_or_else(RenameOutcome::Failed);

        match &outcome {
            RenameOutcome::Renamed { from, to } => info!(
                attachment = attachment_id.0,
                item = item_id.0,
                from = %from.display(),
                to = %to.display(),
                "renamed attachment"
            ),
            RenameOutcome::Skipped(reason) => debug!(
                attachment = attachment_id.0,
                item = item_id.0,
                reason = reason.describe(),
                "skipped attachment"
            ),
            RenameOutcome::Failed(failure) => error!(
                attachment = attachment_id.0,
                item = item_id.0,
                "rename failed: {failure}"
            ),
        }
        outcome
    }

    fn try_rename(
        &self,
        attachment_id: AttachmentId,
        item_id: ItemId,
    ) -> Result<RenameOutcome, RenameFailure> {
        let skip = |reason: SkipReason| -> Result<RenameOutcome, RenameFailure> {
            Ok(RenameOutcome::Skipped(reason))
        };

        let Some(mut attachment) = self.library.get_attachment(attachment_id)? else {
            return skip(SkipReason::MissingFile);
        };
        if !attachment.file.exists() {
            return skip(SkipReason::MissingFile);
        }
        if !attachment.is_image() {
            return skip(SkipReason::NotAnImage);
        }

        let Some(item) = self.library.get_item(item_id)?.filter(|i| i.can_name_image()) else {
            return skip(SkipReason::IneligibleItem);
        };
        if self.library.owner_of(attachment_id)? != Some(item.id) {
            return skip(SkipReason::NotOwner);
        }

        let slug = sanitize_title(&item.title);
        if slug.is_empty() {
            return skip(SkipReason::EmptySlug);
        }

        let current = attachment
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(ext) = split_extension(&current).1 else {
            return skip(SkipReason::NoExtension);
        };

        let Some(dir) = attachment.file.parent().map(PathBuf::from) else {
            return skip(SkipReason::MissingFile);
        };
        let dest = unique_filename(&dir, &format!("{slug}.{ext}"), Some(&current));
        if dest == current {
            return skip(SkipReason::AlreadyNamed);
        }

        let from = attachment.file.clone();
        let to = dir.join(&dest);
        fs::rename(&from, &to).map_err(|source| RenameFailure::Move {
            path: from.clone(),
            source,
        })?;

        let relative = relative_path(&self.storage.root, &to)
            .map_err(|_| RenameFailure::OutsideStorageRoot(to.clone()))?;

        let previous_sizes: Vec<PathBuf> = attachment
            .metadata
            .sizes
            .values()
            .map(|size| dir.join(&size.file))
            .collect();

        attachment.file = to.clone();
        attachment.relative_file = relative.clone();
        match metadata::generate(&to, &self.storage.root, self.settings.create_intermediate_thumbnails) {
            Ok(meta) => attachment.metadata = meta,
            Err(e) => {
                warn!(attachment = attachment_id.0, "could not regenerate metadata: {e}");
                attachment.metadata.file = relative.clone();
            }
        }
        attachment.guid = self.storage.url_for(&relative);
        attachment.name = sanitize_title(&dest);
        self.library.put_attachment(&attachment)?;
        remove_stale_files(&from, &previous_sizes, &attachment, &dir);

        if let Some(hook) = self.hook {
            hook.metadata_generated(&attachment);
        }

        Ok(RenameOutcome::Renamed { from, to })
    }
}

/// Delete size variants and WebP siblings still carrying the old name
///
/// Files the updated record references are kept.
fn remove_stale_files(from: &Path, previous_sizes: &[PathBuf], attachment: &Attachment, dir: &Path) {
    let current: HashSet<PathBuf> = attachment
        .metadata
        .sizes
        .values()
        .map(|size| dir.join(&size.file))
        .chain([attachment.file.clone()])
        .collect();

    let mut stale = vec![sibling_path(from)];
    for size in previous_sizes.iter().filter(|path| !current.contains(*path)) {
        stale.push(sibling_path(size));
        stale.push(size.clone());
    }

    for path in stale.iter().filter(|path| !current.contains(*path)) {
        match fs::remove_file(path) {
            Ok(()) => debug!(file = %path.display(), "removed stale file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(file = %path.display(), "could not remove stale file: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::ContentStatus;
    use crate::testing::{TEST_BASE_URL, TestLibrary};
    use std::cell::RefCell;

    fn storage(test_library: &TestLibrary) -> StorageConfig {
        StorageConfig {
            root: test_library.storage_root().to_path_buf(),
            base_url: TEST_BASE_URL.to_string(),
        }
    }

    fn outcome(test_library: &TestLibrary, attachment: AttachmentId, item: ItemId) -> RenameOutcome {
        let storage = storage(test_library);
        let settings = Settings {
            create_intermediate_thumbnails: false,
            ..Settings::default()
        };
        RenameEngine::new(test_library.library(), &storage, &settings).rename(attachment, item)
    }

    #[test]
    fn test_rename_to_title_slug() {
        let t = TestLibrary::new();
        let attachment = t.add_image("2024/05/IMG_0001.png", 10, 10);
        let item = t.add_item("Olá Mundo", ContentStatus::Publish, Some(attachment.id));

        let result = outcome(&t, attachment.id, item.id);
        assert!(result.is_renamed(), "{result}");

        let expected = t.storage_root().join("2024/05/ola-mundo.png");
        assert!(expected.exists());
        assert!(!attachment.file.exists());

        let stored = t.library().get_attachment(attachment.id).unwrap().unwrap();
        assert_eq!(stored.file, expected);
        assert_eq!(stored.relative_file, "2024/05/ola-mundo.png");
        assert_eq!(stored.metadata.file, "2024/05/ola-mundo.png");
        assert_eq!((stored.metadata.width, stored.metadata.height), (10, 10));
        assert_eq!(stored.guid, format!("{TEST_BASE_URL}/2024/05/ola-mundo.png"));
        assert_eq!(stored.name, "ola-mundo-png");
    }

    #[test]
    fn test_already_named_is_skip_without_writes() {
        let t = TestLibrary::new();
        let attachment = t.add_image("hello-world.png", 4, 4);
        let item = t.add_item("Hello World", ContentStatus::Draft, Some(attachment.id));
        let before = t.library().get_attachment(attachment.id).unwrap();
        let modified = fs::metadata(&attachment.file).unwrap().modified().unwrap();

        let result = outcome(&t, attachment.id, item.id);
        assert!(matches!(result, RenameOutcome::Skipped(SkipReason::AlreadyNamed)));
        assert_eq!(t.library().get_attachment(attachment.id).unwrap(), before);
        assert_eq!(fs::metadata(&attachment.file).unwrap().modified().unwrap(), modified);
    }

    #[test]
    fn test_auto_draft_is_skipped() {
        let t = TestLibrary::new();
        let attachment = t.add_image("a.png", 4, 4);
        let item = t.add_item("A real title", ContentStatus::AutoDraft, Some(attachment.id));

        let result = outcome(&t, attachment.id, item.id);
        assert!(matches!(result, RenameOutcome::Skipped(SkipReason::IneligibleItem)));
        assert!(attachment.file.exists());
    }

    #[test]
    fn test_blank_title_and_empty_slug() {
        let t = TestLibrary::new();
        let attachment = t.add_image("a.png", 4, 4);

        let blank = t.add_item("   ", ContentStatus::Publish, Some(attachment.id));
        assert!(matches!(
            outcome(&t, attachment.id, blank.id),
            RenameOutcome::Skipped(SkipReason::IneligibleItem)
        ));

        let symbols = t.add_item("!!!", ContentStatus::Publish, Some(attachment.id));
        assert!(matches!(
            outcome(&t, attachment.id, symbols.id),
            RenameOutcome::Skipped(SkipReason::EmptySlug)
        ));
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let t = TestLibrary::new();
        let attachment = t.add_image("gone.png", 4, 4);
        let item = t.add_item("Gone", ContentStatus::Publish, Some(attachment.id));
        fs::remove_file(&attachment.file).unwrap();

        assert!(matches!(
            outcome(&t, attachment.id, item.id),
            RenameOutcome::Skipped(SkipReason::MissingFile)
        ));
        assert!(matches!(
            outcome(&t, AttachmentId(4242), item.id),
            RenameOutcome::Skipped(SkipReason::MissingFile)
        ));
    }

    #[test]
    fn test_non_image_and_no_extension() {
        let t = TestLibrary::new();
        let doc_path = t.storage_root().join("notes.txt");
        fs::write(&doc_path, b"text").unwrap();
        let doc = t.register_file(&doc_path);
        let item = t.add_item("Notes", ContentStatus::Publish, Some(doc.id));
        assert!(matches!(
            outcome(&t, doc.id, item.id),
            RenameOutcome::Skipped(SkipReason::NotAnImage)
        ));

        let bare_path = t.storage_root().join("bare");
        fs::write(&bare_path, b"x").unwrap();
        let mut bare = t.register_file(&bare_path);
        bare.mime_type = "image/png".into();
        t.library().put_attachment(&bare).unwrap();
        let item = t.add_item("Bare", ContentStatus::Publish, Some(bare.id));
        assert!(matches!(
            outcome(&t, bare.id, item.id),
            RenameOutcome::Skipped(SkipReason::NoExtension)
        ));
    }

    #[test]
    fn test_collision_gets_suffix_and_converges() {
        let t = TestLibrary::new();
        let first = t.add_image("one.png", 4, 4);
        let second = t.add_image("two.png", 4, 4);
        let a = t.add_item("Same Title", ContentStatus::Publish, Some(first.id));
        let b = t.add_item("Same Title", ContentStatus::Publish, Some(second.id));

        assert!(outcome(&t, first.id, a.id).is_renamed());
        assert!(outcome(&t, second.id, b.id).is_renamed());
        assert!(t.storage_root().join("same-title.png").exists());
        assert!(t.storage_root().join("same-title-1.png").exists());

        assert!(matches!(
            outcome(&t, first.id, a.id),
            RenameOutcome::Skipped(SkipReason::AlreadyNamed)
        ));
        assert!(matches!(
            outcome(&t, second.id, b.id),
            RenameOutcome::Skipped(SkipReason::AlreadyNamed)
        ));
    }

    #[test]
    fn test_shared_attachment_is_named_by_lowest_id_item() {
        let t = TestLibrary::new();
        let shared = t.add_image("shared.png", 4, 4);
        let alpha = t.add_item("Alpha", ContentStatus::Publish, Some(shared.id));
        let beta = t.add_item("Beta", ContentStatus::Publish, Some(shared.id));

        assert!(matches!(
            outcome(&t, shared.id, beta.id),
            RenameOutcome::Skipped(SkipReason::NotOwner)
        ));
        assert!(shared.file.exists());

        assert!(outcome(&t, shared.id, alpha.id).is_renamed());
        assert!(matches!(
            outcome(&t, shared.id, beta.id),
            RenameOutcome::Skipped(SkipReason::NotOwner)
        ));
        assert!(matches!(
            outcome(&t, shared.id, alpha.id),
            RenameOutcome::Skipped(SkipReason::AlreadyNamed)
        ));
        assert!(t.storage_root().join("alpha.png").exists());
    }

    #[test]
    fn test_auto_draft_does_not_own_shared_attachment() {
        let t = TestLibrary::new();
        let shared = t.add_image("shared.png", 4, 4);
        t.add_item("Draft Title", ContentStatus::AutoDraft, Some(shared.id));
        let real = t.add_item("Real Title", ContentStatus::Draft, Some(shared.id));

        assert!(outcome(&t, shared.id, real.id).is_renamed());
        assert!(t.storage_root().join("real-title.png").exists());
    }

    #[test]
    fn test_old_sizes_and_siblings_are_removed() {
        let t = TestLibrary::new();
        let mut attachment = t.add_image("2024/05/IMG_0001.png", 400, 200);
        attachment.metadata =
            metadata::generate(&attachment.file, t.storage_root(), true).unwrap();
        t.library().put_attachment(&attachment).unwrap();
        let dir = t.storage_root().join("2024/05");
        let old_thumb = dir.join("IMG_0001-150x150.png");
        assert!(old_thumb.exists());
        fs::write(sibling_path(&attachment.file), b"RIFF").unwrap();
        fs::write(sibling_path(&old_thumb), b"RIFF").unwrap();
        let item = t.add_item("Beach Day", ContentStatus::Publish, Some(attachment.id));

        let storage = storage(&t);
        let settings = Settings {
            create_intermediate_thumbnails: true,
            ..Settings::default()
        };
        let result = RenameEngine::new(t.library(), &storage, &settings).rename(attachment.id, item.id);
        assert!(result.is_renamed(), "{result}");

        assert!(!old_thumb.exists());
        assert!(!sibling_path(&old_thumb).exists());
        assert!(!dir.join("IMG_0001.png.webp").exists());
        assert!(!dir.join("IMG_0001-300x150.png").exists());
        assert!(dir.join("beach-day.png").exists());
        assert!(dir.join("beach-day-150x150.png").exists());
        assert!(dir.join("beach-day-300x150.png").exists());

        let stored = t.library().get_attachment(attachment.id).unwrap().unwrap();
        assert_eq!(stored.metadata.sizes["thumbnail"].file, "beach-day-150x150.png");
    }

    #[test]
    fn test_outside_storage_root_is_error() {
        let t = TestLibrary::new();
        let outside = tempfile::tempdir().unwrap();
        let path = outside.path().join("stray.png");
        crate::testing::write_png(&path, 4, 4);

        let mut attachment = t.add_image("inside.png", 4, 4);
        attachment.file = path;
        t.library().put_attachment(&attachment).unwrap();
        let item = t.add_item("Stray Photo", ContentStatus::Publish, Some(attachment.id));

        let result = outcome(&t, attachment.id, item.id);
        assert!(matches!(
            result,
            RenameOutcome::Failed(RenameFailure::OutsideStorageRoot(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_move_leaves_record_untouched() {
        use std::os::unix::fs::PermissionsExt;

        let t = TestLibrary::new();
        let attachment = t.add_image("locked/photo.png", 4, 4);
        let item = t.add_item("Locked", ContentStatus::Publish, Some(attachment.id));
        let dir = t.storage_root().join("locked");
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o555)).unwrap();

        // Privileged users can write regardless of mode bits
        if fs::write(dir.join("writable"), b"x").is_ok() {
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let before = t.library().get_attachment(attachment.id).unwrap();
        let result = outcome(&t, attachment.id, item.id);
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(result, RenameOutcome::Failed(RenameFailure::Move { .. })));
        assert_eq!(t.library().get_attachment(attachment.id).unwrap(), before);
    }

    #[test]
    fn test_hook_sees_regenerated_attachment() {
        struct Recorder(RefCell<Vec<String>>);
        impl MetadataHook for Recorder {
            fn metadata_generated(&self, attachment: &Attachment) {
                self.0.borrow_mut().push(attachment.relative_file.clone());
            }
        }

        let t = TestLibrary::new();
        let attachment = t.add_image("x.png", 4, 4);
        let item = t.add_item("Hooked", ContentStatus::Publish, Some(attachment.id));
        let storage = storage(&t);
        let settings = Settings::default();
        let recorder = Recorder(RefCell::new(Vec::new()));

        let result = RenameEngine::new(t.library(), &storage, &settings)
            .with_hook(&recorder)
            .rename(attachment.id, item.id);
        assert!(result.is_renamed());
        assert_eq!(*recorder.0.borrow(), vec!["hooked.png".to_string()]);
    }
}
