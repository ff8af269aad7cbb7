//! Event pipeline
//!
//! Host events are routed through an explicit table: content saves trigger a
//! rename of the featured image, regenerated metadata triggers WebP
//! generation, and update-check ticks consult the release resolver. The
//! pipeline also owns attachment import and metadata regeneration, which
//! raise the metadata event themselves.

use chrono::{Datelike, Utc};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::SlugshotError;
use crate::config::SlugshotConfig;
use crate::library::{
    Attachment, AttachmentId, AttachmentMetadata, ContentItem, ContentStatus, ItemId, Library,
};
use crate::metadata::{self, mime_for_path, relative_path};
use crate::release::{HostInfo, ReleaseSource, UpdateOffer, UpdateResolver};
use crate::rename::{MetadataHook, RenameEngine, RenameOutcome};
use crate::slug::{sanitize_title, split_extension, unique_filename};
use crate::variants::{VariantOutcome, VariantPipeline};

type Result<T> = std::result::Result<T, SlugshotError>;

/// Something the host reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A content item was written
    ContentSaved {
        item: ItemId,
        autosave: bool,
        revision: bool,
    },
    /// An attachment's metadata was (re)generated
    MetadataGenerated { attachment: AttachmentId },
    /// Periodic update check; `checked` lists the installed packages the host looked at
    UpdateCheck { checked: Vec<String> },
}

/// What a dispatched event did
#[derive(Debug)]
pub enum StageReport {
    /// The stage did not run
    Skipped(&'static str),
    Renamed(RenameOutcome),
    Variants(VariantOutcome),
    /// Update check result; `None` when no newer release exists
    Update(Option<UpdateOffer>),
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped(reason) => write!(f, "skipped: {reason}"),
            Self::Renamed(outcome) => write!(f, "{outcome}"),
            Self::Variants(VariantOutcome::Disabled) => f.write_str("WebP generation disabled"),
            Self::Variants(VariantOutcome::Unsupported) => f.write_str("not a JPEG or PNG image"),
            Self::Variants(VariantOutcome::NoBackend) => f.write_str("no WebP encoder available"),
            Self::Variants(VariantOutcome::Generated {
                created,
                existing,
                failed,
            }) => write!(
                f,
                "{} WebP file(s) created, {existing} already present, {failed} failed",
                created.len()
            ),
            Self::Update(Some(offer)) => write!(f, "update available: {}", offer.new_version),
            Self::Update(None) => f.write_str("up to date"),
        }
    }
}

/// Routes events to the rename engine, the variant pipeline and the resolver
pub struct Pipeline<'a> {
    library: &'a Library,
    config: &'a SlugshotConfig,
    settings: &'a crate::options::Settings,
    variants: VariantPipeline<'a>,
    releases: Option<&'a dyn ReleaseSource>,
}

impl<'a> Pipeline<'a> {
    /// Pipeline with every WebP backend available on this system
    #[must_use]
    pub fn new(
        library: &'a Library,
        config: &'a SlugshotConfig,
        settings: &'a crate::options::Settings,
    ) -> Self {
        let variants = VariantPipeline::new(library, &config.storage, settings);
        Self::with_variants(library, config, settings, variants)
    }

    #[must_use]
    pub fn with_variants(
        library: &'a Library,
        config: &'a SlugshotConfig,
        settings: &'a crate::options::Settings,
        variants: VariantPipeline<'a>,
    ) -> Self {
        Self {
            library,
            config,
            settings,
            variants,
            releases: None,
        }
    }

    /// Answer update checks from `source`
    #[must_use]
    pub fn with_release_source(mut self, source: &'a dyn ReleaseSource) -> Self {
        self.releases = Some(source);
        self
    }

    #[must_use]
    pub const fn library(&self) -> &'a Library {
        self.library
    }

    #[must_use]
    pub const fn config(&self) -> &'a SlugshotConfig {
        self.config
    }

    #[must_use]
    pub const fn variants(&self) -> &VariantPipeline<'a> {
        &self.variants
    }

    /// Rename engine that reports regenerated metadata back to this pipeline
    #[must_use]
    pub fn rename_engine(&self) -> RenameEngine<'_> {
        RenameEngine::new(self.library, &self.config.storage, self.settings).with_hook(self)
    }

    /// Resolver over the configured release source
    #[must_use]
    pub fn resolver(&self) -> Option<UpdateResolver<'a, dyn ReleaseSource + 'a>> {
        self.releases
            .map(|source| UpdateResolver::new(source, self.settings, HostInfo::from_config(self.config)))
    }

    /// Run the stage registered for `event`
    ///
    /// # Errors
    ///
    /// Returns `SlugshotError` if a record the stage needs cannot be read.
    /// Rename failures and encoding failures are reported, not returned.
    pub fn dispatch(&self, event: Event) -> Result<StageReport> {
        debug!(?event, "dispatching event");
        match event {
            Event::ContentSaved {
                item,
                autosave,
                revision,
            } => self.on_content_saved(item, autosave, revision),
            Event::MetadataGenerated { attachment } => self.on_metadata_generated(attachment),
            Event::UpdateCheck { checked } => Ok(self.on_update_check(&checked)),
        }
    }

    fn on_content_saved(&self, id: ItemId, autosave: bool, revision: bool) -> Result<StageReport> {
        if autosave {
            return Ok(StageReport::Skipped("autosave"));
        }
        if revision {
            return Ok(StageReport::Skipped("revision"));
        }
        if !self.settings.rename_on_save {
            return Ok(StageReport::Skipped("rename on save is disabled"));
        }
        let Some(item) = self.library.get_item(id)? else {
            return Ok(StageReport::Skipped("item not found"));
        };
        if item.status == ContentStatus::AutoDraft {
            return Ok(StageReport::Skipped("auto-draft"));
        }
        let Some(attachment) = item.featured_image else {
            return Ok(StageReport::Skipped("no featured image"));
        };

        Ok(StageReport::Renamed(
            self.rename_engine().rename(attachment, item.id),
        ))
    }

    fn on_metadata_generated(&self, id: AttachmentId) -> Result<StageReport> {
        let Some(attachment) = self.library.get_attachment(id)? else {
            return Ok(StageReport::Skipped("attachment not found"));
        };
        Ok(StageReport::Variants(self.variants.generate(&attachment)?))
    }

    fn on_update_check(&self, checked: &[String]) -> StageReport {
        if checked.is_empty() {
            return StageReport::Skipped("host checked no packages");
        }
        let Some(resolver) = self.resolver() else {
            return StageReport::Skipped("no release source");
        };
        StageReport::Update(resolver.check_for_update(crate::VERSION))
    }

    /// Write an item and raise [`Event::ContentSaved`] for it
    ///
    /// # Errors
    ///
    /// Returns `SlugshotError` if the item cannot be stored.
    pub fn save_item(&self, item: &ContentItem, autosave: bool, revision: bool) -> Result<StageReport> {
        self.library.put_item(item)?;
        self.dispatch(Event::ContentSaved {
            item: item.id,
            autosave,
            revision,
        })
    }

    /// Copy a file into `<storage root>/<year>/<month>/` and register it
    ///
    /// The file keeps its name unless that name is taken. Metadata is
    /// generated for images, which raises [`Event::MetadataGenerated`].
    ///
    /// # Errors
    ///
    /// Returns `SlugshotError` if the file cannot be copied or the record
    /// cannot be stored.
    pub fn import(&self, source: &Path) -> Result<Attachment> {
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| SlugshotError::InvalidInput(format!("{} is not a file", source.display())))?;

        let now = Utc::now();
        let dir = self
            .config
            .storage
            .root
            .join(format!("{:04}", now.year()))
            .join(format!("{:02}", now.month()));
        fs::create_dir_all(&dir)?;

        let dest: PathBuf = dir.join(unique_filename(&dir, &filename, None));
        fs::copy(source, &dest)?;

        let relative = relative_path(&self.config.storage.root, &dest)?;
        let (stem, _) = split_extension(&filename);
        let mut attachment = Attachment {
            id: AttachmentId(self.library.next_id()?),
            file: dest.clone(),
            relative_file: relative.clone(),
            mime_type: mime_for_path(&dest).to_string(),
            guid: self.config.storage.url_for(&relative),
            name: sanitize_title(stem),
            metadata: AttachmentMetadata {
                file: relative,
                ..AttachmentMetadata::default()
            },
        };
        info!(attachment = attachment.id.0, file = %dest.display(), "imported file");

        if attachment.is_image() {
            attachment.metadata = metadata::generate(
                &dest,
                &self.config.storage.root,
                self.settings.create_intermediate_thumbnails,
            )?;
        }
        self.library.put_attachment(&attachment)?;

        if attachment.is_image() {
            self.metadata_generated(&attachment);
        }
        Ok(attachment)
    }

    /// Regenerate an attachment's metadata from its file
    ///
    /// # Errors
    ///
    /// Returns `SlugshotError` if the attachment is unknown, its file cannot
    /// be decoded, or the record cannot be stored.
    pub fn regenerate(&self, id: AttachmentId) -> Result<Attachment> {
        let mut attachment = self
            .library
            .get_attachment(id)?
            .ok_or(crate::library::LibraryError::AttachmentNotFound(id.0))?;

        let original_image = attachment.metadata.original_image.take();
        attachment.metadata = metadata::generate(
            &attachment.file,
            &self.config.storage.root,
            self.settings.create_intermediate_thumbnails,
        )?;
        attachment.metadata.original_image = original_image;
        self.library.put_attachment(&attachment)?;

        self.metadata_generated(&attachment);
        Ok(attachment)
    }
}

impl MetadataHook for Pipeline<'_> {
    fn metadata_generated(&self, attachment: &Attachment) {
        match self.variants.generate(attachment) {
            Ok(outcome) => debug!(attachment = attachment.id.0, ?outcome, "variant stage finished"),
            Err(e) => warn!(attachment = attachment.id.0, "variant stage failed: {e}"),
        }
    }
}
