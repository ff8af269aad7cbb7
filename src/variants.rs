//! WebP sibling generation
//!
//! For every JPEG or PNG attachment, writes `<file>.webp` next to the
//! original, each registered size and the downscaled `-scaled` copy when one
//! exists. Existing siblings are left alone. Encoding is delegated to the
//! first available [`WebpBackend`].

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::StorageConfig;
use crate::library::{Attachment, Library, LibraryError};
use crate::options::Settings;
use crate::slug::split_extension;

/// Notice key raised when no encoder is available
pub const UNAVAILABLE_NOTICE: &str = "webp-unavailable";

const UNAVAILABLE_MESSAGE: &str = "Image optimization is disabled because no WebP encoder is \
     available. Build with the `native-webp` feature or install `cwebp`.";

/// Lossy quality used by encoders that support it
pub const WEBP_QUALITY: u8 = 80;

#[derive(Debug, Error)]
pub enum VariantError {
    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("{program} exited with {status}")]
    CommandFailed { program: String, status: String },

    #[error("Library error: {0}")]
    LibraryError(#[from] LibraryError),
}

/// Something that can turn a JPEG or PNG file into a WebP file
pub trait WebpBackend {
    fn name(&self) -> &str;

    /// Encode `source` into `dest`, dropping embedded metadata
    ///
    /// # Errors
    ///
    /// Returns `VariantError` if the source cannot be read or the output
    /// cannot be written.
    fn encode(&self, source: &Path, dest: &Path) -> Result<(), VariantError>;
}

/// In-process encoder backed by the `image` crate
///
/// The `image` crate only writes lossless WebP, so output can be larger
/// than with `cwebp`.
#[cfg(feature = "native-webp")]
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeEncoder;

#[cfg(feature = "native-webp")]
impl WebpBackend for NativeEncoder {
    fn name(&self) -> &str {
        "native"
    }

    fn encode(&self, source: &Path, dest: &Path) -> Result<(), VariantError> {
        let img = image::open(source)?;
        // The WebP encoder only accepts 8-bit RGB(A)
        let rgba = image::DynamicImage::ImageRgba8(img.to_rgba8());
        rgba.save_with_format(dest, image::ImageFormat::WebP)?;
        Ok(())
    }
}

/// Encoder that shells out to `cwebp`
#[derive(Debug, Clone)]
pub struct CwebpCommand {
    program: PathBuf,
}

impl CwebpCommand {
    /// Locate `cwebp` on `PATH`
    #[must_use]
    pub fn detect() -> Option<Self> {
        which::which("cwebp").ok().map(|program| Self { program })
    }
}

impl WebpBackend for CwebpCommand {
    fn name(&self) -> &str {
        "cwebp"
    }

    fn encode(&self, source: &Path, dest: &Path) -> Result<(), VariantError> {
        let status = Command::new(&self.program)
            .arg("-quiet")
            .arg("-q")
            .arg(WEBP_QUALITY.to_string())
            .args(["-metadata", "none"])
            .arg(source)
            .arg("-o")
            .arg(dest)
            .status()?;

        if status.success() {
            Ok(())
        } else {
            Err(VariantError::CommandFailed {
                program: self.program.display().to_string(),
                status: status.to_string(),
            })
        }
    }
}

/// Available backends, preferred first
///
/// `cwebp` comes first because it writes lossy output at [`WEBP_QUALITY`].
#[must_use]
pub fn detect_backends() -> Vec<Box<dyn WebpBackend>> {
    let mut backends: Vec<Box<dyn WebpBackend>> = Vec::new();
    if let Some(cwebp) = CwebpCommand::detect() {
        backends.push(Box::new(cwebp));
    }
    #[cfg(feature = "native-webp")]
    backends.push(Box::new(NativeEncoder));
    backends
}

/// Whether a MIME type is eligible for WebP siblings
///
/// ```
/// use slugshot::variants::should_optimize;
/// assert!(should_optimize("image/jpeg"));
/// assert!(should_optimize("image/PNG"));
/// assert!(!should_optimize("image/gif"));
/// assert!(!should_optimize("application/png"));
/// ```
#[must_use]
pub fn should_optimize(mime_type: &str) -> bool {
    let Some((kind, subtype)) = mime_type.split_once('/') else {
        return false;
    };
    if kind != "image" {
        return false;
    }
    let subtype = subtype.to_lowercase();
    ["jpg", "jpeg", "png"].iter().any(|s| subtype.contains(s))
}

/// Path of the WebP sibling of `path`
#[must_use]
pub fn sibling_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".webp");
    PathBuf::from(name)
}

/// The downscaled `<stem>-scaled.<ext>` companion of `path`
fn scaled_path(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let (stem, ext) = split_extension(name);
    ext.map(|_| {
        let original_ext = &name[stem.len() + 1..];
        path.with_file_name(format!("{stem}-scaled.{original_ext}"))
    })
}

/// What a pipeline run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantOutcome {
    /// Optimization switches are off
    Disabled,
    /// The attachment's MIME type is not eligible
    Unsupported,
    /// No encoder is available; a notice was raised
    NoBackend,
    Generated {
        created: Vec<PathBuf>,
        existing: usize,
        failed: usize,
    },
}

/// Generates WebP siblings for attachments
pub struct VariantPipeline<'a> {
    library: &'a Library,
    storage: &'a StorageConfig,
    settings: &'a Settings,
    backends: Vec<Box<dyn WebpBackend>>,
}

impl<'a> VariantPipeline<'a> {
    /// Pipeline using every backend available on this system
    #[must_use]
    pub fn new(library: &'a Library, storage: &'a StorageConfig, settings: &'a Settings) -> Self {
        Self::with_backends(library, storage, settings, detect_backends())
    }

    #[must_use]
    pub fn with_backends(
        library: &'a Library,
        storage: &'a StorageConfig,
        settings: &'a Settings,
        backends: Vec<Box<dyn WebpBackend>>,
    ) -> Self {
        Self {
            library,
            storage,
            settings,
            backends,
        }
    }

    #[must_use]
    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Raise the persistent notice if no encoder is available
    ///
    /// Returns `true` when at least one backend exists.
    ///
    /// # Errors
    ///
    /// Returns `VariantError` if the notice cannot be stored.
    pub fn verify_capability(&self) -> Result<bool, VariantError> {
        if self.backends.is_empty() {
            warn!("no WebP encoder available");
            self.library.add_notice(UNAVAILABLE_NOTICE, UNAVAILABLE_MESSAGE)?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Files that should get a WebP sibling, original first
    #[must_use]
    pub fn targets(attachment: &Attachment) -> Vec<PathBuf> {
        let original = attachment.original_path();
        let mut targets = vec![original.clone()];

        if let Some(dir) = original.parent() {
            for size in attachment.metadata.sizes.values() {
                if !size.file.is_empty() {
                    targets.push(dir.join(&size.file));
                }
            }
        }
        if let Some(scaled) = scaled_path(&original).filter(|p| p.exists()) {
            targets.push(scaled);
        }

        let mut seen = std::collections::HashSet::new();
        targets.retain(|path| seen.insert(path.clone()));
        targets
    }

    /// Write missing WebP siblings for an attachment
    ///
    /// Encoding failures are logged and counted; they never fail the caller.
    ///
    /// # Errors
    ///
    /// Returns `VariantError` only if the missing-encoder notice cannot be stored.
    pub fn generate(&self, attachment: &Attachment) -> Result<VariantOutcome, VariantError> {
        if !self.settings.webp_enabled() {
            return Ok(VariantOutcome::Disabled);
        }
        if !should_optimize(&attachment.mime_type) {
            return Ok(VariantOutcome::Unsupported);
        }
        if !self.verify_capability()? {
            return Ok(VariantOutcome::NoBackend);
        }

        let mut created = Vec::new();
        let mut existing = 0;
        let mut failed = 0;
        for target in Self::targets(attachment) {
            match self.encode_file(&target) {
                Ok(Some(dest)) => created.push(dest),
                Ok(None) => existing += 1,
                Err(e) => {
                    warn!(file = %target.display(), "WebP encoding failed: {e}");
                    failed += 1;
                }
            }
        }

        Ok(VariantOutcome::Generated {
            created,
            existing,
            failed,
        })
    }

    /// Encode one file; `Ok(None)` when there is nothing to do
    fn encode_file(&self, source: &Path) -> Result<Option<PathBuf>, VariantError> {
        if !source.exists() {
            return Ok(None);
        }
        let ext = source
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| split_extension(n).1);
        if matches!(ext.as_deref(), Some("svg" | "webp")) {
            return Ok(None);
        }

        let dest = sibling_path(source);
        if dest.exists() {
            return Ok(None);
        }

        let partial = dest.with_extension("webp.part");
        let mut last_error = None;
        for backend in &self.backends {
            match backend.encode(source, &partial) {
                Ok(()) => {
                    fs::rename(&partial, &dest)?;
                    debug!(backend = backend.name(), file = %dest.display(), "wrote WebP sibling");
                    return Ok(Some(dest));
                }
                Err(e) => {
                    let _ = fs::remove_file(&partial);
                    last_error = Some(e);
                }
            }
        }
        last_error.map_or(Ok(None), Err)
    }

    /// File below the storage root that `url` addresses, if any
    ///
    /// Only plain path segments under the base URL are accepted; query
    /// strings and fragments are ignored.
    fn local_file(&self, url: &str) -> Option<PathBuf> {
        let base = self.storage.base_url.trim_end_matches('/');
        let rest = url.strip_prefix(base)?.strip_prefix('/')?;
        let rest = rest.split(['?', '#']).next().unwrap_or_default();
        let relative = Path::new(rest);
        if rest.is_empty() || !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return None;
        }
        Some(self.storage.root.join(relative)).filter(|path| path.is_file())
    }

    /// Public URL to serve for an attachment
    ///
    /// Appends `.webp` when the original has a WebP sibling, generating
    /// missing siblings first. `url` is the URL of whichever size is being
    /// rendered; if it points into the storage root, that file gets a
    /// sibling too.
    #[must_use]
    pub fn resolve_src(&self, attachment: &Attachment, url: &str) -> String {
        if !self.settings.webp_enabled() || !should_optimize(&attachment.mime_type) {
            return url.to_string();
        }

        let original_sibling = sibling_path(&attachment.original_path());
        if !original_sibling.exists() {
            if let Err(e) = self.generate(attachment) {
                warn!(attachment = attachment.id.0, "WebP generation failed: {e}");
            }
        }

        if let Some(rendered) = self.local_file(url) {
            if let Err(e) = self.encode_file(&rendered) {
                warn!(file = %rendered.display(), "WebP encoding failed: {e}");
            }
        }

        if original_sibling.exists() {
            format!("{url}.webp")
        } else {
            url.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::SizeVariant;
    use crate::testing::{TEST_BASE_URL, TestLibrary};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Writes a marker file and records what it was asked to encode
    struct FakeBackend {
        calls: Rc<RefCell<Vec<PathBuf>>>,
    }

    impl WebpBackend for FakeBackend {
        fn name(&self) -> &str {
            "fake"
        }

        fn encode(&self, source: &Path, dest: &Path) -> Result<(), VariantError> {
            self.calls.borrow_mut().push(source.to_path_buf());
            fs::write(dest, b"RIFF")?;
            Ok(())
        }
    }

    fn enabled() -> Settings {
        Settings {
            enable_optimization: true,
            enable_webp_generation: true,
            ..Settings::default()
        }
    }

    fn storage(t: &TestLibrary) -> StorageConfig {
        StorageConfig {
            root: t.storage_root().to_path_buf(),
            base_url: TEST_BASE_URL.to_string(),
        }
    }

    fn fake() -> (Vec<Box<dyn WebpBackend>>, Rc<RefCell<Vec<PathBuf>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let backend = FakeBackend {
            calls: Rc::clone(&calls),
        };
        (vec![Box::new(backend)], calls)
    }

    #[test]
    fn test_should_optimize() {
        assert!(should_optimize("image/jpeg"));
        assert!(should_optimize("image/jpg"));
        assert!(should_optimize("image/png"));
        assert!(!should_optimize("image/webp"));
        assert!(!should_optimize("image/svg+xml"));
        assert!(!should_optimize("text/plain"));
        assert!(!should_optimize("png"));
    }

    #[test]
    fn test_sibling_and_scaled_paths() {
        assert_eq!(
            sibling_path(Path::new("/u/photo.jpg")),
            PathBuf::from("/u/photo.jpg.webp")
        );
        assert_eq!(
            scaled_path(Path::new("/u/photo.JPG")),
            Some(PathBuf::from("/u/photo-scaled.JPG"))
        );
        assert_eq!(scaled_path(Path::new("/u/photo")), None);
    }

    #[test]
    fn test_disabled_does_nothing() {
        let t = TestLibrary::new();
        let attachment = t.add_image("a.png", 4, 4);
        let storage = storage(&t);
        let settings = Settings {
            enable_optimization: true,
            ..Settings::default()
        };
        let (backends, calls) = fake();
        let pipeline = VariantPipeline::with_backends(t.library(), &storage, &settings, backends);

        assert_eq!(pipeline.generate(&attachment).unwrap(), VariantOutcome::Disabled);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_generates_original_sizes_and_scaled() {
        let t = TestLibrary::new();
        let mut attachment = t.add_image("2024/05/photo.png", 4, 4);
        crate::testing::write_png(&t.storage_root().join("2024/05/photo-2x2.png"), 2, 2);
        crate::testing::write_png(&t.storage_root().join("2024/05/photo-scaled.png"), 3, 3);
        attachment.metadata.sizes.insert(
            "thumbnail".into(),
            SizeVariant {
                file: "photo-2x2.png".into(),
                width: 2,
                height: 2,
                mime_type: "image/png".into(),
            },
        );

        let storage = storage(&t);
        let settings = enabled();
        let (backends, calls) = fake();
        let pipeline = VariantPipeline::with_backends(t.library(), &storage, &settings, backends);

        let outcome = pipeline.generate(&attachment).unwrap();
        let VariantOutcome::Generated { created, existing, failed } = outcome else {
            panic!("expected generation, got {outcome:?}");
        };
        assert_eq!(created.len(), 3);
        assert_eq!((existing, failed), (0, 0));
        let dir = t.storage_root().join("2024/05");
        assert!(dir.join("photo.png.webp").exists());
        assert!(dir.join("photo-2x2.png.webp").exists());
        assert!(dir.join("photo-scaled.png.webp").exists());
        assert!(!dir.join("photo.png.webp.part").exists());
        assert_eq!(calls.borrow().len(), 3);
    }

    #[test]
    fn test_existing_sibling_is_not_regenerated() {
        let t = TestLibrary::new();
        let attachment = t.add_image("a.png", 4, 4);
        fs::write(sibling_path(&attachment.file), b"old").unwrap();

        let storage = storage(&t);
        let settings = enabled();
        let (backends, calls) = fake();
        let pipeline = VariantPipeline::with_backends(t.library(), &storage, &settings, backends);

        let outcome = pipeline.generate(&attachment).unwrap();
        assert_eq!(
            outcome,
            VariantOutcome::Generated {
                created: vec![],
                existing: 1,
                failed: 0
            }
        );
        assert!(calls.borrow().is_empty());
        assert_eq!(fs::read(sibling_path(&attachment.file)).unwrap(), b"old");
    }

    #[test]
    fn test_no_backend_raises_single_notice() {
        let t = TestLibrary::new();
        let attachment = t.add_image("a.png", 4, 4);
        let storage = storage(&t);
        let settings = enabled();
        let pipeline = VariantPipeline::with_backends(t.library(), &storage, &settings, Vec::new());

        assert_eq!(pipeline.generate(&attachment).unwrap(), VariantOutcome::NoBackend);
        assert_eq!(pipeline.generate(&attachment).unwrap(), VariantOutcome::NoBackend);

        let notices = t.library().list_notices().unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].0, UNAVAILABLE_NOTICE);
    }

    #[test]
    fn test_unsupported_mime_is_ignored() {
        let t = TestLibrary::new();
        let mut attachment = t.add_image("a.png", 4, 4);
        attachment.mime_type = "image/gif".into();
        let storage = storage(&t);
        let settings = enabled();
        let (backends, calls) = fake();
        let pipeline = VariantPipeline::with_backends(t.library(), &storage, &settings, backends);

        assert_eq!(pipeline.generate(&attachment).unwrap(), VariantOutcome::Unsupported);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_resolve_src() {
        let t = TestLibrary::new();
        let attachment = t.add_image("2024/05/a.png", 4, 4);
        let url = format!("{TEST_BASE_URL}/2024/05/a.png");
        let storage = storage(&t);

        let off = Settings::default();
        let (backends, _) = fake();
        let pipeline = VariantPipeline::with_backends(t.library(), &storage, &off, backends);
        assert_eq!(pipeline.resolve_src(&attachment, &url), url);

        let on = enabled();
        let (backends, _) = fake();
        let pipeline = VariantPipeline::with_backends(t.library(), &storage, &on, backends);
        assert_eq!(pipeline.resolve_src(&attachment, &url), format!("{url}.webp"));
        assert!(sibling_path(&attachment.file).exists());
    }

    #[test]
    fn test_resolve_src_stays_inside_storage_root() {
        let t = TestLibrary::new();
        let attachment = t.add_image("2024/05/a.png", 4, 4);
        let outside = t.storage_root().parent().unwrap().join("secret.png");
        crate::testing::write_png(&outside, 4, 4);
        let storage = storage(&t);
        let settings = enabled();
        let (backends, calls) = fake();
        let pipeline = VariantPipeline::with_backends(t.library(), &storage, &settings, backends);

        for url in [
            format!("{TEST_BASE_URL}/../secret.png"),
            format!("{TEST_BASE_URL}/2024/../../secret.png"),
            format!("{TEST_BASE_URL}X/../secret.png"),
        ] {
            assert_eq!(pipeline.resolve_src(&attachment, &url), format!("{url}.webp"));
        }
        assert!(!sibling_path(&outside).exists());
        assert!(calls.borrow().iter().all(|p| p.starts_with(t.storage_root())));
    }

    #[test]
    fn test_local_file_mapping() {
        let t = TestLibrary::new();
        t.add_image("2024/05/a.png", 4, 4);
        let storage = storage(&t);
        let settings = enabled();
        let pipeline = VariantPipeline::with_backends(t.library(), &storage, &settings, Vec::new());

        assert_eq!(
            pipeline.local_file(&format!("{TEST_BASE_URL}/2024/05/a.png?ver=2")),
            Some(t.storage_root().join("2024/05/a.png"))
        );
        assert_eq!(pipeline.local_file(&format!("{TEST_BASE_URL}X/2024/05/a.png")), None);
        assert_eq!(pipeline.local_file(&format!("{TEST_BASE_URL}/")), None);
        assert_eq!(pipeline.local_file(&format!("{TEST_BASE_URL}/2024/05")), None);
        assert_eq!(pipeline.local_file("https://elsewhere.test/2024/05/a.png"), None);
    }

    #[cfg(feature = "native-webp")]
    #[test]
    fn test_native_encoder_writes_webp() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.png");
        crate::testing::write_png(&source, 8, 8);
        let dest = dir.path().join("in.png.webp");

        NativeEncoder.encode(&source, &dest).unwrap();
        let bytes = fs::read(&dest).unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
    }
}
