//! Content library backed by sled
//!
//! Stores content items, attachments, option flags and administrative
//! notices. This is the host-side collaborator the rename engine, the bulk
//! orchestrator and the variant pipeline work against.
//!
//! Uses multiple sled trees:
//! - `items`: item id -> `ContentItem`
//! - `attachments`: attachment id -> `Attachment`
//! - `options`: option key -> string value
//! - `notices`: notice key -> message

use sled::{Db, Tree};
use std::path::Path;

use crate::options::OptionStore;

pub mod error;
pub mod types;

pub use error::LibraryError;
pub use types::{
    Attachment, AttachmentId, AttachmentMetadata, ContentItem, ContentStatus, ItemId, SizeVariant,
};
use types::id_key;

/// Library wrapper that encapsulates all store operations
pub struct Library {
    db: Db,
    items: Tree,
    attachments: Tree,
    options: Tree,
    notices: Tree,
}

fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, LibraryError> {
    Ok(bincode::encode_to_vec(value, bincode::config::standard())?)
}

fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, LibraryError> {
    let (value, _): (T, usize) = bincode::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(value)
}

impl Library {
    /// Opens or creates a library at the specified path
    ///
    /// # Examples
    /// ```no_run
    /// use slugshot::library::Library;
    /// let library = Library::open("my_library").unwrap();
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the database or one of its trees cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LibraryError> {
        let db = sled::open(path)?;
        let items = db.open_tree("items")?;
        let attachments = db.open_tree("attachments")?;
        let options = db.open_tree("options")?;
        let notices = db.open_tree("notices")?;
        Ok(Self {
            db,
            items,
            attachments,
            options,
            notices,
        })
    }

    /// Allocate a fresh record id
    ///
    /// Items and attachments share this id space. Ids start at 1.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the id counter cannot be advanced.
    pub fn next_id(&self) -> Result<u64, LibraryError> {
        Ok(self.db.generate_id()? + 1)
    }

    /// Insert or replace a content item
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if encoding or the write fails.
    pub fn put_item(&self, item: &ContentItem) -> Result<(), LibraryError> {
        self.items.insert(id_key(item.id.0), encode(item)?)?;
        Ok(())
    }

    /// Get a content item by id
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the read or decoding fails.
    pub fn get_item(&self, id: ItemId) -> Result<Option<ContentItem>, LibraryError> {
        self.items
            .get(id_key(id.0))?
            .map(|value| decode(&value))
            .transpose()
    }

    /// List all content items in ascending id order
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if iteration or decoding fails.
    pub fn list_items(&self) -> Result<Vec<ContentItem>, LibraryError> {
        self.items
            .iter()
            .values()
            .map(|value| decode(&value?))
            .collect()
    }

    /// Insert or replace an attachment
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if encoding or the write fails.
    pub fn put_attachment(&self, attachment: &Attachment) -> Result<(), LibraryError> {
        self.attachments
            .insert(id_key(attachment.id.0), encode(attachment)?)?;
        Ok(())
    }

    /// Get an attachment by id
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the read or decoding fails.
    pub fn get_attachment(&self, id: AttachmentId) -> Result<Option<Attachment>, LibraryError> {
        self.attachments
            .get(id_key(id.0))?
            .map(|value| decode(&value))
            .transpose()
    }

    /// Iterate items the bulk rename visits, in ascending id order
    fn bulk_eligible(&self) -> impl Iterator<Item = Result<ContentItem, LibraryError>> + '_ {
        self.items
            .iter()
            .values()
            .map(|value| decode::<ContentItem>(&value?))
            .filter(|item| item.as_ref().map_or(true, ContentItem::is_bulk_eligible))
    }

    /// Count items that have a featured image and a bulk-eligible status
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if iteration or decoding fails.
    pub fn count_bulk_eligible(&self) -> Result<usize, LibraryError> {
        self.bulk_eligible()
            .try_fold(0, |count, item| item.map(|_| count + 1))
    }

    /// Fetch one page of bulk-eligible items
    ///
    /// Pages are 1-based. Ordering is by ascending id, which renames never
    /// change, so consecutive pages visit every eligible item exactly once.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if iteration or decoding fails.
    pub fn bulk_page(&self, page: usize, batch: usize) -> Result<Vec<ContentItem>, LibraryError> {
        let offset = page.saturating_sub(1).saturating_mul(batch);
        self.bulk_eligible().skip(offset).take(batch).collect()
    }

    /// The item whose title names `attachment`
    ///
    /// Several items may feature the same attachment; the one with the lowest
    /// id that [can name it](ContentItem::can_name_image) owns it.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if iteration or decoding fails.
    pub fn owner_of(&self, attachment: AttachmentId) -> Result<Option<ItemId>, LibraryError> {
        for value in self.items.iter().values() {
            let item: ContentItem = decode(&value?)?;
            if item.featured_image == Some(attachment) && item.can_name_image() {
                return Ok(Some(item.id));
            }
        }
        Ok(None)
    }

    /// Record an administrative notice
    ///
    /// Notices are keyed, so raising the same notice twice keeps a single entry.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the write fails.
    pub fn add_notice(&self, key: &str, message: &str) -> Result<(), LibraryError> {
        self.notices.insert(key.as_bytes(), message.as_bytes())?;
        Ok(())
    }

    /// List all notices as `(key, message)` pairs sorted by key
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if iteration fails.
    pub fn list_notices(&self) -> Result<Vec<(String, String)>, LibraryError> {
        self.notices
            .iter()
            .map(|entry| {
                let (key, value) = entry?;
                Ok((
                    String::from_utf8_lossy(&key).into_owned(),
                    String::from_utf8_lossy(&value).into_owned(),
                ))
            })
            .collect()
    }

    /// Dismiss all notices
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if clearing the tree fails.
    pub fn clear_notices(&self) -> Result<(), LibraryError> {
        self.notices.clear()?;
        Ok(())
    }

    /// Flush all pending writes to disk
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the flush operation fails.
    pub fn flush(&self) -> Result<(), LibraryError> {
        self.db.flush()?;
        Ok(())
    }
}

impl OptionStore for Library {
    fn get_option(&self, key: &str) -> Result<Option<String>, LibraryError> {
        Ok(self
            .options
            .get(key.as_bytes())?
            .map(|value| String::from_utf8_lossy(&value).into_owned()))
    }

    fn set_option(&self, key: &str, value: &str) -> Result<(), LibraryError> {
        self.options.insert(key.as_bytes(), value.as_bytes())?;
        Ok(())
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        // Best-effort flush on drop. Callers should explicitly flush()
        // if they need guaranteed durability.
        let _ = self.db.flush();
    }
}
