//! Record types stored in the library
//!
//! Content items and attachments share one id space. Ids are encoded as
//! big-endian bytes when used as tree keys so that iterating a tree visits
//! records in ascending id order.
//!
//! # Types
//!
//! - **`ContentItem`**: A titled piece of content with an optional featured image
//! - **`Attachment`**: A stored image file plus its derived metadata
//! - **`AttachmentMetadata`** / **`SizeVariant`**: Dimensions and registered size variants
//! - **`ContentStatus`**: Publication state of a content item

use super::error::LibraryError;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Identifier of a content item
#[derive(Encode, Decode, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(pub u64);

/// Identifier of an attachment
#[derive(Encode, Decode, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttachmentId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encode a record id as an order-preserving tree key
#[must_use]
pub const fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

/// Publication state of a content item
#[derive(Encode, Decode, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ContentStatus {
    Publish,
    Future,
    Draft,
    Pending,
    Private,
    /// Transient state of freshly created content that has no stable title yet
    AutoDraft,
}

impl ContentStatus {
    /// Statuses visited by the bulk rename
    pub const BULK_ELIGIBLE: [Self; 5] = [
        Self::Publish,
        Self::Future,
        Self::Draft,
        Self::Pending,
        Self::Private,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Future => "future",
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Private => "private",
            Self::AutoDraft => "auto-draft",
        }
    }

    #[must_use]
    pub fn is_bulk_eligible(self) -> bool {
        Self::BULK_ELIGIBLE.contains(&self)
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentStatus {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "publish" | "published" => Ok(Self::Publish),
            "future" | "scheduled" => Ok(Self::Future),
            "draft" => Ok(Self::Draft),
            "pending" => Ok(Self::Pending),
            "private" => Ok(Self::Private),
            "auto-draft" | "autodraft" => Ok(Self::AutoDraft),
            other => Err(LibraryError::InvalidInput(format!(
                "Unknown status '{other}'. Use publish, future, draft, pending, private or auto-draft"
            ))),
        }
    }
}

/// A titled piece of content
#[derive(Encode, Decode, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ContentItem {
    pub id: ItemId,
    pub title: String,
    pub status: ContentStatus,
    pub featured_image: Option<AttachmentId>,
}

impl ContentItem {
    #[must_use]
    pub fn new(id: ItemId, title: impl Into<String>, status: ContentStatus) -> Self {
        Self {
            id,
            title: title.into(),
            status,
            featured_image: None,
        }
    }

    #[must_use]
    pub const fn with_featured_image(mut self, attachment: AttachmentId) -> Self {
        self.featured_image = Some(attachment);
        self
    }

    /// Whether the bulk rename visits this item
    #[must_use]
    pub fn is_bulk_eligible(&self) -> bool {
        self.featured_image.is_some() && self.status.is_bulk_eligible()
    }

    /// Whether this item's title may name its featured image
    #[must_use]
    pub fn can_name_image(&self) -> bool {
        !self.title.trim().is_empty() && self.status != ContentStatus::AutoDraft
    }
}

/// One registered size variant of an image, stored next to the original
#[derive(Encode, Decode, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SizeVariant {
    /// Basename of the variant file, relative to the original's directory
    pub file: String,
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
}

/// Metadata derived from an attachment's backing file
#[derive(Encode, Decode, Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct AttachmentMetadata {
    pub width: u32,
    pub height: u32,
    /// Path relative to the storage root
    pub file: String,
    /// Size name -> variant
    pub sizes: BTreeMap<String, SizeVariant>,
    /// Basename of the pre-scaling original, when the stored file is a downscaled copy
    pub original_image: Option<String>,
}

/// A stored image file
#[derive(Encode, Decode, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub id: AttachmentId,
    /// Absolute path of the backing file
    pub file: PathBuf,
    /// Backing file path relative to the storage root
    pub relative_file: String,
    pub mime_type: String,
    /// Public identifier (the file's URL at the time it was last moved)
    pub guid: String,
    /// URL-safe name
    pub name: String,
    pub metadata: AttachmentMetadata,
}

impl Attachment {
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// Path of the untouched original upload
    ///
    /// Equal to `file` unless the stored file is a downscaled copy.
    #[must_use]
    pub fn original_path(&self) -> PathBuf {
        match (&self.metadata.original_image, self.file.parent()) {
            (Some(original), Some(dir)) => dir.join(original),
            _ => self.file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_key_orders_numerically() {
        let mut keys = vec![id_key(300), id_key(2), id_key(1 << 40), id_key(17)];
        keys.sort();
        let ids: Vec<u64> = keys.into_iter().map(u64::from_be_bytes).collect();
        assert_eq!(ids, vec![2, 17, 300, 1 << 40]);
    }

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!("publish".parse::<ContentStatus>().unwrap(), ContentStatus::Publish);
        assert_eq!("Scheduled".parse::<ContentStatus>().unwrap(), ContentStatus::Future);
        assert_eq!("auto-draft".parse::<ContentStatus>().unwrap(), ContentStatus::AutoDraft);
        assert_eq!(ContentStatus::AutoDraft.to_string(), "auto-draft");
        assert!("trash".parse::<ContentStatus>().is_err());
    }

    #[test]
    fn test_auto_draft_never_bulk_eligible() {
        let item = ContentItem::new(ItemId(1), "Title", ContentStatus::AutoDraft)
            .with_featured_image(AttachmentId(2));
        assert!(!item.is_bulk_eligible());

        let item = ContentItem::new(ItemId(1), "Title", ContentStatus::Private)
            .with_featured_image(AttachmentId(2));
        assert!(item.is_bulk_eligible());

        let item = ContentItem::new(ItemId(1), "Title", ContentStatus::Publish);
        assert!(!item.is_bulk_eligible());
    }

    #[test]
    fn test_original_path_prefers_original_image() {
        let mut attachment = Attachment {
            id: AttachmentId(1),
            file: PathBuf::from("/up/2024/05/photo-scaled.jpg"),
            relative_file: "2024/05/photo-scaled.jpg".into(),
            mime_type: "image/jpeg".into(),
            guid: String::new(),
            name: "photo".into(),
            metadata: AttachmentMetadata::default(),
        };
        assert_eq!(attachment.original_path(), attachment.file);

        attachment.metadata.original_image = Some("photo.jpg".into());
        assert_eq!(
            attachment.original_path(),
            PathBuf::from("/up/2024/05/photo.jpg")
        );
    }
}
