use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::bookmarks::BookmarkNode;

/// Current payload format version
pub const FORMAT_VERSION: u32 = 1;

/// Payload written to the remote document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncData {
    pub version: u32,
    /// Epoch milliseconds of the push that produced this payload
    pub last_sync: i64,
    pub bookmarks: Vec<BookmarkNode>,
    #[serde(default)]
    pub checksum: String,
}

impl SyncData {
    /// Wrap a forest, stamping the current time and checksum
    pub fn new(bookmarks: Vec<BookmarkNode>) -> Self {
        let checksum = checksum(&bookmarks);
        Self {
            version: FORMAT_VERSION,
            last_sync: Utc::now().timestamp_millis(),
            bookmarks,
            checksum,
        }
    }

    /// Whether the stored checksum still matches the tree.
    pub fn verify_checksum(&self) -> bool {
        self.checksum == checksum(&self.bookmarks)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}

/// 32-bit rolling hash (`h = h * 31 + c`) over the UTF-16 code units of the
/// compact JSON form of the tree. Only a corruption signal, not a MAC.
pub fn checksum(bookmarks: &[BookmarkNode]) -> String {
    let json = serde_json::to_string(bookmarks).unwrap_or_default();
    let hash = json
        .encode_utf16()
        .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32));
    format!("{:x}", hash as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Vec<BookmarkNode> {
        vec![BookmarkNode::folder(
            "",
            vec![BookmarkNode::folder(
                "Bookmarks Bar",
                vec![BookmarkNode::leaf("Ünïcode ✓", "https://a.com")],
            )],
        )]
    }

    #[test]
    fn test_checksum_is_stable_and_sensitive() {
        let a = checksum(&tree());
        assert_eq!(a, checksum(&tree()));

        let mut changed = tree();
        if let BookmarkNode::Folder(root) = &mut changed[0] {
            root.children.push(BookmarkNode::leaf("B", "https://b.com"));
        }
        assert_ne!(a, checksum(&changed));
    }

    #[test]
    fn test_checksum_of_empty_forest() {
        // "[]" -> 91 * 31 + 93
        assert_eq!(checksum(&[]), format!("{:x}", 91 * 31 + 93));
    }

    #[test]
    fn test_envelope_json_shape() {
        let data = SyncData::new(tree());
        let value: serde_json::Value = serde_json::from_str(&data.to_json().unwrap()).unwrap();
        assert_eq!(value["version"], 1);
        assert!(value["lastSync"].is_i64());
        assert!(value["bookmarks"].is_array());
        assert_eq!(value["checksum"], data.checksum.as_str());

        let back = SyncData::from_json(&data.to_json().unwrap()).unwrap();
        assert!(back.verify_checksum());
    }

    #[test]
    fn test_tampered_payload_fails_verification() {
        let mut data = SyncData::new(tree());
        data.bookmarks.clear();
        assert!(!data.verify_checksum());
    }
}
