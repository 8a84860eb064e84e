//! Bucket-prefixed entity keys.

use crate::error::{CodecError, CodecResult};

/// Byte placed between a bucket prefix and the entity id.
///
/// Prefixes never contain it, so `image` and `image_component` keys cannot
/// interleave during a prefix scan.
pub const KEY_SEPARATOR: u8 = 0x00;

/// Encodes and decodes the keys of one entity category.
///
/// A key is `prefix | 0x00 | id`. Keys sort by id within a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketHandler {
    prefix: &'static str,
}

impl BucketHandler {
    /// Creates a handler for `prefix`.
    #[must_use]
    pub const fn new(prefix: &'static str) -> Self {
        Self { prefix }
    }

    /// The bucket prefix, without separator.
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        self.prefix
    }

    /// The byte prefix shared by every key in this bucket.
    #[must_use]
    pub fn key_prefix(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.prefix.len() + 1);
        out.extend_from_slice(self.prefix.as_bytes());
        out.push(KEY_SEPARATOR);
        out
    }

    /// Builds the key for `id`.
    #[must_use]
    pub fn get_key(&self, id: &str) -> Vec<u8> {
        let mut key = self.key_prefix();
        key.extend_from_slice(id.as_bytes());
        key
    }

    /// Builds keys for many ids, preserving order.
    pub fn get_keys<I, S>(&self, ids: I) -> Vec<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ids.into_iter().map(|id| self.get_key(id.as_ref())).collect()
    }

    /// Whether `key` lives in this bucket and carries a non-empty id.
    #[must_use]
    pub fn owns(&self, key: &[u8]) -> bool {
        let prefix = self.prefix.as_bytes();
        key.len() > prefix.len() + 1
            && key.starts_with(prefix)
            && key[prefix.len()] == KEY_SEPARATOR
    }

    /// Extracts the id from a key of this bucket.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::WrongBucket`] for foreign keys and
    /// [`CodecError::InvalidUtf8`] when the id bytes are not UTF-8.
    pub fn get_id(&self, key: &[u8]) -> CodecResult<String> {
        if !self.owns(key) {
            return Err(CodecError::WrongBucket {
                bucket: self.prefix.to_string(),
                key: String::from_utf8_lossy(key).into_owned(),
            });
        }
        let id = &key[self.prefix.len() + 1..];
        String::from_utf8(id.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Keeps only the keys of this bucket.
    pub fn filter_keys<'a, I>(&self, keys: I) -> Vec<Vec<u8>>
    where
        I: IntoIterator<Item = &'a Vec<u8>>,
    {
        keys.into_iter()
            .filter(|key| self.owns(key))
            .cloned()
            .collect()
    }

    /// Ids of the keys belonging to this bucket; foreign keys are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidUtf8`] for an owned key with a non UTF-8
    /// id.
    pub fn filtered_ids<'a, I>(&self, keys: I) -> CodecResult<Vec<String>>
    where
        I: IntoIterator<Item = &'a Vec<u8>>,
    {
        keys.into_iter()
            .filter(|key| self.owns(key))
            .map(|key| self.get_id(key))
            .collect()
    }
}

impl std::fmt::Display for BucketHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bucket:{}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMAGES: BucketHandler = BucketHandler::new("image");
    const COMPONENTS: BucketHandler = BucketHandler::new("image_component");

    #[test]
    fn key_round_trip() {
        let key = IMAGES.get_key("sha256:1");
        assert!(IMAGES.owns(&key));
        assert_eq!(IMAGES.get_id(&key).unwrap(), "sha256:1");
    }

    #[test]
    fn prefixes_do_not_overlap() {
        let component = COMPONENTS.get_key("openssl#1.1");
        assert!(!IMAGES.owns(&component));
        assert!(matches!(
            IMAGES.get_id(&component),
            Err(CodecError::WrongBucket { .. })
        ));
    }

    #[test]
    fn bare_prefix_is_not_a_key() {
        assert!(!IMAGES.owns(&IMAGES.key_prefix()));
    }

    #[test]
    fn keys_sort_by_id_within_bucket() {
        let mut keys = IMAGES.get_keys(["c", "a", "b"]);
        keys.sort();
        assert_eq!(IMAGES.filtered_ids(&keys).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn filtering_mixed_keys() {
        let keys = vec![
            IMAGES.get_key("i1"),
            COMPONENTS.get_key("c1"),
            IMAGES.get_key("i2"),
        ];
        assert_eq!(IMAGES.filter_keys(&keys).len(), 2);
        assert_eq!(COMPONENTS.filtered_ids(&keys).unwrap(), vec!["c1"]);
    }
}
