//! Sorted, duplicate-free key sets used as adjacency lists.

use crate::error::{CodecError, CodecResult};

/// A sorted set of keys with a compact binary form.
///
/// Serialized as `count (u32 LE)` followed by `len (u32 LE) | bytes` per key.
/// Decoding rejects unsorted or duplicated input, so a stored list that
/// round-trips is always canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortedKeys(Vec<Vec<u8>>);

impl SortedKeys {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from keys in any order; duplicates collapse.
    #[must_use]
    pub fn from_unsorted(mut keys: Vec<Vec<u8>>) -> Self {
        keys.sort();
        keys.dedup();
        Self(keys)
    }

    /// Position of `key`, if present.
    #[must_use]
    pub fn find(&self, key: &[u8]) -> Option<usize> {
        self.0
            .binary_search_by(|existing| existing.as_slice().cmp(key))
            .ok()
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.find(key).is_some()
    }

    /// Inserts `key`; returns false when it was already present.
    pub fn insert(&mut self, key: Vec<u8>) -> bool {
        match self.0.binary_search(&key) {
            Ok(_) => false,
            Err(pos) => {
                self.0.insert(pos, key);
                true
            }
        }
    }

    /// Removes `key`; returns false when it was absent.
    pub fn remove(&mut self, key: &[u8]) -> bool {
        match self.find(key) {
            Some(pos) => {
                self.0.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Keys present in `self` but not in `other`.
    #[must_use]
    pub fn difference(&self, other: &SortedKeys) -> SortedKeys {
        Self(
            self.0
                .iter()
                .filter(|key| !other.contains(key))
                .cloned()
                .collect(),
        )
    }

    /// Keys present in either set.
    #[must_use]
    pub fn union(&self, other: &SortedKeys) -> SortedKeys {
        let mut merged = Vec::with_capacity(self.0.len() + other.0.len());
        let (mut i, mut j) = (0, 0);
        while i < self.0.len() && j < other.0.len() {
            match self.0[i].cmp(&other.0[j]) {
                std::cmp::Ordering::Less => {
                    merged.push(self.0[i].clone());
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    merged.push(other.0[j].clone());
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    merged.push(self.0[i].clone());
                    i += 1;
                    j += 1;
                }
            }
        }
        merged.extend_from_slice(&self.0[i..]);
        merged.extend_from_slice(&other.0[j..]);
        Self(merged)
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates keys in ascending order.
    pub fn iter(&self) -> std::slice::Iter<'_, Vec<u8>> {
        self.0.iter()
    }

    /// The keys as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Vec<u8>] {
        &self.0
    }

    /// Consumes the set.
    #[must_use]
    pub fn into_vec(self) -> Vec<Vec<u8>> {
        self.0
    }

    /// Encodes the set.
    #[must_use]
    pub fn marshal(&self) -> Vec<u8> {
        let body: usize = self.0.iter().map(|key| key.len() + 4).sum();
        let mut out = Vec::with_capacity(4 + body);
        out.extend_from_slice(&(self.0.len() as u32).to_le_bytes());
        for key in &self.0 {
            out.extend_from_slice(&(key.len() as u32).to_le_bytes());
            out.extend_from_slice(key);
        }
        out
    }

    /// Decodes a set produced by [`SortedKeys::marshal`].
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidStructure`] on truncation, trailing
    /// bytes, or keys that are not strictly ascending.
    pub fn unmarshal(data: &[u8]) -> CodecResult<Self> {
        let mut cursor = 0usize;
        let count = read_u32(data, &mut cursor)? as usize;
        let mut keys: Vec<Vec<u8>> = Vec::with_capacity(count.min(data.len() / 4));
        for _ in 0..count {
            let len = read_u32(data, &mut cursor)? as usize;
            let end = cursor
                .checked_add(len)
                .filter(|end| *end <= data.len())
                .ok_or_else(|| CodecError::invalid_structure("key extends past end"))?;
            let key = data[cursor..end].to_vec();
            if keys.last().is_some_and(|prev| *prev >= key) {
                return Err(CodecError::invalid_structure("keys are not strictly ascending"));
            }
            keys.push(key);
            cursor = end;
        }
        if cursor != data.len() {
            return Err(CodecError::invalid_structure(format!(
                "{} trailing bytes",
                data.len() - cursor
            )));
        }
        Ok(Self(keys))
    }
}

fn read_u32(data: &[u8], cursor: &mut usize) -> CodecResult<u32> {
    let bytes: [u8; 4] = data
        .get(*cursor..*cursor + 4)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| CodecError::invalid_structure("truncated length"))?;
    *cursor += 4;
    Ok(u32::from_le_bytes(bytes))
}

impl FromIterator<Vec<u8>> for SortedKeys {
    fn from_iter<T: IntoIterator<Item = Vec<u8>>>(iter: T) -> Self {
        Self::from_unsorted(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a SortedKeys {
    type Item = &'a Vec<u8>;
    type IntoIter = std::slice::Iter<'a, Vec<u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn keys(items: &[&str]) -> SortedKeys {
        items.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    #[test]
    fn insert_and_remove_keep_order() {
        let mut set = keys(&["b", "d"]);
        assert!(set.insert(b"c".to_vec()));
        assert!(!set.insert(b"c".to_vec()));
        assert!(set.insert(b"a".to_vec()));
        assert_eq!(set, keys(&["a", "b", "c", "d"]));

        assert!(set.remove(b"b"));
        assert!(!set.remove(b"b"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn set_algebra() {
        let left = keys(&["a", "b", "c"]);
        let right = keys(&["b", "d"]);
        assert_eq!(left.union(&right), keys(&["a", "b", "c", "d"]));
        assert_eq!(left.difference(&right), keys(&["a", "c"]));
        assert_eq!(right.difference(&left), keys(&["d"]));
    }

    #[test]
    fn unmarshal_rejects_unsorted() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&2u32.to_le_bytes());
        for key in [b"z", b"a"] {
            raw.extend_from_slice(&1u32.to_le_bytes());
            raw.extend_from_slice(key);
        }
        assert!(SortedKeys::unmarshal(&raw).is_err());
    }

    #[test]
    fn unmarshal_rejects_truncation() {
        let encoded = keys(&["alpha", "beta"]).marshal();
        assert!(SortedKeys::unmarshal(&encoded[..encoded.len() - 1]).is_err());
        assert!(SortedKeys::unmarshal(&[1, 0]).is_err());
    }

    proptest! {
        #[test]
        fn marshal_is_canonical(raw in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..12), 0..24)) {
            let set = SortedKeys::from_unsorted(raw.clone());
            let decoded = SortedKeys::unmarshal(&set.marshal()).unwrap();
            prop_assert_eq!(&decoded, &set);
            for key in &raw {
                prop_assert!(decoded.contains(key));
            }
            prop_assert!(decoded.as_slice().windows(2).all(|w| w[0] < w[1]));
        }
    }
}
