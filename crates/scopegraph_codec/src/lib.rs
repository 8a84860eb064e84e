//! # scopegraph codec
//!
//! Byte-level encodings shared by every scopegraph crate:
//!
//! - [`BucketHandler`] turns `(category prefix, id)` into a sortable key and
//!   back. Keys of one bucket are contiguous, so a prefix scan walks exactly
//!   one category.
//! - [`EdgeId`] names an edge record by its two endpoint IDs.
//! - [`SortedKeys`] is the sorted, duplicate-free key set stored for every
//!   adjacency list.
//! - [`to_record`] / [`from_record`] serialize entity records as CBOR.
//!
//! ```
//! use scopegraph_codec::BucketHandler;
//!
//! const IMAGES: BucketHandler = BucketHandler::new("image");
//! let key = IMAGES.get_key("sha256:abc");
//! assert_eq!(IMAGES.get_id(&key).unwrap(), "sha256:abc");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bucket;
mod edge;
mod error;
mod record;
mod sorted_keys;

pub use bucket::{BucketHandler, KEY_SEPARATOR};
pub use edge::EdgeId;
pub use error::{CodecError, CodecResult};
pub use record::{from_record, to_record};
pub use sorted_keys::SortedKeys;
