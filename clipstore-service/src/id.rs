//! Identifiers for stored objects and video records.
//!
//! Both identifiers wrap a time-ordered [`Uuid`] (version 7), so sorting by id approximates
//! creation order. They are rendered and parsed in the hyphenated UUID form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

macro_rules! uuid_id {
    ($(#[$attr:meta])* $name:ident, $what:literal) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh, time-ordered identifier.
            pub fn generate() -> Self {
                Self(Uuid::now_v7())
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0.hyphenated(), f)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::try_parse(s)
                    .map(Self)
                    .map_err(|_| Error::InvalidInput(format!("malformed {}: {s:?}", $what)))
            }
        }
    };
}

uuid_id!(
    /// Identifies a [`BlobObject`](crate::catalog::BlobObject) and its chunks.
    ///
    /// This is the identifier used in public playback URLs.
    ObjectId,
    "object id"
);

uuid_id!(
    /// Identifies a [`VideoRecord`](crate::records::VideoRecord).
    RecordId,
    "record id"
);
