//! Identifier types for the shared ledger.
//!
//! Owners and nonces are opaque, caller-chosen strings. Entry ids are assigned by
//! the entry store.
//!
//! # Macro-based ID Types
//!
//! The `string_id_type!` macro reduces boilerplate for the string identifiers,
//! ensuring consistent validation, serialization, parsing, and display.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of an owner id or nonce, in bytes.
pub const MAX_ID_LEN: usize = 256;

/// Macro to define a validated string identifier with standard trait implementations.
///
/// This macro generates a newtype wrapper around `String` with implementations for:
/// - `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - `Serialize`, `Deserialize` (as a plain string, validated on the way in)
/// - `FromStr`, `Display`, `Debug`
/// - `TryFrom<String>`, `Into<String>`
/// - `AsRef<str>`
macro_rules! string_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create an identifier, validating its length.
            ///
            /// # Errors
            ///
            /// Returns an error if the value is empty, longer than [`MAX_ID_LEN`],
            /// or contains a NUL byte.
            pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
                let value = value.into();
                if value.is_empty() {
                    return Err(IdError::Empty);
                }
                if value.len() > MAX_ID_LEN {
                    return Err(IdError::TooLong { len: value.len() });
                }
                if value.contains('\0') {
                    return Err(IdError::NulByte);
                }
                Ok(Self(value))
            }

            /// Borrow the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id_type!(
    OwnerId,
    "The holder of a balance.\n\nOwner ids are opaque; no structure is assumed beyond being a non-empty string."
);
string_id_type!(
    Nonce,
    "A client-supplied idempotency token.\n\nNonces are unique across every entry in the ledger, not just per owner."
);

/// A store-assigned entry identifier.
///
/// Ids increase monotonically in assignment order within one store; for a
/// single owner that is also commit order. Gaps are possible when a
/// transaction is rolled back after an id was reserved.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(i64);

impl EntryId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Return the raw id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Big-endian bytes, so byte order matches numeric order for non-negative ids.
    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Rebuild an id from its big-endian bytes.
    #[must_use]
    pub const fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(i64::from_be_bytes(bytes))
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({})", self.0)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is empty.
    #[error("identifier must not be empty")]
    Empty,

    /// The input exceeds [`MAX_ID_LEN`].
    #[error("identifier is {len} bytes, limit is {}", MAX_ID_LEN)]
    TooLong {
        /// Length of the rejected input.
        len: usize,
    },

    /// The input contains a NUL byte, which storage keys use as a separator.
    #[error("identifier must not contain NUL bytes")]
    NulByte,
}
