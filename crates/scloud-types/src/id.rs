use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw identifier value.
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// The raw identifier value.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            /// Accepts either a bare number (`"7"`) or a labelled one (`"page#7"`).
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let digits = s
                    .strip_prefix(concat!($label, "#"))
                    .unwrap_or(s);
                digits.parse::<i64>().map(Self).map_err(|_| TypeError::InvalidId {
                    kind: $label,
                    value: s.to_string(),
                })
            }
        }
    };
}

define_id!(
    /// Identifier of a row in the `pages` relation.
    PageId,
    "page"
);

define_id!(
    /// Identifier of a row in the `file_revisions` relation.
    RevisionId,
    "revision"
);

define_id!(
    /// Identifier of a row in the `file_data` relation.
    BlobId,
    "blob"
);

define_id!(
    /// Group that owns a page. Groups are managed outside the revision store.
    GroupId,
    "group"
);

define_id!(
    /// Author of a revision, supplied by the identity provider.
    UserId,
    "user"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_and_labelled() {
        assert_eq!("42".parse::<PageId>().unwrap(), PageId::new(42));
        assert_eq!("page#42".parse::<PageId>().unwrap(), PageId::new(42));
        assert_eq!("revision#3".parse::<RevisionId>().unwrap().get(), 3);
    }

    #[test]
    fn parse_rejects_wrong_label() {
        let err = "blob#1".parse::<PageId>().unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidId {
                kind: "page",
                value: "blob#1".into()
            }
        );
    }

    #[test]
    fn display_and_debug() {
        let id = RevisionId::new(9);
        assert_eq!(id.to_string(), "9");
        assert_eq!(format!("{id:?}"), "RevisionId(9)");
    }

    #[test]
    fn ordering_follows_raw_value() {
        assert!(BlobId::new(1) < BlobId::new(2));
    }

    #[test]
    fn serde_is_transparent() {
        let json = serde_json::to_string(&UserId::new(5)).unwrap();
        assert_eq!(json, "5");
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, UserId::new(5));
    }
}
