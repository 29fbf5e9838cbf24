//! Newtype wrappers for string identifiers, providing compile-time type safety.
//!
//! All newtypes serialize/deserialize as plain strings so configuration files
//! and JSON reports stay readable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Cloud region hosting one registry instance, e.g. `us-east-1`.
    Region
);

string_newtype!(
    /// Repository name; identical across every region it is replicated to.
    RepositoryName
);

string_newtype!(
    /// Human-assigned label of one image version inside a repository.
    ImageTag
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn region_display_and_as_ref() {
        let region = Region::new("us-east-1");
        assert_eq!(region.to_string(), "us-east-1");
        assert_eq!(region.as_str(), "us-east-1");
        assert_eq!(AsRef::<str>::as_ref(&region), "us-east-1");
    }

    #[test]
    fn tag_serde_is_transparent() {
        let tag = ImageTag::new("v1.2.3");
        let json = serde_json::to_string(&tag).unwrap();
        assert_eq!(json, "\"v1.2.3\"");
        let back: ImageTag = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tag);
    }

    #[test]
    fn tag_set_lookup_by_str() {
        let tags: BTreeSet<ImageTag> = ["v2", "v1"].into_iter().map(ImageTag::from).collect();
        assert!(tags.contains("v1"));
        assert!(!tags.contains("v3"));
        let ordered: Vec<&str> = tags.iter().map(ImageTag::as_str).collect();
        assert_eq!(ordered, ["v1", "v2"]);
    }

    #[test]
    fn repository_name_into_inner() {
        let name = RepositoryName::new("team/app".to_owned());
        assert_eq!(name, "team/app");
        assert_eq!(name.into_inner(), "team/app");
    }
}
