//! Newtype wrappers for string identifiers, providing compile-time type safety.
//!
//! All newtypes serialize/deserialize as plain strings.

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

        impl AsRef<std::path::Path> for $name {
            fn as_ref(&self) -> &std::path::Path {
                std::path::Path::new(&self.0)
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
    /// Name of a distribution target (one browser family), e.g. `chrome`.
    /// Doubles as the directory name under the output and packaging roots.
    TargetName
);

string_newtype!(
    /// Identity of a command for cross-process locking, e.g. `build` or `dev`.
    CommandId
);

impl CommandId {
    pub fn build() -> Self {
        Self::new("build")
    }

    pub fn format() -> Self {
        Self::new("format")
    }

    pub fn dev() -> Self {
        Self::new("dev")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_name_display_and_as_ref() {
        let t = TargetName::new("chrome");
        assert_eq!(t.to_string(), "chrome");
        assert_eq!(t.as_str(), "chrome");
        assert_eq!(AsRef::<str>::as_ref(&t), "chrome");
    }

    #[test]
    fn target_name_serde_is_transparent() {
        let t = TargetName::new("firefox");
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "\"firefox\"");
        let back: TargetName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn well_known_command_ids() {
        assert_eq!(CommandId::build(), "build");
        assert_eq!(CommandId::format(), "format");
        assert_eq!(CommandId::dev(), "dev");
    }

    #[test]
    fn target_names_order_alphabetically() {
        let mut v = vec![TargetName::from("firefox"), TargetName::from("chrome")];
        v.sort();
        assert_eq!(v[0], "chrome");
    }
}
