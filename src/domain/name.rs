use std::{fmt, ops::Deref, str::FromStr};

use non_empty_string::NonEmptyString;
use serde::{Deserialize, Serialize};

/// Error returned when a site or module name is not a valid path segment.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
#[error("Invalid name '{0}': must be non-empty and contain no '/' or whitespace")]
pub struct InvalidNameError(String);

fn validate(s: String) -> Result<NonEmptyString, InvalidNameError> {
    if s.chars().any(|c| c == '/' || c.is_whitespace()) {
        return Err(InvalidNameError(s));
    }
    NonEmptyString::new(s.clone()).map_err(|_| InvalidNameError(s))
}

macro_rules! segment_name {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(NonEmptyString);

        impl $name {
            /// Creates a new name, validating it as a single path segment.
            ///
            /// # Errors
            ///
            /// Returns [`InvalidNameError`] if the string is empty or contains
            /// a `/` or whitespace.
            pub fn new(s: impl Into<String>) -> Result<Self, InvalidNameError> {
                validate(s.into()).map(Self)
            }

            /// Returns the string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl TryFrom<String> for $name {
            type Error = InvalidNameError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = InvalidNameError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.as_str().to_owned()
            }
        }

        impl FromStr for $name {
            type Err = InvalidNameError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

segment_name! {
    /// The name of a site (a top-level tenant with its own route namespace).
    SiteName
}

segment_name! {
    /// The name of a module (a self-contained feature unit such as `auth`).
    ModuleName
}

/// The explicit chain of ancestor module names locating a module within a
/// site's module forest.
///
/// The empty path is the site root. `admin/auth` is the `auth` module
/// installed beneath `admin`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ModulePath(Vec<ModuleName>);

impl ModulePath {
    /// The site root.
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Whether this is the site root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The path of a child module beneath this one.
    #[must_use]
    pub fn child(&self, name: ModuleName) -> Self {
        let mut segments = self.0.clone();
        segments.push(name);
        Self(segments)
    }

    /// The parent path, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.0.split_last()?;
        Some(Self(init.to_vec()))
    }

    /// The innermost module name, or `None` for the root.
    #[must_use]
    pub fn leaf(&self) -> Option<&ModuleName> {
        self.0.last()
    }

    /// Whether the named module appears anywhere on this path.
    #[must_use]
    pub fn contains(&self, name: &ModuleName) -> bool {
        self.0.contains(name)
    }

    /// The module names from the outermost to the innermost.
    #[must_use]
    pub fn segments(&self) -> &[ModuleName] {
        &self.0
    }

    /// Number of modules on the path.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Same as [`Self::is_root`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over this path and each of its ancestors, innermost first,
    /// stopping before the root.
    pub fn ancestry(&self) -> impl Iterator<Item = Self> + '_ {
        (1..=self.0.len())
            .rev()
            .map(|len| Self(self.0[..len].to_vec()))
    }
}

impl From<Vec<ModuleName>> for ModulePath {
    fn from(segments: Vec<ModuleName>) -> Self {
        Self(segments)
    }
}

impl FromIterator<ModuleName> for ModulePath {
    fn from_iter<T: IntoIterator<Item = ModuleName>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl FromStr for ModulePath {
    type Err = InvalidNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split('/')
            .filter(|segment| !segment.is_empty())
            .map(ModuleName::new)
            .collect()
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(segment.as_str())?;
        }
        Ok(())
    }
}

impl Serialize for ModulePath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("auth" ; "plain")]
    #[test_case("google-ads" ; "hyphenated")]
    #[test_case("crm_v2" ; "underscore")]
    fn accepts_valid_names(name: &str) {
        assert_eq!(ModuleName::new(name).unwrap().as_str(), name);
    }

    #[test_case("" ; "empty")]
    #[test_case("admin/auth" ; "slash")]
    #[test_case("file manager" ; "whitespace")]
    fn rejects_invalid_names(name: &str) {
        assert!(ModuleName::new(name).is_err());
        assert!(SiteName::new(name).is_err());
    }

    #[test]
    fn module_path_parses_and_displays() {
        let path: ModulePath = "admin/auth".parse().unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path.to_string(), "admin/auth");
        assert_eq!(path.leaf().unwrap().as_str(), "auth");
        assert_eq!(path.parent().unwrap().to_string(), "admin");
        assert_eq!(ModulePath::root().to_string(), "/");
    }

    #[test]
    fn root_has_no_parent() {
        assert!(ModulePath::root().parent().is_none());
        assert!("".parse::<ModulePath>().unwrap().is_root());
    }

    #[test]
    fn ancestry_walks_innermost_first() {
        let path: ModulePath = "crm/leads/import".parse().unwrap();
        let chain: Vec<_> = path.ancestry().map(|p| p.to_string()).collect();
        assert_eq!(chain, ["crm/leads/import", "crm/leads", "crm"]);
    }

    #[test]
    fn names_deserialize_with_validation() {
        #[derive(Deserialize)]
        struct Wrapper {
            name: ModuleName,
        }

        let ok: Wrapper = toml::from_str("name = \"auth\"").unwrap();
        assert_eq!(ok.name.as_str(), "auth");
        assert!(toml::from_str::<Wrapper>("name = \"\"").is_err());
    }
}
