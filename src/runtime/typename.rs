//! # Versioned Type Names
//!
//! Type names have the form `<kind>[.<group>]/<version>`.
//! The version is the text after the final `/`; without it the
//! name denotes the unversioned (default) type.

use std::fmt;

/// Separator between the type name and its version
pub const VERSION_SEPARATOR: char = '/';

/// Separator between kind and group
pub const GROUP_SEPARATOR: char = '.';

/// Parsed form of a versioned type name.
///
/// Parsing and [`fmt::Display`] are inverse operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeName {
    kind: String,
    group: Option<String>,
    version: Option<String>,
}

impl TypeName {
    /// Split a type name into kind, group and version
    pub fn parse(name: &str) -> Self {
        let (base, version) = match name.rfind(VERSION_SEPARATOR) {
            Some(i) => (&name[..i], Some(name[i + 1..].to_string())),
            None => (name, None),
        };
        let (kind, group) = match base.find(GROUP_SEPARATOR) {
            Some(i) => (base[..i].to_string(), Some(base[i + 1..].to_string())),
            None => (base.to_string(), None),
        };
        Self {
            kind,
            group,
            version,
        }
    }

    /// Compose a type name from its parts
    pub fn new(kind: impl Into<String>, group: Option<&str>, version: Option<&str>) -> Self {
        Self {
            kind: kind.into(),
            group: group.map(str::to_string),
            version: version.map(str::to_string),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn is_versioned(&self) -> bool {
        self.version.is_some()
    }

    /// The type name without its version suffix
    pub fn unversioned(&self) -> String {
        match &self.group {
            Some(g) => format!("{}{}{}", self.kind, GROUP_SEPARATOR, g),
            None => self.kind.clone(),
        }
    }

    /// The same type with another version
    pub fn with_version(&self, version: &str) -> Self {
        Self {
            kind: self.kind.clone(),
            group: self.group.clone(),
            version: Some(version.to_string()),
        }
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.unversioned())?;
        if let Some(v) = &self.version {
            write!(f, "{}{}", VERSION_SEPARATOR, v)?;
        }
        Ok(())
    }
}

/// Build `<name>/<version>`
pub fn versioned(name: &str, version: &str) -> String {
    format!("{}{}{}", name, VERSION_SEPARATOR, version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_name() {
        let t = TypeName::parse("credentials.config/v1");
        assert_eq!(t.kind(), "credentials");
        assert_eq!(t.group(), Some("config"));
        assert_eq!(t.version(), Some("v1"));
        assert_eq!(t.unversioned(), "credentials.config");
    }

    #[test]
    fn test_parse_unversioned() {
        let t = TypeName::parse("Memory");
        assert_eq!(t.kind(), "Memory");
        assert_eq!(t.group(), None);
        assert!(!t.is_versioned());
    }

    #[test]
    fn test_group_with_dots() {
        let t = TypeName::parse("logging.config.acme.org/v2");
        assert_eq!(t.kind(), "logging");
        assert_eq!(t.group(), Some("config.acme.org"));
        assert_eq!(t.version(), Some("v2"));
    }

    #[test]
    fn test_display_reverses_parse() {
        for name in ["generic", "generic/v1", "data.config/v1", "a.b.c", "x.y/z"] {
            assert_eq!(TypeName::parse(name).to_string(), name);
        }
    }

    #[test]
    fn test_with_version() {
        let t = TypeName::parse("Memory").with_version("v1");
        assert_eq!(t.to_string(), "Memory/v1");
        assert_eq!(versioned("Memory", "v1"), "Memory/v1");
    }
}
