//! Installed plugin catalog

use serde::Serialize;
use std::collections::BTreeSet;

/// Plugin that makes the identity provider groups-capable
pub const SAML_GROUPS_PLUGIN: &str = "saml_groups";

/// Command that prints the installed plugin table
pub const LIST_PLUGINS_COMMAND: [&str; 3] = ["indico", "setup", "list-plugins"];

/// Plugins installed in the workload image
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct InstalledPlugins(BTreeSet<String>);

impl InstalledPlugins {
    /// Create empty catalog
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the table printed by `indico setup list-plugins`
    ///
    /// ```text
    /// +-------------+---------+
    /// | Name        | Title   |
    /// +-------------+---------+
    /// | saml_groups | SAML Groups Plugin. |
    /// +-------------+---------+
    /// ```
    ///
    /// The first column of every body row is a plugin name.
    #[must_use]
    pub fn parse_table(output: &str) -> Self {
        let names = output
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with('|'))
            .skip(1)
            .filter_map(|row| row.split('|').nth(1))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect();
        Self(names)
    }

    /// Check if a plugin is installed
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// Plugin names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for InstalledPlugins {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
