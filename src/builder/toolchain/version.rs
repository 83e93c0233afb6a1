//! Compiler version tuples.

use std::fmt;

/// Numeric compiler version, compared component by component.
///
/// Parsing is permissive: components are read up to the first one that is
/// not a plain number, so `"4.8.5-20150623"` becomes `4.8` and a release tag
/// such as `"12.2.0-14)"` keeps its leading numeric part.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionInfo(Vec<u64>);

impl VersionInfo {
    /// Parse a dotted version string.
    pub fn parse(text: &str) -> Self {
        Self::from_components(text.split('.'))
    }

    /// Build a version from already-split components.
    pub fn from_components<'a>(components: impl IntoIterator<Item = &'a str>) -> Self {
        VersionInfo(
            components
                .into_iter()
                .map_while(|c| c.parse::<u64>().ok())
                .collect(),
        )
    }

    /// Whether parsing found no numeric component at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> From<[u64; N]> for VersionInfo {
    fn from(components: [u64; N]) -> Self {
        VersionInfo(components.to_vec())
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        f.write_str(&parts.join("."))
    }
}
