//! Fixed artifact layout shared by the watcher, validator and parser.

use std::path::Path;

/// Shape of the artifacts produced by the instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    /// Rows per block; one row per physical channel
    pub channels: usize,
    /// File extension of finished artifacts, without the dot
    pub extension: String,
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self {
            channels: 4,
            extension: "csv".to_string(),
        }
    }
}

impl ArtifactLayout {
    /// Whether `path` names a finished artifact of this layout.
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext == self.extension.as_str())
            .unwrap_or(false)
    }

    /// Header plus one complete block.
    pub fn min_lines(&self) -> usize {
        1 + self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_extension_only() {
        let layout = ArtifactLayout::default();
        assert!(layout.matches(Path::new("drop/peaks_000001.csv")));
        assert!(!layout.matches(Path::new("drop/.peaks_000001.csv.part")));
        assert!(!layout.matches(Path::new("drop/readme")));
    }

    #[test]
    fn test_min_lines() {
        assert_eq!(ArtifactLayout::default().min_lines(), 5);
    }
}
