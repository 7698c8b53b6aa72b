//! Structural pre-check for artifacts.
//!
//! Validation only counts lines; it never decodes content. A file that is present but
//! too short is [`Validation::Rejected`] and may be deleted. A file that exists but
//! cannot be read is [`Validation::Unreadable`] and must be kept for inspection.

use crate::ingest::layout::ArtifactLayout;
use std::path::Path;

/// Verdict on one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Header plus at least one complete block.
    Valid,
    /// Structurally unusable; safe to discard.
    Rejected(String),
    /// Present but could not be read.
    Unreadable(String),
}

impl Validation {
    /// Whether the artifact may be handed to the parser.
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid)
    }

    /// Human-readable reason, `"OK"` when valid.
    pub fn reason(&self) -> &str {
        match self {
            Validation::Valid => "OK",
            Validation::Rejected(reason) | Validation::Unreadable(reason) => reason,
        }
    }
}

/// Check that `path` holds a header and at least one full block of `layout.channels` rows.
pub fn validate(path: &Path, layout: &ArtifactLayout) -> Validation {
    if !path.exists() {
        return Validation::Rejected("File does not exist".to_string());
    }

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => return Validation::Unreadable(format!("Error reading file: {err}")),
    };

    let lines = count_lines(&bytes);
    if lines < 2 {
        return Validation::Rejected("File too small (no data rows)".to_string());
    }
    if lines < layout.min_lines() {
        return Validation::Rejected(format!(
            "Insufficient rows (need at least {}, found {})",
            layout.min_lines(),
            lines
        ));
    }

    Validation::Valid
}

/// Line count with the usual text-file convention: a final line without a
/// terminator still counts.
fn count_lines(bytes: &[u8]) -> usize {
    if bytes.is_empty() {
        return 0;
    }
    let newlines = bytes.iter().filter(|&&b| b == b'\n').count();
    if bytes.ends_with(b"\n") {
        newlines
    } else {
        newlines + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_missing_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let verdict = validate(&dir.path().join("absent.csv"), &ArtifactLayout::default());
        assert_eq!(verdict, Validation::Rejected("File does not exist".into()));
    }

    #[test]
    fn test_header_only_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.csv", "Timestamp,Channel\n");
        let verdict = validate(&path, &ArtifactLayout::default());
        assert!(!verdict.is_valid());
        assert!(verdict.reason().contains("no data rows"));
    }

    #[test]
    fn test_incomplete_first_block_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "a.csv",
            "header\nt,1,25,3,{1534,9}\nt,2,25,3\nt,3,25,3\n",
        );
        let verdict = validate(&path, &ArtifactLayout::default());
        assert!(matches!(verdict, Validation::Rejected(_)));
        assert!(verdict.reason().contains("need at least 5"));
    }

    #[test]
    fn test_full_block_valid_without_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "a.csv",
            "header\nt,1,25,3\nt,2,25,3\nt,3,25,3\nt,4,25,3",
        );
        assert_eq!(validate(&path, &ArtifactLayout::default()), Validation::Valid);
    }

    #[test]
    fn test_layout_channel_count_respected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.csv", "header\nt,1,25,3\nt,2,25,3\n");
        let two = ArtifactLayout {
            channels: 2,
            ..ArtifactLayout::default()
        };
        assert!(validate(&path, &two).is_valid());
        assert!(!validate(&path, &ArtifactLayout::default()).is_valid());
    }

    #[test]
    fn test_count_lines() {
        assert_eq!(count_lines(b""), 0);
        assert_eq!(count_lines(b"a"), 1);
        assert_eq!(count_lines(b"a\nb\n"), 2);
        assert_eq!(count_lines(b"a\nb"), 2);
    }
}
