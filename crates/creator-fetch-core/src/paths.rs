//! Path sanitizing and destination layout
//!
//! Creator names, post titles and file names come straight from the content
//! platform. Each one is reduced to `[A-Za-z0-9._-]` on its own before it
//! becomes a path segment; a joined path is never sanitized as a whole, so
//! separators between segments survive.

use std::path::PathBuf;

use crate::types::{CUSTOM_LOCATION_LABEL, DEFAULT_LOCATION_LABEL};

/// Replace every character outside `[A-Za-z0-9._-]` with `_`
pub fn sanitize_segment(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Sanitize a value that becomes a single path component. `.` and `..`
/// would name the current or parent directory, so a segment made only of
/// dots has each dot replaced.
fn path_segment(input: &str) -> String {
    let segment = sanitize_segment(input);
    if !segment.is_empty() && segment.chars().all(|c| c == '.') {
        "_".repeat(segment.len())
    } else {
        segment
    }
}

/// Destination layout for one download, all segments already sanitized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationLayout {
    pub creator_segment: String,
    pub grouping_segment: String,
    pub file_name: String,
}

impl DestinationLayout {
    /// Build the layout from raw values. The grouping hint wins over the
    /// post title when present.
    pub fn new(
        creator_name: &str,
        post_title: &str,
        grouping_hint: Option<&str>,
        file_name: &str,
    ) -> Self {
        let grouping = grouping_hint.unwrap_or(post_title);
        Self {
            creator_segment: path_segment(creator_name),
            grouping_segment: path_segment(grouping),
            file_name: path_segment(file_name),
        }
    }

    /// `<creator>/<grouping>` relative to the destination root. Empty
    /// segments are skipped.
    pub fn folder(&self) -> PathBuf {
        self.segments().collect()
    }

    /// The folder with `/` separators regardless of platform, for display
    pub fn folder_label(&self) -> String {
        self.segments().collect::<Vec<_>>().join("/")
    }

    /// Human readable location stored on the record. The custom form does not
    /// look like a path so the frontend can explain where the file went.
    pub fn resolved_path(&self, custom_root: bool) -> String {
        if custom_root {
            return format!("{}: {}", CUSTOM_LOCATION_LABEL, self.file_name);
        }

        let folder = self.folder_label();
        if folder.is_empty() {
            format!("{}/{}", DEFAULT_LOCATION_LABEL, self.file_name)
        } else {
            format!("{}/{}/{}", DEFAULT_LOCATION_LABEL, folder, self.file_name)
        }
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        [self.creator_segment.as_str(), self.grouping_segment.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
    }
}
