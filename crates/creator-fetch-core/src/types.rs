//! Types module - data structures for Creator Fetch
//!
//! Persisted records, the ephemeral values that flow between the submitter,
//! the execution engine and the poller, and the application settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Correlation id stored on records that can no longer be tracked by the engine
pub const UNTRACKED_CORRELATION_ID: &str = "none";

/// Label prefixed to the resolved path when a custom destination root is used
pub const CUSTOM_LOCATION_LABEL: &str = "Custom";

/// Label heading the resolved path when the platform downloads folder is used
pub const DEFAULT_LOCATION_LABEL: &str = "Downloads";

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "avi", "mov"];

/// Media classification of a downloaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MediaKind {
    #[default]
    Image,
    Video,
}

impl MediaKind {
    /// Classify a file by its extension. Anything that is not a known video
    /// container counts as an image.
    pub fn from_file_name(name: &str) -> Self {
        let extension = match name.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => return MediaKind::Image,
        };

        if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

impl From<&str> for MediaKind {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "video" => MediaKind::Video,
            _ => MediaKind::Image,
        }
    }
}

/// A persisted download submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub id: i64,
    pub post_id: String,
    pub creator_id: String,
    pub creator_name: String,
    /// Original display name, before sanitization
    pub file_name: String,
    pub resolved_path: String,
    pub media_kind: MediaKind,
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
}

impl DownloadRecord {
    /// Whether the execution engine can still be asked about this record
    pub fn is_trackable(&self) -> bool {
        is_trackable(&self.correlation_id)
    }
}

/// Whether a correlation id refers to live engine bookkeeping
pub fn is_trackable(correlation_id: &str) -> bool {
    !correlation_id.is_empty() && correlation_id != UNTRACKED_CORRELATION_ID
}

/// Description of one unit of work handed to the execution engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDescriptor {
    pub source_url: String,
    /// Folder relative to the destination root, built from sanitized segments
    pub destination_folder: PathBuf,
    /// Sanitized file name
    pub file_name: String,
    /// User-chosen storage root replacing the engine's default directory
    pub target_root_override: Option<String>,
}

impl WorkDescriptor {
    /// Final location of the file. The result depends only on the descriptor
    /// and the root, so a retried job writes to the same place.
    pub fn destination_path(&self, default_root: &Path) -> PathBuf {
        self.destination_dir(default_root).join(&self.file_name)
    }

    /// Whether the root is a filesystem path. A storage-provider URI such
    /// as `content://tree/123` is not.
    pub fn has_local_destination(&self) -> bool {
        match &self.target_root_override {
            None => true,
            // Single-letter schemes are Windows drive letters
            Some(root) => match url::Url::parse(root) {
                Ok(url) => url.scheme().len() == 1,
                Err(_) => true,
            },
        }
    }

    /// Directory the file is written into
    pub fn destination_dir(&self, default_root: &Path) -> PathBuf {
        let root = match &self.target_root_override {
            Some(root) => PathBuf::from(root),
            None => default_root.to_path_buf(),
        };
        root.join(&self.destination_folder)
    }
}

/// Coarse lifecycle phase of a submitted download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DownloadPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    Unknown,
}

impl DownloadPhase {
    /// Terminal phases are not polled again
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadPhase::Succeeded | DownloadPhase::Failed)
    }
}

impl std::fmt::Display for DownloadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadPhase::Pending => write!(f, "pending"),
            DownloadPhase::Running => write!(f, "running"),
            DownloadPhase::Succeeded => write!(f, "succeeded"),
            DownloadPhase::Failed => write!(f, "failed"),
            DownloadPhase::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of a single poll. Computed fresh on every call and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadStatus {
    pub correlation_id: String,
    pub phase: DownloadPhase,
    /// Fraction in `0.0..=1.0`
    pub progress: f32,
}

impl DownloadStatus {
    pub fn unknown(correlation_id: &str) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            phase: DownloadPhase::Unknown,
            progress: 0.0,
        }
    }
}

/// Lifecycle state as reported by the execution engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeState {
    /// Accepted, waiting for a slot
    Enqueued,
    /// Waiting on a constraint (paused, network unavailable)
    Blocked,
    /// Transferring; progress in the engine's 0-100 units
    Running { progress: u8 },
    Succeeded,
    Failed,
    Cancelled,
}

/// Everything the submitter needs to queue one file
#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    pub source_url: String,
    pub file_name: String,
    pub post_id: String,
    pub post_title: String,
    pub creator_id: String,
    pub creator_name: String,
    pub media_kind: MediaKind,
    /// Sub-folder label replacing the post title, e.g. an album name
    pub grouping_hint: Option<String>,
}

impl DownloadRequest {
    /// Create a request for a URL and display name; the media kind is
    /// guessed from the file name.
    pub fn new(source_url: impl Into<String>, file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        Self {
            source_url: source_url.into(),
            media_kind: MediaKind::from_file_name(&file_name),
            file_name,
            ..Default::default()
        }
    }

    /// Set the originating post
    pub fn post(mut self, id: impl Into<String>, title: impl Into<String>) -> Self {
        self.post_id = id.into();
        self.post_title = title.into();
        self
    }

    /// Set the originating creator
    pub fn creator(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.creator_id = id.into();
        self.creator_name = name.into();
        self
    }

    pub fn media_kind(mut self, kind: MediaKind) -> Self {
        self.media_kind = kind;
        self
    }

    pub fn grouping_hint(mut self, hint: impl Into<String>) -> Self {
        self.grouping_hint = Some(hint.into());
        self
    }
}

/// A remote file belonging to a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub url: String,
    pub name: String,
}

/// A post whose main file and attachments should all be downloaded
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostDownload {
    pub post_id: String,
    pub post_title: String,
    pub creator_id: String,
    pub creator_name: String,
    pub file: Option<RemoteFile>,
    pub attachments: Vec<RemoteFile>,
    pub grouping_hint: Option<String>,
}

impl PostDownload {
    /// Per-file requests, main file first
    pub fn requests(&self) -> Vec<DownloadRequest> {
        self.file
            .iter()
            .chain(self.attachments.iter())
            .map(|file| DownloadRequest {
                source_url: file.url.clone(),
                file_name: file.name.clone(),
                post_id: self.post_id.clone(),
                post_title: self.post_title.clone(),
                creator_id: self.creator_id.clone(),
                creator_name: self.creator_name.clone(),
                media_kind: MediaKind::from_file_name(&file.name),
                grouping_hint: self.grouping_hint.clone(),
            })
            .collect()
    }
}

/// Outcome of submitting several files at once
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub submitted: Vec<DownloadRecord>,
    /// File name and the reason it was not queued
    pub failed: Vec<(String, crate::error::Error)>,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// User-selected storage root; `None` means the platform downloads folder
    pub destination_root: Option<String>,
    pub delete_files_on_remove: bool,
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
    /// How long a record may report Unknown before it is shown as such
    pub unknown_grace_secs: u64,
    /// Expedited work is admitted only while fewer than this many transfers
    /// are active in total, standard and expedited alike
    pub expedited_quota: u32,
    pub max_concurrent_downloads: u32,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            destination_root: None,
            delete_files_on_remove: false,
            poll_interval_ms: 1000,
            poll_timeout_ms: 2000,
            unknown_grace_secs: 30,
            expedited_quota: 3,
            max_concurrent_downloads: 5,
            user_agent: concat!("creator-fetch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Platform downloads folder used when no destination root is configured
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join("Downloads"))
}
