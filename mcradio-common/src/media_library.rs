//! Channel media library
//!
//! Turns a directory tree into numbered channels and serves each channel as an
//! endless byte stream over the concatenation of its audio files.
//!
//! Expected layout:
//!
//! ```text
//! <root>/
//!   opera/
//!     descr.txt      first line = channel description
//!     aria.mp3
//!     overture.MP3
//!   news/
//!     descr.txt
//!     bulletin.mp3
//! ```
//!
//! Locking: the channel table sits behind a `RwLock` (write for load/teardown,
//! read for lookups). Every channel owns a `Mutex<Cursor>` held for exactly one
//! read call, so reads on different channels never wait on each other.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::{ChannelId, Error, Result};

/// Name of the per-channel description file
pub const DESCR_FILE_NAME: &str = "descr.txt";

/// First channel id handed out by a scan
pub const MIN_CHANNEL_ID: ChannelId = 1;

/// Maximum number of channels accepted by a scan
pub const MAX_CHANNELS: usize = 200;

/// Maximum number of audio files collected per channel
pub const MAX_AUDIO_FILES: usize = 1024;

/// Audio file extension (compared case-insensitively)
pub const AUDIO_EXTENSION: &str = "mp3";

/// Scan parameters
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LibrarySettings {
    pub descr_file: String,
    pub audio_extension: String,
    pub min_channel_id: ChannelId,
    pub max_channels: usize,
    pub max_files_per_channel: usize,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            descr_file: DESCR_FILE_NAME.to_string(),
            audio_extension: AUDIO_EXTENSION.to_string(),
            min_channel_id: MIN_CHANNEL_ID,
            max_channels: MAX_CHANNELS,
            max_files_per_channel: MAX_AUDIO_FILES,
        }
    }
}

/// Read position inside a channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    /// Index into the channel's file list
    pub file_index: usize,
    /// Byte offset inside the current file
    pub file_offset: u64,
}

/// Channel listing entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSummary {
    pub id: ChannelId,
    pub description: String,
    pub file_count: usize,
}

/// A numbered channel backed by one or more audio files
#[derive(Debug)]
pub struct Channel {
    id: ChannelId,
    description: String,
    files: Vec<PathBuf>,
    cursor: Mutex<Cursor>,
}

impl Channel {
    pub fn new(id: ChannelId, description: impl Into<String>, files: Vec<PathBuf>) -> Self {
        Self {
            id,
            description: description.into(),
            files,
            cursor: Mutex::new(Cursor::default()),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Snapshot of the read position
    pub fn cursor(&self) -> Cursor {
        *self.cursor.lock()
    }

    pub fn summary(&self) -> ChannelSummary {
        ChannelSummary {
            id: self.id,
            description: self.description.clone(),
            file_count: self.files.len(),
        }
    }

    /// Read the next bytes of the channel stream into `buf`
    ///
    /// Returns at most `buf.len()` bytes. When the current file is exhausted
    /// the cursor moves to the start of the next file (wrapping to the first),
    /// so a short read always coincides with a file switch and the following
    /// call continues seamlessly.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if self.files.is_empty() {
            return Err(Error::ChannelEmpty(self.id));
        }

        let mut cursor = self.cursor.lock();
        let path = &self.files[cursor.file_index];

        match read_at(path, cursor.file_offset, buf) {
            Ok((bytes_read, reached_end)) => {
                cursor.file_offset += bytes_read as u64;
                debug!(
                    "Channel {} read {} of {} bytes from {} (offset now {})",
                    self.id,
                    bytes_read,
                    buf.len(),
                    path.display(),
                    cursor.file_offset
                );

                if reached_end || bytes_read < buf.len() {
                    self.advance(&mut cursor);
                }
                Ok(bytes_read)
            }
            Err(e) => {
                warn!(
                    "Channel {} failed to read {} at offset {}: {}",
                    self.id,
                    path.display(),
                    cursor.file_offset,
                    e
                );
                // Skip the unreadable file so the channel keeps moving
                self.advance(&mut cursor);
                Err(Error::Io(e))
            }
        }
    }

    fn advance(&self, cursor: &mut Cursor) {
        cursor.file_index = (cursor.file_index + 1) % self.files.len();
        cursor.file_offset = 0;
        debug!(
            "Channel {} switching to {}",
            self.id,
            self.files[cursor.file_index].display()
        );
    }
}

/// Read up to `buf.len()` bytes of `path` starting at `offset`
///
/// Returns the byte count and whether the end of the file was reached.
fn read_at(path: &Path, offset: u64, buf: &mut [u8]) -> io::Result<(usize, bool)> {
    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();
    file.seek(SeekFrom::Start(offset))?;

    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok((filled, offset + filled as u64 >= file_len))
}

#[derive(Debug, Default)]
struct LibraryState {
    initialized: bool,
    channels: Vec<Arc<Channel>>,
}

/// Process-wide channel table
///
/// Constructed once at startup and shared by `Arc` with every streaming task.
#[derive(Debug)]
pub struct MediaLibrary {
    root: PathBuf,
    settings: LibrarySettings,
    state: RwLock<LibraryState>,
}

impl MediaLibrary {
    /// Create an unloaded library rooted at `root`
    ///
    /// Nothing touches the filesystem until `initialize()` or the first read.
    pub fn new(root: impl Into<PathBuf>, settings: LibrarySettings) -> Self {
        Self {
            root: root.into(),
            settings,
            state: RwLock::new(LibraryState::default()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &LibrarySettings {
        &self.settings
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }

    /// Scan the library root if it has not been scanned yet
    pub fn initialize(&self) -> Result<()> {
        if self.state.read().initialized {
            return Ok(());
        }

        let mut state = self.state.write();
        if state.initialized {
            return Ok(());
        }

        let channels = scan_channels(&self.root, &self.settings)?;
        info!(
            "Media library loaded {} channel(s) from {}",
            channels.len(),
            self.root.display()
        );

        state.channels = channels.into_iter().map(Arc::new).collect();
        state.initialized = true;
        Ok(())
    }

    /// Drop every channel; a later call re-scans the root
    pub fn teardown(&self) {
        let mut state = self.state.write();
        if state.initialized {
            info!("Media library released {} channel(s)", state.channels.len());
        }
        state.channels.clear();
        state.initialized = false;
    }

    /// Loaded channels in id order
    pub fn list_channels(&self) -> Result<Vec<ChannelSummary>> {
        self.initialize()?;
        Ok(self.state.read().channels.iter().map(|c| c.summary()).collect())
    }

    pub fn channel(&self, id: ChannelId) -> Result<Arc<Channel>> {
        self.initialize()?;
        self.state
            .read()
            .channels
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(Error::ChannelNotFound(id))
    }

    /// Read the next chunk of channel `id` into `buf`
    ///
    /// See [`Channel::read`] for cursor semantics.
    pub fn read(&self, id: ChannelId, buf: &mut [u8]) -> Result<usize> {
        self.channel(id)?.read(buf)
    }
}

/// Walk the immediate subdirectories of `root` and build the channel list
fn scan_channels(root: &Path, settings: &LibrarySettings) -> Result<Vec<Channel>> {
    if !root.exists() {
        return Err(Error::PathNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(Error::NotADirectory(root.to_path_buf()));
    }

    let mut channels = Vec::new();

    let walker = WalkDir::new(root).min_depth(1).max_depth(1).follow_links(true);

    for entry in walker {
        if channels.len() >= settings.max_channels {
            debug!("Channel limit of {} reached, ignoring the rest", settings.max_channels);
            break;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Error accessing entry: {}", e);
                continue;
            }
        };

        if is_hidden(&entry) || !entry.file_type().is_dir() {
            continue;
        }

        let dir = entry.path();
        let description = match read_description(dir, &settings.descr_file) {
            Some(description) => description,
            None => {
                warn!("Skipping {}: no {}", dir.display(), settings.descr_file);
                continue;
            }
        };

        let files = collect_audio_files(dir, settings);
        if files.is_empty() {
            warn!("Skipping {}: no .{} files", dir.display(), settings.audio_extension);
            continue;
        }

        // Ids are dense over accepted channels only
        let id = match u16::try_from(channels.len())
            .ok()
            .and_then(|n| settings.min_channel_id.checked_add(n))
        {
            Some(id) => id,
            None => {
                warn!("Channel id space exhausted, ignoring {}", dir.display());
                break;
            }
        };

        info!(
            "Loaded channel {}: {} ({} audio file(s))",
            id,
            description,
            files.len()
        );
        channels.push(Channel::new(id, description, files));
    }

    if channels.is_empty() {
        return Err(Error::NoChannels(root.to_path_buf()));
    }

    Ok(channels)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// First line of the description file, or `None` if missing or empty
fn read_description(dir: &Path, descr_file: &str) -> Option<String> {
    let path = dir.join(descr_file);
    let file = File::open(&path).ok()?;

    let mut line = String::new();
    match BufReader::new(file).read_line(&mut line) {
        Ok(0) => None,
        Ok(_) => Some(line.trim_end_matches(&['\n', '\r'][..]).to_string()),
        Err(e) => {
            warn!("Cannot read {}: {}", path.display(), e);
            None
        }
    }
}

/// Regular files in `dir` with the audio extension, in enumeration order
fn collect_audio_files(dir: &Path, settings: &LibrarySettings) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        if files.len() >= settings.max_files_per_channel {
            break;
        }

        match entry {
            Ok(entry) => {
                if entry.file_type().is_file()
                    && has_extension(entry.path(), &settings.audio_extension)
                {
                    debug!("Adding audio file {}", entry.path().display());
                    files.push(entry.path().to_path_buf());
                }
            }
            Err(e) => warn!("Error accessing entry in {}: {}", dir.display(), e),
        }
    }

    files
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_channel(root: &Path, name: &str, descr: Option<&str>, files: &[(&str, &[u8])]) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        if let Some(descr) = descr {
            fs::write(dir.join(DESCR_FILE_NAME), descr).unwrap();
        }
        for (file, contents) in files {
            fs::write(dir.join(file), contents).unwrap();
        }
    }

    #[test]
    fn test_has_extension_case_insensitive() {
        assert!(has_extension(Path::new("a/b.mp3"), "mp3"));
        assert!(has_extension(Path::new("a/b.MP3"), "mp3"));
        assert!(!has_extension(Path::new("a/b.mp3.txt"), "mp3"));
        assert!(!has_extension(Path::new("a/mp3"), "mp3"));
    }

    #[test]
    fn test_description_first_line_without_newline() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(DESCR_FILE_NAME), "Jazz Night\r\nsecond line\n").unwrap();
        assert_eq!(
            read_description(tmp.path(), DESCR_FILE_NAME).as_deref(),
            Some("Jazz Night")
        );
    }

    #[test]
    fn test_empty_description_counts_as_missing() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(DESCR_FILE_NAME), "").unwrap();
        assert_eq!(read_description(tmp.path(), DESCR_FILE_NAME), None);
    }

    #[test]
    fn test_hidden_directories_are_skipped() {
        let tmp = TempDir::new().unwrap();
        make_channel(tmp.path(), ".cache", Some("hidden"), &[("a.mp3", b"abc")]);
        make_channel(tmp.path(), "visible", Some("visible"), &[("a.mp3", b"abc")]);

        let channels = scan_channels(tmp.path(), &LibrarySettings::default()).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].description(), "visible");
    }

    #[test]
    fn test_file_limit_per_channel() {
        let tmp = TempDir::new().unwrap();
        make_channel(
            tmp.path(),
            "many",
            Some("many"),
            &[("1.mp3", b"1"), ("2.mp3", b"2"), ("3.mp3", b"3"), ("4.mp3", b"4")],
        );

        let settings = LibrarySettings {
            max_files_per_channel: 2,
            ..LibrarySettings::default()
        };
        let channels = scan_channels(tmp.path(), &settings).unwrap();
        assert_eq!(channels[0].files().len(), 2);
    }

    #[test]
    fn test_channel_limit() {
        let tmp = TempDir::new().unwrap();
        for name in ["a", "b", "c"] {
            make_channel(tmp.path(), name, Some(name), &[("x.mp3", b"x")]);
        }

        let settings = LibrarySettings {
            max_channels: 2,
            ..LibrarySettings::default()
        };
        let channels = scan_channels(tmp.path(), &settings).unwrap();
        assert_eq!(channels.len(), 2);
    }

    #[test]
    fn test_empty_file_list_reports_channel_empty() {
        let channel = Channel::new(9, "nothing", Vec::new());
        let mut buf = [0u8; 4];
        assert!(matches!(channel.read(&mut buf), Err(Error::ChannelEmpty(9))));
    }

    #[test]
    fn test_file_ending_on_chunk_boundary_advances_without_empty_read() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.mp3");
        let b = tmp.path().join("b.mp3");
        fs::write(&a, b"abcdefgh").unwrap();
        fs::write(&b, b"XY").unwrap();

        let channel = Channel::new(1, "boundary", vec![a, b]);
        let mut buf = [0u8; 4];

        assert_eq!(channel.read(&mut buf).unwrap(), 4);
        assert_eq!(channel.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"efgh");
        assert_eq!(channel.cursor(), Cursor { file_index: 1, file_offset: 0 });

        assert_eq!(channel.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"XY");
        assert_eq!(channel.cursor(), Cursor { file_index: 0, file_offset: 0 });
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let gone = tmp.path().join("gone.mp3");
        let here = tmp.path().join("here.mp3");
        fs::write(&here, b"data").unwrap();

        let channel = Channel::new(1, "gap", vec![gone, here]);
        let mut buf = [0u8; 16];

        assert!(matches!(channel.read(&mut buf), Err(Error::Io(_))));
        assert_eq!(channel.cursor().file_index, 1);
        assert_eq!(channel.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"data");
    }
}
