//! Operator channel control
//!
//! The channel directory is a static list of `id,description` pairs. The
//! operator picks an entry by its 1-based position; the chosen channel id is
//! published through `ChannelSelection`, which the receive path reads for
//! every datagram.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use mcradio_common::ChannelId;
use tracing::{info, warn};

/// Directory used when none is configured
pub const DEFAULT_CHANNELS: &str = "1,opera|2,traffic|3,children|4,pop";

/// Maximum number of directory entries kept
pub const MAX_DIRECTORY_ENTRIES: usize = 20;

/// One selectable channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub id: ChannelId,
    pub description: String,
}

/// Ordered list of channels the operator can choose from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelDirectory {
    entries: Vec<DirectoryEntry>,
}

impl ChannelDirectory {
    /// Parse `"id,description|id,description"`
    ///
    /// Malformed entries are skipped with a warning. At most
    /// `MAX_DIRECTORY_ENTRIES` entries are kept.
    pub fn parse(list: &str) -> Self {
        let mut entries = Vec::new();

        for raw in list.split('|') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            if entries.len() >= MAX_DIRECTORY_ENTRIES {
                warn!(
                    "Channel directory exceeds {} entries; ignoring the rest",
                    MAX_DIRECTORY_ENTRIES
                );
                break;
            }

            match parse_entry(raw) {
                Some(entry) => entries.push(entry),
                None => warn!("Skipping malformed channel entry '{}'", raw),
            }
        }

        Self { entries }
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at 1-based `position`
    pub fn by_position(&self, position: usize) -> Option<&DirectoryEntry> {
        position.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    pub fn find(&self, id: ChannelId) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }
}

fn parse_entry(raw: &str) -> Option<DirectoryEntry> {
    let (id, description) = raw.split_once(',')?;
    let id = id.trim().parse().ok()?;
    let description = description.trim();
    if description.is_empty() {
        return None;
    }
    Some(DirectoryEntry {
        id,
        description: description.to_string(),
    })
}

const NO_CHANNEL: u32 = u32::MAX;

/// Currently selected channel, shared between operator and receiver
#[derive(Debug)]
pub struct ChannelSelection {
    current: AtomicU32,
}

impl Default for ChannelSelection {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelSelection {
    /// Nothing selected
    pub fn new() -> Self {
        Self {
            current: AtomicU32::new(NO_CHANNEL),
        }
    }

    pub fn get(&self) -> Option<ChannelId> {
        match self.current.load(Ordering::Acquire) {
            NO_CHANNEL => None,
            id => Some(id as ChannelId),
        }
    }

    pub fn set(&self, id: ChannelId) {
        self.current.store(u32::from(id), Ordering::Release);
    }

    pub fn clear(&self) {
        self.current.store(NO_CHANNEL, Ordering::Release);
    }

    pub fn is(&self, id: ChannelId) -> bool {
        self.get() == Some(id)
    }
}

/// Parsed operator input line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// 1-based directory position
    Select(usize),
    List,
    Quit,
    Help,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line {
            "l" | "L" => Command::List,
            "q" | "Q" => Command::Quit,
            _ => match line.parse::<usize>() {
                Ok(position) => Command::Select(position),
                Err(_) => Command::Help,
            },
        }
    }
}

/// Why the operator loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorExit {
    Quit,
    EndOfInput,
}

/// Read commands from `input` until `q` or end of input
///
/// Prompts and listings go to `output`. Quitting clears `running`.
pub fn run_operator_loop<R: BufRead, W: Write>(
    input: R,
    mut output: W,
    directory: &ChannelDirectory,
    selection: &ChannelSelection,
    running: &AtomicBool,
) -> io::Result<OperatorExit> {
    write_help(&mut output, directory)?;

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match Command::parse(&line) {
            Command::Select(position) => match directory.by_position(position) {
                Some(entry) => {
                    selection.set(entry.id);
                    info!("Selected channel {} ({})", entry.id, entry.description);
                    writeln!(output, "Now playing: {} (channel {})", entry.description, entry.id)?;
                }
                None => writeln!(
                    output,
                    "No channel at position {}; choose 1-{}",
                    position,
                    directory.len()
                )?,
            },
            Command::List => write_listing(&mut output, directory, selection)?,
            Command::Quit => {
                running.store(false, Ordering::SeqCst);
                writeln!(output, "Bye")?;
                return Ok(OperatorExit::Quit);
            }
            Command::Help => write_help(&mut output, directory)?,
        }
        output.flush()?;
    }

    Ok(OperatorExit::EndOfInput)
}

/// Print the directory, marking the current channel
pub fn write_listing<W: Write>(
    output: &mut W,
    directory: &ChannelDirectory,
    selection: &ChannelSelection,
) -> io::Result<()> {
    writeln!(output, "Channels:")?;
    for (i, entry) in directory.entries().iter().enumerate() {
        let marker = if selection.is(entry.id) { " [current]" } else { "" };
        writeln!(
            output,
            "  {}. {} (channel {}){}",
            i + 1,
            entry.description,
            entry.id,
            marker
        )?;
    }
    Ok(())
}

fn write_help<W: Write>(output: &mut W, directory: &ChannelDirectory) -> io::Result<()> {
    writeln!(
        output,
        "Commands: 1-{} select channel, l list channels, q quit",
        directory.len()
    )
}
