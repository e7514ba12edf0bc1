//! The mailbox file other processes use to queue display updates.
//!
//! Every line is `x,y,text`. An `x` of `-1` makes the line a command, with `text` naming it
//! (`home` or `clear`) and `y` ignored. Anything else writes `text` starting at column `x` of row
//! `y`. The text is everything after the second comma, so it may contain commas itself.
use log::debug;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

const COMMAND_MARKER: i64 = -1;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MailboxCommand {
    Home,
    Clear,
}

impl MailboxCommand {
    pub fn keyword(&self) -> &'static str {
        match self {
            MailboxCommand::Home => "home",
            MailboxCommand::Clear => "clear",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum MailboxEntry {
    Command(MailboxCommand),
    Write {
        column: usize,
        row: usize,
        text: String,
    },
}

impl MailboxEntry {
    pub fn write(column: usize, row: usize, text: impl Into<String>) -> Self {
        MailboxEntry::Write {
            column,
            row,
            text: text.into(),
        }
    }
}

impl Display for MailboxEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MailboxEntry::Command(command) => {
                write!(f, "{},{},{}", COMMAND_MARKER, COMMAND_MARKER, command.keyword())
            }
            MailboxEntry::Write { column, row, text } => write!(f, "{},{},{}", column, row, text),
        }
    }
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum MailboxError {
    #[error("line {line}: expected `x,y,text`")]
    MissingField { line: usize },
    #[error("line {line}: {value:?} is not an integer")]
    InvalidInteger { line: usize, value: String },
    #[error("line {line}: unknown command {command:?}")]
    UnknownCommand { line: usize, command: String },
    #[error("line {line}: negative coordinate {value}")]
    NegativeCoordinate { line: usize, value: i64 },
    #[error("line {line}: not valid UTF-8")]
    InvalidUtf8 { line: usize },
    #[error("row {row} is not on the display")]
    RowOutOfRange { row: usize },
}

fn parse_coordinate(value: &str, line: usize) -> Result<i64, MailboxError> {
    value
        .trim()
        .parse()
        .map_err(|_| MailboxError::InvalidInteger {
            line,
            value: value.to_string(),
        })
}

fn to_index(value: i64, line: usize) -> Result<usize, MailboxError> {
    usize::try_from(value).map_err(|_| MailboxError::NegativeCoordinate { line, value })
}

/// Parses a single mailbox line. `line` is the 1-based line number used in errors.
pub fn parse_line(raw: &str, line: usize) -> Result<MailboxEntry, MailboxError> {
    let raw = raw.trim_end_matches(['\r', '\n']);
    let mut fields = raw.splitn(3, ',');
    let (Some(x), Some(y), Some(text)) = (fields.next(), fields.next(), fields.next()) else {
        return Err(MailboxError::MissingField { line });
    };

    let x = parse_coordinate(x, line)?;

    // Commands don't care about the row.
    if x == COMMAND_MARKER {
        return match text.trim() {
            "home" => Ok(MailboxEntry::Command(MailboxCommand::Home)),
            "clear" => Ok(MailboxEntry::Command(MailboxCommand::Clear)),
            other => Err(MailboxError::UnknownCommand {
                line,
                command: other.to_string(),
            }),
        };
    }

    let y = parse_coordinate(y, line)?;
    Ok(MailboxEntry::Write {
        column: to_index(x, line)?,
        row: to_index(y, line)?,
        text: text.to_string(),
    })
}

/// Parses a whole mailbox. Either every line is valid, or nothing is returned. Blank lines are
/// skipped.
pub fn parse(content: &str) -> Result<Vec<MailboxEntry>, MailboxError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, raw)| !raw.trim().is_empty())
        .map(|(i, raw)| parse_line(raw, i + 1))
        .collect()
}

/// Like [parse], for content straight from the file.
pub fn parse_bytes(content: &[u8]) -> Result<Vec<MailboxEntry>, MailboxError> {
    let content = std::str::from_utf8(content).map_err(|err| {
        let valid = &content[..err.valid_up_to()];
        MailboxError::InvalidUtf8 {
            line: valid.iter().filter(|&&b| b == b'\n').count() + 1,
        }
    })?;
    parse(content)
}

/// Checks that every write lands on one of the display's `lines`.
pub fn check_rows(entries: &[MailboxEntry], lines: usize) -> Result<(), MailboxError> {
    for entry in entries {
        if let MailboxEntry::Write { row, .. } = entry {
            if *row >= lines {
                return Err(MailboxError::RowOutOfRange { row: *row });
            }
        }
    }
    Ok(())
}

fn render(entries: &[MailboxEntry]) -> String {
    entries.iter().map(|entry| format!("{}\n", entry)).collect()
}

#[derive(Debug, Clone)]
pub struct Mailbox {
    path: PathBuf,
}

impl Mailbox {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Mailbox {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the pending content, if there is any. It is not checked to be text.
    pub fn read(&self) -> std::io::Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Deletes the mailbox after it was consumed. A missing file is fine.
    pub fn remove(&self) -> std::io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    /// Replaces whatever is pending with the given entries.
    pub fn replace(&self, entries: &[MailboxEntry]) -> std::io::Result<()> {
        self.write_atomic(render(entries).as_bytes())
    }

    /// Replaces whatever is pending with a single `home` command.
    pub fn reset_home(&self) -> std::io::Result<()> {
        self.replace(&[MailboxEntry::Command(MailboxCommand::Home)])
    }

    /// Queues entries after the ones still pending.
    ///
    /// If the daemon consumes the mailbox between the read and the write here, the consumed lines
    /// are queued again. Entries have to be safe to apply more than once anyway.
    pub fn post(&self, entries: &[MailboxEntry]) -> std::io::Result<()> {
        let mut content = self.read()?.unwrap_or_default();
        if !content.is_empty() && !content.ends_with(b"\n") {
            content.push(b'\n');
        }
        content.extend_from_slice(render(entries).as_bytes());
        self.write_atomic(&content)
    }

    /// Writes through a temporary file in the same directory and renames it over the mailbox, so
    /// a reader never sees a half-written file.
    fn write_atomic(&self, content: &[u8]) -> std::io::Result<()> {
        let mut file_name = self
            .path
            .file_name()
            .ok_or(ErrorKind::InvalidInput)?
            .to_os_string();
        file_name.push(format!(".{}.tmp", std::process::id()));
        let temp = self.path.with_file_name(file_name);

        debug!("Writing mailbox {} via {}", self.path.display(), temp.display());
        fs::write(&temp, content)?;
        if let Err(err) = fs::rename(&temp, &self.path) {
            let _ = fs::remove_file(&temp);
            return Err(err);
        }
        Ok(())
    }
}
