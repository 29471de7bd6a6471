use camino::Utf8Path;
use chrono::{DateTime, TimeZone, Utc};
use std::fs;
use std::io::Read;
use std::process::{Command, Stdio};
use thiserror::Error;

use crate::template::base_name;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("process error: {0}")]
    Process(#[from] std::io::Error),

    #[error("transport exited with status {0}")]
    Failed(i32),

    #[error("failed to parse listing line: {0:?}")]
    InvalidListing(String),
}

/// Kind of a remote entry, derived from the listing's classify suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// A single entry reported by the remote listing service. Immutable input to
/// queue construction.
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    pub path: String,
    pub modified: DateTime<Utc>,
    pub kind: EntryKind,
}

impl RemoteEntry {
    /// Parse a listing line of the form `<unix-epoch-seconds> <path>` where
    /// the path carries a `cls --classify` suffix: `@` marks a symlink, `/` a
    /// directory, no suffix a regular file.
    pub fn parse(line: &str) -> Result<Self, TransportError> {
        let (epoch, path) = line
            .split_once(' ')
            .ok_or_else(|| TransportError::InvalidListing(line.to_string()))?;
        let secs: i64 = epoch
            .parse()
            .map_err(|_| TransportError::InvalidListing(line.to_string()))?;
        let modified = Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| TransportError::InvalidListing(line.to_string()))?;
        let kind = if path.ends_with('@') {
            EntryKind::Symlink
        } else if path.ends_with('/') {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        Ok(Self {
            path: path.trim_end_matches(['@', '/']).to_string(),
            modified,
            kind,
        })
    }

    pub fn base_name(&self) -> &str {
        base_name(&self.path)
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == EntryKind::Symlink
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Age in whole seconds relative to `since`.
    pub fn age(&self, since: DateTime<Utc>) -> i64 {
        (since - self.modified).num_seconds()
    }
}

/// External collaborator that lists remote directories and executes transfer
/// scripts. The queue core never transfers anything itself.
pub trait Transport {
    fn list(&self, site: &str, dir: &str) -> Result<Vec<RemoteEntry>, TransportError>;
    fn consume(&self, script: &Utf8Path) -> Result<(), TransportError>;
}

/// Local filesystem listing used by the merger and the existence guard.
/// Errors are deliberately swallowed: absent directories are the common case
/// and must not block queueing.
pub trait DirLister {
    fn list_dir(&self, path: &Utf8Path) -> Vec<String>;
}

/// `DirLister` backed by `std::fs::read_dir`, fail-open.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDirLister;

impl DirLister for FsDirLister {
    fn list_dir(&self, path: &Utf8Path) -> Vec<String> {
        let Ok(entries) = fs::read_dir(path) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect()
    }
}

/// Transport backed by an lftp subprocess. Both operations are blocking and
/// attempted exactly once.
#[derive(Debug, Clone)]
pub struct LftpClient {
    program: String,
    inherit_io: bool,
}

impl LftpClient {
    pub fn new(program: impl Into<String>, inherit_io: bool) -> Self {
        Self {
            program: program.into(),
            inherit_io,
        }
    }

    fn list_script(dir: &str) -> String {
        format!("cls -1 --classify --date --time-style='%s' {dir} && exit")
    }
}

impl Transport for LftpClient {
    fn list(&self, site: &str, dir: &str) -> Result<Vec<RemoteEntry>, TransportError> {
        tracing::debug!("listing {} on {}", dir, site);
        let mut child = Command::new(&self.program)
            .arg("-e")
            .arg(Self::list_script(dir))
            .arg(site)
            .stdout(Stdio::piped())
            .spawn()?;
        let mut output = String::new();
        if let Some(stdout) = child.stdout.as_mut() {
            stdout.read_to_string(&mut output)?;
        }
        let status = child.wait()?;
        if !status.success() {
            return Err(TransportError::Failed(status.code().unwrap_or(-1)));
        }
        let mut entries = Vec::new();
        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            entries.push(RemoteEntry::parse(line)?);
        }
        tracing::debug!("listed {} entries in {} on {}", entries.len(), dir, site);
        Ok(entries)
    }

    fn consume(&self, script: &Utf8Path) -> Result<(), TransportError> {
        tracing::info!("executing transfer script {}", script);
        let mut cmd = Command::new(&self.program);
        cmd.arg("-f").arg(script);
        if !self.inherit_io {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        let status = cmd.status()?;
        if !status.success() {
            return Err(TransportError::Failed(status.code().unwrap_or(-1)));
        }
        Ok(())
    }
}
