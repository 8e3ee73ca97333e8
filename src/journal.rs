use crate::event::Event;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const ARCHIVE_COMPRESSION_LEVEL: i32 = 3;

/// Whether a journal takes an exclusive advisory lock on its active file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    /// Only one journal per directory may be open for writing.
    #[default]
    Exclusive,
    /// No locking. The caller guarantees a single writer.
    None,
}

/// Append-only JSONL persistence for store events.
///
/// Layout of the journal directory:
///
/// ```text
/// <dir>/events.jsonl        active segment, one event per line
/// <dir>/archive.jsonl.zst   rotated segments, one zstd frame each
/// ```
///
/// Every append is flushed with `sync_data` before returning, so an event
/// acknowledged by [`Journal::append`] survives a crash. A crash mid-write
/// leaves a partial last line, which [`Journal::read_all`] skips and the
/// next [`Journal::open`] truncates.
pub struct Journal {
    dir: PathBuf,
    log_path: PathBuf,
    archive_path: PathBuf,
    file: File,
    lock: LockMode,
    max_log_size: u64,
    /// Bytes of the active segment covered by successful appends.
    committed: u64,
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("dir", &self.dir)
            .field("lock", &self.lock)
            .field("max_log_size", &self.max_log_size)
            .finish()
    }
}

/// Builder for [`Journal`].
///
/// # Examples
///
/// ```no_run
/// use statefold::{Journal, LockMode};
///
/// let journal = Journal::builder("./data")
///     .lock(LockMode::Exclusive)
///     .max_log_size(10 * 1024 * 1024)
///     .open()?;
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct JournalBuilder {
    dir: PathBuf,
    lock: LockMode,
    max_log_size: u64,
}

impl JournalBuilder {
    /// Set the locking behaviour. Defaults to [`LockMode::Exclusive`].
    pub fn lock(mut self, lock: LockMode) -> Self {
        self.lock = lock;
        self
    }

    /// Rotate the active segment into the archive once it reaches `bytes`.
    /// `0` (the default) disables automatic rotation.
    pub fn max_log_size(mut self, bytes: u64) -> Self {
        self.max_log_size = bytes;
        self
    }

    /// Open or create the journal.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the active file
    /// cannot be opened, or (with [`LockMode::Exclusive`]) another journal
    /// already holds the lock, in which case the error kind is
    /// [`io::ErrorKind::AlreadyExists`].
    pub fn open(self) -> io::Result<Journal> {
        let log_path = self.dir.join("events.jsonl");
        let archive_path = self.dir.join("archive.jsonl.zst");

        fs::create_dir_all(&self.dir)?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&log_path)?;

        if self.lock == LockMode::Exclusive && FileExt::try_lock_exclusive(&file).is_err() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!(
                    "another writer holds the lock on {}",
                    log_path.display()
                ),
            ));
        }

        let active = fs::read(&log_path)?;
        let committed = complete_prefix_len(&active) as u64;
        if committed < active.len() as u64 {
            log::warn!(
                "truncating partial line ({} bytes) at end of {}",
                active.len() as u64 - committed,
                log_path.display()
            );
            file.set_len(committed)?;
            file.sync_all()?;
        }

        log::debug!("opened journal at {}", log_path.display());

        Ok(Journal {
            dir: self.dir,
            log_path,
            archive_path,
            file,
            lock: self.lock,
            max_log_size: self.max_log_size,
            committed,
        })
    }
}

impl Journal {
    /// Open or create a journal in `dir` with default settings.
    pub fn open(dir: impl AsRef<Path>) -> io::Result<Self> {
        Self::builder(dir).open()
    }

    /// Start configuring a journal rooted at `dir`.
    pub fn builder(dir: impl AsRef<Path>) -> JournalBuilder {
        JournalBuilder {
            dir: dir.as_ref().to_path_buf(),
            lock: LockMode::default(),
            max_log_size: 0,
        }
    }

    /// Append an event as a single JSON line and flush it to disk.
    ///
    /// Rotates first if the active segment has reached the configured
    /// maximum size. Returns the byte offset in the active segment where
    /// the line starts.
    ///
    /// If the write or the flush fails, the active segment is cut back to
    /// its last committed line before the error is returned, so a failed
    /// append never leaves a line that a later [`read_all`](Self::read_all)
    /// would see.
    pub fn append<C, S>(&mut self, event: &Event<C, S>) -> io::Result<u64>
    where
        C: Serialize,
        S: Serialize,
    {
        let mut line = serde_json::to_vec(event).map_err(invalid_data)?;
        line.push(b'\n');

        if self.max_log_size > 0 && self.committed >= self.max_log_size {
            self.rotate()?;
        }
        self.discard_uncommitted()?;

        let offset = self.committed;
        if let Err(e) = self.write_line(&line) {
            if let Err(cleanup) = self.file.set_len(offset) {
                log::warn!(
                    "could not cut {} back to {offset} bytes after a failed append: {cleanup}",
                    self.log_path.display()
                );
            }
            return Err(e);
        }
        self.committed = offset + line.len() as u64;
        Ok(offset)
    }

    /// Read every persisted event: archived segments first, then the active
    /// segment.
    ///
    /// Blank lines are skipped. A partial line at the end of the active
    /// segment (no trailing newline) is skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::InvalidData`] if a complete line does not
    /// decode as an event.
    pub fn read_all<C, S>(&self) -> io::Result<Vec<Event<C, S>>>
    where
        C: DeserializeOwned,
        S: DeserializeOwned,
    {
        let mut events = Vec::new();

        match fs::read(&self.archive_path) {
            Ok(compressed) => {
                // One zstd frame per rotation; decoding runs through all of them.
                let archived = zstd::decode_all(compressed.as_slice())?;
                decode_lines(&archived, &mut events)?;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let active = fs::read(&self.log_path)?;
        let complete = complete_prefix_len(&active);
        if complete < active.len() {
            log::warn!(
                "skipping partial line ({} bytes) at end of {}",
                active.len() - complete,
                self.log_path.display()
            );
        }
        decode_lines(&active[..complete], &mut events)?;

        Ok(events)
    }

    /// Move the active segment into the compressed archive and truncate it.
    ///
    /// Committed lines only: anything after the last successful append is
    /// discarded.
    pub fn rotate(&mut self) -> io::Result<()> {
        let active = fs::read(&self.log_path)?;
        let segment = &active[..(self.committed as usize).min(active.len())];

        if !segment.is_empty() {
            let frame = zstd::encode_all(segment, ARCHIVE_COMPRESSION_LEVEL)?;
            let mut archive = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.archive_path)?;
            archive.write_all(&frame)?;
            archive.sync_data()?;
        }

        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.committed = 0;

        log::info!(
            "rotated {} bytes of {} into {} (archive now {} bytes)",
            segment.len(),
            self.log_path.display(),
            self.archive_path.display(),
            fs::metadata(&self.archive_path).map_or(0, |m| m.len())
        );
        Ok(())
    }

    /// Returns the journal directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path to the active segment.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Returns the path to the compressed archive.
    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Returns the current size in bytes of the active segment.
    pub fn active_log_size(&self) -> io::Result<u64> {
        Ok(fs::metadata(&self.log_path)?.len())
    }

    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.file.write_all(line)?;
        self.file.sync_data()
    }

    /// Cut off bytes past the last committed line, left behind by an
    /// append whose cleanup also failed.
    fn discard_uncommitted(&mut self) -> io::Result<()> {
        let len = self.file.metadata()?.len();
        if len > self.committed {
            log::warn!(
                "discarding {} uncommitted byte(s) at end of {}",
                len - self.committed,
                self.log_path.display()
            );
            self.file.set_len(self.committed)?;
        }
        Ok(())
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        if self.lock == LockMode::Exclusive {
            let _ = FileExt::unlock(&self.file);
        }
    }
}

/// Length of the longest prefix of `bytes` that ends in a newline.
fn complete_prefix_len(bytes: &[u8]) -> usize {
    bytes.iter().rposition(|&b| b == b'\n').map_or(0, |pos| pos + 1)
}

/// Decode each non-blank line of `bytes` as an event.
fn decode_lines<C, S>(bytes: &[u8], events: &mut Vec<Event<C, S>>) -> io::Result<()>
where
    C: DeserializeOwned,
    S: DeserializeOwned,
{
    for line in bytes.split(|&b| b == b'\n') {
        if line.trim_ascii().is_empty() {
            continue;
        }
        events.push(serde_json::from_slice(line).map_err(invalid_data)?);
    }
    Ok(())
}

fn invalid_data(e: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}
