//! Deduplicating store for captured secrets.
//!
//! The same secret is usually derived many times per run. The store keeps
//! every hex value it has seen for the lifetime of an attach and writes each
//! one to disk only the first time. `insert` and the following write share
//! one lock, so concurrent captures are serialized and a write is never torn.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::KeyStoreError;
use crate::paths::default_key_file;
use crate::secret::CapturedSecret;

/// How new secrets reach the key file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistMode {
    /// One JSON line per distinct secret, with its derivation parameters.
    #[default]
    Append,
    /// The file holds only the most recent secret as a bare hex line.
    LatestOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub mode: PersistMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_key_file(),
            mode: PersistMode::default(),
        }
    }
}

/// One line of the append-mode key file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyRecord {
    #[zeroize(skip)]
    pub session: Uuid,
    #[zeroize(skip)]
    pub captured_at: DateTime<Utc>,
    pub key_hex: String,
    pub key_len: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt_hex: Option<String>,
    pub prf: u32,
    pub prf_name: String,
    pub rounds: u32,
}

/// Result of [`KeyStore::capture`].
#[derive(Debug)]
pub enum Capture {
    /// Already seen during this attach; nothing written.
    Duplicate,
    /// New and written to disk.
    Stored,
    /// New, kept in memory, but the write failed.
    Unpersisted(KeyStoreError),
}

impl Capture {
    pub fn is_new(&self) -> bool {
        !matches!(self, Capture::Duplicate)
    }
}

#[derive(Debug)]
struct StoreState {
    seen: HashSet<String>,
    append: Option<File>,
    closed: bool,
}

impl Drop for StoreState {
    fn drop(&mut self) {
        for mut hex in self.seen.drain() {
            hex.zeroize();
        }
    }
}

#[derive(Debug)]
pub struct KeyStore {
    path: PathBuf,
    mode: PersistMode,
    session: Uuid,
    inner: Mutex<StoreState>,
}

impl KeyStore {
    pub fn open(config: &StoreConfig) -> Self {
        Self::with_session(config, Uuid::new_v4())
    }

    pub fn with_session(config: &StoreConfig, session: Uuid) -> Self {
        Self {
            path: config.path.clone(),
            mode: config.mode,
            session,
            inner: Mutex::new(StoreState {
                seen: HashSet::new(),
                append: None,
                closed: false,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> PersistMode {
        self.mode
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    /// Returns `true` the first time `hex` is seen, `false` afterwards.
    pub fn insert(&self, hex: &str) -> bool {
        self.inner.lock().seen.insert(hex.to_string())
    }

    pub fn contains(&self, hex: &str) -> bool {
        self.inner.lock().seen.contains(hex)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().seen.is_empty()
    }

    /// Every distinct secret seen so far, in no particular order.
    pub fn seen(&self) -> Vec<String> {
        self.inner.lock().seen.iter().cloned().collect()
    }

    /// Write `secret` to the key file according to the store's mode.
    pub fn persist(&self, secret: &CapturedSecret) -> Result<(), KeyStoreError> {
        let mut state = self.inner.lock();
        self.write(&mut state, secret)
    }

    /// Insert and persist as one step.
    pub fn capture(&self, secret: &CapturedSecret) -> Capture {
        let mut state = self.inner.lock();
        if !state.seen.insert(secret.key_hex.clone()) {
            return Capture::Duplicate;
        }
        match self.write(&mut state, secret) {
            Ok(()) => Capture::Stored,
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "could not persist captured key; keeping it in memory"
                );
                Capture::Unpersisted(err)
            }
        }
    }

    /// Flush and release the key file. Captures after this stay in memory
    /// only.
    pub fn close(&self) -> Result<(), KeyStoreError> {
        let mut state = self.inner.lock();
        state.closed = true;
        if let Some(file) = state.append.take() {
            file.sync_all()
                .map_err(|e| KeyStoreError::io(&self.path, e))?;
        }
        debug!(path = %self.path.display(), keys = state.seen.len(), "key store closed");
        Ok(())
    }

    /// Read back an append-mode key file. Lines that do not parse, such as
    /// one torn by a failed write, are skipped with a warning.
    pub fn read_records<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<KeyRecord>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(vec![]);
        }
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(err) => warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    error = %err,
                    "skipping unreadable key record"
                ),
            }
        }
        Ok(records)
    }

    fn write(&self, state: &mut StoreState, secret: &CapturedSecret) -> Result<(), KeyStoreError> {
        if state.closed {
            return Err(KeyStoreError::Closed);
        }
        match self.mode {
            PersistMode::Append => self.append_record(state, secret),
            PersistMode::LatestOnly => self.replace_latest(secret),
        }
    }

    fn append_record(
        &self,
        state: &mut StoreState,
        secret: &CapturedSecret,
    ) -> Result<(), KeyStoreError> {
        if state.append.is_none() {
            state.append = Some(open_append(&self.path)?);
        }
        let record = KeyRecord {
            session: self.session,
            captured_at: secret.captured_at,
            key_hex: secret.key_hex.clone(),
            key_len: secret.key_len,
            salt_hex: secret.salt_hex.clone(),
            prf: secret.prf,
            prf_name: secret.prf_name().to_string(),
            rounds: secret.rounds,
        };
        let line = Zeroizing::new(serde_json::to_string(&record)?);
        let Some(file) = state.append.as_mut() else {
            return Err(KeyStoreError::Closed);
        };
        let written = writeln!(file, "{}", line.as_str()).and_then(|_| file.flush());
        if let Err(e) = written {
            // The handle may sit after a partial line; reopen on the next write.
            state.append = None;
            return Err(KeyStoreError::io(&self.path, e));
        }
        Ok(())
    }

    fn replace_latest(&self, secret: &CapturedSecret) -> Result<(), KeyStoreError> {
        let dir = parent_dir(&self.path);
        ensure_dir(dir).map_err(|e| KeyStoreError::io(dir, e))?;
        // NamedTempFile is created 0600 on unix.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| KeyStoreError::io(dir, e))?;
        writeln!(tmp, "{}", secret.key_hex)
            .and_then(|_| tmp.flush())
            .map_err(|e| KeyStoreError::io(dir, e))?;
        tmp.persist(&self.path)
            .map_err(|e| KeyStoreError::io(&self.path, e.error))?;
        Ok(())
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    if dir.exists() {
        return Ok(());
    }
    fs::create_dir_all(dir)
}

fn open_append(path: &Path) -> Result<File, KeyStoreError> {
    let dir = parent_dir(path);
    ensure_dir(dir).map_err(|e| KeyStoreError::io(dir, e))?;
    let mut options = OpenOptions::new();
    options.create(true).read(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path).map_err(|e| KeyStoreError::io(path, e))?;
    terminate_torn_line(&mut file).map_err(|e| KeyStoreError::io(path, e))?;
    Ok(file)
}

/// Make sure the next record starts on a fresh line, even if an earlier
/// writer died mid-line.
fn terminate_torn_line(file: &mut File) -> std::io::Result<()> {
    if file.metadata()?.len() == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        warn!("key file ends mid-record; starting a new line");
        file.write_all(b"\n")?;
    }
    Ok(())
}
