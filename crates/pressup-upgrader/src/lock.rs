use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use fs2::FileExt;
use tracing::{debug, info};

pub const CORE_UPDATER_LOCK: &str = "core_updater";
pub const CORE_UPDATER_TTL: Duration = Duration::from_secs(15 * 60);

/// Backing store for named locks. Every method must be atomic with respect
/// to other callers sharing the store.
pub trait LockStore: Send + Sync {
    /// Creates the record only if none exists.
    fn insert(&self, name: &str, acquired_at: u64) -> Result<bool>;

    fn read(&self, name: &str) -> Result<Option<u64>>;

    /// Replaces the record only if it still holds `expected`.
    fn compare_and_swap(&self, name: &str, expected: u64, replacement: u64) -> Result<bool>;

    fn remove(&self, name: &str) -> Result<()>;
}

/// Proof that this process holds a lock. Only [`LockManager`] mints tokens.
#[derive(Debug, PartialEq, Eq)]
pub struct LockToken {
    name: String,
    acquired_at: u64,
}

impl LockToken {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn acquired_at(&self) -> u64 {
        self.acquired_at
    }
}

#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn LockStore>,
}

impl LockManager {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryLockStore::default()))
    }

    pub fn acquire(&self, name: &str, ttl: Duration) -> Result<Option<LockToken>> {
        self.acquire_at(name, ttl, unix_now()?)
    }

    /// Takes the lock when it is free or its holder's TTL has elapsed.
    pub fn acquire_at(&self, name: &str, ttl: Duration, now: u64) -> Result<Option<LockToken>> {
        let token = LockToken {
            name: name.to_string(),
            acquired_at: now,
        };
        if self.store.insert(name, now)? {
            debug!(lock = name, "lock acquired");
            return Ok(Some(token));
        }

        let Some(held_since) = self.store.read(name)? else {
            // Released between the insert and the read.
            return Ok(self.store.insert(name, now)?.then_some(token));
        };
        if held_since.saturating_add(ttl.as_secs()) > now {
            return Ok(None);
        }

        if self.store.compare_and_swap(name, held_since, now)? {
            info!(lock = name, held_since, "reclaimed expired lock");
            return Ok(Some(token));
        }
        Ok(None)
    }

    /// Unconditional and idempotent.
    pub fn release(&self, name: &str) -> Result<()> {
        self.store.remove(name)
    }

    pub fn release_token(&self, token: LockToken) -> Result<()> {
        self.release(&token.name)
    }

    pub fn holder_since(&self, name: &str) -> Result<Option<u64>> {
        self.store.read(name)
    }
}

#[derive(Debug, Default)]
pub struct MemoryLockStore {
    locks: Mutex<HashMap<String, u64>>,
}

impl MemoryLockStore {
    fn locks(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, u64>>> {
        self.locks
            .lock()
            .map_err(|_| anyhow!("lock table mutex poisoned"))
    }
}

impl LockStore for MemoryLockStore {
    fn insert(&self, name: &str, acquired_at: u64) -> Result<bool> {
        let mut locks = self.locks()?;
        if locks.contains_key(name) {
            return Ok(false);
        }
        locks.insert(name.to_string(), acquired_at);
        Ok(true)
    }

    fn read(&self, name: &str) -> Result<Option<u64>> {
        Ok(self.locks()?.get(name).copied())
    }

    fn compare_and_swap(&self, name: &str, expected: u64, replacement: u64) -> Result<bool> {
        let mut locks = self.locks()?;
        match locks.get_mut(name) {
            Some(current) if *current == expected => {
                *current = replacement;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.locks()?.remove(name);
        Ok(())
    }
}

/// One `<name>.lock` file per lock holding the acquisition timestamp. Each
/// operation runs under an exclusive advisory lock on `<name>.guard`, so
/// processes sharing the directory see a consistent record.
#[derive(Debug, Clone)]
pub struct FileLockStore {
    dir: PathBuf,
}

impl FileLockStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.lock"))
    }

    fn guard_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.guard"))
    }

    fn guard(&self, name: &str) -> Result<File> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.guard_path(name);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("failed to open lock guard: {}", path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("failed to take lock guard: {}", path.display()))?;
        Ok(file)
    }

    fn read_unguarded(&self, name: &str) -> Result<Option<u64>> {
        let path = self.lock_path(name);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read lock file: {}", path.display()));
            }
        };
        // A torn or corrupt record counts as acquired at the epoch, i.e. expired.
        Ok(Some(raw.trim().parse::<u64>().unwrap_or(0)))
    }
}

impl LockStore for FileLockStore {
    fn insert(&self, name: &str, acquired_at: u64) -> Result<bool> {
        let _guard = self.guard(name)?;
        let path = self.lock_path(name);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to claim lock file: {}", path.display()));
            }
        };
        file.write_all(format!("{acquired_at}\n").as_bytes())
            .with_context(|| format!("failed to write lock file: {}", path.display()))?;
        file.flush()
            .with_context(|| format!("failed to flush lock file: {}", path.display()))?;
        Ok(true)
    }

    fn read(&self, name: &str) -> Result<Option<u64>> {
        let _guard = self.guard(name)?;
        self.read_unguarded(name)
    }

    fn compare_and_swap(&self, name: &str, expected: u64, replacement: u64) -> Result<bool> {
        let _guard = self.guard(name)?;
        if self.read_unguarded(name)? != Some(expected) {
            return Ok(false);
        }
        let path = self.lock_path(name);
        write_replacing(&path, format!("{replacement}\n").as_bytes())?;
        Ok(true)
    }

    fn remove(&self, name: &str) -> Result<()> {
        let _guard = self.guard(name)?;
        let path = self.lock_path(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove lock file: {}", path.display()))
            }
        }
    }
}

fn write_replacing(path: &Path, contents: &[u8]) -> Result<()> {
    let staged = path.with_extension(format!("lock.{}", std::process::id()));
    fs::write(&staged, contents)
        .with_context(|| format!("failed to write {}", staged.display()))?;
    fs::rename(&staged, path)
        .with_context(|| format!("failed to replace lock file: {}", path.display()))
}

pub fn unix_now() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system time is before unix epoch")?
        .as_secs())
}
