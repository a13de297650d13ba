//! # Shared Telemetry Store
//!
//! Latest-value mailbox holding exactly one [`TelemetrySnapshot`].
//!
//! Readers copy the snapshot out; writers replace one [`FieldGroup`] under
//! the store's single lock. A reader therefore never sees half of one write,
//! but may see any combination of the latest controls write and the latest
//! attitude write. There is no queueing and no backpressure.
//!
//! Two implementations:
//!
//! - [`SharedFileStore`]: crosses process boundaries. The snapshot lives in a
//!   JSON file guarded by an OS advisory lock (shared for reads, exclusive for
//!   read-modify-write). If the file is found corrupt, a write rebuilds it
//!   from the last snapshot this handle saw, so the other group survives.
//! - [`MemoryStore`]: a mutex-guarded snapshot for single-process use.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::snapshot::{FieldGroup, TelemetrySnapshot};
use crate::error::{GroundLinkError, Result};

/// Access to the latest telemetry snapshot.
#[cfg_attr(test, mockall::automock)]
pub trait TelemetryStore: Send + Sync {
    /// Copy out the current snapshot.
    fn read(&self) -> Result<TelemetrySnapshot>;

    /// Replace one field-group wholesale.
    fn write(&self, group: FieldGroup) -> Result<()>;
}

impl<T: TelemetryStore + ?Sized> TelemetryStore for Arc<T> {
    fn read(&self) -> Result<TelemetrySnapshot> {
        (**self).read()
    }

    fn write(&self, group: FieldGroup) -> Result<()> {
        (**self).write(group)
    }
}

/// In-process store behind a mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<TelemetrySnapshot>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TelemetryStore for MemoryStore {
    fn read(&self) -> Result<TelemetrySnapshot> {
        self.snapshot
            .lock()
            .map(|guard| *guard)
            .map_err(|_| GroundLinkError::Store("memory store lock poisoned".to_string()))
    }

    fn write(&self, group: FieldGroup) -> Result<()> {
        let mut guard = self
            .snapshot
            .lock()
            .map_err(|_| GroundLinkError::Store("memory store lock poisoned".to_string()))?;
        guard.apply(group);
        Ok(())
    }
}

/// Inter-process store backed by a lock-guarded JSON file.
///
/// Every operation opens the file afresh, takes the lock, does its work and
/// releases the lock, so any number of processes may hold a
/// `SharedFileStore` for the same path. Clones share the last good snapshot.
///
/// # Examples
///
/// ```no_run
/// use ground_link::telemetry::{Attitude, FieldGroup, SharedFileStore, TelemetryStore};
///
/// let store = SharedFileStore::open("/tmp/ground-link/telemetry.json")?;
/// store.write(FieldGroup::Attitude(Attitude::new(2.0, -1.0, 180.0)))?;
/// let snapshot = store.read()?;
/// assert!(snapshot.attitude.is_some());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct SharedFileStore {
    path: PathBuf,
    last_good: Arc<Mutex<Option<TelemetrySnapshot>>>,
}

impl SharedFileStore {
    /// Open (creating if needed) the store file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the parent directory or file cannot be created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    GroundLinkError::Store(format!("Failed to create {}: {}", parent.display(), e))
                })?;
            }
        }

        let store = Self {
            path,
            last_good: Arc::new(Mutex::new(None)),
        };
        store.open_file()?;
        debug!("Telemetry store at {}", store.path.display());
        Ok(store)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_file(&self) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| GroundLinkError::Store(format!("Failed to open {}: {}", self.path.display(), e)))
    }

    /// Parse the file content; an empty file is the zeroed snapshot.
    fn load(file: &mut File) -> Result<TelemetrySnapshot> {
        let mut contents = String::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_string(&mut contents)?;

        if contents.trim().is_empty() {
            return Ok(TelemetrySnapshot::default());
        }

        serde_json::from_str(&contents)
            .map_err(|e| GroundLinkError::Store(format!("Corrupt snapshot file: {}", e)))
    }

    fn remember(&self, snapshot: TelemetrySnapshot) {
        if let Ok(mut guard) = self.last_good.lock() {
            *guard = Some(snapshot);
        }
    }

    /// Base for a write over a corrupt file.
    fn recover(&self, reason: &str, group: &FieldGroup) -> TelemetrySnapshot {
        let other = match group {
            FieldGroup::Controls(_) => "attitude",
            FieldGroup::Attitude(_) => "controls",
        };
        match self.last_good.lock().ok().and_then(|guard| *guard) {
            Some(snapshot) => {
                warn!("{}; restoring {} from the last good snapshot", reason, other);
                snapshot
            }
            None => {
                warn!("{}; {} lost, starting from a zeroed snapshot", reason, other);
                TelemetrySnapshot::default()
            }
        }
    }

    fn replace(&self, file: &mut File, group: FieldGroup) -> Result<()> {
        let mut snapshot = match Self::load(file) {
            Ok(snapshot) => snapshot,
            Err(GroundLinkError::Store(msg)) => self.recover(&msg, &group),
            Err(e) => return Err(e),
        };
        snapshot.apply(group);

        let encoded = serde_json::to_vec(&snapshot)?;
        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        file.write_all(&encoded)?;
        file.flush()?;
        self.remember(snapshot);
        Ok(())
    }
}

impl TelemetryStore for SharedFileStore {
    fn read(&self) -> Result<TelemetrySnapshot> {
        let mut file = self.open_file()?;
        FileExt::lock_shared(&file)?;
        let result = Self::load(&mut file);
        FileExt::unlock(&file)?;
        let snapshot = result?;
        self.remember(snapshot);
        Ok(snapshot)
    }

    fn write(&self, group: FieldGroup) -> Result<()> {
        let mut file = self.open_file()?;
        FileExt::lock_exclusive(&file)?;
        let result = self.replace(&mut file, group);
        FileExt::unlock(&file)?;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::snapshot::{Attitude, ControlInputs, NUM_BUTTONS};
    use std::thread;
    use tempfile::TempDir;

    fn controls_filled(k: u32) -> ControlInputs {
        ControlInputs {
            axes: [k as f32; 6],
            buttons: [k % 2 == 0; NUM_BUTTONS],
        }
    }

    fn attitude_filled(k: u32) -> Attitude {
        Attitude {
            pitch: k as f32,
            roll: k as f32,
            yaw: k as f32,
            throttle: k as f32,
        }
    }

    fn assert_groups_consistent(snapshot: &TelemetrySnapshot) {
        let axes = snapshot.controls.axes;
        assert!(axes.iter().all(|&a| a == axes[0]), "mixed axes: {:?}", axes);

        let buttons = snapshot.controls.buttons;
        assert!(buttons.iter().all(|&b| b == buttons[0]), "mixed buttons: {:?}", buttons);

        if let Some(a) = snapshot.attitude {
            assert!(
                a.pitch == a.roll && a.roll == a.yaw && a.yaw == a.throttle,
                "mixed attitude: {:?}",
                a
            );
        }
    }

    /// One writer per field-group plus readers, all racing.
    fn hammer<S: TelemetryStore + 'static>(store: Arc<S>, iterations: u32) {
        let controls_writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for k in 0..iterations {
                    store.write(FieldGroup::Controls(controls_filled(k))).unwrap();
                }
            })
        };
        let attitude_writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for k in 0..iterations {
                    store.write(FieldGroup::Attitude(attitude_filled(k))).unwrap();
                }
            })
        };
        let readers: Vec<_> = (0..2)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..iterations {
                        assert_groups_consistent(&store.read().unwrap());
                    }
                })
            })
            .collect();

        controls_writer.join().unwrap();
        attitude_writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }

        let last = store.read().unwrap();
        assert_eq!(last.controls, controls_filled(iterations - 1));
        assert_eq!(last.attitude, Some(attitude_filled(iterations - 1)));
    }

    #[test]
    fn test_memory_store_starts_zeroed() {
        let store = MemoryStore::new();
        assert_eq!(store.read().unwrap(), TelemetrySnapshot::default());
    }

    #[test]
    fn test_memory_store_groups_are_independent() {
        let store = MemoryStore::new();
        store.write(FieldGroup::Controls(controls_filled(3))).unwrap();
        store.write(FieldGroup::Attitude(attitude_filled(7))).unwrap();
        store.write(FieldGroup::Controls(controls_filled(4))).unwrap();

        let snapshot = store.read().unwrap();
        assert_eq!(snapshot.controls, controls_filled(4));
        assert_eq!(snapshot.attitude, Some(attitude_filled(7)));
    }

    #[test]
    fn test_memory_store_concurrent_groups_never_mix() {
        hammer(Arc::new(MemoryStore::new()), 2000);
    }

    #[test]
    fn test_file_store_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/state/telemetry.json");
        let store = SharedFileStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.read().unwrap(), TelemetrySnapshot::default());
    }

    #[test]
    fn test_file_store_visible_across_handles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("telemetry.json");

        let writer = SharedFileStore::open(&path).unwrap();
        let reader = SharedFileStore::open(&path).unwrap();

        writer.write(FieldGroup::Attitude(Attitude::new(30.0, 20.0, 45.0))).unwrap();
        let snapshot = reader.read().unwrap();
        assert_eq!(snapshot.attitude, Some(Attitude::new(30.0, 20.0, 45.0)));
        assert_eq!(snapshot.controls, ControlInputs::default());
    }

    #[test]
    fn test_file_store_uses_flat_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("telemetry.json");
        let store = SharedFileStore::open(&path).unwrap();
        store.write(FieldGroup::Controls(controls_filled(1))).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["axis_0"], 1.0);
        assert_eq!(raw["button_0"], false);
    }

    #[test]
    fn test_file_store_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("telemetry.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = SharedFileStore::open(&path).unwrap();
        assert!(matches!(store.read(), Err(GroundLinkError::Store(_))));

        // A write starts over from a zeroed snapshot
        store.write(FieldGroup::Attitude(attitude_filled(2))).unwrap();
        let snapshot = store.read().unwrap();
        assert_eq!(snapshot.attitude, Some(attitude_filled(2)));
    }

    #[test]
    fn test_file_store_corrupt_file_keeps_other_group() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("telemetry.json");
        let store = SharedFileStore::open(&path).unwrap();

        store.write(FieldGroup::Attitude(attitude_filled(7))).unwrap();
        store.write(FieldGroup::Controls(controls_filled(1))).unwrap();
        std::fs::write(&path, "{\"axis_0\": 0.5, \"axis_").unwrap();

        store.write(FieldGroup::Controls(controls_filled(4))).unwrap();
        let snapshot = store.read().unwrap();
        assert_eq!(snapshot.controls, controls_filled(4));
        assert_eq!(snapshot.attitude, Some(attitude_filled(7)));
    }

    #[test]
    fn test_file_store_shorter_rewrite_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("telemetry.json");
        let store = SharedFileStore::open(&path).unwrap();

        let mut wide = ControlInputs::default();
        wide.axes = [-0.123_456_7; 6];
        store.write(FieldGroup::Controls(wide)).unwrap();
        store.write(FieldGroup::Controls(ControlInputs::default())).unwrap();

        assert_eq!(store.read().unwrap().controls, ControlInputs::default());
    }

    #[test]
    fn test_file_store_concurrent_groups_never_mix() {
        let dir = TempDir::new().unwrap();
        let store = SharedFileStore::open(dir.path().join("telemetry.json")).unwrap();
        hammer(Arc::new(store), 200);
    }
}
