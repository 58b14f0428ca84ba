//! Mount registry.
//!
//! Tracks every volume the host knows about, how many containers currently
//! use it, and whether it was explicitly provisioned (managed) or only
//! observed on first use (unmanaged). Managed volumes are mirrored to the
//! [`MetadataStore`] so they survive a restart.
//!
//! ```text
//!             add                     increment
//! (absent) ──────────▶ (unmanaged,c=1) ──────────▶ (unmanaged,c≥1)
//!     │
//!     │ create(opts)
//!     ▼
//! (managed,c=0) ──increment──▶ (managed,c≥1)
//!     │                              │
//!     │ delete                       │ delete → InUse
//!     ▼
//! (absent, file removed)
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use netshare_common::options::parse_bool;
use netshare_common::{NetshareError, NetsharePaths, NetshareResult, VolumeName, VolumeOptions};
use parking_lot::Mutex;

use crate::config::DriverConfig;
use crate::store::MetadataStore;
use crate::volume::Volume;

/// Bookkeeping entry for one volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecord {
    name: VolumeName,
    hostdir: PathBuf,
    connections: usize,
    options: VolumeOptions,
    managed: bool,
}

impl MountRecord {
    /// Volume name.
    #[must_use]
    pub const fn name(&self) -> &VolumeName {
        &self.name
    }

    /// Host directory the volume is mounted on.
    #[must_use]
    pub fn hostdir(&self) -> &Path {
        &self.hostdir
    }

    /// Number of live consumers.
    #[must_use]
    pub const fn connections(&self) -> usize {
        self.connections
    }

    /// Volume options.
    #[must_use]
    pub const fn options(&self) -> &VolumeOptions {
        &self.options
    }

    /// Whether the volume was provisioned with options.
    #[must_use]
    pub const fn is_managed(&self) -> bool {
        self.managed
    }

    /// Whether any consumer references the volume.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.connections > 0
    }
}

/// In-memory registry of known mounts.
///
/// Every operation holds a single lock for its whole duration, metadata
/// writes included, so operations on the same name are strictly ordered.
/// Share it between request handlers with an `Arc`.
#[derive(Debug)]
pub struct MountRegistry {
    paths: NetsharePaths,
    store: MetadataStore,
    mounts: Mutex<BTreeMap<VolumeName, MountRecord>>,
}

impl MountRegistry {
    /// Open a registry over `root`, using default settings otherwise.
    ///
    /// # Errors
    ///
    /// See [`MountRegistry::open`].
    pub fn new(root: impl Into<PathBuf>) -> NetshareResult<Self> {
        Self::open(&DriverConfig::default().with_root(root))
    }

    /// Open a registry and rehydrate it from the metadata directory.
    ///
    /// Every snapshot found on disk becomes a managed record with no
    /// connections. Unreadable snapshots are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the metadata
    /// directory cannot be created.
    pub fn open(config: &DriverConfig) -> NetshareResult<Self> {
        config.validate()?;

        let paths = config.paths.clone();
        let store = MetadataStore::new(paths.meta());

        let mounts: BTreeMap<_, _> = store
            .load()?
            .into_iter()
            .map(|(name, options)| {
                let record = MountRecord {
                    hostdir: paths.mountpoint(&name),
                    name: name.clone(),
                    connections: 0,
                    options,
                    managed: true,
                };
                (name, record)
            })
            .collect();

        tracing::info!(
            root = %paths.root().display(),
            volumes = mounts.len(),
            "Mount registry loaded"
        );

        Ok(Self {
            paths,
            store,
            mounts: Mutex::new(mounts),
        })
    }

    /// Get the configured paths.
    #[must_use]
    pub const fn paths(&self) -> &NetsharePaths {
        &self.paths
    }

    /// Get the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.paths.root()
    }

    /// Number of known volumes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mounts.lock().len()
    }

    /// Whether no volume is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mounts.lock().is_empty()
    }

    /// Snapshot of a single record.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<MountRecord> {
        self.mounts.lock().get(name).cloned()
    }

    /// Whether the volume is known.
    #[must_use]
    pub fn has_mount(&self, name: &str) -> bool {
        self.mounts.lock().contains_key(name)
    }

    /// Whether the volume is known and has at least one option.
    #[must_use]
    pub fn has_options(&self, name: &str) -> bool {
        self.mounts
            .lock()
            .get(name)
            .is_some_and(|m| !m.options.is_empty())
    }

    /// Whether the volume has the option `key`.
    #[must_use]
    pub fn has_option(&self, name: &str, key: &str) -> bool {
        self.mounts
            .lock()
            .get(name)
            .is_some_and(|m| m.options.contains_key(key))
    }

    /// The volume's options, empty if unknown.
    #[must_use]
    pub fn get_options(&self, name: &str) -> VolumeOptions {
        self.mounts
            .lock()
            .get(name)
            .map(|m| m.options.clone())
            .unwrap_or_default()
    }

    /// The value of option `key`, empty if unset.
    #[must_use]
    pub fn get_option(&self, name: &str, key: &str) -> String {
        self.mounts
            .lock()
            .get(name)
            .and_then(|m| m.options.get(key).cloned())
            .unwrap_or_default()
    }

    /// The value of option `key` read as a boolean (`yes`/`true`).
    #[must_use]
    pub fn get_option_as_bool(&self, name: &str, key: &str) -> bool {
        parse_bool(&self.get_option(name, key))
    }

    /// Whether the volume is known and referenced by a consumer.
    #[must_use]
    pub fn is_active_mount(&self, name: &str) -> bool {
        self.mounts.lock().get(name).is_some_and(MountRecord::is_active)
    }

    /// Whether the volume is known and managed.
    #[must_use]
    pub fn is_managed(&self, name: &str) -> bool {
        self.mounts.lock().get(name).is_some_and(|m| m.managed)
    }

    /// Number of consumers, 0 if unknown.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.mounts.lock().get(name).map_or(0, |m| m.connections)
    }

    /// Register a consumer of `name`.
    ///
    /// Unknown volumes are inserted as unmanaged with one connection and no
    /// metadata file.
    ///
    /// # Errors
    ///
    /// Returns [`NetshareError::InvalidVolumeName`] for malformed names.
    pub fn add(&self, name: &str) -> NetshareResult<()> {
        let mut mounts = self.mounts.lock();

        if let Some(record) = mounts.get_mut(name) {
            record.connections += 1;
            tracing::debug!(volume = %name, connections = record.connections, "Mount referenced");
            return Ok(());
        }

        let name = VolumeName::new(name)?;
        let record = MountRecord {
            hostdir: self.paths.mountpoint(&name),
            name: name.clone(),
            connections: 1,
            options: VolumeOptions::new(),
            managed: false,
        };
        tracing::debug!(volume = %name, hostdir = %record.hostdir.display(), "Unmanaged mount added");
        mounts.insert(name, record);

        Ok(())
    }

    /// Provision `name` with `opts`.
    ///
    /// An active volume keeps its connections and managed flag and only has
    /// its options replaced; the snapshot is rewritten only if the volume is
    /// managed, so unmanaged volumes never get a metadata file. Otherwise
    /// the volume becomes managed with no connections and its options are
    /// persisted.
    ///
    /// # Errors
    ///
    /// Returns [`NetshareError::InvalidVolumeName`] for malformed names or
    /// names clashing with another volume's metadata, and the fatal
    /// [`NetshareError::Persist`] if the snapshot cannot be written.
    pub fn create(&self, name: &str, opts: VolumeOptions) -> NetshareResult<MountRecord> {
        let mut mounts = self.mounts.lock();

        if let Some(record) = mounts.get_mut(name).filter(|m| m.is_active()) {
            if record.managed {
                self.store.save(&record.name, &opts)?;
            }
            record.options = opts;
            tracing::debug!(volume = %name, "Options of active mount updated");
            return Ok(record.clone());
        }

        let name = VolumeName::new(name)?;
        self.store.save(&name, &opts)?;

        let record = MountRecord {
            hostdir: self.paths.mountpoint(&name),
            name: name.clone(),
            connections: 0,
            options: opts,
            managed: true,
        };
        tracing::info!(volume = %name, hostdir = %record.hostdir.display(), "Volume created");
        mounts.insert(name, record.clone());

        Ok(record)
    }

    /// Add a connection to a known volume. Returns the new count, 0 if
    /// unknown.
    pub fn increment(&self, name: &str) -> usize {
        self.mounts.lock().get_mut(name).map_or(0, |m| {
            m.connections += 1;
            m.connections
        })
    }

    /// Drop a connection from a known volume, never below zero.
    pub fn decrement(&self, name: &str) {
        if let Some(m) = self.mounts.lock().get_mut(name) {
            m.connections = m.connections.saturating_sub(1);
        }
    }

    /// Forget `name` and remove its metadata file. Unknown volumes are a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`NetshareError::InUse`] while the volume has connections,
    /// leaving it untouched.
    pub fn delete(&self, name: &str) -> NetshareResult<()> {
        let mut mounts = self.mounts.lock();
        self.delete_locked(&mut mounts, name)
    }

    /// Delete `name` only if it is known, inactive and unmanaged.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`MountRegistry::delete`].
    pub fn delete_if_not_managed(&self, name: &str) -> NetshareResult<()> {
        let mut mounts = self.mounts.lock();

        if mounts
            .get(name)
            .is_some_and(|m| !m.is_active() && !m.managed)
        {
            tracing::info!(volume = %name, "Removing un-managed volume");
            return self.delete_locked(&mut mounts, name);
        }

        Ok(())
    }

    /// All known volumes, ordered by name.
    #[must_use]
    pub fn get_volumes(&self) -> Vec<Volume> {
        self.mounts.lock().values().map(Volume::from).collect()
    }

    /// Sweep metadata directories emptied by deletions. Returns how many
    /// were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if an empty directory cannot be removed.
    pub fn prune_metadata_dirs(&self) -> NetshareResult<usize> {
        let _mounts = self.mounts.lock();
        self.store.prune_empty_dirs()
    }

    fn delete_locked(
        &self,
        mounts: &mut BTreeMap<VolumeName, MountRecord>,
        name: &str,
    ) -> NetshareResult<()> {
        let Some(record) = mounts.get(name) else {
            return Ok(());
        };

        tracing::debug!(volume = %name, connections = record.connections, "Delete volume");

        if record.is_active() {
            tracing::warn!(volume = %name, connections = record.connections, "Volume is currently in use");
            return Err(NetshareError::InUse {
                name: name.to_string(),
            });
        }

        self.store.delete(&record.name)?;
        mounts.remove(name);
        tracing::info!(volume = %name, "Volume removed");

        Ok(())
    }
}
