//! Metadata store.
//!
//! Persists the options of every managed volume as one JSON file below the
//! metadata directory, so the registry can be rebuilt after a restart. A
//! volume named `tenantA/share1` lives at `<meta>/tenantA/share1`.

use std::collections::HashMap;
use std::fs::{self, DirBuilder};
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

use netshare_common::name::RESERVED_PREFIX;
use netshare_common::{NetshareError, NetshareResult, VolumeName, VolumeOptions};
use walkdir::WalkDir;

/// Permission bits for metadata directories.
const DIR_MODE: u32 = 0o755;

/// Permission bits for metadata files.
const FILE_MODE: u32 = 0o760;

/// File-backed store of volume options.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    /// Metadata root directory.
    root: PathBuf,
}

impl MetadataStore {
    /// Create a store rooted at `root`. Nothing is touched on disk.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Get the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the path to a volume's metadata file.
    #[must_use]
    pub fn path_for(&self, name: &VolumeName) -> PathBuf {
        self.root.join(name.to_relative_path())
    }

    /// Load every readable metadata file.
    ///
    /// Creates the root directory when it does not exist yet. Files that
    /// cannot be read or decoded are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the missing root directory cannot be created.
    pub fn load(&self) -> NetshareResult<HashMap<VolumeName, VolumeOptions>> {
        let mut mounts = HashMap::new();

        if !self.root.exists() {
            tracing::debug!(path = %self.root.display(), "Metadata directory not found, creating");
            create_dir(&self.root)?;
            return Ok(mounts);
        }

        tracing::debug!(path = %self.root.display(), "Reading metadata");

        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::debug!(error = %err, "Skipping unreadable metadata entry");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();

            if entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(RESERVED_PREFIX))
            {
                tracing::debug!(path = %path.display(), "Skipping leftover temporary file");
                continue;
            }

            let Some(name) = self.name_for(path) else {
                tracing::debug!(path = %path.display(), "Skipping metadata file with invalid name");
                continue;
            };

            tracing::debug!(path = %path.display(), "Reading metadata file");
            let content = match fs::read(path) {
                Ok(content) => content,
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "Failed to read metadata file");
                    continue;
                }
            };

            match serde_json::from_slice::<VolumeOptions>(&content) {
                Ok(opts) => {
                    tracing::debug!(volume = %name, options = ?opts, "Mount found");
                    mounts.insert(name, opts);
                }
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "Failed to decode metadata file");
                }
            }
        }

        Ok(mounts)
    }

    /// Persist the options of a volume, replacing any previous snapshot.
    ///
    /// The file is written next to its destination and renamed into place,
    /// so a reader never observes a partial snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`NetshareError::InvalidVolumeName`] if the name clashes with
    /// an existing snapshot or namespace, and [`NetshareError::Persist`] if
    /// the directory or file cannot be written. Callers must treat the
    /// latter as fatal.
    pub fn save(&self, name: &VolumeName, opts: &VolumeOptions) -> NetshareResult<()> {
        self.check_conflicts(name)?;

        let path = self.path_for(name);
        let dir = path.parent().unwrap_or(&self.root);

        tracing::debug!(path = %dir.display(), "Metadata directory");
        create_dir(dir).map_err(|source| NetshareError::Persist {
            path: dir.to_path_buf(),
            source,
        })?;

        let data = serde_json::to_vec(opts)?;

        tracing::debug!(path = %path.display(), "Metadata file path");
        write_atomic(dir, &path, &data).map_err(|source| NetshareError::Persist {
            path: path.clone(),
            source,
        })?;

        Ok(())
    }

    /// Remove the metadata file of a volume.
    ///
    /// A missing file is not an error. Emptied parent directories are left
    /// in place; see [`MetadataStore::prune_empty_dirs`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn delete(&self, name: &VolumeName) -> NetshareResult<()> {
        let path = self.path_for(name);
        tracing::debug!(path = %path.display(), "Removing metadata");

        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => {
                // Namespace directory of nested volumes, not a snapshot.
                Ok(())
            }
            Ok(_) => match fs::remove_file(&path) {
                Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
                _ => Ok(()),
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Remove empty sub-directories below the root, deepest first.
    ///
    /// The root itself is never removed.
    ///
    /// # Errors
    ///
    /// Returns an error if an empty directory cannot be removed.
    pub fn prune_empty_dirs(&self) -> NetshareResult<usize> {
        let mut removed = 0;

        if !self.root.exists() {
            return Ok(removed);
        }

        for entry in WalkDir::new(&self.root).min_depth(1).contents_first(true) {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();
            if fs::read_dir(path)?.next().is_none() {
                fs::remove_dir(path)?;
                tracing::debug!(path = %path.display(), "Removed empty metadata directory");
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Reject names whose snapshot would sit on top of a namespace directory,
    /// or below another volume's snapshot.
    fn check_conflicts(&self, name: &VolumeName) -> NetshareResult<()> {
        let conflict = |reason| {
            Err(NetshareError::InvalidVolumeName {
                name: name.to_string(),
                reason,
            })
        };

        let mut path = self.root.clone();
        let mut segments = name.segments().peekable();

        while let Some(segment) = segments.next() {
            path.push(segment);
            let Ok(meta) = fs::symlink_metadata(&path) else {
                // Nothing deeper can exist either.
                return Ok(());
            };

            if segments.peek().is_some() {
                if !meta.is_dir() {
                    return conflict("conflicts with an existing volume");
                }
            } else if meta.is_dir() {
                return conflict("conflicts with an existing namespace");
            }
        }

        Ok(())
    }

    /// Derive the volume name of a metadata file from its relative path.
    fn name_for(&self, path: &Path) -> Option<VolumeName> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        VolumeName::new(segments.join("/")).ok()
    }
}

/// Create `path` and any missing parents with exactly [`DIR_MODE`], whatever
/// the process umask.
fn create_dir(path: &Path) -> io::Result<()> {
    let missing: Vec<&Path> = path
        .ancestors()
        .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
        .collect();

    for dir in missing.into_iter().rev() {
        match DirBuilder::new().mode(DIR_MODE).create(dir) {
            Err(err) if err.kind() != io::ErrorKind::AlreadyExists => return Err(err),
            _ => {}
        }
        fs::set_permissions(dir, fs::Permissions::from_mode(DIR_MODE))?;
    }

    if path.is_dir() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists and is not a directory", path.display()),
        ))
    }
}

fn write_atomic(dir: &Path, path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = tempfile::Builder::new()
        .prefix(RESERVED_PREFIX)
        .tempfile_in(dir)?;

    file.write_all(data)?;
    file.as_file()
        .set_permissions(fs::Permissions::from_mode(FILE_MODE))?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn name(s: &str) -> VolumeName {
        VolumeName::new(s).unwrap()
    }

    fn opts(pairs: &[(&str, &str)]) -> VolumeOptions {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn load_creates_missing_root() {
        let temp = tempdir().unwrap();
        let store = MetadataStore::new(temp.path().join(".meta"));

        let mounts = store.load().unwrap();
        assert!(mounts.is_empty());
        assert!(store.root().is_dir());
        let mode = fs::metadata(store.root()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, DIR_MODE);
    }

    #[test]
    fn save_creates_namespace_dirs_with_dir_mode() {
        let temp = tempdir().unwrap();
        let store = MetadataStore::new(temp.path().join(".meta"));

        store.save(&name("a/b/v1"), &opts(&[])).unwrap();

        for dir in [".meta", ".meta/a", ".meta/a/b"] {
            let mode = fs::metadata(temp.path().join(dir))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, DIR_MODE, "{dir}");
        }
    }

    #[test]
    fn namespace_clash_is_not_fatal() {
        let temp = tempdir().unwrap();
        let store = MetadataStore::new(temp.path());

        store.save(&name("ns/v1"), &opts(&[])).unwrap();
        let err = store.save(&name("ns"), &opts(&[])).unwrap_err();
        assert!(matches!(err, NetshareError::InvalidVolumeName { .. }));
        assert!(!err.is_fatal());

        store.save(&name("v2"), &opts(&[])).unwrap();
        let err = store.save(&name("v2/inner"), &opts(&[])).unwrap_err();
        assert!(matches!(err, NetshareError::InvalidVolumeName { .. }));
        assert!(!err.is_fatal());

        let mounts = store.load().unwrap();
        assert_eq!(mounts.len(), 2);
        assert!(temp.path().join("ns/v1").is_file());
        assert!(temp.path().join("v2").is_file());
    }

    #[test]
    fn save_and_load() {
        let temp = tempdir().unwrap();
        let store = MetadataStore::new(temp.path());

        let options = opts(&[("share", "a/b"), ("create", "true")]);
        store.save(&name("v1"), &options).unwrap();

        let content = fs::read(temp.path().join("v1")).unwrap();
        let on_disk: VolumeOptions = serde_json::from_slice(&content).unwrap();
        assert_eq!(on_disk, options);

        let mode = fs::metadata(temp.path().join("v1"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, FILE_MODE);

        let mounts = store.load().unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[&name("v1")], options);
    }

    #[test]
    fn nested_names_keep_their_namespace() {
        let temp = tempdir().unwrap();
        let store = MetadataStore::new(temp.path());

        store
            .save(&name("tenantA/v6"), &opts(&[("share", "x")]))
            .unwrap();
        store.save(&name("v6"), &opts(&[("share", "y")])).unwrap();
        assert!(temp.path().join("tenantA/v6").is_file());

        let mounts = store.load().unwrap();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[&name("tenantA/v6")]["share"], "x");
        assert_eq!(mounts[&name("v6")]["share"], "y");
    }

    #[test]
    fn save_overwrites() {
        let temp = tempdir().unwrap();
        let store = MetadataStore::new(temp.path());

        store.save(&name("v1"), &opts(&[("share", "a")])).unwrap();
        store.save(&name("v1"), &opts(&[("share", "b")])).unwrap();

        let mounts = store.load().unwrap();
        assert_eq!(mounts[&name("v1")]["share"], "b");
    }

    #[test]
    fn load_skips_corrupt_and_temporary_files() {
        let temp = tempdir().unwrap();
        let store = MetadataStore::new(temp.path());

        store.save(&name("good"), &opts(&[("share", "a")])).unwrap();
        fs::write(temp.path().join("bad"), "not-json").unwrap();
        fs::write(temp.path().join("list"), "[\"a\"]").unwrap();
        fs::write(temp.path().join(".netshare-tmp-abc"), "{}").unwrap();

        let mounts = store.load().unwrap();
        assert_eq!(mounts.len(), 1);
        assert!(mounts.contains_key("good"));
    }

    #[test]
    fn delete_missing_is_ok() {
        let temp = tempdir().unwrap();
        let store = MetadataStore::new(temp.path());

        assert!(store.delete(&name("nope")).is_ok());
        assert!(store.delete(&name("ns/nope")).is_ok());
    }

    #[test]
    fn delete_leaves_namespace_dirs() {
        let temp = tempdir().unwrap();
        let store = MetadataStore::new(temp.path());

        store.save(&name("tenantA/v6"), &opts(&[])).unwrap();
        store.delete(&name("tenantA/v6")).unwrap();
        assert!(!temp.path().join("tenantA/v6").exists());
        assert!(temp.path().join("tenantA").is_dir());

        // A namespace directory is not a snapshot.
        store.save(&name("tenantB/v7"), &opts(&[])).unwrap();
        store.delete(&name("tenantB")).unwrap();
        assert!(temp.path().join("tenantB/v7").is_file());
    }

    #[test]
    fn prune_empty_dirs() {
        let temp = tempdir().unwrap();
        let store = MetadataStore::new(temp.path());

        store.save(&name("a/b/v1"), &opts(&[])).unwrap();
        store.save(&name("c/v2"), &opts(&[])).unwrap();
        store.delete(&name("a/b/v1")).unwrap();

        assert_eq!(store.prune_empty_dirs().unwrap(), 2);
        assert!(!temp.path().join("a").exists());
        assert!(temp.path().join("c/v2").is_file());
        assert!(temp.path().is_dir());
    }

    #[test]
    fn save_into_unwritable_root_is_fatal() {
        let temp = tempdir().unwrap();
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "").unwrap();

        // The root is a regular file, so no directory can be created below it.
        let store = MetadataStore::new(&blocker);
        let err = store.save(&name("v1"), &opts(&[])).unwrap_err();
        assert!(err.is_fatal());
    }
}
