//! Artifact stores for [`ModelBundle`]s.
//!
//! A store keeps a single "latest" bundle. Saving replaces it as a whole:
//! [`FileArtifactStore`] writes to a temporary file, syncs it, and renames it
//! over `bundle.json`, so a concurrent reader sees either the old bundle or
//! the new one and never a partial write. [`MemoryArtifactStore`] swaps the
//! encoded bytes under a lock.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bundle::ModelBundle;
use crate::error::{LearningError, Result};

/// File name of the bundle inside a [`FileArtifactStore`] directory.
pub const BUNDLE_FILE: &str = "bundle.json";

const TEMP_SUFFIX: &str = "tmp";

/// Where a saved bundle lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundleHandle {
    /// A bundle file, or a directory holding `bundle.json`.
    Path(PathBuf),
    /// The bundle held by a [`MemoryArtifactStore`].
    Memory,
}

impl std::fmt::Display for BundleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BundleHandle::Path(path) => write!(f, "{}", path.display()),
            BundleHandle::Memory => f.write_str("memory"),
        }
    }
}

/// Persists and loads bundles as one unit.
pub trait ArtifactStore: Send + Sync {
    /// Publish `bundle` as the latest bundle.
    fn save(&self, bundle: &ModelBundle) -> Result<BundleHandle>;

    /// Load the bundle identified by `handle`.
    ///
    /// # Errors
    ///
    /// - [`LearningError::BundleNotFound`] if nothing is stored there
    /// - [`LearningError::BundleCorrupt`] if the stored data is not a
    ///   consistent bundle
    fn load(&self, handle: &BundleHandle) -> Result<ModelBundle>;
}

/// Stores the bundle as `bundle.json` in a directory.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    dir: PathBuf,
}

impl FileArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn bundle_path(&self) -> PathBuf {
        self.dir.join(BUNDLE_FILE)
    }

    /// Handle of this store's bundle.
    pub fn handle(&self) -> BundleHandle {
        BundleHandle::Path(self.bundle_path())
    }

    /// Load this store's bundle.
    pub fn load_latest(&self) -> Result<ModelBundle> {
        self.load(&self.handle())
    }
}

impl ArtifactStore for FileArtifactStore {
    fn save(&self, bundle: &ModelBundle) -> Result<BundleHandle> {
        fs::create_dir_all(&self.dir)?;
        let bytes = bundle.to_json()?;
        let path = self.bundle_path();
        write_atomic(&path, &bytes)?;
        info!(
            "Saved bundle {:08x} to {} ({} bytes)",
            bundle.fingerprint(),
            path.display(),
            bytes.len()
        );
        Ok(BundleHandle::Path(path))
    }

    fn load(&self, handle: &BundleHandle) -> Result<ModelBundle> {
        let BundleHandle::Path(path) = handle else {
            return Err(LearningError::BundleNotFound {
                location: handle.to_string(),
            });
        };
        let path = if path.is_dir() {
            path.join(BUNDLE_FILE)
        } else {
            path.clone()
        };

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LearningError::BundleNotFound {
                    location: path.display().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let bundle = ModelBundle::from_json(&bytes)?;
        debug!("Loaded bundle {:08x} from {}", bundle.fingerprint(), path.display());
        Ok(bundle)
    }
}

/// Write to `<path>.tmp`, sync, then rename over `path` and sync the
/// directory so the rename itself is durable.
///
/// The temporary file is removed whenever a step fails; the previous bundle
/// is left untouched.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let temp_path = path.with_extension(match path.extension() {
        Some(ext) => format!("{}.{}", ext.to_string_lossy(), TEMP_SUFFIX),
        None => TEMP_SUFFIX.to_string(),
    });

    let mut file = File::create(&temp_path)?;
    let published = file
        .write_all(data)
        .and_then(|()| file.sync_all())
        .and_then(|()| {
            drop(file);
            fs::rename(&temp_path, path)
        });
    if let Err(e) = published {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    sync_parent(path)?;
    Ok(())
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()?;
    Ok(())
}

// Directories cannot be opened for syncing here; the rename is as durable as
// the platform makes it.
#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> Result<()> {
    Ok(())
}

/// Keeps the encoded bundle in memory.
///
/// Uses the same encoding as the file store, so loading exercises the same
/// decoding and consistency checks.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    bytes: RwLock<Option<Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-filled with already-encoded bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RwLock::new(Some(bytes)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.read().is_none()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn save(&self, bundle: &ModelBundle) -> Result<BundleHandle> {
        let bytes = bundle.to_json()?;
        *self.bytes.write() = Some(bytes);
        Ok(BundleHandle::Memory)
    }

    fn load(&self, handle: &BundleHandle) -> Result<ModelBundle> {
        if *handle != BundleHandle::Memory {
            return Err(LearningError::BundleNotFound {
                location: handle.to_string(),
            });
        }
        let guard = self.bytes.read();
        let Some(bytes) = guard.as_deref() else {
            return Err(LearningError::BundleNotFound {
                location: handle.to_string(),
            });
        };
        ModelBundle::from_json(bytes)
    }
}

static_assertions::assert_impl_all!(FileArtifactStore: Send, Sync);
static_assertions::assert_impl_all!(MemoryArtifactStore: Send, Sync);
