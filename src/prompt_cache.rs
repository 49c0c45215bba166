//! File-backed prompt cache: one computation-state blob per mode.
//!
//! Each [`Slot`] maps to a single file under the cache directory. Writes go to
//! a sibling temp file which is then renamed over the slot, so a reader sees
//! either the old blob or the new one.

use crate::error::CacheError;
use crate::generator::{ComputationState, StateCodec};
use crate::prompt::Mode;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// The single cache location for one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot(Mode);

impl Slot {
    pub fn for_mode(mode: Mode) -> Self {
        Self(mode)
    }

    pub fn mode(&self) -> Mode {
        self.0
    }

    pub fn file_name(&self) -> String {
        format!("prompt_cache_{}.bin", self.0)
    }

    pub fn all() -> impl Iterator<Item = Slot> {
        Mode::ALL.into_iter().map(Slot)
    }
}

pub struct PromptCache {
    dir: PathBuf,
}

impl PromptCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn slot_path(&self, slot: Slot) -> PathBuf {
        self.dir.join(slot.file_name())
    }

    fn temp_path(&self, slot: Slot) -> PathBuf {
        self.dir.join(format!("{}.tmp", slot.file_name()))
    }

    pub fn exists(&self, slot: Slot) -> bool {
        self.slot_path(slot).is_file()
    }

    /// Reads the slot and lets `codec` decide whether the bytes are usable.
    pub fn load<C>(&self, slot: Slot, codec: &C) -> Result<ComputationState, CacheError>
    where
        C: StateCodec + ?Sized,
    {
        let path = self.slot_path(slot);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(CacheError::NotFound(path)),
            Err(e) => {
                return Err(CacheError::CorruptState {
                    path,
                    reason: format!("cannot read: {}", e),
                });
            }
        };

        let size = bytes.len();
        let state = codec
            .decode(bytes)
            .map_err(|reason| CacheError::CorruptState { path: path.clone(), reason })?;

        debug!("Loaded {} byte prompt cache from {:?}", size, path);
        Ok(state)
    }

    /// Replaces the slot content with `state`.
    pub fn save(&self, slot: Slot, state: &ComputationState) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;

        let path = self.slot_path(slot);
        let temp_path = self.temp_path(slot);

        let written = (|| {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;
            file.write_all(state.as_bytes())?;
            file.sync_all()
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(CacheError::io(&temp_path, e));
        }

        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(CacheError::io(&path, e));
        }

        debug!("Saved {} byte prompt cache to {:?}", state.len(), path);
        Ok(())
    }

    /// Removes the slot file. Succeeds when it is already gone.
    pub fn discard(&self, slot: Slot) -> Result<(), CacheError> {
        let path = self.slot_path(slot);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Discarded prompt cache {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    pub fn clear_all(&self) -> Result<(), CacheError> {
        for slot in Slot::all() {
            self.discard(slot)?;
        }
        Ok(())
    }
}
