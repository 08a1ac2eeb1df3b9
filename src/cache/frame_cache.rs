use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use crate::compile::ContentHash;
use crate::foundation::error::{KinemaError, KinemaResult};
use crate::foundation::time::Time;

const EXTENSION: &str = "frame";
const AUDIO_DIR: &str = "audio";
const AUDIO_EXTENSION: &str = "pcm";

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Content-addressed frame store on disk plus the time-to-hash table for one backend.
///
/// Files live at `<root>/<cache id>/<hash hex>.frame`; identical content is written once and
/// shared by every time that maps to it. Audio blocks are keyed by block index instead and live
/// at `<root>/<cache id>/audio/<index>.pcm`. All methods take `&self` so workers can share the cache
/// behind an `Arc`.
#[derive(Debug)]
pub struct FrameCache {
    root: PathBuf,
    cache_id: RwLock<Option<String>>,
    table: Mutex<BTreeMap<Time, ContentHash>>,
    claims: Mutex<HashSet<(String, ContentHash)>>,
    audio: Mutex<BTreeSet<i64>>,
}

impl FrameCache {
    /// Cache rooted at `root` (created lazily on first write).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache_id: RwLock::new(None),
            table: Mutex::new(BTreeMap::new()),
            claims: Mutex::new(HashSet::new()),
            audio: Mutex::new(BTreeSet::new()),
        }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Current namespace.
    pub fn cache_id(&self) -> Option<String> {
        self.cache_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Switch namespace; lookups resolve against the new directory from now on.
    pub fn set_cache_id(&self, id: Option<String>) {
        *self
            .cache_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = id;
    }

    /// Hash recorded for `t`.
    pub fn time_to_hash(&self, t: Time) -> Option<ContentHash> {
        lock(&self.table).get(&t).copied()
    }

    /// Record that the frame at `t` has content `hash`.
    pub fn set_hash(&self, t: Time, hash: ContentHash) {
        lock(&self.table).insert(t, hash);
    }

    /// Forget mappings after `max` and audio blocks starting at or after it; files stay on disk
    /// for other times or namespaces.
    pub fn truncate(&self, max: Time) {
        lock(&self.table).retain(|t, _| *t <= max);
        lock(&self.audio).retain(|block| Time::from_secs(*block) < max);
    }

    /// Forget every mapping and audio block.
    pub fn clear(&self) {
        lock(&self.table).clear();
        lock(&self.audio).clear();
    }

    /// Mapped times in ascending order.
    pub fn mapped_times(&self) -> Vec<Time> {
        lock(&self.table).keys().copied().collect()
    }

    /// File path for `hash` in the current namespace.
    pub fn cache_path_name(&self, hash: ContentHash) -> Option<PathBuf> {
        self.cache_id().map(|id| self.cache_path_in(&id, hash))
    }

    /// File path for `hash` in namespace `id`.
    pub fn cache_path_in(&self, id: &str, hash: ContentHash) -> PathBuf {
        self.root
            .join(id)
            .join(format!("{}.{EXTENSION}", hash.to_hex()))
    }

    /// Return `true` when `t` is mapped and its file exists in the current namespace.
    pub fn has_frame(&self, t: Time) -> bool {
        self.time_to_hash(t)
            .and_then(|h| self.cache_path_name(h))
            .is_some_and(|p| p.is_file())
    }

    /// Return `true` when content `hash` already exists in namespace `id`.
    pub fn has_hash(&self, id: &str, hash: ContentHash) -> bool {
        self.cache_path_in(id, hash).is_file()
    }

    /// Atomically store one encoded frame; readers never observe a partial file.
    pub fn write_frame(&self, id: &str, hash: ContentHash, pixels: &[u8]) -> KinemaResult<PathBuf> {
        let path = self.cache_path_in(id, hash);
        persist(&path, pixels)?;
        Ok(path)
    }

    /// Load the frame mapped at `t` into `buf`.
    ///
    /// `Ok(false)` is a plain miss (unmapped, no namespace, or no file). A file whose size differs
    /// from `buf` was written for other render params and is an error.
    pub fn read_frame(&self, t: Time, buf: &mut [u8]) -> KinemaResult<bool> {
        let Some(path) = self.time_to_hash(t).and_then(|h| self.cache_path_name(h)) else {
            return Ok(false);
        };
        let mut file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(KinemaError::io(e, &path)),
        };

        let len = file
            .metadata()
            .map_err(|e| KinemaError::io(e, &path))?
            .len();
        if len != buf.len() as u64 {
            return Err(KinemaError::invalid_state(format!(
                "cached frame '{}' has {len} bytes, expected {}",
                path.display(),
                buf.len()
            )));
        }
        file.read_exact(buf).map_err(|e| KinemaError::io(e, &path))?;
        Ok(true)
    }

    /// Claim `hash` in namespace `id` for rendering; `false` when another worker holds it.
    pub fn try_claim(&self, id: &str, hash: ContentHash) -> bool {
        lock(&self.claims).insert((id.to_owned(), hash))
    }

    /// Release a claim taken with [`FrameCache::try_claim`].
    pub fn release(&self, id: &str, hash: ContentHash) {
        lock(&self.claims).remove(&(id.to_owned(), hash));
    }

    /// File path of audio block `index` in namespace `id`.
    pub fn audio_path_in(&self, id: &str, index: i64) -> PathBuf {
        self.root
            .join(id)
            .join(AUDIO_DIR)
            .join(format!("{index}.{AUDIO_EXTENSION}"))
    }

    /// Atomically store one encoded audio block.
    pub fn write_audio(&self, id: &str, index: i64, samples: &[u8]) -> KinemaResult<PathBuf> {
        let path = self.audio_path_in(id, index);
        persist(&path, samples)?;
        Ok(path)
    }

    /// Record that audio block `index` is current in this namespace.
    pub fn set_audio_ready(&self, index: i64) {
        lock(&self.audio).insert(index);
    }

    /// Mark audio block `index` as needing a re-render.
    pub fn forget_audio(&self, index: i64) {
        lock(&self.audio).remove(&index);
    }

    /// Audio blocks currently marked ready, ascending.
    pub fn ready_audio_blocks(&self) -> Vec<i64> {
        lock(&self.audio).iter().copied().collect()
    }

    /// Load audio block `index` as interleaved samples.
    ///
    /// `Ok(None)` when the block is not ready, there is no namespace, or the file is missing.
    pub fn read_audio(&self, index: i64) -> KinemaResult<Option<Vec<f32>>> {
        if !lock(&self.audio).contains(&index) {
            return Ok(None);
        }
        let Some(id) = self.cache_id() else {
            return Ok(None);
        };
        let path = self.audio_path_in(&id, index);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(KinemaError::io(e, &path)),
        };
        if bytes.len() % 4 != 0 {
            return Err(KinemaError::invalid_state(format!(
                "cached audio '{}' has {} bytes, not whole samples",
                path.display(),
                bytes.len()
            )));
        }
        Ok(Some(
            bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        ))
    }
}

// Temp file in the target directory, then rename over `path`.
fn persist(path: &Path, bytes: &[u8]) -> KinemaResult<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(|e| KinemaError::io(e, dir))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| KinemaError::io(e, dir))?;
    let written = tmp.write_all(bytes).and_then(|()| tmp.flush());
    written.map_err(|e| KinemaError::io(e, tmp.path()))?;
    tmp.persist(path)
        .map_err(|e| KinemaError::io(e.error, path))?;
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/cache/frame_cache.rs"]
mod tests;
