use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::MeshError;

struct FileEntry {
    chunks: BTreeMap<u32, Vec<u8>>,
    total_chunks: u32,
    filename: String,
    inserted_at: Instant,
}

/// Progress view of an in-flight file transfer, returned to callers that
/// want to report status without reaching into cache internals.
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub filename: String,
    pub received_chunks: u32,
    pub total_chunks: u32,
    pub missing_chunks: Vec<u32>,
}

struct Inner {
    order: VecDeque<String>,
    entries: HashMap<String, FileEntry>,
}

/// LRU-bounded cache of in-progress chunked file transfers, keyed by file id.
/// Grounded on `offline_mesh_app/routing/cache.py::FileCache`; chunk storage
/// uses a `BTreeMap` (rather than Python's plain `dict`) so completeness and
/// missing-chunk checks iterate in index order without sorting.
pub struct FileCache {
    inner: Mutex<Inner>,
    max_size: usize,
    download_dir: PathBuf,
}

impl FileCache {
    pub fn new(max_size: usize, download_dir: PathBuf) -> Self {
        FileCache {
            inner: Mutex::new(Inner {
                order: VecDeque::new(),
                entries: HashMap::new(),
            }),
            max_size,
            download_dir,
        }
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir.clone()
    }

    fn touch(inner: &mut Inner, id: &str) {
        if let Some(pos) = inner.order.iter().position(|x| x == id) {
            inner.order.remove(pos);
            inner.order.push_back(id.to_string());
        }
    }

    /// Adds a chunk, returning `true` once the file is fully reassembled.
    /// A chunk index repeated for an already-held file is silently ignored,
    /// matching the original's duplicate-chunk handling.
    pub fn add_file_chunk(
        &self,
        file_id: &str,
        chunk_index: u32,
        chunk_data: Vec<u8>,
        total_chunks: u32,
        filename: &str,
    ) -> Result<bool, MeshError> {
        if chunk_index >= total_chunks {
            return Err(MeshError::InvalidChunkIndex {
                index: chunk_index,
                total: total_chunks,
            });
        }

        let mut inner = self.inner.lock().expect("file cache lock poisoned");

        if !inner.entries.contains_key(file_id) {
            inner.entries.insert(
                file_id.to_string(),
                FileEntry {
                    chunks: BTreeMap::new(),
                    total_chunks,
                    filename: filename.to_string(),
                    inserted_at: Instant::now(),
                },
            );
            inner.order.push_back(file_id.to_string());

            if inner.order.len() > self.max_size {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.entries.remove(&oldest);
                }
            }
        }

        Self::touch(&mut inner, file_id);
        let entry = inner.entries.get_mut(file_id).expect("just inserted");
        entry.inserted_at = Instant::now();

        if entry.chunks.contains_key(&chunk_index) {
            log::debug!("duplicate chunk {chunk_index} for file {file_id}");
            return Ok(Self::is_complete_locked(entry));
        }

        entry.chunks.insert(chunk_index, chunk_data);

        let received = entry.chunks.len();
        if received % 5 == 0 || received as u32 == entry.total_chunks {
            log::info!("file {file_id}: received {received}/{} chunks", entry.total_chunks);
        }

        Ok(Self::is_complete_locked(entry))
    }

    fn is_complete_locked(entry: &FileEntry) -> bool {
        entry.chunks.len() as u32 == entry.total_chunks
            && (0..entry.total_chunks).all(|i| entry.chunks.contains_key(&i))
    }

    pub fn is_file_complete(&self, file_id: &str) -> bool {
        let inner = self.inner.lock().expect("file cache lock poisoned");
        inner.entries.get(file_id).map(Self::is_complete_locked).unwrap_or(false)
    }

    pub fn get_missing_chunks(&self, file_id: &str) -> Vec<u32> {
        let inner = self.inner.lock().expect("file cache lock poisoned");
        match inner.entries.get(file_id) {
            Some(entry) => (0..entry.total_chunks).filter(|i| !entry.chunks.contains_key(i)).collect(),
            None => Vec::new(),
        }
    }

    /// Writes the reassembled file to the download directory via a
    /// temp-file-then-rename, and drops the entry from the cache on success.
    pub fn save_complete_file(&self, file_id: &str) -> Result<PathBuf, MeshError> {
        let mut inner = self.inner.lock().expect("file cache lock poisoned");
        let entry = inner
            .entries
            .get(file_id)
            .ok_or(MeshError::CacheMiss)?;

        if !Self::is_complete_locked(entry) {
            let missing = Self::missing_locked(entry);
            return Err(MeshError::Fs(format!(
                "cannot save incomplete file, missing chunks: {:?}",
                &missing[..missing.len().min(5)]
            )));
        }

        std::fs::create_dir_all(&self.download_dir)?;

        let stamped = stamped_filename(&entry.filename);
        let final_path = self.download_dir.join(&stamped);

        let tmp_path = self.download_dir.join(format!(".{stamped}.part"));
        {
            let mut buf = Vec::new();
            for i in 0..entry.total_chunks {
                let chunk = entry.chunks.get(&i).expect("completeness verified above");
                buf.extend_from_slice(chunk);
            }
            std::fs::write(&tmp_path, &buf)?;
        }
        std::fs::rename(&tmp_path, &final_path)?;

        inner.entries.remove(file_id);
        if let Some(pos) = inner.order.iter().position(|x| x == file_id) {
            inner.order.remove(pos);
        }

        Ok(final_path)
    }

    fn missing_locked(entry: &FileEntry) -> Vec<u32> {
        (0..entry.total_chunks).filter(|i| !entry.chunks.contains_key(i)).collect()
    }

    pub fn get_pending_files(&self) -> HashMap<String, PendingFile> {
        let inner = self.inner.lock().expect("file cache lock poisoned");
        inner
            .entries
            .iter()
            .map(|(id, entry)| {
                let mut missing = Self::missing_locked(entry);
                missing.truncate(10);
                (
                    id.clone(),
                    PendingFile {
                        filename: entry.filename.clone(),
                        received_chunks: entry.chunks.len() as u32,
                        total_chunks: entry.total_chunks,
                        missing_chunks: missing,
                    },
                )
            })
            .collect()
    }

    pub fn remove_old_files(&self, max_age: Duration) -> usize {
        let mut inner = self.inner.lock().expect("file cache lock poisoned");
        let now = Instant::now();
        let stale: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| now.duration_since(e.inserted_at) > max_age)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            inner.entries.remove(id);
            if let Some(pos) = inner.order.iter().position(|x| x == id) {
                inner.order.remove(pos);
            }
        }
        stale.len()
    }
}

fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Splits off the extension and splices in a unix timestamp, e.g.
/// `report.pdf` -> `report_1699999999.pdf`. Shared by chunked reassembly
/// and direct-stream saves so both name collisions the same way.
/// Grounded on `handler.py`'s `new_filename = f"{name}_{int(time.time())}{ext}"`.
pub fn stamped_filename(filename: &str) -> String {
    let safe_name = Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    let (stem, ext) = match safe_name.rsplit_once('.') {
        Some((s, e)) => (s.to_string(), format!(".{e}")),
        None => (safe_name.clone(), String::new()),
    };
    format!("{stem}_{}{ext}", unix_timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_only_once_all_indices_present() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = FileCache::new(5, tmp.path().to_path_buf());

        assert!(!cache.add_file_chunk("f1", 0, b"aa".to_vec(), 2, "x.bin").unwrap());
        assert!(cache.add_file_chunk("f1", 1, b"bb".to_vec(), 2, "x.bin").unwrap());
        assert!(cache.is_file_complete("f1"));
    }

    #[test]
    fn duplicate_chunk_is_ignored_not_erroring() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = FileCache::new(5, tmp.path().to_path_buf());
        cache.add_file_chunk("f1", 0, b"aa".to_vec(), 2, "x.bin").unwrap();
        let complete = cache.add_file_chunk("f1", 0, b"aa".to_vec(), 2, "x.bin").unwrap();
        assert!(!complete);
    }

    #[test]
    fn rejects_out_of_range_index() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = FileCache::new(5, tmp.path().to_path_buf());
        let err = cache.add_file_chunk("f1", 5, b"aa".to_vec(), 2, "x.bin").unwrap_err();
        assert!(matches!(err, MeshError::InvalidChunkIndex { .. }));
    }

    #[test]
    fn saves_reassembled_bytes_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = FileCache::new(5, tmp.path().to_path_buf());
        cache.add_file_chunk("f1", 1, b"world".to_vec(), 2, "greeting.txt").unwrap();
        cache.add_file_chunk("f1", 0, b"hello".to_vec(), 2, "greeting.txt").unwrap();

        let path = cache.save_complete_file("f1").unwrap();
        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents, b"helloworld");
        assert!(!cache.is_file_complete("f1"));
    }

    #[test]
    fn evicts_oldest_file_past_capacity() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = FileCache::new(1, tmp.path().to_path_buf());
        cache.add_file_chunk("f1", 0, b"a".to_vec(), 3, "a.bin").unwrap();
        cache.add_file_chunk("f2", 0, b"a".to_vec(), 3, "b.bin").unwrap();

        assert!(cache.get_pending_files().get("f1").is_none());
        assert!(cache.get_pending_files().get("f2").is_some());
    }
}
