//! Snapshot persistence for fast cold starts.
//!
//! A snapshot is tied to the feed file it was built from (size, mtime and a
//! hash of its head). Any mismatch, checksum failure or internal
//! inconsistency means "rebuild from the feed".

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{Result, SearchError};
use crate::index::format::{SnapshotHeader, HASH_PREFIX_LEN, HEADER_SIZE, MAGIC, VERSION};
use crate::index::MailIndex;

/// Identity of the feed a snapshot was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFingerprint {
    pub size: u64,
    pub modified_time: i64,
    pub sha256_first_4kb: [u8; 32],
}

impl SourceFingerprint {
    /// Fingerprint a feed file on disk.
    pub fn of(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path).map_err(|e| SearchError::io(path, e))?;
        let modified_time = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Ok(Self {
            size: meta.len(),
            modified_time,
            sha256_first_4kb: sha256_first_n(path, HASH_PREFIX_LEN)?,
        })
    }

    fn matches(&self, header: &SnapshotHeader) -> bool {
        header.source_size == self.size
            && header.source_modified_time == self.modified_time
            && header.source_sha256_first_4kb == self.sha256_first_4kb
    }
}

/// Serialize `index` to `path`.
pub fn write_snapshot(path: &Path, index: &MailIndex, source: &SourceFingerprint) -> Result<()> {
    let payload = bincode::serialize(index)?;

    let header = SnapshotHeader {
        magic: *MAGIC,
        version: VERSION,
        flags: 0,
        message_count: index.messages.len() as u64,
        contact_count: index.contacts.len() as u64,
        source_size: source.size,
        source_modified_time: source.modified_time,
        source_sha256_first_4kb: source.sha256_first_4kb,
        payload_sha256: Sha256::digest(&payload).into(),
    };
    let header_bytes = bincode::serialize(&header)?;

    let mut padded_header = vec![0u8; HEADER_SIZE];
    let copy_len = header_bytes.len().min(HEADER_SIZE);
    padded_header[..copy_len].copy_from_slice(&header_bytes[..copy_len]);

    let mut file = File::create(path).map_err(|e| SearchError::io(path, e))?;
    file.write_all(&padded_header)
        .map_err(|e| SearchError::io(path, e))?;
    file.write_all(&payload).map_err(|e| SearchError::io(path, e))?;
    file.flush().map_err(|e| SearchError::io(path, e))?;
    Ok(())
}

/// Load a snapshot.
///
/// Returns `Ok(None)` when the file is missing, from another format version,
/// or built from a different feed (`source` given). Returns
/// `InvalidSnapshot` when the payload is corrupt or inconsistent.
pub fn read_snapshot(path: &Path, source: Option<&SourceFingerprint>) -> Result<Option<MailIndex>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read(path).map_err(|e| SearchError::io(path, e))?;
    let invalid = |reason: String| SearchError::InvalidSnapshot {
        path: path.to_path_buf(),
        reason,
    };

    if data.len() < HEADER_SIZE {
        debug!(path = %path.display(), "Snapshot file too small");
        return Ok(None);
    }

    let header: SnapshotHeader = bincode::deserialize(&data[..HEADER_SIZE])
        .map_err(|e| invalid(format!("Header deserialization failed: {e}")))?;

    if let Err(reason) = header.validate() {
        debug!(reason = %reason, "Snapshot header invalid");
        return Ok(None);
    }

    if let Some(source) = source {
        if !source.matches(&header) {
            debug!(path = %path.display(), "Feed changed since snapshot was written");
            return Ok(None);
        }
    }

    let payload = &data[HEADER_SIZE..];
    let digest: [u8; 32] = Sha256::digest(payload).into();
    if digest != header.payload_sha256 {
        return Err(invalid("Payload checksum mismatch".into()));
    }

    let index: MailIndex = bincode::deserialize(payload)
        .map_err(|e| invalid(format!("Payload deserialization failed: {e}")))?;

    if index.messages.len() as u64 != header.message_count
        || index.contacts.len() as u64 != header.contact_count
    {
        return Err(invalid("Message or contact count mismatch".into()));
    }
    index.verify().map_err(|e| invalid(e.to_string()))?;

    Ok(Some(index))
}

/// Write the snapshot for `feed_path`, next to the feed if possible,
/// otherwise in `cache_dir`. Returns the path written.
pub fn save_for_feed(feed_path: &Path, index: &MailIndex, cache_dir: &Path) -> Result<PathBuf> {
    let source = SourceFingerprint::of(feed_path)?;

    let primary = snapshot_path_for(feed_path);
    match write_snapshot(&primary, index, &source) {
        Ok(()) => {
            info!(path = %primary.display(), "Snapshot written");
            return Ok(primary);
        }
        Err(e) => {
            debug!(error = %e, "Cannot write snapshot next to feed, trying cache dir");
        }
    }

    let fallback = cache_snapshot_path_for(feed_path, cache_dir);
    if let Some(parent) = fallback.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SearchError::io(parent, e))?;
    }
    write_snapshot(&fallback, index, &source)?;
    info!(path = %fallback.display(), "Snapshot written to cache");
    Ok(fallback)
}

/// Load the snapshot for `feed_path` if one exists and is still valid.
///
/// Corrupt snapshots are logged and treated as absent.
pub fn load_for_feed(feed_path: &Path, cache_dir: &Path) -> Result<Option<MailIndex>> {
    let source = SourceFingerprint::of(feed_path)?;

    for candidate in [
        snapshot_path_for(feed_path),
        cache_snapshot_path_for(feed_path, cache_dir),
    ] {
        match read_snapshot(&candidate, Some(&source)) {
            Ok(Some(index)) => {
                debug!(
                    path = %candidate.display(),
                    messages = index.messages.len(),
                    "Loaded snapshot"
                );
                return Ok(Some(index));
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Ignoring unusable snapshot"),
        }
    }
    Ok(None)
}

/// Primary snapshot path: hidden file next to the feed.
///
/// Example: `/data/inbox.jsonl` → `/data/.inbox.jsonl.mailsift.idx`
pub fn snapshot_path_for(feed_path: &Path) -> PathBuf {
    let filename = feed_path.file_name().unwrap_or_default().to_string_lossy();
    feed_path.with_file_name(format!(".{filename}.mailsift.idx"))
}

/// Fallback snapshot path inside the cache directory.
///
/// Example: `~/.cache/mailsift/<sha256_of_path>.idx`
pub fn cache_snapshot_path_for(feed_path: &Path, cache_dir: &Path) -> PathBuf {
    let hash = Sha256::digest(feed_path.to_string_lossy().as_bytes());
    cache_dir.join(format!("{hash:x}.idx"))
}

/// Size in bytes of the snapshot for `feed_path` (0 if missing).
pub fn snapshot_file_size(feed_path: &Path, cache_dir: &Path) -> u64 {
    std::fs::metadata(snapshot_path_for(feed_path))
        .or_else(|_| std::fs::metadata(cache_snapshot_path_for(feed_path, cache_dir)))
        .map(|m| m.len())
        .unwrap_or(0)
}

/// Compute SHA-256 of the first `n` bytes of a file.
fn sha256_first_n(path: &Path, n: usize) -> Result<[u8; 32]> {
    let file = File::open(path).map_err(|e| SearchError::io(path, e))?;
    let mut buf = Vec::with_capacity(n);
    file.take(n as u64)
        .read_to_end(&mut buf)
        .map_err(|e| SearchError::io(path, e))?;
    Ok(Sha256::digest(&buf).into())
}
