//! Binary snapshot file format.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ HEADER (128 bytes, fixed)            │
//! │  magic: [u8; 8] = b"MSIFTIDX"        │
//! │  version: u32                        │
//! │  flags: u32                          │
//! │  message_count: u64                  │
//! │  contact_count: u64                  │
//! │  source_size: u64                    │
//! │  source_modified_time: i64           │
//! │  source_sha256_first_4kb: [u8; 32]   │
//! │  payload_sha256: [u8; 32]            │
//! │  (padding to 128 bytes)              │
//! ├──────────────────────────────────────┤
//! │ PAYLOAD (variable)                   │
//! │  bincode-serialized MailIndex        │
//! └──────────────────────────────────────┘
//! ```

/// Magic bytes identifying a mailsift snapshot.
pub const MAGIC: &[u8; 8] = b"MSIFTIDX";

/// Current snapshot format version.
pub const VERSION: u32 = 1;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 128;

/// Bytes of the source feed hashed into the fingerprint.
pub const HASH_PREFIX_LEN: usize = 4096;

/// Serializable snapshot header.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SnapshotHeader {
    /// Magic bytes (must equal [`MAGIC`]).
    pub magic: [u8; 8],
    /// Format version (must equal [`VERSION`]).
    pub version: u32,
    /// Reserved.
    pub flags: u32,
    pub message_count: u64,
    pub contact_count: u64,
    /// Size of the feed the snapshot was built from.
    pub source_size: u64,
    /// Modification time of that feed (Unix seconds).
    pub source_modified_time: i64,
    /// SHA-256 of the feed's first 4 KB.
    pub source_sha256_first_4kb: [u8; 32],
    /// SHA-256 of the serialized payload.
    pub payload_sha256: [u8; 32],
}

impl SnapshotHeader {
    /// Validate that the header is well-formed and matches the current format.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.magic != *MAGIC {
            return Err("Invalid magic bytes".into());
        }
        if self.version != VERSION {
            return Err(format!(
                "Incompatible version: expected {VERSION}, found {}",
                self.version
            ));
        }
        Ok(())
    }
}
