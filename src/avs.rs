//! Applied-Versions Store (AVS): the durable record of which subdoc version is currently
//! applied, keyed by subdoc name.

use eyre::{eyre, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedEntry {
    pub name: String,
    pub version: u32,
    pub status: String,
    pub error_code: i32,
}

/// In-memory, file-backed map from subdoc name to its last-applied entry.
///
/// Insertion order is preserved alongside the `HashMap` so `snapshot()` and `serialize_blob()`
/// are deterministic across runs over the same sequence of `upsert` calls (P5).
#[derive(Debug, Clone, Default)]
pub struct AppliedVersionsStore {
    entries: HashMap<String, AppliedEntry>,
    order: Vec<String>,
}

impl AppliedVersionsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the packed binary encoding from `path`. A missing file yields an empty store, not
    /// an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }

        let bytes = fs::read(path)
            .map_err(|e| eyre!("failed to read applied-versions file {}: {e}", path.display()))?;

        Self::from_blob(&bytes)
            .map_err(|e| eyre!("failed to decode applied-versions file {}: {e}", path.display()))
    }

    pub fn upsert(&mut self, name: &str, version: u32, status: &str, error_code: i32) {
        match self.entries.get_mut(name) {
            Some(entry) => {
                entry.version = version;
                entry.status = status.to_string();
                entry.error_code = error_code;
            }
            None => {
                self.entries.insert(
                    name.to_string(),
                    AppliedEntry {
                        name: name.to_string(),
                        version,
                        status: status.to_string(),
                        error_code,
                    },
                );
                self.order.push(name.to_string());
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&AppliedEntry> {
        self.entries.get(name)
    }

    /// Snapshot of all entries in insertion order.
    pub fn snapshot(&self) -> Vec<AppliedEntry> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name).cloned())
            .collect()
    }

    /// Pack the full snapshot into a deterministic binary encoding: `count: u32 LE`, then per
    /// record `name_len: u16 LE, name, version: u32 LE, status_len: u16 LE, status,
    /// error_code: i32 LE`.
    pub fn serialize_blob(&self) -> Vec<u8> {
        let snapshot = self.snapshot();
        let mut out = Vec::new();
        out.extend_from_slice(&(snapshot.len() as u32).to_le_bytes());
        for entry in &snapshot {
            let name_bytes = entry.name.as_bytes();
            out.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
            out.extend_from_slice(name_bytes);
            out.extend_from_slice(&entry.version.to_le_bytes());
            let status_bytes = entry.status.as_bytes();
            out.extend_from_slice(&(status_bytes.len() as u16).to_le_bytes());
            out.extend_from_slice(status_bytes);
            out.extend_from_slice(&entry.error_code.to_le_bytes());
        }
        out
    }

    pub fn serialize_blob_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(self.serialize_blob())
    }

    fn from_blob(bytes: &[u8]) -> Result<Self> {
        let mut store = Self::new();
        if bytes.len() < 4 {
            if bytes.is_empty() {
                return Ok(store);
            }
            return Err(eyre!("truncated applied-versions blob"));
        }

        let mut cursor = 4usize;
        let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap());

        for _ in 0..count {
            let name_len = read_u16(bytes, &mut cursor)?;
            let name = read_str(bytes, &mut cursor, name_len)?;
            let version = read_u32(bytes, &mut cursor)?;
            let status_len = read_u16(bytes, &mut cursor)?;
            let status = read_str(bytes, &mut cursor, status_len)?;
            let error_code = read_i32(bytes, &mut cursor)?;
            store.upsert(&name, version, &status, error_code);
        }

        Ok(store)
    }

    /// Atomic-on-rename persistence: write to a temp file alongside `path`, then rename over it.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    eyre!(
                        "failed to create applied-versions directory {}: {e}",
                        parent.display()
                    )
                })?;
            }
        }

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, self.serialize_blob()).map_err(|e| {
            eyre!(
                "failed to write temp applied-versions file {}: {e}",
                tmp_path.display()
            )
        })?;

        if let Err(err) = fs::rename(&tmp_path, path) {
            if cfg!(windows) {
                let _ = fs::remove_file(path);
                fs::rename(&tmp_path, path).map_err(|e| {
                    eyre!("failed to replace applied-versions file {}: {e}", path.display())
                })?;
            } else {
                return Err(eyre!(
                    "failed to replace applied-versions file {}: {err}",
                    path.display()
                ));
            }
        }

        Ok(())
    }
}

fn read_u16(bytes: &[u8], cursor: &mut usize) -> Result<u16> {
    let end = *cursor + 2;
    let chunk = bytes
        .get(*cursor..end)
        .ok_or_else(|| eyre!("truncated applied-versions blob (u16)"))?;
    *cursor = end;
    Ok(u16::from_le_bytes(chunk.try_into().unwrap()))
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    let end = *cursor + 4;
    let chunk = bytes
        .get(*cursor..end)
        .ok_or_else(|| eyre!("truncated applied-versions blob (u32)"))?;
    *cursor = end;
    Ok(u32::from_le_bytes(chunk.try_into().unwrap()))
}

fn read_i32(bytes: &[u8], cursor: &mut usize) -> Result<i32> {
    let end = *cursor + 4;
    let chunk = bytes
        .get(*cursor..end)
        .ok_or_else(|| eyre!("truncated applied-versions blob (i32)"))?;
    *cursor = end;
    Ok(i32::from_le_bytes(chunk.try_into().unwrap()))
}

fn read_str(bytes: &[u8], cursor: &mut usize, len: u16) -> Result<String> {
    let end = *cursor + len as usize;
    let chunk = bytes
        .get(*cursor..end)
        .ok_or_else(|| eyre!("truncated applied-versions blob (string)"))?;
    *cursor = end;
    String::from_utf8(chunk.to_vec()).map_err(|e| eyre!("invalid utf-8 in applied-versions blob: {e}"))
}
