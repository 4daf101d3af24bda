//! Retry Engine (RE): rebuilds the original apply request for a named subdoc from the cached
//! multipart bundle and resubmits it via the component RPC.

use crate::collaborators::{
    ComponentRpc, MultipartCache, MultipartEntry, ParamType, SetMode, SetParam,
};
use crate::status::Status;
use std::sync::Arc;

/// One decoded parameter from a cached subdoc payload, before the retry engine's blob-to-base64
/// substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamEntry {
    pub name: String,
    pub value: Vec<u8>,
    pub param_type: ParamType,
}

/// Decode a cached subdoc's raw `data` bytes into its typed parameter list.
///
/// Wire format (this crate's own packed encoding): `count: u16 LE`, then per entry
/// `name_len: u16 LE, name, type: u8 (0 = Blob, 1 = Base64), value_len: u32 LE, value`.
pub fn decode_param_blob(data: &[u8]) -> Vec<ParamEntry> {
    let mut out = Vec::new();
    if data.len() < 2 {
        return out;
    }
    let count = u16::from_le_bytes([data[0], data[1]]);
    let mut cursor = 2usize;

    for _ in 0..count {
        let Some(name_len_bytes) = data.get(cursor..cursor + 2) else {
            break;
        };
        let name_len = u16::from_le_bytes([name_len_bytes[0], name_len_bytes[1]]) as usize;
        cursor += 2;

        let Some(name_bytes) = data.get(cursor..cursor + name_len) else {
            break;
        };
        let name = String::from_utf8_lossy(name_bytes).into_owned();
        cursor += name_len;

        let Some(&type_byte) = data.get(cursor) else {
            break;
        };
        cursor += 1;
        let param_type = if type_byte == 0 {
            ParamType::Blob
        } else {
            ParamType::Base64
        };

        let Some(value_len_bytes) = data.get(cursor..cursor + 4) else {
            break;
        };
        let value_len =
            u32::from_le_bytes(value_len_bytes.try_into().unwrap()) as usize;
        cursor += 4;

        let Some(value_bytes) = data.get(cursor..cursor + value_len) else {
            break;
        };
        cursor += value_len;

        out.push(ParamEntry {
            name,
            value: value_bytes.to_vec(),
            param_type,
        });
    }

    out
}

/// Encode a parameter list back into the same wire format `decode_param_blob` reads. Used by
/// fixture builders and tests; a real deployment's outer fetch layer produces these bytes.
pub fn encode_param_blob(params: &[ParamEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(params.len() as u16).to_le_bytes());
    for p in params {
        out.extend_from_slice(&(p.name.len() as u16).to_le_bytes());
        out.extend_from_slice(p.name.as_bytes());
        out.push(match p.param_type {
            ParamType::Blob => 0,
            ParamType::Base64 => 1,
        });
        out.extend_from_slice(&(p.value.len() as u32).to_le_bytes());
        out.extend_from_slice(&p.value);
    }
    out
}

/// Compose the "appended document" the retry engine substitutes for a blob parameter's value:
/// `name_space` bytes, then `etag` as 4 little-endian bytes, then the raw value bytes.
pub fn append_encoded_doc(name_space: &str, etag: u32, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(name_space.len() + 4 + value.len());
    out.extend_from_slice(name_space.as_bytes());
    out.extend_from_slice(&etag.to_le_bytes());
    out.extend_from_slice(value);
    out
}

pub struct RetryEngine<C: MultipartCache, R: ComponentRpc> {
    cache: Arc<C>,
    rpc: Arc<R>,
}

impl<C: MultipartCache, R: ComponentRpc> RetryEngine<C, R> {
    pub fn new(cache: Arc<C>, rpc: Arc<R>) -> Self {
        Self { cache, rpc }
    }

    /// Rebuild and resubmit the apply request for `name`.
    ///
    /// The last cache entry is always root/metadata and is intentionally never matched here,
    /// preserving the original `retryMultipartSubdoc`'s `[0 .. count-1)` scan range.
    pub fn retry(&self, name: &str) -> Status {
        let entries = self.cache.entries();
        if entries.is_empty() {
            tracing::error!("multipart cache is empty; cannot retry {name}");
            return Status::Failure;
        }

        let applicable = &entries[..entries.len() - 1];
        let Some(entry) = applicable.iter().find(|e| e.name_space == name) else {
            tracing::error!("doc {name} not found in multipart cache");
            return Status::Failure;
        };

        self.retry_entry(entry)
    }

    fn retry_entry(&self, entry: &MultipartEntry) -> Status {
        let decoded = decode_param_blob(&entry.data);
        if decoded.is_empty() {
            tracing::error!(name = %entry.name_space, "decoded parameter list is empty");
            return Status::Failure;
        }

        let mut out_params = Vec::with_capacity(decoded.len());
        for item in decoded {
            match item.param_type {
                ParamType::Blob => {
                    let appended = append_encoded_doc(&entry.name_space, entry.etag, &item.value);
                    out_params.push(SetParam {
                        name: item.name,
                        value: appended,
                        param_type: ParamType::Base64,
                    });
                }
                ParamType::Base64 => {
                    tracing::warn!(param = %item.name, "skipping non-blob parameter in retry path");
                }
            }
        }

        if out_params.is_empty() {
            tracing::error!(name = %entry.name_space, "no valid blob parameters to resubmit");
            return Status::Failure;
        }

        match self.rpc.set_values(&out_params, SetMode::AtomicSetWebconfig) {
            Ok(outcome) if outcome.success => Status::Success,
            Ok(outcome) => {
                tracing::error!(
                    name = %entry.name_space,
                    ccsp_status = outcome.ccsp_status,
                    "retry setValues reported failure"
                );
                Status::Failure
            }
            Err(err) => {
                tracing::error!(name = %entry.name_space, error = %err, "retry setValues RPC error");
                Status::Failure
            }
        }
    }
}
