//! External collaborator interfaces.
//!
//! Everything in this module is a trait plus a minimal in-process default implementation. The
//! real HTTP fetch, a real component RPC bus, and a real upstream notification transport are
//! deliberately not implemented here - these traits are the seam a real deployment plugs
//! concrete transports into, without the rest of the engine needing to change.

use eyre::{eyre, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Mutex;

/// A single entry in the multipart cache: one subdoc's cached apply payload plus the metadata
/// needed to rebuild an `ATOMIC_SET_WEBCONFIG` request for it.
#[derive(Debug, Clone)]
pub struct MultipartEntry {
    pub name_space: String,
    pub etag: u32,
    pub data: Vec<u8>,
}

impl MultipartEntry {
    pub fn data_size(&self) -> usize {
        self.data.len()
    }
}

/// Read-only handle onto the cached multipart bundle. The *last* entry is always root/metadata,
/// not an applicable subdoc - callers (the retry engine) must skip it.
pub trait MultipartCache: Send + Sync {
    fn entries(&self) -> Vec<MultipartEntry>;
}

/// Simple in-memory cache, typically populated once after the outer fetch layer downloads and
/// parses a bundle.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMultipartCache {
    entries: Vec<MultipartEntry>,
}

impl InMemoryMultipartCache {
    pub fn new(entries: Vec<MultipartEntry>) -> Self {
        Self { entries }
    }
}

impl MultipartCache for InMemoryMultipartCache {
    fn entries(&self) -> Vec<MultipartEntry> {
        self.entries.clone()
    }
}

/// On-disk fixture shape for a cached multipart bundle: one record per subdoc plus the trailing
/// root/metadata record, in apply order.
#[derive(Debug, Deserialize)]
struct FixtureEntry {
    name_space: String,
    etag: u32,
    data_base64: String,
}

/// Load a multipart cache from a JSON fixture, for local runs and demos in place of a real fetch
/// layer (out of scope for this crate).
pub fn load_multipart_cache_fixture(path: impl AsRef<Path>) -> Result<InMemoryMultipartCache> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| eyre!("failed to read multipart cache fixture {}: {e}", path.display()))?;
    let fixtures: Vec<FixtureEntry> = serde_json::from_str(&raw)
        .map_err(|e| eyre!("invalid multipart cache fixture {}: {e}", path.display()))?;

    use base64::Engine;
    let mut entries = Vec::with_capacity(fixtures.len());
    for fixture in fixtures {
        let data = base64::engine::general_purpose::STANDARD
            .decode(&fixture.data_base64)
            .map_err(|e| {
                eyre!(
                    "invalid base64 data for multipart entry '{}' in {}: {e}",
                    fixture.name_space,
                    path.display()
                )
            })?;
        entries.push(MultipartEntry {
            name_space: fixture.name_space,
            etag: fixture.etag,
            data,
        });
    }

    Ok(InMemoryMultipartCache::new(entries))
}

/// The mode the component RPC is invoked with. The engine only ever uses the atomic/webconfig
/// variant; this is modeled as an enum (rather than a bare constant) so a future transport isn't
/// stuck widening an untyped integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    AtomicSetWebconfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Blob,
    Base64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetParam {
    pub name: String,
    pub value: Vec<u8>,
    pub param_type: ParamType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcOutcome {
    pub success: bool,
    pub ccsp_status: i32,
}

/// The component RPC surface ("setValues"). Invoked synchronously from the retry engine: the
/// dispatcher blocks on this call before moving to the next queued event, matching the original
/// design's single-consumer, process-to-completion model.
pub trait ComponentRpc: Send + Sync {
    fn set_values(&self, params: &[SetParam], mode: SetMode) -> Result<RpcOutcome>;
}

/// In-process fake used for local/dry runs and tests: logs what would be sent and always
/// reports success.
#[derive(Debug, Default)]
pub struct LoggingComponentRpc;

impl ComponentRpc for LoggingComponentRpc {
    fn set_values(&self, params: &[SetParam], mode: SetMode) -> Result<RpcOutcome> {
        tracing::info!(
            count = params.len(),
            ?mode,
            "LoggingComponentRpc::set_values (no-op transport)"
        );
        Ok(RpcOutcome {
            success: true,
            ccsp_status: 0,
        })
    }
}

/// A single upstream notification: `(name, version, status, error_details,
/// global_transaction_id, timeout, message_type)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub name: String,
    pub version: u32,
    pub status: String,
    pub error_details: Option<String>,
    pub global_transaction_id: String,
    pub timeout: u32,
    pub message_type: String,
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Default sink: logs every notification via `tracing` and retains it in memory so tests can
/// assert on what was sent. A real deployment plugs in a publish-only transport here.
#[derive(Debug, Default)]
pub struct InMemoryNotificationSink {
    sent: Mutex<Vec<Notification>>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notification sink mutex poisoned").clone()
    }
}

impl NotificationSink for InMemoryNotificationSink {
    fn notify(&self, notification: Notification) {
        tracing::info!(
            name = %notification.name,
            version = notification.version,
            status = %notification.status,
            error_details = ?notification.error_details,
            global_tx = %notification.global_transaction_id,
            timeout = notification.timeout,
            message_type = %notification.message_type,
            "upstream notification"
        );
        self.sent
            .lock()
            .expect("notification sink mutex poisoned")
            .push(notification);
    }
}

/// Predicate + action for committing a bundle-level "root" version once all of a bundle's
/// constituent subdocs have ACKed. The distilled spec names this hook but leaves the bundle
/// membership tracking to a collaborator outside the lifecycle engine's scope.
pub trait RootUpdatePolicy: Send + Sync {
    fn needs_root_update(&self, avs: &crate::avs::AppliedVersionsStore) -> bool;
    fn update_root_version(&self, avs: &mut crate::avs::AppliedVersionsStore);
}

/// Default policy: no bundle tracking, so a root update is never triggered. A deployment that
/// tracks bundle membership elsewhere supplies its own `RootUpdatePolicy`.
#[derive(Debug, Default)]
pub struct NoopRootUpdatePolicy;

impl RootUpdatePolicy for NoopRootUpdatePolicy {
    fn needs_root_update(&self, _avs: &crate::avs::AppliedVersionsStore) -> bool {
        false
    }

    fn update_root_version(&self, _avs: &mut crate::avs::AppliedVersionsStore) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_sink_records_and_returns_in_order() {
        let sink = InMemoryNotificationSink::new();
        sink.notify(Notification {
            name: "wifi".into(),
            version: 5,
            status: "success".into(),
            error_details: None,
            global_transaction_id: "gtx-1".into(),
            timeout: 0,
            message_type: "ack".into(),
        });
        sink.notify(Notification {
            name: "moca".into(),
            version: 1,
            status: "failed".into(),
            error_details: Some("doc_rejected".into()),
            global_transaction_id: "gtx-1".into(),
            timeout: 0,
            message_type: "status".into(),
        });

        let sent = sink.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].name, "wifi");
        assert_eq!(sent[1].name, "moca");
    }

    #[test]
    fn noop_root_update_policy_never_triggers() {
        let policy = NoopRootUpdatePolicy;
        let avs = crate::avs::AppliedVersionsStore::new();
        assert!(!policy.needs_root_update(&avs));
    }

    #[test]
    fn fixture_loader_decodes_base64_payloads() {
        let mut path = std::env::temp_dir();
        path.push(format!("webcfg-cache-fixture-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[{"name_space":"wifi","etag":1,"data_base64":"aGVsbG8="},
                {"name_space":"root","etag":0,"data_base64":""}]"#,
        )
        .unwrap();

        let cache = load_multipart_cache_fixture(&path).unwrap();
        let entries = cache.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name_space, "wifi");
        assert_eq!(entries[0].data, b"hello");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn logging_rpc_always_succeeds() {
        let rpc = LoggingComponentRpc;
        let outcome = rpc
            .set_values(
                &[SetParam {
                    name: "wifi".into(),
                    value: vec![1, 2, 3],
                    param_type: ParamType::Base64,
                }],
                SetMode::AtomicSetWebconfig,
            )
            .unwrap();
        assert!(outcome.success);
    }
}
