//! Event Queue & Dispatcher (EQD): the apply-lifecycle state machine, plus the timer loop that
//! produces synthetic `EXPIRE` events.

use crate::avs::AppliedVersionsStore;
use crate::collaborators::{ComponentRpc, MultipartCache, Notification, NotificationSink, RootUpdatePolicy};
use crate::event::{Event, EventKind};
use crate::ptl::PendingList;
use crate::retry::RetryEngine;
use crate::timer::TimerTable;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Timer tick interval and timeout granularity: both 5 seconds, per the apply-deadline design.
pub const TICK_INTERVAL_SECS: u32 = 5;

/// Random transaction-id range a timer-expiry retry attempt is assigned from.
const EXPIRE_TX_ID_RANGE: std::ops::RangeInclusive<u16> = 1001..=3000;

/// Owns the three state tables (AVS, PTL, TT), the event queue, and the retry engine; runs the
/// dispatcher loop that drives the apply lifecycle to completion.
pub struct CoreEngine<R: ComponentRpc, N: NotificationSink, M: MultipartCache, P: RootUpdatePolicy> {
    avs: AppliedVersionsStore,
    ptl: PendingList,
    timers: Arc<Mutex<TimerTable>>,
    retry_engine: RetryEngine<M, R>,
    sink: Arc<N>,
    root_policy: Arc<P>,
    global_transaction_id: String,
    events_tx: mpsc::UnboundedSender<String>,
    events_rx: mpsc::UnboundedReceiver<String>,
    timer_task: Option<JoinHandle<()>>,
}

impl<R: ComponentRpc + 'static, N: NotificationSink + 'static, M: MultipartCache + 'static, P: RootUpdatePolicy + 'static>
    CoreEngine<R, N, M, P>
{
    pub fn new(
        avs: AppliedVersionsStore,
        cache: Arc<M>,
        rpc: Arc<R>,
        sink: Arc<N>,
        root_policy: Arc<P>,
        global_transaction_id: String,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            avs,
            ptl: PendingList::new(),
            timers: Arc::new(Mutex::new(TimerTable::new())),
            retry_engine: RetryEngine::new(cache, rpc),
            sink,
            root_policy,
            global_transaction_id,
            events_tx,
            events_rx,
            timer_task: None,
        }
    }

    /// A cloneable handle producers (component event callbacks) use to push raw event strings
    /// onto the queue. Safe to call from any task or thread.
    pub fn event_sender(&self) -> mpsc::UnboundedSender<String> {
        self.events_tx.clone()
    }

    pub fn avs(&self) -> &AppliedVersionsStore {
        &self.avs
    }

    pub fn ptl(&self) -> &PendingList {
        &self.ptl
    }

    /// Start the timer loop task: sleeps `TICK_INTERVAL_SECS`, ticks the shared timer table, and
    /// on expiry synthesizes an `EXPIRE` event onto the queue. Idempotent only in the sense that
    /// calling it twice spawns two loops against the same table - callers should call it once.
    pub fn spawn_timer_loop(&mut self) {
        let timers = self.timers.clone();
        let events_tx = self.events_tx.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(TICK_INTERVAL_SECS as u64)).await;

                let expired_name = {
                    let mut guard = timers.lock().await;
                    guard.tick(TICK_INTERVAL_SECS)
                };

                let Some(name) = expired_name else {
                    continue;
                };

                let tx_id = rand::thread_rng().gen_range(EXPIRE_TX_ID_RANGE);
                tracing::error!(%name, "timer expired; no event received within timeout period");
                tracing::info!(%name, tx_id, "EXPIRE retry transaction id generated");

                {
                    let mut guard = timers.lock().await;
                    guard.start_or_update(&name, tx_id, 0);
                }

                let expire_event = Event::format_expire(&name, tx_id);
                if events_tx.send(expire_event).is_err() {
                    // Receiver dropped - engine is shutting down.
                    return;
                }
            }
        });
        self.timer_task = Some(handle);
    }

    /// Consume events from the queue until the sender side is dropped. Each event is processed
    /// to completion (including any synchronous retry RPC) before the next is read.
    pub async fn run(&mut self) {
        while let Some(raw) = self.events_rx.recv().await {
            let event = Event::parse(&raw);
            self.dispatch(event).await;
        }
    }

    /// Run the apply-lifecycle state machine for a single event.
    pub async fn dispatch(&mut self, event: Event) {
        match event.kind {
            EventKind::Ack => self.handle_ack(&event).await,
            EventKind::Nack => self.handle_nack(&event).await,
            EventKind::Expire => self.handle_expire(&event),
            EventKind::Timeout => self.handle_timeout(&event).await,
            EventKind::Crash => self.handle_crash(&event),
        }
    }

    async fn handle_ack(&mut self, event: &Event) {
        let stopped = {
            let mut guard = self.timers.lock().await;
            guard.stop(&event.name, event.tx_id)
        };

        if !stopped.is_success() {
            tracing::warn!(
                name = %event.name,
                tx_id = event.tx_id,
                "stale ACK (tx_id mismatch); dropping without touching PTL/AVS"
            );
            return;
        }

        self.sink.notify(Notification {
            name: event.name.clone(),
            version: event.version,
            status: "success".to_string(),
            error_details: None,
            global_transaction_id: self.global_transaction_id.clone(),
            timeout: 0,
            message_type: "ack".to_string(),
        });

        self.ptl.update(&event.name, event.version, "success", "none");
        self.ptl.delete(&event.name);
        self.avs.upsert(&event.name, event.version, "success", 0);

        if self.root_policy.needs_root_update(&self.avs) {
            self.root_policy.update_root_version(&mut self.avs);
        }
    }

    async fn handle_nack(&mut self, event: &Event) {
        let mut guard = self.timers.lock().await;
        guard.stop(&event.name, event.tx_id);
        drop(guard);

        self.ptl
            .update(&event.name, event.version, "failed", "doc_rejected");

        self.sink.notify(Notification {
            name: event.name.clone(),
            version: event.version,
            status: "failed".to_string(),
            error_details: Some("doc_rejected".to_string()),
            global_transaction_id: self.global_transaction_id.clone(),
            timeout: 0,
            message_type: "status".to_string(),
        });
    }

    fn handle_expire(&mut self, event: &Event) {
        self.sink.notify(Notification {
            name: event.name.clone(),
            version: event.version,
            status: "pending".to_string(),
            error_details: Some("timer_expired".to_string()),
            global_transaction_id: self.global_transaction_id.clone(),
            timeout: event.timeout,
            message_type: "status".to_string(),
        });

        if self.retry_engine.retry(&event.name).is_success() {
            tracing::info!(name = %event.name, "retry after expiry succeeded");
        } else {
            tracing::error!(name = %event.name, "retry after expiry failed");
        }
    }

    async fn handle_timeout(&mut self, event: &Event) {
        {
            let mut guard = self.timers.lock().await;
            guard.start_or_update(&event.name, event.tx_id, event.timeout);
        }

        self.sink.notify(Notification {
            name: event.name.clone(),
            version: event.version,
            status: "pending".to_string(),
            error_details: None,
            global_transaction_id: self.global_transaction_id.clone(),
            timeout: event.timeout,
            message_type: "status".to_string(),
        });
    }

    fn handle_crash(&mut self, event: &Event) {
        self.sink.notify(Notification {
            name: event.name.clone(),
            version: event.version,
            status: "pending".to_string(),
            error_details: Some("process_crash".to_string()),
            global_transaction_id: self.global_transaction_id.clone(),
            timeout: 0,
            message_type: "status".to_string(),
        });

        let version_matches = self
            .avs
            .lookup(&event.name)
            .map(|entry| entry.version == event.version)
            .unwrap_or(false);

        if version_matches {
            tracing::info!(name = %event.name, "AVS and event version match; retry not required");
            return;
        }

        if self.retry_engine.retry(&event.name).is_success() {
            tracing::info!(name = %event.name, "retry after crash succeeded");
        } else {
            tracing::error!(name = %event.name, "retry after crash failed");
        }
    }
}

impl<R: ComponentRpc, N: NotificationSink, M: MultipartCache, P: RootUpdatePolicy> Drop
    for CoreEngine<R, N, M, P>
{
    fn drop(&mut self) {
        if let Some(handle) = self.timer_task.take() {
            handle.abort();
        }
    }
}
