//! Download service - drives the pipeline for a frontend
//!
//! Frontends send [`PipelineCommand`]s over an async channel and receive
//! [`UiMessage`]s back. The service owns the polling loop: on every tick it
//! polls the records that are still in flight and reports what changed.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

use crate::db::{Database, DownloadRecordsDb};
use crate::engine::{ExecutionEngine, PreferenceStore};
use crate::gateway::CancellationGateway;
use crate::monitor::DownloadMonitor;
use crate::poller::StatusPoller;
use crate::submitter::JobSubmitter;
use crate::types::{
    DownloadPhase, DownloadRecord, DownloadRequest, DownloadStatus, PostDownload, Settings,
    DEFAULT_LOCATION_LABEL,
};

/// Commands sent from the frontend to the service
#[derive(Debug, Clone)]
pub enum PipelineCommand {
    /// Queue a single file
    Submit(DownloadRequest),
    /// Queue every file of a post
    SubmitPost(PostDownload),
    /// Cancel (if possible) and delete a record by id
    Delete(i64),
    /// Request the full record list
    RefreshRecords,
    /// Poll immediately instead of waiting for the next tick
    PollNow,
    /// Shutdown the service
    Shutdown,
}

/// Messages sent from the service to the frontend
#[derive(Debug, Clone)]
pub enum UiMessage {
    /// A record was created
    RecordAdded(DownloadRecord),
    /// A record was deleted
    RecordRemoved(i64),
    /// A record's stored location changed
    RecordUpdated(DownloadRecord),
    /// Full record list, newest first
    RecordsList(Vec<DownloadRecord>),
    /// Phase or progress of a record changed
    StatusUpdated { record_id: i64, status: DownloadStatus },
    /// A record has been Unknown for longer than the grace period
    StatusUnknown(i64),
    /// Error message
    Error(String),
    /// Service started
    Ready,
}

/// Pipeline service: submitter, poller and gateway sharing one engine
pub struct DownloadService {
    engine: Arc<dyn ExecutionEngine>,
    db: Database,
    submitter: JobSubmitter,
    poller: StatusPoller,
    gateway: CancellationGateway,
    poll_interval: Duration,
    unknown_grace: Duration,
}

impl DownloadService {
    pub fn new(
        engine: Arc<dyn ExecutionEngine>,
        preferences: Arc<dyn PreferenceStore>,
        db: Database,
        settings: &Settings,
    ) -> Self {
        Self {
            submitter: JobSubmitter::new(engine.clone(), preferences, db.clone()),
            poller: StatusPoller::with_timeout(
                engine.clone(),
                Duration::from_millis(settings.poll_timeout_ms),
            ),
            gateway: CancellationGateway::new(engine.clone(), db.clone()),
            engine,
            db,
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
            unknown_grace: Duration::from_secs(settings.unknown_grace_secs),
        }
    }

    pub fn submitter(&self) -> JobSubmitter {
        self.submitter.clone()
    }

    pub fn poller(&self) -> StatusPoller {
        self.poller.clone()
    }

    pub fn gateway(&self) -> CancellationGateway {
        self.gateway.clone()
    }

    /// Spawn the service on a dedicated thread with its own tokio runtime
    pub fn spawn(
        self,
        ui_sender: async_channel::Sender<UiMessage>,
        cmd_receiver: async_channel::Receiver<PipelineCommand>,
    ) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Failed to create tokio runtime: {}", e);
                    return;
                }
            };
            rt.block_on(self.run(ui_sender, cmd_receiver));
        })
    }

    /// Process commands and poll until shutdown or until the command channel
    /// closes
    pub async fn run(
        self,
        ui_sender: async_channel::Sender<UiMessage>,
        cmd_receiver: async_channel::Receiver<PipelineCommand>,
    ) {
        let mut monitor = DownloadMonitor::new(self.unknown_grace);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!("Download service started ({})", self.engine.engine_name());
        let _ = ui_sender.send(UiMessage::Ready).await;

        loop {
            tokio::select! {
                cmd_result = cmd_receiver.recv() => {
                    match cmd_result {
                        Ok(PipelineCommand::Shutdown) => {
                            log::info!("Download service shutting down");
                            break;
                        }
                        Ok(cmd) => {
                            self.handle_command(&ui_sender, &mut monitor, cmd).await;
                        }
                        Err(_) => {
                            log::warn!("Command channel closed");
                            break;
                        }
                    }
                }

                _ = ticker.tick() => {
                    self.poll_round(&ui_sender, &mut monitor).await;
                }
            }
        }
    }

    async fn handle_command(
        &self,
        ui_sender: &async_channel::Sender<UiMessage>,
        monitor: &mut DownloadMonitor,
        cmd: PipelineCommand,
    ) {
        match cmd {
            PipelineCommand::Submit(request) => match self.submitter.submit(request).await {
                Ok(record) => {
                    let _ = ui_sender.send(UiMessage::RecordAdded(record)).await;
                }
                Err(e) => {
                    let _ = ui_sender.send(UiMessage::Error(e.to_string())).await;
                }
            },

            PipelineCommand::SubmitPost(post) => {
                let outcome = self.submitter.submit_post(&post).await;
                for record in outcome.submitted {
                    let _ = ui_sender.send(UiMessage::RecordAdded(record)).await;
                }
                for (file_name, e) in outcome.failed {
                    let _ = ui_sender
                        .send(UiMessage::Error(format!("{}: {}", file_name, e)))
                        .await;
                }
            }

            PipelineCommand::Delete(id) => {
                let record = match DownloadRecordsDb::get(&self.db, id) {
                    Ok(Some(record)) => record,
                    Ok(None) => {
                        let _ = ui_sender
                            .send(UiMessage::Error(format!("no download with id {}", id)))
                            .await;
                        return;
                    }
                    Err(e) => {
                        let _ = ui_sender.send(UiMessage::Error(e.to_string())).await;
                        return;
                    }
                };

                match self.gateway.delete_record(&record).await {
                    Ok(()) => {
                        monitor.forget(&record.correlation_id);
                        let _ = ui_sender.send(UiMessage::RecordRemoved(id)).await;
                    }
                    Err(e) => {
                        let _ = ui_sender.send(UiMessage::Error(e.to_string())).await;
                    }
                }
            }

            PipelineCommand::RefreshRecords => match DownloadRecordsDb::list(&self.db) {
                Ok(records) => {
                    let _ = ui_sender.send(UiMessage::RecordsList(records)).await;
                }
                Err(e) => {
                    let _ = ui_sender.send(UiMessage::Error(e.to_string())).await;
                }
            },

            PipelineCommand::PollNow => self.poll_round(ui_sender, monitor).await,

            PipelineCommand::Shutdown => {
                // Handled in the main loop
            }
        }
    }

    async fn poll_round(
        &self,
        ui_sender: &async_channel::Sender<UiMessage>,
        monitor: &mut DownloadMonitor,
    ) {
        let records = match DownloadRecordsDb::list(&self.db) {
            Ok(records) => records,
            Err(e) => {
                log::error!("Failed to load records for polling: {}", e);
                return;
            }
        };

        let in_flight: Vec<DownloadRecord> = monitor.pending(&records).into_iter().cloned().collect();
        if !in_flight.is_empty() {
            let statuses = self.poller.poll_many(&in_flight).await;
            let now = Instant::now();

            for (record, status) in in_flight.iter().zip(statuses) {
                if monitor.observe(status.clone(), now) {
                    let _ = ui_sender
                        .send(UiMessage::StatusUpdated {
                            record_id: record.id,
                            status,
                        })
                        .await;
                }

                if monitor.take_newly_stale(&record.correlation_id, now) {
                    log::info!("Status of download {} is unknown", record.id);
                    let _ = ui_sender.send(UiMessage::StatusUnknown(record.id)).await;
                }
            }
        }

        // Retried every round until the engine knows the output path
        for record in &records {
            let succeeded = monitor
                .status(&record.correlation_id)
                .is_some_and(|status| status.phase == DownloadPhase::Succeeded);
            if succeeded && has_default_label(record) {
                self.record_output_path(ui_sender, record).await;
            }
        }
    }

    /// Replace the default-location label with the concrete path once the
    /// engine reports where the file went
    async fn record_output_path(
        &self,
        ui_sender: &async_channel::Sender<UiMessage>,
        record: &DownloadRecord,
    ) {
        let Some(path) = self.engine.output_path(&record.correlation_id) else {
            return;
        };

        let path = path.to_string_lossy().to_string();
        match DownloadRecordsDb::mark_resolved_path(&self.db, &record.correlation_id, &path) {
            Ok(true) => {
                let updated = DownloadRecord {
                    resolved_path: path,
                    ..record.clone()
                };
                let _ = ui_sender.send(UiMessage::RecordUpdated(updated)).await;
            }
            Ok(false) => {}
            Err(e) => log::warn!("Failed to store path for download {}: {}", record.id, e),
        }
    }
}

fn has_default_label(record: &DownloadRecord) -> bool {
    record
        .resolved_path
        .starts_with(&format!("{}/", DEFAULT_LOCATION_LABEL))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MockEngine, MockPreferences};
    use crate::types::NativeState;

    fn settings() -> Settings {
        Settings {
            poll_interval_ms: 10,
            poll_timeout_ms: 100,
            unknown_grace_secs: 0,
            ..Settings::default()
        }
    }

    fn start(
        engine: &MockEngine,
        db: &Database,
    ) -> (
        async_channel::Sender<PipelineCommand>,
        async_channel::Receiver<UiMessage>,
        tokio::task::JoinHandle<()>,
    ) {
        let service = DownloadService::new(
            Arc::new(engine.clone()),
            Arc::new(MockPreferences::default()),
            db.clone(),
            &settings(),
        );
        let (ui_tx, ui_rx) = async_channel::unbounded();
        let (cmd_tx, cmd_rx) = async_channel::unbounded();
        let handle = tokio::spawn(service.run(ui_tx, cmd_rx));
        (cmd_tx, ui_rx, handle)
    }

    async fn next_matching<F>(rx: &async_channel::Receiver<UiMessage>, mut f: F) -> UiMessage
    where
        F: FnMut(&UiMessage) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let msg = rx.recv().await.unwrap();
                if f(&msg) {
                    return msg;
                }
            }
        })
        .await
        .unwrap()
    }

    fn request() -> DownloadRequest {
        DownloadRequest::new("https://x/y/file.png", "file.png")
            .post("p1", "Post")
            .creator("c1", "Artist")
    }

    #[tokio::test]
    async fn test_submit_poll_and_complete() {
        let engine = MockEngine::new();
        let db = Database::open_in_memory().unwrap();
        let (cmd_tx, ui_rx, handle) = start(&engine, &db);

        next_matching(&ui_rx, |m| matches!(m, UiMessage::Ready)).await;
        cmd_tx.send(PipelineCommand::Submit(request())).await.unwrap();

        let UiMessage::RecordAdded(record) =
            next_matching(&ui_rx, |m| matches!(m, UiMessage::RecordAdded(_))).await
        else {
            unreachable!()
        };

        engine.set_output_path(&record.correlation_id, "/srv/Artist/Post/file.png");
        engine.set_state(&record.correlation_id, NativeState::Succeeded);

        let msg = next_matching(&ui_rx, |m| {
            matches!(m, UiMessage::StatusUpdated { status, .. } if status.phase == DownloadPhase::Succeeded)
        })
        .await;
        let UiMessage::StatusUpdated { record_id, .. } = msg else {
            unreachable!()
        };
        assert_eq!(record_id, record.id);

        let UiMessage::RecordUpdated(updated) =
            next_matching(&ui_rx, |m| matches!(m, UiMessage::RecordUpdated(_))).await
        else {
            unreachable!()
        };
        assert_eq!(updated.resolved_path, "/srv/Artist/Post/file.png");

        cmd_tx.send(PipelineCommand::Shutdown).await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let engine = MockEngine::new();
        let db = Database::open_in_memory().unwrap();
        let (cmd_tx, ui_rx, handle) = start(&engine, &db);

        cmd_tx.send(PipelineCommand::Submit(request())).await.unwrap();
        let UiMessage::RecordAdded(record) =
            next_matching(&ui_rx, |m| matches!(m, UiMessage::RecordAdded(_))).await
        else {
            unreachable!()
        };

        cmd_tx.send(PipelineCommand::Delete(record.id)).await.unwrap();
        next_matching(&ui_rx, |m| matches!(m, UiMessage::RecordRemoved(id) if *id == record.id)).await;

        assert_eq!(engine.cancelled(), vec![record.correlation_id.clone()]);
        assert_eq!(DownloadRecordsDb::count(&db).unwrap(), 0);

        cmd_tx.send(PipelineCommand::Delete(record.id)).await.unwrap();
        next_matching(&ui_rx, |m| matches!(m, UiMessage::Error(_))).await;

        drop(cmd_tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_status_reported_after_grace() {
        let engine = MockEngine::new();
        let db = Database::open_in_memory().unwrap();
        let (cmd_tx, ui_rx, handle) = start(&engine, &db);

        cmd_tx.send(PipelineCommand::Submit(request())).await.unwrap();
        let UiMessage::RecordAdded(record) =
            next_matching(&ui_rx, |m| matches!(m, UiMessage::RecordAdded(_))).await
        else {
            unreachable!()
        };

        engine.fail_queries();
        cmd_tx.send(PipelineCommand::PollNow).await.unwrap();
        next_matching(&ui_rx, |m| matches!(m, UiMessage::StatusUnknown(id) if *id == record.id)).await;

        cmd_tx.send(PipelineCommand::Shutdown).await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_lists_records() {
        let engine = MockEngine::new();
        let db = Database::open_in_memory().unwrap();
        let (cmd_tx, ui_rx, handle) = start(&engine, &db);

        cmd_tx.send(PipelineCommand::Submit(request())).await.unwrap();
        next_matching(&ui_rx, |m| matches!(m, UiMessage::RecordAdded(_))).await;

        cmd_tx.send(PipelineCommand::RefreshRecords).await.unwrap();
        let UiMessage::RecordsList(records) =
            next_matching(&ui_rx, |m| matches!(m, UiMessage::RecordsList(_))).await
        else {
            unreachable!()
        };
        assert_eq!(records.len(), 1);

        cmd_tx.send(PipelineCommand::Shutdown).await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_output_path_stored_once_engine_knows_it() {
        let engine = MockEngine::new();
        let db = Database::open_in_memory().unwrap();
        let (cmd_tx, ui_rx, handle) = start(&engine, &db);

        cmd_tx.send(PipelineCommand::Submit(request())).await.unwrap();
        let UiMessage::RecordAdded(record) =
            next_matching(&ui_rx, |m| matches!(m, UiMessage::RecordAdded(_))).await
        else {
            unreachable!()
        };

        engine.set_state(&record.correlation_id, NativeState::Succeeded);
        next_matching(&ui_rx, |m| {
            matches!(m, UiMessage::StatusUpdated { status, .. } if status.phase == DownloadPhase::Succeeded)
        })
        .await;

        // A few rounds pass without a known path
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stored = DownloadRecordsDb::get(&db, record.id).unwrap().unwrap();
        assert_eq!(stored.resolved_path, "Downloads/Artist/Post/file.png");

        engine.set_output_path(&record.correlation_id, "/srv/Artist/Post/file.png");
        let UiMessage::RecordUpdated(updated) =
            next_matching(&ui_rx, |m| matches!(m, UiMessage::RecordUpdated(_))).await
        else {
            unreachable!()
        };
        assert_eq!(updated.id, record.id);
        assert_eq!(updated.resolved_path, "/srv/Artist/Post/file.png");

        let stored = DownloadRecordsDb::get(&db, record.id).unwrap().unwrap();
        assert_eq!(stored.resolved_path, "/srv/Artist/Post/file.png");

        cmd_tx.send(PipelineCommand::Shutdown).await.unwrap();
        handle.await.unwrap();
    }
}
