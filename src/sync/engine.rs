//! Bidirectional reconciliation between the Local Store and the remote copy.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::local_db_model::{
    Bookmark, Comment, Highlight, NewBookmark, NewComment, NewHighlight, Origin, ProgressPatch,
};
use crate::local_db_state::LocalStore;
use crate::now_ms;
use crate::remote::{RemoteClient, RemoteProgress, RemoteSetting};
use crate::sync::merge::{missing_from, reconcile_progress, ProgressAction};
use crate::sync::Connectivity;

/// Outcome of one stage of a full sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    /// The remote pull succeeded and the stage ran.
    pub ran: bool,
    pub pulled: usize,
    /// Local writes made from remote data.
    pub adopted: usize,
    pub pushed: usize,
    pub push_failures: usize,
}

impl StageReport {
    fn skipped() -> Self {
        Self::default()
    }

    fn record_push(&mut self, delivered: bool) {
        if delivered {
            self.pushed += 1;
        } else {
            self.push_failures += 1;
        }
    }

    pub fn succeeded(&self) -> bool {
        self.ran && self.push_failures == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub success: bool,
    pub offline: bool,
    pub progress: StageReport,
    pub highlights: StageReport,
    pub comments: StageReport,
    pub bookmarks: StageReport,
    pub settings: StageReport,
}

impl SyncReport {
    fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    fn stages(&self) -> [&StageReport; 5] {
        [
            &self.progress,
            &self.highlights,
            &self.comments,
            &self.bookmarks,
            &self.settings,
        ]
    }

    pub fn total_adopted(&self) -> usize {
        self.stages().iter().map(|s| s.adopted).sum()
    }

    pub fn total_pushed(&self) -> usize {
        self.stages().iter().map(|s| s.pushed).sum()
    }
}

/// Owns nothing but handles; cheap to clone into background tasks.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    store: Arc<LocalStore>,
    remote: RemoteClient,
    connectivity: Connectivity,
}

impl SyncEngine {
    pub fn new(store: Arc<LocalStore>, remote: RemoteClient, connectivity: Connectivity) -> Self {
        Self {
            store,
            remote,
            connectivity,
        }
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn remote(&self) -> &RemoteClient {
        &self.remote
    }

    /// Runs a full sync and reports whether every stage completed.
    pub async fn full_sync(&self) -> bool {
        self.full_sync_report().await.success
    }

    /// Pulls every remote collection, then reconciles each one in turn.
    ///
    /// Stages are independent: a stage whose pull failed is skipped and the
    /// others still run. Safe to re-run at any time.
    pub async fn full_sync_report(&self) -> SyncReport {
        if !self.connectivity.is_online() {
            info!("[sync] Offline, skipping sync");
            return SyncReport::offline();
        }

        info!("[sync] Starting full sync");
        let (progress, highlights, comments, bookmarks, settings) = tokio::join!(
            self.remote.pull_all_progress(),
            self.remote.pull_all_highlights(),
            self.remote.pull_all_comments(),
            self.remote.pull_all_bookmarks(),
            self.remote.pull_all_settings(),
        );

        let mut report = SyncReport {
            progress: match progress {
                Some(rows) => self.sync_progress(rows).await,
                None => StageReport::skipped(),
            },
            highlights: match highlights {
                Some(rows) => self.sync_highlights(rows).await,
                None => StageReport::skipped(),
            },
            comments: match comments {
                Some(rows) => self.sync_comments(rows).await,
                None => StageReport::skipped(),
            },
            bookmarks: match bookmarks {
                Some(rows) => self.sync_bookmarks(rows).await,
                None => StageReport::skipped(),
            },
            settings: match settings {
                Some(rows) => self.sync_settings(rows),
                None => StageReport::skipped(),
            },
            ..SyncReport::default()
        };
        let success = report.stages().iter().all(|s| s.succeeded());
        report.success = success;

        if report.success {
            info!(
                "[sync] Full sync complete: {} adopted, {} pushed",
                report.total_adopted(),
                report.total_pushed()
            );
        } else {
            warn!("[sync] Full sync incomplete: {report:?}");
        }
        report
    }

    async fn sync_progress(&self, remote_rows: Vec<RemoteProgress>) -> StageReport {
        let mut stage = StageReport {
            ran: true,
            pulled: remote_rows.len(),
            ..StageReport::default()
        };
        let local_rows = self.store.get_all_progress();

        for remote in &remote_rows {
            let local = local_rows
                .iter()
                .find(|l| l.book_path == remote.progress.book_path);
            match reconcile_progress(local, remote) {
                ProgressAction::AdoptNew(record) | ProgressAction::AdoptRemote(record) => {
                    let saved = self.store.save_progress(
                        &record.book_path,
                        &ProgressPatch::from_record(&record),
                        Origin::SyncReplay,
                    );
                    if saved.is_some() {
                        stage.adopted += 1;
                    }
                }
                ProgressAction::PushLocal { push, local_update } => {
                    if let Some(update) = local_update {
                        if self
                            .store
                            .save_progress(
                                &update.book_path,
                                &ProgressPatch::from_record(&update),
                                Origin::SyncReplay,
                            )
                            .is_some()
                        {
                            stage.adopted += 1;
                        }
                    }
                    stage.record_push(self.remote.push_progress(&push, now_ms()).await);
                }
                ProgressAction::Unchanged => {}
            }
        }

        for local in &local_rows {
            let in_remote = remote_rows
                .iter()
                .any(|r| r.progress.book_path == local.book_path);
            if !in_remote {
                stage.record_push(self.remote.push_progress(local, now_ms()).await);
            }
        }

        debug!("[sync] progress stage: {stage:?}");
        stage
    }

    async fn sync_highlights(&self, remote_rows: Vec<Highlight>) -> StageReport {
        let mut stage = StageReport {
            ran: true,
            pulled: remote_rows.len(),
            ..StageReport::default()
        };
        let local_rows = self.store.get_highlights(None);

        for remote in missing_from(&remote_rows, &local_rows) {
            if self
                .store
                .add_highlight(NewHighlight::from(remote), Origin::SyncReplay)
                .is_some()
            {
                stage.adopted += 1;
            }
        }
        for local in missing_from(&local_rows, &remote_rows) {
            stage.record_push(self.remote.push_highlight(local).await);
        }

        debug!("[sync] highlights stage: {stage:?}");
        stage
    }

    async fn sync_comments(&self, remote_rows: Vec<Comment>) -> StageReport {
        let mut stage = StageReport {
            ran: true,
            pulled: remote_rows.len(),
            ..StageReport::default()
        };
        let local_rows = self.store.get_comments(None);

        for remote in missing_from(&remote_rows, &local_rows) {
            if self
                .store
                .add_comment(NewComment::from(remote), Origin::SyncReplay)
                .is_some()
            {
                stage.adopted += 1;
            }
        }
        for local in missing_from(&local_rows, &remote_rows) {
            stage.record_push(self.remote.push_comment(local).await);
        }

        debug!("[sync] comments stage: {stage:?}");
        stage
    }

    async fn sync_bookmarks(&self, remote_rows: Vec<Bookmark>) -> StageReport {
        let mut stage = StageReport {
            ran: true,
            pulled: remote_rows.len(),
            ..StageReport::default()
        };
        let local_rows = self.store.get_bookmarks(None);

        for remote in missing_from(&remote_rows, &local_rows) {
            if self
                .store
                .add_bookmark(NewBookmark::from(remote), Origin::SyncReplay)
                .is_some()
            {
                stage.adopted += 1;
            }
        }
        for local in missing_from(&local_rows, &remote_rows) {
            stage.record_push(self.remote.push_bookmark(local).await);
        }

        debug!("[sync] bookmarks stage: {stage:?}");
        stage
    }

    /// Local values always win; cloud values only fill keys never set here.
    fn sync_settings(&self, remote_rows: Vec<RemoteSetting>) -> StageReport {
        let mut stage = StageReport {
            ran: true,
            pulled: remote_rows.len(),
            ..StageReport::default()
        };
        for setting in remote_rows {
            if setting.value.is_null() || self.store.get_setting(&setting.key).is_some() {
                continue;
            }
            if self
                .store
                .set_setting(&setting.key, setting.value, Origin::SyncReplay)
            {
                stage.adopted += 1;
            }
        }
        stage
    }

    /// Runs a full sync every `interval` on the current runtime.
    ///
    /// The first run happens after one interval. Abort the handle to stop.
    pub fn spawn_periodic(&self, interval: Duration) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if engine.connectivity.is_online() {
                    engine.full_sync().await;
                }
            }
        })
    }
}
