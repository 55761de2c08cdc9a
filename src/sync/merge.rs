//! Pure reconciliation rules used by the full sync.

use std::collections::HashSet;

use crate::local_db_model::{Correlated, CorrelationKey, ProgressPatch, ReadingProgress};
use crate::remote::RemoteProgress;

/// What to do with one remote progress row.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressAction {
    /// No local record yet: store the remote one.
    AdoptNew(ReadingProgress),
    /// Remote is newer: store the merged record.
    AdoptRemote(ReadingProgress),
    /// Local is newer: push `push`, and store `local_update` when the remote
    /// side contributed a monotonic field the local record lacked.
    PushLocal {
        push: ReadingProgress,
        local_update: Option<ReadingProgress>,
    },
    /// Both sides already agree.
    Unchanged,
}

fn patch_from_remote(remote: &RemoteProgress) -> ProgressPatch {
    ProgressPatch {
        scroll_percent: Some(remote.progress.scroll_percent),
        scroll_top: None,
        last_read_at: Some(remote.progress.last_read_at),
        is_completed: Some(remote.progress.is_completed),
        total_read_time_ms: Some(remote.progress.total_read_time_ms),
    }
}

/// Remote wins the scroll position only when its `updated_at` is strictly
/// newer than the local `last_read_at`. Completion and the counters merge
/// monotonically either way.
pub fn reconcile_progress(local: Option<&ReadingProgress>, remote: &RemoteProgress) -> ProgressAction {
    let Some(local) = local else {
        return ProgressAction::AdoptNew(remote.progress.clone());
    };

    if remote.updated_at > local.last_read_at {
        let merged = ReadingProgress::merge(
            &local.book_path,
            Some(local),
            &patch_from_remote(remote),
            local.last_read_at,
        );
        return if merged == *local {
            ProgressAction::Unchanged
        } else {
            ProgressAction::AdoptRemote(merged)
        };
    }

    let monotonic = ProgressPatch {
        is_completed: Some(remote.progress.is_completed),
        last_read_at: Some(remote.progress.last_read_at),
        total_read_time_ms: Some(remote.progress.total_read_time_ms),
        ..ProgressPatch::default()
    };
    let merged = ReadingProgress::merge(&local.book_path, Some(local), &monotonic, local.last_read_at);
    let local_update = (merged != *local).then(|| merged.clone());
    if remote_matches(&remote.progress, &merged) {
        return match local_update {
            Some(update) => ProgressAction::AdoptRemote(update),
            None => ProgressAction::Unchanged,
        };
    }
    ProgressAction::PushLocal {
        push: merged,
        local_update,
    }
}

/// Fields the remote row carries; `scroll_top` stays on the device.
fn remote_matches(remote: &ReadingProgress, local: &ReadingProgress) -> bool {
    remote.scroll_percent == local.scroll_percent
        && remote.is_completed == local.is_completed
        && remote.last_read_at == local.last_read_at
        && remote.total_read_time_ms == local.total_read_time_ms
}

/// Items of `items` whose correlation key is absent from `others`.
///
/// Duplicate keys within `items` are reported once.
pub fn missing_from<'a, T, U>(items: &'a [T], others: &[U]) -> Vec<&'a T>
where
    T: Correlated,
    U: Correlated,
{
    let known: HashSet<CorrelationKey> = others.iter().map(Correlated::correlation_key).collect();
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| {
            let key = item.correlation_key();
            !known.contains(&key) && seen.insert(key)
        })
        .collect()
}
