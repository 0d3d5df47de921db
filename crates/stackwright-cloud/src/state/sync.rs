//! Reconciliation of two independent copies of a project state
//!
//! Last writer wins: for each lock the newer modification date is kept, for
//! the latest deploy the newer start time. Event logs are merged.

use super::{ProjectState, ProjectStateStore, StateManager};
use crate::error::Result;
use chrono::{DateTime, Utc};

/// What [`ProjectStateStore::sync`] did with the remote copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The remote copy didn't exist and was created from the local one
    Pushed,
    /// Both copies were reconciled and written back
    Reconciled,
}

/// For every lock name on either side keep the newer lock, on both sides.
///
/// On equal timestamps the local lock wins.
pub fn reconcile_locks(local: &mut ProjectState, remote: &mut ProjectState) {
    let mut names: Vec<String> = local.locks.keys().cloned().collect();
    for name in remote.locks.keys() {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }

    for name in names {
        let winner = match (local.locks.get(&name), remote.locks.get(&name)) {
            (Some(l), Some(r)) if r.last_modification_date > l.last_modification_date => r.clone(),
            (Some(l), _) => l.clone(),
            (None, Some(r)) => r.clone(),
            (None, None) => continue,
        };
        local.locks.insert(name.clone(), winner.clone());
        remote.locks.insert(name, winner);
    }
}

/// Union of both event logs, newest first, pruned; written to both sides.
pub fn merge_events(local: &mut ProjectState, remote: &mut ProjectState, now: DateTime<Utc>) {
    for event in &remote.events {
        if !local.events.contains(event) {
            local.events.push(event.clone());
        }
    }
    local.prune_events(now);
    remote.events = local.events.clone();
}

/// Adopt the newer latest-deploy snapshot on both sides.
pub fn actualize_latest_deploy(local: &mut ProjectState, remote: &mut ProjectState) {
    let remote_is_newer = match (local.latest_deploy_time(), remote.latest_deploy_time()) {
        (Some(l), Some(r)) => r > l,
        (None, Some(_)) => true,
        _ => false,
    };
    if remote_is_newer {
        local.latest_deploy = remote.latest_deploy.clone();
    } else {
        remote.latest_deploy = local.latest_deploy.clone();
    }
}

/// Full reconciliation: locks, events and the latest deploy.
pub fn reconcile(local: &mut ProjectState, remote: &mut ProjectState, now: DateTime<Utc>) {
    reconcile_locks(local, remote);
    merge_events(local, remote, now);
    actualize_latest_deploy(local, remote);
}

impl ProjectStateStore {
    /// Reconcile with a remote copy and write both files.
    pub async fn sync(&mut self, remote: &StateManager) -> Result<SyncOutcome> {
        let Some(mut remote_state) = remote.load().await? else {
            remote.save(self.state()).await?;
            tracing::info!("Pushed project state to {}", remote.path().display());
            return Ok(SyncOutcome::Pushed);
        };

        reconcile(self.state_mut(), &mut remote_state, Utc::now());
        self.save().await?;
        remote.save(&remote_state).await?;
        tracing::info!("Reconciled project state with {}", remote.path().display());
        Ok(SyncOutcome::Reconciled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Event, MODIFICATION_LOCK, WARM_UP_LOCK};
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_newer_lock_wins_on_both_sides() {
        let mut local = ProjectState::new("demo");
        let mut remote = ProjectState::new("demo");
        local.set_lock(MODIFICATION_LOCK, true, "alice", t0());
        remote.set_lock(MODIFICATION_LOCK, false, "bob", t0() + Duration::minutes(1));
        remote.set_lock(WARM_UP_LOCK, true, "bob", t0());

        reconcile_locks(&mut local, &mut remote);

        assert_eq!(local.locks, remote.locks);
        assert_eq!(local.locks[MODIFICATION_LOCK].initiator, "bob");
        assert!(!local.locks[MODIFICATION_LOCK].locked);
        assert!(local.locks[WARM_UP_LOCK].locked);
    }

    #[test]
    fn test_equal_timestamps_keep_local() {
        let mut local = ProjectState::new("demo");
        let mut remote = ProjectState::new("demo");
        local.set_lock(MODIFICATION_LOCK, true, "alice", t0());
        remote.set_lock(MODIFICATION_LOCK, false, "bob", t0());

        reconcile_locks(&mut local, &mut remote);
        assert_eq!(remote.locks[MODIFICATION_LOCK].initiator, "alice");
    }

    #[test]
    fn test_merge_events_unions_and_sorts() {
        let mut local = ProjectState::new("demo");
        let mut remote = ProjectState::new("demo");
        let shared = Event::new("build", t0());
        local.events = vec![shared.clone(), Event::new("deploy", t0() - Duration::hours(2))];
        remote.events = vec![Event::new("update", t0() + Duration::hours(1)), shared];

        merge_events(&mut local, &mut remote, t0());

        let ops: Vec<&str> = local.events.iter().map(|e| e.operation.as_str()).collect();
        assert_eq!(ops, vec!["update", "build", "deploy"]);
        assert_eq!(local.events, remote.events);
    }

    #[test]
    fn test_latest_deploy_prefers_newer() {
        let mut local = ProjectState::new("demo");
        let mut remote = ProjectState::new("demo");
        local.log_event(
            Event::new("deploy", t0()).with_field("bundle_name", "old"),
            t0(),
        );
        remote.log_event(
            Event::new("deploy", t0() + Duration::hours(1)).with_field("bundle_name", "new"),
            t0(),
        );

        actualize_latest_deploy(&mut local, &mut remote);
        assert_eq!(local.latest_deployed_bundle_name(), Some("new"));

        let mut empty = ProjectState::new("demo");
        actualize_latest_deploy(&mut local, &mut empty);
        assert_eq!(empty.latest_deployed_bundle_name(), Some("new"));
    }

    #[tokio::test]
    async fn test_sync_pushes_then_reconciles() {
        let project = tempdir().unwrap();
        let shared = tempdir().unwrap();
        let remote = StateManager::new(shared.path().join("orders").join("state.yaml"));

        let mut store = ProjectStateStore::init(project.path(), "orders")
            .await
            .unwrap()
            .with_initiator("alice");
        assert_eq!(store.sync(&remote).await.unwrap(), SyncOutcome::Pushed);
        assert!(remote.exists());

        // someone else takes the lock on the shared copy later
        let mut other = remote.load().await.unwrap().unwrap();
        other.set_lock(MODIFICATION_LOCK, true, "bob", Utc::now() + Duration::seconds(5));
        remote.save(&other).await.unwrap();

        assert_eq!(store.sync(&remote).await.unwrap(), SyncOutcome::Reconciled);
        assert!(!store.state().is_lock_free(MODIFICATION_LOCK));

        let reopened = ProjectStateStore::open(project.path()).await.unwrap();
        assert_eq!(reopened.state().locks[MODIFICATION_LOCK].initiator, "bob");
    }
}
