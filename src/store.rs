use crate::error::StoreError;
use crate::types::{Event, EventBody, EventFilter, NewEvent, NewReplayAttempt, ReplayAttempt};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

pub const DEFAULT_MAX_EVENTS: usize = 100;

const SNAPSHOT_FILE: &str = "store.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    next_event_id: u64,
    next_attempt_id: u64,
    /// Oldest first. Ids and receipt times ascend together.
    events: VecDeque<Event>,
    /// Append order.
    attempts: Vec<ReplayAttempt>,
    /// Bumped on every mutation that produces a snapshot.
    #[serde(skip)]
    revision: u64,
}

impl StoreState {
    fn evict_to(&mut self, max_events: usize) -> Vec<u64> {
        let mut evicted = Vec::new();
        while self.events.len() > max_events {
            if let Some(old) = self.events.pop_front() {
                evicted.push(old.id);
            }
        }
        if !evicted.is_empty() {
            self.attempts.retain(|a| !evicted.contains(&a.event_id));
        }
        evicted
    }
}

/// Serialized store contents waiting to be written to disk.
struct Snapshot {
    revision: u64,
    content: Vec<u8>,
}

/// Bounded store of captured events and their replay attempts.
///
/// Constructed once at startup and shared by reference. Mutations are
/// serialized behind the write lock; reads share the read lock and see a
/// consistent snapshot.
///
/// With a data directory, the state is serialized while the write lock is
/// held and written to disk on the blocking pool after it is released.
/// Writes are ordered by revision; a snapshot older than one already on
/// disk is dropped.
pub struct EventStore {
    state: RwLock<StoreState>,
    max_events: usize,
    data_dir: Option<PathBuf>,
    /// Revision of the last snapshot written.
    written: Mutex<u64>,
}

impl EventStore {
    /// In-memory store holding at most `max_events` events (minimum 1).
    pub fn new(max_events: usize) -> Self {
        Self {
            state: RwLock::new(StoreState {
                next_event_id: 1,
                next_attempt_id: 1,
                ..Default::default()
            }),
            max_events: max_events.max(1),
            data_dir: None,
            written: Mutex::new(0),
        }
    }

    /// Store that snapshots to `data_dir` after every mutation.
    ///
    /// An existing snapshot is loaded; when that fails the store starts
    /// empty and the error is returned alongside it.
    pub fn with_data_dir(max_events: usize, data_dir: PathBuf) -> (Self, Option<StoreError>) {
        let mut store = Self::new(max_events);
        let loaded = load_snapshot(&data_dir);
        store.data_dir = Some(data_dir);
        match loaded {
            Ok(Some(mut state)) => {
                for event in state.events.iter_mut() {
                    event.body = EventBody::parse(event.raw_body.as_bytes());
                }
                state.next_event_id = state.next_event_id.max(1);
                state.next_attempt_id = state.next_attempt_id.max(1);
                state.evict_to(store.max_events);
                store.state = RwLock::new(state);
                (store, None)
            }
            Ok(None) => (store, None),
            Err(e) => (store, Some(e)),
        }
    }

    pub fn max_events(&self) -> usize {
        self.max_events
    }

    /// Assign id and receipt time, insert, then evict down to the cap.
    pub async fn add(&self, new: NewEvent) -> Event {
        let (event, snapshot) = {
            let mut st = self.state.write().await;
            let event = Self::insert_event(&mut st, new, self.max_events);
            (event, self.snapshot(&mut st))
        };
        self.persist(snapshot).await;
        event
    }

    fn insert_event(st: &mut StoreState, new: NewEvent, max_events: usize) -> Event {
        let event = Event {
            id: st.next_event_id,
            received_at: Utc::now(),
            provider: new.provider,
            headers: new.headers,
            body: new.body,
            raw_body: new.raw_body,
            verified: new.verified,
            verification_details: new.verification_details,
            provider_event_id: new.provider_event_id,
            event_type: new.event_type,
        };
        st.next_event_id += 1;
        st.events.push_back(event.clone());

        let evicted = st.evict_to(max_events);
        if !evicted.is_empty() {
            tracing::debug!(?evicted, "evicted events beyond retention cap");
        }
        event
    }

    /// Events newest first, filtered by provider and verification status.
    pub async fn list(&self, filter: &EventFilter) -> Vec<Event> {
        let st = self.state.read().await;
        st.events
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(self.max_events)
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: u64) -> Option<Event> {
        let st = self.state.read().await;
        st.events.iter().find(|e| e.id == id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.state.read().await.events.len()
    }

    /// Remove every event along with its replay attempts. Returns the
    /// number of events removed.
    pub async fn clear_all(&self) -> usize {
        let (removed, snapshot) = {
            let mut st = self.state.write().await;
            let removed = st.events.len();
            st.events.clear();
            st.attempts.clear();
            (removed, self.snapshot(&mut st))
        };
        self.persist(snapshot).await;
        removed
    }

    pub async fn add_replay_attempt(&self, new: NewReplayAttempt) -> ReplayAttempt {
        let (attempt, snapshot) = {
            let mut st = self.state.write().await;
            let attempt = ReplayAttempt {
                id: st.next_attempt_id,
                event_id: new.event_id,
                target_url: new.target_url,
                status_code: new.status_code,
                response_body: new.response_body,
                success: new.success,
                error: new.error,
                replayed_at: Utc::now(),
            };
            st.next_attempt_id += 1;
            st.attempts.push(attempt.clone());
            (attempt, self.snapshot(&mut st))
        };
        self.persist(snapshot).await;
        attempt
    }

    /// Attempts for `event_id`, newest first. The event need not still exist.
    pub async fn list_replay_attempts(&self, event_id: u64) -> Vec<ReplayAttempt> {
        let st = self.state.read().await;
        let mut attempts: Vec<ReplayAttempt> = st
            .attempts
            .iter()
            .filter(|a| a.event_id == event_id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.replayed_at.cmp(&a.replayed_at).then(b.id.cmp(&a.id)));
        attempts
    }

    /// Serialize the state for writing. Called with the write lock held.
    fn snapshot(&self, st: &mut StoreState) -> Option<Snapshot> {
        self.data_dir.as_ref()?;
        st.revision += 1;
        match serde_json::to_vec_pretty(&*st) {
            Ok(content) => Some(Snapshot { revision: st.revision, content }),
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize store snapshot");
                None
            }
        }
    }

    async fn persist(&self, snapshot: Option<Snapshot>) {
        let (Some(dir), Some(snapshot)) = (self.data_dir.clone(), snapshot) else {
            return;
        };
        let Snapshot { revision, content } = snapshot;
        let mut written = self.written.lock().await;
        if revision <= *written {
            return;
        }

        let target = dir.clone();
        let result = tokio::task::spawn_blocking(move || save_snapshot(&target, &content)).await;
        match result {
            Ok(Ok(())) => *written = revision,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, dir = %dir.display(), "failed to write store snapshot");
            }
            Err(e) => tracing::warn!(error = %e, "store snapshot task failed"),
        }
    }
}

fn load_snapshot(dir: &Path) -> Result<Option<StoreState>, StoreError> {
    let path = dir.join(SNAPSHOT_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

fn save_snapshot(dir: &Path, content: &[u8]) -> Result<(), StoreError> {
    std::fs::create_dir_all(dir)?;
    let tmp = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, dir.join(SNAPSHOT_FILE))?;
    Ok(())
}
