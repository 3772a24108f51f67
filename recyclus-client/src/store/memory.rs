//! In-process implementation of the job store
//!
//! Mirrors the Redis layout (lists pushed at the head, popped at the tail)
//! behind a single mutex, so every operation is atomic. Used for tests and
//! local dry runs.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

use super::{JobStore, Queue};
use crate::error::{StoreError, StoreResult};

#[derive(Default)]
struct State {
    lists: HashMap<Queue, VecDeque<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

/// In-memory job store
pub struct MemoryStore {
    state: Mutex<State>,
    submitted: Notify,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            submitted: Notify::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Stores a job's fields and pushes its key onto the submit list
    pub fn submit(&self, key: &str, values: &[(&str, &str)]) {
        {
            let mut state = self.state.lock().unwrap();
            let hash = state.hashes.entry(key.to_string()).or_default();
            for (name, value) in values {
                hash.insert(name.to_string(), value.to_string());
            }
            state
                .lists
                .entry(Queue::Submit)
                .or_default()
                .push_front(key.to_string());
        }
        self.submitted.notify_waiters();
    }

    /// Snapshot of a whole hash
    pub fn hash(&self, key: &str) -> HashMap<String, String> {
        let state = self.state.lock().unwrap();
        state.hashes.get(key).cloned().unwrap_or_default()
    }

    /// Simulates the store going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn try_claim(&self) -> Option<String> {
        let mut state = self.state.lock().unwrap();
        let key = state.lists.entry(Queue::Submit).or_default().pop_back()?;
        state
            .lists
            .entry(Queue::Running)
            .or_default()
            .push_front(key.clone());
        Some(key)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn claim(&self) -> StoreResult<String> {
        loop {
            self.check_available()?;

            // Register interest before looking, so a submit in between is not lost
            let submitted = self.submitted.notified();
            if let Some(key) = self.try_claim() {
                return Ok(key);
            }
            submitted.await;
        }
    }

    async fn get_field(&self, key: &str, name: &str) -> StoreResult<Option<String>> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        Ok(state.hashes.get(key).and_then(|h| h.get(name)).cloned())
    }

    async fn get_fields(&self, key: &str, names: &[&str]) -> StoreResult<HashMap<String, String>> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        let Some(hash) = state.hashes.get(key) else {
            return Ok(HashMap::new());
        };
        Ok(names
            .iter()
            .filter_map(|name| hash.get(*name).map(|v| (name.to_string(), v.clone())))
            .collect())
    }

    async fn set_field(&self, key: &str, name: &str, value: &str) -> StoreResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        state
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn set_fields(&self, key: &str, values: &[(String, String)]) -> StoreResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        let hash = state.hashes.entry(key.to_string()).or_default();
        for (name, value) in values {
            hash.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    async fn requeue_to_done(&self, key: &str) -> StoreResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        let running = state.lists.entry(Queue::Running).or_default();
        if let Some(pos) = running.iter().position(|k| k == key) {
            running.remove(pos);
        }
        state
            .lists
            .entry(Queue::Done)
            .or_default()
            .push_front(key.to_string());
        Ok(())
    }

    async fn list(&self, queue: Queue) -> StoreResult<Vec<String>> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .lists
            .get(&queue)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default())
    }
}
