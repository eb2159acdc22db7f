//! In-process backend.
//!
//! Mirrors the Redis semantics the components rely on: string values with a
//! TTL, scored windows and lists. Every operation runs under one lock, which
//! makes the compound operations atomic within the process. Expiry is measured
//! with the injected [`Clock`], so tests can move time forward.

use crate::backend::{StoreBackend, StoreStats, WindowState};
use async_trait::async_trait;
use clawd_core::{system_clock, Clock, ClawdError, ClawdResult};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Window(Vec<(i64, String)>),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at_ms: Option<i64>,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    commands: i64,
}

impl State {
    fn live(&mut self, key: &str, now_ms: i64) -> Option<&mut Entry> {
        let expired = self
            .entries
            .get(key)
            .and_then(|entry| entry.expires_at_ms)
            .is_some_and(|at| at <= now_ms);
        if expired {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn list(&mut self, key: &str, now_ms: i64) -> ClawdResult<Option<&mut VecDeque<String>>> {
        match self.live(key, now_ms) {
            None => Ok(None),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(Some(list)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn list_or_insert(&mut self, key: &str, now_ms: i64) -> ClawdResult<&mut VecDeque<String>> {
        if self.live(key, now_ms).is_none() {
            self.entries.insert(
                key.to_string(),
                Entry {
                    value: Value::List(VecDeque::new()),
                    expires_at_ms: None,
                },
            );
        }
        self.list(key, now_ms)?
            .ok_or_else(|| ClawdError::internal(format!("list '{key}' vanished")))
    }

    fn window(&mut self, key: &str, now_ms: i64) -> ClawdResult<Option<&mut Entry>> {
        let Some(entry) = self.live(key, now_ms) else {
            return Ok(None);
        };
        if matches!(entry.value, Value::Window(_)) {
            Ok(Some(entry))
        } else {
            Err(wrong_type(key))
        }
    }

    /// Drops empty lists and windows, as Redis does.
    fn tidy(&mut self, key: &str) {
        let empty = match self.entries.get(key).map(|entry| &entry.value) {
            Some(Value::List(list)) => list.is_empty(),
            Some(Value::Window(members)) => members.is_empty(),
            _ => false,
        };
        if empty {
            self.entries.remove(key);
        }
    }

    fn remove_one(&mut self, key: &str, value: &str, now_ms: i64) -> ClawdResult<u64> {
        let removed = match self.list(key, now_ms)? {
            Some(list) => match list.iter().position(|item| item == value) {
                Some(index) => {
                    list.remove(index);
                    1
                }
                None => 0,
            },
            None => 0,
        };
        self.tidy(key);
        Ok(removed)
    }
}

fn wrong_type(key: &str) -> ClawdError {
    ClawdError::store(format!(
        "WRONGTYPE Operation against key '{key}' holding the wrong kind of value"
    ))
}

fn prune(members: &mut Vec<(i64, String)>, cutoff_ms: i64) {
    members.retain(|(score, _)| *score > cutoff_ms);
}

/// In-process store.
///
/// Clones share state, so every component built from one client sees the
/// same data.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    pushed: Arc<Notify>,
    clock: Arc<dyn Clock>,
    started: Instant,
}

impl MemoryStore {
    /// Creates an empty store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Creates an empty store measuring expiry with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            pushed: Arc::new(Notify::new()),
            clock,
            started: Instant::now(),
        }
    }

    fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    fn try_move(&self, source: &str, destination: &str) -> ClawdResult<Option<String>> {
        let now = self.now_ms();
        let mut state = self.state.lock();
        state.commands += 1;

        let Some(value) = state.list(source, now)?.and_then(VecDeque::pop_back) else {
            return Ok(None);
        };
        state.tidy(source);
        state.list_or_insert(destination, now)?.push_front(value.clone());
        Ok(Some(value))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn ping(&self) -> ClawdResult<()> {
        self.state.lock().commands += 1;
        Ok(())
    }

    async fn stats(&self) -> ClawdResult<StoreStats> {
        let mut state = self.state.lock();
        state.commands += 1;
        Ok(StoreStats {
            connected_clients: 1,
            used_memory_human: format!("{} keys", state.entries.len()),
            uptime_seconds: i64::try_from(self.started.elapsed().as_secs()).unwrap_or(i64::MAX),
            total_commands_processed: state.commands,
        })
    }

    async fn get(&self, key: &str) -> ClawdResult<Option<String>> {
        let now = self.now_ms();
        let mut state = self.state.lock();
        state.commands += 1;
        match state.live(key, now) {
            None => Ok(None),
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> ClawdResult<()> {
        let now = self.now_ms();
        let ttl_ms = i64::try_from(ttl_secs.max(1).saturating_mul(1000)).unwrap_or(i64::MAX);
        let mut state = self.state.lock();
        state.commands += 1;
        state.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at_ms: Some(now.saturating_add(ttl_ms)),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> ClawdResult<bool> {
        let now = self.now_ms();
        let mut state = self.state.lock();
        state.commands += 1;
        let existed = state.live(key, now).is_some();
        state.entries.remove(key);
        Ok(existed)
    }

    async fn window_admit(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        limit: u64,
        member: &str,
        ttl_secs: u64,
    ) -> ClawdResult<bool> {
        let now = self.now_ms();
        let ttl_ms = i64::try_from(ttl_secs.max(1).saturating_mul(1000)).unwrap_or(i64::MAX);
        let mut state = self.state.lock();
        state.commands += 1;

        if state.window(key, now)?.is_none() {
            state.entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Window(Vec::new()),
                    expires_at_ms: None,
                },
            );
        }

        let admitted = match state.window(key, now)? {
            Some(Entry {
                value: Value::Window(members),
                expires_at_ms,
            }) => {
                prune(members, now_ms - window_ms);
                if (members.len() as u64) < limit {
                    members.push((now_ms, member.to_string()));
                    members.sort();
                    *expires_at_ms = Some(now.saturating_add(ttl_ms));
                    true
                } else {
                    false
                }
            }
            _ => false,
        };

        state.tidy(key);
        Ok(admitted)
    }

    async fn window_state(&self, key: &str, now_ms: i64, window_ms: i64) -> ClawdResult<WindowState> {
        let now = self.now_ms();
        let mut state = self.state.lock();
        state.commands += 1;

        let snapshot = match state.window(key, now)? {
            Some(Entry {
                value: Value::Window(members),
                ..
            }) => {
                prune(members, now_ms - window_ms);
                WindowState {
                    count: members.len() as u64,
                    oldest_ms: members.first().map(|(score, _)| *score),
                }
            }
            _ => WindowState::default(),
        };

        state.tidy(key);
        Ok(snapshot)
    }

    async fn list_push(&self, key: &str, value: &str) -> ClawdResult<()> {
        let now = self.now_ms();
        {
            let mut state = self.state.lock();
            state.commands += 1;
            state.list_or_insert(key, now)?.push_front(value.to_string());
        }
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn list_move(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> ClawdResult<Option<String>> {
        if timeout.is_zero() {
            return self.try_move(source, destination);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.try_move(source, destination)? {
                return Ok(Some(value));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn list_remove(&self, key: &str, value: &str) -> ClawdResult<u64> {
        let now = self.now_ms();
        let mut state = self.state.lock();
        state.commands += 1;
        state.remove_one(key, value, now)
    }

    async fn list_remove_and_push(
        &self,
        source: &str,
        value: &str,
        destination: &str,
        entry: &str,
    ) -> ClawdResult<u64> {
        let now = self.now_ms();
        let mut state = self.state.lock();
        state.commands += 1;
        // Type-check the destination before touching the source.
        state.list(destination, now)?;
        let removed = state.remove_one(source, value, now)?;
        state.list_or_insert(destination, now)?.push_front(entry.to_string());
        Ok(removed)
    }

    async fn list_reclaim(&self, source: &str, destination: &str, value: &str) -> ClawdResult<bool> {
        let now = self.now_ms();
        let moved = {
            let mut state = self.state.lock();
            state.commands += 1;
            state.list(destination, now)?;
            if state.remove_one(source, value, now)? == 0 {
                false
            } else {
                state.list_or_insert(destination, now)?.push_back(value.to_string());
                true
            }
        };
        if moved {
            self.pushed.notify_waiters();
        }
        Ok(moved)
    }

    async fn list_len(&self, key: &str) -> ClawdResult<u64> {
        let now = self.now_ms();
        let mut state = self.state.lock();
        state.commands += 1;
        Ok(state.list(key, now)?.map_or(0, |list| list.len() as u64))
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> ClawdResult<Vec<String>> {
        let now = self.now_ms();
        let mut state = self.state.lock();
        state.commands += 1;
        let Some(list) = state.list(key, now)? else {
            return Ok(Vec::new());
        };

        let len = i64::try_from(list.len()).unwrap_or(i64::MAX);
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop {
            return Ok(Vec::new());
        }

        let skip = usize::try_from(start).unwrap_or(usize::MAX);
        let take = usize::try_from(stop - start + 1).unwrap_or(0);
        Ok(list.iter().skip(skip).take(take).cloned().collect())
    }
}
