//! Blocking work queue with outstanding-task accounting.
//!
//! Uses `Mutex + Condvar` from std. Completion is tracked separately from
//! queue length: a task stays outstanding from `push` until its `task_done`,
//! which lets the coordinator `join` on "all work finished" rather than
//! "queue momentarily empty".

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::shutdown::{CancelToken, POLL_INTERVAL};

struct State<T> {
    items: VecDeque<T>,
    outstanding: usize,
    closed: bool,
}

/// Multi-producer multi-consumer queue distributing tasks to workers.
pub struct WorkQueue<T> {
    state: Mutex<State<T>>,
    available: Condvar,
    drained: Condvar,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                outstanding: 0,
                closed: false,
            }),
            available: Condvar::new(),
            drained: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // State stays consistent across a panicking holder: every mutation is a single step
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a new task; it counts as outstanding until `task_done`
    pub fn push(&self, item: T) {
        let mut state = self.lock();
        state.items.push_back(item);
        state.outstanding += 1;
        self.available.notify_one();
    }

    /// Put a taken task back without completing it.
    ///
    /// The outstanding claim of the original take moves to the re-added task,
    /// so the caller must not call `task_done` for the failed attempt.
    pub fn requeue(&self, item: T) {
        let mut state = self.lock();
        state.items.push_back(item);
        self.available.notify_one();
    }

    /// Block until a task is available.
    ///
    /// Returns `None` once the queue is closed and empty, or when `cancel` fires.
    pub fn take(&self, cancel: &CancelToken) -> Option<T> {
        let mut state = self.lock();
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self
                .available
                .wait_timeout(state, POLL_INTERVAL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Mark one taken task as finished
    pub fn task_done(&self) {
        let mut state = self.lock();
        debug_assert!(state.outstanding > 0, "task_done called too many times");
        state.outstanding = state.outstanding.saturating_sub(1);
        if state.outstanding == 0 {
            self.drained.notify_all();
        }
    }

    /// Block until every pushed task has been marked done.
    ///
    /// Returns `false` if `cancel` fired first.
    pub fn join(&self, cancel: &CancelToken) -> bool {
        let mut state = self.lock();
        loop {
            if state.outstanding == 0 {
                return true;
            }
            if cancel.is_cancelled() {
                return false;
            }
            state = self
                .drained
                .wait_timeout(state, POLL_INTERVAL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Stop handing out work once the queue runs empty; wakes all blocked takers
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.available.notify_all();
    }

    /// Tasks waiting to be taken
    pub fn pending(&self) -> usize {
        self.lock().items.len()
    }

    /// Tasks pushed but not yet marked done (queued + in flight)
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }
}
