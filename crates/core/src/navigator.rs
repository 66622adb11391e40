//! Time-ordered navigation over a thread list.
//!
//! [`ThreadNavigator`] is a throwaway view: build it from the current threads
//! and selection, ask it a question, drop it. It never caches anything, so it
//! cannot drift from the data it was built from.

use crate::review::Thread;
use crate::types::{EntityId, Seconds};

/// Where the video should seek to after a navigation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekTarget {
    pub thread_id: EntityId,
    pub time: Seconds,
}

/// Threads sorted by ascending `t_start`; ties keep their input order.
pub fn sort_by_time(threads: &[Thread]) -> Vec<&Thread> {
    let mut order: Vec<&Thread> = threads.iter().collect();
    order.sort_by(|a, b| a.t_start.total_cmp(&b.t_start));
    order
}

pub struct ThreadNavigator<'a> {
    order: Vec<&'a Thread>,
    current: Option<usize>,
}

impl<'a> ThreadNavigator<'a> {
    pub fn new(threads: &'a [Thread], selected: Option<EntityId>) -> Self {
        let order = sort_by_time(threads);
        let current = selected.and_then(|id| order.iter().position(|t| t.id == id));
        Self { order, current }
    }

    pub fn order(&self) -> &[&'a Thread] {
        &self.order
    }

    /// Position of the selected thread in time order; `None` when nothing is
    /// selected or the selection is not among the threads.
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn has_previous(&self) -> bool {
        self.current.is_some_and(|i| i > 0)
    }

    pub fn has_next(&self) -> bool {
        self.current.is_some_and(|i| i + 1 < self.order.len())
    }

    pub fn previous(&self) -> Option<SeekTarget> {
        if !self.has_previous() {
            return None;
        }
        self.current.map(|i| target(self.order[i - 1]))
    }

    pub fn next(&self) -> Option<SeekTarget> {
        if !self.has_next() {
            return None;
        }
        self.current.map(|i| target(self.order[i + 1]))
    }
}

fn target(thread: &Thread) -> SeekTarget {
    SeekTarget {
        thread_id: thread.id,
        time: thread.t_start,
    }
}

/// Render a playback position as `m:ss`.
pub fn format_time(seconds: Seconds) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}
