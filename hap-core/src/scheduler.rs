//! A cooperative callback queue driven by an external tick loop (§2 "Task scheduler", §5).
//!
//! Nothing here spawns a thread or blocks: a host calls [`Scheduler::tick`] from its own event
//! loop (alongside transport receive/disconnect callbacks), and due callbacks run synchronously on
//! that thread, matching the single-threaded-per-transport cooperative model the rest of the core
//! assumes.

use crate::time::{Duration, Instant};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub type Callback = Box<dyn FnMut() + Send>;

struct ScheduledTask {
    due: Instant,
    period: Option<Duration>,
    callback: Callback,
}

/// Ordered by due time, soonest first; `BinaryHeap` is a max-heap so the comparison is reversed.
struct HeapEntry {
    due: Instant,
    task: ScheduledTask,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.due.cmp(&self.due)
    }
}

/// A cooperative scheduler for one-shot and periodic callbacks.
#[derive(Default)]
pub struct Scheduler {
    tasks: BinaryHeap<HeapEntry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            tasks: BinaryHeap::new(),
        }
    }

    /// Schedules a one-shot callback to run at or after `now + delay`.
    pub fn schedule_once(&mut self, now: Instant, delay: Duration, callback: Callback) {
        self.tasks.push(HeapEntry {
            due: now + delay,
            task: ScheduledTask {
                due: now + delay,
                period: None,
                callback,
            },
        });
    }

    /// Schedules a callback to run every `period`, starting at `now + period`.
    pub fn schedule_periodic(&mut self, now: Instant, period: Duration, callback: Callback) {
        self.tasks.push(HeapEntry {
            due: now + period,
            task: ScheduledTask {
                due: now + period,
                period: Some(period),
                callback,
            },
        });
    }

    /// Runs every callback due at or before `now`, rescheduling periodic ones. Callbacks run in
    /// due-time order; no callback may be re-entered while it runs (the heap is only mutated
    /// between invocations).
    pub fn tick(&mut self, now: Instant) {
        while let Some(entry) = self.tasks.peek() {
            if entry.due > now {
                break;
            }
            let mut entry = self.tasks.pop().unwrap();
            (entry.task.callback)();
            if let Some(period) = entry.task.period {
                let next_due = entry.task.due + period;
                self.tasks.push(HeapEntry {
                    due: next_due,
                    task: ScheduledTask {
                        due: next_due,
                        period: Some(period),
                        callback: entry.task.callback,
                    },
                });
            }
        }
    }

    /// The due time of the next pending task, if any — useful for a host choosing how long to
    /// sleep/poll before the next `tick`.
    pub fn next_due(&self) -> Option<Instant> {
        self.tasks.peek().map(|e| e.due)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
    use std::sync::Arc;

    #[test]
    fn runs_one_shot_once_when_due() {
        let mut scheduler = Scheduler::new();
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let t0 = Instant::from_raw_millis(0);
        scheduler.schedule_once(t0, Duration::from_millis(100), Box::new(move || {
            c.fetch_add(1, AtomicOrdering::SeqCst);
        }));

        scheduler.tick(t0 + Duration::from_millis(50));
        assert_eq!(count.load(AtomicOrdering::SeqCst), 0);

        scheduler.tick(t0 + Duration::from_millis(150));
        assert_eq!(count.load(AtomicOrdering::SeqCst), 1);

        scheduler.tick(t0 + Duration::from_millis(500));
        assert_eq!(count.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn periodic_task_reschedules() {
        let mut scheduler = Scheduler::new();
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let t0 = Instant::from_raw_millis(0);
        scheduler.schedule_periodic(t0, Duration::from_millis(10), Box::new(move || {
            c.fetch_add(1, AtomicOrdering::SeqCst);
        }));

        scheduler.tick(t0 + Duration::from_millis(35));
        assert_eq!(count.load(AtomicOrdering::SeqCst), 3);
    }

    #[test]
    fn due_tasks_run_in_order() {
        let mut scheduler = Scheduler::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let t0 = Instant::from_raw_millis(0);

        let o1 = order.clone();
        scheduler.schedule_once(t0, Duration::from_millis(20), Box::new(move || o1.lock().unwrap().push(2)));
        let o2 = order.clone();
        scheduler.schedule_once(t0, Duration::from_millis(10), Box::new(move || o2.lock().unwrap().push(1)));

        scheduler.tick(t0 + Duration::from_millis(30));
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }
}
