//! Timer Table (TT): one active apply-deadline timer per in-flight subdoc.
//!
//! `tick()` checks for expiry *before* decrementing, preserving the original component's
//! behavior: a timer started with `timeout=5` and a 5s tick interval fires on the *second*
//! tick (10s later), not the first.

use crate::status::Status;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer {
    pub name: String,
    pub tx_id: u16,
    pub timeout_remaining: u32,
    pub running: bool,
}

/// Ordered (insertion order), at-most-one-per-name list of active timers.
#[derive(Debug, Clone, Default)]
pub struct TimerTable {
    timers: Vec<Timer>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.timers.iter().position(|t| t.name == name)
    }

    /// Replace `tx_id`/`timeout` and mark running if an entry exists; otherwise append a new
    /// one.
    pub fn start_or_update(&mut self, name: &str, tx_id: u16, timeout: u32) {
        match self.index_of(name) {
            Some(i) => {
                let timer = &mut self.timers[i];
                timer.tx_id = tx_id;
                timer.timeout_remaining = timeout;
                timer.running = true;
            }
            None => self.timers.push(Timer {
                name: name.to_string(),
                tx_id,
                timeout_remaining: timeout,
                running: true,
            }),
        }
    }

    /// Remove the timer for `name` iff it exists, is running, and `tx_id` matches. A mismatched
    /// `tx_id` means the event belongs to a stale attempt: the timer is left untouched and this
    /// returns `Status::Failure`.
    pub fn stop(&mut self, name: &str, tx_id: u16) -> Status {
        match self.index_of(name) {
            Some(i) if self.timers[i].running && self.timers[i].tx_id == tx_id => {
                self.timers.remove(i);
                Status::Success
            }
            _ => Status::Failure,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Timer> {
        self.timers.iter().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Advance every running timer by `tick_interval_s`. Returns the name of the first entry
    /// found to have `timeout_remaining == 0`, if any; only one expiry is reported per call so
    /// that the caller can synthesize and enqueue one `EXPIRE` event without interleaving with
    /// further table mutation. Remaining expiries are caught on the next tick.
    pub fn tick(&mut self, tick_interval_s: u32) -> Option<String> {
        for timer in &mut self.timers {
            if !timer.running {
                continue;
            }
            if timer.timeout_remaining == 0 {
                return Some(timer.name.clone());
            }
            timer.timeout_remaining = timer.timeout_remaining.saturating_sub(tick_interval_s);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_or_update_appends_then_replaces() {
        let mut tt = TimerTable::new();
        tt.start_or_update("wifi", 10, 30);
        assert_eq!(tt.len(), 1);
        assert_eq!(tt.get("wifi").unwrap().tx_id, 10);

        tt.start_or_update("wifi", 20, 15);
        assert_eq!(tt.len(), 1);
        let timer = tt.get("wifi").unwrap();
        assert_eq!(timer.tx_id, 20);
        assert_eq!(timer.timeout_remaining, 15);
        assert!(timer.running);
    }

    #[test]
    fn stop_with_matching_tx_id_removes_entry() {
        let mut tt = TimerTable::new();
        tt.start_or_update("wifi", 10, 30);
        assert!(tt.stop("wifi", 10).is_success());
        assert!(tt.is_empty());
    }

    #[test]
    fn stop_with_mismatched_tx_id_is_a_noop_failure() {
        let mut tt = TimerTable::new();
        tt.start_or_update("wifi", 10, 30);
        assert!(!tt.stop("wifi", 99).is_success());
        // Entry preserved - it belongs to a newer attempt.
        assert_eq!(tt.len(), 1);
        assert_eq!(tt.get("wifi").unwrap().tx_id, 10);
    }

    #[test]
    fn stop_on_absent_entry_fails() {
        let mut tt = TimerTable::new();
        assert!(!tt.stop("wifi", 10).is_success());
    }

    #[test]
    fn tick_fires_on_second_tick_not_first() {
        let mut tt = TimerTable::new();
        tt.start_or_update("wifi", 10, 5);

        // First tick: 5 -> 0, no expiry reported yet.
        assert_eq!(tt.tick(5), None);
        assert_eq!(tt.get("wifi").unwrap().timeout_remaining, 0);

        // Second tick: timeout_remaining is already 0 -> expiry reported.
        assert_eq!(tt.tick(5), Some("wifi".to_string()));
    }

    #[test]
    fn tick_only_reports_one_expiry_per_call() {
        let mut tt = TimerTable::new();
        tt.start_or_update("a", 1, 0);
        tt.start_or_update("b", 2, 0);

        let first = tt.tick(5).unwrap();
        assert!(first == "a" || first == "b");
        // Both are still present - caller is expected to reset the expired one via
        // start_or_update before the next tick.
        assert_eq!(tt.len(), 2);
    }

    #[test]
    fn empty_table_tick_is_a_noop() {
        let mut tt = TimerTable::new();
        assert_eq!(tt.tick(5), None);
        assert!(tt.is_empty());
    }
}
