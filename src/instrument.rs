//! Statement counters, history and timing.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Aggregate timing, only available in verbose mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeReport {
    pub query_count: u64,
    /// Time spent in the driver, from call to rows available.
    pub sql_time: Duration,
    /// Time from call to the shaped result being returned.
    pub post_process_time: Duration,
}

impl fmt::Display for TimeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total Queries: {}", self.query_count)?;
        writeln!(f, "Total SQL Time: {:?}", self.sql_time)?;
        write!(f, "Total Post-processing Time: {:?}", self.post_process_time)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Instrumentation {
    verbose: bool,
    query_count: u64,
    sql_time: Duration,
    post_process_time: Duration,
    history: Vec<String>,
    started: Option<Instant>,
    driver_done: Option<Instant>,
}

impl Instrumentation {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            ..Self::default()
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// A statement is about to reach the driver.
    pub fn start(&mut self, sql: &str) {
        self.query_count += 1;
        if self.verbose {
            self.history.push(sql.to_string());
            self.started = Some(Instant::now());
            self.driver_done = None;
        }
    }

    /// The driver returned.
    pub fn query_end(&mut self) {
        if self.started.is_some() {
            self.driver_done = Some(Instant::now());
        }
    }

    /// The caller has its result; fold the pending timer into the totals.
    pub fn finish(&mut self) {
        if let (Some(started), Some(driver_done)) = (self.started.take(), self.driver_done.take()) {
            self.sql_time += driver_done.duration_since(started);
            self.post_process_time += started.elapsed();
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.verbose);
    }

    pub fn query_count(&self) -> u64 {
        self.query_count
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn report(&self) -> Option<TimeReport> {
        self.verbose.then_some(TimeReport {
            query_count: self.query_count,
            sql_time: self.sql_time,
            post_process_time: self.post_process_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_mode_only_counts() {
        let mut inst = Instrumentation::new(false);
        inst.start("SELECT 1");
        inst.query_end();
        inst.finish();
        assert_eq!(inst.query_count(), 1);
        assert!(inst.history().is_empty());
        assert_eq!(inst.report(), None);
    }

    #[test]
    fn verbose_mode_records_history_and_time() {
        let mut inst = Instrumentation::new(true);
        for sql in ["SELECT 1", "SELECT 2"] {
            inst.start(sql);
            inst.query_end();
            inst.finish();
        }
        assert_eq!(inst.history(), ["SELECT 1", "SELECT 2"]);
        let report = inst.report().unwrap();
        assert_eq!(report.query_count, 2);
        assert!(report.post_process_time >= report.sql_time);
    }

    #[test]
    fn reset_keeps_the_mode() {
        let mut inst = Instrumentation::new(true);
        inst.start("SELECT 1");
        inst.reset();
        assert_eq!(inst.query_count(), 0);
        assert!(inst.history().is_empty());
        assert!(inst.is_verbose());
    }
}
