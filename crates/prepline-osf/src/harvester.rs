//! Harvester: drives the API client across day windows
//!
//! Each window is fetched page by page, oldest day first. Every record is
//! written to the Raw Store and tracked in `raw_data` as soon as its page
//! arrives, so a later failure never loses earlier pages. A window becomes
//! `complete` only once the API reports no further pages; a failed page
//! leaves it `partial` (or `failed` if nothing was fetched) and the run
//! moves on. Several windows in a row failing on connectivity is treated
//! as an outage and ends the run.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate, Utc};
use prepline_core::{FetchError, ProgressContext, WorkQueue, fmt_num, is_shutdown_requested};
use prepline_store::{
    Db, RawRecord, RawStore, StorageError, WindowStatus, WindowUpdate, now_timestamp,
};

use crate::client::{Cursor, DateRange, PageSource};
use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::summary::{HarvestSummary, WindowOutcome};

pub struct Harvester<'a, S: PageSource> {
    source: &'a S,
    db: &'a Db,
    raw: &'a RawStore,
    config: &'a HarvestConfig,
    progress: &'a ProgressContext,
    today: NaiveDate,
}

/// One window attempt plus the fetch error that ended it, if any.
struct WindowRun {
    outcome: WindowOutcome,
    fetch_error: Option<FetchError>,
    interrupted: bool,
}

/// Shared between workers of one run.
struct RunState {
    summary: HarvestSummary,
    consecutive_failures: usize,
    abort: Option<HarvestError>,
}

impl<'a, S: PageSource> Harvester<'a, S> {
    pub fn new(
        source: &'a S,
        db: &'a Db,
        raw: &'a RawStore,
        config: &'a HarvestConfig,
        progress: &'a ProgressContext,
    ) -> Self {
        Self {
            source,
            db,
            raw,
            config,
            progress,
            today: Utc::now().date_naive(),
        }
    }

    /// Override the current UTC day (the one window never marked complete).
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn db(&self) -> &Db {
        self.db
    }

    pub fn provider(&self) -> &str {
        &self.config.provider
    }

    /// Day after the latest complete window (or `start_date`) through today.
    ///
    /// `None` when that start lies after today.
    pub fn default_range(&self) -> Result<Option<DateRange>, StorageError> {
        let start = match self.db.latest_complete_window(&self.config.provider)? {
            Some(last) => last
                .checked_add_days(Days::new(1))
                .unwrap_or(last)
                .max(self.config.start_date),
            None => self.config.start_date,
        };
        Ok(DateRange::new(start, self.today).ok())
    }

    /// Harvest every not-yet-complete window in `range` (default range when
    /// `None`). Days after today are dropped.
    pub fn harvest_range(&self, range: Option<DateRange>) -> Result<HarvestSummary, HarvestError> {
        let range = match range {
            Some(r) => r.clamp_end(self.today),
            None => self.default_range()?,
        };
        let Some(range) = range else {
            log::info!("{}: nothing to harvest, already up to date", self.config.provider);
            return Ok(HarvestSummary::new(&self.config.provider));
        };

        let complete: Vec<NaiveDate> = self
            .db
            .windows_in_range(&self.config.provider, range.start(), range.end())?
            .into_iter()
            .filter(|w| w.status.is_complete())
            .map(|w| w.date)
            .collect();
        let days: Vec<NaiveDate> = range.days().filter(|d| !complete.contains(d)).collect();

        log::info!(
            "{}: harvesting {} ({} windows, {} already complete)",
            self.config.provider,
            range,
            days.len(),
            complete.len()
        );
        let mut summary = self.harvest_windows(days)?;
        summary.windows_skipped = complete.len();
        Ok(summary)
    }

    /// Harvest exactly these windows, oldest first, whatever their status.
    pub fn harvest_windows(&self, mut days: Vec<NaiveDate>) -> Result<HarvestSummary, HarvestError> {
        let started = Instant::now();
        days.sort_unstable();
        days.dedup();

        let queue = WorkQueue::new(days);
        let bar = self.progress.count_bar("harvest", queue.total() as u64);
        let state = Mutex::new(RunState {
            summary: HarvestSummary::new(&self.config.provider),
            consecutive_failures: 0,
            abort: None,
        });

        let work = || {
            while let Some(&day) = queue.next() {
                if is_shutdown_requested() {
                    lock(&state).summary.interrupted = true;
                    queue.stop();
                    break;
                }
                let result = self.run_window(day);
                bar.inc(1);
                let mut st = lock(&state);
                match result {
                    Ok(run) => {
                        if run.interrupted {
                            st.summary.interrupted = true;
                            queue.stop();
                        }
                        if self.record_run(&mut st, run) {
                            queue.stop();
                        }
                    }
                    Err(e) => {
                        log::error!("{} {day}: storage failure: {e}", self.config.provider);
                        st.abort.get_or_insert(HarvestError::Storage(e));
                        queue.stop();
                    }
                }
            }
        };

        let workers = self.config.workers.max(1);
        if workers == 1 {
            work();
        } else {
            rayon::scope(|s| {
                for _ in 0..workers {
                    s.spawn(|_| work());
                }
            });
        }
        bar.finish_and_clear();

        let RunState {
            mut summary,
            consecutive_failures,
            abort,
        } = state.into_inner().unwrap_or_else(|e| e.into_inner());
        summary.elapsed = started.elapsed();

        match abort {
            Some(HarvestError::SystemicOutage { last_error, .. }) => {
                Err(HarvestError::SystemicOutage {
                    consecutive_failures,
                    last_error,
                    summary: Box::new(summary),
                })
            }
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Fold one window into the run state. Returns true when the run must stop.
    fn record_run(&self, st: &mut RunState, run: WindowRun) -> bool {
        st.summary.add(&run.outcome);
        let Some(err) = run.fetch_error else {
            if !run.interrupted {
                st.consecutive_failures = 0;
            }
            return false;
        };

        if err.is_rate_limited() {
            log::warn!(
                "{}: rate limited, cooling down for {:?}",
                self.config.provider,
                self.config.rate_limit_cooldown
            );
            cooldown(self.config.rate_limit_cooldown);
        }
        if !err.is_connectivity() {
            return false;
        }

        st.consecutive_failures += 1;
        if st.consecutive_failures < self.config.max_consecutive_failures.max(1) {
            return false;
        }
        log::error!(
            "{}: {} consecutive windows failed, last error: {err}",
            self.config.provider,
            st.consecutive_failures
        );
        if st.abort.is_none() {
            st.abort = Some(HarvestError::SystemicOutage {
                consecutive_failures: st.consecutive_failures,
                last_error: err,
                summary: Box::default(),
            });
        }
        true
    }

    /// Harvest one window from its first page.
    pub fn harvest_window(&self, day: NaiveDate) -> Result<WindowOutcome, StorageError> {
        self.run_window(day).map(|run| run.outcome)
    }

    fn run_window(&self, day: NaiveDate) -> Result<WindowRun, StorageError> {
        let provider = self.config.provider.as_str();
        let range = DateRange::single(day);
        let attempted_at = now_timestamp();
        self.db.begin_window(provider, day, &attempted_at)?;

        let pb = self.progress.stage_line(&day.to_string());
        let mut cursor: Option<Cursor> = None;
        let mut pages = 0usize;
        let mut records = 0usize;
        let mut interrupted = false;

        let (status, fetch_error) = loop {
            if is_shutdown_requested() {
                interrupted = true;
                let status = if pages > 0 {
                    WindowStatus::Partial
                } else {
                    WindowStatus::Pending
                };
                break (status, None);
            }

            let page = match self.source.fetch_page(provider, &range, cursor.as_ref()) {
                Ok(page) => page,
                Err(e) => {
                    log::error!(
                        "{provider} {day}: page {} failed{}: {e}",
                        pages + 1,
                        e.status().map(|s| format!(" (HTTP {s})")).unwrap_or_default()
                    );
                    let status = if pages > 0 {
                        WindowStatus::Partial
                    } else {
                        WindowStatus::Failed
                    };
                    break (status, Some(e));
                }
            };

            let fetched_at = Utc::now();
            let mut stored = Vec::with_capacity(page.records.len());
            for record in &page.records {
                stored.push(self.raw.write(&RawRecord {
                    record_id: &record.id,
                    provider,
                    window_date: day,
                    fetched_at,
                    payload: &record.body,
                })?);
            }
            self.db.track_raw(&stored)?;

            pages += 1;
            records += stored.len();
            pb.set_message(format!("page {pages}, {} records", fmt_num(records)));
            log::debug!("{provider} {day}: page {pages} stored {} records", stored.len());

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                // More records can still appear today
                None if day >= self.today => break (WindowStatus::Pending, None),
                None => break (WindowStatus::Complete, None),
            }
        };
        pb.finish_and_clear();

        let error = if interrupted {
            Some("interrupted".to_string())
        } else {
            fetch_error.as_ref().map(ToString::to_string)
        };
        // Interrupted before any page: keep whatever status it had
        if !(interrupted && pages == 0) {
            self.db.finish_window(
                provider,
                day,
                &WindowUpdate {
                    status,
                    record_count: records,
                    pages,
                    attempted_at: &attempted_at,
                    error: error.as_deref(),
                },
            )?;
        }

        match status {
            WindowStatus::Complete | WindowStatus::Pending => {
                if !self.progress.is_tty() && !interrupted {
                    log::info!(
                        "{provider} {day}: {} records in {pages} pages [{status}]",
                        fmt_num(records)
                    );
                }
            }
            WindowStatus::Partial | WindowStatus::Failed => log::warn!(
                "{provider} {day}: left {status} after {pages} pages, {} records",
                fmt_num(records)
            ),
        }

        Ok(WindowRun {
            outcome: WindowOutcome {
                date: day,
                status,
                records,
                pages,
                error,
            },
            fetch_error,
            interrupted,
        })
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Sleep in short steps so a shutdown request is not held up.
fn cooldown(total: Duration) {
    let step = Duration::from_millis(250);
    let deadline = Instant::now() + total;
    while !is_shutdown_requested() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(step.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ApiRecord, Page};
    use serde_json::json;
    use std::collections::HashMap;

    /// Serves fixed page sizes per day, optionally failing some pages.
    struct FakeSource {
        pages: HashMap<NaiveDate, Vec<usize>>,
        fail: HashMap<(NaiveDate, usize), u16>,
    }

    impl PageSource for FakeSource {
        fn fetch_page(
            &self,
            _provider: &str,
            range: &DateRange,
            cursor: Option<&Cursor>,
        ) -> Result<Page, FetchError> {
            let day = range.start();
            let idx: usize = cursor.map_or(0, |c| c.as_str().parse().unwrap());
            if let Some(&status) = self.fail.get(&(day, idx)) {
                return Err(FetchError::Http {
                    status: Some(status),
                    message: "scripted".into(),
                });
            }
            let sizes = self.pages.get(&day).cloned().unwrap_or_default();
            let n = sizes.get(idx).copied().unwrap_or(0);
            Ok(Page {
                records: (0..n)
                    .map(|i| ApiRecord {
                        id: format!("{day}-{idx}-{i}"),
                        body: json!({"id": format!("{day}-{idx}-{i}"), "attributes": {}}),
                    })
                    .collect(),
                next_cursor: (idx + 1 < sizes.len()).then(|| Cursor((idx + 1).to_string())),
            })
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn config() -> HarvestConfig {
        HarvestConfig {
            provider: "example".into(),
            start_date: d(1),
            rate_limit_cooldown: Duration::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn complete_window_after_last_page() {
        let dir = tempfile::tempdir().unwrap();
        let raw = RawStore::open(dir.path()).unwrap();
        let db = Db::in_memory().unwrap();
        let source = FakeSource {
            pages: HashMap::from([(d(1), vec![3, 2])]),
            fail: HashMap::new(),
        };
        let cfg = config();
        let progress = ProgressContext::hidden();
        let h = Harvester::new(&source, &db, &raw, &cfg, &progress).with_today(d(10));

        let outcome = h.harvest_window(d(1)).unwrap();
        assert_eq!(outcome.status, WindowStatus::Complete);
        assert_eq!(outcome.records, 5);
        assert_eq!(outcome.pages, 2);
        assert_eq!(raw.list_day("example", d(1)).unwrap().len(), 5);
        assert_eq!(db.window("example", d(1)).unwrap().unwrap().status, WindowStatus::Complete);
    }

    #[test]
    fn failed_second_page_is_partial() {
        let dir = tempfile::tempdir().unwrap();
        let raw = RawStore::open(dir.path()).unwrap();
        let db = Db::in_memory().unwrap();
        let source = FakeSource {
            pages: HashMap::from([(d(1), vec![3, 2])]),
            fail: HashMap::from([((d(1), 1), 503)]),
        };
        let cfg = config();
        let progress = ProgressContext::hidden();
        let h = Harvester::new(&source, &db, &raw, &cfg, &progress).with_today(d(10));

        let outcome = h.harvest_window(d(1)).unwrap();
        assert_eq!(outcome.status, WindowStatus::Partial);
        assert_eq!(outcome.records, 3);
        let stored = db.window("example", d(1)).unwrap().unwrap();
        assert_eq!(stored.status, WindowStatus::Partial);
        assert!(stored.last_error.unwrap().contains("503"));
    }

    #[test]
    fn today_stays_pending() {
        let dir = tempfile::tempdir().unwrap();
        let raw = RawStore::open(dir.path()).unwrap();
        let db = Db::in_memory().unwrap();
        let source = FakeSource {
            pages: HashMap::from([(d(5), vec![1])]),
            fail: HashMap::new(),
        };
        let cfg = config();
        let progress = ProgressContext::hidden();
        let h = Harvester::new(&source, &db, &raw, &cfg, &progress).with_today(d(5));

        assert_eq!(h.harvest_window(d(5)).unwrap().status, WindowStatus::Pending);
    }

    #[test]
    fn default_range_resumes_after_latest_complete() {
        let dir = tempfile::tempdir().unwrap();
        let raw = RawStore::open(dir.path()).unwrap();
        let db = Db::in_memory().unwrap();
        let source = FakeSource {
            pages: HashMap::new(),
            fail: HashMap::new(),
        };
        let cfg = config();
        let progress = ProgressContext::hidden();
        let h = Harvester::new(&source, &db, &raw, &cfg, &progress).with_today(d(4));

        assert_eq!(h.default_range().unwrap().unwrap(), DateRange::new(d(1), d(4)).unwrap());
        h.harvest_window(d(2)).unwrap();
        assert_eq!(h.default_range().unwrap().unwrap(), DateRange::new(d(3), d(4)).unwrap());
    }

    #[test]
    fn range_skips_complete_windows() {
        let dir = tempfile::tempdir().unwrap();
        let raw = RawStore::open(dir.path()).unwrap();
        let db = Db::in_memory().unwrap();
        let source = FakeSource {
            pages: HashMap::from([(d(1), vec![2]), (d(2), vec![1])]),
            fail: HashMap::new(),
        };
        let cfg = config();
        let progress = ProgressContext::hidden();
        let h = Harvester::new(&source, &db, &raw, &cfg, &progress).with_today(d(10));

        h.harvest_window(d(1)).unwrap();
        let range = DateRange::new(d(1), d(2)).unwrap();
        let summary = h.harvest_range(Some(range)).unwrap();
        assert_eq!(summary.windows_skipped, 1);
        assert_eq!(summary.windows_attempted, 1);
        assert_eq!(summary.records_written, 1);
    }

    #[test]
    fn consecutive_failures_abort() {
        let dir = tempfile::tempdir().unwrap();
        let raw = RawStore::open(dir.path()).unwrap();
        let db = Db::in_memory().unwrap();
        let fail = (1..=9).map(|day| ((d(day), 0), 503)).collect();
        let source = FakeSource {
            pages: HashMap::new(),
            fail,
        };
        let cfg = config();
        let progress = ProgressContext::hidden();
        let h = Harvester::new(&source, &db, &raw, &cfg, &progress).with_today(d(20));

        let err = h.harvest_windows((1..=9).map(d).collect()).unwrap_err();
        match err {
            HarvestError::SystemicOutage {
                consecutive_failures,
                summary,
                ..
            } => {
                assert_eq!(consecutive_failures, 3);
                assert_eq!(summary.failed, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(db.window("example", d(4)).unwrap().is_none());
    }

    #[test]
    fn decode_errors_do_not_count_as_outage() {
        struct Garbled;
        impl PageSource for Garbled {
            fn fetch_page(&self, _: &str, _: &DateRange, _: Option<&Cursor>) -> Result<Page, FetchError> {
                Err(FetchError::Decode("missing `data` array".into()))
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let raw = RawStore::open(dir.path()).unwrap();
        let db = Db::in_memory().unwrap();
        let cfg = config();
        let progress = ProgressContext::hidden();
        let h = Harvester::new(&Garbled, &db, &raw, &cfg, &progress).with_today(d(20));

        let summary = h.harvest_windows((1..=5).map(d).collect()).unwrap();
        assert_eq!(summary.failed, 5);
        assert_eq!(summary.unresolved_count(), 5);
    }
}
