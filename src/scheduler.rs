//! Bounded page-parallel scheduling.
//!
//! Page futures are driven through `buffer_unordered(workers)`: at most
//! `workers` pages are in flight and they complete in whatever order their
//! tools finish. A job is *dispatched* when the buffer first polls it; at
//! that moment it checks the shared halt flag, so after a failure under an
//! aborting policy no new page starts any tool.
//!
//! What happens to pages already in flight depends on the
//! [`FailurePolicy`]: `Drain` keeps polling them to completion, `FailFast`
//! drops them, which kills their child processes.

use crate::config::FailurePolicy;
use crate::error::PageError;
use crate::output::{PageJob, PageResult};
use crate::pipeline::converter::PageConverter;
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What the scheduler observed for every job of a run.
#[derive(Debug, Default)]
pub struct ScheduleReport {
    /// Pages that reached `TextExtracted`, in completion order.
    pub completed: Vec<PageResult>,
    /// Failed pages, in completion order. The first entry is the run's failure.
    pub failed: Vec<PageError>,
    /// Pages never started (halted dispatch) or cancelled in flight, ascending.
    pub not_dispatched: Vec<u32>,
}

impl ScheduleReport {
    pub fn first_failure(&self) -> Option<&PageError> {
        self.failed.first()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.not_dispatched.is_empty()
    }
}

enum JobOutcome {
    Done(PageResult),
    Failed(PageError),
    Skipped,
}

/// Fixed-size pool of page workers.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    workers: usize,
    policy: FailurePolicy,
}

impl Scheduler {
    pub fn new(workers: usize, policy: FailurePolicy) -> Self {
        Self {
            workers: workers.max(1),
            policy,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every job through `converter` and report the outcome of each.
    ///
    /// Returns once no job is running.
    pub async fn run(
        &self,
        jobs: Vec<PageJob>,
        converter: Arc<dyn PageConverter>,
        progress: Option<ProgressCallback>,
    ) -> ScheduleReport {
        let total = jobs.len();
        let pages: Vec<u32> = jobs.iter().map(|j| j.page).collect();
        let halted = Arc::new(AtomicBool::new(false));
        let halts = self.policy.halts_dispatch();

        info!("Scheduling {} pages on {} workers", total, self.workers);

        let mut in_flight = stream::iter(jobs.into_iter().map(|job| {
            let converter = Arc::clone(&converter);
            let halted = Arc::clone(&halted);
            let progress = progress.clone();
            async move {
                if halted.load(Ordering::SeqCst) {
                    debug!("page {}: not dispatched", job.page);
                    return JobOutcome::Skipped;
                }
                if let Some(cb) = &progress {
                    cb.on_page_start(job.page, total);
                }
                match converter.convert_page(&job).await {
                    Ok(result) => {
                        if let Some(cb) = &progress {
                            cb.on_page_complete(result.page_num, total, result.text_bytes);
                        }
                        JobOutcome::Done(result)
                    }
                    Err(e) => {
                        if halts {
                            halted.store(true, Ordering::SeqCst);
                        }
                        if let Some(cb) = &progress {
                            cb.on_page_error(job.page, total, &e.to_string());
                        }
                        JobOutcome::Failed(e)
                    }
                }
            }
        }))
        .buffer_unordered(self.workers);

        let mut report = ScheduleReport::default();
        while let Some(outcome) = in_flight.next().await {
            match outcome {
                JobOutcome::Done(result) => report.completed.push(result),
                JobOutcome::Skipped => {}
                JobOutcome::Failed(e) => {
                    if report.failed.is_empty() && halts {
                        error!("{}", e);
                    } else {
                        warn!("{}", e);
                    }
                    report.failed.push(e);
                    if self.policy == FailurePolicy::FailFast {
                        break;
                    }
                }
            }
        }
        // Dropping the stream cancels whatever FailFast left in flight.
        drop(in_flight);

        let finished: BTreeSet<u32> = report
            .completed
            .iter()
            .map(|r| r.page_num)
            .chain(report.failed.iter().map(PageError::page))
            .collect();
        report.not_dispatched = pages
            .into_iter()
            .filter(|p| !finished.contains(p))
            .collect();
        report.not_dispatched.sort_unstable();

        info!(
            "Scheduler finished: {} completed, {} failed, {} not dispatched",
            report.completed.len(),
            report.failed.len(),
            report.not_dispatched.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Stage;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Converter whose page cost shrinks as the page number grows, so later
    /// pages finish first.
    #[derive(Default)]
    struct FakeConverter {
        fail_page: Option<u32>,
        running: AtomicUsize,
        peak: AtomicUsize,
        started: Mutex<Vec<u32>>,
    }

    impl FakeConverter {
        fn failing_on(page: u32) -> Self {
            Self {
                fail_page: Some(page),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl PageConverter for FakeConverter {
        async fn convert_page(&self, job: &PageJob) -> Result<PageResult, PageError> {
            self.started.lock().unwrap().push(job.page);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let delay = 5 * (20u64.saturating_sub(job.page as u64)).max(1);
            tokio::time::sleep(Duration::from_millis(delay)).await;

            self.running.fetch_sub(1, Ordering::SeqCst);
            if Some(job.page) == self.fail_page {
                return Err(PageError::StageFailed {
                    page: job.page,
                    stage: Stage::Ocr,
                    detail: "injected".into(),
                });
            }
            Ok(PageResult {
                page_num: job.page,
                text_path: PathBuf::from(format!("page-{}.txt", job.page)),
                text_bytes: 1,
                duration_ms: delay,
            })
        }
    }

    fn jobs(first: u32, last: u32) -> Vec<PageJob> {
        PageJob::for_range(Arc::new(PathBuf::from("doc.pdf")), first, last)
    }

    #[tokio::test]
    async fn every_page_completes_exactly_once() {
        for workers in [1, 2, 8] {
            let converter = Arc::new(FakeConverter::default());
            let report = Scheduler::new(workers, FailurePolicy::Drain)
                .run(jobs(1, 10), converter, None)
                .await;
            let mut pages: Vec<u32> = report.completed.iter().map(|r| r.page_num).collect();
            pages.sort_unstable();
            assert_eq!(pages, (1..=10).collect::<Vec<_>>(), "workers={workers}");
            assert!(report.is_success());
        }
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_workers() {
        let converter = Arc::new(FakeConverter::default());
        Scheduler::new(3, FailurePolicy::Drain)
            .run(jobs(1, 12), converter.clone(), None)
            .await;
        let peak = converter.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {peak}");
        assert!(peak >= 2, "pages never overlapped");
    }

    #[tokio::test]
    async fn completion_order_is_not_page_order() {
        let converter = Arc::new(FakeConverter::default());
        let report = Scheduler::new(4, FailurePolicy::Drain)
            .run(jobs(1, 4), converter, None)
            .await;
        let order: Vec<u32> = report.completed.iter().map(|r| r.page_num).collect();
        assert_eq!(order, vec![4, 3, 2, 1]);
    }

    #[tokio::test]
    async fn drain_waits_for_in_flight_and_stops_dispatch() {
        // Pages 1-2 start together; page 2 fails first while page 1 is still
        // running. Page 1 must complete, pages 3-5 must never start.
        let converter = Arc::new(FakeConverter::failing_on(2));
        let report = Scheduler::new(2, FailurePolicy::Drain)
            .run(jobs(1, 5), converter.clone(), None)
            .await;

        assert_eq!(report.first_failure().map(PageError::page), Some(2));
        let done: Vec<u32> = report.completed.iter().map(|r| r.page_num).collect();
        assert_eq!(done, vec![1]);
        assert_eq!(report.not_dispatched, vec![3, 4, 5]);
        let mut started = converter.started.lock().unwrap().clone();
        started.sort_unstable();
        assert_eq!(started, vec![1, 2]);
    }

    #[tokio::test]
    async fn drain_with_all_pages_in_flight_finishes_the_rest() {
        let converter = Arc::new(FakeConverter::failing_on(3));
        let report = Scheduler::new(8, FailurePolicy::Drain)
            .run(jobs(1, 5), converter, None)
            .await;

        let mut done: Vec<u32> = report.completed.iter().map(|r| r.page_num).collect();
        done.sort_unstable();
        assert_eq!(done, vec![1, 2, 4, 5]);
        assert_eq!(report.failed.len(), 1);
        assert!(report.not_dispatched.is_empty());
    }

    #[tokio::test]
    async fn fail_fast_abandons_in_flight_pages() {
        // Page 5 is the cheapest, so it fails while 1-4 are still running.
        let converter = Arc::new(FakeConverter::failing_on(5));
        let report = Scheduler::new(8, FailurePolicy::FailFast)
            .run(jobs(1, 5), converter, None)
            .await;

        assert_eq!(report.failed.len(), 1);
        assert!(report.completed.is_empty());
        assert_eq!(report.not_dispatched, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn skip_page_keeps_dispatching() {
        let converter = Arc::new(FakeConverter::failing_on(2));
        let report = Scheduler::new(1, FailurePolicy::SkipPage)
            .run(jobs(1, 4), converter, None)
            .await;

        let done: Vec<u32> = report.completed.iter().map(|r| r.page_num).collect();
        assert_eq!(done, vec![1, 3, 4]);
        assert_eq!(report.failed.len(), 1);
        assert!(report.not_dispatched.is_empty());
    }

    #[tokio::test]
    async fn empty_job_list_is_a_noop() {
        let report = Scheduler::new(2, FailurePolicy::Drain)
            .run(Vec::new(), Arc::new(FakeConverter::default()), None)
            .await;
        assert!(report.completed.is_empty());
        assert!(report.is_success());
    }
}
