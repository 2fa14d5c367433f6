//! In-memory queue backend.

use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use super::record::JobRecord;
use super::state::JobState;
use super::{JobId, JobOptions, JobSnapshot, QueueBackend, QueueError};
use crate::domain::RetryPolicy;
use crate::ports::IdGenerator;

/// Upper bound on how long an idle `lease` sleeps before re-checking lists.
const IDLE_RECHECK: Duration = Duration::from_millis(250);

/// Scheduled job entry for priority queue.
///
/// We use Reverse ordering so BinaryHeap acts as a min-heap (earliest first).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledJob {
    next_run_at: Instant,
    job_id: JobId,
}

impl PartialOrd for ScheduledJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.next_run_at.cmp(&self.next_run_at)
    }
}

/// Job counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub waiting: usize,
    pub delayed: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

struct InMemoryQueueState {
    /// All job records (single source of truth).
    jobs: HashMap<JobId, JobRecord>,

    /// Ready jobs per list (ids only).
    ready: HashMap<String, VecDeque<JobId>>,

    /// Retry backoff. Entries for removed jobs are skipped lazily.
    scheduled: BinaryHeap<ScheduledJob>,

    paused: HashSet<String>,
}

impl InMemoryQueueState {
    fn promote_scheduled_jobs(&mut self) {
        let now = Instant::now();
        while let Some(entry) = self.scheduled.peek() {
            if entry.next_run_at > now {
                break;
            }
            let Some(entry) = self.scheduled.pop() else {
                break;
            };
            if let Some(record) = self.jobs.get_mut(&entry.job_id)
                && record.state == JobState::Delayed
            {
                record.requeue();
                if let Some(list) = self.ready.get_mut(&record.list) {
                    list.push_back(entry.job_id);
                }
            }
        }
    }

    fn pop_ready(&mut self, lists: &[String]) -> Option<JobId> {
        for list in lists {
            if self.paused.contains(list) {
                continue;
            }
            if let Some(id) = self.ready.get_mut(list).and_then(VecDeque::pop_front) {
                return Some(id);
            }
        }
        None
    }

    fn snapshot(&self, record: &JobRecord) -> JobSnapshot {
        let state = if record.state == JobState::Waiting && self.paused.contains(&record.list) {
            JobState::Paused
        } else {
            record.state
        };
        JobSnapshot {
            id: record.id.clone(),
            list: record.list.clone(),
            name: record.name.clone(),
            state,
            attempts_made: record.attempts_made,
            progress: record.progress,
            return_value: record.return_value.clone(),
            failed_reason: record.failed_reason.clone(),
        }
    }

    fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for record in self.jobs.values() {
            match record.state {
                JobState::Waiting | JobState::Paused => counts.waiting += 1,
                JobState::Delayed => counts.delayed += 1,
                JobState::Active => counts.active += 1,
                JobState::Completed => counts.completed += 1,
                JobState::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

/// In-memory queue with named lists, per-job attempts and backoff.
///
/// Jobs are executed by whoever leases them (normally a `WorkerGroup`).
pub struct InMemoryQueueBackend {
    state: Arc<Mutex<InMemoryQueueState>>,
    notify: Arc<Notify>,
    ids: Arc<dyn IdGenerator>,
    available: AtomicBool,
}

impl InMemoryQueueBackend {
    pub fn new<I, S>(lists: I, ids: Arc<dyn IdGenerator>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ready = lists
            .into_iter()
            .map(|l| (l.into(), VecDeque::new()))
            .collect();
        Self {
            state: Arc::new(Mutex::new(InMemoryQueueState {
                jobs: HashMap::new(),
                ready,
                scheduled: BinaryHeap::new(),
                paused: HashSet::new(),
            })),
            notify: Arc::new(Notify::new()),
            ids,
            available: AtomicBool::new(true),
        }
    }

    /// Simulates losing (or regaining) the connection to the queue.
    /// Only the client API is affected; leases keep working.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), QueueError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(QueueError::Unavailable("connection refused".into()))
        }
    }

    pub async fn pause(&self, list: &str) {
        self.state.lock().await.paused.insert(list.to_string());
    }

    pub async fn resume(&self, list: &str) {
        self.state.lock().await.paused.remove(list);
        self.notify.notify_one();
    }

    pub async fn counts(&self) -> JobCounts {
        self.state.lock().await.counts()
    }

    /// Non-blocking lease: the next ready job from the first non-empty list.
    pub async fn try_lease(&self, lists: &[String]) -> Option<JobLease> {
        let mut state = self.state.lock().await;
        state.promote_scheduled_jobs();
        let job_id = state.pop_ready(lists)?;
        let record = state.jobs.get_mut(&job_id)?;
        record.start_attempt();
        Some(JobLease {
            job_id,
            name: record.name.clone(),
            data: record.data.clone(),
            attempt: record.attempts_made,
            queue: Arc::clone(&self.state),
            notify: Arc::clone(&self.notify),
        })
    }

    /// Waits until a job is ready on one of `lists`.
    pub async fn lease(&self, lists: &[String]) -> JobLease {
        loop {
            if let Some(lease) = self.try_lease(lists).await {
                return lease;
            }

            let next_wake = {
                let state = self.state.lock().await;
                state.scheduled.peek().map(|entry| entry.next_run_at)
            };
            let idle_deadline = Instant::now() + IDLE_RECHECK;
            let wake_at = next_wake.map_or(idle_deadline, |t| t.min(idle_deadline));

            tokio::select! {
                _ = self.notify.notified() => {},
                _ = tokio::time::sleep_until(wake_at.into()) => {},
            }
        }
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueueBackend {
    async fn add(
        &self,
        list: &str,
        job_name: &str,
        data: serde_json::Value,
        opts: JobOptions,
    ) -> Result<JobId, QueueError> {
        self.ensure_available()?;
        if job_name.trim().is_empty() {
            return Err(QueueError::Rejected("job name must not be empty".into()));
        }
        if opts.attempts == 0 {
            return Err(QueueError::Rejected("attempts must be at least 1".into()));
        }

        let job_id = format!("job-{}", self.ids.generate_ulid());
        {
            let mut state = self.state.lock().await;
            let Some(ready) = state.ready.get_mut(list) else {
                return Err(QueueError::UnknownList(list.to_string()));
            };
            ready.push_back(job_id.clone());
            let record = JobRecord::new(
                job_id.clone(),
                list.to_string(),
                job_name.to_string(),
                data,
                opts,
            );
            state.jobs.insert(job_id.clone(), record);
        }
        self.notify.notify_one();
        Ok(job_id)
    }

    async fn job_state(&self, id: &str) -> Result<Option<JobSnapshot>, QueueError> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        Ok(state.jobs.get(id).map(|record| state.snapshot(record)))
    }

    async fn remove(&self, id: &str) -> Result<bool, QueueError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        let removable = state
            .jobs
            .get(id)
            .is_some_and(|record| record.state.is_removable());
        if !removable {
            return Ok(false);
        }
        if let Some(record) = state.jobs.remove(id)
            && let Some(ready) = state.ready.get_mut(&record.list)
        {
            ready.retain(|queued| queued != id);
        }
        Ok(true)
    }
}

/// A leased (active) job. Consumed by `complete` or `fail`.
pub struct JobLease {
    pub job_id: JobId,
    pub name: String,
    pub data: serde_json::Value,
    /// 1-indexed attempt number of this execution.
    pub attempt: u32,
    queue: Arc<Mutex<InMemoryQueueState>>,
    notify: Arc<Notify>,
}

impl JobLease {
    pub async fn update_progress(&self, progress: u8) {
        let mut state = self.queue.lock().await;
        if let Some(record) = state.jobs.get_mut(&self.job_id) {
            record.progress = Some(progress.min(100));
        }
    }

    pub async fn complete(self, return_value: serde_json::Value) {
        let mut state = self.queue.lock().await;
        if let Some(record) = state.jobs.get_mut(&self.job_id) {
            record.mark_completed(return_value);
        }
    }

    /// Records a failed execution. Schedules a retry while attempts remain.
    /// Returns the state the job ended up in.
    pub async fn fail(self, reason: String) -> JobState {
        let (next_state, should_notify) = {
            let mut state = self.queue.lock().await;
            let Some(record) = state.jobs.get_mut(&self.job_id) else {
                return JobState::Failed;
            };

            if record.has_attempts_left() {
                let policy = RetryPolicy::new(record.opts.attempts, record.opts.backoff);
                let next_run_at = Instant::now() + policy.delay_for(record.attempts_made);
                record.schedule_retry(next_run_at, reason);
                state.scheduled.push(ScheduledJob {
                    next_run_at,
                    job_id: self.job_id.clone(),
                });
                (JobState::Delayed, true)
            } else {
                record.mark_failed(reason);
                (JobState::Failed, false)
            }
        };

        if should_notify {
            self.notify.notify_one();
        }
        next_state
    }
}
