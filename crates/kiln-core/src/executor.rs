//! Concurrent plan execution with partial-failure semantics.
//!
//! The executor is the only writer of the result table. A node is spawned
//! once every dependency has reached `Success`; while its worker runs it owns
//! the node, and the coordinator records the outcome when the worker
//! returns. When a node fails, every not-yet-started transitive dependent is
//! marked `Skipped` and unrelated branches keep going. Cancellation stops
//! scheduling, skips everything still pending and lets in-flight workers
//! finish.

use std::collections::{BTreeSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use futures::FutureExt;
use kiln_schema::{PackageName, Version};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::backend::{BuildBackend, build_package};
use crate::reporter::{NullReporter, Reporter};
use crate::resolver::BuildPlan;

/// Lifecycle of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStatus {
    /// Not started yet.
    Pending,
    /// A worker is running the backend.
    Building,
    /// Configure, build and install all succeeded.
    Success,
    /// A backend step failed.
    Failed,
    /// Never started, because a dependency failed or the run was cancelled.
    Skipped,
}

impl BuildStatus {
    /// Returns `true` for `Success`, `Failed` and `Skipped`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Skipped)
    }

    /// Lower-case label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Building => "building",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for one plan entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    /// Package name.
    pub name: PackageName,
    /// Resolved version.
    pub version: Version,
    /// Current status.
    pub status: BuildStatus,
    /// Failure diagnostic or skip reason.
    pub error: Option<String>,
    /// Wall time spent in the backend, for nodes that ran.
    pub elapsed: Option<Duration>,
}

/// Final counts of an execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Nodes that built successfully.
    pub success: usize,
    /// Nodes whose backend failed.
    pub failed: usize,
    /// Nodes that never started.
    pub skipped: usize,
}

impl Summary {
    /// Count terminal statuses in `results`.
    pub fn from_results(results: &[BuildResult]) -> Self {
        let mut summary = Self::default();
        for r in results {
            match r.status {
                BuildStatus::Success => summary.success += 1,
                BuildStatus::Failed => summary.failed += 1,
                BuildStatus::Skipped => summary.skipped += 1,
                BuildStatus::Pending | BuildStatus::Building => {}
            }
        }
        summary
    }

    /// Returns `true` if nothing failed or was skipped.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Everything an execution produced.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// One result per plan entry, in plan order.
    pub results: Vec<BuildResult>,
    /// Aggregate counts.
    pub summary: Summary,
    /// Whether the run was cancelled before completing.
    pub cancelled: bool,
    /// Total wall time.
    pub elapsed: Duration,
}

impl BuildReport {
    /// Returns `true` if every node succeeded and the run was not cancelled.
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.summary.is_success()
    }

    /// Results for nodes that failed.
    pub fn failures(&self) -> impl Iterator<Item = &BuildResult> {
        self.results
            .iter()
            .filter(|r| r.status == BuildStatus::Failed)
    }
}

/// Execution settings.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Maximum number of nodes building at once (at least 1).
    pub concurrency: usize,
    /// Stops scheduling when cancelled.
    pub cancel: CancellationToken,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get().max(1),
            cancel: CancellationToken::new(),
        }
    }
}

/// Read-only handle to the live result table.
#[derive(Debug, Clone)]
pub struct Progress {
    results: Arc<RwLock<Vec<BuildResult>>>,
}

impl Progress {
    /// Copy of the current results, in plan order.
    pub fn snapshot(&self) -> Vec<BuildResult> {
        self.results
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

type WorkerOutcome = (usize, Result<(), String>, Duration);

/// Runs a [`BuildPlan`] against a [`BuildBackend`].
pub struct Executor {
    plan: Arc<BuildPlan>,
    results: Arc<RwLock<Vec<BuildResult>>>,
    backend: Arc<dyn BuildBackend>,
    reporter: Arc<dyn Reporter>,
}

impl Executor {
    /// Prepare an execution; every node starts `Pending`.
    pub fn new(
        plan: BuildPlan,
        backend: Arc<dyn BuildBackend>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let results = plan
            .iter()
            .map(|e| BuildResult {
                name: e.name().clone(),
                version: e.version.clone(),
                status: BuildStatus::Pending,
                error: None,
                elapsed: None,
            })
            .collect();
        Self {
            plan: Arc::new(plan),
            results: Arc::new(RwLock::new(results)),
            backend,
            reporter,
        }
    }

    /// The plan being executed.
    pub fn plan(&self) -> &BuildPlan {
        &self.plan
    }

    /// Copy of the current results, in plan order.
    pub fn snapshot(&self) -> Vec<BuildResult> {
        self.progress().snapshot()
    }

    /// Handle for reading progress from another task.
    pub fn progress(&self) -> Progress {
        Progress {
            results: self.results.clone(),
        }
    }

    /// Execute the plan and return the final report.
    ///
    /// Nodes that already reached a terminal status in an earlier run are
    /// kept as they are and never rebuilt.
    pub async fn run(&self, options: ExecuteOptions) -> BuildReport {
        let start = Instant::now();
        let limit = options.concurrency.max(1);
        let dependents = self.plan.dependents();
        let statuses: Vec<BuildStatus> = self.snapshot().iter().map(|r| r.status).collect();
        let mut waiting: Vec<usize> = self
            .plan
            .iter()
            .map(|e| {
                e.dependencies
                    .iter()
                    .filter_map(|d| self.plan.position(d))
                    .filter(|&d| statuses[d] != BuildStatus::Success)
                    .count()
            })
            .collect();
        let mut ready: BTreeSet<usize> = (0..self.plan.len())
            .filter(|&i| waiting[i] == 0 && statuses[i] == BuildStatus::Pending)
            .collect();
        let mut workers: JoinSet<WorkerOutcome> = JoinSet::new();
        let mut cancelled = false;

        self.reporter.plan_ready(&self.plan);

        loop {
            if !cancelled && options.cancel.is_cancelled() {
                cancelled = true;
                ready.clear();
                self.skip_pending();
            }

            while !cancelled && workers.len() < limit {
                let Some(idx) = ready.pop_first() else {
                    break;
                };
                self.spawn(&mut workers, idx);
            }

            if workers.is_empty() {
                break;
            }

            tokio::select! {
                () = options.cancel.cancelled(), if !cancelled => {}
                Some(joined) = workers.join_next() => match joined {
                    Ok((idx, Ok(()), elapsed)) => {
                        self.complete(idx, elapsed);
                        for &d in &dependents[idx] {
                            waiting[d] -= 1;
                            if waiting[d] == 0 && self.status(d) == BuildStatus::Pending {
                                ready.insert(d);
                            }
                        }
                    }
                    Ok((idx, Err(message), elapsed)) => {
                        self.fail(idx, message, elapsed);
                        self.skip_dependents(idx, &dependents);
                    }
                    Err(e) => tracing::error!(error = %e, "build worker did not finish"),
                },
                else => break,
            }
        }

        self.finalize();

        let results = self.snapshot();
        let summary = Summary::from_results(&results);
        let elapsed = start.elapsed();
        self.reporter.summary(&summary, elapsed.as_secs_f64());

        tracing::info!(
            success = summary.success,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled,
            "execution finished"
        );

        BuildReport {
            results,
            summary,
            cancelled,
            elapsed,
        }
    }

    fn spawn(&self, workers: &mut JoinSet<WorkerOutcome>, idx: usize) {
        self.update(idx, |r| r.status = BuildStatus::Building);

        let plan = self.plan.clone();
        let backend = self.backend.clone();
        let reporter = self.reporter.clone();
        workers.spawn(async move {
            let started = Instant::now();
            let entry = &plan.entries()[idx];
            let outcome = AssertUnwindSafe(build_package(
                backend.as_ref(),
                entry,
                reporter.as_ref(),
            ))
            .catch_unwind()
            .await;
            let outcome = match outcome {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err("build backend panicked".to_string()),
            };
            (idx, outcome, started.elapsed())
        });
    }

    fn complete(&self, idx: usize, elapsed: Duration) {
        self.update(idx, |r| {
            r.status = BuildStatus::Success;
            r.elapsed = Some(elapsed);
        });
        let entry = &self.plan.entries()[idx];
        self.reporter
            .done(entry.name(), &entry.version, elapsed.as_secs_f64());
    }

    fn fail(&self, idx: usize, message: String, elapsed: Duration) {
        let entry = &self.plan.entries()[idx];
        tracing::warn!(package = %entry.name(), error = %message, "build failed");
        self.reporter.failed(entry.name(), &entry.version, &message);
        self.update(idx, |r| {
            r.status = BuildStatus::Failed;
            r.error = Some(message);
            r.elapsed = Some(elapsed);
        });
    }

    fn skip_dependents(&self, failed: usize, dependents: &[Vec<usize>]) {
        let reason = format!("dependency '{}' failed", self.plan.entries()[failed].name());
        let mut seen = vec![false; dependents.len()];
        let mut queue: VecDeque<usize> = dependents[failed].iter().copied().collect();

        while let Some(idx) = queue.pop_front() {
            if std::mem::replace(&mut seen[idx], true) {
                continue;
            }
            if self.status(idx) == BuildStatus::Pending {
                self.skip(idx, &reason);
            }
            queue.extend(dependents[idx].iter().copied());
        }
    }

    fn skip_pending(&self) {
        for idx in 0..self.plan.len() {
            if self.status(idx) == BuildStatus::Pending {
                self.skip(idx, "cancelled");
            }
        }
    }

    fn skip(&self, idx: usize, reason: &str) {
        let entry = &self.plan.entries()[idx];
        self.reporter.skipped(entry.name(), &entry.version, reason);
        self.update(idx, |r| {
            r.status = BuildStatus::Skipped;
            r.error = Some(reason.to_string());
        });
    }

    /// Every node must end terminal even if a worker vanished.
    fn finalize(&self) {
        let mut results = self.results.write().unwrap_or_else(PoisonError::into_inner);
        for r in results.iter_mut() {
            match r.status {
                BuildStatus::Building => {
                    r.status = BuildStatus::Failed;
                    r.error = Some("build worker did not finish".to_string());
                }
                BuildStatus::Pending => {
                    r.status = BuildStatus::Skipped;
                    r.error = Some("not scheduled".to_string());
                }
                _ => {}
            }
        }
    }

    fn status(&self, idx: usize) -> BuildStatus {
        self.results.read().unwrap_or_else(PoisonError::into_inner)[idx].status
    }

    fn update(&self, idx: usize, f: impl FnOnce(&mut BuildResult)) {
        let mut results = self.results.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut results[idx]);
    }
}

/// Execute `plan` with `backend`, reporting nothing.
pub async fn execute(
    plan: BuildPlan,
    backend: Arc<dyn BuildBackend>,
    options: ExecuteOptions,
) -> BuildReport {
    Executor::new(plan, backend, Arc::new(NullReporter))
        .run(options)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BackendError, Step};
    use crate::graph::PackageRequest;
    use crate::resolver;
    use crate::store::tests::store_of;
    use async_trait::async_trait;
    use kiln_schema::PackageDescriptor;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails `build` for the named packages; records configure order and
    /// peak parallelism.
    #[derive(Default)]
    struct Scripted {
        fail: HashSet<String>,
        delay: Duration,
        order: Mutex<Vec<String>>,
        running: AtomicUsize,
        peak: AtomicUsize,
        cancel_on: Option<(String, CancellationToken)>,
    }

    impl Scripted {
        fn failing(names: &[&str]) -> Self {
            Self {
                fail: names.iter().map(|s| (*s).to_string()).collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl BuildBackend for Scripted {
        async fn configure(
            &self,
            descriptor: &PackageDescriptor,
            _version: &Version,
        ) -> Result<(), BackendError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.order.lock().unwrap().push(descriptor.name.to_string());
            if let Some((name, token)) = &self.cancel_on {
                if descriptor.name == name.as_str() {
                    token.cancel();
                }
            }
            tokio::time::sleep(self.delay).await;
            Ok(())
        }

        async fn build(&self, descriptor: &PackageDescriptor) -> Result<(), BackendError> {
            if self.fail.contains(descriptor.name.as_str()) {
                self.running.fetch_sub(1, Ordering::SeqCst);
                return Err(BackendError::new(Step::Build, "compiler exploded"));
            }
            Ok(())
        }

        async fn install(&self, _descriptor: &PackageDescriptor) -> Result<(), BackendError> {
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn plan_for(packages: &[(&str, &[&str])], roots: &[&str]) -> BuildPlan {
        let store = store_of(packages);
        let roots: Vec<PackageRequest> = roots.iter().map(|r| PackageRequest::new(r)).collect();
        resolver::plan(&store, &roots).unwrap()
    }

    fn status_of(report: &BuildReport, name: &str) -> BuildStatus {
        report
            .results
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.status)
            .unwrap()
    }

    #[tokio::test]
    async fn test_all_succeed() {
        let plan = plan_for(&[("a", &["b"]), ("b", &[])], &["a"]);
        let report = execute(plan, Arc::new(Scripted::default()), ExecuteOptions::default()).await;

        assert!(report.is_success());
        assert_eq!(
            report.summary,
            Summary {
                success: 2,
                failed: 0,
                skipped: 0
            }
        );
        assert!(report.results.iter().all(|r| r.elapsed.is_some()));
    }

    #[tokio::test]
    async fn test_failure_skips_transitive_dependents() {
        // app -> lib -> base ; tool is independent
        let plan = plan_for(
            &[("app", &["lib"]), ("lib", &["base"]), ("base", &[]), ("tool", &[])],
            &["app", "tool"],
        );
        let report = execute(
            plan,
            Arc::new(Scripted::failing(&["base"])),
            ExecuteOptions::default(),
        )
        .await;

        assert_eq!(status_of(&report, "base"), BuildStatus::Failed);
        assert_eq!(status_of(&report, "lib"), BuildStatus::Skipped);
        assert_eq!(status_of(&report, "app"), BuildStatus::Skipped);
        assert_eq!(status_of(&report, "tool"), BuildStatus::Success);

        let app = report.results.iter().find(|r| r.name == "app").unwrap();
        assert_eq!(app.error.as_deref(), Some("dependency 'base' failed"));

        let failures: Vec<&BuildResult> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(
            failures[0].error.as_deref(),
            Some("build failed: compiler exploded")
        );
        assert!(!report.is_success());
        assert_eq!(
            report.summary,
            Summary {
                success: 1,
                failed: 1,
                skipped: 2
            }
        );
    }

    #[tokio::test]
    async fn test_dependency_finishes_before_dependent_starts() {
        let plan = plan_for(&[("app", &["lib"]), ("lib", &["base"]), ("base", &[])], &["app"]);
        let backend = Arc::new(Scripted {
            delay: Duration::from_millis(5),
            ..Scripted::default()
        });
        let report = execute(
            plan,
            backend.clone(),
            ExecuteOptions {
                concurrency: 8,
                ..ExecuteOptions::default()
            },
        )
        .await;

        assert!(report.is_success());
        assert_eq!(*backend.order.lock().unwrap(), vec!["base", "lib", "app"]);
        assert_eq!(backend.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrency_limit() {
        let packages: Vec<(&str, &[&str])> = vec![
            ("p1", &[]),
            ("p2", &[]),
            ("p3", &[]),
            ("p4", &[]),
            ("p5", &[]),
            ("p6", &[]),
        ];
        let plan = plan_for(&packages, &["p1", "p2", "p3", "p4", "p5", "p6"]);
        let backend = Arc::new(Scripted {
            delay: Duration::from_millis(20),
            ..Scripted::default()
        });
        let report = execute(
            plan,
            backend.clone(),
            ExecuteOptions {
                concurrency: 2,
                ..ExecuteOptions::default()
            },
        )
        .await;

        assert!(report.is_success());
        assert!(backend.peak.load(Ordering::SeqCst) <= 2);
        // Ready nodes are started in plan order.
        assert_eq!(
            *backend.order.lock().unwrap(),
            vec!["p1", "p2", "p3", "p4", "p5", "p6"]
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let plan = plan_for(&[("a", &["b"]), ("b", &[])], &["a"]);
        let options = ExecuteOptions::default();
        options.cancel.cancel();

        let backend = Arc::new(Scripted::default());
        let report = execute(plan, backend.clone(), options).await;

        assert!(report.cancelled);
        assert_eq!(report.summary.skipped, 2);
        assert!(backend.order.lock().unwrap().is_empty());
        assert!(
            report
                .results
                .iter()
                .all(|r| r.error.as_deref() == Some("cancelled"))
        );
    }

    #[tokio::test]
    async fn test_cancel_lets_in_flight_finish() {
        let plan = plan_for(&[("a", &["b"]), ("b", &["c"]), ("c", &[])], &["a"]);
        let options = ExecuteOptions::default();
        let backend = Arc::new(Scripted {
            delay: Duration::from_millis(10),
            cancel_on: Some(("c".to_string(), options.cancel.clone())),
            ..Scripted::default()
        });
        let report = execute(plan, backend.clone(), options).await;

        assert!(report.cancelled);
        assert_eq!(status_of(&report, "c"), BuildStatus::Success);
        assert_eq!(status_of(&report, "b"), BuildStatus::Skipped);
        assert_eq!(status_of(&report, "a"), BuildStatus::Skipped);
        assert_eq!(*backend.order.lock().unwrap(), vec!["c"]);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_snapshot_is_a_copy() {
        let plan = plan_for(&[("a", &[])], &["a"]);
        let executor = Executor::new(plan, Arc::new(Scripted::default()), Arc::new(NullReporter));
        let progress = executor.progress();

        let before = progress.snapshot();
        assert_eq!(before[0].status, BuildStatus::Pending);

        executor.run(ExecuteOptions::default()).await;

        assert_eq!(before[0].status, BuildStatus::Pending);
        assert_eq!(progress.snapshot()[0].status, BuildStatus::Success);
        assert_eq!(executor.snapshot()[0].status, BuildStatus::Success);
    }

    #[tokio::test]
    async fn test_second_run_keeps_results() {
        let plan = plan_for(&[("app", &["lib"]), ("lib", &[]), ("tool", &[])], &["app", "tool"]);
        let backend = Arc::new(Scripted::failing(&["lib"]));
        let executor = Executor::new(plan, backend.clone(), Arc::new(NullReporter));

        let first = executor.run(ExecuteOptions::default()).await;
        let second = executor.run(ExecuteOptions::default()).await;

        assert_eq!(first.results, second.results);
        assert_eq!(second.summary, first.summary);
        assert_eq!(status_of(&second, "lib"), BuildStatus::Failed);
        assert_eq!(status_of(&second, "app"), BuildStatus::Skipped);
        // lib and tool were configured once each
        assert_eq!(backend.order.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_plan() {
        let report = execute(
            BuildPlan::default(),
            Arc::new(Scripted::default()),
            ExecuteOptions::default(),
        )
        .await;
        assert!(report.is_success());
        assert!(report.results.is_empty());
    }
}
