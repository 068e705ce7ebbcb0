//! Run command - execute a batch of jobs on the loopback environment.
//!
//! Polling follows the `[update]` section of the configuration. Those
//! defaults are sized for remote clusters; pass `--min-interval 100ms`
//! (or similar) for quick local runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gridbatch::config::parse_duration;
use gridbatch::environment::{LoopbackConfig, LoopbackEnvironment};
use gridbatch::execution::{
    BatchExecutionJob, Job, SampleType, TaskPoolConfig, TaskPools, UpdateIntervalConfig,
};
use gridbatch::updater::VariableDelayUpdater;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the run command.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Number of jobs to execute
    #[arg(long, default_value = "10")]
    pub jobs: usize,

    /// Time each job waits in the queue, in milliseconds
    #[arg(long, default_value = "100")]
    pub queue_ms: u64,

    /// Time each job runs, in milliseconds
    #[arg(long, default_value = "500")]
    pub run_ms: u64,

    /// Make every n-th submission fail remotely (n >= 2)
    #[arg(long, value_parser = clap::value_parser!(u32).range(2..))]
    pub fail_every: Option<u32>,

    /// Override the minimum polling delay (e.g. 100ms, PT2M)
    #[arg(long, value_parser = parse_duration)]
    pub min_interval: Option<Duration>,

    /// Override the maximum polling delay
    #[arg(long, value_parser = parse_duration)]
    pub max_interval: Option<Duration>,

    /// Override the polling delay increment
    #[arg(long, value_parser = parse_duration)]
    pub increment: Option<Duration>,

    /// Configuration file (default: ~/.gridbatch/config.ini)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory holding the communication directories
    #[arg(long)]
    pub work_dir: Option<PathBuf>,
}

impl RunArgs {
    /// Applies the command line overrides to the configured intervals.
    fn intervals(&self, configured: UpdateIntervalConfig) -> Result<UpdateIntervalConfig, CliError> {
        let intervals = UpdateIntervalConfig {
            min: self.min_interval.unwrap_or(configured.min),
            max: self.max_interval.unwrap_or(configured.max),
            increment: self.increment.unwrap_or(configured.increment),
        };
        if intervals.min.is_zero() || intervals.increment.is_zero() {
            return Err(CliError::InvalidArgument(
                "polling delays must be greater than zero".to_string(),
            ));
        }
        if intervals.max < intervals.min {
            return Err(CliError::InvalidArgument(
                "maximum polling delay is below the minimum".to_string(),
            ));
        }
        Ok(intervals)
    }
}

/// Outcome of a run.
#[derive(Debug, Default, PartialEq)]
struct RunSummary {
    jobs: usize,
    completed: usize,
    submissions: u32,
    elapsed: Duration,
    median_waiting: Option<Duration>,
    median_running: Option<Duration>,
}

impl RunSummary {
    /// Submissions that did not produce a result.
    fn failed_attempts(&self) -> u32 {
        self.submissions.saturating_sub(self.completed as u32)
    }
}

/// Run the run command.
pub fn run(args: RunArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(args.config.as_deref())?;
    runner.log_startup("run");

    let config = runner.config();
    let intervals = args.intervals(UpdateIntervalConfig::from(&config.update))?;
    let pools = TaskPoolConfig::from(&config.pools);
    let loopback = LoopbackConfig {
        queue_time: Duration::from_millis(args.queue_ms),
        run_time: Duration::from_millis(args.run_ms),
        fail_every: args.fail_every,
        max_concurrent_submissions: config.environment.max_concurrent_submissions,
        ..Default::default()
    };

    let (work_dir, owned) = match &args.work_dir {
        Some(dir) => (dir.clone(), false),
        None => (default_work_dir(), true),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    let summary = runtime.block_on(execute(
        args.jobs,
        work_dir.clone(),
        loopback,
        pools,
        intervals,
    ));
    drop(runtime);

    if owned {
        remove_work_dir(&work_dir);
    }

    print_summary(&summary);
    Ok(())
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join(format!("gridbatch-{}", std::process::id()))
}

/// Removes a work directory created for this run. Returns false on failure.
fn remove_work_dir(dir: &Path) -> bool {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Could not remove work directory");
            false
        }
    }
}

async fn execute(
    jobs: usize,
    work_dir: PathBuf,
    loopback: LoopbackConfig,
    pools: TaskPoolConfig,
    intervals: UpdateIntervalConfig,
) -> RunSummary {
    let environment = Arc::new(LoopbackEnvironment::new(&work_dir, loopback));
    let pools = TaskPools::new(pools);
    let updater = VariableDelayUpdater::new(CancellationToken::new());
    let started = Instant::now();

    let executions: Vec<_> = (0..jobs)
        .map(|index| {
            let job = Job::new(format!("sample-{}", index), json!({ "index": index }));
            Arc::new(BatchExecutionJob::new(
                Arc::new(job),
                Arc::clone(&environment),
                pools.clone(),
                intervals,
            ))
        })
        .collect();
    for execution in &executions {
        updater.register(Arc::clone(execution));
    }
    info!(jobs, work_dir = %work_dir.display(), "Executions registered");

    tokio::select! {
        _ = updater.wait_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, killing executions");
            for execution in &executions {
                execution.kill();
            }
            updater.shutdown();
            updater.wait_idle().await;
        }
    }

    let statistics = environment.statistics();
    let summary = RunSummary {
        jobs,
        completed: executions
            .iter()
            .filter(|e| e.job().is_finished())
            .count(),
        submissions: environment.service().submissions(),
        elapsed: started.elapsed(),
        median_waiting: statistics.median(SampleType::Waiting),
        median_running: statistics.median(SampleType::Running),
    };
    info!(
        completed = summary.completed,
        submissions = summary.submissions,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "Run finished"
    );
    summary
}

fn print_summary(summary: &RunSummary) {
    let median = |d: Option<Duration>| match d {
        Some(d) => format!("{:.2}s", d.as_secs_f64()),
        None => "-".to_string(),
    };

    println!();
    println!("Run Summary");
    println!("===========");
    println!("  Jobs completed:  {}/{}", summary.completed, summary.jobs);
    println!("  Submissions:     {}", summary.submissions);
    println!("  Failed attempts: {}", summary.failed_attempts());
    println!("  Elapsed:         {:.2}s", summary.elapsed.as_secs_f64());
    println!("  Median queued:   {}", median(summary.median_waiting));
    println!("  Median running:  {}", median(summary.median_running));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args() -> RunArgs {
        RunArgs {
            jobs: 3,
            queue_ms: 5,
            run_ms: 5,
            fail_every: None,
            min_interval: None,
            max_interval: None,
            increment: None,
            config: None,
            work_dir: None,
        }
    }

    fn fast_intervals() -> UpdateIntervalConfig {
        UpdateIntervalConfig {
            min: Duration::from_millis(5),
            max: Duration::from_millis(20),
            increment: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_intervals_use_overrides() {
        let args = RunArgs {
            min_interval: Some(Duration::from_millis(100)),
            ..args()
        };
        let intervals = args.intervals(UpdateIntervalConfig::default()).unwrap();

        assert_eq!(intervals.min, Duration::from_millis(100));
        assert_eq!(intervals.max, UpdateIntervalConfig::default().max);
    }

    #[test]
    fn test_intervals_reject_inverted_bounds() {
        let args = RunArgs {
            max_interval: Some(Duration::from_secs(1)),
            ..args()
        };
        assert!(args.intervals(UpdateIntervalConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_execute_completes_all_jobs() {
        let temp_dir = TempDir::new().unwrap();
        let loopback = LoopbackConfig {
            queue_time: Duration::from_millis(5),
            run_time: Duration::from_millis(5),
            fail_every: Some(2),
            ..Default::default()
        };

        let summary = execute(
            4,
            temp_dir.path().to_path_buf(),
            loopback,
            TaskPoolConfig::default(),
            fast_intervals(),
        )
        .await;

        assert_eq!(summary.jobs, 4);
        assert_eq!(summary.completed, 4);
        assert!(summary.submissions > 4);
        assert!(summary.failed_attempts() > 0);
        assert!(summary.median_running.is_some());
    }

    #[test]
    fn test_remove_work_dir() {
        let temp_dir = TempDir::new().unwrap();
        let work_dir = temp_dir.path().join("work");
        std::fs::create_dir_all(work_dir.join("comm-0")).unwrap();
        std::fs::write(work_dir.join("comm-0").join("input.json"), b"{}").unwrap();

        assert!(remove_work_dir(&work_dir));
        assert!(!work_dir.exists());

        // Already gone
        assert!(remove_work_dir(&work_dir));
    }

    #[test]
    fn test_remove_work_dir_reports_failure() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        assert!(!remove_work_dir(&file));
        assert!(file.exists());
    }
}
