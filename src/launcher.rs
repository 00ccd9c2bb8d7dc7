use anyhow::{bail, Context};
use futures_util::StreamExt;
use indicatif::ProgressStyle;
use std::fs::File;
use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Child;
use tracing::{debug, error, info, info_span, warn, Instrument};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::assignment::ExecutorAssignment;
use crate::command::ExecutorCommand;
use crate::config::{LaunchConfig, LaunchMode};
use crate::stats::{ExecutorExit, ExecutorOutcome, LaunchStats};

/// A spawned executor the launcher still holds a handle to.
#[derive(Debug)]
pub struct RunningExecutor {
    pub executor_id: usize,
    child: Child,
    started: Instant,
}

fn log_file(logs_dir: &Path, executor_id: usize) -> anyhow::Result<(Stdio, Stdio)> {
    let path = logs_dir.join(format!("executor-{executor_id}.log"));
    let stdout = File::create(&path)
        .with_context(|| format!("Error creating log file {}", path.display()))?;
    let stderr = stdout.try_clone()?;
    Ok((stdout.into(), stderr.into()))
}

fn spawn_one(
    config: &LaunchConfig,
    assignment: &ExecutorAssignment,
) -> anyhow::Result<RunningExecutor> {
    let command = ExecutorCommand {
        binary: &config.executor_binary,
        params: &config.params,
        assignment,
    };
    info!("{command}");

    let mut process = command.to_command();
    // Executors must not outlive a launcher that is waiting on them.
    process.kill_on_drop(config.mode == LaunchMode::Wait);
    if let Some(logs_dir) = &config.logs_dir {
        let (stdout, stderr) = log_file(logs_dir, assignment.executor_id)?;
        process.stdout(stdout).stderr(stderr);
    }

    let child = process.spawn().with_context(|| {
        format!(
            "Error spawning executor {} ({})",
            assignment.executor_id,
            config.executor_binary.display()
        )
    })?;
    debug!(
        "Executor {} started with pid {:?}",
        assignment.executor_id,
        child.id()
    );
    Ok(RunningExecutor {
        executor_id: assignment.executor_id,
        child,
        started: Instant::now(),
    })
}

/// Spawn every assignment in executor id order.
///
/// Either every executor is started or, on the first spawn failure, the ones already
/// started are killed and the error is returned.
pub fn launch_all(
    config: &LaunchConfig,
    assignments: &[ExecutorAssignment],
) -> anyhow::Result<Vec<RunningExecutor>> {
    if let Some(logs_dir) = &config.logs_dir {
        std::fs::create_dir_all(logs_dir)
            .with_context(|| format!("Error creating logs directory {}", logs_dir.display()))?;
    }

    let mut running = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        match spawn_one(config, assignment) {
            Ok(executor) => running.push(executor),
            Err(e) => {
                for executor in &mut running {
                    if let Err(kill_error) = executor.child.start_kill() {
                        warn!(
                            "Error killing executor {}: {kill_error}",
                            executor.executor_id
                        );
                    }
                }
                return Err(e.context(format!(
                    "Launch aborted, killed {} already running executors",
                    running.len()
                )));
            }
        }
    }
    info!("Launched {} executors", running.len());
    Ok(running)
}

async fn wait_one(mut executor: RunningExecutor) -> ExecutorOutcome {
    let exit = match executor.child.wait().await {
        Ok(status) => ExecutorExit::Exited(status),
        Err(e) => ExecutorExit::WaitFailed(e),
    };
    ExecutorOutcome {
        executor_id: executor.executor_id,
        exit,
        elapsed: executor.started.elapsed(),
    }
}

/// Wait for every executor to exit, or for `shutdown` to resolve.
///
/// On shutdown the executors still running are dropped, which kills them.
pub async fn wait_all(
    running: Vec<RunningExecutor>,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<LaunchStats> {
    let count = running.len();
    let span = info_span!("wait_executors");
    span.pb_set_style(&ProgressStyle::with_template(
        "[{elapsed}] {wide_bar} {pos}/{len} executors finished",
    )?);
    span.pb_set_length(count as u64);

    async move {
        let mut stats = LaunchStats::default();
        let mut outcomes =
            futures_util::stream::iter(running.into_iter().map(wait_one)).buffer_unordered(count.max(1));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                outcome = outcomes.next() => {
                    let Some(outcome) = outcome else { break };
                    if outcome.succeeded() {
                        info!("{outcome}");
                    } else {
                        error!("{outcome}");
                    }
                    stats += &outcome;
                    tracing::Span::current().pb_inc(1);
                }
                _ = &mut shutdown => {
                    let remaining = count - stats.finished();
                    drop(outcomes);
                    bail!("Interrupted, killed {remaining} running executors");
                }
            }
        }
        Ok(stats)
    }
    .instrument(span)
    .await
}
