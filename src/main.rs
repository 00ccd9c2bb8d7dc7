mod addresses;
mod assignment;
mod command;
mod config;
mod launcher;
mod manifest;
mod probe;
mod stats;
mod storage;
mod utils;

use anyhow::{bail, Context};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use clap_num::number_range;
use std::future::Future;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::command::ExecutorCommand;
use crate::config::{ExecutorParams, LaunchConfig, LaunchMode, ManifestTarget};
use crate::manifest::ManifestFormat;
use crate::storage::ManifestStore;

fn valid_executor_count(s: &str) -> Result<NonZeroUsize, String> {
    number_range(s, 1, 1_024)
        .and_then(|n: usize| NonZeroUsize::try_from(n).map_err(|e| e.to_string()))
}

fn valid_thread_count(s: &str) -> Result<u16, String> {
    number_range(s, 1, 1_024)
}

fn valid_topic_count(s: &str) -> Result<u32, String> {
    number_range(s, 1, 100_000)
}

fn valid_iteration_count(s: &str) -> Result<u32, String> {
    number_range(s, 1, 10_000)
}

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Vocabulary file, one token per line
    #[arg(short, long)]
    vocab: PathBuf,

    /// Directory holding the batches
    #[arg(short, long)]
    batches_path: PathBuf,

    /// File with one `HOST PORT` redis address per line
    #[arg(short, long)]
    redis_addresses_path: PathBuf,

    /// Number of executors to start per redis address
    #[arg(short, long, default_value = "1", value_parser = valid_executor_count)]
    num_executors: NonZeroUsize,

    /// Threads per executor, passed on as --num-threads
    #[arg(long, value_parser = valid_thread_count)]
    num_executor_threads: Option<u16>,

    /// Number of topics
    #[arg(short = 't', long, default_value = "1", value_parser = valid_topic_count)]
    num_topics: u32,

    /// Number of document passes
    #[arg(short = 'i', long, default_value = "1", value_parser = valid_iteration_count)]
    num_inner_iter: u32,

    /// Continue fitting the existing model instead of restarting
    #[arg(short, long, action = ArgAction::Set, default_value = "0", value_parser = BoolishValueParser::new())]
    continue_fitting: bool,

    /// Cache the phi matrix for the current batch in executors
    #[arg(short = 'p', long, value_parser = BoolishValueParser::new())]
    cache_phi: Option<bool>,

    /// Ask executors to print debug info
    #[arg(long)]
    debug_print: bool,

    /// Where to write the executor manifest.
    /// Can be a local path or a file://, s3://, gs:// or az:// URL.
    #[arg(short, long)]
    output_path: Option<String>,

    /// Manifest contents
    #[arg(value_enum, long, default_value_t = ManifestFormat::Ids)]
    manifest_format: ManifestFormat,

    /// Executor binary to launch
    #[arg(short, long, env = "TOPIC_LAUNCH_EXECUTOR", default_value = "./executor_main")]
    executor_binary: PathBuf,

    /// Write each executor's output to <dir>/executor-<id>.log
    #[arg(long, env = "TOPIC_LAUNCH_LOGS_DIR")]
    logs_dir: Option<PathBuf>,

    /// Start the executors and exit without waiting for them
    #[arg(long, conflicts_with = "dry_run")]
    detach: bool,

    /// Print the executor commands without running them
    #[arg(long)]
    dry_run: bool,

    /// File with environment variables to load before starting
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<LaunchConfig> {
        let manifest = match self.output_path {
            None => None,
            Some(location) => Some(ManifestTarget {
                location: storage::parse_output_location(&location)?,
                format: self.manifest_format,
            }),
        };
        let mode = match (self.dry_run, self.detach) {
            (true, _) => LaunchMode::DryRun,
            (false, true) => LaunchMode::Detach,
            (false, false) => LaunchMode::Wait,
        };
        Ok(LaunchConfig {
            executor_binary: self.executor_binary,
            params: ExecutorParams {
                num_topics: self.num_topics,
                num_inner_iter: self.num_inner_iter,
                batches_path: self.batches_path,
                vocab_path: self.vocab,
                continue_fitting: self.continue_fitting,
                cache_phi: self.cache_phi,
                num_threads: self.num_executor_threads,
                debug_print: self.debug_print,
            },
            addresses_path: self.redis_addresses_path,
            executors_per_worker: self.num_executors,
            manifest,
            logs_dir: self.logs_dir,
            mode,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let indicatif_layer = IndicatifLayer::default();

    let filter_builder = EnvFilter::builder();
    let filter = filter_builder
        .try_from_env()
        .unwrap_or_else(|_| filter_builder.parse_lossy("warn,topic_launch=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();

    let args = match dotenv::from_filename(&args.env_file) {
        // Parse again so env-backed options see the values from the file.
        Ok(_) => Cli::parse(),
        Err(e) => {
            warn!("Error reading env file: {}", e);
            args
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Error listening for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };
    run(args.into_config()?, shutdown, std::io::stdout()).await
}

/// Plan, launch and supervise one run. Dry-run commands are written to `out`.
async fn run(
    config: LaunchConfig,
    shutdown: impl Future<Output = ()>,
    mut out: impl Write,
) -> anyhow::Result<()> {
    config.check_inputs()?;

    let addresses = addresses::load_addresses(&config.addresses_path)?;
    info!("Number of instances is {}", addresses.len());

    let num_tokens = probe::count_tokens(&config.params.vocab_path)?;
    let num_batches = probe::count_batches(&config.params.batches_path)?;

    let assignments = assignment::plan_assignments(
        &addresses,
        config.executors_per_worker,
        num_tokens,
        num_batches,
    )
    .context("Error planning executor assignments")?;
    let run_id = uuid::Uuid::now_v7();
    info!(
        "Run {run_id}: {} executors over {} workers, {num_tokens} tokens and {num_batches} batches",
        assignments.len(),
        addresses.len()
    );

    // Resolve the manifest target before launching so a bad URL fails early.
    let manifest_store = match &config.manifest {
        None => None,
        Some(target) => Some((ManifestStore::from_url(&target.location)?, target.format)),
    };

    let running = match config.mode {
        LaunchMode::DryRun => {
            for assignment in &assignments {
                let command = ExecutorCommand {
                    binary: &config.executor_binary,
                    params: &config.params,
                    assignment,
                };
                writeln!(out, "{command}")?;
            }
            vec![]
        }
        LaunchMode::Detach | LaunchMode::Wait => launcher::launch_all(&config, &assignments)?,
    };

    if let Some((store, format)) = manifest_store {
        let written = match format.render(run_id, &assignments) {
            Ok(body) => store.write(body).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if config.mode == LaunchMode::Wait && !running.is_empty() {
                error!("Killing {} launched executors", running.len());
                drop(running);
                return Err(e.context("Launched executors were killed"));
            }
            return Err(e);
        }
        info!("Executor manifest written to {store}");
    }

    if config.mode != LaunchMode::Wait {
        return Ok(());
    }

    let stats = launcher::wait_all(running, shutdown).await?;
    info!("Completed! {stats}");
    if !stats.failed.is_empty() {
        let mut failed = stats.failed;
        failed.sort_unstable();
        bail!("Executors {failed:?} did not exit successfully");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(extra: &[&str]) -> Cli {
        let mut argv = vec![
            "topic-launch",
            "-v",
            "vocab.txt",
            "-b",
            "batches",
            "-r",
            "addresses.txt",
        ];
        argv.extend_from_slice(extra);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_wait_for_one_executor_per_worker() {
        let config = parse(&[]).into_config().unwrap();
        assert_eq!(config.mode, LaunchMode::Wait);
        assert_eq!(config.executors_per_worker.get(), 1);
        assert!(!config.params.continue_fitting);
        assert_eq!(config.params.cache_phi, None);
        assert!(config.manifest.is_none());
    }

    #[test]
    fn short_flags_map_to_executor_params() {
        let config = parse(&[
            "-n", "4", "-t", "50", "-i", "3", "-c", "1", "-p", "0", "-o", "ids.txt", "--dry-run",
        ])
        .into_config()
        .unwrap();
        assert_eq!(config.mode, LaunchMode::DryRun);
        assert_eq!(config.executors_per_worker.get(), 4);
        assert_eq!(config.params.num_topics, 50);
        assert_eq!(config.params.num_inner_iter, 3);
        assert!(config.params.continue_fitting);
        assert_eq!(config.params.cache_phi, Some(false));

        let manifest = config.manifest.unwrap();
        assert_eq!(manifest.location.scheme(), "file");
        assert_eq!(manifest.format, ManifestFormat::Ids);
    }

    #[test]
    fn rejects_out_of_range_counts() {
        let base = ["topic-launch", "-v", "v", "-b", "b", "-r", "r"];
        for extra in [["-n", "0"], ["-t", "0"], ["--num-executor-threads", "0"]] {
            let argv = base.iter().chain(extra.iter());
            assert!(Cli::try_parse_from(argv).is_err(), "{extra:?}");
        }
    }

    #[test]
    fn detach_conflicts_with_dry_run() {
        let argv = [
            "topic-launch", "-v", "v", "-b", "b", "-r", "r", "--detach", "--dry-run",
        ];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[cfg(unix)]
    mod orchestration {
        use super::*;
        use crate::config::tests::test_config;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;
        use url::Url;

        fn write_inputs(root: &Path) {
            std::fs::write(root.join("vocab.txt"), "a\nb\nc\nd\ne\nf\ng\nh\ni\nj\n").unwrap();
            std::fs::create_dir(root.join("batches")).unwrap();
            for idx in 0..4 {
                std::fs::write(root.join("batches").join(format!("{idx}.batch")), b"x").unwrap();
            }
            std::fs::write(root.join("addresses.txt"), "10.0.0.1 6379\n10.0.0.2 6380\n").unwrap();
        }

        fn config(root: &Path, binary: &str) -> LaunchConfig {
            write_inputs(root);
            let mut config = test_config(root, binary);
            config.executors_per_worker = NonZeroUsize::new(2).unwrap();
            config.manifest = Some(ManifestTarget {
                location: Url::from_file_path(root.join("ids.txt")).unwrap(),
                format: ManifestFormat::Ids,
            });
            config
        }

        #[tokio::test]
        async fn dry_run_prints_commands_without_spawning() {
            let dir = tempfile::tempdir().unwrap();
            // Spawning this would fail the run.
            let mut config = config(dir.path(), "./no/such/executor_main");
            config.mode = LaunchMode::DryRun;

            let mut out = Vec::new();
            run(config, std::future::pending(), &mut out).await.unwrap();

            let out = String::from_utf8(out).unwrap();
            let lines: Vec<_> = out.lines().collect();
            assert_eq!(lines.len(), 4);
            assert!(lines[0].starts_with("./no/such/executor_main --num-topics 20"));
            assert!(lines[0].contains("--redis-ip 10.0.0.1 --redis-port 6379 --executor-id 0"));
            assert!(lines[3].contains("--executor-id 3 --token-begin-index 9 --token-end-index 10"));
            assert_eq!(
                std::fs::read_to_string(dir.path().join("ids.txt")).unwrap(),
                "0\n1\n2\n3\n"
            );
        }

        #[tokio::test]
        async fn writes_manifest_after_successful_run() {
            let dir = tempfile::tempdir().unwrap();
            let config = config(dir.path(), "true");
            run(config, std::future::pending(), std::io::sink()).await.unwrap();
            assert_eq!(
                std::fs::read_to_string(dir.path().join("ids.txt")).unwrap(),
                "0\n1\n2\n3\n"
            );
        }

        #[tokio::test]
        async fn failed_executors_fail_the_run() {
            let dir = tempfile::tempdir().unwrap();
            let config = config(dir.path(), "false");
            let err = run(config, std::future::pending(), std::io::sink())
                .await
                .unwrap_err();
            assert!(err.to_string().contains("[0, 1, 2, 3]"), "{err}");
            // Every launch was issued, so the manifest is still there.
            assert!(dir.path().join("ids.txt").exists());
        }

        #[tokio::test]
        async fn spawn_failure_skips_manifest() {
            let dir = tempfile::tempdir().unwrap();
            let binary = dir.path().join("executor_main");
            std::fs::write(&binary, "#!/bin/sh\n").unwrap();
            std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o644)).unwrap();

            let config = config(dir.path(), binary.to_str().unwrap());
            let err = run(config, std::future::pending(), std::io::sink())
                .await
                .unwrap_err();
            assert!(format!("{err:#}").contains("executor 0"), "{err:#}");
            assert!(!dir.path().join("ids.txt").exists());
        }

        #[tokio::test]
        async fn manifest_failure_reports_killed_executors() {
            let dir = tempfile::tempdir().unwrap();
            let mut config = config(dir.path(), "true");
            // A regular file cannot be a parent directory.
            config.manifest = Some(ManifestTarget {
                location: Url::from_file_path(dir.path().join("vocab.txt").join("ids.txt")).unwrap(),
                format: ManifestFormat::Ids,
            });
            let err = run(config, std::future::pending(), std::io::sink())
                .await
                .unwrap_err();
            assert!(err.to_string().contains("Launched executors were killed"), "{err}");
        }
    }
}
