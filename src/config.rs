use anyhow::bail;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use url::Url;

use crate::manifest::ManifestFormat;

/// Arguments forwarded unchanged to every executor.
#[derive(Debug, Clone)]
pub struct ExecutorParams {
    pub num_topics: u32,
    pub num_inner_iter: u32,
    pub batches_path: PathBuf,
    pub vocab_path: PathBuf,
    pub continue_fitting: bool,
    pub cache_phi: Option<bool>,
    pub num_threads: Option<u16>,
    pub debug_print: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Print the commands, spawn nothing.
    DryRun,
    /// Spawn and release the executors.
    Detach,
    /// Spawn and wait for every executor to exit.
    Wait,
}

#[derive(Debug, Clone)]
pub struct ManifestTarget {
    pub location: Url,
    pub format: ManifestFormat,
}

/// Everything one launcher invocation needs, validated once and never mutated.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub executor_binary: PathBuf,
    pub params: ExecutorParams,
    pub addresses_path: PathBuf,
    pub executors_per_worker: NonZeroUsize,
    pub manifest: Option<ManifestTarget>,
    pub logs_dir: Option<PathBuf>,
    pub mode: LaunchMode,
}

impl LaunchConfig {
    /// Checks the inputs exist before anything is probed or launched.
    pub fn check_inputs(&self) -> anyhow::Result<()> {
        let params = &self.params;
        if !params.vocab_path.is_file() {
            bail!("Vocabulary {} is not a file", params.vocab_path.display());
        }
        if !params.batches_path.is_dir() {
            bail!(
                "Batches path {} is not a directory",
                params.batches_path.display()
            );
        }
        if !self.addresses_path.is_file() {
            bail!(
                "Address list {} is not a file",
                self.addresses_path.display()
            );
        }
        // Bare names are resolved through PATH at spawn time.
        if self.mode != LaunchMode::DryRun
            && self.executor_binary.components().count() > 1
            && !self.executor_binary.is_file()
        {
            bail!(
                "Executor binary {} does not exist",
                self.executor_binary.display()
            );
        }
        if let Some(logs_dir) = &self.logs_dir {
            if logs_dir.exists() && !logs_dir.is_dir() {
                bail!("Logs path {} is not a directory", logs_dir.display());
            }
        }
        Ok(())
    }
}
