use std::fmt::{Display, Formatter};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::assignment::ExecutorAssignment;
use crate::config::ExecutorParams;

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Command line for one executor process.
pub struct ExecutorCommand<'a> {
    pub binary: &'a Path,
    pub params: &'a ExecutorParams,
    pub assignment: &'a ExecutorAssignment,
}

impl ExecutorCommand<'_> {
    pub fn args(&self) -> Vec<String> {
        let params = self.params;
        let assignment = self.assignment;

        let mut args = vec![
            "--num-topics".to_string(),
            params.num_topics.to_string(),
            "--num-inner-iter".to_string(),
            params.num_inner_iter.to_string(),
            "--batches-dir-path".to_string(),
            params.batches_path.display().to_string(),
            "--vocab-path".to_string(),
            params.vocab_path.display().to_string(),
            "--continue-fitting".to_string(),
            flag(params.continue_fitting).to_string(),
        ];
        if let Some(cache_phi) = params.cache_phi {
            args.extend(["--cache-phi".to_string(), flag(cache_phi).to_string()]);
        }
        if let Some(threads) = params.num_threads {
            args.extend(["--num-threads".to_string(), threads.to_string()]);
        }
        if params.debug_print {
            args.extend(["--debug-print".to_string(), "1".to_string()]);
        }
        args.extend([
            "--redis-ip".to_string(),
            assignment.address.host.clone(),
            "--redis-port".to_string(),
            assignment.address.port.to_string(),
            "--executor-id".to_string(),
            assignment.executor_id.to_string(),
            "--token-begin-index".to_string(),
            assignment.token_range.start.to_string(),
            "--token-end-index".to_string(),
            assignment.token_range.end.to_string(),
            "--batch-begin-index".to_string(),
            assignment.batch_range.start.to_string(),
            "--batch-end-index".to_string(),
            assignment.batch_range.end.to_string(),
        ]);
        args
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(self.binary);
        command.args(self.args()).stdin(Stdio::null());
        command
    }
}

impl Display for ExecutorCommand<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.binary.display())?;
        for arg in self.args() {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
