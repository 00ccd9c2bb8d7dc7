use clap::ValueEnum;
use serde::Serialize;
use std::io::Write;
use uuid::Uuid;

use crate::assignment::ExecutorAssignment;

#[derive(Clone, Copy, ValueEnum, Debug, Default, PartialEq, Eq)]
pub enum ManifestFormat {
    /// One executor id per line
    #[default]
    Ids,
    /// One JSON object per executor with its address and ranges
    Jsonl,
}

#[derive(Serialize)]
struct ManifestRecord<'a> {
    run_id: Uuid,
    executor_id: usize,
    host: &'a str,
    port: u16,
    token_begin: u64,
    token_end: u64,
    batch_begin: u64,
    batch_end: u64,
}

impl ManifestFormat {
    pub fn render(
        &self,
        run_id: Uuid,
        assignments: &[ExecutorAssignment],
    ) -> anyhow::Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(assignments.len() * 8);
        for assignment in assignments {
            match self {
                ManifestFormat::Ids => writeln!(buffer, "{}", assignment.executor_id)?,
                ManifestFormat::Jsonl => {
                    let record = ManifestRecord {
                        run_id,
                        executor_id: assignment.executor_id,
                        host: &assignment.address.host,
                        port: assignment.address.port,
                        token_begin: assignment.token_range.start,
                        token_end: assignment.token_range.end,
                        batch_begin: assignment.batch_range.start,
                        batch_end: assignment.batch_range.end,
                    };
                    serde_json::to_writer(&mut buffer, &record)?;
                    buffer.push(b'\n');
                }
            }
        }
        Ok(buffer)
    }
}
