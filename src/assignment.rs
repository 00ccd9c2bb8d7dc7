use anyhow::{bail, ensure};
use std::num::NonZeroUsize;
use std::ops::Range;

use crate::addresses::WorkerAddress;
use crate::utils::partition;

/// The slice of work handed to one executor process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorAssignment {
    pub executor_id: usize,
    pub address: WorkerAddress,
    pub token_range: Range<u64>,
    pub batch_range: Range<u64>,
}

/// Partition tokens and batches over `executors_per_worker` executors on every address.
///
/// Executor ids run from zero, address by address, then slot by slot within an address.
pub fn plan_assignments(
    addresses: &[WorkerAddress],
    executors_per_worker: NonZeroUsize,
    num_tokens: u64,
    num_batches: u64,
) -> anyhow::Result<Vec<ExecutorAssignment>> {
    if addresses.is_empty() {
        bail!("No worker addresses to assign executors to");
    }
    let Some(num_executors) = addresses.len().checked_mul(executors_per_worker.get()) else {
        bail!(
            "Too many executors: {} workers x {executors_per_worker}",
            addresses.len()
        );
    };

    let token_ranges = partition(num_tokens, num_executors)?;
    let batch_ranges = partition(num_batches, num_executors)?;
    check_coverage(&token_ranges, num_tokens, "token")?;
    check_coverage(&batch_ranges, num_batches, "batch")?;

    let slots = addresses
        .iter()
        .flat_map(|address| std::iter::repeat(address).take(executors_per_worker.get()));

    Ok(slots
        .zip(token_ranges.into_iter().zip(batch_ranges))
        .enumerate()
        .map(
            |(executor_id, (address, (token_range, batch_range)))| ExecutorAssignment {
                executor_id,
                address: address.clone(),
                token_range,
                batch_range,
            },
        )
        .collect())
}

fn check_coverage(ranges: &[Range<u64>], total: u64, what: &str) -> anyhow::Result<()> {
    let first = ranges.first().map(|r| r.start);
    let last = ranges.last().map(|r| r.end);
    ensure!(
        first == Some(0) && last == Some(total),
        "{what} ranges {first:?}..{last:?} do not cover 0..{total}"
    );
    Ok(())
}
