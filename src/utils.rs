use anyhow::bail;
use std::ops::Range;

/// Split `0..total` into `parts` contiguous ranges of `ceil(total / parts)` items.
///
/// Trailing ranges are empty when `parts > total`.
pub fn partition(total: u64, parts: usize) -> anyhow::Result<Vec<Range<u64>>> {
    if parts == 0 {
        bail!("Cannot partition {total} items into zero parts");
    }
    let parts = parts as u64;
    let step = total.div_ceil(parts);

    Ok((0..parts)
        .map(|idx| {
            let start = step.saturating_mul(idx).min(total);
            let end = step.saturating_mul(idx + 1).min(total);
            start..end
        })
        .collect())
}
