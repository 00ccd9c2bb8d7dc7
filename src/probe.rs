use anyhow::Context;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

/// Number of tokens in a vocabulary file, one token per line.
///
/// Lines are split on raw `\n` bytes, so the file need not be UTF-8. A trailing line
/// without a newline still counts, matching how executors read the file.
pub fn count_tokens(vocab: &Path) -> anyhow::Result<u64> {
    let file =
        File::open(vocab).with_context(|| format!("Error opening vocabulary {}", vocab.display()))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or_default();
    debug!("Vocabulary {} is {}", vocab.display(), bytesize::ByteSize(size));

    let mut count = 0;
    for line in BufReader::new(file).split(b'\n') {
        line.with_context(|| format!("Error reading vocabulary {}", vocab.display()))?;
        count += 1;
    }
    info!("Number of tokens: {count}");
    if count == 0 {
        warn!("Vocabulary {} is empty", vocab.display());
    }
    Ok(count)
}

/// Number of entries in the batches directory. Executors index every entry, hidden or not.
pub fn count_batches(batches: &Path) -> anyhow::Result<u64> {
    let entries = std::fs::read_dir(batches)
        .with_context(|| format!("Error listing batches directory {}", batches.display()))?;

    let mut count = 0;
    for entry in entries {
        entry.with_context(|| format!("Error listing batches directory {}", batches.display()))?;
        count += 1;
    }
    info!("Number of batches: {count}");
    if count == 0 {
        warn!("Batches directory {} is empty", batches.display());
    }
    Ok(count)
}
