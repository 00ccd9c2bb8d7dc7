use clap::Parser;
use futures_util::StreamExt;
use indicatif::ProgressBar;
use itertools::Itertools;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub static ALPHANUMERIC: &str = "abcdefghijklmnopqrstuvwxyz0123456789";
pub static ALPHANUMERIC_WITH_SPACE: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789 ";

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory to create the vocabulary, batches and address list in
    output_dir: PathBuf,

    #[arg(long, default_value = "10000")]
    tokens: usize,

    #[arg(long, default_value = "100")]
    batches: usize,

    #[arg(long, default_value = "4")]
    workers: u16,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value = "6379")]
    base_port: u16,

    #[arg(long, default_value = "16")]
    concurrency: usize,

    #[arg(long, default_value = "5KB")]
    batch_size: byte_unit::Byte,
}

fn vocabulary(tokens: usize) -> String {
    (0..tokens)
        .map(|idx| format!("{}_{idx}", random_string::generate(6, ALPHANUMERIC)))
        .join("\n")
}

fn addresses(host: &str, base_port: u16, workers: u16) -> anyhow::Result<String> {
    let lines = (0..workers)
        .map(|idx| {
            base_port
                .checked_add(idx)
                .map(|port| format!("{host} {port}\n"))
                .ok_or_else(|| anyhow::anyhow!("Port overflow for worker {idx}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(lines.concat())
}

async fn write_batches(
    dir: &Path,
    count: usize,
    batch_size: usize,
    concurrency: usize,
) -> anyhow::Result<usize> {
    tokio::fs::create_dir_all(dir).await?;

    let futures = (0..count).map(|_| {
        let path = dir.join(format!("{}.batch", Uuid::now_v7()));
        let body = random_string::generate(batch_size, ALPHANUMERIC_WITH_SPACE);
        async move {
            tokio::fs::write(&path, &body).await?;
            Ok::<_, anyhow::Error>(body.len())
        }
    });

    let mut stream = futures_util::stream::iter(futures).buffer_unordered(concurrency.max(1));

    let pbar = ProgressBar::new(count as u64);

    let mut total_bytes = 0;
    while let Some(result) = stream.next().await {
        total_bytes += result?;
        pbar.inc(1);
    }

    pbar.finish();
    Ok(total_bytes)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    tokio::fs::create_dir_all(&args.output_dir).await?;

    let vocab_path = args.output_dir.join("vocab.txt");
    tokio::fs::write(&vocab_path, vocabulary(args.tokens)).await?;
    println!("Wrote {} tokens to {}", args.tokens, vocab_path.display());

    let addresses_path = args.output_dir.join("addresses.txt");
    tokio::fs::write(
        &addresses_path,
        addresses(&args.host, args.base_port, args.workers)?,
    )
    .await?;
    println!(
        "Wrote {} addresses to {}",
        args.workers,
        addresses_path.display()
    );

    let batches_path = args.output_dir.join("batches");
    let total_bytes = write_batches(
        &batches_path,
        args.batches,
        args.batch_size.as_u64() as usize,
        args.concurrency,
    )
    .await?;

    println!(
        "Wrote {} batches ({}) to {}",
        args.batches,
        human_bytes::human_bytes(total_bytes as f64),
        batches_path.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabulary_has_one_token_per_line() {
        let vocab = vocabulary(5);
        let tokens: Vec<_> = vocab.lines().collect();
        assert_eq!(tokens.len(), 5);
        assert!(tokens[4].ends_with("_4"));
        assert_eq!(vocabulary(0), "");
    }

    #[test]
    fn addresses_use_consecutive_ports() {
        assert_eq!(
            addresses("10.0.0.1", 7000, 3).unwrap(),
            "10.0.0.1 7000\n10.0.0.1 7001\n10.0.0.1 7002\n"
        );
        assert!(addresses("h", u16::MAX, 2).is_err());
    }

    #[tokio::test]
    async fn writes_requested_number_of_batches() {
        let dir = tempfile::tempdir().unwrap();
        let batches = dir.path().join("batches");
        let total = write_batches(&batches, 7, 32, 3).await.unwrap();
        assert_eq!(total, 7 * 32);
        assert_eq!(std::fs::read_dir(&batches).unwrap().count(), 7);
    }
}
