use anyhow::{bail, Context};
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

/// A coordination endpoint that executors connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerAddress {
    pub host: String,
    pub port: u16,
}

impl Display for WorkerAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for WorkerAddress {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut fields = line.split_whitespace();
        let (Some(host), Some(port), None) = (fields.next(), fields.next(), fields.next()) else {
            bail!("Expected `HOST PORT`, got {line:?}");
        };
        let port = port
            .parse()
            .with_context(|| format!("Invalid port {port:?} for host {host}"))?;
        Ok(WorkerAddress {
            host: host.to_string(),
            port,
        })
    }
}

/// Read one address per line. Blank lines are skipped, order is kept.
pub fn parse_addresses(reader: impl BufRead) -> anyhow::Result<Vec<WorkerAddress>> {
    let mut addresses = vec![];
    for (idx, line) in reader.lines().enumerate() {
        let line = line.context("Error reading address list")?;
        if line.trim().is_empty() {
            continue;
        }
        let address = line
            .parse()
            .with_context(|| format!("Malformed address on line {}", idx + 1))?;
        addresses.push(address);
    }
    if addresses.is_empty() {
        bail!("Address list is empty");
    }
    Ok(addresses)
}

pub fn load_addresses(path: &Path) -> anyhow::Result<Vec<WorkerAddress>> {
    let file = File::open(path)
        .with_context(|| format!("Error opening address list {}", path.display()))?;
    parse_addresses(BufReader::new(file))
        .with_context(|| format!("Error parsing address list {}", path.display()))
}
