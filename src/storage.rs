use anyhow::{bail, Context};
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{path::Path, ObjectStore};
use std::fmt::{Display, Formatter};
use std::path::{Component, PathBuf};
use tracing::debug;
use url::Url;

/// Where the executor manifest is written.
#[derive(Debug)]
pub struct ManifestStore {
    url: Url,
    store: Box<dyn ObjectStore>,
    path: Path,
}

impl Display for ManifestStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Resolve `.` and `..` without touching the filesystem; the target may not exist yet.
fn normalize(path: &std::path::Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Accept either an object store URL or a plain, possibly relative, local path.
pub fn parse_output_location(location: &str) -> anyhow::Result<Url> {
    if location.contains("://") {
        return Url::parse(location).with_context(|| format!("Invalid output URL {location}"));
    }
    let path = std::env::current_dir()
        .context("Error resolving current directory")?
        .join(location);
    Url::from_file_path(normalize(&path))
        .map_err(|_| anyhow::anyhow!("Invalid output path {location}"))
}

fn parse_url(url: &Url) -> anyhow::Result<(Box<dyn ObjectStore>, Path)> {
    // See https://github.com/apache/arrow-rs/pull/5912
    let (store, path) = match (url.scheme(), url.host_str()) {
        ("file", None) => (Box::new(LocalFileSystem::new()) as _, url.path()),
        ("memory", _) => (Box::new(InMemory::new()) as _, url.path()),
        ("s3" | "s3a", Some(_)) => (
            Box::new(
                AmazonS3Builder::from_env()
                    .with_url(url.to_string())
                    .build()?,
            ) as _,
            url.path(),
        ),
        ("gs", Some(_)) => (
            Box::new(
                GoogleCloudStorageBuilder::from_env()
                    .with_url(url.to_string())
                    .build()?,
            ) as _,
            url.path(),
        ),
        ("az" | "adl" | "azure" | "abfs" | "abfss", Some(_)) => (
            Box::new(
                MicrosoftAzureBuilder::from_env()
                    .with_url(url.to_string())
                    .build()?,
            ) as _,
            url.path(),
        ),
        _ => bail!("Unknown manifest target {url}."),
    };

    // URL paths are percent-encoded, object store paths are not.
    Ok((store, Path::from_url_path(path)?))
}

impl ManifestStore {
    pub fn from_url(url: &Url) -> anyhow::Result<ManifestStore> {
        let (store, path) = parse_url(url)?;
        Ok(ManifestStore {
            url: url.clone(),
            store,
            path,
        })
    }

    pub async fn write(&self, body: Vec<u8>) -> anyhow::Result<()> {
        debug!("Writing {} byte manifest to {:?}", body.len(), self.path);
        self.store
            .put(&self.path, Bytes::from(body).into())
            .await
            .with_context(|| format!("Error writing manifest to {self}"))?;
        Ok(())
    }

    #[cfg(test)]
    async fn read(&self) -> anyhow::Result<Bytes> {
        Ok(self.store.get(&self.path).await?.bytes().await?)
    }
}
