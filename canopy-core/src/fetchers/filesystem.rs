use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use canopy_model::{ModelResult, Resource, ResourceMetadata, kinds::category};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::{
    error::{CollectorError, Result},
    fetching::{FetchContext, Fetcher},
};

const FILE_SUB_TYPE: &str = "file";
const DIR_SUB_TYPE: &str = "directory";

/// Stat result for one configured path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileResource {
    pub name: String,
    pub path: PathBuf,
    pub sub_type: &'static str,
    /// Permission bits in octal, e.g. `"644"`.
    pub mode: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inode: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl FileResource {
    fn from_metadata(path: &Path, meta: &std::fs::Metadata) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let sub_type = if meta.is_dir() {
            DIR_SUB_TYPE
        } else {
            FILE_SUB_TYPE
        };
        let (uid, gid, inode) = ownership(meta);

        Self {
            name,
            path: path.to_path_buf(),
            sub_type,
            mode: permission_bits(meta),
            size: meta.len(),
            uid,
            gid,
            inode,
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.sub_type == DIR_SUB_TYPE
    }
}

impl Resource for FileResource {
    fn metadata(&self) -> ModelResult<ResourceMetadata> {
        let path = self.path.display().to_string();
        Ok(ResourceMetadata::new(path.clone(), category::FILE)
            .with_sub_type(self.sub_type)
            .with_name(path))
    }

    fn data(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(unix)]
fn permission_bits(meta: &std::fs::Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    format!("{:o}", meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn permission_bits(meta: &std::fs::Metadata) -> String {
    if meta.permissions().readonly() { "444" } else { "644" }.to_string()
}

#[cfg(unix)]
fn ownership(meta: &std::fs::Metadata) -> (Option<u32>, Option<u32>, Option<u64>) {
    use std::os::unix::fs::MetadataExt;
    (Some(meta.uid()), Some(meta.gid()), Some(meta.ino()))
}

#[cfg(not(unix))]
fn ownership(_meta: &std::fs::Metadata) -> (Option<u32>, Option<u32>, Option<u64>) {
    (None, None, None)
}

/// Publishes a [`FileResource`] for every configured path that exists.
///
/// Missing paths are skipped with a warning; any other stat failure is logged
/// and skipped so one unreadable path does not hide the rest.
#[derive(Clone, Debug)]
pub struct FileSystemFetcher {
    paths: Vec<PathBuf>,
}

impl FileSystemFetcher {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    async fn stat(path: &Path) -> io::Result<Option<FileResource>> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(Some(FileResource::from_metadata(path, &meta))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl Fetcher for FileSystemFetcher {
    async fn fetch(&self, ctx: FetchContext) -> Result<()> {
        debug!(target: "canopy::fetchers", paths = self.paths.len(), "starting file system fetch");

        for path in &self.paths {
            if ctx.is_cancelled() {
                return Err(CollectorError::Cancelled(ctx.publisher.fetcher().to_string()));
            }

            match Self::stat(path).await {
                Ok(Some(resource)) => ctx.publish(resource).await?,
                Ok(None) => {
                    warn!(target: "canopy::fetchers", path = %path.display(), "path does not exist, skipping");
                }
                Err(err) => {
                    error!(target: "canopy::fetchers", path = %path.display(), error = %err, "unable to stat path");
                }
            }
        }

        Ok(())
    }
}
