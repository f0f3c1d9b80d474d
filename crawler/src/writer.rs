//! Atomic persistence of crawl results.
//!
//! Results are written to a temporary file next to the destination and then
//! renamed over it, so the destination always holds either the previous
//! complete log or the new complete log.

use dht_crawler_transport::NodeAddress;
use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;

/// Extension appended to the destination path for the temporary file.
const TEMP_FILE_EXT: &str = ".tmp";
/// Extension of log files in the dated layout.
const LOG_FILE_EXT: &str = "cwl";

/// Errors that can occur while persisting crawl results.
#[derive(Debug)]
pub enum PersistError {
    /// The directory for the log could not be created.
    CreateDirectory(PathBuf, io::Error),
    /// The temporary file could not be written.
    WriteTemp(PathBuf, io::Error),
    /// The temporary file could not be renamed over the destination.
    Rename(PathBuf, io::Error),
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::CreateDirectory(path, err) => {
                write!(f, "Failed to create log directory {}: {err}", path.display())
            }
            PersistError::WriteTemp(path, err) => {
                write!(f, "Failed to write temporary log {}: {err}", path.display())
            }
            PersistError::Rename(path, err) => {
                write!(f, "Failed to move log into place at {}: {err}", path.display())
            }
        }
    }
}

impl std::error::Error for PersistError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistError::CreateDirectory(_, err)
            | PersistError::WriteTemp(_, err)
            | PersistError::Rename(_, err) => Some(err),
        }
    }
}

/// Where a finished crawl's log goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    /// Always the same file, each crawl replaces the previous log.
    File(PathBuf),
    /// One file per crawl at `dir/YYYY-MM-DD/<unix seconds>.cwl` (UTC).
    Dated(PathBuf),
}

impl LogDestination {
    /// Resolve the file path a crawl finishing at `now` writes to.
    pub fn path_at(&self, now: OffsetDateTime) -> PathBuf {
        match self {
            LogDestination::File(path) => path.clone(),
            LogDestination::Dated(dir) => {
                let date = now
                    .format(format_description!("[year]-[month]-[day]"))
                    .unwrap_or_else(|_| "unknown-date".to_string());
                dir.join(date)
                    .join(format!("{}.{LOG_FILE_EXT}", now.unix_timestamp()))
            }
        }
    }
}

impl Default for LogDestination {
    fn default() -> Self {
        LogDestination::File(PathBuf::from("crawler.log"))
    }
}

/// Writes finished crawls to their [`LogDestination`].
#[derive(Debug, Clone, Default)]
pub struct ResultWriter {
    destination: LogDestination,
}

impl ResultWriter {
    pub fn new(destination: LogDestination) -> Self {
        ResultWriter { destination }
    }

    pub fn destination(&self) -> &LogDestination {
        &self.destination
    }

    /// Persist the addresses of a finished crawl.
    ///
    /// # Returns
    ///
    /// * `Ok(PathBuf)` - The path the log now lives at.
    /// * `Err(PersistError)` - If any step failed. The previous log is untouched.
    pub async fn persist(
        &self,
        instance_id: u64,
        addresses: &[NodeAddress],
    ) -> Result<PathBuf, PersistError> {
        let destination = self.destination.path_at(OffsetDateTime::now_utc());
        if let LogDestination::Dated(_) = self.destination {
            if let Some(dir) = destination.parent() {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| PersistError::CreateDirectory(dir.to_path_buf(), e))?;
            }
        }

        let temp = temp_path(&destination, instance_id);
        persist_with(addresses, &temp, &destination, |from, to| {
            tokio::fs::rename(from, to)
        })
        .await?;
        Ok(destination)
    }
}

/// Temporary path used by instance `instance_id` while writing `destination`.
///
/// Instances may finish at the same time, each gets its own temporary file.
pub fn temp_path(destination: &Path, instance_id: u64) -> PathBuf {
    let mut path = destination.as_os_str().to_owned();
    path.push(format!(".{instance_id}{TEMP_FILE_EXT}"));
    PathBuf::from(path)
}

/// Space separated host list, one entry per address in order.
fn render(addresses: &[NodeAddress]) -> String {
    let mut out = String::with_capacity(addresses.len() * 16);
    for address in addresses {
        out.push_str(&address.host);
        out.push(' ');
    }
    out
}

/// Write `addresses` to `temp` and move it over `destination` with `rename`.
pub(crate) async fn persist_with<F, Fut>(
    addresses: &[NodeAddress],
    temp: &Path,
    destination: &Path,
    rename: F,
) -> Result<(), PersistError>
where
    F: FnOnce(PathBuf, PathBuf) -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    tokio::fs::write(temp, render(addresses))
        .await
        .map_err(|e| PersistError::WriteTemp(temp.to_path_buf(), e))?;

    if let Err(e) = rename(temp.to_path_buf(), destination.to_path_buf()).await {
        let _ = tokio::fs::remove_file(temp).await;
        return Err(PersistError::Rename(destination.to_path_buf(), e));
    }

    Ok(())
}
