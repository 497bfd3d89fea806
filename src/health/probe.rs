// src/health/probe.rs

//! Host and service probes.
//!
//! Probes report errors; callers decide how to degrade. The monitor and the
//! diagnostics collector both map a failed sample to `0`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::types::BoxFuture;

/// Resource usage percentages of the host.
pub trait SystemProbe: Send + Sync {
    fn disk_usage(&self) -> BoxFuture<'_, Result<f64>>;
    fn memory_usage(&self) -> BoxFuture<'_, Result<f64>>;
}

/// Reads `statvfs(2)` for disk and `/proc/meminfo` for memory.
#[derive(Debug, Clone)]
pub struct HostProbe {
    disk_path: PathBuf,
    meminfo_path: PathBuf,
}

impl HostProbe {
    pub fn new(disk_path: impl Into<PathBuf>) -> Self {
        Self {
            disk_path: disk_path.into(),
            meminfo_path: PathBuf::from("/proc/meminfo"),
        }
    }
}

impl SystemProbe for HostProbe {
    fn disk_usage(&self) -> BoxFuture<'_, Result<f64>> {
        Box::pin(async move {
            let path = self.disk_path.clone();
            tokio::task::spawn_blocking(move || statvfs_usage(&path))
                .await
                .context("disk probe task panicked")?
        })
    }

    fn memory_usage(&self) -> BoxFuture<'_, Result<f64>> {
        Box::pin(async move {
            let text = tokio::fs::read_to_string(&self.meminfo_path)
                .await
                .with_context(|| format!("reading {}", self.meminfo_path.display()))?;
            parse_meminfo(&text).ok_or_else(|| anyhow!("MemTotal/MemAvailable missing"))
        })
    }
}

#[cfg(unix)]
fn statvfs_usage(path: &Path) -> Result<f64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .with_context(|| format!("disk path {} contains a NUL byte", path.display()))?;
    // SAFETY: statvfs is plain old data and fully written on success.
    let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut st) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error())
            .with_context(|| format!("statvfs({})", path.display()));
    }

    let frsize = st.f_frsize as f64;
    let used = (st.f_blocks as f64 - st.f_bfree as f64) * frsize;
    let avail = st.f_bavail as f64 * frsize;
    if used + avail <= 0.0 {
        return Ok(0.0);
    }
    // Same rounding base as df(1): reserved blocks count as unavailable.
    Ok(used / (used + avail) * 100.0)
}

#[cfg(not(unix))]
fn statvfs_usage(path: &Path) -> Result<f64> {
    Err(anyhow!("disk usage is not supported on this platform ({})", path.display()))
}

/// `(MemTotal - MemAvailable) / MemTotal * 100`.
pub fn parse_meminfo(text: &str) -> Option<f64> {
    let field = |name: &str| -> Option<f64> {
        text.lines()
            .find_map(|l| l.strip_prefix(name))
            .and_then(|rest| rest.trim_start_matches(':').split_whitespace().next())
            .and_then(|v| v.parse::<f64>().ok())
    };
    let total = field("MemTotal")?;
    let available = field("MemAvailable")?;
    if total <= 0.0 {
        return None;
    }
    Some(((total - available) / total * 100.0).clamp(0.0, 100.0))
}

/// HTTP health endpoint reported as `"up"` / `"down"`.
///
/// Any 2xx response is up; other statuses, connection errors and timeouts
/// are down.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building probe HTTP client")?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn is_up(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                debug!(url = %self.url, status = %resp.status(), "health endpoint unhealthy");
                false
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "health endpoint unreachable");
                false
            }
        }
    }
}
