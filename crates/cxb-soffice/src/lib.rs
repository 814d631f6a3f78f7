//! LibreOffice adapter for document conversion.
//!
//! Runs `soffice --headless --convert-to xlsx` inside a per-job temp
//! directory, bounded by a wall-clock timeout.

use std::{
    collections::VecDeque,
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;

use cxb_core::{
    config::{which_in_path, Config},
    convert::{ConversionJob, DocumentConverter, TARGET_EXTENSION},
    errors::ConversionError,
};

use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
    sync::Mutex,
};
use tracing::{debug, info, warn};
use url::Url;

const STDERR_TAIL_MAX_BYTES: usize = 8 * 1024;
const STDERR_TAIL_MAX_LINES: usize = 50;
const STDERR_DRAIN_GRACE: Duration = Duration::from_secs(2);
const DEFAULT_BINARIES: &[&str] = &["soffice", "libreoffice"];

#[derive(Clone, Debug)]
pub struct SofficeConfig {
    /// Explicit binary path; tried before `PATH`.
    pub binary: Option<PathBuf>,
    /// Names looked up on `PATH` when there is no usable override.
    pub search_names: Vec<String>,
    pub timeout: Duration,
    /// Parent directory for per-job temp directories.
    pub temp_dir: PathBuf,
}

impl SofficeConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            binary: cfg.soffice_path.clone(),
            search_names: DEFAULT_BINARIES.iter().map(|s| s.to_string()).collect(),
            timeout: cfg.conversion_timeout,
            temp_dir: cfg.temp_dir.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SofficeConverter {
    cfg: SofficeConfig,
}

#[derive(Clone, Debug, Default)]
struct StderrTail {
    lines: VecDeque<String>,
    bytes: usize,
}

impl StderrTail {
    fn push_line(&mut self, line: String) {
        self.bytes = self.bytes.saturating_add(line.len() + 1);
        self.lines.push_back(line);

        while self.lines.len() > STDERR_TAIL_MAX_LINES || self.bytes > STDERR_TAIL_MAX_BYTES {
            if let Some(front) = self.lines.pop_front() {
                self.bytes = self.bytes.saturating_sub(front.len() + 1);
            } else {
                break;
            }
        }
    }

    fn snapshot(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

impl SofficeConverter {
    pub fn new(cfg: SofficeConfig) -> Self {
        Self { cfg }
    }

    /// Explicit override first, then each search name on `PATH`.
    pub fn resolve_binary(&self) -> Result<PathBuf, ConversionError> {
        if let Some(p) = &self.cfg.binary {
            if p.is_file() {
                return Ok(p.clone());
            }
            warn!(path = %p.display(), "configured converter binary not found, searching PATH");
        }
        for name in &self.cfg.search_names {
            if let Some(p) = which_in_path(name) {
                return Ok(p);
            }
        }
        let mut tried = self
            .cfg
            .binary
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>();
        tried.extend(self.cfg.search_names.iter().cloned());
        Err(ConversionError::BinaryNotFound(tried.join(", ")))
    }

    async fn run(&self, binary: &Path, job: &ConversionJob) -> Result<(), ConversionError> {
        let mut std_cmd = std::process::Command::new(binary);
        std_cmd
            .args(build_args(job)?)
            .current_dir(job.dir())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group, so a timeout can take down soffice's helpers too.
            std_cmd.process_group(0);
        }
        let mut cmd = Command::from(std_cmd);
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ConversionError::BinaryNotFound(format!("{}: {e}", binary.display()))
            }
            _ => ConversionError::Io(e),
        })?;
        let pid = child.id();

        // Drain stderr in background to avoid blocking on a full pipe.
        let stderr_tail: Arc<Mutex<StderrTail>> = Arc::new(Mutex::new(StderrTail::default()));
        let drain = child.stderr.take().map(|stderr| {
            let tail = stderr_tail.clone();
            tokio::spawn(async move {
                let mut r = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = r.next_line().await {
                    tail.lock().await.push_line(line);
                }
            })
        });

        let waited = tokio::time::timeout(self.cfg.timeout, child.wait()).await;

        let status = match waited {
            Ok(status) => status?,
            Err(_) => {
                // The leader is not reaped yet, so its pid still names the group.
                kill_process_group(pid);
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill timed out converter");
                }
                if let Some(h) = drain {
                    h.abort();
                }
                return Err(ConversionError::Timeout {
                    after: self.cfg.timeout,
                });
            }
        };

        // A helper that inherited stderr may outlive the leader; do not wait on it.
        if let Some(mut h) = drain {
            if tokio::time::timeout(STDERR_DRAIN_GRACE, &mut h).await.is_err() {
                h.abort();
            }
        }

        if !status.success() {
            return Err(ConversionError::NonZeroExit {
                status: status.to_string(),
                stderr: stderr_tail.lock().await.snapshot(),
            });
        }
        Ok(())
    }
}

/// Argument list for one headless conversion.
///
/// Each job gets its own LibreOffice profile so concurrent conversions do not
/// fight over the user installation lock.
pub fn build_args(job: &ConversionJob) -> Result<Vec<OsString>, ConversionError> {
    Ok(vec![
        OsString::from("--headless"),
        OsString::from("--norestore"),
        OsString::from("--nolockcheck"),
        OsString::from(format!("-env:UserInstallation={}", profile_url(job)?)),
        OsString::from("--convert-to"),
        OsString::from(TARGET_EXTENSION),
        OsString::from("--outdir"),
        job.dir().as_os_str().to_os_string(),
        job.input_path().as_os_str().to_os_string(),
    ])
}

/// Percent-encoded `file://` URL of the job's private profile directory.
fn profile_url(job: &ConversionJob) -> Result<Url, ConversionError> {
    let profile = std::path::absolute(job.dir().join("profile"))?;
    Url::from_directory_path(&profile).map_err(|()| {
        ConversionError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("cannot build profile url for {}", profile.display()),
        ))
    })
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    // SAFETY: plain syscall on a pid we spawned and have not reaped.
    // ESRCH (group already gone) is ignored.
    unsafe {
        libc::killpg(pid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[async_trait]
impl DocumentConverter for SofficeConverter {
    async fn convert(
        &self,
        bytes: Vec<u8>,
        declared_filename: &str,
    ) -> Result<Vec<u8>, ConversionError> {
        let binary = self.resolve_binary()?;
        let job = ConversionJob::prepare(&self.cfg.temp_dir, &bytes, declared_filename).await?;
        drop(bytes);

        let started = Instant::now();
        debug!(binary = %binary.display(), dir = %job.dir().display(), "starting conversion");
        self.run(&binary, &job).await?;
        let out = job.read_output().await?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            output_bytes = out.len(),
            "conversion finished"
        );

        if let Err(e) = job.close() {
            warn!(error = %e, "failed to remove conversion job directory");
        }
        Ok(out)
    }
}
