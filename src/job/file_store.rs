// src/job/file_store.rs

//! One JSON file per job under `<root>/jobs/`.
//!
//! Writers take `<id>.lock` (created exclusively) before touching
//! `<id>.json`, and write through a temp file + rename so readers never see
//! a torn record. A lock older than [`STALE_LOCK_AFTER`] is assumed to be
//! left over by a crashed process and is broken.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use anyhow::anyhow;
use tracing::{debug, warn};

use crate::errors::{EvalflowError, Result};
use crate::job::store::JobStore;
use crate::job::{Job, validate_job_id};
use crate::types::JobState;

const JOBS_DIR: &str = "jobs";
const LOCK_RETRY: Duration = Duration::from_millis(10);
const LOCK_ATTEMPTS: usize = 500;
pub const STALE_LOCK_AFTER: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct FileJobStore {
    jobs_dir: PathBuf,
}

impl FileJobStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let jobs_dir = root.as_ref().join(JOBS_DIR);
        fs::create_dir_all(&jobs_dir)?;
        debug!(dir = %jobs_dir.display(), "opened file job store");
        Ok(Self { jobs_dir })
    }

    pub fn jobs_dir(&self) -> &Path {
        &self.jobs_dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.jobs_dir.join(format!("{id}.json"))
    }

    fn lock_path(&self, id: &str) -> PathBuf {
        self.jobs_dir.join(format!("{id}.lock"))
    }

    fn read_record(&self, path: &Path) -> Result<Job> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_record(&self, job: &Job) -> Result<()> {
        let path = self.record_path(&job.id);
        let tmp_path = self.jobs_dir.join(format!("{}.json.tmp", job.id));
        let json = serde_json::to_string_pretty(job)?;
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn acquire(&self, id: &str) -> Result<LockGuard> {
        let path = self.lock_path(id);
        for _ in 0..LOCK_ATTEMPTS {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(LockGuard { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path) {
                        warn!(lock = %path.display(), "breaking stale job lock");
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    thread::sleep(LOCK_RETRY);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(EvalflowError::Other(anyhow!(
            "timed out waiting for job lock {}",
            path.display()
        )))
    }
}

fn lock_is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > STALE_LOCK_AFTER)
}

/// Removes the lock file when dropped.
struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "failed to release job lock");
        }
    }
}

impl JobStore for FileJobStore {
    fn insert(&self, job: &Job) -> Result<()> {
        validate_job_id(&job.id)?;
        let _lock = self.acquire(&job.id)?;
        if self.record_path(&job.id).exists() {
            return Err(EvalflowError::InvalidInput(format!(
                "job {} already exists",
                job.id
            )));
        }
        self.write_record(job)?;
        debug!(job = %job.id, "inserted job");
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Job>> {
        if id.is_empty() || id.contains(['/', '\\', '.']) {
            return Ok(None);
        }
        let path = self.record_path(id);
        match self.read_record(&path) {
            Ok(job) => Ok(Some(job)),
            Err(EvalflowError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn all(&self) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        for entry in fs::read_dir(&self.jobs_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read_record(&path) {
                Ok(job) => jobs.push(job),
                // Deleted between read_dir and read.
                Err(EvalflowError::Io(e)) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(jobs)
    }

    fn compare_and_set(&self, expected: JobState, job: &Job) -> Result<bool> {
        let _lock = self.acquire(&job.id)?;
        let current = self
            .get(&job.id)?
            .ok_or_else(|| EvalflowError::JobNotFound(job.id.clone()))?;
        if current.state != expected || current.revision != job.revision {
            return Ok(false);
        }
        let mut next = job.clone();
        next.revision += 1;
        self.write_record(&next)?;
        Ok(true)
    }
}
