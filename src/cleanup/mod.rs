// Cleanup of generated program directories
// The guard is created before generation starts and every program directory
// is registered with it, so whatever path the run takes out of the pipeline,
// the policy decides what happens to the generated trees.

use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CleanupPolicy {
    /// Remove after a successful run; keep everything (and list it) when the
    /// run fails
    #[default]
    OnSuccess,
    /// Remove on every exit path
    Always,
    /// Never remove
    Never,
}

#[derive(Debug)]
pub struct CleanupGuard {
    policy: CleanupPolicy,
    dirs: Vec<PathBuf>,
    committed: bool,
}

impl CleanupGuard {
    pub fn new(policy: CleanupPolicy) -> Self {
        Self {
            policy,
            dirs: Vec::new(),
            committed: false,
        }
    }

    pub fn register(&mut self, dir: impl Into<PathBuf>) {
        self.dirs.push(dir.into());
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Mark the run successful. Returns how many directories were removed.
    pub fn commit(mut self) -> Result<usize> {
        self.committed = true;
        let dirs = std::mem::take(&mut self.dirs);
        match self.policy {
            CleanupPolicy::Never => {
                info!("Keeping {} generated program(s)", dirs.len());
                Ok(0)
            }
            CleanupPolicy::OnSuccess | CleanupPolicy::Always => remove_dirs(&dirs),
        }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if self.committed || self.dirs.is_empty() {
            return;
        }
        match self.policy {
            CleanupPolicy::Always => {
                warn!("Run aborted, removing {} generated program(s)", self.dirs.len());
                if let Err(err) = remove_dirs(&self.dirs) {
                    warn!("Cleanup after failure incomplete: {err}");
                }
            }
            CleanupPolicy::OnSuccess | CleanupPolicy::Never => {
                warn!("Run aborted, generated programs left in place:");
                for dir in self.dirs.iter().filter(|d| d.exists()) {
                    warn!("  {}", dir.display());
                }
            }
        }
    }
}

/// Recursively delete every directory that still exists.
pub fn remove_dirs(dirs: &[PathBuf]) -> Result<usize> {
    let mut removed = 0;
    for dir in dirs {
        if remove_dir(dir)? {
            removed += 1;
        }
    }
    info!("Removed {removed} generated program(s)");
    Ok(removed)
}

fn remove_dir(dir: &Path) -> Result<bool> {
    if !dir.exists() {
        return Ok(false);
    }
    fs::remove_dir_all(dir)?;
    Ok(true)
}
