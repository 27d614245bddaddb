//! Git access for mirrors.
//!
//! Network work (shallow clone, single-ref fetch) goes through the `git` CLI with
//! prompts, hooks and LFS smudging disabled. Reading HEAD uses libgit2. The sync
//! manager only sees the [`GitTransport`] trait, so tests swap in a fake.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use git2::Repository;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GitError {
    #[error("libgit2: {0}")]
    Git(#[from] git2::Error),

    #[error("no git repository at {}", .0.display())]
    NotARepository(PathBuf),

    /// The requested branch or tag does not exist on the remote.
    #[error("ref '{0}' does not exist on the remote")]
    RefNotFound(String),

    #[error("git {step} failed: {stderr}")]
    CommandFailed { step: &'static str, stderr: String },

    /// Includes git not being installed.
    #[error("could not run git: {0}")]
    Io(#[from] io::Error),

    #[error("refusing {what} '{value}': {reason}")]
    Rejected {
        what: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl GitError {
    fn failed(step: &'static str, output: &Output) -> Self {
        GitError::CommandFailed {
            step,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

/// The version-control operations the sync manager relies on.
///
/// Implementations report a ref missing on the remote as [`GitError::RefNotFound`],
/// distinct from every other failure.
pub trait GitTransport: Send + Sync {
    /// Clone `remote` at `git_ref` into `dest`, which must not exist. Nothing is left
    /// at `dest` on failure.
    fn clone_ref(&self, remote: &str, git_ref: &str, dest: &Path) -> Result<(), GitError>;

    /// Fetch `git_ref` from origin into an existing checkout and check it out.
    fn update_ref(&self, checkout: &Path, git_ref: &str) -> Result<(), GitError>;

    fn head_commit(&self, _checkout: &Path) -> Option<String> {
        None
    }

    /// Whether `path` itself holds a checkout. Enclosing repositories do not count.
    fn is_checkout(&self, path: &Path) -> bool {
        repository_exists(path)
    }
}

fn rejected(what: &'static str, value: &str, reason: &'static str) -> GitError {
    GitError::Rejected {
        what,
        value: value.escape_debug().to_string(),
        reason,
    }
}

/// Branch and tag names are passed as arguments, so anything that could read as a
/// flag or walk out of `refs/` is refused.
pub(crate) fn check_ref(git_ref: &str) -> Result<(), GitError> {
    let reason = if git_ref.is_empty() {
        Some("empty")
    } else if git_ref.starts_with('-') {
        Some("leading '-'")
    } else if git_ref.contains("..") {
        Some("contains '..'")
    } else if git_ref.chars().any(|c| c.is_control() || c == ' ') {
        Some("contains whitespace or control characters")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(rejected("ref", git_ref, reason)),
        None => Ok(()),
    }
}

/// Remotes come from configuration; `ext::` transports would run arbitrary commands.
pub(crate) fn check_remote(remote: &str) -> Result<(), GitError> {
    let reason = if remote.is_empty() {
        Some("empty")
    } else if remote.starts_with('-') {
        Some("leading '-'")
    } else if remote.chars().any(|c| c.is_whitespace() || c.is_control()) {
        Some("contains whitespace or control characters")
    } else if remote.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("ext::")) {
        Some("ext:: transport")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(rejected("remote", remote, reason)),
        None => Ok(()),
    }
}

/// `git clone --branch X` says "Remote branch X not found in upstream origin";
/// `git fetch origin X` says "couldn't find remote ref X".
fn is_missing_ref(stderr: &[u8]) -> bool {
    let stderr = String::from_utf8_lossy(stderr).to_ascii_lowercase();
    stderr.contains("not found in upstream") || stderr.contains("couldn't find remote ref")
}

/// Shells out to `git` for everything that touches the network.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    /// `git` from `PATH`.
    pub fn new() -> Self {
        Self::with_git_path("git")
    }

    pub fn with_git_path(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Base command: no terminal prompts, no hooks, no LFS downloads, no stdin.
    fn git(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_LFS_SKIP_SMUDGE", "1")
            .args(["-c", "core.hooksPath="])
            .stdin(Stdio::null());
        cmd
    }

    /// Command bound to `checkout`. The explicit git dir stops git from searching
    /// parent directories for a repository.
    fn git_in(&self, checkout: &Path) -> Command {
        let mut cmd = self.git();
        cmd.arg("--git-dir")
            .arg(checkout.join(".git"))
            .arg("--work-tree")
            .arg(checkout);
        cmd
    }

    pub fn is_available(&self) -> bool {
        self.git()
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }
}

impl GitTransport for GitCli {
    fn clone_ref(&self, remote: &str, git_ref: &str, dest: &Path) -> Result<(), GitError> {
        check_remote(remote)?;
        check_ref(git_ref)?;

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        log::debug!("git clone {} ({}) into {}", remote, git_ref, dest.display());
        let output = self
            .git()
            .args(["clone", "--depth=1", "--single-branch", "--branch", git_ref, "--"])
            .arg(remote)
            .arg(dest)
            .output()?;

        if output.status.success() {
            return Ok(());
        }

        if dest.exists() {
            let _ = std::fs::remove_dir_all(dest);
        }
        if is_missing_ref(&output.stderr) {
            Err(GitError::RefNotFound(git_ref.to_string()))
        } else {
            Err(GitError::failed("clone", &output))
        }
    }

    fn update_ref(&self, checkout: &Path, git_ref: &str) -> Result<(), GitError> {
        check_ref(git_ref)?;
        if !checkout.join(".git").is_dir() {
            return Err(GitError::NotARepository(checkout.to_path_buf()));
        }

        log::debug!("git fetch {} in {}", git_ref, checkout.display());
        let fetch = self
            .git_in(checkout)
            .args(["fetch", "--depth=1", "origin", git_ref])
            .output()?;
        if !fetch.status.success() {
            if is_missing_ref(&fetch.stderr) {
                return Err(GitError::RefNotFound(git_ref.to_string()));
            }
            return Err(GitError::failed("fetch", &fetch));
        }

        // Detached, so branches and tags check out the same way.
        let checkout_out = self
            .git_in(checkout)
            .args(["checkout", "--force", "--detach", "FETCH_HEAD"])
            .output()?;
        if !checkout_out.status.success() {
            return Err(GitError::failed("checkout", &checkout_out));
        }

        Ok(())
    }

    fn head_commit(&self, checkout: &Path) -> Option<String> {
        open_repository(checkout)
            .and_then(|repo| head_commit_id(&repo))
            .inspect_err(|e| log::debug!("No HEAD for {}: {}", checkout.display(), e))
            .ok()
    }
}

/// Open the repository checked out at `path`.
pub fn open_repository(path: &Path) -> Result<Repository, GitError> {
    Repository::open(path).map_err(|e| match e.code() {
        git2::ErrorCode::NotFound => GitError::NotARepository(path.to_path_buf()),
        _ => GitError::Git(e),
    })
}

/// Commit id HEAD resolves to, attached or detached.
fn head_commit_id(repo: &Repository) -> Result<String, GitError> {
    Ok(repo.head()?.peel_to_commit()?.id().to_string())
}

pub fn repository_exists(path: &Path) -> bool {
    open_repository(path).is_ok()
}
