use context_protocol::RepoState;
use std::path::Path;
use tokio::time::{timeout, Duration};

// Key derivation sits on the request path; a hung git must not stall it.
const GIT_TIMEOUT: Duration = Duration::from_millis(1_000);

/// Current branch and short commit of the repository at `root`.
/// Any failure (no git, not a repo, timeout) yields `unknown` for both.
pub async fn probe_repo_state(root: &Path) -> RepoState {
    let branch = git_stdout(root, &["rev-parse", "--abbrev-ref", "HEAD"]).await;
    let commit = git_stdout(root, &["rev-parse", "--short", "HEAD"]).await;
    match (branch, commit) {
        (Some(branch), Some(commit)) => RepoState::new(branch, commit),
        _ => {
            log::debug!(
                "Repository state unavailable for {}, using unknown",
                root.display()
            );
            RepoState::unknown()
        }
    }
}

async fn git_stdout(root: &Path, args: &[&str]) -> Option<String> {
    let output = timeout(
        GIT_TIMEOUT,
        tokio::process::Command::new("git")
            .arg("-C")
            .arg(root)
            .args(args)
            .kill_on_drop(true)
            .output(),
    )
    .await
    .ok()?
    .ok()?;
    if !output.status.success() {
        return None;
    }
    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_repository_falls_back_to_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let state = probe_repo_state(dir.path()).await;
        // tempdir may sit inside a checkout on some hosts; either way the probe returns
        if !state.is_unknown() {
            assert!(!state.branch.is_empty());
            assert!(!state.commit.is_empty());
        }
    }

    #[tokio::test]
    async fn missing_directory_falls_back_to_unknown() {
        let state = probe_repo_state(Path::new("/definitely/not/a/repo/here")).await;
        assert!(state.is_unknown());
    }
}
