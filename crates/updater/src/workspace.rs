/// Partition directory helpers: ephemeral workspaces and file-level moves.
///
/// Workspaces are sibling directories of the partition data, named with a
/// fixed prefix plus a random UUID. A crash can leave them behind; they are
/// recognized by prefix alone and removed before the same phase runs again.
/// Failing to remove one is fatal, because a stray directory could later be
/// mistaken for live data.
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Cache subdirectory holding earlier bases and deltas.
pub const CACHE_DIR: &str = "cache";
/// Prefix of the directory versions are fetched into.
pub const FETCH_PREFIX: &str = "_fetch_";
/// Prefix of the directory the new partition state is built in.
pub const UPDATE_WORK_PREFIX: &str = "_update_work_";

/// Creates `path` (and parents) if it does not exist.
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("failed to create {}", path.display()))
}

/// Regular files directly inside `dir`, sorted by name. Subdirectories are skipped.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Deletes every directory in `root` whose name starts with `prefix`.
///
/// Returns how many were removed.
pub fn delete_stale_workspaces(root: &Path, prefix: &str) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(root).with_context(|| format!("failed to list {}", root.display()))? {
        let entry = entry?;
        let is_stale = entry.file_type()?.is_dir()
            && entry
                .file_name()
                .to_str()
                .map(|n| n.starts_with(prefix))
                .unwrap_or(false);
        if is_stale {
            let path = entry.path();
            tracing::warn!(path = %path.display(), "removing stale workspace");
            fs::remove_dir_all(&path)
                .with_context(|| format!("failed to remove stale workspace {}", path.display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Creates a fresh `<root>/<prefix><uuid>` directory.
pub fn create_workspace(root: &Path, prefix: &str) -> Result<PathBuf> {
    let path = root.join(format!("{}{}", prefix, Uuid::new_v4()));
    fs::create_dir(&path)
        .with_context(|| format!("failed to create workspace {}", path.display()))?;
    Ok(path)
}

/// Removes a workspace directory and everything in it. Missing is fine.
pub fn remove_workspace(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove workspace {}", path.display())),
    }
}

/// Runs `f` inside a fresh workspace named with `prefix`.
///
/// Stale workspaces with the same prefix are deleted first. The new workspace
/// is deleted afterwards whether `f` succeeded or not. If `f` fails, its error
/// wins over a cleanup error; otherwise a cleanup error is returned.
pub fn with_workspace<T>(root: &Path, prefix: &str, f: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
    delete_stale_workspaces(root, prefix)?;
    let workspace = create_workspace(root, prefix)?;
    let result = f(&workspace);
    let cleanup = remove_workspace(&workspace);
    match (result, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cleanup_err)) => {
            tracing::error!(
                workspace = %workspace.display(),
                error = %cleanup_err,
                "failed to remove workspace after failed phase"
            );
            Err(e)
        }
    }
}

/// Moves every regular file in `from` into `to`, replacing same-named files.
///
/// Each file is moved with a single `rename`. There is no rollback: if a
/// rename fails, files moved before it stay moved. Returns the number of
/// files moved.
pub fn move_files(from: &Path, to: &Path) -> Result<usize> {
    let files = list_files(from)?;
    for src in &files {
        let Some(name) = src.file_name() else {
            continue;
        };
        let dst = to.join(name);
        rename_overwrite(src, &dst)?;
        tracing::debug!(from = %src.display(), to = %dst.display(), "moved file");
    }
    Ok(files.len())
}

fn rename_overwrite(src: &Path, dst: &Path) -> Result<()> {
    // rename replaces an existing target on Unix; Windows refuses, so retry
    // after removing the target there.
    if let Err(first) = fs::rename(src, dst) {
        if dst.is_file() {
            fs::remove_file(dst)
                .with_context(|| format!("failed to replace {}", dst.display()))?;
            fs::rename(src, dst).with_context(|| {
                format!("failed to move {} to {}", src.display(), dst.display())
            })?;
        } else {
            return Err(first)
                .with_context(|| format!("failed to move {} to {}", src.display(), dst.display()));
        }
    }
    Ok(())
}
