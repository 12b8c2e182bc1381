use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

use crate::domain::RunId;
use crate::error::PointpackError;

const WORKSPACE_PREFIX: &str = "pointpack-";

/// Hands out per-run scratch directories below a shared root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: Utf8PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    /// `<system temp dir>/pointpack`.
    pub fn with_default_root() -> Result<Self, PointpackError> {
        let root = Utf8PathBuf::from_path_buf(std::env::temp_dir().join("pointpack"))
            .map_err(|_| PointpackError::WorkspaceIo("invalid temp dir path".to_string()))?;
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn workspace_path(&self, run_id: &RunId) -> Utf8PathBuf {
        self.root.join(format!("{WORKSPACE_PREFIX}{run_id}"))
    }

    /// Acquires a workspace under a freshly generated run id.
    pub fn acquire(&self) -> Result<Workspace, PointpackError> {
        self.acquire_for(RunId::generate())
    }

    /// Acquires the workspace for `run_id`, clearing whatever a previous run
    /// with the same identity left behind.
    pub fn acquire_for(&self, run_id: RunId) -> Result<Workspace, PointpackError> {
        let path = self.workspace_path(&run_id);
        if path.as_std_path().exists() {
            debug!(path = %path, "clearing stale workspace");
            fs::remove_dir_all(path.as_std_path())
                .map_err(|err| PointpackError::WorkspaceIo(format!("clear {path}: {err}")))?;
        }
        fs::create_dir_all(path.as_std_path())
            .map_err(|err| PointpackError::WorkspaceIo(format!("create {path}: {err}")))?;
        debug!(path = %path, "workspace acquired");
        Ok(Workspace {
            run_id,
            path,
            released: false,
        })
    }
}

/// Scratch directory owned by one run.
///
/// Removed by [`Workspace::release`], or on drop if never released.
#[derive(Debug)]
pub struct Workspace {
    run_id: RunId,
    path: Utf8PathBuf,
    released: bool,
}

impl Workspace {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn ensure_exists(&self) -> Result<(), PointpackError> {
        fs::create_dir_all(self.path.as_std_path())
            .map_err(|err| PointpackError::WorkspaceIo(format!("create {}: {err}", self.path)))
    }

    /// Regular files directly inside the workspace, sorted by name.
    pub fn list_files(&self) -> Result<Vec<Utf8PathBuf>, PointpackError> {
        let entries = fs::read_dir(self.path.as_std_path())
            .map_err(|err| PointpackError::WorkspaceIo(format!("list {}: {err}", self.path)))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| PointpackError::WorkspaceIo(err.to_string()))?;
            let path = Utf8PathBuf::from_path_buf(entry.path()).map_err(|path| {
                PointpackError::WorkspaceIo(format!("non-utf8 file name: {}", path.display()))
            })?;
            if path.as_std_path().is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn release(mut self) -> Result<(), PointpackError> {
        self.released = true;
        remove_workspace_dir(&self.path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = remove_workspace_dir(&self.path) {
            warn!(error = %err, "workspace cleanup failed");
        }
    }
}

fn remove_workspace_dir(path: &Utf8Path) -> Result<(), PointpackError> {
    if path.as_std_path().exists() {
        fs::remove_dir_all(path.as_std_path())
            .map_err(|err| PointpackError::WorkspaceIo(format!("remove {path}: {err}")))?;
    }
    debug!(path = %path, "workspace released");
    Ok(())
}
