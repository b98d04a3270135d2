//! Workspace-scoped helpers available to actions

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::configs::settings::Settings;
use crate::execution::command::{CommandOutput, CommandRunner, Invocation};
use crate::types::ActionError;
use crate::variants::{ToolchainVariant, VariantSelector};

/// What an action gets to work with. Relative paths passed to the helpers
/// are resolved against the workspace.
pub struct ActionContext<'a> {
    pub target: &'a str,
    pub settings: &'a Settings,
    runner: &'a dyn CommandRunner,
    selector: &'a dyn VariantSelector,
}

impl<'a> ActionContext<'a> {
    pub fn new(
        target: &'a str,
        settings: &'a Settings,
        runner: &'a dyn CommandRunner,
        selector: &'a dyn VariantSelector,
    ) -> Self {
        Self {
            target,
            settings,
            runner,
            selector,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.settings.workspace_path
    }

    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.workspace().join(relative)
    }

    /// Run an invocation and fail on a non-zero exit. Invocations without a
    /// working directory run in the workspace.
    pub fn run(&self, invocation: Invocation) -> Result<CommandOutput, ActionError> {
        let invocation = self.in_workspace(invocation);
        self.runner.run(&invocation)?.check(&invocation)
    }

    /// Run an invocation and hand back its output whatever the exit status
    pub fn probe(&self, invocation: Invocation) -> Result<CommandOutput, ActionError> {
        let invocation = self.in_workspace(invocation);
        self.runner.run(&invocation)
    }

    pub fn shell(&self, script: &str) -> Result<(), ActionError> {
        self.run(Invocation::shell(script)).map(|_| ())
    }

    pub fn shell_in(&self, dir: impl AsRef<Path>, script: &str) -> Result<(), ActionError> {
        self.run(Invocation::shell(script).current_dir(self.path(dir)))
            .map(|_| ())
    }

    pub fn create_dir(&self, relative: impl AsRef<Path>) -> Result<PathBuf, ActionError> {
        let path = self.path(relative);
        fs::create_dir_all(&path)
            .map_err(|e| ActionError::io(format!("creating {}", path.display()), e))?;
        Ok(path)
    }

    /// Remove a file, symlink or directory tree if present
    pub fn remove(&self, relative: impl AsRef<Path>) -> Result<(), ActionError> {
        let path = self.path(relative);
        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(ActionError::io(format!("inspecting {}", path.display()), e)),
        };

        debug!(path = %path.display(), "removing stale path");
        let result = if metadata.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.map_err(|e| ActionError::io(format!("removing {}", path.display()), e))
    }

    /// Delete whatever a previous attempt left behind and start with an
    /// empty directory
    pub fn clobber_dir(&self, relative: impl AsRef<Path>) -> Result<PathBuf, ActionError> {
        self.remove(relative.as_ref())?;
        self.create_dir(relative)
    }

    /// Fresh clone of `url` into `relative`, replacing any partial checkout
    pub fn git_clone(&self, url: &str, relative: impl AsRef<Path>) -> Result<PathBuf, ActionError> {
        self.remove(relative.as_ref())?;
        let dest = self.path(relative);
        self.run(
            Invocation::new("git")
                .arg("clone")
                .arg(url)
                .arg(dest.display().to_string()),
        )?;
        Ok(dest)
    }

    pub fn download(&self, url: &str, relative: impl AsRef<Path>) -> Result<PathBuf, ActionError> {
        let dest = self.path(relative);
        self.run(
            Invocation::new("wget")
                .arg("--no-verbose")
                .arg("-O")
                .arg(dest.display().to_string())
                .arg(url),
        )?;
        Ok(dest)
    }

    /// Unpack a gzipped tarball into a directory
    pub fn extract(
        &self,
        archive: impl AsRef<Path>,
        into: impl AsRef<Path>,
    ) -> Result<(), ActionError> {
        let archive = self.path(archive);
        let into = self.path(into);
        self.run(
            Invocation::new("tar")
                .arg("-xzf")
                .arg(archive.display().to_string())
                .arg("-C")
                .arg(into.display().to_string()),
        )
        .map(|_| ())
    }

    /// Point `link` (inside the workspace) at `source`, replacing any stale link
    pub fn symlink(&self, source: &Path, link: impl AsRef<Path>) -> Result<(), ActionError> {
        self.remove(link.as_ref())?;
        let link = self.path(link);
        create_symlink(source, &link).map_err(|e| {
            ActionError::io(
                format!("linking {} to {}", link.display(), source.display()),
                e,
            )
        })
    }

    /// Ask the variant selector which toolchain branch applies
    pub fn variant(&self) -> ToolchainVariant {
        self.selector.select(self.settings, self.runner)
    }

    fn in_workspace(&self, invocation: Invocation) -> Invocation {
        if invocation.cwd.is_some() {
            invocation
        } else {
            invocation.current_dir(self.workspace())
        }
    }
}

#[cfg(unix)]
fn create_symlink(source: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, link)
}

#[cfg(windows)]
fn create_symlink(source: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(source, link)
}
