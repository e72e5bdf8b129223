//! Build step definitions and build directory preparation.

use std::path::{Path, PathBuf};

use dailybuild_core::{CommandTemplates, ProjectSpec, ShellCommand, Step};
use serde::{Deserialize, Serialize};

/// A rendered external step ready to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInvocation {
    pub step: Step,

    /// Full command line, placeholders already substituted.
    pub command: String,

    pub work_dir: PathBuf,
}

impl StepInvocation {
    pub fn new(step: Step, command: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            step,
            command: command.into(),
            work_dir: work_dir.into(),
        }
    }

    /// Render one of the per-project build steps.
    ///
    /// Configure, compile and install run inside the project's build directory.
    pub fn for_project(step: Step, commands: &CommandTemplates, project: &ProjectSpec) -> Self {
        let (template, work_dir) = match step {
            Step::SyncCheck => (&commands.sync_check, project.path.clone()),
            Step::Pull => (&commands.pull, project.path.clone()),
            Step::Configure => (&commands.configure, project.build_dir()),
            Step::Compile => (&commands.compile, project.build_dir()),
            Step::Install => (&commands.install, project.build_dir()),
            // Packaging steps are rendered by the packager.
            Step::Freeze | Step::Assembly => {
                return Self::new(step, String::new(), project.path.clone())
            }
        };
        Self::new(step, CommandTemplates::render(template, project), work_dir)
    }

    pub fn to_shell_command(&self) -> ShellCommand {
        ShellCommand::new(self.command.clone(), self.work_dir.clone())
    }
}

/// Ordered build steps for an updated project. Empty for packaging-only
/// projects.
pub fn build_steps(commands: &CommandTemplates, project: &ProjectSpec) -> Vec<StepInvocation> {
    if project.is_packaging_only() {
        return Vec::new();
    }
    [Step::Configure, Step::Compile, Step::Install]
        .into_iter()
        .map(|step| StepInvocation::for_project(step, commands, project))
        .collect()
}

/// Delete `<project>/build` if present and recreate it empty.
pub async fn reset_build_dir(project: &ProjectSpec) -> std::io::Result<PathBuf> {
    let build_dir = project.build_dir();
    recreate_dir(&build_dir).await?;
    Ok(build_dir)
}

async fn recreate_dir(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    tokio::fs::create_dir_all(dir).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use dailybuild_core::Platform;

    fn lib() -> ProjectSpec {
        ProjectSpec::new(
            "libopenshot",
            "/srv/libopenshot-git",
            "../",
            "https://github.com/OpenShot/libopenshot.git",
        )
    }

    #[test]
    fn test_build_steps_in_order() {
        let commands = CommandTemplates::for_platform(Platform::Linux);
        let steps = build_steps(&commands, &lib());
        let names: Vec<Step> = steps.iter().map(|s| s.step).collect();
        assert_eq!(names, vec![Step::Configure, Step::Compile, Step::Install]);
        assert_eq!(steps[0].command, "cmake ../");
        assert_eq!(steps[1].command, "make");
        assert_eq!(steps[2].command, "make install");
        assert!(steps
            .iter()
            .all(|s| s.work_dir == PathBuf::from("/srv/libopenshot-git/build")));
    }

    #[test]
    fn test_windows_make_command() {
        let commands = CommandTemplates::for_platform(Platform::Windows);
        let steps = build_steps(&commands, &lib());
        assert_eq!(steps[1].command, "mingw32-make");
        assert_eq!(steps[2].command, "mingw32-make install");
    }

    #[test]
    fn test_packaging_only_project_has_no_build_steps() {
        let commands = CommandTemplates::for_platform(Platform::Linux);
        let app = ProjectSpec::new("openshot-qt", "/srv/openshot-qt-git", "", "origin");
        assert!(build_steps(&commands, &app).is_empty());
    }

    #[test]
    fn test_pull_runs_in_working_copy() {
        let commands = CommandTemplates::for_platform(Platform::Linux);
        let pull = StepInvocation::for_project(Step::Pull, &commands, &lib());
        assert_eq!(pull.work_dir, PathBuf::from("/srv/libopenshot-git"));
        assert_eq!(
            pull.command,
            "git pull https://github.com/OpenShot/libopenshot.git"
        );
    }

    #[tokio::test]
    async fn test_reset_build_dir_clears_contents() {
        let dir = tempfile::tempdir().unwrap();
        let project = ProjectSpec::new("p", dir.path(), "../", "origin");
        std::fs::create_dir_all(project.build_dir().join("CMakeFiles")).unwrap();
        std::fs::write(project.build_dir().join("CMakeCache.txt"), "stale").unwrap();

        let build_dir = reset_build_dir(&project).await.unwrap();
        assert!(build_dir.is_dir());
        assert_eq!(std::fs::read_dir(&build_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_reset_build_dir_creates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let project = ProjectSpec::new("p", dir.path(), "../", "origin");
        reset_build_dir(&project).await.unwrap();
        assert!(project.build_dir().is_dir());
    }
}
