//! Application image assembly.
//!
//! Freezes the application tree, lays out the AppDir skeleton around it and
//! runs the image assembly tool. Every problem becomes an error record; the
//! packager only hands back an [`ArtifactDescriptor`] when the artifact is on
//! disk and no record was added along the way.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use dailybuild_core::{
    BuildError, ErrorAggregator, ErrorKind, ErrorRecord, PackagingRecipe, ProjectSpec,
    ShellRunner, SignatureTable, Step,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::runner::StageRunner;
use crate::stage::StepInvocation;

/// Sub-directories created inside the AppDir before anything is copied.
pub const APP_DIR_SKELETON: [&str; 4] = [
    "usr/share/pixmaps",
    "usr/share/mime/packages",
    "usr/lib/mime/packages",
    "usr/bin",
];

const APP_RUN: &str = "AppRun";

/// A verified, on-disk artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub path: PathBuf,
    pub file_name: String,
    pub product: String,
    pub version: String,
    pub date: NaiveDate,
    pub arch: String,
    /// Set once the file has been confirmed to exist.
    pub verified: bool,
}

/// `<Product>-<version>-<YYYY-MM-DD>-<arch>.<ext>`
pub fn artifact_file_name(recipe: &PackagingRecipe, version: &str, date: NaiveDate) -> String {
    format!(
        "{}-{}-{}-{}.{}",
        recipe.product,
        version,
        date.format("%Y-%m-%d"),
        recipe.arch,
        recipe.extension
    )
}

/// Result of a packaging attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackagingOutcome {
    Produced(ArtifactDescriptor),
    /// At least one record was added; see the aggregator.
    Failed { records_added: usize },
}

impl PackagingOutcome {
    pub fn artifact(self) -> Option<ArtifactDescriptor> {
        match self {
            PackagingOutcome::Produced(artifact) => Some(artifact),
            PackagingOutcome::Failed { .. } => None,
        }
    }
}

/// Builds the distributable image for the application project.
pub struct ArtifactPackager<'a> {
    shell: &'a dyn ShellRunner,
    signatures: &'a SignatureTable,
    recipe: &'a PackagingRecipe,
    app: &'a ProjectSpec,
    date: NaiveDate,
}

impl<'a> ArtifactPackager<'a> {
    pub fn new(
        shell: &'a dyn ShellRunner,
        signatures: &'a SignatureTable,
        recipe: &'a PackagingRecipe,
        app: &'a ProjectSpec,
        date: NaiveDate,
    ) -> Self {
        Self {
            shell,
            signatures,
            recipe,
            app,
            date,
        }
    }

    /// Run the full packaging sequence.
    pub async fn package(&self, errors: &mut ErrorAggregator) -> PackagingOutcome {
        let before = errors.len();
        let descriptor = self.assemble(errors).await;
        let records_added = errors.len() - before;

        match descriptor {
            Some(artifact) if records_added == 0 => {
                info!(artifact = %artifact.path.display(), "artifact ready");
                PackagingOutcome::Produced(artifact)
            }
            _ => PackagingOutcome::Failed { records_added },
        }
    }

    async fn assemble(&self, errors: &mut ErrorAggregator) -> Option<ArtifactDescriptor> {
        let app_root = self.app.path.as_path();
        let build_dir = self.app.build_dir();
        let runner = StageRunner::new(self.shell, self.signatures);

        if let Err(e) = self.remove_stray_dirs() {
            self.record(errors, ErrorKind::PackagingError, format!("cleanup failed: {e}"));
            return None;
        }

        let freeze = StepInvocation::new(Step::Freeze, &self.recipe.freeze_command, app_root);
        runner.run(&freeze, &self.app.name, errors).await;

        let frozen = match single_entry(&build_dir) {
            Ok(entry) => entry,
            Err(message) => {
                self.record(errors, ErrorKind::PackagingError, message);
                return None;
            }
        };
        debug!(frozen = %frozen.display(), "frozen tree located");

        let app_dir = build_dir.join(&self.recipe.app_dir_name);
        if let Err(e) = self.lay_out_app_dir(&app_dir, &frozen) {
            self.record(errors, ErrorKind::PackagingError, e.to_string());
            return None;
        }

        let version = match self.recipe.version.resolve(app_root) {
            Ok(version) => version,
            Err(e) => {
                self.record(errors, ErrorKind::PackagingError, e.to_string());
                return None;
            }
        };
        let file_name = artifact_file_name(self.recipe, &version, self.date);
        let artifact_path = build_dir.join(&file_name);

        let command = self
            .recipe
            .assembly_command
            .replace("{app_dir}", &app_dir.to_string_lossy())
            .replace("{artifact}", &artifact_path.to_string_lossy());
        let assembly = StepInvocation::new(Step::Assembly, command, app_root);
        let result = runner.run(&assembly, &self.app.name, errors).await;

        if !result.success_marker_seen {
            self.record(
                errors,
                ErrorKind::AssemblyError,
                "image assembly did not report success",
            );
            return None;
        }
        if !artifact_path.exists() {
            self.record(
                errors,
                ErrorKind::PackagingError,
                format!("{} does not exist", artifact_path.display()),
            );
            return None;
        }

        Some(ArtifactDescriptor {
            path: artifact_path,
            file_name,
            product: self.recipe.product.clone(),
            version,
            date: self.date,
            arch: self.recipe.arch.clone(),
            verified: true,
        })
    }

    fn record(&self, errors: &mut ErrorAggregator, kind: ErrorKind, message: impl Into<String>) {
        errors.record(ErrorRecord::for_project(kind, &self.app.name, message));
    }

    fn remove_stray_dirs(&self) -> io::Result<()> {
        for name in &self.recipe.stray_dirs {
            let dir = self.app.path.join(name);
            if dir.exists() {
                debug!(dir = %dir.display(), "removing stray directory");
                fs::remove_dir_all(&dir)?;
            }
        }
        Ok(())
    }

    /// Template paths are relative to the application project unless absolute.
    fn template(&self, path: &Path) -> Result<PathBuf, BuildError> {
        let resolved = self.app.path.join(path);
        if resolved.is_file() {
            Ok(resolved)
        } else {
            Err(BuildError::Template(resolved))
        }
    }

    fn lay_out_app_dir(&self, app_dir: &Path, frozen: &Path) -> Result<(), BuildError> {
        for sub in APP_DIR_SKELETON {
            fs::create_dir_all(app_dir.join(sub))?;
        }

        let app_run = app_dir.join(APP_RUN);
        fs::copy(self.template(&self.recipe.app_run_template)?, &app_run)?;

        fs::write(
            app_dir.join(&self.recipe.desktop_file_name),
            &self.recipe.desktop_entry,
        )?;

        for copy in &self.recipe.template_copies {
            let source = self.template(&copy.source)?;
            for destination in &copy.destinations {
                fs::copy(&source, app_dir.join(destination))?;
            }
        }

        let bin = app_dir.join("usr/bin");
        copy_tree(frozen, &bin)?;

        let launcher = bin.join(&self.recipe.launcher_name);
        fs::rename(bin.join(&self.recipe.launch_script), &launcher)?;

        let wrapper = bin.join(&self.recipe.wrapper_name);
        fs::copy(
            self.template(&self.recipe.desktop_integration_template)?,
            &wrapper,
        )?;

        for path in [&app_run, &wrapper, &launcher] {
            make_executable(path)?;
        }
        Ok(())
    }
}

/// The only entry of `dir`, or a message describing why there isn't one.
fn single_entry(dir: &Path) -> Result<PathBuf, String> {
    let entries: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(read) => read
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(format!("cannot list {}: {e}", dir.display())),
    };
    match entries.as_slice() {
        [only] => Ok(only.clone()),
        _ => Err(format!(
            "ambiguous output directory ({} candidates)",
            entries.len()
        )),
    }
}

/// Recursively copy `src` into `dst`, creating `dst` if needed.
fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = dst.join(entry.file_name());
        if file_type.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else if file_type.is_symlink() {
            copy_symlink(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(src)?, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst).map(|_| ())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dailybuild_core::fakes::ScriptedShell;
    use dailybuild_core::{ShellCommand, VersionSource};

    struct Sandbox {
        _root: tempfile::TempDir,
        app: ProjectSpec,
        recipe: PackagingRecipe,
    }

    /// An application tree with xdg templates, a version file and AppImageKit
    /// templates next to it.
    fn sandbox() -> Sandbox {
        let root = tempfile::tempdir().unwrap();
        let apps = root.path();
        let app_root = apps.join("openshot-qt-git");
        fs::create_dir_all(app_root.join("xdg")).unwrap();
        fs::create_dir_all(app_root.join("src/classes")).unwrap();
        fs::create_dir_all(app_root.join("openshot_qt")).unwrap();
        fs::write(app_root.join("xdg/openshot-qt.svg"), "<svg/>").unwrap();
        fs::write(app_root.join("xdg/openshot-qt.xml"), "<mime/>").unwrap();
        fs::write(app_root.join("xdg/openshot-qt"), "mime").unwrap();
        fs::write(app_root.join("src/classes/info.py"), "VERSION = \"2.4.1\"\n").unwrap();
        fs::create_dir_all(apps.join("AppImageKit")).unwrap();
        fs::write(apps.join("AppImageKit/AppRun"), "#!/bin/sh\n").unwrap();
        fs::write(apps.join("AppImageKit/desktopintegration"), "#!/bin/sh\n").unwrap();

        let app = ProjectSpec::new("openshot-qt", &app_root, "", "origin");
        let recipe = PackagingRecipe::appimage(apps);
        Sandbox {
            _root: root,
            app,
            recipe,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2016, 9, 14).unwrap()
    }

    /// Freeze writes one exe directory containing the launch script.
    fn freeze_hook(cmd: &ShellCommand) {
        let exe = cmd.work_dir.join("build/exe.linux-x86_64-3.5");
        fs::create_dir_all(exe.join("lib")).unwrap();
        fs::write(exe.join("launch-linux.sh"), "#!/bin/sh\n").unwrap();
        fs::write(exe.join("lib/libopenshot.so"), "elf").unwrap();
    }

    /// Assembly writes the file named in its last quoted argument.
    fn assembly_hook(cmd: &ShellCommand) {
        let artifact = cmd.line.rsplit('"').nth(1).unwrap();
        fs::write(artifact, "image").unwrap();
    }

    fn happy_shell() -> ScriptedShell {
        ScriptedShell::new()
            .on_run("freeze.py", freeze_hook)
            .on_run("AppImageAssistant", assembly_hook)
            .on("AppImageAssistant", ["AppImage completed sucessfully"])
    }

    #[test]
    fn test_artifact_file_name() {
        let recipe = PackagingRecipe::appimage(Path::new("/srv/apps"));
        assert_eq!(
            artifact_file_name(&recipe, "2.4.1", date()),
            "OpenShot-2.4.1-2016-09-14-x86_64.AppImage"
        );
    }

    #[tokio::test]
    async fn test_happy_path_produces_verified_artifact() {
        let sb = sandbox();
        let shell = happy_shell();
        let table = SignatureTable::standard();
        let packager = ArtifactPackager::new(&shell, &table, &sb.recipe, &sb.app, date());
        let mut errors = ErrorAggregator::new();

        let outcome = packager.package(&mut errors).await;
        assert!(errors.is_empty(), "unexpected: {:?}", errors.snapshot());
        let artifact = outcome.artifact().expect("artifact expected");
        assert!(artifact.verified);
        assert_eq!(artifact.file_name, "OpenShot-2.4.1-2016-09-14-x86_64.AppImage");
        assert!(artifact.path.is_file());

        let app_dir = sb.app.build_dir().join("OpenShot.AppDir");
        for sub in APP_DIR_SKELETON {
            assert!(app_dir.join(sub).is_dir(), "{sub} missing");
        }
        assert!(app_dir.join("AppRun").is_file());
        assert!(app_dir.join("openshot-qt.svg").is_file());
        assert!(app_dir.join("usr/share/pixmaps/openshot-qt.svg").is_file());
        assert!(app_dir.join("usr/share/mime/packages/openshot-qt.xml").is_file());
        assert!(app_dir.join("usr/lib/mime/packages/openshot-qt").is_file());
        assert!(app_dir.join("usr/bin/openshot-qt").is_file());
        assert!(!app_dir.join("usr/bin/launch-linux.sh").exists());
        assert!(app_dir.join("usr/bin/openshot-qt.wrapper").is_file());
        assert!(app_dir.join("usr/bin/lib/libopenshot.so").is_file());

        let desktop = fs::read_to_string(app_dir.join("openshot-qt.desktop")).unwrap();
        assert!(desktop.starts_with("[Desktop Entry]\nName=OpenShot Video Editor"));
        assert!(!sb.app.path.join("openshot_qt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_executables_are_marked() {
        use std::os::unix::fs::PermissionsExt;

        let sb = sandbox();
        let shell = happy_shell();
        let table = SignatureTable::standard();
        let packager = ArtifactPackager::new(&shell, &table, &sb.recipe, &sb.app, date());
        packager.package(&mut ErrorAggregator::new()).await;

        let app_dir = sb.app.build_dir().join("OpenShot.AppDir");
        for exe in ["AppRun", "usr/bin/openshot-qt", "usr/bin/openshot-qt.wrapper"] {
            let mode = fs::metadata(app_dir.join(exe)).unwrap().permissions().mode();
            assert_ne!(mode & 0o111, 0, "{exe} not executable");
        }
    }

    #[tokio::test]
    async fn test_marker_without_file_is_packaging_error() {
        let sb = sandbox();
        let shell = ScriptedShell::new()
            .on_run("freeze.py", freeze_hook)
            .on("AppImageAssistant", ["AppImage completed sucessfully"]);
        let table = SignatureTable::standard();
        let packager = ArtifactPackager::new(&shell, &table, &sb.recipe, &sb.app, date());
        let mut errors = ErrorAggregator::new();

        let outcome = packager.package(&mut errors).await;
        assert!(outcome.artifact().is_none());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.snapshot()[0].kind, ErrorKind::PackagingError);
        assert!(errors.snapshot()[0].message.ends_with("does not exist"));
    }

    #[tokio::test]
    async fn test_correct_spelling_is_not_success() {
        let sb = sandbox();
        let shell = ScriptedShell::new()
            .on_run("freeze.py", freeze_hook)
            .on_run("AppImageAssistant", assembly_hook)
            .on("AppImageAssistant", ["AppImage completed successfully"]);
        let table = SignatureTable::standard();
        let packager = ArtifactPackager::new(&shell, &table, &sb.recipe, &sb.app, date());
        let mut errors = ErrorAggregator::new();

        let outcome = packager.package(&mut errors).await;
        assert!(outcome.artifact().is_none());
        assert_eq!(errors.snapshot()[0].kind, ErrorKind::AssemblyError);
    }

    #[tokio::test]
    async fn test_assembly_error_lines_block_descriptor() {
        let sb = sandbox();
        let shell = ScriptedShell::new()
            .on_run("freeze.py", freeze_hook)
            .on_run("AppImageAssistant", assembly_hook)
            .on(
                "AppImageAssistant",
                ["squashfs error: short read", "AppImage completed sucessfully"],
            );
        let table = SignatureTable::standard();
        let packager = ArtifactPackager::new(&shell, &table, &sb.recipe, &sb.app, date());
        let mut errors = ErrorAggregator::new();

        let outcome = packager.package(&mut errors).await;
        assert_eq!(outcome, PackagingOutcome::Failed { records_added: 1 });
        assert_eq!(errors.snapshot()[0].kind, ErrorKind::AssemblyError);
    }

    #[tokio::test]
    async fn test_ambiguous_output_directory() {
        let sb = sandbox();
        let shell = ScriptedShell::new().on_run("freeze.py", |cmd: &ShellCommand| {
            fs::create_dir_all(cmd.work_dir.join("build/exe.a")).unwrap();
            fs::create_dir_all(cmd.work_dir.join("build/exe.b")).unwrap();
        });
        let table = SignatureTable::standard();
        let packager = ArtifactPackager::new(&shell, &table, &sb.recipe, &sb.app, date());
        let mut errors = ErrorAggregator::new();

        packager.package(&mut errors).await;
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.snapshot()[0].message,
            "ambiguous output directory (2 candidates)"
        );
        assert_eq!(shell.count("AppImageAssistant"), 0);
    }

    #[tokio::test]
    async fn test_freeze_errors_are_recorded() {
        let sb = sandbox();
        let shell = happy_shell().on(
            "freeze.py",
            [
                "logger:ERROR cannot stat importlib/__init__.pyc",
                "logger:ERROR missing module PyQt5.QtWebKit",
            ],
        );
        let table = SignatureTable::standard();
        let packager = ArtifactPackager::new(&shell, &table, &sb.recipe, &sb.app, date());
        let mut errors = ErrorAggregator::new();

        let outcome = packager.package(&mut errors).await;
        assert!(outcome.artifact().is_none());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.snapshot()[0].kind, ErrorKind::PackagingError);
        assert!(errors.snapshot()[0].message.contains("PyQt5"));
    }

    #[tokio::test]
    async fn test_missing_template_is_packaging_error() {
        let sb = sandbox();
        fs::remove_file(sb.app.path.join("xdg/openshot-qt.xml")).unwrap();
        let shell = happy_shell();
        let table = SignatureTable::standard();
        let packager = ArtifactPackager::new(&shell, &table, &sb.recipe, &sb.app, date());
        let mut errors = ErrorAggregator::new();

        packager.package(&mut errors).await;
        assert_eq!(errors.len(), 1);
        assert!(errors.snapshot()[0].message.contains("openshot-qt.xml"));
    }

    #[tokio::test]
    async fn test_literal_version() {
        let mut sb = sandbox();
        sb.recipe.version = VersionSource::Literal {
            value: "9.9.9".to_string(),
        };
        let shell = happy_shell();
        let table = SignatureTable::standard();
        let packager = ArtifactPackager::new(&shell, &table, &sb.recipe, &sb.app, date());

        let artifact = packager
            .package(&mut ErrorAggregator::new())
            .await
            .artifact()
            .unwrap();
        assert_eq!(artifact.version, "9.9.9");
    }
}
