//! Platform profiles: everything that differs between build hosts.
//!
//! A [`PlatformProfile`] is resolved once at startup (built-in defaults for
//! the host OS, optionally overridden by a TOML file) and handed to the
//! orchestrator. Nothing downstream branches on the host OS again.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{BuildError, Result};
use crate::project::ProjectSpec;

/// Environment variable overriding the directory holding the working copies.
pub const APPS_ROOT_ENV: &str = "DAILYBUILD_APPS_ROOT";

/// Build host family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    Linux,
    Darwin,
    Windows,
}

impl Platform {
    pub fn host() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Darwin
        } else {
            Platform::Linux
        }
    }

    /// Name used in notifications.
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Linux => "Linux",
            Platform::Darwin => "Darwin",
            Platform::Windows => "Windows",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Shell used to run command lines. Output is always merged into stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellConfig {
    pub program: String,
    pub flag: String,
}

impl ShellConfig {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Windows => Self {
                program: "cmd".to_string(),
                flag: "/C".to_string(),
            },
            _ => Self {
                program: "sh".to_string(),
                flag: "-c".to_string(),
            },
        }
    }
}

/// Per-project command line templates.
///
/// Placeholders: `{origin}`, `{args}`, `{path}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplates {
    pub sync_check: String,
    pub pull: String,
    pub configure: String,
    pub compile: String,
    pub install: String,
}

impl CommandTemplates {
    pub fn for_platform(platform: Platform) -> Self {
        let make = match platform {
            Platform::Windows => "mingw32-make",
            _ => "make",
        };
        Self {
            sync_check: "git fetch -v --dry-run".to_string(),
            pull: "git pull {origin}".to_string(),
            configure: "cmake {args}".to_string(),
            compile: make.to_string(),
            install: format!("{make} install"),
        }
    }

    pub fn render(template: &str, project: &ProjectSpec) -> String {
        template
            .replace("{origin}", &project.origin)
            .replace("{args}", project.configure_args.trim())
            .replace("{path}", &project.path.to_string_lossy())
    }
}

/// Where the application version comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum VersionSource {
    Literal {
        value: String,
    },
    /// First capture group of `pattern` in `path` (relative to the app project).
    File {
        path: PathBuf,
        pattern: String,
    },
}

impl VersionSource {
    pub fn resolve(&self, app_root: &Path) -> Result<String> {
        match self {
            VersionSource::Literal { value } => Ok(value.clone()),
            VersionSource::File { path, pattern } => {
                let file = app_root.join(path);
                let content = std::fs::read_to_string(&file).map_err(|e| {
                    BuildError::Version(format!("cannot read {}: {e}", file.display()))
                })?;
                let re = Regex::new(pattern)
                    .map_err(|e| BuildError::Version(format!("bad pattern {pattern:?}: {e}")))?;
                re.captures(&content)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string())
                    .ok_or_else(|| {
                        BuildError::Version(format!(
                            "pattern {pattern:?} not found in {}",
                            file.display()
                        ))
                    })
            }
        }
    }
}

/// A file copied from a template location into the image skeleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateCopy {
    /// Source, relative to the application project unless absolute.
    pub source: PathBuf,
    /// Destinations, relative to the AppDir root.
    pub destinations: Vec<PathBuf>,
}

/// How the application tree becomes one distributable image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagingRecipe {
    /// Name of the project whose tree is packaged.
    pub app_project: String,
    /// Directories inside the app project removed before freezing.
    pub stray_dirs: Vec<String>,
    pub freeze_command: String,
    pub product: String,
    pub version: VersionSource,
    pub arch: String,
    pub extension: String,
    pub app_dir_name: String,
    pub app_run_template: PathBuf,
    pub desktop_integration_template: PathBuf,
    pub desktop_file_name: String,
    pub desktop_entry: String,
    pub template_copies: Vec<TemplateCopy>,
    /// Launch script shipped in the frozen tree, renamed to `launcher_name`.
    pub launch_script: String,
    pub launcher_name: String,
    pub wrapper_name: String,
    /// Placeholders: `{app_dir}`, `{artifact}`.
    pub assembly_command: String,
}

impl PackagingRecipe {
    /// AppImage recipe for the OpenShot application tree.
    pub fn appimage(apps_root: &Path) -> Self {
        let app_root = apps_root.join("openshot-qt-git");
        let kit = apps_root.join("AppImageKit");
        Self {
            app_project: "openshot-qt".to_string(),
            stray_dirs: vec!["openshot_qt".to_string(), "build".to_string()],
            freeze_command: format!("python3 {} build", app_root.join("freeze.py").display()),
            product: "OpenShot".to_string(),
            version: VersionSource::File {
                path: PathBuf::from("src/classes/info.py"),
                pattern: r#"(?m)^VERSION\s*=\s*["']([^"']+)["']"#.to_string(),
            },
            arch: "x86_64".to_string(),
            extension: "AppImage".to_string(),
            app_dir_name: "OpenShot.AppDir".to_string(),
            app_run_template: kit.join("AppRun"),
            desktop_integration_template: kit.join("desktopintegration"),
            desktop_file_name: "openshot-qt.desktop".to_string(),
            desktop_entry: [
                "[Desktop Entry]",
                "Name=OpenShot Video Editor",
                "GenericName=Video Editor",
                "X-GNOME-FullName=OpenShot Video Editor",
                "Comment=Create and edit amazing videos and movies",
                "Exec=openshot-qt.wrapper %F",
                "Terminal=false",
                "Icon=openshot-qt",
                "Type=Application",
            ]
            .join("\n"),
            template_copies: vec![
                TemplateCopy {
                    source: PathBuf::from("xdg/openshot-qt.svg"),
                    destinations: vec![
                        PathBuf::from("openshot-qt.svg"),
                        PathBuf::from("usr/share/pixmaps/openshot-qt.svg"),
                    ],
                },
                TemplateCopy {
                    source: PathBuf::from("xdg/openshot-qt.xml"),
                    destinations: vec![PathBuf::from("usr/share/mime/packages/openshot-qt.xml")],
                },
                TemplateCopy {
                    source: PathBuf::from("xdg/openshot-qt"),
                    destinations: vec![PathBuf::from("usr/lib/mime/packages/openshot-qt")],
                },
            ],
            launch_script: "launch-linux.sh".to_string(),
            launcher_name: "openshot-qt".to_string(),
            wrapper_name: "openshot-qt.wrapper".to_string(),
            assembly_command: format!(
                "{} \"{{app_dir}}\" \"{{artifact}}\"",
                kit.join("AppImageAssistant").display()
            ),
        }
    }
}

/// Object storage destination for finished artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    /// Platform-specific key prefix.
    pub prefix: String,
    /// Public base URL serving the bucket.
    pub public_base_url: String,
}

impl UploadTarget {
    pub fn for_platform(platform: Platform) -> Self {
        let prefix = match platform {
            Platform::Linux => "linux",
            Platform::Darwin => "mac",
            Platform::Windows => "windows",
        };
        Self {
            endpoint: "https://s3.amazonaws.com".to_string(),
            region: "us-east-1".to_string(),
            bucket: "releases.openshot.org".to_string(),
            prefix: prefix.to_string(),
            public_base_url: "http://releases.openshot.org".to_string(),
        }
    }

    /// Object key for `file_name`.
    pub fn object_key(&self, file_name: &str) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{prefix}/{file_name}")
        }
    }

    /// Public download URL for `file_name`.
    pub fn public_url(&self, file_name: &str) -> String {
        format!(
            "{}/{}",
            self.public_base_url.trim_end_matches('/'),
            self.object_key(file_name)
        )
    }
}

/// Notification channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyTarget {
    pub api_base: String,
    pub channel: String,
}

impl Default for NotifyTarget {
    fn default() -> Self {
        Self {
            api_base: "https://slack.com/api".to_string(),
            channel: "#build-server".to_string(),
        }
    }
}

/// Complete host configuration for one build run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformProfile {
    pub platform: Platform,
    pub shell: ShellConfig,
    pub commands: CommandTemplates,
    /// Ordered by dependency; never reordered.
    pub projects: Vec<ProjectSpec>,
    /// `None` means this platform does not package.
    pub packaging: Option<PackagingRecipe>,
    pub upload: UploadTarget,
    pub notify: NotifyTarget,
}

/// On-disk profile: every field optional, merged over the built-in defaults
/// of the selected platform.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileOverrides {
    platform: Option<Platform>,
    apps_root: Option<PathBuf>,
    shell: Option<ShellConfig>,
    commands: Option<CommandTemplates>,
    projects: Option<Vec<ProjectSpec>>,
    packaging: Option<PackagingRecipe>,
    #[serde(default)]
    disable_packaging: bool,
    upload: Option<UploadTarget>,
    notify: Option<NotifyTarget>,
}

impl PlatformProfile {
    /// Built-in profile for the current host.
    pub fn for_host() -> Self {
        Self::for_platform(Platform::host(), &default_apps_root())
    }

    /// Built-in profile for `platform` with working copies under `apps_root`.
    pub fn for_platform(platform: Platform, apps_root: &Path) -> Self {
        let projects = vec![
            ProjectSpec::new(
                "libopenshot-audio",
                apps_root.join("libopenshot-audio-git"),
                "../",
                "https://github.com/OpenShot/libopenshot-audio.git",
            ),
            ProjectSpec::new(
                "libopenshot",
                apps_root.join("libopenshot-git"),
                "../",
                "https://github.com/OpenShot/libopenshot.git",
            ),
            ProjectSpec::new(
                "openshot-qt",
                apps_root.join("openshot-qt-git"),
                "",
                "https://github.com/OpenShot/openshot-qt.git",
            ),
        ];
        let packaging = match platform {
            Platform::Linux => Some(PackagingRecipe::appimage(apps_root)),
            // No packaging routine for these hosts yet.
            Platform::Darwin | Platform::Windows => None,
        };

        Self {
            platform,
            shell: ShellConfig::for_platform(platform),
            commands: CommandTemplates::for_platform(platform),
            projects,
            packaging,
            upload: UploadTarget::for_platform(platform),
            notify: NotifyTarget::default(),
        }
    }

    /// Parse a profile from TOML. Missing fields fall back to the built-in
    /// defaults of the declared platform (or the host).
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let overrides: ProfileOverrides = toml::from_str(content)?;
        let platform = overrides.platform.unwrap_or_else(Platform::host);
        let apps_root = overrides.apps_root.unwrap_or_else(default_apps_root);

        let mut profile = Self::for_platform(platform, &apps_root);
        if let Some(shell) = overrides.shell {
            profile.shell = shell;
        }
        if let Some(commands) = overrides.commands {
            profile.commands = commands;
        }
        if let Some(projects) = overrides.projects {
            profile.projects = projects;
        }
        if let Some(packaging) = overrides.packaging {
            profile.packaging = Some(packaging);
        }
        if overrides.disable_packaging {
            profile.packaging = None;
        }
        if let Some(upload) = overrides.upload {
            profile.upload = upload;
        }
        if let Some(notify) = overrides.notify {
            profile.notify = notify;
        }

        profile.validate()?;
        Ok(profile)
    }

    /// Load and validate a profile file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BuildError::Profile(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.projects.is_empty() {
            return Err(BuildError::Profile("no projects configured".to_string()));
        }
        for (i, project) in self.projects.iter().enumerate() {
            if project.name.trim().is_empty() {
                return Err(BuildError::Profile(format!("project #{i} has no name")));
            }
            if self.projects[..i].iter().any(|p| p.name == project.name) {
                return Err(BuildError::Profile(format!(
                    "duplicate project name: {}",
                    project.name
                )));
            }
        }
        if let Some(recipe) = &self.packaging {
            if self.app_project().is_none() {
                return Err(BuildError::Profile(format!(
                    "packaging refers to unknown project: {}",
                    recipe.app_project
                )));
            }
        }
        Ok(())
    }

    /// The project packaged by the recipe, if any.
    pub fn app_project(&self) -> Option<&ProjectSpec> {
        let recipe = self.packaging.as_ref()?;
        self.projects.iter().find(|p| p.name == recipe.app_project)
    }
}

/// `$DAILYBUILD_APPS_ROOT`, else `~/apps`.
pub fn default_apps_root() -> PathBuf {
    if let Ok(root) = std::env::var(APPS_ROOT_ENV) {
        return PathBuf::from(root);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("apps")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linux_profile_defaults() {
        let profile = PlatformProfile::for_platform(Platform::Linux, Path::new("/srv/apps"));
        assert_eq!(profile.projects.len(), 3);
        assert_eq!(profile.projects[0].name, "libopenshot-audio");
        assert_eq!(profile.projects[2].name, "openshot-qt");
        assert!(profile.projects[2].is_packaging_only());
        assert_eq!(profile.commands.compile, "make");
        assert_eq!(profile.upload.prefix, "linux");
        assert!(profile.packaging.is_some());
        assert_eq!(profile.app_project().unwrap().name, "openshot-qt");
        profile.validate().unwrap();
    }

    #[test]
    fn test_non_linux_hosts_do_not_package() {
        let mac = PlatformProfile::for_platform(Platform::Darwin, Path::new("/Users/b/apps"));
        assert!(mac.packaging.is_none());

        let win = PlatformProfile::for_platform(Platform::Windows, Path::new("C:/apps"));
        assert!(win.packaging.is_none());
        assert_eq!(win.commands.compile, "mingw32-make");
        assert_eq!(win.commands.install, "mingw32-make install");
        assert_eq!(win.shell.program, "cmd");
    }

    #[test]
    fn test_render_command_templates() {
        let project = ProjectSpec::new("lib", "/srv/lib", " ../ ", "https://example.com/lib.git");
        assert_eq!(
            CommandTemplates::render("git pull {origin}", &project),
            "git pull https://example.com/lib.git"
        );
        assert_eq!(CommandTemplates::render("cmake {args}", &project), "cmake ../");
    }

    #[test]
    fn test_artifact_urls() {
        let target = UploadTarget::for_platform(Platform::Linux);
        assert_eq!(target.object_key("a.AppImage"), "linux/a.AppImage");
        assert_eq!(
            target.public_url("a.AppImage"),
            "http://releases.openshot.org/linux/a.AppImage"
        );
    }

    #[test]
    fn test_toml_override_keeps_defaults() {
        let toml = r##"
            platform = "Linux"
            disable_packaging = true

            [[projects]]
            name = "core"
            path = "/tmp/core"
            configure_args = "../"
            origin = "origin"

            [notify]
            api_base = "http://localhost:9000"
            channel = "#ci"
        "##;
        let profile = PlatformProfile::from_toml_str(toml).unwrap();
        assert_eq!(profile.projects.len(), 1);
        assert_eq!(profile.notify.channel, "#ci");
        assert_eq!(profile.commands.sync_check, "git fetch -v --dry-run");
        assert!(profile.packaging.is_none());
    }

    #[test]
    fn test_toml_defaults_follow_declared_platform() {
        let profile =
            PlatformProfile::from_toml_str("platform = \"Darwin\"\napps_root = \"/Users/b/apps\"\n")
                .unwrap();
        assert_eq!(profile.platform, Platform::Darwin);
        assert!(profile.packaging.is_none());
        assert_eq!(
            profile.projects[1].path,
            PathBuf::from("/Users/b/apps/libopenshot-git")
        );
    }

    #[test]
    fn test_toml_unknown_field_rejected() {
        assert!(matches!(
            PlatformProfile::from_toml_str("colour = \"blue\"\n"),
            Err(BuildError::Toml(_))
        ));
    }

    #[test]
    fn test_validate_rejects_duplicates_and_empty() {
        let mut profile = PlatformProfile::for_platform(Platform::Darwin, Path::new("/a"));
        profile.projects.push(profile.projects[0].clone());
        assert!(matches!(profile.validate(), Err(BuildError::Profile(_))));

        profile.projects.clear();
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_app_project() {
        let mut profile = PlatformProfile::for_platform(Platform::Linux, Path::new("/a"));
        profile.projects.truncate(2);
        let err = profile.validate().unwrap_err();
        assert!(err.to_string().contains("openshot-qt"));
    }

    #[test]
    fn test_toml_round_trip_of_builtin_profile() {
        let profile = PlatformProfile::for_platform(Platform::Linux, Path::new("/srv/apps"));
        let text = profile.to_toml_string().unwrap();
        let back = PlatformProfile::from_toml_str(&text).unwrap();
        assert_eq!(profile, back);
    }

    #[test]
    fn test_version_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/classes")).unwrap();
        std::fs::write(
            dir.path().join("src/classes/info.py"),
            "import os\nVERSION = \"2.4.1\"\nMINIMUM_LIBOPENSHOT_VERSION = \"0.1\"\n",
        )
        .unwrap();

        let recipe = PackagingRecipe::appimage(Path::new("/unused"));
        assert_eq!(recipe.version.resolve(dir.path()).unwrap(), "2.4.1");
    }

    #[test]
    fn test_version_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = VersionSource::File {
            path: PathBuf::from("nope.py"),
            pattern: "VERSION = \"(.*)\"".to_string(),
        };
        assert!(matches!(source.resolve(dir.path()), Err(BuildError::Version(_))));

        let literal = VersionSource::Literal {
            value: "1.0".to_string(),
        };
        assert_eq!(literal.resolve(dir.path()).unwrap(), "1.0");
    }
}
