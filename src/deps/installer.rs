//! Package-manager execution
//!
//! The reconciler never spawns processes itself; it goes through the
//! `Installer` trait so tests can substitute a fake.

use crate::deps::lockfile::PackageManager;
use crate::error::{NodepackError, NodepackResult};
use async_trait::async_trait;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Max number of output lines to include in install error messages.
const ERROR_TAIL_LINES: usize = 50;

/// Whether the package manager may reach the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    Online,
    /// Everything comes from the app's offline mirror
    Offline,
}

impl fmt::Display for InstallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Toolchain locations exposed to package-manager processes
#[derive(Debug, Clone, Default)]
pub struct ToolEnv {
    /// Installed runtime root, exported as `NODE_HOME`
    pub node_home: Option<PathBuf>,
    /// Directories prepended to `PATH`
    pub bin_dirs: Vec<PathBuf>,
}

impl ToolEnv {
    fn apply(&self, command: &mut Command) {
        if let Some(ref home) = self.node_home {
            command.env("NODE_HOME", home);
            command.env("npm_config_nodedir", home);
        }
        if !self.bin_dirs.is_empty() {
            let current = std::env::var_os("PATH").unwrap_or_default();
            let paths = self
                .bin_dirs
                .iter()
                .cloned()
                .chain(std::env::split_paths(&current));
            if let Ok(joined) = std::env::join_paths(paths) {
                command.env("PATH", joined);
            }
        }
    }
}

/// One install invocation
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub manager: PackageManager,
    /// Application root; package-manager caches and rc files live here
    pub app_dir: PathBuf,
    /// Scratch directory holding the manifest to install
    pub work_dir: PathBuf,
    pub mode: InstallMode,
    /// Yarn offline mirror, used in offline mode
    pub offline_mirror: Option<PathBuf>,
    pub tools: ToolEnv,
}

impl InstallRequest {
    /// Arguments passed to the package manager
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = match self.manager {
            PackageManager::Npm => vec![
                "install".into(),
                "--unsafe-perm".into(),
                "--no-audit".into(),
                "--no-fund".into(),
                "--userconfig".into(),
                self.app_dir.join(".npmrc").into(),
                "--cache".into(),
                self.app_dir.join(".npm").into(),
            ],
            PackageManager::Yarn => vec![
                "install".into(),
                "--pure-lockfile".into(),
                "--ignore-engines".into(),
                "--non-interactive".into(),
                "--cache-folder".into(),
                self.app_dir.join(".cache").join("yarn").into(),
            ],
        };
        if self.mode == InstallMode::Offline {
            args.push("--offline".into());
        }
        args
    }
}

/// Runs package-manager commands
#[async_trait]
pub trait Installer: Send + Sync {
    /// Install the manifest in `request.work_dir`
    async fn install(&self, request: &InstallRequest) -> NodepackResult<()>;

    /// Run a `package.json` script in the app directory
    async fn run_script(
        &self,
        manager: PackageManager,
        app_dir: &Path,
        script: &str,
        tools: &ToolEnv,
    ) -> NodepackResult<()>;
}

/// `Installer` backed by the real `npm`/`yarn` executables
#[derive(Debug, Clone, Default)]
pub struct CommandInstaller {
    /// Echo package-manager output to stdout as it arrives
    pub echo: bool,
}

impl CommandInstaller {
    pub fn new(echo: bool) -> Self {
        Self { echo }
    }

    async fn execute(
        &self,
        manager: PackageManager,
        dir: &Path,
        args: &[OsString],
        tools: &ToolEnv,
    ) -> NodepackResult<Result<(), String>> {
        let cmdline = format!(
            "{} {}",
            manager.program(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );
        debug!("Running `{}` in {}", cmdline, dir.display());

        let mut command = Command::new(manager.program());
        command
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        tools.apply(&mut command);

        let mut child = command
            .spawn()
            .map_err(|e| NodepackError::command_failed(cmdline.clone(), e))?;

        let echo = self.echo;
        let output = stream_child_output(&mut child, &move |line: String| {
            if echo {
                println!("       {line}");
            } else {
                debug!("{}", line);
            }
        })
        .await;

        let status = child
            .wait()
            .await
            .map_err(|e| NodepackError::command_failed(cmdline.clone(), e))?;
        if status.success() {
            return Ok(Ok(()));
        }

        Ok(Err(format!(
            "`{}` exited with {}\n{}",
            cmdline,
            status.code().unwrap_or(-1),
            tail(&output)
        )))
    }
}

#[async_trait]
impl Installer for CommandInstaller {
    async fn install(&self, request: &InstallRequest) -> NodepackResult<()> {
        if let (InstallMode::Offline, Some(mirror)) = (request.mode, &request.offline_mirror) {
            write_offline_mirror_rc(&request.work_dir, mirror)?;
        }

        self.execute(request.manager, &request.work_dir, &request.args(), &request.tools)
            .await?
            .map_err(|reason| NodepackError::Reconcile {
                manager: request.manager.to_string(),
                reason,
            })
    }

    async fn run_script(
        &self,
        manager: PackageManager,
        app_dir: &Path,
        script: &str,
        tools: &ToolEnv,
    ) -> NodepackResult<()> {
        let mut args: Vec<OsString> = vec!["run".into(), script.into()];
        if manager == PackageManager::Npm {
            args.push("--if-present".into());
        }

        self.execute(manager, app_dir, &args, tools)
            .await?
            .map_err(|reason| NodepackError::Reconcile {
                manager: manager.to_string(),
                reason,
            })
    }
}

/// Point yarn at the app's mirror through a `.yarnrc` in the scratch dir
fn write_offline_mirror_rc(work_dir: &Path, mirror: &Path) -> NodepackResult<()> {
    use std::io::Write;

    let path = work_dir.join(".yarnrc");
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| NodepackError::io(format!("opening {}", path.display()), e))?;
    writeln!(file, "yarn-offline-mirror {:?}", mirror.display().to_string())
        .map_err(|e| NodepackError::io(format!("writing {}", path.display()), e))
}

/// Keep the last `ERROR_TAIL_LINES` lines of process output
fn tail(lines: &[String]) -> String {
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns all collected output lines for error reporting.
async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> Vec<String> {
    let mut all_output = Vec::new();
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return all_output;
    };

    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_reader = BufReader::new(stdout).lines();

    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stderr_done = true,
                }
            }
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stdout_done = true,
                }
            }
        }
    }

    all_output
}
