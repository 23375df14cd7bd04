/// External game process lifecycle: launch, exit detection, forced termination
/// of the whole process tree, and pre-launch / post-exit side commands.
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use log::{debug, error, info, warn};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::config::GameRef;
use crate::error::{LaunchError, TerminationError};
use crate::event::FrontendEvent;
use crate::hotkey::DoublePress;
use crate::plugin::{LaunchCommand, PluginRegistry};

/// The game currently running, from spawn until post-exit cleanup.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub game: GameRef,
    pub pid: u32,
    pub is_active: bool,
    pub started_at: Instant,
    pub kill_press: DoublePress,
    pub overlay_press: DoublePress,
    pub overlay_visible: bool,
}

pub struct ProcessLifecycleManager {
    plugins: PluginRegistry,
    session: Option<ActiveSession>,
    tx: mpsc::Sender<FrontendEvent>,
}

impl ProcessLifecycleManager {
    /// Exit notifications are posted to `tx`.
    pub fn new(plugins: PluginRegistry, tx: mpsc::Sender<FrontendEvent>) -> Self {
        log_plugins(&plugins);
        Self { plugins, session: None, tx }
    }

    pub fn set_plugins(&mut self, plugins: PluginRegistry) {
        log_plugins(&plugins);
        self.plugins = plugins;
    }

    pub fn session(&self) -> Option<&ActiveSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut ActiveSession> {
        self.session.as_mut()
    }

    pub fn is_game_active(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_active)
    }

    /// Resolves the command line for `game`: the executable itself, or the
    /// plugin-built emulator invocation.  The executable (or emulator) must exist.
    ///
    /// Paths are made absolute against the front-end's working directory, since
    /// the child starts in the program's own directory.
    pub fn build_command(&self, game: &GameRef) -> Result<LaunchCommand, LaunchError> {
        let executable = fs::canonicalize(&game.executable)
            .ok()
            .filter(|p| p.is_file())
            .ok_or_else(|| LaunchError::ExecutableNotFound(game.executable.clone()))?;
        match &game.plugin {
            None => Ok(LaunchCommand::native(&executable, &game.parameters)),
            Some(name) => {
                let plugin = self
                    .plugins
                    .get(name)
                    .ok_or_else(|| LaunchError::PluginNotFound(name.clone()))?;
                let rom = game.rom.as_deref().map(absolute_or_unchanged);
                plugin.build_launch_command(&executable, rom.as_deref(), &game.parameters)
            }
        }
    }

    /// Runs the pre-launch commands, spawns the game and starts watching it.
    ///
    /// Must be called from within a tokio runtime.  On error no session exists.
    pub fn launch(&mut self, game: &GameRef) -> Result<u32, LaunchError> {
        if let Some(session) = &self.session {
            return Err(LaunchError::SessionActive(session.pid));
        }
        let command = self.build_command(game)?;

        let mut side_commands = game.pre_launch.clone();
        if let Some(plugin) = game.plugin.as_deref().and_then(|n| self.plugins.get(n)) {
            side_commands.extend(plugin.pre_launch(game));
        }
        for line in &side_commands {
            run_detached(line);
        }

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args).stdin(Stdio::null());
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }
        let mut child = cmd.spawn()?;
        let Some(pid) = child.id() else {
            return Err(LaunchError::Spawn(io::Error::other(
                "process exited before its pid could be read",
            )));
        };
        info!(
            "Launched '{}' (pid {pid}): {} {:?}",
            game.name,
            command.program.display(),
            command.args
        );

        let tx = self.tx.clone();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!("Failed to wait for pid {pid}: {e}");
                    None
                }
            };
            let _ = tx.send(FrontendEvent::ProcessExited { pid, code }).await;
        });

        self.session = Some(ActiveSession {
            game: game.clone(),
            pid,
            is_active: true,
            started_at: Instant::now(),
            kill_press: DoublePress::default(),
            overlay_press: DoublePress::default(),
            overlay_visible: false,
        });
        Ok(pid)
    }

    /// Force-terminates the running session's process tree.  The exit watcher
    /// still reports the exit, which drives the normal return path.
    pub fn kill_active_tree(&mut self) -> Result<usize, TerminationError> {
        let Some(session) = &self.session else {
            debug!("Kill requested with no active session");
            return Ok(0);
        };
        warn!("Killing '{}' (pid {}) and its children", session.game.name, session.pid);
        kill_tree(session.pid)
    }

    /// Handles a child exit.  If `pid` belongs to the session, runs the
    /// post-exit commands, clears the session and returns it.  Stale exits from
    /// earlier sessions are ignored.
    pub fn on_exit(&mut self, pid: u32, code: Option<i32>) -> Option<ActiveSession> {
        if self.session.as_ref().map(|s| s.pid) != Some(pid) {
            debug!("Ignoring exit of untracked pid {pid}");
            return None;
        }
        let mut session = self.session.take()?;
        session.is_active = false;
        info!(
            "'{}' exited with {} after {:.1}s",
            session.game.name,
            code.map_or_else(|| "no exit code".to_string(), |c| format!("code {c}")),
            session.started_at.elapsed().as_secs_f64()
        );

        let mut side_commands = session.game.post_exit.clone();
        if let Some(plugin) = session.game.plugin.as_deref().and_then(|n| self.plugins.get(n)) {
            side_commands.extend(plugin.post_exit(&session.game));
        }
        for line in &side_commands {
            run_detached(line);
        }
        Some(session)
    }
}

/// Starts `line` without waiting for it.  Failures are logged.
pub fn run_detached(line: &str) {
    let args = crate::plugin::split_args(line);
    let Some((program, rest)) = args.split_first() else {
        return;
    };
    match Command::new(program).args(rest).stdin(Stdio::null()).spawn() {
        Ok(_) => debug!("Started side command: {line}"),
        Err(e) => error!("Failed to start side command '{line}': {e}"),
    }
}

/// Terminates `root`, then every process descended from it.
///
/// The process table is snapshotted before anything is killed so children
/// orphaned by the root's death are still found.  Returns how many processes
/// were terminated; individual failures are logged and not retried.
pub fn kill_tree(root: u32) -> Result<usize, TerminationError> {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);

    let table: Vec<(u32, Option<u32>)> = sys
        .processes()
        .iter()
        .map(|(pid, p)| (pid.as_u32(), p.parent().map(|pp| pp.as_u32())))
        .collect();
    let Some(root_process) = sys.process(Pid::from_u32(root)) else {
        return Err(TerminationError::NotFound(root));
    };
    let children = descendants(root, &table);

    let mut killed = 0;
    if root_process.kill() {
        killed += 1;
    } else {
        warn!("Failed to kill pid {root}");
    }
    for pid in children {
        match sys.process(Pid::from_u32(pid)) {
            Some(p) if p.kill() => killed += 1,
            Some(_) => warn!("Failed to kill child pid {pid}"),
            None => debug!("Child pid {pid} already gone"),
        }
    }

    if killed == 0 {
        return Err(TerminationError::KillFailed(root));
    }
    info!("Terminated {killed} process(es) in tree of pid {root}");
    Ok(killed)
}

/// All transitive children of `root` in a `(pid, parent)` table, breadth-first.
pub fn descendants(root: u32, table: &[(u32, Option<u32>)]) -> Vec<u32> {
    let mut found = Vec::new();
    let mut seen = HashSet::from([root]);
    let mut queue = VecDeque::from([root]);
    while let Some(parent) = queue.pop_front() {
        for &(pid, ppid) in table {
            if ppid == Some(parent) && seen.insert(pid) {
                found.push(pid);
                queue.push_back(pid);
            }
        }
    }
    found
}

fn log_plugins(plugins: &PluginRegistry) {
    if plugins.is_empty() {
        debug!("No emulator plugins configured");
    } else {
        info!("{} emulator plugin(s) registered", plugins.len());
    }
}

/// ROMs may be missing at build time; the emulator reports that itself.
fn absolute_or_unchanged(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
