/// Emulator plugins: turn an emulator path, ROM path and custom parameters into
/// a concrete command line.
///
/// Concrete emulator integrations live outside the front-end.  The only built-in
/// plugin is [`TemplatePlugin`], configured from `[[plugins]]` tables with an
/// argument template.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::warn;

use crate::config::{GameRef, PluginConfig};
use crate::error::LaunchError;

/// A fully resolved process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Directory the child starts in; defaults to the program's directory.
    pub working_dir: Option<PathBuf>,
}

impl LaunchCommand {
    /// Runs `program` directly with shell-style split `params`.
    pub fn native(program: &Path, params: &str) -> Self {
        Self {
            program: program.to_path_buf(),
            args: split_args(params),
            working_dir: program.parent().filter(|p| !p.as_os_str().is_empty()).map(Path::to_path_buf),
        }
    }
}

pub trait EmulatorPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn build_launch_command(
        &self,
        emulator: &Path,
        rom: Option<&Path>,
        params: &str,
    ) -> Result<LaunchCommand, LaunchError>;

    /// Command lines to start, without waiting, before the game launches.
    fn pre_launch(&self, _game: &GameRef) -> Vec<String> {
        Vec::new()
    }

    /// Command lines to start, without waiting, after the game exits.
    fn post_exit(&self, _game: &GameRef) -> Vec<String> {
        Vec::new()
    }
}

/// Plugin driven by an argument template.
///
/// An argument that is exactly `{params}` expands to the custom parameters split
/// into separate arguments.  Elsewhere `{emulator}`, `{rom}` and `{params}` are
/// substituted in place.  Arguments that end up empty are dropped.
#[derive(Debug, Clone)]
pub struct TemplatePlugin {
    config: PluginConfig,
}

impl TemplatePlugin {
    pub fn new(config: PluginConfig) -> Self {
        Self { config }
    }
}

impl EmulatorPlugin for TemplatePlugin {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn build_launch_command(
        &self,
        emulator: &Path,
        rom: Option<&Path>,
        params: &str,
    ) -> Result<LaunchCommand, LaunchError> {
        let emulator_str = emulator.to_string_lossy();
        let rom_str = rom.map(|r| r.to_string_lossy().into_owned());

        let mut args = Vec::new();
        for template in &self.config.args {
            if template == "{params}" {
                args.extend(split_args(params));
                continue;
            }
            if template.contains("{rom}") && rom_str.is_none() {
                return Err(LaunchError::Plugin {
                    plugin: self.config.name.clone(),
                    reason: "game has no ROM path".into(),
                });
            }
            let arg = template
                .replace("{emulator}", &emulator_str)
                .replace("{rom}", rom_str.as_deref().unwrap_or_default())
                .replace("{params}", params.trim());
            if !arg.is_empty() {
                args.push(arg);
            }
        }

        let mut command = LaunchCommand::native(emulator, "");
        command.args = args;
        Ok(command)
    }

    fn pre_launch(&self, _game: &GameRef) -> Vec<String> {
        self.config.pre_launch.clone()
    }

    fn post_exit(&self, _game: &GameRef) -> Vec<String> {
        self.config.post_exit.clone()
    }
}

/// Plugins by lower-cased name.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Box<dyn EmulatorPlugin>>,
}

impl PluginRegistry {
    pub fn from_config(configs: &[PluginConfig]) -> Self {
        let mut registry = Self::default();
        for config in configs {
            registry.register(Box::new(TemplatePlugin::new(config.clone())));
        }
        registry
    }

    /// Adds `plugin`, replacing any plugin with the same name.
    pub fn register(&mut self, plugin: Box<dyn EmulatorPlugin>) {
        let key = plugin.name().to_lowercase();
        if self.plugins.insert(key, plugin).is_some() {
            warn!("Duplicate emulator plugin name; the later definition wins");
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn EmulatorPlugin> {
        self.plugins.get(&name.to_lowercase()).map(|p| p.as_ref())
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Splits a command line on whitespace.  Double quotes group words and are
/// removed; there are no escapes.
pub fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        args.push(current);
    }
    args
}
