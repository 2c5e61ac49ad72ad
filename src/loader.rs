use std::{
    fs,
    path::{Path, PathBuf},
};

use mlua::prelude::*;

use crate::{
    error::{Error, Result},
    lua::{ScriptArg, ScriptHost, script_handler},
    registry::{HandlerKind, Registry},
};

/// Width of the name column in the load table.
const LABEL_WIDTH: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedEntry {
    pub name: String,
    pub kind: HandlerKind,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of a directory scan. Failures are per file and never abort the
/// scan.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<LoadedEntry>,
    pub failures: Vec<LoadFailure>,
    /// Number of entries directly inside the scanned directory.
    pub top_level_entries: usize,
}
impl LoadReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn commands(&self) -> impl Iterator<Item = &LoadedEntry> {
        self.loaded
            .iter()
            .filter(|entry| entry.kind == HandlerKind::Command)
    }

    pub fn interactions(&self) -> impl Iterator<Item = &LoadedEntry> {
        self.loaded
            .iter()
            .filter(|entry| entry.kind == HandlerKind::Interaction)
    }
}

/// Recursively loads every script under `root` into `commands` or
/// `interactions`, depending on the `type` each script declares.
///
/// Each script must evaluate to a table `{ name?, type?, content }`, where
/// `content` is the handler function. `name` defaults to the file stem.
/// Only an unreadable `root` is an error; anything wrong with an individual
/// file is recorded in the returned report.
pub fn load_directory<C: ScriptArg, I: ScriptArg>(
    host: &ScriptHost,
    root: &Path,
    commands: &mut Registry<C>,
    interactions: &mut Registry<I>,
    show_load: bool,
) -> Result<LoadReport> {
    let root = std::path::absolute(root).map_err(|source| Error::LoadRoot {
        path: root.to_path_buf(),
        source,
    })?;
    let entries = sorted_entries(&root).map_err(|source| Error::LoadRoot {
        path: root.clone(),
        source,
    })?;

    if show_load {
        println!("Loading handlers from {}", root.display());
        println!("{}", "-".repeat(LABEL_WIDTH + 10));
    }

    let mut loader = Loader {
        host,
        commands,
        interactions,
        show_load,
        report: LoadReport {
            top_level_entries: entries.len(),
            ..Default::default()
        },
    };
    loader.load_entries(entries);
    let report = loader.report;

    if show_load {
        println!("{}", "-".repeat(LABEL_WIDTH + 10));
        println!(
            "{} failed to load, {} entries in {}",
            report.failed(),
            report.top_level_entries,
            root.display()
        );
    }
    tracing::info!(
        loaded = report.loaded.len(),
        failed = report.failed(),
        "loaded handlers from {}",
        root.display()
    );

    Ok(report)
}

fn sorted_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

struct Loader<'a, C, I> {
    host: &'a ScriptHost,
    commands: &'a mut Registry<C>,
    interactions: &'a mut Registry<I>,
    show_load: bool,
    report: LoadReport,
}

impl<C: ScriptArg, I: ScriptArg> Loader<'_, C, I> {
    fn load_entries(&mut self, entries: Vec<PathBuf>) {
        for path in entries {
            if path.is_dir() {
                match sorted_entries(&path) {
                    Ok(children) => self.load_entries(children),
                    Err(err) => self.fail(path, err.to_string()),
                }
            } else if ScriptHost::is_script(&path) {
                match self.load_script(&path) {
                    Ok(entry) => self.succeed(entry),
                    Err(err) => self.fail(path, err.to_string()),
                }
            }
        }
    }

    fn load_script(&mut self, path: &Path) -> LuaResult<LoadedEntry> {
        let value = self.host.eval_file(path)?;
        let LuaValue::Table(module) = value else {
            return Err(LuaError::runtime(format!(
                "expected the script to return a table, got {}",
                value.type_name()
            )));
        };

        let name = match module.get::<Option<String>>("name")? {
            Some(name) => name,
            None => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let declared = module.get::<Option<String>>("type")?;
        let kind = HandlerKind::from_declared(declared.as_deref());
        let content = match module.get::<LuaValue>("content")? {
            LuaValue::Function(function) => function,
            other => {
                return Err(LuaError::runtime(format!(
                    "`content` must be a function, got {}",
                    other.type_name()
                )));
            }
        };

        match kind {
            HandlerKind::Command => {
                self.commands
                    .register(&name, script_handler(self.host, content));
            }
            HandlerKind::Interaction => {
                self.interactions
                    .register(&name, script_handler(self.host, content));
            }
        }

        Ok(LoadedEntry {
            name,
            kind,
            path: path.to_path_buf(),
        })
    }

    fn succeed(&mut self, entry: LoadedEntry) {
        tracing::debug!(name = %entry.name, kind = ?entry.kind, "loaded {}", entry.path.display());
        if self.show_load {
            let label = match entry.kind {
                HandlerKind::Interaction => format!("{} (type: interaction)", entry.name),
                HandlerKind::Command => format!("{} (default: command)", entry.name),
            };
            println!("{label:<width$} ok", width = LABEL_WIDTH);
        }
        self.report.loaded.push(entry);
    }

    fn fail(&mut self, path: PathBuf, message: String) {
        tracing::warn!("failed to load {}: {message}", path.display());
        if self.show_load {
            let label = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            println!("{label:<width$} failed", width = LABEL_WIDTH);
        }
        self.report.failures.push(LoadFailure { path, message });
    }
}
