use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Folder used when variables are enabled without an explicit folder.
pub const DEFAULT_FOLDER: &str = "./variables";

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct VariableOptions {
    pub enabled: bool,
    /// Must already exist when set; the default folder is created on demand.
    pub folder: Option<PathBuf>,
}

/// Resolves the folder variables are stored in, creating the default one if
/// needed. Returns `None` when variables are disabled.
pub fn provision_folder(options: &VariableOptions) -> Result<Option<PathBuf>> {
    provision_folder_with_default(options, Path::new(DEFAULT_FOLDER))
}

fn provision_folder_with_default(
    options: &VariableOptions,
    default: &Path,
) -> Result<Option<PathBuf>> {
    if !options.enabled {
        return Ok(None);
    }

    match &options.folder {
        Some(folder) if folder.is_dir() => Ok(Some(folder.clone())),
        Some(folder) => {
            tracing::error!("the variable folder {} does not exist", folder.display());
            Err(Error::MissingVariableFolder(folder.clone()))
        }
        None => {
            if !default.exists() {
                fs::create_dir_all(default)?;
                tracing::info!("created default variables folder at {}", default.display());
            }
            Ok(Some(default.to_path_buf()))
        }
    }
}

/// A named JSON value persisted as `<folder>/<name>.json`.
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    path: PathBuf,
}

impl Variable {
    /// Opens the variable, writing `value` only if nothing is stored yet so
    /// values survive restarts.
    pub fn create(name: &str, value: serde_json::Value, folder: &Path) -> Result<Self> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(Error::InvalidVariableName(name.to_string()));
        }

        let variable = Self {
            name: name.to_string(),
            path: folder.join(format!("{name}.json")),
        };
        if !variable.path.exists() {
            variable.set(&value)?;
        }
        Ok(variable)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&fs::read_to_string(&self.path)?)?)
    }

    pub fn set(&self, value: &serde_json::Value) -> Result<()> {
        fs::write(&self.path, serde_json::to_string_pretty(value)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn disabled_variables_have_no_folder() {
        let options = VariableOptions::default();
        assert!(provision_folder(&options).unwrap().is_none());
    }

    #[test]
    fn default_folder_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let default = dir.path().join("variables");
        let options = VariableOptions {
            enabled: true,
            folder: None,
        };

        let folder = provision_folder_with_default(&options, &default).unwrap();
        assert_eq!(folder.as_deref(), Some(default.as_path()));
        assert!(default.is_dir());
    }

    #[test]
    fn missing_custom_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let options = VariableOptions {
            enabled: true,
            folder: Some(dir.path().join("nope")),
        };

        let err = provision_folder(&options).unwrap_err();
        assert!(matches!(err, Error::MissingVariableFolder(_)));
        assert!(!dir.path().join("nope").exists());
    }

    #[test]
    fn values_persist_across_creates() {
        let dir = tempfile::tempdir().unwrap();
        let counter = Variable::create("counter", json!(0), dir.path()).unwrap();
        assert_eq!(counter.get().unwrap(), json!(0));

        counter.set(&json!(5)).unwrap();
        let reopened = Variable::create("counter", json!(0), dir.path()).unwrap();
        assert_eq!(reopened.get().unwrap(), json!(5));
        assert_eq!(reopened.path(), dir.path().join("counter.json"));
    }

    #[test]
    fn names_cannot_escape_the_folder() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["", "../escape", "a/b", "dots.json"] {
            assert!(matches!(
                Variable::create(name, json!(null), dir.path()),
                Err(Error::InvalidVariableName(_))
            ));
        }
    }
}
