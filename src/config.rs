use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 内置默认配置
pub const DEFAULT_SETTINGS: &str = include_str!("default_settings.toml");

/// Flat settings record driving Makefile generation and project scaffolding.
///
/// The same record is stored under the `settings` key of a project file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cc: String,
    pub src_dir: String,
    pub obj_dir: String,
    pub build_dir: String,
    pub include_dir: Vec<String>,
    pub lib_dir: Vec<String>,
    #[serde(alias = "lib_name")]
    pub lib_names: Vec<String>,
    pub additional_flags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    pub main_file: String,
    pub clean: Vec<String>,
    pub source_extensions: Vec<String>,
    pub workspace_dir: String,
    pub terminal_emu: String,
    pub terminal_opts: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            cc: "g++".into(),
            src_dir: "./src".into(),
            obj_dir: "./build/obj".into(),
            build_dir: "./build".into(),
            include_dir: vec!["./include".into()],
            lib_dir: vec![],
            lib_names: vec![],
            additional_flags: vec![],
            project_name: None,
            main_file: "main".into(),
            clean: vec![],
            source_extensions: vec!["cpp".into()],
            workspace_dir: String::new(),
            terminal_emu: "x-terminal-emulator".into(),
            terminal_opts: vec!["-x".into()],
        }
    }
}

impl Settings {
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        debug!("Loaded settings from {}", path.display());
        Self::from_toml(&content)
    }

    /// Loads `path`, or the user settings file when none is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Self::from_file(&ensure_user_settings()?),
        }
    }
}

/// `<config_dir>/cpp_builder/settings.toml`
pub fn user_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cpp_builder")
        .join("settings.toml")
}

/// 首次运行时写出默认配置
pub fn ensure_user_settings() -> Result<PathBuf> {
    let path = user_settings_path();
    install_default_settings(&path)?;
    Ok(path)
}

fn install_default_settings(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, DEFAULT_SETTINGS)?;
    info!("Created default settings at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_match_struct_defaults() {
        let parsed = Settings::from_toml(DEFAULT_SETTINGS).unwrap();
        assert_eq!(parsed, Settings::default());
    }

    #[test]
    fn missing_keys_fall_back() {
        let s = Settings::from_toml("cc = \"clang++\"\nlib_name = [\"m\"]\n").unwrap();
        assert_eq!(s.cc, "clang++");
        assert_eq!(s.lib_names, vec!["m"]);
        assert_eq!(s.src_dir, "./src");
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(Settings::from_toml("cc = [").is_err());
    }

    #[test]
    fn install_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        install_default_settings(&path).unwrap();
        fs::write(&path, "cc = \"clang++\"\n").unwrap();
        install_default_settings(&path).unwrap();
        assert_eq!(Settings::from_file(&path).unwrap().cc, "clang++");
    }
}
