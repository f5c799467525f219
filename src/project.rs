use crate::config::Settings;
use crate::contexts::MainSourceContext;
use crate::error::{BuilderError, Result};
use crate::render::render_file;
use crate::templates::MAIN_CPP;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::info;

pub const PROJECT_FILE_SUFFIX: &str = ".cpp-project.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Folder {
    pub path: PathBuf,
}

/// Project descriptor stored as `<name>.cpp-project.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectData {
    #[serde(default)]
    pub folders: Vec<Folder>,
    pub settings: Settings,
    #[serde(default)]
    pub build_systems: Vec<serde_json::Value>,
}

fn project_file(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}{PROJECT_FILE_SUFFIX}"))
}

/// Reads the `settings` entry of `<folder>/<basename>.cpp-project.json`.
pub fn load_project_settings(folder: &Path) -> Result<Settings> {
    let name = folder
        .canonicalize()?
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let path = project_file(folder, &name);
    info!("Loading settings for {}", path.display());

    let content = fs::read_to_string(&path)?;
    let mut json: serde_json::Value =
        serde_json::from_str(&content).map_err(|source| BuilderError::ProjectFile {
            path: path.clone(),
            source,
        })?;
    let settings = json
        .get_mut("settings")
        .map(serde_json::Value::take)
        .ok_or_else(|| BuilderError::MissingProjectSettings(path.clone()))?;
    serde_json::from_value(settings).map_err(|source| BuilderError::ProjectFile { path, source })
}

/// 创建项目目录结构和项目文件
pub struct ProjectHandler {
    name: String,
    workspace_dir: PathBuf,
    data: ProjectData,
}

impl ProjectHandler {
    pub fn new(name: &str, settings: Settings) -> Result<Self> {
        let name = name.trim();
        let mut components = Path::new(name).components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single_normal {
            return Err(BuilderError::InvalidProjectName(name.to_string()));
        }

        let workspace_dir = PathBuf::from(settings.workspace_dir.trim());
        Ok(ProjectHandler {
            name: name.to_string(),
            workspace_dir,
            data: ProjectData {
                folders: vec![],
                settings,
                build_systems: vec![],
            },
        })
    }

    pub fn project_dir(&self) -> PathBuf {
        self.workspace_dir.join(&self.name)
    }

    /// Directories, project file and a starter `main.cpp`; returns the project file path.
    pub fn create_base_project(&mut self) -> Result<PathBuf> {
        if !self.workspace_dir.as_os_str().is_empty() {
            fs::create_dir_all(&self.workspace_dir)?;
        }

        let proj_dir = self.project_dir();
        let s = &self.data.settings;
        let dirs = [&s.build_dir, &s.obj_dir, &s.src_dir]
            .into_iter()
            .chain(s.include_dir.iter())
            .map(|d| d.trim())
            .filter(|d| !d.is_empty());
        for dir in dirs {
            let full = proj_dir.join(dir);
            fs::create_dir_all(&full)?;
            info!("Made directory {}", full.display());
        }
        fs::create_dir_all(&proj_dir)?;

        let folder = Folder {
            path: proj_dir.clone(),
        };
        if !self.data.folders.contains(&folder) {
            self.data.folders.push(folder);
        }

        let path = self.write_project_file()?;
        self.write_main_source()?;
        Ok(path)
    }

    fn write_project_file(&self) -> Result<PathBuf> {
        let path = project_file(&self.project_dir(), &self.name);
        // serde_json::Value 的对象按键排序
        let value = serde_json::to_value(&self.data)?;
        let mut buf = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        value.serialize(&mut ser)?;
        buf.push(b'\n');
        fs::write(&path, buf)?;
        info!("Generated {}", path.display());
        Ok(path)
    }

    fn write_main_source(&self) -> Result<bool> {
        let path = self
            .project_dir()
            .join(self.data.settings.src_dir.trim())
            .join("main.cpp");
        let ctx = MainSourceContext {
            project_name: &self.name,
            date: Local::now().format("%Y-%m-%d").to_string(),
        };
        render_file(&path, MAIN_CPP, &ctx, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{MakefileGenerator, Platform};

    fn settings_in(workspace: &Path) -> Settings {
        Settings {
            workspace_dir: workspace.to_string_lossy().into_owned(),
            lib_dir: vec!["lib".into()],
            lib_names: vec!["m".into()],
            ..Settings::default()
        }
    }

    #[test]
    fn rejects_bad_names() {
        for name in ["", "  ", "a/b", "..", "/abs"] {
            assert!(
                matches!(
                    ProjectHandler::new(name, Settings::default()),
                    Err(BuilderError::InvalidProjectName(_))
                ),
                "{name:?}"
            );
        }
    }

    #[test]
    fn scaffolds_layout_and_descriptor() {
        let ws = tempfile::tempdir().unwrap();
        let workspace = ws.path().join("workspace");
        let mut handler = ProjectHandler::new("demo", settings_in(&workspace)).unwrap();
        let file = handler.create_base_project().unwrap();

        let proj = workspace.join("demo");
        assert_eq!(file, proj.join("demo.cpp-project.json"));
        for dir in ["build", "build/obj", "src", "include"] {
            assert!(proj.join(dir).is_dir(), "{dir}");
        }
        let main = fs::read_to_string(proj.join("src/main.cpp")).unwrap();
        assert!(main.starts_with("// demo\n"));
        assert!(main.contains("int main() {"));

        let text = fs::read_to_string(&file).unwrap();
        assert!(text.starts_with("{\n    \"build_systems\": [],\n    \"folders\": ["));
        let data: ProjectData = serde_json::from_str(&text).unwrap();
        assert_eq!(data.folders, vec![Folder { path: proj.clone() }]);
        assert_eq!(data.settings.lib_names, vec!["m"]);
    }

    #[test]
    fn scaffold_is_idempotent_and_keeps_sources() {
        let ws = tempfile::tempdir().unwrap();
        let mut handler = ProjectHandler::new("demo", settings_in(ws.path())).unwrap();
        handler.create_base_project().unwrap();
        let main = ws.path().join("demo/src/main.cpp");
        fs::write(&main, "// mine\n").unwrap();

        handler.create_base_project().unwrap();
        assert_eq!(fs::read_to_string(&main).unwrap(), "// mine\n");
        let settings = load_project_settings(&ws.path().join("demo")).unwrap();
        assert_eq!(settings, settings_in(ws.path()));
    }

    #[test]
    fn makefile_from_scaffolded_project() {
        let ws = tempfile::tempdir().unwrap();
        let mut handler = ProjectHandler::new("demo", settings_in(ws.path())).unwrap();
        handler.create_base_project().unwrap();
        let proj = handler.project_dir();

        let settings = load_project_settings(&proj).unwrap();
        let mk = MakefileGenerator::for_project(settings, &proj, Platform::Unix)
            .unwrap()
            .make_file()
            .unwrap();
        assert!(mk.contains("$(OBJ_DIR)/main.o: $(SRC_DIR)/main.cpp"));
        assert!(mk.contains("LIB_NAMES = m\n"));
    }

    #[test]
    fn broken_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let proj = dir.path().join("demo");
        fs::create_dir(&proj).unwrap();

        fs::write(proj.join("demo.cpp-project.json"), "{\"settings\": {},}").unwrap();
        let err = load_project_settings(&proj).unwrap_err();
        assert!(err.to_string().contains("unnecessary comma"));

        fs::write(proj.join("demo.cpp-project.json"), "{\"folders\": []}").unwrap();
        assert!(matches!(
            load_project_settings(&proj),
            Err(BuilderError::MissingProjectSettings(_))
        ));
    }
}
