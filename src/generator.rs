use crate::config::Settings;
use crate::contexts::{MakefileContext, UnitContext};
use crate::error::{BuilderError, Result};
use crate::render::render;
use crate::templates::MAKEFILE;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Platform {
    Unix,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }

    fn sep(self) -> &'static str {
        match self {
            Platform::Unix => "/",
            Platform::Windows => "\\",
        }
    }

    fn exe_ext(self) -> &'static str {
        match self {
            Platform::Unix => ".out",
            Platform::Windows => ".exe",
        }
    }

    fn del_command(self) -> &'static str {
        match self {
            Platform::Unix => "rm -f",
            Platform::Windows => "del /Q",
        }
    }
}

/// Source files directly inside `dir`, sorted by name.
pub fn discover_sources(dir: &Path, extensions: &[String]) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(BuilderError::SourceDirNotFound(dir.to_path_buf()));
    }

    let mut sources = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|x| x.trim_start_matches('.') == ext));
        if !matches {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            sources.push(name.to_string());
        }
    }
    sources.sort();
    Ok(sources)
}

fn object_name(source: &str) -> String {
    Path::new(source).with_extension("o").to_string_lossy().into_owned()
}

pub struct MakefileGenerator {
    settings: Settings,
    sources: Vec<String>,
    platform: Platform,
}

impl MakefileGenerator {
    pub fn new(mut settings: Settings, sources: Vec<String>, platform: Platform) -> Self {
        settings.src_dir = settings.src_dir.trim().to_string();
        settings.obj_dir = settings.obj_dir.trim().to_string();
        settings.build_dir = settings.build_dir.trim().to_string();
        MakefileGenerator {
            settings,
            sources,
            platform,
        }
    }

    /// Sources come from `<root>/<src_dir>`.
    pub fn for_project(settings: Settings, root: &Path, platform: Platform) -> Result<Self> {
        let src = root.join(settings.src_dir.trim());
        let sources = discover_sources(&src, &settings.source_extensions)?;
        Ok(Self::new(settings, sources, platform))
    }

    /// Sources sit next to `file`, so no `SRC_DIR` is emitted.
    pub fn for_single_file(mut settings: Settings, file: &Path, platform: Platform) -> Result<Self> {
        let dir = match file.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        settings.src_dir.clear();
        let sources = discover_sources(&dir, &settings.source_extensions)?;
        Ok(Self::new(settings, sources, platform))
    }

    fn output_file(&self) -> String {
        let s = &self.settings;
        let stem = s
            .project_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(Some(s.main_file.as_str()).filter(|n| !n.trim().is_empty()))
            .unwrap_or("output");
        format!("{}{}", stem.trim(), self.platform.exe_ext())
    }

    fn context(&self) -> MakefileContext {
        let s = &self.settings;
        let sep = self.platform.sep();

        let has_headers = !s.include_dir.is_empty();
        let has_libs = !s.lib_dir.is_empty() && !s.lib_names.is_empty();
        let has_flags = !s.additional_flags.is_empty();
        let has_obj_dir = !s.obj_dir.is_empty();
        let has_build_dir = !s.build_dir.is_empty();
        let has_src_dir = !s.src_dir.is_empty();

        let exe = self.output_file();
        let output = if has_build_dir {
            format!("$(BUILD_DIR){sep}{exe}")
        } else {
            exe.clone()
        };
        let run_command = match (has_build_dir, self.platform) {
            (false, Platform::Unix) => format!("./{exe}"),
            _ => output.clone(),
        };
        let prerequisites = if has_obj_dir {
            format!("$(addprefix $(OBJ_DIR){sep},$(OBJ))")
        } else {
            "$(OBJ)".to_string()
        };

        let units = self
            .sources
            .iter()
            .map(|src| {
                let obj = object_name(src);
                UnitContext {
                    object: if has_obj_dir { format!("$(OBJ_DIR){sep}{obj}") } else { obj },
                    source: if has_src_dir { format!("$(SRC_DIR){sep}{src}") } else { src.clone() },
                    with_flags: has_flags,
                    with_headers: has_headers,
                }
            })
            .collect();

        let del = self.platform.del_command();
        let clean = if s.clean.is_empty() {
            vec![format!("{del} {prerequisites}"), format!("{del} {output}")]
        } else {
            s.clean
                .iter()
                .map(|c| format!("{del} {}", c.replace('\\', sep)))
                .collect()
        };

        MakefileContext {
            has_headers,
            hdr_dir: s.include_dir.join(" "),
            has_libs,
            lib_dir: s.lib_dir.join(" "),
            lib_names: s.lib_names.join(" "),
            has_flags,
            cc_option: s.additional_flags.join(" "),
            cc: if s.cc.trim().is_empty() { "g++".to_string() } else { s.cc.trim().to_string() },
            has_obj_dir,
            obj_dir: s.obj_dir.clone(),
            objects: self.sources.iter().map(|src| object_name(src)).collect::<Vec<_>>().join(" "),
            has_build_dir,
            build_dir: s.build_dir.clone(),
            has_src_dir,
            src_dir: s.src_dir.clone(),
            output,
            prerequisites,
            units,
            run_command,
            clean,
        }
    }

    /// 生成 Makefile 文本
    pub fn make_file(&self) -> Result<String> {
        if self.sources.is_empty() {
            warn!("No source files found");
            return Ok("# No sources provided".to_string());
        }
        render(MAKEFILE, &self.context())
    }

    /// Writes `<dir>/Makefile`, replacing any existing one.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join("Makefile");
        fs::write(&path, self.make_file()?)?;
        info!("Generated {} ({} sources)", path.display(), self.sources.len());
        Ok(path)
    }
}
