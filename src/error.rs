use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BuilderError>;

#[derive(Error, Debug)]
pub enum BuilderError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Settings(#[from] toml::de::Error),

    #[error(
        "failed to read project file {path}: {source}\n\
         Check if there is an unnecessary comma at the end of a line"
    )]
    ProjectFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("project file {0} has no \"settings\" entry")]
    MissingProjectSettings(PathBuf),

    #[error("failed to write project file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("template error: {0}")]
    Template(#[from] tinytemplate::error::Error),

    #[error("couldn't find source folder: {0}")]
    SourceDirNotFound(PathBuf),

    #[error("no Makefile/makefile found in {0}")]
    NoMakefile(PathBuf),

    #[error("more than one Makefile/makefile found in {0}")]
    AmbiguousMakefile(PathBuf),

    #[error("invalid project name {0:?}")]
    InvalidProjectName(String),

    #[error("build failed: {0}")]
    BuildFailed(String),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}
