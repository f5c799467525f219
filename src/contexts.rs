use serde::Serialize;

#[derive(Serialize)]
pub struct MakefileContext {
    pub has_headers: bool,
    pub hdr_dir: String,
    pub has_libs: bool,
    pub lib_dir: String,
    pub lib_names: String,
    pub has_flags: bool,
    pub cc_option: String,
    pub cc: String,
    pub has_obj_dir: bool,
    pub obj_dir: String,
    pub objects: String,
    pub has_build_dir: bool,
    pub build_dir: String,
    pub has_src_dir: bool,
    pub src_dir: String,
    /// Path of the linked executable, e.g. `$(BUILD_DIR)/main.out`
    pub output: String,
    pub prerequisites: String,
    pub units: Vec<UnitContext>,
    pub run_command: String,
    pub clean: Vec<String>,
}

/// One `x.o: x.cpp` rule
#[derive(Serialize)]
pub struct UnitContext {
    pub object: String,
    pub source: String,
    pub with_flags: bool,
    pub with_headers: bool,
}

#[derive(Serialize)]
pub struct MainSourceContext<'a> {
    pub project_name: &'a str,
    pub date: String,
}
