use serde::Serialize;
use std::collections::BTreeMap;

/// A rule target found in a Makefile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    /// What gets passed to `make`; `$(VAR)` references are expanded by `parse_makefile`.
    pub fullname: String,
    /// Last path component of the name as written, used for display.
    pub basename: String,
}

#[derive(Debug, Default, Serialize)]
pub struct MakefileInfo {
    pub variables: BTreeMap<String, String>,
    pub targets: Vec<Target>,
}

impl MakefileInfo {
    pub fn find(&self, name: &str) -> Option<&Target> {
        self.targets
            .iter()
            .find(|t| t.fullname == name)
            .or_else(|| self.targets.iter().find(|t| t.basename == name))
    }
}
