pub const MAKEFILE: &str = include_str!("templates/Makefile.tmpl");
pub const MAIN_CPP: &str = include_str!("templates/main.cpp.tmpl");
