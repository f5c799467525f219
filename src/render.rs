use crate::error::Result;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tinytemplate::TinyTemplate;
use tracing::{info, warn};

pub fn render<T: Serialize>(template: &str, ctx: &T) -> Result<String> {
    let mut tt = TinyTemplate::new();
    // Makefile 中的 `<`、`&` 等字符不能被转义
    tt.set_default_formatter(&tinytemplate::format_unescaped);
    tt.add_template("tpl", template)?;
    Ok(tt.render("tpl", ctx)?)
}

/// Renders `template` into `path`. Returns `false` when an existing file was left alone.
pub fn render_file<T: Serialize>(path: &Path, template: &str, ctx: &T, force: bool) -> Result<bool> {
    if path.exists() && !force {
        warn!("Skip existing {}", path.display());
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let content = render(template, ctx)?;

    fs::write(path, content)?;
    info!("Generated {}", path.display());
    Ok(true)
}
