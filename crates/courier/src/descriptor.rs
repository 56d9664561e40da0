//! Module descriptor files.

use std::path::Path;

use anyhow::{Context, Result};
use courier_types::Module;

/// Parse the descriptor at `path`.
pub fn parse(path: &Path) -> Result<Module> {
    let content = std::fs::read(path)
        .with_context(|| format!("failed to read module descriptor {}", path.display()))?;
    let module: Module = serde_json::from_slice(&content)
        .with_context(|| format!("failed to parse module descriptor {}", path.display()))?;
    Ok(module)
}
