use std::path::Path;

use anyhow::Context;
use cilfacade::CilModule;

/// Load a module image.
pub fn load_module(path: &Path) -> anyhow::Result<CilModule> {
    CilModule::from_file(path).with_context(|| format!("failed to load module: {}", path.display()))
}

/// Write a module image.
pub fn save_module(module: &CilModule, path: &Path) -> anyhow::Result<()> {
    module
        .to_file(path)
        .with_context(|| format!("failed to write module: {}", path.display()))
}
