use std::path::Path;

use anyhow::Context;
use cilfacade::{FacadeSynthesizer, SynthesizerConfig};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{load_module, save_module},
    output::print_output,
};

#[derive(Debug, Serialize)]
struct SynthesisSummary {
    facade: String,
    version: String,
    target: String,
    types: usize,
    symbol_maps: usize,
    output: String,
}

pub fn run(
    target_path: &Path,
    base_namespace: &str,
    output: &Path,
    opts: &GlobalOptions,
) -> anyhow::Result<()> {
    let target = load_module(target_path)?;

    let mut config = SynthesizerConfig::new(base_namespace);
    if let Some(directory) = target_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        config = config.with_search_directory(directory);
    }

    let facade = FacadeSynthesizer::new(config)
        .synthesize(&target)
        .with_context(|| format!("failed to synthesize a facade for {}", target.name))?;
    save_module(&facade, output)?;

    let summary = SynthesisSummary {
        facade: facade.name.clone(),
        version: facade.version.to_string(),
        target: target.name.clone(),
        types: facade.type_count(),
        symbol_maps: facade.resources.len(),
        output: output.display().to_string(),
    };

    print_output(&summary, opts, |s| {
        println!(
            "{} {} ({} types, {} symbol maps) for {} written to {}",
            s.facade, s.version, s.types, s.symbol_maps, s.target, s.output
        );
    })
}
