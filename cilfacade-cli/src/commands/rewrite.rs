use std::path::Path;

use anyhow::Context;
use cilfacade::{WeaveOutcome, Weaver, WeaverConfig};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{load_module, save_module},
    output::print_output,
};

#[derive(Debug, Serialize)]
struct RewriteSummary {
    module: String,
    woven: bool,
    outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
}

pub fn run(
    path: &Path,
    target_path: &Path,
    facade_path: &Path,
    output: Option<&Path>,
    serial: bool,
    opts: &GlobalOptions,
) -> anyhow::Result<()> {
    let mut module = load_module(path)?;
    let target = load_module(target_path)?;
    let facade = load_module(facade_path)?;

    let config = WeaverConfig {
        target_assembly: target.name.clone(),
        facade_assembly: facade.name.clone(),
        facade_namespace: facade.name.clone(),
        parallel: !serial,
        ..WeaverConfig::default()
    };

    let outcome = Weaver::new(config, &target, &facade)
        .weave(&mut module)
        .with_context(|| format!("failed to rewrite {}", module.name))?;

    let written = match outcome {
        WeaveOutcome::Woven(_) => {
            let destination = output.unwrap_or(path);
            save_module(&module, destination)?;
            Some(destination.display().to_string())
        }
        WeaveOutcome::Skipped(_) => None,
    };

    let summary = RewriteSummary {
        module: module.name.clone(),
        woven: written.is_some(),
        outcome: outcome.to_string(),
        output: written,
    };

    print_output(&summary, opts, |s| {
        println!("{}: {}", s.module, s.outcome);
        if let Some(destination) = &s.output {
            println!("  written to {destination}");
        }
    })
}
