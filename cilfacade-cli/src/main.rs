mod app;
mod commands;
mod output;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .expect("failed to set Ctrl+C handler");

    let cli = Cli::parse();

    // cilfacade info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("cilfacade", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Synthesize {
            target,
            base_namespace,
            output,
        } => commands::synthesize::run(target, base_namespace, output, &cli.global),
        Command::Rewrite {
            path,
            target,
            facade,
            output,
            serial,
        } => commands::rewrite::run(
            path,
            target,
            facade,
            output.as_deref(),
            *serial,
            &cli.global,
        ),
        Command::Info { path, maps } => commands::info::run(path, *maps, &cli.global),
    }
}
