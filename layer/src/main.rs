mod commands;
mod error;
mod util;

use std::path::PathBuf;

use layer_format::{CacheOptions, CleanupReport, LayerCache};
use structopt::clap::AppSettings::*;
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, StructOpt)]
enum Commands {
    #[structopt(
        name = "ls",
        visible_alias = "list",
        about = "List a directory inside a layer"
    )]
    List {
        #[structopt(
            name = "layer",
            parse(from_os_str),
            help = "Path to an uncompressed layer tarball"
        )]
        layer: PathBuf,

        #[structopt(name = "path", default_value = ".", help = "Directory inside the layer")]
        path: String,

        #[structopt(long, help = "Print the listing as JSON")]
        json: bool,
    },

    #[structopt(name = "cat", about = "Print a file from a layer")]
    Cat {
        #[structopt(
            name = "layer",
            parse(from_os_str),
            help = "Path to an uncompressed layer tarball"
        )]
        layer: PathBuf,

        #[structopt(name = "path", help = "File inside the layer")]
        path: String,
    },
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "layer",
    about = "Explore container image layers without unpacking them.",
    settings = &[SubcommandRequiredElseHelp, DisableHelpSubcommand, VersionlessSubcommands],
)]
struct CliOpts {
    #[structopt(short, long, help = "Show verbose output", global = true)]
    verbose: bool,

    #[structopt(
        long,
        parse(from_os_str),
        help = "Directory to keep extracted layers in [default: system temp dir]",
        global = true
    )]
    cache_dir: Option<PathBuf>,

    #[structopt(
        long = "id",
        help = "Content identifier of the layer [default: its canonical path]",
        global = true
    )]
    diff_id: Option<String>,

    #[structopt(subcommand)]
    cmd: Commands,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(opts: CliOpts, cache: &LayerCache) -> anyhow::Result<()> {
    let diff_id = opts.diff_id.as_deref();

    match opts.cmd {
        Commands::List { layer, path, json } => {
            commands::list(&layer, &path, json, diff_id, cache)?
        }
        Commands::Cat { layer, path } => commands::cat(&layer, &path, diff_id, cache)?,
    }

    Ok(())
}

/// Logs every leftover path and returns whether the cache was fully removed.
fn log_cleanup(report: &CleanupReport) -> bool {
    for failure in &report.failures {
        tracing::warn!(
            path = %failure.path.display(),
            error = %failure.source,
            "cached layer could not be removed"
        );
    }
    tracing::debug!(removed = report.removed, "cache cleaned up");
    report.is_clean()
}

fn main() {
    let opts = CliOpts::from_iter(wild::args_os());
    init_tracing(opts.verbose);

    let cache = LayerCache::with_options(CacheOptions {
        root: opts.cache_dir.clone(),
        ..CacheOptions::default()
    });

    let result = run(opts, &cache);

    log_cleanup(&cache.cleanup());

    if let Err(e) = result {
        eprintln!("{:?}", e);
        std::process::exit(1);
    }
}
