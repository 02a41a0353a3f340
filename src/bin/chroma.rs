// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use chroma::{
    config::Config,
    extension::{crx::CrxUnpacker, ExtensionFetcher},
    fetch::HttpFetcher,
    patch::PatchSet,
    path::{default_config_path, Workspace},
};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::{env::current_dir, path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const BUILD_DATE: &str = match option_env!("CHROMA_BUILD_DATE") {
    Some(date) => date,
    None => "unknown",
};

const GIT_COMMIT: &str = match option_env!("CHROMA_GIT_COMMIT") {
    Some(commit) => commit,
    None => "unknown",
};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "chroma [options] <chroma-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Show debug logging and full error chains.
    #[arg(long, global = true, conflicts_with = "quiet")]
    pub debug: bool,

    /// Log what would be done without touching anything.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Only log errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to chromium PKGBUILD.
    #[arg(long, global = true, value_name = "path")]
    pub pkgbuild: Option<PathBuf>,

    /// Path to configuration file.
    #[arg(long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let flags = Flags {
            dry_run: self.dry_run,
            quiet: self.quiet,
            pkgbuild: self.pkgbuild,
            config: self.config,
        };

        match self.command {
            Command::Download(opts) => run_download(&flags, opts),
            Command::Sort(opts) => run_sort(&flags, opts),
            Command::Version => run_version(),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Download patches or extensions.
    #[command(override_usage = "chroma download [options] <target>")]
    Download(DownloadOptions),

    /// Re-apply patch classification without downloading anything.
    #[command(override_usage = "chroma sort [options] <distro>...")]
    Sort(SortOptions),

    /// Show version and build information.
    #[command(visible_aliases = ["v", "ver"])]
    Version,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about, subcommand_help_heading = "Targets")]
struct DownloadOptions {
    /// Remove everything in the destination directory first.
    #[arg(long, global = true)]
    pub clean: bool,

    #[command(subcommand)]
    pub target: DownloadTarget,
}

#[derive(Debug, Clone, Subcommand)]
enum DownloadTarget {
    /// Download extensions and generate their preference files.
    #[command(
        visible_aliases = ["ex", "ext"],
        override_usage = "chroma download extensions [options] [<name>]..."
    )]
    Extensions(ExtensionsOptions),

    /// Download patch sets and sort them by classification.
    #[command(
        visible_aliases = ["pa", "patch"],
        override_usage = "chroma download patches [options] <distro>..."
    )]
    Patches(PatchesOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ExtensionsOptions {
    /// Names of extensions to download, all of them if none given.
    #[arg(value_name = "name")]
    pub names: Vec<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PatchesOptions {
    /// Names of distributions to download patch sets of.
    #[arg(required = true, value_name = "distro")]
    pub distros: Vec<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SortOptions {
    /// Names of distributions to sort patch sets of.
    #[arg(required = true, value_name = "distro")]
    pub distros: Vec<String>,
}

#[derive(Debug, Clone)]
struct Flags {
    dry_run: bool,
    quiet: bool,
    pkgbuild: Option<PathBuf>,
    config: Option<PathBuf>,
}

/// Invalid command-line argument caught after parsing.
#[derive(Debug, thiserror::Error)]
#[error("Argument details: {message}")]
struct ArgsError {
    command: &'static [&'static str],
    message: String,
}

impl ArgsError {
    fn new(command: &'static [&'static str], message: impl Into<String>) -> Self {
        Self {
            command,
            message: message.into(),
        }
    }

    fn print_help(&self) {
        let mut command = Cli::command();
        command.build();
        let mut help = command;
        for name in self.command {
            match help.find_subcommand(name) {
                Some(sub) => help = sub.clone(),
                None => break,
            }
        }

        let _ = help.print_help();
        eprintln!("\n{self}");
    }
}

fn main() {
    let cli = Cli::parse();
    let debug = cli.debug;

    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = if cli.quiet {
        EnvFilter::new("error")
    } else if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = cli.run() {
        if let Some(args) = error.downcast_ref::<ArgsError>() {
            args.print_help();
            exit(2);
        }

        if debug {
            error!("{error:?}");
        } else {
            error!("{error}");
        }
        exit(1);
    }

    exit(0)
}

/// Ready workspace and configuration for commands operating on a package.
fn configure(flags: &Flags) -> Result<(Workspace, Config)> {
    let workspace = Workspace::prepare(current_dir()?, flags.pkgbuild.clone())?;
    let config = Config::discover(
        flags.config.as_deref(),
        workspace.root(),
        default_config_path().ok(),
    )?;

    if !flags.quiet {
        println!("Chromium Ver:  {}", workspace.chromium_version());
        println!("PKGBUILD Path: {}", workspace.pkgbuild().display());
    }

    Ok((workspace, config))
}

fn check_distros(
    config: &Config,
    distros: &[String],
    command: &'static [&'static str],
) -> Result<()> {
    for distro in distros {
        if config.distro(distro).is_err() {
            let known = config.distros.keys().cloned().collect::<Vec<_>>().join(", ");
            return Err(ArgsError::new(
                command,
                format!("unknown distro {distro:?}, expected one of: {known}"),
            )
            .into());
        }
    }

    Ok(())
}

fn run_download(flags: &Flags, opts: DownloadOptions) -> Result<()> {
    match opts.target {
        DownloadTarget::Extensions(target) => run_download_extensions(flags, opts.clean, target),
        DownloadTarget::Patches(target) => run_download_patches(flags, opts.clean, target),
    }
}

fn run_download_extensions(flags: &Flags, clean: bool, opts: ExtensionsOptions) -> Result<()> {
    let (workspace, config) = configure(flags)?;
    let selected = config.select_extensions(&opts.names).map_err(|err| {
        let known = config.extensions.keys().cloned().collect::<Vec<_>>().join(", ");
        ArgsError::new(
            &["download", "extensions"],
            format!("{err}, expected any of: {known}"),
        )
    })?;

    let fetcher = HttpFetcher::new(!flags.quiet)?;
    let extensions = ExtensionFetcher::new(
        workspace.extensions_dir(),
        &config.install_dir,
        workspace.chromium_version(),
        &fetcher,
        CrxUnpacker::new(),
    );

    if flags.dry_run {
        if clean {
            info!("would remove all files in {:?}", workspace.extensions_dir().display());
        }

        for (name, id) in selected {
            let plan = extensions.preview(name, id, clean);
            info!(
                "would fetch extension {name}:{id} (download: {}, preferences: {})",
                plan.download, plan.preferences
            );
        }

        return Ok(());
    }

    extensions.prepare(clean)?;
    for (name, id) in selected {
        extensions
            .fetch(name, id)
            .with_context(|| format!("failed to fetch extension {name}"))?;
    }

    Ok(())
}

fn run_download_patches(flags: &Flags, clean: bool, opts: PatchesOptions) -> Result<()> {
    let (workspace, config) = configure(flags)?;
    check_distros(&config, &opts.distros, &["download", "patches"])?;

    let fetcher = HttpFetcher::new(!flags.quiet)?;
    for distro in &opts.distros {
        let patch_set = PatchSet::new(workspace.patches_dir(), &config, distro)?;
        info!("syncing patch set {distro} => {}", patch_set.active_dir().display());

        let relocations = if flags.dry_run && clean {
            patch_set.preview_clean(&fetcher)
        } else {
            if !flags.dry_run {
                patch_set.prepare(clean)?;
            }
            patch_set
                .manifest(&fetcher, flags.dry_run)
                .and_then(|manifest| patch_set.sync(&manifest, &fetcher, flags.dry_run))
        }
        .with_context(|| format!("failed to sync patch set {distro}"))?;

        let moved = relocations.iter().filter(|r| r.action.is_move()).count();
        info!(
            "patch set {distro}: {} patches, {moved} moved",
            relocations.len()
        );
    }

    Ok(())
}

fn run_sort(flags: &Flags, opts: SortOptions) -> Result<()> {
    let (workspace, config) = configure(flags)?;
    check_distros(&config, &opts.distros, &["sort"])?;

    for distro in &opts.distros {
        let patch_set = PatchSet::new(workspace.patches_dir(), &config, distro)?;
        let moves = patch_set
            .sort(flags.dry_run)
            .with_context(|| format!("failed to sort patch set {distro}"))?;
        if moves.is_empty() {
            info!("patch set {distro} already sorted");
        }
    }

    Ok(())
}

fn run_version() -> Result<()> {
    println!("Chroma");
    println!("-------------------------------------------------------------");
    println!("Version:    {}", env!("CARGO_PKG_VERSION"));
    println!("Build Date: {BUILD_DATE}");
    println!("Git Commit: {GIT_COMMIT}");

    Ok(())
}
