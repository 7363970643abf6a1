//! Argument parsing and command dispatch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use stitch_engine::{split_book, write_split};
use stitch_logging::stitch_info;

use crate::config::{load_config, AppConfig};
use crate::platform::events::ConsoleEventSink;
use crate::platform::logging::{self, LogDestination};
use crate::{prefs, replay};

#[derive(Parser, Debug)]
#[command(name = "pagestitch")]
#[command(about = "Stitch the pages of a paginated web reader into one HTML book")]
pub struct Args {
    /// Config file. Default: ./pagestitch.ron, then $PAGESTITCH_CONFIG.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log destination; overrides the config file.
    #[arg(long, global = true, value_enum)]
    pub log: Option<LogDestination>,

    /// Debug-level logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only report stalls, saves and failures.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: CommandArgs,
}

#[derive(Subcommand, Debug)]
pub enum CommandArgs {
    /// Scrape a recorded reader session (RON script) into a book.
    Replay {
        script: PathBuf,
        /// Output directory. Default: `output_dir` from the config.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Split a saved book into one page per section plus a manifest.
    Split {
        book: PathBuf,
        /// Output directory. Default: `<book stem>_pages` next to the book.
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Section selector. Default: the stylesheet's section class.
        #[arg(long)]
        selector: Option<String>,
    },
    /// Show or change the durable preferences.
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum PrefsAction {
    Show,
    /// Delay in milliseconds before each page turn.
    SetDelay { ms: String },
    /// Flip a boolean preference, e.g. `inline-images`.
    Toggle { flag: String },
}

pub async fn run(args: Args) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    let destination = args.log.unwrap_or(config.log);
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    logging::initialize(destination, level);

    match args.command {
        CommandArgs::Replay { script, out } => {
            if let Some(out) = out {
                config.output_dir = out;
            }
            let script = replay::load_script(&script)?;
            let events = Arc::new(ConsoleEventSink::new(args.quiet));
            let view = replay::run_replay(&config, script, events).await?;
            println!(
                "{} pages stored, {} lost ({:?})",
                view.pages_stored, view.pages_lost, view.phase
            );
        }
        CommandArgs::Split { book, out, selector } => {
            run_split(&config, &book, out, selector)?;
        }
        CommandArgs::Prefs { action } => match action {
            PrefsAction::Show => {
                let controller = prefs::open_controller(&config)?;
                println!("{}", prefs::describe(controller.preferences()));
            }
            PrefsAction::SetDelay { ms } => {
                let delay = prefs::set_delay(&config, &ms)?;
                println!("turn delay: {delay} ms");
            }
            PrefsAction::Toggle { flag } => {
                let (flag, value) = prefs::toggle(&config, &flag)?;
                println!("{}: {}", flag.key(), if value { "on" } else { "off" });
            }
        },
    }
    Ok(())
}

fn run_split(
    config: &AppConfig,
    book: &Path,
    out: Option<PathBuf>,
    selector: Option<String>,
) -> Result<()> {
    let html = std::fs::read_to_string(book)
        .with_context(|| format!("cannot read book {}", book.display()))?;
    let selector =
        selector.unwrap_or_else(|| format!(".{}", config.site.stylesheet.section_class()));
    let out = out.unwrap_or_else(|| default_split_dir(book));

    let (manifest, pages) = split_book(&html, &selector)?;
    let manifest_path = write_split(&out, &manifest, &pages)?;
    stitch_info!("split {} into {} pages", book.display(), pages.len());
    println!("{} pages, manifest at {}", pages.len(), manifest_path.display());
    Ok(())
}

fn default_split_dir(book: &Path) -> PathBuf {
    let stem = book
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "book".to_string());
    book.with_file_name(format!("{stem}_pages"))
}
