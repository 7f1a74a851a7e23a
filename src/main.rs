use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use stepgate::{
    EventLog, EventSink, JsonFileStore, LedgerStore, MediaFactory, Selection, Sequence, SequenceController,
    SourceKind, ViewerConfig, ViewerEvent, ViewerState,
};

#[derive(Parser)]
#[command(name = "stepgate", version, about = "Inspect and drive sequential unlock progress")]
struct Cli {
    /// JSON viewer config (defaults apply to missing fields)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding ledger snapshots
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the step list with lock and completion state
    Status {
        sequence: PathBuf,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Check whether a step may be opened
    Select { sequence: PathBuf, index: usize },
    /// Mark a step completed (explicit override) and save the ledger
    Complete { sequence: PathBuf, index: usize },
    /// Forget saved progress for a sequence
    Reset { sequence: PathBuf },
    /// Show which playback strategy handles each source
    Classify { sources: Vec<String> },
    /// Check that direct streams are reachable
    #[cfg(feature = "http")]
    Probe { sources: Vec<String> },
}

fn load_sequence(path: &Path) -> anyhow::Result<Sequence> {
    let data = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Sequence::from_json(&data).with_context(|| format!("loading sequence from {}", path.display()))
}

fn open_store(cli: &Cli) -> anyhow::Result<Option<JsonFileStore>> {
    match &cli.store {
        Some(dir) => Ok(Some(JsonFileStore::open(dir)?)),
        None => Ok(None),
    }
}

fn open_controller(
    config: &ViewerConfig,
    path: &Path,
    store: Option<&JsonFileStore>,
) -> anyhow::Result<(SequenceController, EventLog)> {
    let sequence = load_sequence(path)?;
    let sink = EventSink::new();
    let log = EventLog::attach(&sink);
    let media = MediaFactory::from_config(config);
    let saved = match store {
        Some(s) => s.load(sequence.id())?,
        None => None,
    };
    let controller = match saved {
        Some(snap) => SequenceController::resume(sequence, &snap, media, sink).context("restoring saved progress")?,
        None => SequenceController::new(sequence, media, sink),
    };
    Ok((controller, log))
}

fn print_events(log: &EventLog) {
    for ev in log.take() {
        match ev {
            ViewerEvent::StepCompleted { step_id } => println!("completed: {}", step_id),
            ViewerEvent::AccessDenied { step_id } => println!("locked: {}", step_id),
            ViewerEvent::PlaybackUnavailable { step_id, reason } => {
                println!("unavailable: {} ({})", step_id, reason)
            }
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => ViewerConfig::from_json_file(path)?,
        None => ViewerConfig::default(),
    };
    let store = open_store(&cli)?;

    match &cli.command {
        Command::Status { sequence, json } => {
            let (controller, _) = open_controller(&config, sequence, store.as_ref())?;
            let state = ViewerState::capture(&controller);
            if *json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                print!("{}", state.render_text());
            }
        }
        Command::Select { sequence, index } => {
            let (mut controller, log) = open_controller(&config, sequence, store.as_ref())?;
            match controller.select_step(*index)? {
                Selection::Mounted { .. } => {
                    let kind = controller.active_kind().map(|k| k.label()).unwrap_or("none");
                    println!("step {} opens ({})", index, kind);
                }
                Selection::Denied | Selection::Unavailable => print_events(&log),
            }
            controller.close();
        }
        Command::Complete { sequence, index } => {
            let Some(store) = store.as_ref() else {
                bail!("--store is required to save progress");
            };
            let (mut controller, log) = open_controller(&config, sequence, Some(store))?;
            if controller.mark_completed(*index)? {
                store.save(&controller.snapshot())?;
            } else if controller.is_completed(*index) {
                println!("step {} was already completed", index);
            }
            print_events(&log);
            let p = controller.progress();
            println!("{}/{} completed", p.completed, p.total);
        }
        Command::Reset { sequence } => {
            let Some(store) = store.as_ref() else {
                bail!("--store is required to reset progress");
            };
            let seq = load_sequence(sequence)?;
            store.clear(seq.id())?;
            println!("progress for '{}' cleared", seq.id());
        }
        Command::Classify { sources } => {
            let factory = MediaFactory::from_config(&config);
            for src in sources {
                match factory.classify(src) {
                    SourceKind::EmbeddedProvider { video_id } => println!("{}\tembedded\t{}", src, video_id),
                    SourceKind::DirectStream { url } => println!("{}\tdirect\t{}", src, url),
                    SourceKind::Unsupported { reason } => println!("{}\tunsupported\t{}", src, reason),
                }
            }
        }
        #[cfg(feature = "http")]
        Command::Probe { sources } => {
            use stepgate::media::{HttpProbe, SourceProbe};
            let probe = HttpProbe::new(&config)?;
            let factory = MediaFactory::from_config(&config);
            let mut failed = 0;
            for src in sources {
                match factory.classify(src) {
                    SourceKind::DirectStream { url } => match probe.probe(&url) {
                        Ok(()) => println!("{}\tok", src),
                        Err(e) => {
                            failed += 1;
                            println!("{}\tfailed\t{}", src, e);
                        }
                    },
                    other => println!("{}\tskipped\t{}", src, other.label()),
                }
            }
            if failed > 0 {
                bail!("{} source(s) unreachable", failed);
            }
        }
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("stepgate: {:#}", e);
        std::process::exit(1);
    }
}
