//! NaviGrid operator CLI.
//!
//! Pick a destination from the building's landmark registry, then feed sign
//! readings one line per sampling tick:
//!
//! ```bash
//! cargo run -p navigrid -- --registry navigrid-core/data/sample_building.json
//! ```
//!
//! The `seed` subcommand turns floorplan annotations into a registry file.

mod headless;
mod seed;

use navigrid_core::{
    guide_from_config, DestinationMenu, LandmarkId, NavigationSession, SessionConfig,
};
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.first().map(String::as_str) == Some("seed") {
        return seed::run(&args[1..]).await;
    }

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let options = parse_options(&args)?;
    let registry = options.config.load_registry().await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let destination = match options.destination {
        Some(id) => id,
        None => {
            let menu = DestinationMenu::from_registry(&registry);
            match choose_destination(&menu, &mut lines).await? {
                Some(id) => id,
                None => return Ok(()),
            }
        }
    };

    let guide = guide_from_config(&options.config);
    let session =
        NavigationSession::start(&options.config, registry, &destination, guide).await?;
    headless::follow(session, &mut lines).await?;
    Ok(())
}

/// Logs go to stderr; stdout carries the line protocol.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

struct Options {
    config: SessionConfig,
    destination: Option<LandmarkId>,
}

/// Parse navigation flags on top of the environment overrides.
fn parse_options(args: &[String]) -> Result<Options, String> {
    let mut config = SessionConfig::new().with_env_overrides();
    let mut destination = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--registry" => {
                config = config.with_registry(flag_value(args, &mut i)?);
            }
            "--destination" => {
                destination = Some(LandmarkId::new(flag_value(args, &mut i)?));
            }
            "--lexicon" => {
                config = config.with_lexicon_path(flag_value(args, &mut i)?);
            }
            "--history" => {
                config = config.with_history_path(flag_value(args, &mut i)?);
            }
            "--sample-every" => {
                let raw = flag_value(args, &mut i)?;
                let frames = raw
                    .parse()
                    .map_err(|_| format!("--sample-every expects a number, got '{raw}'"))?;
                config = config.with_sample_every(frames);
            }
            "--offline" => {
                config = config.offline(true);
            }
            other => return Err(format!("unknown argument '{other}' (try --help)")),
        }
        i += 1;
    }

    if config.registry_paths.is_empty() {
        return Err("at least one --registry file is required (try --help)".to_string());
    }

    Ok(Options {
        config,
        destination,
    })
}

/// The value following the flag at `args[*i]`; advances `i` past it.
pub(crate) fn flag_value<'a>(args: &'a [String], i: &mut usize) -> Result<&'a str, String> {
    let flag = &args[*i];
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} needs a value"))
}

/// Show the menu and read choices until one is valid. `None` on EOF.
async fn choose_destination<R: AsyncBufRead + Unpin>(
    menu: &DestinationMenu,
    lines: &mut Lines<R>,
) -> std::io::Result<Option<LandmarkId>> {
    if menu.is_empty() {
        println!("[ERROR] No destinations in this building.");
        return Ok(None);
    }

    println!("=== NaviGrid ===");
    println!("Destinations:");
    print!("{menu}");

    loop {
        print!("Select destination (1-{}): ", menu.len());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            return Ok(None);
        };
        match menu.choose(&line) {
            Ok(choice) => {
                println!("Navigating to {} [{}]", choice.label, choice.floor_label);
                return Ok(Some(choice.id.clone()));
            }
            Err(e) => println!("[ERROR] {e}"),
        }
    }
}

const USAGE: &str = "\
NaviGrid - sign-driven indoor navigation

USAGE:
  navigrid --registry <PATH> [OPTIONS]
  navigrid seed --annotations <PATH> --floor <ID> --image-size <WxH> --out <PATH>

OPTIONS:
  -h, --help             Show this help message
  --registry <PATH>      Landmark registry JSON (repeatable, merged in order)
  --destination <ID>     Skip the menu and navigate to this landmark
  --lexicon <PATH>       Sign lexicon file (default: sign_map.json)
  --history <PATH>       Instruction history file (default: guide_history.json)
  --sample-every <N>     Camera front ends only: recognize every N-th frame
                         (default: 5). Each stdin line below is already one
                         sampled tick, so the line protocol ignores it.
  --offline              Never call the model; use fallback instructions

ENVIRONMENT:
  ANTHROPIC_API_KEY      Enables generated instructions
  NAVIGRID_LEXICON, NAVIGRID_HISTORY, NAVIGRID_MODEL, NAVIGRID_OFFLINE
  RUST_LOG               Log filter for stderr (default: warn)

INPUT (one line per tick):
  Room 045@0.92;Exit@0.3     detections as text@confidence, ';'-separated
  #status #route #help #quit

EXAMPLES:
  navigrid --registry navigrid-core/data/sample_building.json
  navigrid --registry lower.json --registry floor1.json --destination 130 --offline
";

fn print_help() {
    print!("{USAGE}");
}
