//! Tapedeck CLI

use std::path::Path;
use std::process;

use anyhow::{bail, Context, Result};
use tapedeck::config::Config;
use tapedeck::store::RecordQuery;
use tapedeck::Engine;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    init_logging();

    let command = &args[1];
    let result = match command.as_str() {
        "stats" | "list" | "prune" if args.len() < 3 => {
            eprintln!("Usage: tapedeck {command} <config.toml>");
            process::exit(1);
        }
        "stats" => show_stats(Path::new(&args[2])),
        "list" => list_endpoints(Path::new(&args[2]), args.get(3).map(String::as_str)),
        "prune" => prune(Path::new(&args[2])),
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'tapedeck' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    eprintln!("Tapedeck v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: tapedeck <command> <config.toml> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  stats     Show what is recorded and how large it is");
    eprintln!("  list      List recorded endpoints, optionally filtered by URL");
    eprintln!("  prune     Save now, evicting old endpoints if over budget");
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tapedeck=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open(path: &Path) -> Result<Engine> {
    if !path.exists() {
        bail!("Config file not found: {}", path.display());
    }
    let config = Config::from_file(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    Engine::from_config(&config).context("Failed to open recordings")
}

fn show_stats(path: &Path) -> Result<()> {
    let engine = open(path)?;
    let store = engine.store_snapshot();
    let rules = engine.rules();

    println!("Site:       {}", engine.site());
    println!("Serving:    {}", on_off(rules.serve));
    println!("Capturing:  {}", on_off(rules.capture));
    println!("Body match: {}", on_off(!rules.ignore_params));
    println!();
    println!("Sites:      {}", store.origin_count());
    println!("Endpoints:  {}", store.endpoint_count());
    println!("Variants:   {}", store.variant_count());
    println!("Size:       {} bytes", engine.document_len()?);

    Ok(())
}

fn list_endpoints(path: &Path, url_filter: Option<&str>) -> Result<()> {
    let engine = open(path)?;
    let store = engine.query(&RecordQuery {
        url_contains: url_filter.map(str::to_string),
        ..RecordQuery::default()
    });

    for (origin, endpoints) in store.origins() {
        println!("{origin}");
        for endpoint in endpoints {
            let statuses: Vec<String> = endpoint
                .params
                .iter()
                .map(|variant| variant.status.to_string())
                .collect();
            println!(
                "  {:<7} {}  [{}] last call {}",
                endpoint.method.to_string(),
                endpoint.url,
                statuses.join(", "),
                endpoint.last_call_time
            );
        }
    }

    Ok(())
}

fn prune(path: &Path) -> Result<()> {
    let engine = open(path)?;
    let report = engine.save()?;

    if report.pruned() {
        println!("Evicted {} endpoints:", report.evicted.len());
        for evicted in &report.evicted {
            println!(
                "  {} {} {} (last call {})",
                evicted.origin, evicted.method, evicted.url, evicted.last_call_time
            );
        }
    } else {
        println!("Within budget, nothing evicted");
    }
    println!("Saved {} bytes", report.bytes);

    Ok(())
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}
