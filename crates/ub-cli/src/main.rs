//! UserBlocker CLI
//!
//! CLI tool for managing a block list persisted in a JSON-file store:
//! list/add/remove, import/export, match checks, and layout inspection.

use std::fs;
use std::time::Instant;

use clap::{Parser, Subcommand};

use ub_core::PatternSet;
use ub_store::interchange::{export_envelope, parse_import};
use ub_store::{JsonFileBackend, PatternStore, StoreError};

const DEFAULT_STORE: &str = "blocklist.json";

#[derive(Parser)]
#[command(name = "ub-cli")]
#[command(about = "UserBlocker block list manager and tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the block list in stored order
    List {
        /// Store file
        #[arg(short, long, default_value = DEFAULT_STORE)]
        store: String,
    },

    /// Add one pattern to the block list
    Add {
        /// Pattern to block (exact name or wildcard)
        pattern: String,

        #[arg(short, long, default_value = DEFAULT_STORE)]
        store: String,
    },

    /// Remove one pattern from the block list
    Remove {
        /// Pattern to unblock (raw or percent-encoded)
        pattern: String,

        #[arg(short, long, default_value = DEFAULT_STORE)]
        store: String,
    },

    /// Import patterns from a JSON or newline-delimited file
    Import {
        /// File to import
        input: String,

        #[arg(short, long, default_value = DEFAULT_STORE)]
        store: String,
    },

    /// Export the block list as a JSON snapshot
    Export {
        /// Output file
        output: String,

        #[arg(short, long, default_value = DEFAULT_STORE)]
        store: String,
    },

    /// Check whether an identifier would be blocked
    Check {
        /// Identifier to evaluate
        identifier: String,

        #[arg(short, long, default_value = DEFAULT_STORE)]
        store: String,
    },

    /// Dump store metadata and chunk layout
    Info {
        #[arg(short, long, default_value = DEFAULT_STORE)]
        store: String,
    },

    /// Measure match throughput against the stored list
    Bench {
        #[arg(short, long, default_value = DEFAULT_STORE)]
        store: String,

        /// Synthetic identifiers to evaluate
        #[arg(short, long, default_value_t = 100_000)]
        iterations: usize,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::List { store } => cmd_list(&store),
        Commands::Add { pattern, store } => cmd_add(&store, &pattern),
        Commands::Remove { pattern, store } => cmd_remove(&store, &pattern),
        Commands::Import { input, store } => cmd_import(&store, &input),
        Commands::Export { output, store } => cmd_export(&store, &output),
        Commands::Check { identifier, store } => cmd_check(&store, &identifier),
        Commands::Info { store } => cmd_info(&store),
        Commands::Bench { store, iterations } => cmd_bench(&store, iterations),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn open_store(path: &str) -> PatternStore<JsonFileBackend> {
    PatternStore::new(JsonFileBackend::new(path))
}

fn cmd_list(store_path: &str) -> Result<(), String> {
    let mut store = open_store(store_path);
    let patterns = store.get_all().map_err(|e| e.to_string())?;

    if patterns.is_empty() {
        println!("No blocked users yet");
        return Ok(());
    }

    for pattern in &patterns {
        println!("{pattern}");
    }
    println!();
    println!("{} blocked pattern(s)", patterns.len());
    Ok(())
}

fn cmd_add(store_path: &str, pattern: &str) -> Result<(), String> {
    let mut store = open_store(store_path);
    match store.add(pattern) {
        Ok(total) => {
            println!("Blocked \"{}\" ({} total)", pattern.trim(), total);
            Ok(())
        }
        Err(StoreError::Duplicate { pattern, .. }) => {
            Err(format!("\"{pattern}\" is already blocked"))
        }
        Err(e) => Err(e.to_string()),
    }
}

fn cmd_remove(store_path: &str, pattern: &str) -> Result<(), String> {
    let mut store = open_store(store_path);
    match store.remove(pattern) {
        Ok(total) => {
            println!("Unblocked \"{}\" ({} total)", pattern.trim(), total);
            Ok(())
        }
        Err(StoreError::NotFound { pattern, .. }) => {
            Err(format!("\"{pattern}\" is not in the block list"))
        }
        Err(e) => Err(e.to_string()),
    }
}

fn cmd_import(store_path: &str, input: &str) -> Result<(), String> {
    let text = fs::read_to_string(input).map_err(|e| format!("Failed to read '{input}': {e}"))?;
    let entries = parse_import(&text).map_err(|e| e.to_string())?;

    let mut store = open_store(store_path);
    let report = store.import_many(entries).map_err(|e| e.to_string())?;

    println!(
        "Import complete! Added {} new pattern(s) ({} duplicates skipped, {} invalid). Total: {}",
        report.added, report.duplicates, report.invalid, report.total_count
    );
    Ok(())
}

fn cmd_export(store_path: &str, output: &str) -> Result<(), String> {
    let mut store = open_store(store_path);
    let patterns = store.get_all().map_err(|e| e.to_string())?;

    if patterns.is_empty() {
        println!("No blocked users to export");
        return Ok(());
    }

    let envelope = export_envelope(&patterns);
    let text = serde_json::to_string_pretty(&envelope).map_err(|e| e.to_string())?;
    fs::write(output, text).map_err(|e| format!("Failed to write '{output}': {e}"))?;

    println!("Exported {} blocked pattern(s) to '{output}'", patterns.len());
    Ok(())
}

fn cmd_check(store_path: &str, identifier: &str) -> Result<(), String> {
    let mut store = open_store(store_path);
    let patterns = store.get_all().map_err(|e| e.to_string())?;

    let result = PatternSet::new(patterns).first_match(identifier);
    match result.pattern {
        Some(pattern) if result.matched => {
            println!("u/{identifier} is blocked (pattern \"{pattern}\")");
        }
        _ => println!("u/{identifier} is not blocked"),
    }
    Ok(())
}

fn cmd_info(store_path: &str) -> Result<(), String> {
    let mut store = open_store(store_path);

    match store.metadata().map_err(|e| e.to_string())? {
        Some(meta) => {
            println!("Store: {store_path}");
            println!("  Patterns:     {}", meta.total_count);
            println!("  Chunks:       {}", meta.chunk_count);
            println!("  Last updated: {} (epoch ms)", meta.last_updated);
        }
        None => {
            // First contact migrates any legacy record; report what's there.
            let patterns = store.get_all().map_err(|e| e.to_string())?;
            println!("Store: {store_path}");
            println!("  Patterns:     {}", patterns.len());
            println!("  Chunks:       (no metadata record yet)");
        }
    }
    Ok(())
}

fn cmd_bench(store_path: &str, iterations: usize) -> Result<(), String> {
    let mut store = open_store(store_path);
    let patterns = store.get_all().map_err(|e| e.to_string())?;
    if patterns.is_empty() {
        return Err("Store is empty; add patterns before benchmarking".to_string());
    }

    let set = PatternSet::new(patterns);
    let identifiers: Vec<String> = (0..iterations)
        .map(|i| match i % 4 {
            0 => format!("user{i}"),
            1 => format!("TrollAccount{i}"),
            2 => format!("lurker_{i}"),
            _ => format!("u{i}throwaway"),
        })
        .collect();

    // Warmup
    for identifier in identifiers.iter().take(iterations / 10) {
        std::hint::black_box(set.first_match(identifier));
    }

    let start = Instant::now();
    let mut hits = 0usize;
    for identifier in &identifiers {
        if set.first_match(identifier).matched {
            hits += 1;
        }
    }
    let elapsed = start.elapsed();

    let per_op_ns = elapsed.as_nanos() as f64 / iterations as f64;
    println!("Benchmarked {} evaluations against {} pattern(s)", iterations, set.len());
    println!("  Hits:       {hits}");
    println!("  Total:      {:.1}ms", elapsed.as_secs_f64() * 1000.0);
    println!("  Per op:     {per_op_ns:.0}ns");
    println!(
        "  Throughput: {:.0} ops/sec",
        iterations as f64 / elapsed.as_secs_f64()
    );
    Ok(())
}
