mod cli;

use mkvmux::{config, mux, script};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mkvmux=trace,mkvmux_core=trace".to_string()
        } else {
            "mkvmux=debug,mkvmux_core=debug".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Mux {
            script,
            output,
            json,
        } => mux_file(&script, &output, cli.config.as_deref(), json),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("mkvmux {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn mux_file(
    script_path: &Path,
    output: &Path,
    config_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    if !script_path.exists() {
        anyhow::bail!("Packet script does not exist: {:?}", script_path);
    }
    let script = script::load_script(script_path)?;

    let report = mux::mux_script(&script, output, &config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Packets: {}", report.packets);
    println!("Clusters: {}", report.clusters);
    println!(
        "DocType version: {} (read version {})",
        report.doc_type_version, report.doc_type_read_version
    );
    println!("Files: {}", report.files.len());
    for file in &report.files {
        println!("  {}", file.display());
    }
    if !report.chapters.is_empty() {
        println!("Chapters: {}", report.chapters.len());
        for chapter in &report.chapters {
            println!("  {} {}", chapter.name, chapter.timestamp);
        }
    }
    for (number, stats) in &report.tracks {
        println!(
            "Track {}: {} frames, {} bytes",
            number, stats.frames, stats.bytes
        );
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    let mux = &config.mux;
    println!("  DocType: {}", mux.doc_type);
    println!("  Timestamp scale: {} ns", mux.timestamp_scale);
    println!("  Block mode: {:?}", mux.block_mode);
    println!(
        "  Cluster limits: {} ns, {} blocks, {} bytes",
        mux.cluster.max_duration, mux.cluster.max_blocks, mux.cluster.max_content_size
    );
    println!("  Cues enabled: {}", mux.cues.enabled);
    println!("  Split points: {}", mux.splitting.points.len());
    if let Some(limit) = mux.version_limit {
        println!("  Version limit: {}", limit);
    }

    Ok(())
}
