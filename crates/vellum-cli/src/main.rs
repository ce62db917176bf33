use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, WrapErr};
use tracing::Level;
use vellum_common::VellumError;
use vellum_common::perf::{self, Samples};
use vellum_common::telemetry::{self, TelemetryConfig};
use vellum_editor::{EditorConfig, EditorSession, RenderPlan};
use vellum_editor_core::{DocumentStats, EditorCommand, segment};
use vellum_editor_crdt::DocumentStore;

#[derive(Parser)]
#[command(version, about = "Vellum - virtualized collaborative rich-text editor core", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the KDL editor config
    #[arg(long, global = true, env = "VELLUM_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare windowed and full rendering on a synthetic document
    Bench {
        /// Number of blocks in the generated document
        #[arg(long, default_value_t = 10_000)]
        blocks: usize,

        /// Scroll positions sampled per mode
        #[arg(long, default_value_t = 50)]
        iterations: usize,
    },
    /// Split an HTML file into blocks
    Segment {
        file: PathBuf,

        /// Print blocks as JSON
        #[arg(long)]
        json: bool,
    },
    /// Character, word and block counts for an HTML file
    Stats { file: PathBuf },
    /// Export or import document snapshots
    #[command(subcommand)]
    Snapshot(SnapshotCommand),
    /// Print the effective editor config as KDL
    Config,
    /// List toolbar commands
    Commands,
}

#[derive(Subcommand)]
enum SnapshotCommand {
    /// Store an HTML file's content as a snapshot
    Export { file: PathBuf, out: PathBuf },
    /// Restore a snapshot and print (or write) its content
    Import {
        snapshot: PathBuf,

        /// Write the content here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    init_miette();

    let cli = Cli::parse();

    let mut telemetry_config = TelemetryConfig::from_env("vellum-cli");
    if cli.verbose {
        telemetry_config = telemetry_config.with_level(Level::DEBUG);
    }
    telemetry::init(telemetry_config);

    let config = match &cli.config {
        Some(path) => EditorConfig::load(path)?,
        None => EditorConfig::default(),
    };

    match cli.command {
        Commands::Bench { blocks, iterations } => bench(config, blocks, iterations)?,
        Commands::Segment { file, json } => segment_file(&file, json)?,
        Commands::Stats { file } => {
            let content = read_html(&file)?;
            let stats = DocumentStats::from_blocks(&segment(&content));
            println!(
                "{} chars, {} words, {} blocks",
                stats.chars, stats.words, stats.blocks
            );
        }
        Commands::Snapshot(SnapshotCommand::Export { file, out }) => {
            let content = read_html(&file)?;
            let mut store = DocumentStore::new();
            store.set_content(&content);
            let bytes = store.export_snapshot()?;
            std::fs::write(&out, &bytes).into_diagnostic()?;
            println!("✓ Wrote {} bytes to {}", bytes.len(), out.display());
        }
        Commands::Snapshot(SnapshotCommand::Import { snapshot, out }) => {
            let bytes = std::fs::read(&snapshot).into_diagnostic()?;
            let store = restore_snapshot(&bytes)?;
            match out {
                Some(out) => {
                    std::fs::write(&out, store.content()).into_diagnostic()?;
                    println!("✓ Restored {} chars to {}", store.len_chars(), out.display());
                }
                None => println!("{}", store.content()),
            }
        }
        Commands::Config => print!("{}", config.to_kdl()),
        Commands::Commands => {
            for command in EditorCommand::ALL {
                let note = if command.requires_value() {
                    " <value>"
                } else {
                    ""
                };
                println!("{command}{note}");
            }
        }
    }

    Ok(())
}

fn read_html(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("couldn't read {}", path.display()))
}

fn restore_snapshot(bytes: &[u8]) -> Result<DocumentStore, VellumError> {
    DocumentStore::from_snapshot(bytes).map_err(|err| VellumError::Snapshot(err.to_string()))
}

fn segment_file(path: &Path, json: bool) -> Result<()> {
    let content = read_html(path)?;
    let (blocks, elapsed) = perf::measure("segment file", || segment(&content));

    if json {
        println!("{}", serde_json::to_string_pretty(&blocks).into_diagnostic()?);
        return Ok(());
    }

    for block in &blocks {
        println!(
            "{:>6}  {:<14} {:>7} bytes{}",
            block.id,
            block.kind.to_string(),
            block.html.len(),
            if block.synthesized { "  (synthesized)" } else { "" }
        );
    }
    println!("{} blocks in {:.2} ms", blocks.len(), elapsed);
    Ok(())
}

/// A document cycling through every block kind, with a few tall blocks.
fn synthetic_document(blocks: usize) -> String {
    let mut html = String::new();
    for i in 0..blocks {
        let block = match i % 7 {
            0 => format!("<h2>Section {i}</h2>"),
            1 => format!("<ul><li>item {i}</li><li>item {}</li></ul>", i + 1),
            2 => format!("<pre>fn block_{i}() {{}}</pre>"),
            3 => format!("<blockquote>quoted {i}</blockquote>"),
            4 => format!("<p>{}</p>", "a longer paragraph ".repeat(1 + i % 13)),
            _ => format!("<p>paragraph <b>{i}</b> with <i>inline</i> markup</p>"),
        };
        html.push_str(&block);
    }
    html
}

fn check_bench_args(blocks: usize, iterations: usize) -> Result<(), VellumError> {
    if blocks == 0 {
        return Err(VellumError::InvalidArgument(
            "--blocks must be at least 1".into(),
        ));
    }
    if iterations == 0 {
        return Err(VellumError::InvalidArgument(
            "--iterations must be at least 1".into(),
        ));
    }
    Ok(())
}

fn bench(config: EditorConfig, blocks: usize, iterations: usize) -> Result<()> {
    check_bench_args(blocks, iterations)?;
    let content = synthetic_document(blocks);
    println!(
        "Document: {} blocks, {} bytes, viewport {}px, overscan {}",
        blocks,
        content.len(),
        config.virtualization.viewport_height,
        config.virtualization.overscan
    );

    let mut segmenting = Samples::new();
    for _ in 0..iterations.clamp(1, 10) {
        segmenting.record(|| segment(&content));
    }
    println!(
        "  segment        mean {:>8.2} ms   p95 {:>8.2} ms",
        segmenting.mean(),
        segmenting.percentile(95.0)
    );

    let mut session = {
        let _timing = perf::TimingGuard::new("session setup");
        let mut session = EditorSession::new(config);
        session.set_content(&content);
        session.tick();
        session
    };

    for enabled in [true, false] {
        session.set_virtualization(enabled);
        let total = session.total_size();
        let mut rendering = Samples::new();
        let mut rendered = 0;
        for step in 0..iterations {
            let offset = total * step as f64 / iterations as f64;
            session.scroll_to(offset);
            rendered = rendering.record(|| {
                let items = session.rendered_blocks();
                let markup: usize = items.iter().map(|r| r.block.html.len()).sum();
                std::hint::black_box(markup);
                items.len()
            });
        }
        let mode = match session.render_plan() {
            RenderPlan::Windowed { .. } => "windowed",
            RenderPlan::Full { .. } => "full",
        };
        println!(
            "  {:<14} mean {:>8.2} ms   p95 {:>8.2} ms   {:>6} blocks rendered",
            mode,
            rendering.mean(),
            rendering.percentile(95.0),
            rendered
        );
    }

    let stats = session.stats();
    tracing::info!(
        chars = stats.chars,
        words = stats.words,
        blocks = stats.blocks,
        "bench finished"
    );
    Ok(())
}

fn init_miette() {
    let hook = miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }));
    if hook.is_err() {
        eprintln!("couldn't set the miette hook");
    }
    miette::set_panic_hook();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_document_segments_one_block_each() {
        let content = synthetic_document(70);
        let blocks = segment(&content);
        assert_eq!(blocks.len(), 70);
        assert_eq!(blocks[0].kind.to_string(), "heading-2");
        assert_eq!(blocks[2].kind.to_string(), "code");
    }

    #[test]
    fn test_bad_snapshot_is_a_snapshot_error() {
        let err = restore_snapshot(b"not a snapshot").unwrap_err();
        assert!(matches!(err, VellumError::Snapshot(_)));
        assert!(err.to_string().starts_with("snapshot rejected"));

        let mut store = DocumentStore::new();
        store.set_content("<p>ok</p>");
        let restored = restore_snapshot(&store.export_snapshot().unwrap()).unwrap();
        assert_eq!(restored.content(), "<p>ok</p>");
    }

    #[test]
    fn test_bench_rejects_zero_counts() {
        assert!(matches!(
            check_bench_args(0, 10),
            Err(VellumError::InvalidArgument(msg)) if msg.contains("--blocks")
        ));
        assert!(matches!(
            check_bench_args(10, 0),
            Err(VellumError::InvalidArgument(msg)) if msg.contains("--iterations")
        ));
        assert!(check_bench_args(1, 1).is_ok());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["vellum", "bench", "--blocks", "10"]).unwrap();
        assert!(matches!(cli.command, Commands::Bench { blocks: 10, iterations: 50 }));

        let cli =
            Cli::try_parse_from(["vellum", "snapshot", "import", "doc.vlm", "--out", "x.html"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Snapshot(SnapshotCommand::Import { out: Some(_), .. })
        ));
    }
}
