use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use reframe::transform::FrameTransform as _;
use reframe::transform::ops::Op;

#[derive(Parser, Debug)]
#[command(name = "reframe", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the metadata of a media file as JSON.
    Probe(ProbeArgs),
    /// Transform one or more media files.
    Process(ProcessArgs),
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Input media file.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Engine config JSON.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ProcessArgs {
    /// Input media files.
    #[arg(long = "in", required = true, num_args = 1..)]
    in_paths: Vec<PathBuf>,

    /// Directory that receives the outputs.
    #[arg(long)]
    out_dir: PathBuf,

    /// Operation: identity, flip-h, flip-v, speed=X, reverse, gif or fit=WxH.
    #[arg(long, default_value = "identity")]
    op: Op,

    /// Output size budget in bytes.
    #[arg(long)]
    max_bytes: Option<u64>,

    /// Keep at most this much of each input ("2.5", "1500ms").
    #[arg(long)]
    max_duration: Option<String>,

    /// Engine config JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override worker threads.
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(serde::Serialize)]
struct JobReport {
    input: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<reframe::ProcessedOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.cmd {
        Command::Probe(args) => cmd_probe(args),
        Command::Process(args) => cmd_process(args),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn load_config(path: Option<&Path>) -> anyhow::Result<reframe::EngineConfig> {
    match path {
        Some(p) => reframe::EngineConfig::from_path(p)
            .with_context(|| format!("load config '{}'", p.display())),
        None => Ok(reframe::EngineConfig::default()),
    }
}

fn cmd_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let mut reader = reframe::MediaReader::open_path(&args.in_path, &config.limits)
        .with_context(|| format!("open '{}'", args.in_path.display()))?;
    let json = serde_json::to_string_pretty(reader.metadata())?;
    reader.close();
    println!("{json}");
    Ok(())
}

fn cmd_process(args: ProcessArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if args.threads.is_some() {
        config.threads = args.threads;
    }
    config.validate()?;

    let max_duration = args
        .max_duration
        .as_deref()
        .map(reframe::parse_duration_micros)
        .transpose()?;
    let budget = args.max_bytes.or(config.default_max_output_bytes);

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("create output dir '{}'", args.out_dir.display()))?;

    let engine = Arc::new(reframe::TransformEngine::from_config(&config)?);
    let registry = Arc::new(reframe::ResultRegistry::new());
    let pool = reframe::JobPool::new(config.threads)?;
    let limits = config.limits;
    let cancel = reframe::CancelToken::new();

    let names = output_names(&args.in_paths);
    let jobs: Vec<_> = args
        .in_paths
        .iter()
        .zip(names)
        .map(|(input, name)| {
            let key = reframe::fingerprint(
                &reframe::MediaSource::Path(input.clone()),
                &args.op.key(),
                budget,
            );
            let mut options = reframe::ProcessOptions::new(&args.out_dir, name)
                .with_cancel(cancel.clone());
            if let Some(b) = args.max_bytes {
                options = options.with_max_output_bytes(b);
            }
            if let Some(d) = max_duration {
                options = options.with_max_duration_micros(d);
            }

            let op = args.op.clone();
            let engine = Arc::clone(&engine);
            let registry = Arc::clone(&registry);
            let path = input.clone();
            let handle = pool.submit(move || {
                registry.get_or_compute(key, || {
                    let reader = reframe::MediaReader::open_path(&path, &limits)?;
                    engine.process(reader, &op, &options)
                })
            });
            (input.clone(), handle)
        })
        .collect();

    let mut failed = 0usize;
    for (input, handle) in jobs {
        let report = match handle.join() {
            Ok(out) => JobReport {
                input,
                output: Some(out),
                error: None,
            },
            Err(e) => {
                failed += 1;
                tracing::warn!(input = %input.display(), error = %e, "job failed");
                JobReport {
                    input,
                    output: e.best_effort_output().cloned(),
                    error: Some(e.to_string()),
                }
            }
        };
        println!("{}", serde_json::to_string(&report)?);
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} jobs failed", args.in_paths.len());
    }
    Ok(())
}

/// One output name per input: the file stem, suffixed when two inputs share it.
fn output_names(inputs: &[PathBuf]) -> Vec<String> {
    let mut seen = HashSet::new();
    inputs
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let stem = p
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "output".to_string());
            let name = if seen.contains(&stem) {
                format!("{stem}-{i}")
            } else {
                stem
            };
            seen.insert(name.clone());
            name
        })
        .collect()
}
