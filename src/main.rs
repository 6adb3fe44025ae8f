mod cli;

use audiobinder::{
    chapters,
    config::{self, Config},
    pipeline::{BindOptions, Binder},
    BindError, CancellationCoordinator, ProgressBoard, INTERRUPT_EXIT_CODE,
};
use audiobinder_av::{check_tools, ProcessRegistry, TempSpace, ToolPaths};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

struct BindArgs {
    mode: chapters::ChapterMode,
    input: PathBuf,
    output: Option<PathBuf>,
    bitrate: Option<config::Bitrate>,
    segment_secs: Option<f64>,
    workers: Option<usize>,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "audiobinder=trace,audiobinder_av=debug".to_string()
        } else {
            "audiobinder=info,audiobinder_av=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Bind {
            chapters,
            input,
            output,
            bitrate,
            segment_secs,
            workers,
        } => {
            let args = BindArgs {
                mode: chapters,
                input,
                output,
                bitrate,
                segment_secs,
                workers,
            };
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(bind(args, cli.config.as_deref()))
        }
        Commands::Chapters { cue, duration } => print_cue_chapters(&cue, duration),
        Commands::CheckTools => run_check_tools(),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
    }
}

/// Merge command-line overrides into the loaded configuration.
fn apply_overrides(config: &mut Config, args: &BindArgs) -> Result<()> {
    if let Some(bitrate) = args.bitrate {
        config.pipeline.bitrate = bitrate;
    }
    if let Some(secs) = args.segment_secs {
        config.pipeline.segment_length_secs = secs;
    }
    if let Some(workers) = args.workers {
        config.pipeline.workers = Some(workers);
    }
    config::validate_config(config)?;
    Ok(())
}

async fn bind(args: BindArgs, config_path: Option<&Path>) -> Result<ExitCode> {
    let mut config = config::load_config_or_default(config_path)?;
    apply_overrides(&mut config, &args)?;

    let output = args.output.clone().unwrap_or_else(|| args.input.clone());
    let options = BindOptions::from_config(&config, &args.input, output, args.mode)?;
    options.validate()?;

    let tools = ToolPaths::resolve(
        config.tools.ffmpeg.as_deref(),
        config.tools.ffprobe.as_deref(),
    )
    .context("ffmpeg and ffprobe are required; run `audiobinder check-tools`")?;

    let registry = ProcessRegistry::new();
    let progress = Arc::new(ProgressBoard::new());
    let temp = Arc::new(
        TempSpace::create_in(options.temp_base())
            .with_context(|| format!("Failed to create temp space in {:?}", options.temp_base()))?,
    );
    let policy = config.cleanup.policy();

    let coordinator = Arc::new(CancellationCoordinator::new(
        registry.clone(),
        progress.clone(),
        temp.clone(),
        policy,
    ));
    let listener = coordinator.listen_for_interrupts();

    tracing::info!(
        "Binding {:?} ({} chapters, {} worker(s), {:?} segments)",
        options.input_dir,
        options.chapter_mode,
        options.workers,
        options.segment_length
    );

    let binder = Binder::new(options, tools, registry.clone(), progress.clone());
    let outcome = tokio::select! {
        result = binder.run(&temp) => Some(result),
        _ = coordinator.cancelled() => None,
    };

    let result = match outcome {
        Some(Err(e)) if e.is_cancelled() => {
            coordinator.request_cancel();
            None
        }
        other => other,
    };

    let Some(result) = result else {
        coordinator.teardown().await;
        listener.abort();
        eprintln!("Interrupted");
        return Ok(ExitCode::from(INTERRUPT_EXIT_CODE));
    };

    listener.abort();
    progress.close();
    // Jobs end before `run` returns; this only waits out stragglers.
    registry.wait_until_empty(Duration::from_secs(5)).await;
    temp.cleanup(policy).await;

    let outcome = result?;
    println!(
        "✓ {} ({} track(s), {} chapter(s))",
        outcome.output.display(),
        outcome.tracks,
        outcome.chapters.len()
    );
    Ok(ExitCode::SUCCESS)
}

fn print_cue_chapters(cue: &Path, duration: f64) -> Result<ExitCode> {
    let total = Duration::try_from_secs_f64(duration)
        .map_err(|_| BindError::configuration(format!("Invalid duration: {}", duration)))?;
    let text = chapters::read_cue_sheet(cue)
        .with_context(|| format!("Failed to read CUE sheet: {:?}", cue))?;
    let table = chapters::chapters_from_cue(&text, total);
    print!("{}", chapters::render_ffmetadata(&table));
    Ok(ExitCode::SUCCESS)
}

fn run_check_tools() -> Result<ExitCode> {
    println!("Checking external tools...\n");

    let tools = check_tools();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("Some tools are missing. Install ffmpeg (which provides ffprobe) to bind books.");
        Ok(ExitCode::FAILURE)
    }
}

fn validate_config(path: Option<&Path>) -> Result<ExitCode> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Segment length: {}s", config.pipeline.segment_length_secs);
    println!("  Workers: {}", config.pipeline.resolved_workers());
    println!("  Bitrate: {}", config.pipeline.bitrate);
    println!(
        "  Cleanup: {} attempt(s), {}ms backoff",
        config.cleanup.max_attempts, config.cleanup.backoff_ms
    );
    if let Some(root) = &config.temp_root {
        println!("  Temp root: {}", root.display());
    }

    Ok(ExitCode::SUCCESS)
}
