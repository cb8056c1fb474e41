use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use shorts_compositor::{
    composition::{
        batch::{exit_code_for, EXIT_FATAL},
        Baker, BatchPaths, BatchRunner, Compiler, ShortsPipeline,
    },
    config::{Config, Layout},
    video::{FfmpegDecoder, FfmpegEncoder},
    CompositorError,
};

#[derive(Parser)]
#[command(
    name = "shorts-compositor",
    version,
    about = "Turn landscape clips into vertical shorts",
    long_about = "Shorts-Compositor letterboxes each input clip into a vertical canvas over a \
                  blurred copy of itself, keys a green-screen reaction clip on top, adds an \
                  overlay label and mixes in background music."
)]
struct Cli {
    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Produce one short per input clip
    Shorts {
        /// Directory of source clips
        #[arg(short, long)]
        input: PathBuf,

        /// Directory of green-screen reaction clips (cutout and split layouts)
        #[arg(short, long)]
        reactions: Option<PathBuf>,

        /// Directory of background music
        #[arg(short, long)]
        music: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Layout (cutout, split, plain)
        #[arg(short, long)]
        layout: Option<Layout>,

        /// Pre-rendered RGBA overlay image
        #[arg(long)]
        overlay: Option<PathBuf>,

        /// Items processed concurrently
        #[arg(short, long)]
        workers: Option<usize>,

        /// Seed for reaction/music selection
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Join finished shorts into one video with a single music track
    Compile {
        /// Directory of finished shorts
        #[arg(short, long)]
        input: PathBuf,

        /// Directory of background music
        #[arg(short, long)]
        music: PathBuf,

        /// Output video file path
        #[arg(short, long)]
        output: PathBuf,

        /// Seed for music selection
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Paint a clip's subject over the key color using a grayscale matte video
    Bake {
        /// Source clip
        #[arg(short, long)]
        input: PathBuf,

        /// Matte video; white is foreground, black is background
        #[arg(short, long)]
        matte: PathBuf,

        /// Output video file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write the default configuration to a file
    InitConfig {
        /// Where to write the TOML file
        #[arg(default_value = "shorts.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Shorts-Compositor v{}", env!("CARGO_PKG_VERSION"));

    match run(cli).await {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            let code = match e.downcast_ref::<CompositorError>() {
                Some(err) => {
                    error!("{}", err.user_message());
                    exit_code_for(err)
                }
                None => {
                    error!("{:#}", e);
                    EXIT_FATAL
                }
            };
            ExitCode::from(code as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => Config::default(),
    };

    match cli.command {
        Command::InitConfig { path } => {
            config.save_to_file(&path)?;
            info!("Wrote configuration to {:?}", path);
            Ok(0)
        }

        Command::Shorts {
            input,
            reactions,
            music,
            output,
            layout,
            overlay,
            workers,
            seed,
        } => {
            if let Some(layout) = layout {
                config.batch.layout = layout;
            }
            if let Some(overlay) = overlay {
                config.overlay.image = Some(overlay);
            }
            if let Some(workers) = workers {
                config.batch.workers = workers;
            }
            if seed.is_some() {
                config.batch.seed = seed;
            }

            let paths = BatchPaths {
                inputs: input,
                reactions,
                music,
                output,
            };
            let mut rng = make_rng(config.batch.seed);

            let decoder = Arc::new(FfmpegDecoder::new(config.audio.format())?);
            let encoder = Arc::new(FfmpegEncoder::new()?);
            let runner = BatchRunner::new(ShortsPipeline::new(config, decoder, encoder)?);

            let jobs = match runner.plan(&paths, &mut rng) {
                Ok(jobs) => jobs,
                Err(e) => {
                    error!("Batch aborted before processing: {}", e.user_message());
                    return Ok(exit_code_for(&e));
                }
            };

            tokio::fs::create_dir_all(&paths.output)
                .await
                .with_context(|| format!("failed to create output directory {:?}", paths.output))?;

            let report = runner.run(jobs).await;
            for skipped in &report.skipped {
                warn!("Skipped {}: {}", skipped.input.display(), skipped.reason);
            }
            if let Some(aborted) = &report.aborted {
                error!("Batch aborted by {}: {}", aborted.input.display(), aborted.reason);
            }
            info!(
                "Processed {}/{} items into {:?}",
                report.succeeded.len(),
                report.total(),
                paths.output
            );
            Ok(report.exit_code())
        }

        Command::Compile {
            input,
            music,
            output,
            seed,
        } => {
            let mut rng = make_rng(seed.or(config.batch.seed));
            let decoder = FfmpegDecoder::new(config.audio.format())?;
            let encoder = FfmpegEncoder::new()?;
            let compiler = Compiler::new(&config, &decoder, &encoder);

            let plan = match compiler.plan(&input, &music, &output, &mut rng) {
                Ok(plan) => plan,
                Err(e) => {
                    error!("Compilation aborted: {}", e.user_message());
                    return Ok(exit_code_for(&e));
                }
            };

            let encoded = tokio::task::spawn_blocking(move || {
                let compiler = Compiler::new(&config, &decoder, &encoder);
                compiler.run(&plan)
            })
            .await
            .context("compile worker panicked")??;

            info!("Compilation saved to {:?} ({:.1}s)", encoded.path, encoded.duration);
            Ok(0)
        }

        Command::Bake {
            input,
            matte,
            output,
        } => {
            let decoder = FfmpegDecoder::new(config.audio.format())?;
            let encoder = FfmpegEncoder::new()?;

            let baked = tokio::task::spawn_blocking(move || {
                Baker::new(&config, &decoder, &encoder).run(&input, &matte, &output)
            })
            .await
            .context("bake worker panicked")?;

            match baked {
                Ok(encoded) => {
                    info!(
                        "Baked footage saved to {:?} ({} frames)",
                        encoded.path, encoded.frame_count
                    );
                    Ok(0)
                }
                Err(e) => {
                    error!("Bake failed: {}", e.user_message());
                    Ok(exit_code_for(&e))
                }
            }
        }
    }
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => {
            info!("Using seed {}", seed);
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_entropy(),
    }
}
