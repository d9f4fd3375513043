use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use vocalis_lib::commands::{self, AppContext, RecordOptions};
use vocalis_lib::config::AppConfig;
use vocalis_lib::dataset::DatasetKind;
use vocalis_lib::emotion::Emotion;
use vocalis_lib::state::RecordingSource;

/// Speech emotion recognition from short voice recordings
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to config.json in the app data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding emotion_model.json and scaler.json
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Predict the emotion of a recording
    Analyze {
        file: PathBuf,

        /// Store the recording and its analysis in the database
        #[arg(long)]
        record: bool,

        /// Where the recording came from: upload, record or sample
        #[arg(long, default_value = "upload", requires = "record")]
        source: RecordingSource,

        /// Corpus a sample was taken from (ravdess, tess, savee, emovo)
        #[arg(long, requires = "record")]
        dataset: Option<DatasetKind>,

        /// Print the full analysis as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the 38 acoustic features of a recording
    Features { file: PathBuf },

    /// Summarize the known corpora under a datasets directory
    Datasets { datasets_root: PathBuf },

    /// List labeled samples from one corpus
    Samples {
        datasets_root: PathBuf,
        dataset: DatasetKind,

        /// Only samples labeled with this emotion
        #[arg(long)]
        emotion: Option<Emotion>,

        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Score the model against labeled dataset samples
    Evaluate { datasets_root: PathBuf },

    /// Train a model on labeled dataset samples and save it
    Train { datasets_root: PathBuf },

    /// Write a synthetic placeholder model
    Bootstrap,

    /// Describe the active model
    Info,

    /// Show recent analyses and per-emotion totals
    History {
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Write the effective configuration to the config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => AppConfig::default_path().context("Failed to locate config file")?,
    };
    let config = AppConfig::load(&config_path);
    let ctx = AppContext::new(config, args.model_dir.clone())?;

    match args.command {
        Command::Analyze {
            file,
            record,
            source,
            dataset,
            json,
        } => {
            let record = record.then_some(RecordOptions { source, dataset });
            let output = commands::analyze(&ctx, &file, record)?;
            if json {
                return print_json(&output);
            }

            let prediction = &output.analysis.prediction;
            println!(
                "{}: {} ({})",
                file.display(),
                prediction.label.display_name(),
                prediction.confidence_percent()
            );
            for emotion in Emotion::ALL {
                let p = prediction.probability(emotion);
                println!(
                    "  {:<10} {:>6.1}%  {}",
                    emotion.display_name(),
                    p * 100.0,
                    "#".repeat((p * 40.0).round() as usize)
                );
            }
            if let Some(cause) = &output.analysis.prediction_fallback {
                println!("  (fallback result: {})", cause);
            }
            if let Some(recording) = &output.recording {
                println!("  recorded as {}", recording.id);
            }
        }
        Command::Features { file } => {
            for (name, value) in commands::features(&ctx, &file)? {
                println!("{:<22} {:>14.6}", name, value);
            }
        }
        Command::Datasets { datasets_root } => {
            print_json(&commands::datasets(&datasets_root)?)?;
        }
        Command::Samples {
            datasets_root,
            dataset,
            emotion,
            limit,
        } => {
            for sample in commands::samples(&datasets_root, dataset, emotion, limit)? {
                println!("{:<10} {}", sample.emotion.as_str(), sample.path.display());
            }
        }
        Command::Evaluate { datasets_root } => {
            print_json(&commands::evaluate(&ctx, &datasets_root)?)?;
        }
        Command::Train { datasets_root } => {
            print_json(&commands::train(&ctx, &datasets_root)?)?;
        }
        Command::Bootstrap => {
            let path = commands::bootstrap_model(&ctx)?;
            println!("Wrote placeholder model to {}", path.display());
        }
        Command::Info => {
            print_json(&commands::model_info(&ctx))?;
        }
        Command::History { limit } => {
            print_json(&commands::history(&ctx, limit)?)?;
        }
        Command::InitConfig { force } => {
            commands::init_config(&ctx, &config_path, force)?;
            println!("Wrote config to {}", config_path.display());
        }
    }

    Ok(())
}
