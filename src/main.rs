use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use log::error;

use eegscreen::{
    inspect, write_recording, Aggregation, Classifier, ClassifierError, EdfFileSource, ErrorKind,
    FileReport, Pipeline, PipelineConfig, ProcessClassifier, ScreenError, SignalSource, Verdict,
    WindowBatch,
};

#[derive(Parser)]
#[command(name = "eegscreen", version, about = "EEG window-classifier screening for EDF recordings")]
struct Cli {
    /// More log output (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show channel labels, sample rates and duration of an EDF file
    Inspect { file: PathBuf },

    /// Score a recording and print the file-level verdict
    Analyze {
        file: PathBuf,

        /// Model artifact handed to the backend
        #[arg(long)]
        model: PathBuf,

        /// Backend program; it receives the model path as its last argument
        #[arg(long, default_value = "python3")]
        backend: String,

        /// Extra backend arguments placed before the model path
        #[arg(long = "backend-arg")]
        backend_args: Vec<String>,

        /// JSON pipeline configuration
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, value_enum)]
        aggregation: Option<AggregationArg>,

        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the selected, filtered channels to a new EDF file
    Export {
        file: PathBuf,
        output: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum AggregationArg {
    MajorityVote,
    MeanProbability,
}

impl From<AggregationArg> for Aggregation {
    fn from(arg: AggregationArg) -> Self {
        match arg {
            AggregationArg::MajorityVote => Aggregation::MajorityVote,
            AggregationArg::MeanProbability => Aggregation::MeanProbability,
        }
    }
}

/// Export needs the preprocessing only; it never scores a window.
struct NoModel;

impl Classifier for NoModel {
    fn predict(&self, _: &WindowBatch) -> Result<Vec<f64>, ClassifierError> {
        Err(ClassifierError::Backend("export does not run inference".to_string()))
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig, ScreenError> {
    match path {
        Some(p) => PipelineConfig::from_json_file(p),
        None => Ok(PipelineConfig::default()),
    }
}

fn exit_code(err: &ScreenError) -> ExitCode {
    match err.kind() {
        ErrorKind::BadInput => ExitCode::from(2),
        ErrorKind::BackendUnavailable => ExitCode::from(4),
        ErrorKind::Configuration => ExitCode::from(5),
        ErrorKind::Cancelled => ExitCode::from(6),
    }
}

fn print_report(report: &FileReport) {
    println!("Channels:       {}", report.channels.join(", "));
    println!(
        "Windows:        {} x {} samples (stride {}) at {} Hz",
        report.segment_count, report.window_samples, report.stride_samples, report.sample_rate
    );
    println!("Healthy:        {}", report.verdict.healthy_segments);
    println!("Abnormal:       {}", report.verdict.abnormal_segments);
    if let Some(mean) = report.verdict.mean_score {
        println!("Mean score:     {:.4}", mean);
    }
    println!("Verdict:        {}", report.verdict());
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Inspect { file } => {
            let info = match inspect(&file) {
                Ok(info) => info,
                Err(e) => return Ok(report_error(&e)),
            };
            println!("File:           {}", file.display());
            println!("Signals:        {}", info.channel_count);
            for (label, rate) in info.labels.iter().zip(&info.sample_rates) {
                println!("  {:<16} {} Hz", label, rate);
            }
            println!("Duration:       {:.1} s", info.duration_seconds);
            if let Some(start) = info.start {
                println!("Start:          {}", start);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Analyze {
            file,
            model,
            backend,
            backend_args,
            config,
            aggregation,
            timeout_secs,
            json,
        } => {
            let result = load_config(config.as_ref())
                .map(|mut cfg| {
                    if let Some(a) = aggregation {
                        cfg.aggregation = a.into();
                    }
                    cfg
                })
                .and_then(|cfg| {
                    let classifier = ProcessClassifier::new(&backend, &model)?
                        .args(backend_args)
                        .timeout(Duration::from_secs(timeout_secs));
                    Pipeline::new(cfg, classifier)
                })
                .and_then(|pipeline| pipeline.analyze_path(&file));

            let report = match result {
                Ok(report) => report,
                Err(e) => return Ok(report_error(&e)),
            };

            if json {
                let text = serde_json::to_string_pretty(&report).context("encoding report")?;
                println!("{}", text);
            } else {
                print_report(&report);
            }

            if report.verdict() == Verdict::NoData {
                eprintln!(
                    "The recording is shorter than one {}-sample analysis window; no verdict is possible.",
                    report.window_samples
                );
                return Ok(ExitCode::from(3));
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Export {
            file,
            output,
            config,
        } => {
            let result = load_config(config.as_ref())
                .and_then(|cfg| Pipeline::new(cfg, NoModel))
                .and_then(|pipeline| {
                    let recording = EdfFileSource::new(&file).load()?;
                    pipeline.prepare(&recording)?.into_recording()
                });
            let selected = match result {
                Ok(selected) => selected,
                Err(e) => return Ok(report_error(&e)),
            };

            write_recording(&output, &selected)
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "Wrote {} channels ({:.1} s) to {}",
                selected.channel_count(),
                selected.duration_seconds(),
                output.display()
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn report_error(err: &ScreenError) -> ExitCode {
    error!("{}", err);
    eprintln!("{}", err.user_message());
    exit_code(err)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
