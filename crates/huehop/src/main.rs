//! huehop command line: list algorithms, run a single transfer, or
//! execute a JSON-described pipeline over image files.
//!
//! All color work happens in `huehop-core` / `huehop-algorithms` on
//! in-memory buffers; this binary only decodes, encodes, and reports.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use image::RgbImage;

use huehop_core::{
    AlgorithmRegistry, ChannelOrder, Params, Pipeline, PixelBuffer, PipelineResult, StepSpec,
    Value,
};

#[derive(Parser)]
#[command(version, about = "Pluggable color transfer between images")]
struct Args {
    /// Enable debug-level diagnostics on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List registered algorithms and their availability.
    List {
        /// Include unavailable algorithms with the reason they failed
        /// their capability probe.
        #[arg(long)]
        all: bool,
    },

    /// Apply one algorithm to a source/reference image pair.
    Transfer {
        /// Algorithm name, as shown by `list`.
        algorithm: String,

        /// Image whose colors will be changed.
        #[arg(short, long)]
        source: PathBuf,

        /// Image whose colors are transferred onto the source.
        #[arg(short, long)]
        reference: PathBuf,

        /// Where to write the result (format from the extension).
        #[arg(short, long)]
        output: PathBuf,

        /// Algorithm parameter as `key=value`; repeatable. Values
        /// parse as bool, then integer, then float, then string.
        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },

    /// Run a JSON pipeline description over a source/reference pair.
    Chain {
        /// JSON file holding an array of steps, e.g.
        /// `[{"algorithm":"reinhard","params":{"intensity":0.5}}]`.
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Image whose colors will be changed.
        #[arg(short, long)]
        source: PathBuf,

        /// Image whose colors are transferred onto the source.
        #[arg(short, long)]
        reference: PathBuf,

        /// Where to write the final result.
        #[arg(short, long)]
        output: PathBuf,

        /// Directory to write each step's intermediate output into, as
        /// `step-0-<algorithm>.png`, `step-1-...`.
        #[arg(long, value_name = "DIR")]
        save_intermediate: Option<PathBuf>,

        /// Per-step time limit in milliseconds.
        #[arg(long, value_name = "MS")]
        step_timeout: Option<u64>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut registry = AlgorithmRegistry::new();
    huehop_algorithms::register_builtins(&mut registry)?;

    match args.command {
        Command::List { all } => list(&registry, all),
        Command::Transfer {
            algorithm,
            source,
            reference,
            output,
            params,
        } => transfer(&registry, &algorithm, &source, &reference, &output, &params),
        Command::Chain {
            pipeline,
            source,
            reference,
            output,
            save_intermediate,
            step_timeout,
        } => chain(
            &registry,
            &pipeline,
            &source,
            &reference,
            &output,
            save_intermediate.as_deref(),
            step_timeout.map(Duration::from_millis),
        ),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "huehop=debug,huehop_core=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn list(registry: &AlgorithmRegistry, all: bool) -> Result<(), Box<dyn std::error::Error>> {
    for (name, probe) in registry.probe_results() {
        if probe.available {
            let descriptor = registry
                .descriptor(&name)
                .ok_or_else(|| format!("descriptor vanished for `{name}`"))?;
            let description = &descriptor.metadata().description;
            if description.is_empty() {
                println!("{name}");
            } else {
                println!("{name}  {description}");
            }
        } else if all {
            let reason = probe.reason.as_deref().unwrap_or("requirements unmet");
            println!("{name}  [unavailable: {reason}]");
        }
    }
    Ok(())
}

fn transfer(
    registry: &AlgorithmRegistry,
    algorithm: &str,
    source: &Path,
    reference: &Path,
    output: &Path,
    raw_params: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let params = parse_params(raw_params)?;
    let source_buffer = load_image(source)?;
    let reference_buffer = load_image(reference)?;

    eprintln!(
        "Transferring {} -> {} with `{algorithm}`",
        reference.display(),
        source.display(),
    );
    let result = registry.transfer(algorithm, &source_buffer, &reference_buffer, &params)?;
    save_image(output, &result)?;
    eprintln!("Wrote {}", output.display());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn chain(
    registry: &AlgorithmRegistry,
    pipeline_path: &Path,
    source: &Path,
    reference: &Path,
    output: &Path,
    save_intermediate: Option<&Path>,
    step_timeout: Option<Duration>,
) -> Result<(), Box<dyn std::error::Error>> {
    let spec_json = std::fs::read_to_string(pipeline_path)?;
    let steps: Vec<StepSpec> = serde_json::from_str(&spec_json)?;

    let source_buffer = load_image(source)?;
    let reference_buffer = load_image(reference)?;

    let mut builder = Pipeline::builder(registry).steps(steps);
    if let Some(limit) = step_timeout {
        builder = builder.step_timeout(limit);
    }
    let pipeline = builder.build()?;

    eprintln!(
        "Running {} step(s): {}",
        pipeline.len(),
        pipeline.step_names().join(" -> "),
    );
    let result = pipeline.execute(&source_buffer, &reference_buffer);
    report(&result);

    if let Some(dir) = save_intermediate {
        std::fs::create_dir_all(dir)?;
        for (record, buffer) in result.records.iter().zip(&result.intermediate) {
            let path = dir.join(format!(
                "step-{}-{}.png",
                record.step_index, record.algorithm,
            ));
            save_image(&path, buffer)?;
            eprintln!("Wrote intermediate {}", path.display());
        }
    }

    match result.final_buffer {
        Some(ref buffer) => {
            save_image(output, buffer)?;
            eprintln!("Wrote {}", output.display());
            Ok(())
        }
        None => Err("pipeline did not complete; no output written".into()),
    }
}

/// Print one line per attempted step.
fn report(result: &PipelineResult) {
    for record in &result.records {
        match &record.error {
            None => eprintln!(
                "  step {} `{}`: ok in {:?}",
                record.step_index, record.algorithm, record.duration,
            ),
            Some(error) => eprintln!(
                "  step {} `{}`: FAILED in {:?}: {error}",
                record.step_index, record.algorithm, record.duration,
            ),
        }
    }
}

/// Parse repeated `key=value` arguments.
///
/// Values are tried as bool, then integer, then float; anything else
/// stays a string.
fn parse_params(raw: &[String]) -> Result<Params, String> {
    let mut params = Params::new();
    for entry in raw {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| format!("parameter must be `key=value`, got `{entry}`"))?;
        params.insert(key, parse_value(value));
    }
    Ok(params)
}

fn parse_value(raw: &str) -> Value {
    if let Ok(b) = raw.parse::<bool>() {
        Value::Bool(b)
    } else if let Ok(i) = raw.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Float(f)
    } else {
        Value::Str(raw.to_owned())
    }
}

fn load_image(path: &Path) -> Result<PixelBuffer, Box<dyn std::error::Error>> {
    let rgb: RgbImage = image::open(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?
        .into_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(PixelBuffer::from_raw(
        width,
        height,
        ChannelOrder::Rgb,
        rgb.into_raw(),
    )?)
}

fn save_image(path: &Path, buffer: &PixelBuffer) -> Result<(), Box<dyn std::error::Error>> {
    let rgb = buffer.with_order(ChannelOrder::Rgb);
    let (width, height) = (rgb.width(), rgb.height());
    let img: RgbImage = RgbImage::from_raw(width, height, rgb.into_data())
        .ok_or("pixel buffer length does not match its dimensions")?;
    img.save(path)
        .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
    Ok(())
}
