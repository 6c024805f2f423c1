//! The `florence caption` command.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, ValueEnum};
use florence_core::{
    CaptionRecord, Captioner, Config, DatasetCaptioner, Device, OutputFormat, OutputWriter,
    PipelineError,
};

/// Arguments for the `caption` command.
#[derive(Args, Debug)]
pub struct CaptionArgs {
    /// Image file or dataset folder
    #[arg(required = true)]
    pub input: PathBuf,

    /// Write records to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Record format (defaults to `[output] format`)
    #[arg(short, long, value_enum)]
    pub format: Option<Format>,

    /// Execution device: cpu, cuda or cuda:N
    #[arg(long, env = "FLORENCE_DEVICE")]
    pub device: Option<Device>,

    /// Upper bound on generated tokens
    #[arg(long)]
    pub max_new_tokens: Option<usize>,

    /// Do not write caption files next to the images
    #[arg(long)]
    pub no_sidecar: bool,

    /// Re-caption images that already have a caption file
    #[arg(long)]
    pub overwrite: bool,

    /// Fail instead of downloading a missing model bundle
    #[arg(long)]
    pub offline: bool,
}

/// Record formats.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Format {
    /// A JSON object, or an array for folders
    Json,
    /// One JSON object per line
    Jsonl,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => OutputFormat::Json,
            Format::Jsonl => OutputFormat::JsonLines,
        }
    }
}

impl CaptionArgs {
    /// Fold command-line overrides into the loaded config and re-check it.
    fn apply(&self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(device) = self.device {
            config.model.device = device;
        }
        if let Some(max_new_tokens) = self.max_new_tokens {
            config.caption.max_new_tokens = max_new_tokens;
        }
        if self.offline {
            config.model.offline = true;
        }
        config.validate()?;
        Ok(())
    }

    fn output_format(&self, config: &Config) -> OutputFormat {
        match self.format {
            Some(format) => format.into(),
            None => config.output.format.parse().unwrap_or_default(),
        }
    }
}

/// Execute the caption command.
pub async fn execute(args: CaptionArgs, mut config: Config) -> anyhow::Result<()> {
    args.apply(&mut config)?;

    if !args.input.exists() {
        anyhow::bail!("Input not found: {}", args.input.display());
    }

    let captioner = Arc::new(Captioner::from_config(&config));
    let pipeline = DatasetCaptioner::new(captioner, &config);

    let files = pipeline.discover(&args.input);
    if files.is_empty() {
        tracing::warn!("No supported images found at {:?}", args.input);
        return Ok(());
    }
    tracing::info!("Found {} image(s) to caption", files.len());

    if args.input.is_file() && should_skip(&pipeline, &args, &files[0]) {
        tracing::info!(
            "{:?} already has a caption file; pass --overwrite to replace it",
            files[0]
        );
        return Ok(());
    }

    let format = args.output_format(&config);
    let pretty = config.output.pretty;
    let mut writer = OutputWriter::new(open_output(args.output.as_deref())?, format, pretty);

    tracing::debug!(
        "Captioning with max_new_tokens = {}",
        pipeline.options().max_new_tokens
    );
    pipeline.ensure_loaded().await?;

    if args.input.is_file() {
        let record = pipeline.caption_file(&files[0], !args.no_sidecar).await?;
        writer.write(&record)?;
    } else {
        caption_batch(&pipeline, &args, &files, &mut writer).await?;
    }

    writer.flush()?;
    if let Some(path) = &args.output {
        tracing::info!("Output written to {:?}", path);
    }
    Ok(())
}

async fn caption_batch(
    pipeline: &DatasetCaptioner,
    args: &CaptionArgs,
    files: &[PathBuf],
    writer: &mut OutputWriter<Box<dyn Write>>,
) -> anyhow::Result<()> {
    let progress = create_progress_bar(files.len() as u64);
    let mut stats = BatchStats::default();
    let start = Instant::now();
    // A JSON array needs every record before anything is written.
    let mut records: Vec<CaptionRecord> = Vec::new();

    for path in files {
        if should_skip(pipeline, args, path) {
            stats.skipped += 1;
            progress.inc(1);
            continue;
        }

        match pipeline.caption_file(path, !args.no_sidecar).await {
            Ok(record) => {
                stats.succeeded += 1;
                match writer.format() {
                    OutputFormat::JsonLines => writer.write(&record)?,
                    OutputFormat::Json => records.push(record),
                }
            }
            Err(PipelineError::Caption { source, .. }) if source.is_load_failure() => {
                progress.finish_and_clear();
                return Err(source.into());
            }
            Err(e) => {
                stats.failed += 1;
                progress.suspend(|| tracing::error!("Failed: {}", e));
            }
        }

        progress.inc(1);
        let elapsed = start.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            let done = stats.succeeded + stats.failed;
            progress.set_message(format!("{:.2} img/sec", done as f64 / elapsed));
        }
    }

    if writer.format() == OutputFormat::Json && !records.is_empty() {
        writer.write_all(&records)?;
    }

    progress.finish_and_clear();
    print_summary(&stats, start.elapsed());
    Ok(())
}

fn should_skip(pipeline: &DatasetCaptioner, args: &CaptionArgs, path: &Path) -> bool {
    !args.overwrite && !args.no_sidecar && pipeline.has_sidecar(path)
}

fn open_output(path: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout().lock()),
    })
}

#[derive(Debug, Default, PartialEq, Eq)]
struct BatchStats {
    succeeded: u64,
    failed: u64,
    skipped: u64,
}

fn create_progress_bar(total: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
    )
    .map(|style| style.progress_chars("##-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message("loading...");
    pb
}

fn print_summary(stats: &BatchStats, elapsed: Duration) {
    let total = stats.succeeded + stats.failed + stats.skipped;
    let rate = if elapsed.as_secs_f64() > 0.0 {
        stats.succeeded as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Captioned:    {:>8}", stats.succeeded);
    if stats.failed > 0 {
        eprintln!("    Failed:       {:>8}", stats.failed);
    }
    if stats.skipped > 0 {
        eprintln!("    Skipped:      {:>8}", stats.skipped);
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Total:        {:>8}", total);
    eprintln!("    Duration:     {:>7.1}s", elapsed.as_secs_f64());
    eprintln!("    Rate:         {:>7.2} img/sec", rate);
    eprintln!("  ====================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use florence_core::GeneratorSource;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: CaptionArgs,
    }

    fn parse(argv: &[&str]) -> CaptionArgs {
        let mut full = vec!["caption"];
        full.extend_from_slice(argv);
        TestCli::try_parse_from(full).unwrap().args
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let args = parse(&[
            "./data",
            "--device",
            "cuda:1",
            "--max-new-tokens",
            "256",
            "--offline",
        ]);
        let mut config = Config::default();
        args.apply(&mut config).unwrap();

        assert_eq!(config.model.device, Device::Cuda(1));
        assert_eq!(config.caption.max_new_tokens, 256);
        assert!(config.model.offline);
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let args = parse(&["./data"]);
        let mut config = Config::default();
        config.model.device = Device::Cpu;
        args.apply(&mut config).unwrap();

        assert_eq!(config.model.device, Device::Cpu);
        assert_eq!(config.caption.max_new_tokens, 1024);
        assert!(!config.model.offline);
    }

    #[test]
    fn test_zero_max_new_tokens_fails_up_front() {
        let args = parse(&["./data", "--max-new-tokens", "0"]);
        let mut config = Config::default();
        let err = args.apply(&mut config).unwrap_err();
        assert!(err.to_string().contains("max_new_tokens"));
    }

    #[tokio::test]
    async fn test_captioned_single_file_skips_model_load() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("a.png");
        std::fs::write(&image, b"png").unwrap();
        std::fs::write(dir.path().join("a.txt"), "old caption").unwrap();

        // The configured graph does not exist, so reaching the load would fail.
        let mut config = Config::default();
        config.model.device = Device::Cpu;
        config.model.offline = true;
        config.general.model_dir = dir.path().join("models");
        config.model.generator = GeneratorSource::Path(dir.path().join("missing.onnx"));

        let args = parse(&[image.to_str().unwrap()]);
        execute(args, config).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "old caption"
        );
    }

    #[test]
    fn test_bad_device_is_rejected() {
        let result = TestCli::try_parse_from(["caption", "./data", "--device", "tpu"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_format_falls_back_to_config() {
        let mut config = Config::default();
        config.output.format = "jsonl".to_string();

        assert_eq!(parse(&["x"]).output_format(&config), OutputFormat::JsonLines);
        assert_eq!(
            parse(&["x", "-f", "json"]).output_format(&config),
            OutputFormat::Json
        );
    }

    #[test]
    fn test_existing_sidecar_is_skipped_unless_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("a.png");
        std::fs::write(&image, b"png").unwrap();
        std::fs::write(dir.path().join("a.txt"), "old caption").unwrap();

        let config = Config::default();
        let pipeline =
            DatasetCaptioner::new(Arc::new(Captioner::from_config(&config)), &config);

        assert!(should_skip(&pipeline, &parse(&["x"]), &image));
        assert!(!should_skip(&pipeline, &parse(&["x", "--overwrite"]), &image));
        assert!(!should_skip(&pipeline, &parse(&["x", "--no-sidecar"]), &image));
    }

    #[tokio::test]
    async fn test_missing_input_is_an_error() {
        let args = parse(&["/nonexistent/dataset"]);
        let err = execute(args, Config::default()).await.unwrap_err();
        assert!(err.to_string().contains("Input not found"));
    }
}
