//! Command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::app::{AppContainer, BackendStatus, DefaultAppContainer};
use crate::cli::args::{CheckArgs, CompressArgs, ReportFormat};
use crate::config::ServiceConfig;
use crate::domain::model::*;
use crate::error::VidSqueezeError;
use crate::server::{start_server, ServerContext};
use crate::utils::format_file_size;

/// Summary printed after a CLI compression; never carries the payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub original_size_bytes: u64,
    pub compressed_size_bytes: u64,
    pub compression_ratio: f64,
    pub duration_seconds: f64,
    pub resolution: String,
    pub format: TargetFormat,
    pub strategy: StrategyKind,
    pub attempts: Vec<StrategyAttempt>,
}

impl CompressReport {
    fn new(input: &Path, output_path: &Path, output: &CompressionOutput) -> Self {
        Self {
            input: input.to_path_buf(),
            output: output_path.to_path_buf(),
            original_size_bytes: output.original_size_bytes,
            compressed_size_bytes: output.compressed_size_bytes,
            compression_ratio: output.compression_ratio(),
            duration_seconds: output.duration_seconds,
            resolution: output.resolution.clone(),
            format: output.format,
            strategy: output.strategy,
            attempts: output.attempts.clone(),
        }
    }

    fn to_text(&self) -> String {
        let mut text = String::new();
        text.push_str(&format!("Input:       {}\n", self.input.display()));
        text.push_str(&format!("Output:      {}\n", self.output.display()));
        text.push_str(&format!(
            "Size:        {} -> {} ({:.1}%)\n",
            format_file_size(self.original_size_bytes),
            format_file_size(self.compressed_size_bytes),
            self.compression_ratio * 100.0
        ));
        text.push_str(&format!("Duration:    {:.2}s\n", self.duration_seconds));
        text.push_str(&format!("Resolution:  {}\n", self.resolution));
        text.push_str(&format!("Format:      {}\n", self.format));
        text.push_str(&format!(
            "Strategy:    {} after {} attempt(s)\n",
            self.strategy,
            self.attempts.len()
        ));
        text
    }
}

/// Render a report in the requested format
pub fn render_report(report: &CompressReport, format: ReportFormat) -> Result<String> {
    Ok(match format {
        ReportFormat::Text => report.to_text(),
        ReportFormat::Json => {
            let mut json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
            json.push('\n');
            json
        }
        ReportFormat::Yaml => serde_yaml::to_string(report).context("Failed to serialize report")?,
    })
}

/// `<dir>/<stem>-compressed.<ext>` next to the input
pub fn default_output_path(input: &Path, format: TargetFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}-compressed.{}", stem, format.extension()))
}

/// Execute the compress command
pub async fn compress(container: &DefaultAppContainer, args: CompressArgs) -> Result<()> {
    info!("Input: {}", args.input.display());

    let media = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("Failed to read input file {}", args.input.display()))?;

    let mut form = FormFields::new()
        .with_media(media)
        .with_field("format", args.format.as_str())
        .with_field("bitrate", args.bitrate.to_string())
        .with_field("maintainResolution", args.maintain_resolution.to_string())
        .with_field("removeAudio", args.remove_audio.to_string())
        .with_field("preferHardwareAcceleration", args.hw_accel.to_string());
    if let Some(name) = args.input.file_name() {
        form = form.with_file_name(name.to_string_lossy());
    }

    // Validate before touching the output path so bad options fail fast.
    let format: TargetFormat = args.format.parse()?;
    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input, format));
    if output_path.exists() && !args.force {
        anyhow::bail!(
            "Output file {} already exists (use --force to overwrite)",
            output_path.display()
        );
    }
    info!("Output: {}", output_path.display());

    let output = container
        .compress_interactor()
        .compress_form(&form)
        .await
        .map_err(VidSqueezeError::from)?;

    tokio::fs::write(&output_path, &output.media)
        .await
        .with_context(|| format!("Failed to write output file {}", output_path.display()))?;

    let report = CompressReport::new(&args.input, &output_path, &output);
    print!("{}", render_report(&report, args.report)?);
    Ok(())
}

/// Execute the serve command
pub async fn serve(container: &DefaultAppContainer, config: &ServiceConfig) -> Result<()> {
    let ctx = ServerContext::new(container.compress_interactor(), config.server.max_concurrent_jobs);
    info!(
        max_upload_bytes = config.server.max_upload_bytes,
        max_concurrent_jobs = config.server.max_concurrent_jobs,
        "Starting HTTP service"
    );
    start_server(ctx, &config.server.bind, config.server.max_upload_bytes).await?;
    Ok(())
}

/// Execute the check command
pub async fn check(container: &DefaultAppContainer, args: CheckArgs) -> Result<()> {
    let statuses = container.check_backends().await;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&statuses).context("Failed to serialize check report")?
        );
    } else {
        for BackendStatus { name, available, detail } in &statuses {
            let mark = if *available { "ok" } else { "unavailable" };
            println!("{:<10} {:<12} {}", name, mark, detail);
        }
    }

    let can_encode = statuses
        .iter()
        .any(|s| s.available && s.name != "probe");
    if !can_encode {
        anyhow::bail!("No execution strategy is available");
    }
    Ok(())
}
