//! Folio CLI - command-line interface for Folio Metrics
//!
//! Commands:
//! - pack: Build a sectioned blob from JSON sections
//! - inspect: Describe (and optionally decode) a sectioned blob
//! - merge-heatmap: Fold a visit's heatmap samples into a day's heatmap
//! - merge-session: Fold a visitor session into a day's aggregate
//! - zscores: Score a day against its baseline window
//! - doctor: Diagnose configuration and stored blobs

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use folio_metrics::codec::blob::{self, SectionSpec};
use folio_metrics::config::MetricsConfig;
use folio_metrics::pipeline::EngagementProcessor;
use folio_metrics::types::{DailyAggregateMetrics, HeatmapUpdate, PortfolioHeatmap, VisitSession};
use folio_metrics::{slot, CodecError, ComputeError, FOLIO_VERSION, PRODUCER_NAME};

/// Folio - compact storage and anomaly scoring for portfolio engagement
#[derive(Parser)]
#[command(name = "folio")]
#[command(author = "Folio Analytics")]
#[command(version = FOLIO_VERSION)]
#[command(about = "Pack engagement payloads and score them against history", long_about = None)]
struct Cli {
    /// Engine configuration file (JSON); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a sectioned blob from a JSON array of sections
    Pack {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Blob format version (1-255)
        #[arg(long, default_value = "1")]
        blob_version: u8,

        /// Append a CRC32 trailer
        #[arg(long)]
        checksum: bool,
    },

    /// Describe a sectioned blob
    Inspect {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Decode and print section values
        #[arg(long)]
        values: bool,

        /// Output report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Merge a visit's heatmap samples into a day's heatmap
    MergeHeatmap {
        /// Existing heatmap JSON (omit for the first visit of the day)
        #[arg(long)]
        existing: Option<PathBuf>,

        /// Heatmap update JSON (use - for stdin)
        #[arg(short, long)]
        update: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Override the configured cell capacity
        #[arg(long)]
        max_cells: Option<usize>,

        /// Output format
        #[arg(long, default_value = "json")]
        format: HeatmapFormat,
    },

    /// Merge a visitor session into a day's aggregate
    MergeSession {
        /// Current aggregate JSON (omit for the first session of the day)
        #[arg(long)]
        previous: Option<PathBuf>,

        /// Session JSON (use - for stdin)
        #[arg(short, long)]
        session: PathBuf,

        /// Portfolio identifier
        #[arg(long)]
        portfolio_id: String,

        /// Day the session belongs to (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Score a day's aggregate against prior days
    Zscores {
        /// Current aggregate JSON
        #[arg(long)]
        current: PathBuf,

        /// JSON array of prior aggregates, most recent first
        #[arg(long)]
        history: PathBuf,

        /// Override the configured baseline window
        #[arg(long)]
        window_days: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and stored blobs
    Doctor {
        /// Blob file to verify
        #[arg(long)]
        blob: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum HeatmapFormat {
    /// Heatmap JSON
    Json,
    /// Checksummed slot blob
    Blob,
}

/// One section of `pack` input; width defaults to the smallest that fits
#[derive(Deserialize)]
struct PackSection {
    id: u8,
    bits_per_value: Option<u8>,
    values: Vec<u32>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let error = CliError::from(e);
            eprintln!(
                "{}",
                serde_json::to_string(&error).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), FolioCliError> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Pack {
            input,
            output,
            blob_version,
            checksum,
        } => cmd_pack(&input, &output, blob_version, checksum),

        Commands::Inspect { input, values, json } => cmd_inspect(&input, values, json),

        Commands::MergeHeatmap {
            existing,
            update,
            output,
            max_cells,
            format,
        } => {
            let mut config = config;
            if let Some(max_cells) = max_cells {
                config.heatmap.max_cells = max_cells;
            }
            cmd_merge_heatmap(config, existing.as_deref(), &update, &output, format)
        }

        Commands::MergeSession {
            previous,
            session,
            portfolio_id,
            date,
            output,
        } => cmd_merge_session(
            config,
            previous.as_deref(),
            &session,
            &portfolio_id,
            &date,
            &output,
        ),

        Commands::Zscores {
            current,
            history,
            window_days,
            json,
        } => {
            let mut config = config;
            if let Some(window_days) = window_days {
                config.baseline.window_days = window_days;
            }
            cmd_zscores(config, &current, &history, json)
        }

        Commands::Doctor { blob, json } => cmd_doctor(&config, blob.as_deref(), json),
    }
}

/// Read `--config` without validating it. Engine commands validate through
/// `EngagementProcessor::with_config`; `doctor` reports the problem.
fn load_config(path: Option<&Path>) -> Result<MetricsConfig, FolioCliError> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&json)?)
        }
        None => Ok(MetricsConfig::default()),
    }
}

fn cmd_pack(input: &Path, output: &Path, version: u8, checksum: bool) -> Result<(), FolioCliError> {
    let sections: Vec<PackSection> = serde_json::from_str(&read_text(input)?)?;
    let specs: Vec<SectionSpec> = sections
        .into_iter()
        .map(|s| match s.bits_per_value {
            Some(bits) => SectionSpec::new(s.id, bits, s.values),
            None => SectionSpec::fitted(s.id, s.values),
        })
        .collect();

    let bytes = blob::build(version, &specs, checksum)?;
    log::info!("packed {} sections into {} bytes", specs.len(), bytes.len());
    write_bytes(output, &bytes)
}

fn cmd_inspect(input: &Path, with_values: bool, json: bool) -> Result<(), FolioCliError> {
    let bytes = read_bytes(input)?;
    let parsed = blob::parse(&bytes)?;

    let mut sections = Vec::new();
    for section in parsed.sections() {
        let values = if with_values {
            Some(parsed.decode_section(section.id)?)
        } else {
            None
        };
        sections.push(SectionReport {
            id: section.id,
            bits_per_value: section.bits_per_value,
            count: section.count,
            byte_offset: section.byte_offset,
            byte_length: section.byte_length,
            values,
        });
    }

    let report = BlobReport {
        version: parsed.version(),
        total_bytes: bytes.len(),
        checksum: parsed.has_checksum(),
        sections,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Blob Report");
        println!("===========");
        println!("Version:  {}", report.version);
        println!("Size:     {} bytes", report.total_bytes);
        println!("Checksum: {}", if report.checksum { "CRC32" } else { "none" });
        println!("\nSections:");
        for s in &report.sections {
            println!(
                "  #{:<3} {:>2} bits x {:<8} @ {}..{}",
                s.id,
                s.bits_per_value,
                s.count,
                s.byte_offset,
                s.byte_offset + s.byte_length
            );
            if let Some(values) = &s.values {
                println!("       {:?}", values);
            }
        }
    }

    Ok(())
}

fn cmd_merge_heatmap(
    config: MetricsConfig,
    existing: Option<&Path>,
    update: &Path,
    output: &Path,
    format: HeatmapFormat,
) -> Result<(), FolioCliError> {
    let processor = EngagementProcessor::with_config(config)?;

    let existing: Option<PortfolioHeatmap> = match existing {
        Some(path) => Some(serde_json::from_str(&read_text(path)?)?),
        None => None,
    };
    let update: HeatmapUpdate = serde_json::from_str(&read_text(update)?)?;

    let merged = processor.merge_heatmap(existing.as_ref(), &update);
    match format {
        HeatmapFormat::Json => {
            write_bytes(output, serde_json::to_string_pretty(&merged)?.as_bytes())
        }
        HeatmapFormat::Blob => write_bytes(output, &slot::encode_heatmap(&merged)?),
    }
}

fn cmd_merge_session(
    config: MetricsConfig,
    previous: Option<&Path>,
    session: &Path,
    portfolio_id: &str,
    date: &str,
    output: &Path,
) -> Result<(), FolioCliError> {
    let processor = EngagementProcessor::with_config(config)?;

    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
        ComputeError::InvalidInput(format!("invalid date '{}', expected YYYY-MM-DD", date))
    })?;
    let previous: Option<DailyAggregateMetrics> = match previous {
        Some(path) => Some(serde_json::from_str(&read_text(path)?)?),
        None => None,
    };
    let session: VisitSession = serde_json::from_str(&read_text(session)?)?;

    let merged = processor.record_visit(previous.as_ref(), portfolio_id, date, &session)?;
    write_bytes(output, serde_json::to_string_pretty(&merged)?.as_bytes())
}

fn cmd_zscores(
    config: MetricsConfig,
    current: &Path,
    history: &Path,
    json: bool,
) -> Result<(), FolioCliError> {
    let processor = EngagementProcessor::with_config(config)?;

    let current: DailyAggregateMetrics = serde_json::from_str(&read_text(current)?)?;
    let history: Vec<DailyAggregateMetrics> = serde_json::from_str(&read_text(history)?)?;
    let set = processor.zscores(&current, &history);

    if json {
        println!("{}", serde_json::to_string_pretty(&set)?);
        return Ok(());
    }

    let render = |z: Option<f64>| match z {
        Some(z) => format!("{:+.2}", z),
        None => "not enough data".to_string(),
    };
    println!("Z-Scores for {} on {}", current.portfolio_id, current.date);
    println!("==============================");
    println!("Views:              {}", render(set.views));
    println!("Engagement avg:     {}", render(set.engagement_avg));
    println!("TTFI (inverted):    {}", render(set.ttfi));
    println!("Quality visit rate: {}", render(set.quality_visit_rate));
    println!("Social CTR:         {}", render(set.social_ctr));

    Ok(())
}

fn cmd_doctor(
    config: &MetricsConfig,
    blob_path: Option<&Path>,
    json: bool,
) -> Result<(), FolioCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "folio_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Folio version {}", FOLIO_VERSION),
    });

    checks.push(match config.validate() {
        Ok(()) => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: format!(
                "max_cells={}, window_days={}, weights={}/{}",
                config.heatmap.max_cells,
                config.baseline.window_days,
                config.heatmap.intensity_weight,
                config.heatmap.ratio_weight
            ),
        },
        Err(e) => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        },
    });

    if let Some(path) = blob_path {
        checks.push(match fs::read(path) {
            Ok(bytes) => match blob::parse(&bytes) {
                Ok(parsed) => DoctorCheck {
                    name: "blob".to_string(),
                    status: if parsed.has_checksum() {
                        CheckStatus::Ok
                    } else {
                        CheckStatus::Warning
                    },
                    message: format!(
                        "Blob valid (version {}, {} sections{})",
                        parsed.version(),
                        parsed.section_ids().len(),
                        if parsed.has_checksum() { ", CRC32 verified" } else { ", no checksum" }
                    ),
                },
                Err(e) => DoctorCheck {
                    name: "blob".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Blob unreadable: {}", e),
                },
            },
            Err(e) => DoctorCheck {
                name: "blob".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read blob file: {}", e),
            },
        });
    }

    checks.push(DoctorCheck {
        name: "stdin".to_string(),
        status: CheckStatus::Ok,
        message: if atty::is(atty::Stream::Stdin) {
            "stdin is a TTY (interactive mode)".to_string()
        } else {
            "stdin is a pipe (ready for - inputs)".to_string()
        },
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: FOLIO_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Folio Doctor Report");
        println!("===================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(FolioCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn is_stdio(path: &Path) -> bool {
    path.to_string_lossy() == "-"
}

fn read_text(path: &Path) -> Result<String, FolioCliError> {
    if is_stdio(path) {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, FolioCliError> {
    if is_stdio(path) {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read(path)?)
    }
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), FolioCliError> {
    if is_stdio(path) {
        let mut stdout = io::stdout();
        stdout.write_all(bytes)?;
        stdout.flush()?;
    } else {
        fs::write(path, bytes)?;
    }
    Ok(())
}

// Error types

#[derive(Debug)]
enum FolioCliError {
    Io(io::Error),
    Compute(ComputeError),
    Codec(CodecError),
    Json(serde_json::Error),
    DoctorFailed,
}

impl From<io::Error> for FolioCliError {
    fn from(e: io::Error) -> Self {
        FolioCliError::Io(e)
    }
}

impl From<ComputeError> for FolioCliError {
    fn from(e: ComputeError) -> Self {
        FolioCliError::Compute(e)
    }
}

impl From<CodecError> for FolioCliError {
    fn from(e: CodecError) -> Self {
        FolioCliError::Codec(e)
    }
}

impl From<serde_json::Error> for FolioCliError {
    fn from(e: serde_json::Error) -> Self {
        FolioCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FolioCliError> for CliError {
    fn from(e: FolioCliError) -> Self {
        match e {
            FolioCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FolioCliError::Compute(e) => CliError {
                code: "COMPUTE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the configuration and input records".to_string()),
            },
            FolioCliError::Codec(e) => CliError {
                code: "CODEC_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'folio doctor --blob <file>' to verify the blob".to_string()),
            },
            FolioCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FolioCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct BlobReport {
    version: u8,
    total_bytes: usize,
    checksum: bool,
    sections: Vec<SectionReport>,
}

#[derive(Serialize)]
struct SectionReport {
    id: u8,
    bits_per_value: u8,
    count: u32,
    byte_offset: usize,
    byte_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    values: Option<Vec<u32>>,
}

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("folio-{}-{}", std::process::id(), name));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_invalid_config_loads_for_doctor() {
        let path = write_temp("bad-config.json", r#"{ "baseline": { "window_days": 0 } }"#);
        let config = load_config(Some(&path)).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(config.baseline.window_days, 0);
        assert!(matches!(
            cmd_doctor(&config, None, true),
            Err(FolioCliError::DoctorFailed)
        ));
    }

    #[test]
    fn test_doctor_passes_with_defaults() {
        assert!(cmd_doctor(&MetricsConfig::default(), None, true).is_ok());
    }

    #[test]
    fn test_engine_commands_reject_invalid_config() {
        let mut config = MetricsConfig::default();
        config.baseline.window_days = 1;
        let current = write_temp("current.json", "{}");

        let result = cmd_zscores(config, &current, &current, true);
        fs::remove_file(&current).unwrap();

        assert!(matches!(
            result,
            Err(FolioCliError::Compute(ComputeError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn test_missing_config_file() {
        let path = std::env::temp_dir().join("folio-missing-config.json");
        assert!(matches!(load_config(Some(&path)), Err(FolioCliError::Io(_))));
        assert!(load_config(None).is_ok());
    }
}
