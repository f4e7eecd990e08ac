//! Datalog CLI - Command-line interface for accel-datalog
//!
//! Commands:
//! - record: Replay accelerometer samples through the recorder into session files
//! - decode: Decode a session file back into timed readings
//! - schema: Print the record wire format
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use uuid::Uuid;

use accel_datalog::controller::StatusDisplay;
use accel_datalog::decoder::records_from_bytes;
use accel_datalog::{
    BodyLocation, ControlEvent, DatalogError, DeviceContext, FileTransport, ManualClock,
    RecorderConfig, RecordingStats, ReplayFeed, Sample, SamplingController, SamplingRate,
    StreamDecoder, TimedReading, DATALOG_VERSION, PRODUCER_NAME, RESYNC_PERIOD,
};

/// Datalog - accelerometer logging with periodic timestamp anchors
#[derive(Parser)]
#[command(name = "datalog")]
#[command(version = DATALOG_VERSION)]
#[command(about = "Record and decode accelerometer data logs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay samples through the recorder into a session file
    Record {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Directory receiving session files
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Input format
        #[arg(long, default_value = "csv")]
        input_format: InputFormat,

        /// Recorder configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Body location (e.g. dominant_wrist, chest); sets the session id
        #[arg(long)]
        location: Option<String>,

        /// Session id, used when no location is given
        #[arg(long)]
        session_id: Option<u8>,

        /// Requested sampling rate in Hz (10, 25, 50, 100)
        #[arg(long)]
        rate: Option<u16>,

        /// Samples per batch (1-25)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Flush the session after every N batches
        #[arg(long)]
        flush_every: Option<u64>,

        /// Simulated storage limit per session file, in bytes
        #[arg(long)]
        capacity_bytes: Option<u64>,

        /// Also write the run manifest to this file
        #[arg(long)]
        manifest: Option<PathBuf>,
    },

    /// Decode a session file into timed readings
    Decode {
        /// Session file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Sampling rate the session was recorded at, in Hz
        #[arg(long, default_value = "10")]
        rate: u16,

        /// Output format
        #[arg(long, default_value = "csv")]
        format: DecodeFormat,
    },

    /// Print the record wire format
    Schema {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Check a recorder configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Check that session files can be written here
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// `time,x,y,z` lines; a header line is skipped
    Csv,
    /// Newline-delimited JSON samples
    Ndjson,
}

#[derive(Clone, ValueEnum)]
enum DecodeFormat {
    /// Time(ms),X(mG),Y(mG),Z(mG)
    Csv,
    /// Newline-delimited JSON (one reading per line)
    Ndjson,
    /// Pretty-printed JSON array
    JsonPretty,
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "accel_datalog=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), DatalogCliError> {
    match cli.command {
        Commands::Record {
            input,
            out_dir,
            input_format,
            config,
            location,
            session_id,
            rate,
            batch_size,
            flush_every,
            capacity_bytes,
            manifest,
        } => {
            let config = build_config(config.as_deref(), location, session_id, rate, batch_size)?;
            cmd_record(
                &input,
                &out_dir,
                input_format,
                config,
                flush_every,
                capacity_bytes,
                manifest.as_deref(),
            )
        }

        Commands::Decode {
            input,
            output,
            rate,
            format,
        } => cmd_decode(&input, &output, rate, format),

        Commands::Schema { json } => cmd_schema(json),

        Commands::Doctor {
            config,
            out_dir,
            json,
        } => cmd_doctor(config.as_deref(), &out_dir, json),
    }
}

fn build_config(
    path: Option<&Path>,
    location: Option<String>,
    session_id: Option<u8>,
    rate: Option<u16>,
    batch_size: Option<usize>,
) -> Result<RecorderConfig, DatalogCliError> {
    let mut config = match path {
        Some(path) => RecorderConfig::from_json(&fs::read_to_string(path)?)?,
        None => RecorderConfig::default(),
    };
    if let Some(name) = location {
        config.body_location = Some(parse_location(&name)?);
    }
    if let Some(id) = session_id {
        config.session_id = id;
    }
    if let Some(hz) = rate {
        config.sampling_rate = SamplingRate::try_from(hz)?;
    }
    if let Some(size) = batch_size {
        config.batch_size = size;
    }
    config.validate()?;
    Ok(config)
}

fn parse_location(name: &str) -> Result<BodyLocation, DatalogCliError> {
    serde_json::from_value(serde_json::Value::String(name.to_string()))
        .map_err(|_| DatalogCliError::UnknownLocation(name.to_string()))
}

fn read_input(path: &Path) -> io::Result<Vec<u8>> {
    if path.to_string_lossy() == "-" {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        Ok(buffer)
    } else {
        fs::read(path)
    }
}

fn parse_csv_samples(data: &str) -> Result<Vec<Sample>, DatalogError> {
    let mut samples = Vec::new();
    let mut seen_data = false;
    for (index, line) in data.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let first_data_line = !seen_data;
        seen_data = true;
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 4 {
            return Err(DatalogError::SampleParse(format!(
                "line {line_no}: expected time,x,y,z"
            )));
        }
        let time = match fields[0].parse::<i64>() {
            Ok(time) => time,
            // header
            Err(_) if first_data_line => continue,
            Err(e) => {
                return Err(DatalogError::SampleParse(format!(
                    "line {line_no}: time {:?}: {e}",
                    fields[0]
                )))
            }
        };
        let axis = |i: usize| {
            fields[i].parse::<i16>().map_err(|e| {
                DatalogError::SampleParse(format!("line {line_no}: axis {:?}: {e}", fields[i]))
            })
        };
        samples.push(Sample::new(axis(1)?, axis(2)?, axis(3)?, time));
    }
    Ok(samples)
}

fn parse_ndjson_samples(data: &str) -> Result<Vec<Sample>, DatalogError> {
    data.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(DatalogError::from))
        .collect()
}

/// Mirrors status text into the log instead of a screen
struct LogDisplay;

impl StatusDisplay for LogDisplay {
    fn show_status(&mut self, text: &str) {
        info!(status = %text.replace('\n', " "), "display");
    }
}

#[derive(Serialize)]
struct RunManifest {
    instance_id: Uuid,
    producer: String,
    version: String,
    started_at: String,
    finished_at: String,
    session_id: u8,
    body_location: Option<BodyLocation>,
    output: PathBuf,
    configured_rate_hz: u16,
    effective_rate_hz: Option<u16>,
    samples: usize,
    stats: RecordingStats,
}

fn cmd_record(
    input: &Path,
    out_dir: &Path,
    input_format: InputFormat,
    config: RecorderConfig,
    flush_every: Option<u64>,
    capacity_bytes: Option<u64>,
    manifest_path: Option<&Path>,
) -> Result<(), DatalogCliError> {
    let data = String::from_utf8_lossy(&read_input(input)?).into_owned();
    let samples = match input_format {
        InputFormat::Csv => parse_csv_samples(&data)?,
        InputFormat::Ndjson => parse_ndjson_samples(&data)?,
    };
    let (first_time, last_time) = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => (first.capture_time, last.capture_time),
        _ => return Err(DatalogCliError::NoSamples),
    };
    let sample_total = samples.len();

    let started_at = chrono::Utc::now();
    let mut transport = FileTransport::new(out_dir);
    if let Some(bytes) = capacity_bytes {
        transport = transport.with_capacity_bytes(bytes);
    }
    let clock = ManualClock::new(first_time);
    let device = DeviceContext {
        transport: Box::new(transport),
        feed: Box::new(ReplayFeed::new(samples)),
        display: Box::new(LogDisplay),
        clock: Box::new(clock.clone()),
    };
    let session_id = config.effective_session_id();
    let mut controller = SamplingController::new(config.clone(), device)?;

    controller.handle(ControlEvent::Start)?;
    let mut batches = 0u64;
    while controller.pump().is_some() {
        batches += 1;
        if flush_every.is_some_and(|every| every > 0 && batches % every == 0) {
            controller.handle(ControlEvent::Flush)?;
        }
    }

    let rate = controller.effective_rate().unwrap_or(config.sampling_rate);
    clock.set(last_time + rate.period_ms() as i64);
    controller.handle(ControlEvent::Stop)?;

    let manifest = RunManifest {
        instance_id: controller.run_id(),
        producer: PRODUCER_NAME.to_string(),
        version: DATALOG_VERSION.to_string(),
        started_at: started_at.to_rfc3339(),
        finished_at: chrono::Utc::now().to_rfc3339(),
        session_id,
        body_location: config.body_location,
        output: FileTransport::session_path(out_dir, session_id),
        configured_rate_hz: config.sampling_rate.hz(),
        effective_rate_hz: controller.effective_rate().map(|r| r.hz()),
        samples: sample_total,
        stats: controller.stats(),
    };
    let json = serde_json::to_string_pretty(&manifest)?;
    if let Some(path) = manifest_path {
        fs::write(path, &json)?;
    }
    println!("{json}");
    Ok(())
}

fn cmd_decode(
    input: &Path,
    output: &Path,
    rate: u16,
    format: DecodeFormat,
) -> Result<(), DatalogCliError> {
    let rate = SamplingRate::try_from(rate)?;
    let records = records_from_bytes(&read_input(input)?)?;
    let readings = StreamDecoder::decode_all(&records, rate)?;
    info!(
        records = records.len(),
        readings = readings.len(),
        "session decoded"
    );

    let output_data = format_readings(&readings, &format)?;
    if output.to_string_lossy() == "-" {
        print!("{output_data}");
    } else {
        fs::write(output, output_data)?;
    }
    Ok(())
}

fn format_readings(
    readings: &[TimedReading],
    format: &DecodeFormat,
) -> Result<String, serde_json::Error> {
    match format {
        DecodeFormat::Csv => {
            let mut out = String::from(TimedReading::CSV_HEADER);
            out.push('\n');
            for reading in readings {
                out.push_str(&reading.to_csv());
                out.push('\n');
            }
            Ok(out)
        }
        DecodeFormat::Ndjson => {
            let mut out = String::new();
            for reading in readings {
                out.push_str(&serde_json::to_string(reading)?);
                out.push('\n');
            }
            Ok(out)
        }
        DecodeFormat::JsonPretty => Ok(format!("{}\n", serde_json::to_string_pretty(readings)?)),
    }
}

fn cmd_schema(json: bool) -> Result<(), DatalogCliError> {
    if json {
        let schema = serde_json::json!({
            "record_size": 6,
            "byte_order": "big-endian",
            "tag_bit": "0x80 of byte 0",
            "resync_period": RESYNC_PERIOD,
            "records": {
                "reading": {
                    "tag": 0,
                    "fields": [
                        {"name": "x", "bytes": "0-1", "unit": "mG", "bits": 15},
                        {"name": "y", "bytes": "2-3", "unit": "mG", "bits": 16},
                        {"name": "z", "bytes": "4-5", "unit": "mG", "bits": 16}
                    ]
                },
                "anchor": {
                    "tag": 1,
                    "fields": [
                        {"name": "timestamp_ms", "bytes": "0-5", "bits": 44}
                    ]
                }
            }
        });
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    println!("Record wire format ({} {})", PRODUCER_NAME, DATALOG_VERSION);
    println!();
    println!("Every record is 6 bytes, big-endian. Bit 0x80 of byte 0 is the tag.");
    println!();
    println!("  tag 0  reading  bytes 0-1  X (mG, two's complement, top bit lost to tag)");
    println!("                  bytes 2-3  Y (mG, two's complement)");
    println!("                  bytes 4-5  Z (mG, two's complement)");
    println!("  tag 1  anchor   bytes 0-5  capture time, ms since UNIX epoch (44 bits)");
    println!();
    println!(
        "An anchor precedes sample 0 and every {} samples after it, and one",
        RESYNC_PERIOD
    );
    println!("more closes the session. Reading time = last anchor + offset * 1000 / rate.");
    Ok(())
}

fn cmd_doctor(config: Option<&Path>, out_dir: &Path, json: bool) -> Result<(), DatalogCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} version {}", PRODUCER_NAME, DATALOG_VERSION),
    });

    let config_check = match config {
        Some(path) => match fs::read_to_string(path) {
            Ok(content) => match RecorderConfig::from_json(&content) {
                Ok(config) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Config valid (session {}, {} Hz, batch {})",
                        config.effective_session_id(),
                        config.sampling_rate.hz(),
                        config.batch_size
                    ),
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                },
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read config file: {}", e),
            },
        },
        None => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Warning,
            message: "No config file given; defaults apply".to_string(),
        },
    };
    checks.push(config_check);

    let probe = out_dir.join(format!(".datalog-probe-{}", Uuid::new_v4()));
    let write_check = match fs::create_dir_all(out_dir).and_then(|_| fs::write(&probe, b"")) {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            DoctorCheck {
                name: "out_dir".to_string(),
                status: CheckStatus::Ok,
                message: format!("{} is writable", out_dir.display()),
            }
        }
        Err(e) => DoctorCheck {
            name: "out_dir".to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot write to {}: {}", out_dir.display(), e),
        },
    };
    checks.push(write_check);

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass --input <file>)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (--input - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: DATALOG_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Datalog Doctor Report");
        println!("=====================");
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

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(DatalogCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
enum DatalogCliError {
    Io(io::Error),
    Datalog(DatalogError),
    Json(serde_json::Error),
    UnknownLocation(String),
    NoSamples,
    DoctorFailed,
}

impl From<io::Error> for DatalogCliError {
    fn from(e: io::Error) -> Self {
        DatalogCliError::Io(e)
    }
}

impl From<DatalogError> for DatalogCliError {
    fn from(e: DatalogError) -> Self {
        DatalogCliError::Datalog(e)
    }
}

impl From<serde_json::Error> for DatalogCliError {
    fn from(e: serde_json::Error) -> Self {
        DatalogCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<DatalogCliError> for CliError {
    fn from(e: DatalogCliError) -> Self {
        match e {
            DatalogCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            DatalogCliError::Datalog(e) => {
                let (code, hint) = match &e {
                    DatalogError::InvalidConfig(_) => (
                        "CONFIG_ERROR",
                        "Batch size must be 1-25 and divide the resync period",
                    ),
                    DatalogError::TruncatedStream(_) | DatalogError::StreamOutOfSync(_) => (
                        "STREAM_ERROR",
                        "Session files must hold whole records and start with an anchor",
                    ),
                    DatalogError::SampleParse(_) => (
                        "PARSE_ERROR",
                        "CSV input is time,x,y,z with integer values",
                    ),
                    DatalogError::JsonError(_) => ("JSON_ERROR", "Check JSON syntax"),
                    DatalogError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
                    _ => ("RECORDER_ERROR", "Run 'datalog doctor' for details"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            DatalogCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            DatalogCliError::UnknownLocation(name) => CliError {
                code: "UNKNOWN_LOCATION".to_string(),
                message: format!("Unknown body location '{}'", name),
                hint: Some(format!(
                    "Use one of: {}",
                    BodyLocation::ALL
                        .iter()
                        .filter_map(|l| serde_json::to_value(l).ok())
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
            },
            DatalogCliError::NoSamples => CliError {
                code: "NO_SAMPLES".to_string(),
                message: "No samples found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            DatalogCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor output above".to_string()),
            },
        }
    }
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
    use pretty_assertions::assert_eq;

    #[test]
    fn test_csv_header_after_comment() {
        let samples =
            parse_csv_samples("# recorded on watch\ntime,x,y,z\n100,1,2,3\n").unwrap();
        assert_eq!(samples, vec![Sample::new(1, 2, 3, 100)]);
    }

    #[test]
    fn test_csv_accepts_decoded_output() {
        let data = format!(
            "{}\n 1450000000000,  +12, -980,   +0\n\n1450000000100,1,2,3\n",
            TimedReading::CSV_HEADER
        );
        let samples = parse_csv_samples(&data).unwrap();
        assert_eq!(
            samples,
            vec![
                Sample::new(12, -980, 0, 1_450_000_000_000),
                Sample::new(1, 2, 3, 1_450_000_000_100),
            ]
        );
        assert_eq!(parse_csv_samples("5,1,1,1\n").unwrap().len(), 1);
    }

    #[test]
    fn test_csv_header_only_allowed_first() {
        let err = parse_csv_samples("100,1,2,3\ntime,x,y,z\n").unwrap_err();
        assert!(matches!(err, DatalogError::SampleParse(msg) if msg.starts_with("line 2")));
    }

    #[test]
    fn test_csv_bad_fields() {
        assert!(matches!(
            parse_csv_samples("100,1,2\n"),
            Err(DatalogError::SampleParse(msg)) if msg.contains("expected time,x,y,z")
        ));
        assert!(matches!(
            parse_csv_samples("100,1,40000,3\n"),
            Err(DatalogError::SampleParse(msg)) if msg.starts_with("line 1: axis")
        ));
    }

    #[test]
    fn test_ndjson_samples() {
        let data = "{\"x\":1,\"y\":-2,\"z\":3,\"capture_time\":10}\n\n{\"x\":4,\"y\":5,\"z\":6,\"capture_time\":20}\n";
        assert_eq!(
            parse_ndjson_samples(data).unwrap(),
            vec![Sample::new(1, -2, 3, 10), Sample::new(4, 5, 6, 20)]
        );
        assert!(matches!(
            parse_ndjson_samples("{\"x\":1}"),
            Err(DatalogError::JsonError(_))
        ));
    }
}
