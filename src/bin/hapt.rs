//! hapt CLI - offline tooling for haptic alerts
//!
//! Commands:
//! - replay: Feed a recorded sensor-event log through the alert processors
//! - validate: Check waveform or alert-configuration messages
//! - catalog: List vibration patterns

use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use haptic_alerts::catalog::PatternCatalog;
use haptic_alerts::codec::{decode_alert_config, decode_alert_config_list, decode_waveform};
use haptic_alerts::error::{DecodeError, SettingsError};
use haptic_alerts::platform::{LoggingActuator, VibrationActuator};
use haptic_alerts::processor::{fired_alerts, MetricProcessor};
use haptic_alerts::settings::MonitorSettings;
use haptic_alerts::types::{AlertFired, ConfigSnapshot, MetricKind, Millis, SensorEvent};
use haptic_alerts::HAPTIC_VERSION;

/// hapt - offline tooling for watch-side haptic alerts
#[derive(Parser)]
#[command(name = "hapt")]
#[command(version = HAPTIC_VERSION)]
#[command(about = "Replay sensor logs and validate haptic alert messages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay an NDJSON sensor-event log with simulated periodic ticks
    Replay {
        /// Sensor events, one JSON object per line (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// JSON array of alert-configuration messages
        #[arg(short, long)]
        alerts: PathBuf,

        /// Output file for fired alerts as NDJSON (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Monitor settings (TOML)
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Keep ticking until this timestamp (ms) after the last event
        #[arg(long)]
        until: Option<Millis>,

        /// Log the vibration each fired alert would play
        #[arg(long)]
        vibrate: bool,
    },

    /// Validate waveform or alert-configuration messages, one per line
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Message kind
        #[arg(long, value_enum, default_value = "waveform")]
        kind: MessageKind,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the vibration pattern catalog
    Catalog {
        /// Pattern export to load on top of the built-in patterns
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MessageKind {
    /// Waveform-only messages (/vibrate_pattern)
    Waveform,
    /// Alert-configuration messages (/alert_info)
    Alert,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

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

fn run(cli: Cli) -> Result<(), HaptCliError> {
    match cli.command {
        Commands::Replay {
            input,
            alerts,
            output,
            settings,
            until,
            vibrate,
        } => cmd_replay(&input, &alerts, &output, settings.as_deref(), until, vibrate),
        Commands::Validate { input, kind, json } => cmd_validate(&input, kind, json),
        Commands::Catalog { input, json } => cmd_catalog(input.as_deref(), json),
    }
}

fn read_input(path: &Path) -> Result<String, HaptCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

/// One processor plus its simulated tick schedule
struct ReplayLane {
    processor: MetricProcessor,
    tick_millis: Option<u64>,
    next_tick: Option<Millis>,
}

impl ReplayLane {
    /// Run every tick due at or before `until`
    fn tick_until(&mut self, until: Millis, configs: &ConfigSnapshot, out: &mut Vec<AlertFired>) {
        let (Some(period), Some(mut next)) = (self.tick_millis, self.next_tick) else {
            return;
        };
        let period = Millis::try_from(period).unwrap_or(Millis::MAX);
        while next <= until {
            let results = self.processor.on_tick(next, configs);
            out.extend(fired_alerts(&results, next));
            let Some(following) = next.checked_add(period) else {
                self.next_tick = None;
                return;
            };
            next = following;
        }
        self.next_tick = Some(next);
    }
}

fn cmd_replay(
    input: &Path,
    alerts: &Path,
    output: &Path,
    settings_path: Option<&Path>,
    until: Option<Millis>,
    vibrate: bool,
) -> Result<(), HaptCliError> {
    let settings = match settings_path {
        Some(path) => MonitorSettings::load(path)?,
        None => MonitorSettings::default(),
    };

    let (configs, skipped) = decode_alert_config_list(&fs::read_to_string(alerts)?)?;
    if !skipped.is_empty() {
        info!("Skipped {} alert configuration(s)", skipped.len());
    }
    let configs: ConfigSnapshot = configs.into_iter().map(|c| (c.id.clone(), c)).collect();

    let events = parse_events(&read_input(input)?)?;
    let Some(start) = events.first().map(SensorEvent::timestamp_ms) else {
        return Err(HaptCliError::NoEvents);
    };

    let mut lanes: Vec<ReplayLane> = MetricKind::ALL
        .into_iter()
        .filter_map(|kind| {
            let options = settings.for_kind(kind);
            options.enabled.then(|| ReplayLane {
                processor: MetricProcessor::with_options(
                    kind,
                    &options,
                    settings.cooldown_floor_millis(),
                ),
                tick_millis: options.tick_millis,
                next_tick: options
                    .tick_millis
                    .and_then(|t| start.checked_add(Millis::try_from(t).ok()?)),
            })
        })
        .collect();

    let mut fired = Vec::new();
    for event in &events {
        for lane in lanes.iter_mut() {
            lane.tick_until(event.timestamp_ms(), &configs, &mut fired);
            if !lane.processor.kind().accepts(event) {
                continue;
            }
            let results = lane.processor.on_event(event, &configs);
            let at = lane
                .processor
                .last_evaluated_at()
                .unwrap_or(event.timestamp_ms());
            fired.extend(fired_alerts(&results, at));
        }
    }

    let end = until.unwrap_or_else(|| events.last().map_or(start, SensorEvent::timestamp_ms));
    for lane in lanes.iter_mut() {
        lane.tick_until(end, &configs, &mut fired);
    }

    if vibrate {
        play_fired(&LoggingActuator, &configs, &fired);
    }

    let mut output_data = String::new();
    for alert in &fired {
        output_data.push_str(&serde_json::to_string(alert)?);
        output_data.push('\n');
    }

    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        write!(stdout, "{}", output_data)?;
        stdout.flush()?;
    } else {
        fs::write(output, output_data)?;
    }

    info!("Replayed {} events, {} alerts fired", events.len(), fired.len());
    Ok(())
}

/// Play the waveform of every fired alert's channel; returns how many played
fn play_fired(
    actuator: &dyn VibrationActuator,
    configs: &ConfigSnapshot,
    fired: &[AlertFired],
) -> usize {
    let mut played = 0;
    for alert in fired {
        match configs.get(&alert.channel_id) {
            Some(config) if !config.waveform.is_empty() => {
                actuator.play(&config.waveform);
                played += 1;
            }
            _ => info!("No waveform to play for {}", alert.channel_id),
        }
    }
    played
}

fn parse_events(data: &str) -> Result<Vec<SensorEvent>, HaptCliError> {
    let mut events = Vec::new();
    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event = serde_json::from_str(trimmed).map_err(|e| {
            HaptCliError::ParseError(format!("Line {}: {}", line_no + 1, e))
        })?;
        events.push(event);
    }
    Ok(events)
}

fn cmd_validate(input: &Path, kind: MessageKind, json: bool) -> Result<(), HaptCliError> {
    let input_data = read_input(input)?;

    let mut total = 0;
    let mut errors = Vec::new();
    for (index, line) in input_data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        total += 1;
        let result = match kind {
            MessageKind::Waveform => decode_waveform(trimmed.as_bytes()).map(|_| ()),
            MessageKind::Alert => decode_alert_config(trimmed.as_bytes()).map(|_| ()),
        };
        if let Err(e) = result {
            errors.push(ValidationErrorDetail {
                line: index + 1,
                error: e.to_string(),
            });
        }
    }

    let report = ValidationReport {
        total_messages: total,
        valid_messages: total - errors.len(),
        invalid_messages: errors.len(),
        errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total messages:   {}", report.total_messages);
        println!("Valid messages:   {}", report.valid_messages);
        println!("Invalid messages: {}", report.invalid_messages);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Line {}: {}", err.line, err.error);
            }
        }
    }

    if report.invalid_messages > 0 {
        Err(HaptCliError::ValidationFailed(report.invalid_messages))
    } else {
        Ok(())
    }
}

fn cmd_catalog(input: Option<&Path>, json: bool) -> Result<(), HaptCliError> {
    let catalog = match input {
        Some(path) => {
            let (catalog, skipped) = PatternCatalog::from_json(&read_input(path)?)?;
            if skipped > 0 {
                eprintln!("Skipped {} invalid pattern record(s)", skipped);
            }
            catalog
        }
        None => PatternCatalog::builtin(),
    };

    if json {
        println!("{}", catalog.to_json()?);
        return Ok(());
    }

    let summaries: BTreeMap<&str, String> = catalog
        .patterns()
        .map(|p| {
            let mut tags = p.sensation_tags.clone();
            tags.extend(p.metaphors.iter().cloned());
            (
                p.id.as_str(),
                format!(
                    "{} segments, {} ms{}",
                    p.waveform.len(),
                    p.waveform.total_duration_ms(),
                    if tags.is_empty() {
                        String::new()
                    } else {
                        format!(" [{}]", tags.join(", "))
                    }
                ),
            )
        })
        .collect();

    println!("Vibration Patterns");
    println!("==================");
    for (id, summary) in summaries {
        println!("  {:<10} {}", id, summary);
    }
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug)]
enum HaptCliError {
    Io(io::Error),
    Json(serde_json::Error),
    Decode(DecodeError),
    Settings(SettingsError),
    NoEvents,
    ValidationFailed(usize),
    ParseError(String),
}

impl From<io::Error> for HaptCliError {
    fn from(e: io::Error) -> Self {
        HaptCliError::Io(e)
    }
}

impl From<serde_json::Error> for HaptCliError {
    fn from(e: serde_json::Error) -> Self {
        HaptCliError::Json(e)
    }
}

impl From<DecodeError> for HaptCliError {
    fn from(e: DecodeError) -> Self {
        HaptCliError::Decode(e)
    }
}

impl From<SettingsError> for HaptCliError {
    fn from(e: SettingsError) -> Self {
        HaptCliError::Settings(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<HaptCliError> for CliError {
    fn from(e: HaptCliError) -> Self {
        match e {
            HaptCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            HaptCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            HaptCliError::Decode(e) => CliError {
                code: "DECODE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'hapt validate' for per-message details".to_string()),
            },
            HaptCliError::Settings(e) => CliError {
                code: "SETTINGS_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the settings TOML file".to_string()),
            },
            HaptCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No sensor events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            HaptCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} messages failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            HaptCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some(
                    "Each line must be a sensor event such as {\"type\":\"heart_rate\",\"bpm\":72,\"timestamp_ms\":0}"
                        .to_string(),
                ),
            },
        }
    }
}

#[derive(serde::Serialize)]
struct ValidationReport {
    total_messages: usize,
    valid_messages: usize,
    invalid_messages: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    line: usize,
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use haptic_alerts::types::AlertChannelConfig;

    #[test]
    fn test_parse_events_reports_line() {
        let data = "{\"type\":\"step_detected\",\"timestamp_ms\":1}\n\nnot json\n";
        match parse_events(data) {
            Err(HaptCliError::ParseError(msg)) => assert!(msg.starts_with("Line 3")),
            _ => panic!("expected a parse error"),
        }
    }

    #[test]
    fn test_lane_ticks_on_schedule() {
        let config = AlertChannelConfig::for_channel("low_activity", 10.0)
            .unwrap()
            .with_cooldown(60_000);
        let configs: ConfigSnapshot = [(config.id.clone(), config)].into_iter().collect();

        let mut lane = ReplayLane {
            processor: MetricProcessor::new(MetricKind::Activity),
            tick_millis: Some(30_000),
            next_tick: Some(30_000),
        };
        let mut fired = Vec::new();
        lane.tick_until(150_000, &configs, &mut fired);

        // Ticks at 30, 60, ... 150 s; one-minute cooldown lets 30, 90 and 150 fire
        let times: Vec<_> = fired.iter().map(|a| a.timestamp.timestamp_millis()).collect();
        assert_eq!(times, vec![30_000, 90_000, 150_000]);
        assert_eq!(lane.next_tick, Some(180_000));
    }

    #[test]
    fn test_lane_stops_at_end_of_time() {
        let mut lane = ReplayLane {
            processor: MetricProcessor::new(MetricKind::Activity),
            tick_millis: Some(u64::MAX),
            next_tick: Some(Millis::MAX - 10),
        };
        let mut fired = Vec::new();
        lane.tick_until(Millis::MAX, &ConfigSnapshot::new(), &mut fired);
        assert!(fired.is_empty());
        assert_eq!(lane.next_tick, None);
    }

    #[test]
    fn test_play_fired_skips_silent_channels() {
        let loud = AlertChannelConfig::for_channel("low_activity", 10.0).unwrap();
        let mut silent = AlertChannelConfig::for_channel("low_calories", 10.0).unwrap();
        silent.waveform = Default::default();
        let configs: ConfigSnapshot = [loud, silent]
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        let mut fired = Vec::new();
        let mut lane = ReplayLane {
            processor: MetricProcessor::new(MetricKind::Activity),
            tick_millis: Some(30_000),
            next_tick: Some(30_000),
        };
        lane.tick_until(30_000, &configs, &mut fired);
        let mut lane = ReplayLane {
            processor: MetricProcessor::new(MetricKind::Calories),
            tick_millis: Some(30_000),
            next_tick: Some(30_000),
        };
        lane.tick_until(30_000, &configs, &mut fired);

        assert_eq!(fired.len(), 2);
        assert_eq!(play_fired(&LoggingActuator, &configs, &fired), 1);
    }
}
