//! Developer utility to build a waveform timeline and unit file from WAV files.

use std::path::PathBuf;

use tracing::info;
use voxfile::config::{self, TimelineSettings};
use voxfile::timeline::TimelineWriter;
use voxfile::timeline::waveform::{feed_audio, read_mono_wav};
use voxfile::units::write_unit_file;

const DEFAULT_NAME: &str = "waveform";

struct CliOptions {
    settings_path: Option<PathBuf>,
    out_dir: PathBuf,
    name: String,
    log_dir: Option<PathBuf>,
    wavs: Vec<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };
    voxfile::logging::init(options.log_dir.as_deref()).map_err(|err| err.to_string())?;
    let settings = match &options.settings_path {
        Some(path) => config::load_from(path).map_err(|err| err.to_string())?,
        None => TimelineSettings::default(),
    };
    std::fs::create_dir_all(&options.out_dir)
        .map_err(|err| format!("Failed to create {}: {err}", options.out_dir.display()))?;
    let timeline_path = options.out_dir.join(format!("{}.timeline", options.name));
    let units_path = options.out_dir.join(format!("{}.units", options.name));

    let framing = settings.framing();
    let mut writer: Option<TimelineWriter> = None;
    let mut units = Vec::with_capacity(options.wavs.len());
    for (unit_index, wav) in options.wavs.iter().enumerate() {
        let audio = read_mono_wav(wav).map_err(|err| err.to_string())?;
        let active = match writer.take() {
            Some(existing) => writer.insert(existing),
            None => writer.insert(
                TimelineWriter::create(
                    &timeline_path,
                    settings.kind,
                    audio.sample_rate,
                    settings.frame_skip_seconds,
                    settings.processing_header(),
                )
                .map_err(|err| err.to_string())?,
            ),
        };
        let unit = feed_audio(active, &audio, &framing, unit_index)
            .map_err(|err| format!("{}: {err}", wav.display()))?;
        info!(
            "{} -> unit {unit_index} ({} samples)",
            wav.display(),
            unit.duration
        );
        units.push(unit);
    }

    let Some(mut writer) = writer else {
        return Err("No WAV files given".to_string());
    };
    let sample_rate = writer.sample_rate();
    let summary = writer.close().map_err(|err| err.to_string())?;
    write_unit_file(&units_path, sample_rate, &units).map_err(|err| err.to_string())?;
    println!(
        "Timeline: {} ({} datagrams, {} samples)",
        summary.path.display(),
        summary.num_datagrams,
        summary.total_duration
    );
    println!("Units: {} ({} units)", units_path.display(), units.len());
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<Option<CliOptions>, String> {
    let mut settings_path = None;
    let mut out_dir: Option<PathBuf> = None;
    let mut name = DEFAULT_NAME.to_string();
    let mut log_dir = None;
    let mut wavs = Vec::new();
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--settings" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--settings requires a value".to_string())?;
                settings_path = Some(PathBuf::from(value));
            }
            "--out-dir" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--out-dir requires a value".to_string())?;
                out_dir = Some(PathBuf::from(value));
            }
            "--name" => {
                idx += 1;
                name = args
                    .get(idx)
                    .ok_or_else(|| "--name requires a value".to_string())?
                    .clone();
            }
            "--log-dir" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--log-dir requires a value".to_string())?;
                log_dir = Some(PathBuf::from(value));
            }
            unknown if unknown.starts_with('-') => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
            wav => wavs.push(PathBuf::from(wav)),
        }
        idx += 1;
    }

    let Some(out_dir) = out_dir else {
        return Err("--out-dir is required".to_string());
    };
    if wavs.is_empty() {
        return Err(format!("At least one WAV file is required\n\n{}", help_text()));
    }
    Ok(Some(CliOptions {
        settings_path,
        out_dir,
        name,
        log_dir,
        wavs,
    }))
}

fn help_text() -> String {
    [
        "voxfile-wav-timeline",
        "",
        "Usage:",
        "  voxfile-wav-timeline --out-dir <dir> [--settings <timeline.toml>] [--name <base>] [--log-dir <dir>] <wav>...",
        "",
        "Writes <base>.timeline (one datagram per frame) and <base>.units (one unit per WAV).",
    ]
    .join("\n")
}
