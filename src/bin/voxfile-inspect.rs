//! Developer utility to print the header, index, and first records of any voxfile.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use voxfile::features::FeatureFileReader;
use voxfile::header::{FileKind, read_header};
use voxfile::timeline::TimelineReader;
use voxfile::units::UnitFileReader;

const DEFAULT_LIMIT: usize = 10;

struct CliOptions {
    path: PathBuf,
    limit: usize,
    show_definition: bool,
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
    let _ = voxfile::logging::init(None);
    let file = File::open(&options.path)
        .map_err(|err| format!("Failed to open {}: {err}", options.path.display()))?;
    let kind = read_header(&mut BufReader::new(file)).map_err(|err| err.to_string())?;
    println!("File: {}", options.path.display());
    println!("Kind: {kind}");
    match kind {
        FileKind::Units => print_units(&options),
        FileKind::Features => print_features(&options),
        FileKind::Timeline(_) => print_timeline(&options),
    }
}

fn print_units(options: &CliOptions) -> Result<(), String> {
    let reader = UnitFileReader::open(&options.path).map_err(|err| err.to_string())?;
    println!("Sample rate: {} Hz", reader.sample_rate());
    println!("Units: {}", reader.number_of_units());
    for unit in reader.units().iter().take(options.limit) {
        let marker = if unit.is_null() { " (null)" } else { "" };
        println!(
            "- #{}: start {} duration {}{marker}",
            unit.index, unit.start, unit.duration
        );
    }
    Ok(())
}

fn print_features(options: &CliOptions) -> Result<(), String> {
    let reader = FeatureFileReader::open(&options.path).map_err(|err| err.to_string())?;
    let definition = reader.definition();
    println!(
        "Features: {} byte, {} short, {} continuous",
        definition.number_of_byte_features(),
        definition.number_of_short_features(),
        definition.number_of_continuous_features()
    );
    println!("Vectors: {}", reader.number_of_units());
    if options.show_definition {
        println!();
        print!("{}", definition.to_text_string(true));
    }
    println!();
    println!("{}", definition.feature_names().collect::<Vec<_>>().join(" "));
    for vector in reader.vectors().iter().take(options.limit) {
        let text = vector.to_text(definition).map_err(|err| err.to_string())?;
        println!("{text}");
    }
    Ok(())
}

fn print_timeline(options: &CliOptions) -> Result<(), String> {
    let reader = TimelineReader::open(&options.path).map_err(|err| err.to_string())?;
    println!("Sample rate: {} Hz", reader.sample_rate());
    println!("Frame skip: {} s", reader.frame_skip_seconds());
    println!("Datagrams: {}", reader.num_datagrams());
    println!(
        "Duration: {} samples ({:.3} s)",
        reader.total_duration(),
        reader.total_duration() as f64 / f64::from(reader.sample_rate())
    );
    println!("Data region: {} bytes", reader.index().data_len());
    if !reader.processing_header().is_empty() {
        println!();
        println!("Processing header:");
        for (key, value) in reader.processing_header().iter() {
            println!("  {key}={value}");
        }
    }
    println!();
    println!("Index (first {}):", options.limit);
    for (k, entry) in reader.index().entries().iter().take(options.limit).enumerate() {
        let datagram = reader.datagram(k).map_err(|err| err.to_string())?;
        println!(
            "- #{k}: end {} offset {} duration {} payload {} bytes",
            entry.end_time,
            entry.offset,
            datagram.duration(),
            datagram.data().len()
        );
    }
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<Option<CliOptions>, String> {
    let mut path: Option<PathBuf> = None;
    let mut limit = DEFAULT_LIMIT;
    let mut show_definition = false;
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--limit" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--limit requires a value".to_string())?;
                limit = value
                    .parse()
                    .map_err(|_| format!("Invalid --limit value: {value}"))?;
            }
            "--definition" => show_definition = true,
            unknown if unknown.starts_with('-') => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
            value => {
                if path.is_some() {
                    return Err(format!("Unexpected extra path: {value}"));
                }
                path = Some(PathBuf::from(value));
            }
        }
        idx += 1;
    }

    let Some(path) = path else {
        return Err(format!("A file path is required\n\n{}", help_text()));
    };
    Ok(Some(CliOptions {
        path,
        limit,
        show_definition,
    }))
}

fn help_text() -> String {
    [
        "voxfile-inspect",
        "",
        "Usage:",
        "  voxfile-inspect <file> [--limit N] [--definition]",
        "",
        "Prints the header and the first N records of a unit, feature, or timeline file.",
    ]
    .join("\n")
}
