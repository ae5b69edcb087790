use std::{io::Write, path::Path};

use anyhow::Result;
use args::{make_ride_filename, parse_args, Args};
use clap::builder::styling::AnsiColor;
use env_logger::Builder;
use log::{debug, info, warn};
use logging_timer::time;
use ridetrack_core::{
    config::TrackingConfig,
    excel::{create_ride_xlsx, write_ride_xlsx_to_file},
    gpx_reader::read_recording_from_file,
    model::FinishedRide,
    replay::replay_recording,
};

mod args;

pub const PROGRAM_NAME: &str = env!("CARGO_PKG_NAME");

#[time]
fn main() -> Result<()> {
    configure_logging();
    info!("Starting {PROGRAM_NAME}");

    let args = parse_args();
    debug!("{:?}", &args);
    if args.force {
        info!("'--force' specified, all existing output files will be overwritten");
    }

    let input_files = args.files();
    if input_files.is_empty() {
        warn!("No .gpx files specified, exiting");
        return Ok(());
    }

    let config = args.tracking_config();
    debug!("{:?}", &config);

    for f in &input_files {
        process_file(f, &args, &config)?;
    }

    Ok(())
}

fn process_file(input_file: &Path, args: &Args, config: &TrackingConfig) -> Result<()> {
    let xlsx_file = args.xlsx.then(|| make_ride_filename(input_file));

    // Skip any files if the output already exists. It's wasteful to do this
    // work again.
    if let Some(xlsx_file) = &xlsx_file {
        if xlsx_file.exists() && !args.force {
            info!(
                "Skipping {:?} because the output file {:?} already exists",
                input_file, xlsx_file
            );
            return Ok(());
        }
    }

    let recording = read_recording_from_file(input_file, args.accuracy)?;
    if recording.is_empty() {
        warn!("{:?} has no trackpoints, skipping", input_file);
        return Ok(());
    }

    let ride = replay_recording(&recording, config.clone())?;
    log_ride(input_file, &ride);

    if let Some(xlsx_file) = xlsx_file {
        let workbook = create_ride_xlsx(&ride)?;
        write_ride_xlsx_to_file(xlsx_file, workbook)?;
    }

    Ok(())
}

fn log_ride(input_file: &Path, ride: &FinishedRide) {
    let s = &ride.summary;
    info!("Ride summary for {:?}", input_file);
    info!("  Moving time {} (elapsed {}, paused {})", s.moving_time, s.elapsed, s.paused_time);
    info!(
        "  Distance {:.2} km, average {:.1} km/h, max {:.1} km/h",
        s.distance_km, s.average_speed_kmh, s.max_speed_kmh
    );
    info!(
        "  Ascent {:.0}m, descent {:.0}m",
        s.elevation_gain_metres, s.elevation_loss_metres
    );
    if s.max_heart_rate > 0 {
        info!(
            "  Heart rate average {} bpm, max {} bpm",
            s.average_heart_rate, s.max_heart_rate
        );
    }
    for event in &ride.events {
        debug!(
            "  {} {} {}",
            event.time,
            event.event_type,
            event.note.as_deref().unwrap_or_default()
        );
    }
    info!("  {} events", ride.events.len());
}

fn configure_logging() {
    let mut builder = Builder::from_default_env();

    builder.format(|buf, record| {
        let level_style = buf.default_level_style(record.level());
        let level_style = match record.level() {
            log::Level::Error => level_style.fg_color(Some(AnsiColor::Red.into())),
            log::Level::Warn => level_style.fg_color(Some(AnsiColor::Yellow.into())),
            log::Level::Info => level_style.fg_color(Some(AnsiColor::Green.into())),
            log::Level::Debug => level_style.fg_color(Some(AnsiColor::Blue.into())),
            log::Level::Trace => level_style.fg_color(Some(AnsiColor::Magenta.into())),
        };

        let line_number_style = buf
            .default_level_style(record.level())
            .fg_color(Some(AnsiColor::Cyan.into()));

        match (record.file(), record.line()) {
            (Some(file), Some(line)) => writeln!(
                buf,
                "[{} {level_style}{}{level_style:#} {}/{line_number_style}{}{line_number_style:#}] {}",
                buf.timestamp(),
                record.level(),
                file,
                line,
                record.args()
            ),
            (Some(file), None) => writeln!(
                buf,
                "[{} {level_style}{}{level_style:#} {}] {}",
                buf.timestamp(),
                record.level(),
                file,
                record.args()
            ),
            (None, _) => writeln!(
                buf,
                "[{} {level_style}{}{level_style:#}] {}",
                buf.timestamp(),
                record.level(),
                record.args()
            ),
        }
    });

    builder.init();
}
