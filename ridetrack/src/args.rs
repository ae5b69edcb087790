use std::path::{Path, PathBuf};

use clap::{value_parser, Parser};
use ridetrack_core::config::TrackingConfig;
use time::Duration;

/*
 FILES                                   replay each file and log the ride summary
 --xlsx FILES                            ... and write a '.ride.xlsx' next to each file
 --force                                 overwrite existing '.ride.xlsx' files

 FULL SYNTAX
 ===========
 [--force] [--xlsx] [--accuracy=5] [--sprint-speed=35] [--sprint-cooldown=10] \
   [--auto-pause-seconds=15 | --no-auto-pause] FILES
*/

pub fn parse_args() -> Args {
    Args::parse()
}

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(
        short,
        long,
        default_value = "false",
        help = "Overwrite output files even if they already exist"
    )]
    pub force: bool,

    #[arg(
        short,
        long,
        default_value = "false",
        help = "Write a summary spreadsheet in .xlsx format for each ride"
    )]
    pub xlsx: bool,

    #[arg(
        short,
        long,
        default_value = "5.0",
        help = "The horizontal accuracy, in metres, to assume for every trackpoint. \
                GPX files do not record it. Values over 25 reject every point."
    )]
    pub accuracy: f64,

    #[arg(
        long,
        default_value = "35.0",
        help = "Speed, in km/h, above which a Sprint event is recorded"
    )]
    pub sprint_speed: f64,

    #[arg(
        long,
        help = "Record at most one Sprint event every this many seconds. \
                By default every qualifying speed update records one."
    )]
    pub sprint_cooldown: Option<u32>,

    #[arg(
        long,
        default_value = "15",
        help = "How long, in seconds, you must be stationary before the ride is paused automatically",
        value_parser = value_parser!(u32).range(1..=3600)
    )]
    pub auto_pause_seconds: u32,

    #[arg(long, default_value = "false", help = "Never pause the ride automatically")]
    pub no_auto_pause: bool,

    #[arg(
        help = "List of files to process. Any file that does not have a 'gpx' extension will be ignored."
    )]
    pub files: Vec<PathBuf>,
}

impl Args {
    /// The input files, less any that are not GPX.
    pub fn files(&self) -> Vec<PathBuf> {
        self.files.iter().filter(|f| is_gpx_file(f)).cloned().collect()
    }

    /// The tracking parameters, with the defaults overridden by whatever
    /// was given on the command line.
    pub fn tracking_config(&self) -> TrackingConfig {
        let mut config = TrackingConfig::default();
        config.events.sprint_speed_kmh = self.sprint_speed;
        config.events.sprint_cooldown = self.sprint_cooldown.map(|s| Duration::seconds(s.into()));
        config.auto_pause.enabled = !self.no_auto_pause;
        config.auto_pause.pause_after = Duration::seconds(self.auto_pause_seconds.into());
        config
    }
}

fn is_gpx_file(p: &Path) -> bool {
    p.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gpx"))
}

/// Returns the name of the xlsx written for `input_file`, e.g.
/// "morning.gpx" becomes "morning.ride.xlsx".
pub fn make_ride_filename(input_file: &Path) -> PathBuf {
    input_file.with_extension("ride.xlsx")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_gpx_files_are_processed() {
        let args = Args::parse_from(["ridetrack", "a.gpx", "b.GPX", "c.txt", "d"]);
        assert_eq!(
            args.files(),
            vec![PathBuf::from("a.gpx"), PathBuf::from("b.GPX")]
        );
    }

    #[test]
    fn ride_filename() {
        assert_eq!(
            make_ride_filename(Path::new("rides/morning.gpx")),
            PathBuf::from("rides/morning.ride.xlsx")
        );
    }

    #[test]
    fn arguments_override_the_defaults() {
        let args = Args::parse_from([
            "ridetrack",
            "--sprint-speed",
            "45",
            "--sprint-cooldown",
            "30",
            "--auto-pause-seconds",
            "60",
            "a.gpx",
        ]);
        let config = args.tracking_config();
        assert_eq!(config.events.sprint_speed_kmh, 45.0);
        assert_eq!(config.events.sprint_cooldown, Some(Duration::seconds(30)));
        assert_eq!(config.auto_pause.pause_after, Duration::seconds(60));
        assert!(config.auto_pause.enabled);
        assert_eq!(config.gate, TrackingConfig::default().gate);

        let args = Args::parse_from(["ridetrack", "--no-auto-pause", "a.gpx"]);
        assert!(!args.tracking_config().auto_pause.enabled);
    }
}
