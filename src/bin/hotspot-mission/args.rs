use std::path::PathBuf;

use anyhow::Result;
use clap::value_t_or_exit;
use hotspot::{arg, args_parser, geo::LatLon, opt, MissionConfig};

pub struct Args {
    pub telemetry: PathBuf,
    pub frames: Vec<PathBuf>,
    pub config: MissionConfig,
    pub target: Option<LatLon>,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("hotspot-mission")
            .about("Replay a recorded mission through the perception loop.")
            .arg(opt!("config").short("c").help("Mission config (json)"))
            .arg(
                opt!("telemetry")
                    .short("t")
                    .required(true)
                    .help("Telemetry log, one STAT:..;ALT:..;POS:.. record per line"),
            )
            .arg(
                opt!("target lat")
                    .allow_hyphen_values(true)
                    .requires("target lon")
                    .help("Target latitude for the scan path (default: first reported position)"),
            )
            .arg(
                opt!("target lon")
                    .allow_hyphen_values(true)
                    .requires("target lat")
                    .help("Target longitude for the scan path"),
            )
            .arg(
                arg!("frames")
                    .required(true)
                    .multiple(true)
                    .help("Frame images in capture order (@file reads paths from file)"),
            )
            .get_matches();

        let config = matches
            .value_of("config")
            .map(MissionConfig::from_json_path)
            .transpose()?
            .unwrap_or_default();
        let telemetry = value_t_or_exit!(matches, "telemetry", PathBuf);
        let frames = hotspot::cli::expand_path_args(matches.values_of("frames").unwrap())?;
        let target = matches.is_present("target lat").then(|| {
            LatLon::new(
                value_t_or_exit!(matches, "target lat", f64),
                value_t_or_exit!(matches, "target lon", f64),
            )
        });

        Ok(Args {
            telemetry,
            frames,
            config,
            target,
        })
    }
}
