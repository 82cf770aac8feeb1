use anyhow::Result;
use clap::value_t_or_exit;
use hotspot::{args_parser, geo::LatLon, opt, path::SweepParams, MissionConfig};

pub struct Args {
    pub origin: LatLon,
    pub search_radius: f64,
    pub sweep: SweepParams,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("hotspot-path")
            .about("Plan the search sweep around a target.")
            .arg(opt!("config").short("c").help("Mission config (json)"))
            .arg(
                opt!("lat")
                    .required(true)
                    .allow_hyphen_values(true)
                    .help("Latitude of the target"),
            )
            .arg(
                opt!("lon")
                    .required(true)
                    .allow_hyphen_values(true)
                    .help("Longitude of the target"),
            )
            .arg(
                opt!("radius")
                    .short("r")
                    .help("Half-side of the search square in meters (overrides config)"),
            )
            .arg(
                opt!("altitude")
                    .short("a")
                    .help("Flight altitude; derives the strip width from the camera footprint"),
            )
            .arg(
                opt!("overlap")
                    .help("Overlap between adjacent strips, in [0, 1)"),
            )
            .get_matches();

        let config = matches
            .value_of("config")
            .map(MissionConfig::from_json_path)
            .transpose()?
            .unwrap_or_default();

        let origin = LatLon::new(
            value_t_or_exit!(matches, "lat", f64),
            value_t_or_exit!(matches, "lon", f64),
        );
        let search_radius = matches
            .is_present("radius")
            .then(|| value_t_or_exit!(matches.value_of("radius"), f64))
            .unwrap_or(config.search_radius);

        let mut sweep = config.sweep;
        if matches.is_present("overlap") {
            sweep.overlap = value_t_or_exit!(matches.value_of("overlap"), f64);
        }
        if matches.is_present("altitude") {
            let altitude = value_t_or_exit!(matches.value_of("altitude"), f64);
            sweep = SweepParams {
                max_strips: sweep.max_strips,
                ..SweepParams::from_camera(altitude, config.camera.fov_deg, sweep.overlap)
            };
        }

        Ok(Args {
            origin,
            search_radius,
            sweep,
        })
    }
}
