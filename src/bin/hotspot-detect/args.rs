use anyhow::Result;
use clap::value_t_or_exit;
use hotspot::{arg, args_parser, geo::Pose, opt, MissionConfig};

pub struct Args {
    pub paths: Vec<String>,
    pub config: MissionConfig,
    pub pose: Option<Pose>,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("hotspot-detect")
            .about("Detect hotspots in thermal frames.")
            .arg(
                opt!("config")
                    .short("c")
                    .help("Mission config (json). Defaults apply to anything not set"),
            )
            .arg(
                opt!("lat")
                    .allow_hyphen_values(true)
                    .requires_all(&["lon", "altitude"])
                    .help("Latitude of the platform; geolocates the hotspots"),
            )
            .arg(
                opt!("lon")
                    .allow_hyphen_values(true)
                    .requires_all(&["lat", "altitude"])
                    .help("Longitude of the platform"),
            )
            .arg(
                opt!("altitude")
                    .short("a")
                    .requires_all(&["lat", "lon"])
                    .help("Altitude above ground in meters"),
            )
            .arg(
                opt!("fov")
                    .short("f")
                    .help("Camera field of view in degrees (overrides config)"),
            )
            .arg(
                arg!("images")
                    .required(true)
                    .multiple(true)
                    .help("Frame image paths (@file reads paths from file)"),
            )
            .get_matches();

        let paths = hotspot::cli::expand_path_args(matches.values_of("images").unwrap())?
            .into_iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();

        let mut config = matches
            .value_of("config")
            .map(MissionConfig::from_json_path)
            .transpose()?
            .unwrap_or_default();
        if matches.is_present("fov") {
            config.camera.fov_deg = value_t_or_exit!(matches.value_of("fov"), f64);
            config.check()?;
        }

        let pose = matches.is_present("lat").then(|| Pose {
            lat: value_t_or_exit!(matches.value_of("lat"), f64),
            lon: value_t_or_exit!(matches.value_of("lon"), f64),
            alt: value_t_or_exit!(matches.value_of("altitude"), f64),
        });

        Ok(Args {
            paths,
            config,
            pose,
        })
    }
}
