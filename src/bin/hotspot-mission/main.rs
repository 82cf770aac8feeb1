mod args;

use anyhow::Result;
use args::Args;
use serde_derive::*;

use hotspot::{
    cli::read_telemetry_log,
    frame::ImageFiles,
    geo::LatLon,
    hotspot::LabeledHotspot,
    mission::{MissionState, MissionStats},
    path::{PathPlanner, ScanPath},
    PerceptionLoop,
};

#[derive(Serialize, Debug)]
struct MissionReport {
    hotspots: Vec<LabeledHotspot>,
    stats: MissionStats,
    history: Vec<MissionState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scan_path: Option<ScanPath>,
}

fn main() -> Result<()> {
    env_logger::init();
    let Args {
        telemetry,
        frames,
        config,
        target,
    } = Args::from_cmd_line()?;

    let mut link = read_telemetry_log(&telemetry)?;
    let target = target.or_else(|| {
        link.iter()
            .find_map(|t| t.position)
            .map(|(lat, lon)| LatLon::new(lat, lon))
    });
    let scan_path = target
        .map(|origin| {
            PathPlanner::new(config.sweep.clone()).generate_scan_path(origin, config.search_radius)
        })
        .transpose()?;

    let mut mission = PerceptionLoop::new(config, ImageFiles::new(frames), Vec::<LabeledHotspot>::new());
    let stats = mission.run(&mut link)?;
    eprintln!(
        "{} ticks, {} detection cycles, {} hotspots",
        stats.ticks, stats.detection_cycles, stats.hotspots_accepted
    );

    let history = mission.history().to_vec();
    serde_json::to_writer(
        std::io::stdout().lock(),
        &MissionReport {
            hotspots: mission.into_sink(),
            stats,
            history,
            scan_path,
        },
    )?;
    Ok(())
}
