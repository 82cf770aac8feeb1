mod args;

use anyhow::Result;
use args::Args;

use hotspot::path::PathPlanner;

fn main() -> Result<()> {
    env_logger::init();
    let Args {
        origin,
        search_radius,
        sweep,
    } = Args::from_cmd_line()?;

    let planner = PathPlanner::new(sweep);
    let path = planner.generate_scan_path(origin, search_radius)?;
    eprintln!(
        "{} waypoints, strips {:.1} m apart",
        path.local.len(),
        planner.params.spacing()
    );

    serde_json::to_writer(std::io::stdout().lock(), &path)?;
    Ok(())
}
