mod args;

use anyhow::{Context, Result};
use args::Args;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde_derive::*;

use hotspot::{
    cli::process_paths_par,
    detect::detect,
    geo::{GeodeticProjector, LatLon},
    validate::{classify, FrameVerdict},
    HotspotCandidate,
};

#[derive(Serialize, Debug)]
struct FrameReport {
    path: String,
    width: usize,
    height: usize,
    verdict: FrameVerdict,
    candidates: Vec<HotspotCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    geolocated: Option<Vec<LatLon>>,
}

fn main() -> Result<()> {
    env_logger::init();
    let Args {
        paths,
        config,
        pose,
    } = Args::from_cmd_line()?;

    let mut reports = process_paths_par(paths)
        .into_par_iter()
        .map(|input| -> Result<_> {
            let input = input?;
            let frame = &input.frame;
            let verdict = classify(frame, &config.validator);
            let candidates = if verdict.is_valid() {
                detect(frame, &config.detector)
            } else {
                vec![]
            };

            let geolocated = pose
                .map(|pose| -> Result<Vec<_>> {
                    let mut projector = GeodeticProjector::new();
                    candidates
                        .iter()
                        .map(|c| {
                            projector
                                .locate(&pose, c.centroid, frame.width(), frame.height(), config.camera.fov_deg)
                                .with_context(|| format!("could not geolocate {}", input.filename))
                        })
                        .collect()
                })
                .transpose()?;

            Ok(FrameReport {
                width: frame.width(),
                height: frame.height(),
                path: input.filename,
                verdict,
                candidates,
                geolocated,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    reports.sort_by(|a, b| a.path.cmp(&b.path));

    let total: usize = reports.iter().map(|r| r.candidates.len()).sum();
    log::info!("{} candidates in {} frames", total, reports.len());

    serde_json::to_writer(std::io::stdout().lock(), &reports)?;
    Ok(())
}
