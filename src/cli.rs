//! Helpers to parse CLI arguments in the accompanying
//! binaries.
//!
//! APIs here shouldn't be considered stable / used as a
//! library.

use std::{
    collections::VecDeque,
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
pub use clap::{App, Arg};
use indicatif::{ProgressBar, ProgressStyle};
pub use inflector::Inflector;
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::frame::Frame;
use crate::telemetry::{parse_record, Telemetry};

#[macro_export]
macro_rules! args_parser {
    ($name:expr) => {{
        $crate::cli::App::new($name)
            .version(clap::crate_version!())
            .author(clap::crate_authors!())
    }};
}

#[macro_export]
macro_rules! arg {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name).value_name(&$name.to_screaming_snake_case())
    }};
}

#[macro_export]
macro_rules! opt {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name)
            .long(&$name.to_kebab_case())
            .value_name(&$name.to_screaming_snake_case())
    }};
}

pub struct FrameInput {
    pub filename: String,
    pub frame: Frame,
}

impl FrameInput {
    fn try_from_image_path(filename: String) -> Result<Self> {
        let frame = Frame::open(Path::new(&filename))?;
        Ok(FrameInput { filename, frame })
    }
}

/// Decode image files in parallel, ticking a progress bar on
/// stderr as each one completes.
pub fn process_paths_par(paths: Vec<String>) -> impl IntoParallelIterator<Item = Result<FrameInput>> {
    let bar = ProgressBar::new(paths.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {wide_bar:cyan/blue} {pos:>7}/{len:7}"),
    );

    paths
        .into_par_iter()
        .map(FrameInput::try_from_image_path)
        .inspect(move |_| bar.inc(1))
}

/// Read a recorded telemetry log, one line-protocol record
/// per line. Blank lines and `#` comments are skipped.
pub fn read_telemetry_log(path: &Path) -> Result<VecDeque<Telemetry>> {
    let file = File::open(path)
        .with_context(|| format!("could not open telemetry log {}", path.display()))?;
    BufReader::new(file)
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            line.as_ref()
                .map(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
                .unwrap_or(true)
        })
        .map(|(i, line)| -> Result<Telemetry> {
            let line = line?;
            parse_record(&line).with_context(|| format!("{}:{}", path.display(), i + 1))
        })
        .collect()
}

/// Expand a list of paths, reading `@list.txt` arguments as
/// one path per line.
pub fn expand_path_args<'a, I: IntoIterator<Item = &'a str>>(args: I) -> Result<Vec<PathBuf>> {
    let mut paths = vec![];
    for arg in args {
        match arg.strip_prefix('@') {
            Some(list) => {
                let file = File::open(list)
                    .with_context(|| format!("could not open path list {}", list))?;
                for line in BufReader::new(file).lines() {
                    let line = line?;
                    if !line.trim().is_empty() {
                        paths.push(PathBuf::from(line.trim()));
                    }
                }
            }
            None => paths.push(PathBuf::from(arg)),
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MissionStatus;
    use std::io::Write;

    #[test]
    fn reads_log_with_comments() {
        let path = std::env::temp_dir().join(format!("hotspot-log-{}.txt", std::process::id()));
        let mut f = File::create(&path).unwrap();
        writeln!(f, "# replay").unwrap();
        writeln!(f, "STAT:0").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "STAT:1;ALT:40;POS:(34,-118)").unwrap();
        drop(f);

        let log = read_telemetry_log(&path).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].status, MissionStatus::EnRoute);
        assert_eq!(log[1].position, Some((34., -118.)));

        let mut f = File::create(&path).unwrap();
        writeln!(f, "STAT:1\nALT:3").unwrap();
        drop(f);
        let err = read_telemetry_log(&path).unwrap_err();
        assert!(format!("{:#}", err).contains(":2"));
        std::fs::remove_file(&path).ok();
    }
}
