use std::{
    fs::File,
    io::{self, BufRead},
    path::{Path, PathBuf},
};

use log::{debug, info, warn};

use crate::samples::{ChannelCount, Samples};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
}

pub fn open(path: &Path) -> Result<File, Error> {
    File::open(path).map_err(|source| Error::Open {
        path: path.to_path_buf(),
        source,
    })
}

/// Parses one row of `channels` comma separated floats.
fn parse_row(line: &str, channels: ChannelCount, row: &mut [f64; 2]) -> Option<()> {
    match channels {
        ChannelCount::One => {
            row[0] = line.trim().parse().ok()?;
        }
        ChannelCount::Two => {
            let (left, right) = line.split_once(',')?;
            row[0] = left.trim().parse().ok()?;
            row[1] = right.trim().parse().ok()?;
        }
    }
    Some(())
}

/// Reads rows until the first one that does not have the declared shape.
///
/// A mismatching row is treated as the end of the input, as is a line that
/// cannot be read at all. Blank lines between rows are skipped.
pub fn load<R: BufRead>(mut reader: R, channels: ChannelCount) -> Samples {
    let mut samples = Samples::new(channels);
    let mut row = [0.0; 2];
    let mut line = String::new();
    let mut line_number = 0;

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => line_number += 1,
            Err(err) => {
                warn!("stopped reading input at line {}: {}", line_number + 1, err);
                break;
            }
        }

        if line.trim().is_empty() {
            continue;
        }

        if parse_row(&line, channels, &mut row).is_none() {
            debug!(
                "line {} is not a {}-column row, treating it as end of input: {:?}",
                line_number,
                channels.count(),
                line.trim_end()
            );
            break;
        }
        samples.push_row(&row[..channels.count()]);
    }

    info!("loaded {} rows of {} channel(s)", samples.rows(), channels.count());
    samples
}
