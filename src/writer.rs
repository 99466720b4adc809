use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::samples::CapturedBuffer;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot create {path}: {source}")]
    Create { path: PathBuf, source: io::Error },

    #[error("cannot write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

fn write_value<W: Write>(out: &mut W, value: f64, precision: Option<usize>) -> io::Result<()> {
    match precision {
        Some(precision) => write!(out, "{:.*}", precision, value),
        None => write!(out, "{}", value),
    }
}

/// Writes the captured channels as CSV rows, one column per channel.
///
/// Without a `precision` every value is printed in its shortest form that
/// parses back to the same `f64`.
pub fn write<W: Write>(
    mut out: W,
    captured: &[CapturedBuffer],
    precision: Option<usize>,
) -> io::Result<()> {
    let rows = captured.iter().map(CapturedBuffer::len).min().unwrap_or(0);
    for row in 0..rows {
        for (column, channel) in captured.iter().enumerate() {
            if column > 0 {
                out.write_all(b",")?;
            }
            write_value(&mut out, channel.as_slice()[row], precision)?;
        }
        out.write_all(b"\n")?;
    }
    out.flush()
}

pub fn save(
    path: &Path,
    captured: &[CapturedBuffer],
    precision: Option<usize>,
) -> Result<(), Error> {
    let file = File::create(path).map_err(|source| Error::Create {
        path: path.to_path_buf(),
        source,
    })?;
    write(BufWriter::new(file), captured, precision).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("wrote {} channel(s) to {}", captured.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        loader,
        samples::{Channel, ChannelCount},
    };
    use std::io::Cursor;

    fn render(captured: &[CapturedBuffer], precision: Option<usize>) -> String {
        let mut out = Vec::new();
        write(&mut out, captured, precision).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn one_channel_one_value_per_line() {
        let captured = [CapturedBuffer::from(vec![0.5, -1.0, 2.25])];
        assert_eq!(render(&captured, None), "0.5\n-1\n2.25\n");
    }

    #[test]
    fn two_channels_comma_separated() {
        let captured = [
            CapturedBuffer::from(vec![1.0, 3.0]),
            CapturedBuffer::from(vec![2.0, 4.0]),
        ];
        assert_eq!(render(&captured, None), "1,2\n3,4\n");
    }

    #[test]
    fn fixed_precision_matches_printf_lf() {
        let captured = [
            CapturedBuffer::from(vec![0.1234567]),
            CapturedBuffer::from(vec![-2.0]),
        ];
        assert_eq!(render(&captured, Some(6)), "0.123457,-2.000000\n");
    }

    #[test]
    fn output_reloads_to_the_same_values() {
        let left = vec![0.1, -9.999999999, 1.0 / 3.0, 7.5e-9, 0.0];
        let right = vec![std::f64::consts::PI, 10.0, -0.0001, 2.0 / 7.0, -5.0];
        let captured = [
            CapturedBuffer::from(left.clone()),
            CapturedBuffer::from(right.clone()),
        ];
        let text = render(&captured, None);

        let samples = loader::load(Cursor::new(text), ChannelCount::Two);
        assert_eq!(samples.channel(Channel::Left).unwrap().as_slice(), &left[..]);
        assert_eq!(samples.channel(Channel::Right).unwrap().as_slice(), &right[..]);
    }

    #[test]
    fn save_reports_unwritable_destination() {
        let path = std::env::temp_dir()
            .join("testtone-no-such-dir")
            .join("out.csv");
        let err = save(&path, &[CapturedBuffer::zeroed(1)], None).unwrap_err();
        assert!(matches!(err, Error::Create { .. }));
    }
}
