use std::{
    io::{self, BufRead, BufReader, Write},
    path::PathBuf,
};

use log::{info, warn};

use crate::{
    acquisition::{
        self, AcquisitionConfig, DEFAULT_DEVICE, DEFAULT_INPUT_TERMINAL, DEFAULT_OUTPUT_TERMINAL,
        Event,
    },
    console::Console,
    daq::Daq,
    loader,
    samples::{self, CapturedBuffer, ChannelCount},
    writer,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("The file does not exist! ({0})")]
    Input(loader::Error),

    #[error("sample rate must be a positive integer, got {0:?}")]
    InvalidRate(String),

    #[error("Channel number not valid: {0}")]
    Channels(samples::Error),

    #[error("the input file holds no rows, nothing to play")]
    EmptyInput,

    #[error("cannot open the DAQ device: {0}")]
    Connect(Box<dyn std::error::Error + Send + Sync>),

    #[error("console error: {0}")]
    Console(io::Error),
}

/// Run parameters given up front. Whatever is missing is asked for.
///
/// Rate and channel count are kept as typed by the user and validated in the
/// same place as interactive answers.
#[derive(Debug, Clone)]
pub struct Options {
    pub input: Option<PathBuf>,
    pub sample_rate: Option<String>,
    pub channels: Option<String>,
    pub output: Option<PathBuf>,
    pub device: String,
    pub output_terminal: String,
    pub input_terminal: String,
    /// Fixed number of decimals in the output file.
    pub precision: Option<usize>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            input: None,
            sample_rate: None,
            channels: None,
            output: None,
            device: DEFAULT_DEVICE.to_string(),
            output_terminal: DEFAULT_OUTPUT_TERMINAL.to_string(),
            input_terminal: DEFAULT_INPUT_TERMINAL.to_string(),
            precision: None,
        }
    }
}

/// Outcome of a run that got as far as the device.
#[derive(Debug)]
pub struct Report {
    pub rows: usize,
    pub captured: Vec<CapturedBuffer>,
    pub device_error: Option<acquisition::Error>,
    pub output: Result<PathBuf, writer::Error>,
}

/// Name used when no output file name is given.
pub fn default_output_name() -> PathBuf {
    PathBuf::from(chrono::Local::now().format("capture-%Y%m%d-%H%M%S.csv").to_string())
}

pub fn parse_rate(answer: &str) -> Result<u32, Error> {
    match answer.trim().parse::<u32>() {
        Ok(rate) if rate > 0 => Ok(rate),
        _ => Err(Error::InvalidRate(answer.trim().to_string())),
    }
}

fn describe(event: Event) -> String {
    match event {
        Event::TasksCreated => "Create tasks .....".to_string(),
        Event::Started(channel) => format!("Start reading {} .....", channel),
        Event::Acquired { samples, .. } => format!("Acquired {} samples.", samples),
        Event::Finished(channel) => format!("Finish reading {} .....", channel),
        Event::TasksCleared => "clear task .....".to_string(),
    }
}

/// Loads the input file, plays and records it on the device returned by
/// `connect` and writes the recording.
///
/// A device error does not end the run: whatever was recorded is still
/// written and the error is returned in the [`Report`].
pub fn run<R, W, D, E>(
    options: &Options,
    console: &mut Console<R, W>,
    connect: impl FnOnce() -> Result<D, E>,
) -> Result<Report, Error>
where
    R: BufRead,
    W: Write,
    D: Daq,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let input = match &options.input {
        Some(path) => path.clone(),
        None => PathBuf::from(console.ask("Enter the name of csv file").map_err(Error::Console)?),
    };
    let file = loader::open(&input).map_err(Error::Input)?;

    let sample_rate = match &options.sample_rate {
        Some(rate) => rate.clone(),
        None => console
            .ask("Enter the play rate of the file (Suggest: 48600)")
            .map_err(Error::Console)?,
    };
    let sample_rate = parse_rate(&sample_rate)?;

    let channels = match &options.channels {
        Some(channels) => channels.clone(),
        None => console
            .ask("Enter the number of channels for this file (1/2)")
            .map_err(Error::Console)?,
    };
    let channels = channels.parse::<ChannelCount>().map_err(Error::Channels)?;

    let samples = loader::load(BufReader::new(file), channels);
    let rows = samples.rows();
    console
        .say(format!("Finish reading file. The number of rows: {}.", rows))
        .map_err(Error::Console)?;
    if rows == 0 {
        return Err(Error::EmptyInput);
    }

    let config = AcquisitionConfig::new(sample_rate, channels).terminals(
        &options.device,
        &options.output_terminal,
        &options.input_terminal,
    );
    let mut daq = connect().map_err(|e| Error::Connect(e.into()))?;

    let mut captured = acquisition::capture_buffers(&samples);
    let result = acquisition::acquire(&mut daq, &config, &samples, &mut captured, |event| {
        if let Err(err) = console.say(describe(event)) {
            warn!("cannot report acquisition progress: {}", err);
        }
    });
    let device_error = result.err();
    if let Some(err) = &device_error {
        console.say(err).map_err(Error::Console)?;
    }

    let output = match &options.output {
        Some(path) => path.clone(),
        None => {
            let answer = console
                .ask("Enter the file name for output data:")
                .map_err(Error::Console)?;
            if answer.trim().is_empty() {
                default_output_name()
            } else {
                PathBuf::from(answer.trim())
            }
        }
    };
    let output = match writer::save(&output, &captured, options.precision) {
        Ok(()) => {
            console
                .say(format!("Finish writing data to {}", output.display()))
                .map_err(Error::Console)?;
            Ok(output)
        }
        Err(err) => {
            console
                .say(format!("Cannot write the file: {}", err))
                .map_err(Error::Console)?;
            Err(err)
        }
    };

    info!("run finished: {} rows, device error: {}", rows, device_error.is_some());
    Ok(Report {
        rows,
        captured,
        device_error,
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_must_be_a_positive_integer() {
        assert_eq!(parse_rate(" 48600\n").unwrap(), 48600);
        for bad in ["0", "-5", "fast", "1.5", ""] {
            assert!(matches!(parse_rate(bad), Err(Error::InvalidRate(_))), "{bad:?}");
        }
    }

    #[test]
    fn default_output_name_is_a_timestamped_csv() {
        let name = default_output_name();
        let name = name.to_str().unwrap();
        assert!(name.starts_with("capture-"));
        assert!(name.ends_with(".csv"));
        assert_eq!(name.len(), "capture-YYYYmmdd-HHMMSS.csv".len());
    }
}
