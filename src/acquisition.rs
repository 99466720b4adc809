use std::{fmt::Display, time::Duration};

use log::{debug, info, warn};

use crate::{
    daq::{ClockEdge, Daq, DriverError, SampleClock, TaskHandle, VoltageRange},
    samples::{CapturedBuffer, Channel, ChannelCount, Samples},
};

pub const DEFAULT_DEVICE: &str = "myDAQ1";
pub const DEFAULT_OUTPUT_TERMINAL: &str = "ao0";
pub const DEFAULT_INPUT_TERMINAL: &str = "ai0";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("DAQmx Error: {step} failed{}: {info} ({source})", on_channel(.channel))]
    Device {
        step: Step,
        channel: Option<Channel>,
        source: DriverError,
        info: String,
    },

    #[error("{channel}: {step} stopped after {actual} of {expected} samples")]
    SampleCount {
        channel: Channel,
        step: Step,
        expected: usize,
        actual: usize,
    },

    #[error("configured for {expected} channel(s) but got {actual} buffer(s)")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("capture buffer holds {actual} samples, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

fn on_channel(channel: &Option<Channel>) -> String {
    channel.map(|c| format!(" on {}", c)).unwrap_or_default()
}

/// Driver call an acquisition was executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CreateTask,
    CreateChannel,
    ConfigureClock,
    Write,
    Start,
    Read,
    WaitUntilDone,
    Stop,
}

impl Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Step::CreateTask => "creating task",
            Step::CreateChannel => "creating voltage channel",
            Step::ConfigureClock => "configuring sample clock",
            Step::Write => "writing samples",
            Step::Start => "starting task",
            Step::Read => "reading samples",
            Step::WaitUntilDone => "waiting for output to finish",
            Step::Stop => "stopping task",
        };
        f.write_str(name)
    }
}

/// Progress notifications emitted by [`acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    TasksCreated,
    Started(Channel),
    Acquired { channel: Channel, samples: usize },
    Finished(Channel),
    TasksCleared,
}

#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Samples per second, shared by the output and the input task.
    pub sample_rate: u32,
    pub channels: ChannelCount,
    pub output_terminal: String,
    pub input_terminal: String,
    pub range: VoltageRange,
    pub edge: ClockEdge,
    pub write_timeout: Duration,
    pub read_timeout: Duration,
    /// Deadline for the output task to play all samples.
    pub done_timeout: Duration,
}

impl AcquisitionConfig {
    pub fn new(sample_rate: u32, channels: ChannelCount) -> Self {
        Self {
            sample_rate,
            channels,
            output_terminal: format!("{}/{}", DEFAULT_DEVICE, DEFAULT_OUTPUT_TERMINAL),
            input_terminal: format!("{}/{}", DEFAULT_DEVICE, DEFAULT_INPUT_TERMINAL),
            range: VoltageRange::default(),
            edge: ClockEdge::Rising,
            write_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            done_timeout: Duration::from_secs(20),
        }
    }

    pub fn terminals(mut self, device: &str, output: &str, input: &str) -> Self {
        self.output_terminal = format!("{}/{}", device, output);
        self.input_terminal = format!("{}/{}", device, input);
        self
    }

    fn clock(&self, samples: usize) -> SampleClock {
        SampleClock {
            rate: self.sample_rate as f64,
            edge: self.edge,
            samples: samples as u64,
        }
    }
}

/// Zero-filled capture buffers, one per channel of `samples`.
pub fn capture_buffers(samples: &Samples) -> Vec<CapturedBuffer> {
    (0..samples.channel_count().count())
        .map(|_| CapturedBuffer::zeroed(samples.rows()))
        .collect()
}

/// Output and input task of one run. Tasks still held when the guard goes
/// away are cleared.
struct Sessions<'a, D: Daq + ?Sized> {
    daq: &'a mut D,
    output: Option<TaskHandle>,
    input: Option<TaskHandle>,
}

impl<'a, D: Daq + ?Sized> Sessions<'a, D> {
    fn new(daq: &'a mut D) -> Self {
        Self {
            daq,
            output: None,
            input: None,
        }
    }

    fn device_error(&mut self, step: Step, channel: Option<Channel>, source: DriverError) -> Error {
        let info = self.daq.extended_error_info();
        Error::Device {
            step,
            channel,
            source,
            info,
        }
    }

    fn create(&mut self, config: &AcquisitionConfig) -> Result<(TaskHandle, TaskHandle), Error> {
        let output = self
            .daq
            .create_task()
            .map_err(|e| self.device_error(Step::CreateTask, None, e))?;
        self.output = Some(output);
        self.daq
            .create_ao_voltage_chan(output, &config.output_terminal, config.range)
            .map_err(|e| self.device_error(Step::CreateChannel, None, e))?;
        debug!("output task {:?} on {}", output, config.output_terminal);

        let input = self
            .daq
            .create_task()
            .map_err(|e| self.device_error(Step::CreateTask, None, e))?;
        self.input = Some(input);
        self.daq
            .create_ai_voltage_chan(input, &config.input_terminal, config.range)
            .map_err(|e| self.device_error(Step::CreateChannel, None, e))?;
        debug!("input task {:?} on {}", input, config.input_terminal);

        Ok((output, input))
    }

    /// Plays `samples` on the output task while recording the input task into
    /// `captured`.
    fn play_and_record(
        &mut self,
        (output, input): (TaskHandle, TaskHandle),
        config: &AcquisitionConfig,
        channel: Channel,
        samples: &[f64],
        captured: &mut [f64],
        on_event: &mut impl FnMut(Event),
    ) -> Result<(), Error> {
        let expected = samples.len();
        let clock = config.clock(expected);
        let ch = Some(channel);

        for task in [output, input] {
            self.daq
                .cfg_samp_clk_timing(task, clock)
                .map_err(|e| self.device_error(Step::ConfigureClock, ch, e))?;
        }

        let written = self
            .daq
            .write_analog_f64(output, samples, config.write_timeout)
            .map_err(|e| self.device_error(Step::Write, ch, e))?;
        if written != expected {
            return Err(Error::SampleCount {
                channel,
                step: Step::Write,
                expected,
                actual: written,
            });
        }

        for task in [output, input] {
            self.daq
                .start_task(task)
                .map_err(|e| self.device_error(Step::Start, ch, e))?;
        }
        on_event(Event::Started(channel));

        let read = self
            .daq
            .read_analog_f64(input, captured, config.read_timeout)
            .map_err(|e| self.device_error(Step::Read, ch, e))?;
        if read != expected {
            return Err(Error::SampleCount {
                channel,
                step: Step::Read,
                expected,
                actual: read,
            });
        }
        on_event(Event::Acquired {
            channel,
            samples: read,
        });

        self.daq
            .wait_until_task_done(output, config.done_timeout)
            .map_err(|e| self.device_error(Step::WaitUntilDone, ch, e))?;

        for task in [output, input] {
            self.daq
                .stop_task(task)
                .map_err(|e| self.device_error(Step::Stop, ch, e))?;
        }
        on_event(Event::Finished(channel));
        Ok(())
    }

    /// Clears every task still held, returning how many were cleared.
    fn clear(&mut self) -> usize {
        let mut cleared = 0;
        for task in [self.output.take(), self.input.take()].into_iter().flatten() {
            match self.daq.clear_task(task) {
                Ok(()) => debug!("cleared task {:?}", task),
                Err(err) => warn!(
                    "failed to clear task {:?}: {} ({})",
                    task,
                    err,
                    self.daq.extended_error_info()
                ),
            }
            cleared += 1;
        }
        cleared
    }
}

impl<D: Daq + ?Sized> Drop for Sessions<'_, D> {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Plays every channel of `samples` through the output terminal and records
/// the input terminal into `captured`, one channel after the other.
///
/// Both tasks are created once and reused for every channel. On failure the
/// remaining steps are skipped, the tasks are cleared and `captured` keeps
/// whatever was recorded before the failure.
pub fn acquire<D: Daq + ?Sized>(
    daq: &mut D,
    config: &AcquisitionConfig,
    samples: &Samples,
    captured: &mut [CapturedBuffer],
    mut on_event: impl FnMut(Event),
) -> Result<(), Error> {
    let channels = config.channels.channels();
    for actual in [samples.channel_count().count(), captured.len()] {
        if actual != channels.len() {
            return Err(Error::ChannelMismatch {
                expected: channels.len(),
                actual,
            });
        }
    }
    let rows = samples.rows();
    if let Some(buffer) = captured.iter().find(|b| b.len() != rows) {
        return Err(Error::LengthMismatch {
            expected: rows,
            actual: buffer.len(),
        });
    }

    info!(
        "acquiring {} samples per channel at {} S/s on {} -> {}",
        rows, config.sample_rate, config.output_terminal, config.input_terminal
    );

    let mut sessions = Sessions::new(daq);
    let result = sessions.create(config).and_then(|tasks| {
        on_event(Event::TasksCreated);
        for &channel in channels {
            let Some(played) = samples.channel(channel) else {
                continue;
            };
            sessions.play_and_record(
                tasks,
                config,
                channel,
                played.as_slice(),
                captured[channel.index()].as_mut_slice(),
                &mut on_event,
            )?;
        }
        Ok(())
    });

    if sessions.clear() > 0 {
        on_event(Event::TasksCleared);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::Loopback;
    use std::io::Cursor;

    fn init_test_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn loopback_records_what_was_played() {
        init_test_logging();
        let samples =
            crate::loader::load(Cursor::new("0.5,-1\n1.5,-2\n2.5,-3\n"), ChannelCount::Two);
        let config = AcquisitionConfig::new(1000, ChannelCount::Two);
        let mut captured = capture_buffers(&samples);
        let mut events = Vec::new();

        let mut daq = Loopback::new();
        acquire(&mut daq, &config, &samples, &mut captured, |e| events.push(e)).unwrap();

        assert_eq!(captured[0].as_slice(), &[0.5, 1.5, 2.5]);
        assert_eq!(captured[1].as_slice(), &[-1.0, -2.0, -3.0]);
        assert_eq!(
            events,
            vec![
                Event::TasksCreated,
                Event::Started(Channel::Left),
                Event::Acquired {
                    channel: Channel::Left,
                    samples: 3
                },
                Event::Finished(Channel::Left),
                Event::Started(Channel::Right),
                Event::Acquired {
                    channel: Channel::Right,
                    samples: 3
                },
                Event::Finished(Channel::Right),
                Event::TasksCleared,
            ]
        );
        assert_eq!(daq.open_tasks(), 0);
    }

    #[test]
    fn missing_terminal_surfaces_driver_text() {
        init_test_logging();
        let samples = crate::loader::load(Cursor::new("1\n"), ChannelCount::One);
        let config = AcquisitionConfig::new(100, ChannelCount::One).terminals("myDAQ1", "", "ai0");
        let mut captured = capture_buffers(&samples);

        let mut daq = Loopback::new();
        let err = acquire(&mut daq, &config, &samples, &mut captured, |_| {}).unwrap_err();
        match err {
            Error::Device { step, info, .. } => {
                assert_eq!(step, Step::CreateChannel);
                assert!(info.contains("myDAQ1/"), "{info}");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(daq.open_tasks(), 0);
    }

    #[test]
    fn rejects_capture_buffers_of_the_wrong_shape() {
        let samples = crate::loader::load(Cursor::new("1,2\n"), ChannelCount::Two);
        let config = AcquisitionConfig::new(100, ChannelCount::Two);
        let mut daq = Loopback::new();

        let mut one = vec![CapturedBuffer::zeroed(1)];
        assert!(matches!(
            acquire(&mut daq, &config, &samples, &mut one, |_| {}),
            Err(Error::ChannelMismatch { .. })
        ));

        let mut short = vec![CapturedBuffer::zeroed(1), CapturedBuffer::zeroed(0)];
        assert!(matches!(
            acquire(&mut daq, &config, &samples, &mut short, |_| {}),
            Err(Error::LengthMismatch { .. })
        ));
    }

    #[test]
    fn default_terminals_follow_the_device_name() {
        let config = AcquisitionConfig::new(48600, ChannelCount::One);
        assert_eq!(config.output_terminal, "myDAQ1/ao0");
        assert_eq!(config.input_terminal, "myDAQ1/ai0");
        let config = config.terminals("Dev2", "ao1", "ai3");
        assert_eq!(config.output_terminal, "Dev2/ao1");
        assert_eq!(config.input_terminal, "Dev2/ai3");
    }
}
