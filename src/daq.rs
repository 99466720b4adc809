//! Interface to the data-acquisition driver.
//!
//! The calls mirror the blocking task API of NI-DAQmx: a task is created, gets
//! a channel and a sample clock, is written or read, and is finally stopped
//! and cleared. [`crate::nidaqmx::NiDaqmx`] talks to the real driver and
//! [`crate::loopback::Loopback`] simulates a device with its output wired to
//! its input.

use std::time::Duration;

/// Status code returned by a failing driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("driver call failed with status {code}")]
pub struct DriverError {
    pub code: i32,
}

/// Opaque driver task handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(usize);

impl TaskHandle {
    pub fn from_raw(raw: usize) -> Self {
        TaskHandle(raw)
    }

    pub fn as_raw(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageRange {
    pub min: f64,
    pub max: f64,
}

impl VoltageRange {
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

impl Default for VoltageRange {
    fn default() -> Self {
        Self {
            min: -10.0,
            max: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockEdge {
    #[default]
    Rising,
    Falling,
}

/// Sample clock of a finite task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleClock {
    pub rate: f64,
    pub edge: ClockEdge,
    /// Number of samples per channel the task produces or consumes.
    pub samples: u64,
}

pub trait Daq {
    fn create_task(&mut self) -> Result<TaskHandle, DriverError>;

    fn create_ao_voltage_chan(
        &mut self,
        task: TaskHandle,
        physical_channel: &str,
        range: VoltageRange,
    ) -> Result<(), DriverError>;

    fn create_ai_voltage_chan(
        &mut self,
        task: TaskHandle,
        physical_channel: &str,
        range: VoltageRange,
    ) -> Result<(), DriverError>;

    fn cfg_samp_clk_timing(
        &mut self,
        task: TaskHandle,
        clock: SampleClock,
    ) -> Result<(), DriverError>;

    /// Writes `samples` into the task's buffer without starting it. Returns
    /// the number of samples written.
    fn write_analog_f64(
        &mut self,
        task: TaskHandle,
        samples: &[f64],
        timeout: Duration,
    ) -> Result<usize, DriverError>;

    fn start_task(&mut self, task: TaskHandle) -> Result<(), DriverError>;

    /// Blocks until every sample of a finite task is read into `buffer` or the
    /// timeout expires. Returns the number of samples read.
    fn read_analog_f64(
        &mut self,
        task: TaskHandle,
        buffer: &mut [f64],
        timeout: Duration,
    ) -> Result<usize, DriverError>;

    fn wait_until_task_done(
        &mut self,
        task: TaskHandle,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    fn stop_task(&mut self, task: TaskHandle) -> Result<(), DriverError>;

    fn clear_task(&mut self, task: TaskHandle) -> Result<(), DriverError>;

    /// Describes the most recent failure in the driver's own words.
    fn extended_error_info(&mut self) -> String;
}
