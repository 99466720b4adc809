//! Simulated DAQ device with its analog output wired straight to its analog
//! input. Samples are transferred instantly but every timeout is checked
//! against the time the transfer would take on hardware.

use std::{collections::HashMap, time::Duration};

use log::debug;

use crate::daq::{Daq, DriverError, SampleClock, TaskHandle, VoltageRange};

const INVALID_TASK: i32 = -200088;
const INVALID_CHANNEL: i32 = -200170;
const INVALID_VALUE: i32 = -200077;
const TASK_RUNNING: i32 = -200479;
const TASK_NOT_RUNNING: i32 = -200473;
const EMPTY_BUFFER: i32 = -200462;
const READ_TIMEOUT: i32 = -200284;
const WAIT_TIMEOUT: i32 = -200560;

/// Physical limit of the simulated terminals.
const DEVICE_RANGE: VoltageRange = VoltageRange {
    min: -10.0,
    max: 10.0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Output,
    Input,
}

#[derive(Debug, Default)]
struct Task {
    kind: Option<Kind>,
    terminal: String,
    range: VoltageRange,
    clock: Option<SampleClock>,
    buffer: Vec<f64>,
    running: bool,
}

impl Task {
    fn duration(&self) -> Duration {
        match self.clock {
            Some(clock) if clock.rate > 0.0 => {
                Duration::from_secs_f64(clock.samples as f64 / clock.rate)
            }
            _ => Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
pub struct Loopback {
    next_handle: usize,
    tasks: HashMap<TaskHandle, Task>,
    /// Samples currently driven on the output terminal.
    wire: Vec<f64>,
    last_error: String,
}

impl Loopback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks created and not yet cleared.
    pub fn open_tasks(&self) -> usize {
        self.tasks.len()
    }

    fn fail(&mut self, code: i32, message: &str, detail: String) -> DriverError {
        self.last_error = format!("{}\n{}\nStatus Code: {}", message, detail, code);
        debug!("loopback: {}", self.last_error.replace('\n', " | "));
        DriverError { code }
    }

    fn task(&mut self, handle: TaskHandle) -> Result<&mut Task, DriverError> {
        if !self.tasks.contains_key(&handle) {
            return Err(self.fail(
                INVALID_TASK,
                "Task specified is invalid or does not exist.",
                format!("Task Handle: {:#x}", handle.as_raw()),
            ));
        }
        self.tasks
            .get_mut(&handle)
            .ok_or(DriverError { code: INVALID_TASK })
    }

    fn idle_task(&mut self, handle: TaskHandle) -> Result<&mut Task, DriverError> {
        if self.task(handle)?.running {
            return Err(self.fail(
                TASK_RUNNING,
                "Specified operation cannot be performed while the task is running.",
                format!("Task Handle: {:#x}", handle.as_raw()),
            ));
        }
        self.task(handle)
    }

    fn create_chan(
        &mut self,
        task: TaskHandle,
        kind: Kind,
        physical_channel: &str,
        range: VoltageRange,
    ) -> Result<(), DriverError> {
        let prefix = match kind {
            Kind::Output => "ao",
            Kind::Input => "ai",
        };
        let valid = physical_channel
            .split_once('/')
            .and_then(|(device, port)| (!device.is_empty()).then_some(port))
            .and_then(|port| port.strip_prefix(prefix))
            .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()));
        if !valid {
            return Err(self.fail(
                INVALID_CHANNEL,
                "Physical channel specified does not exist on this device.",
                format!("Channel Name: {}", physical_channel),
            ));
        }
        if !(range.min < range.max
            && range.min >= DEVICE_RANGE.min
            && range.max <= DEVICE_RANGE.max)
        {
            return Err(self.fail(
                INVALID_VALUE,
                "Requested value is not a supported value for this property.",
                format!("Requested Range: [{}, {}]", range.min, range.max),
            ));
        }

        let task = self.idle_task(task)?;
        task.kind = Some(kind);
        task.terminal = physical_channel.to_string();
        task.range = range;
        Ok(())
    }

    fn started_task(&mut self, handle: TaskHandle) -> Result<&mut Task, DriverError> {
        if !self.task(handle)?.running {
            return Err(self.fail(
                TASK_NOT_RUNNING,
                "Specified operation cannot be performed when the task is not running.",
                format!("Task Handle: {:#x}", handle.as_raw()),
            ));
        }
        self.task(handle)
    }
}

impl Daq for Loopback {
    fn create_task(&mut self) -> Result<TaskHandle, DriverError> {
        self.next_handle += 1;
        let handle = TaskHandle::from_raw(self.next_handle);
        self.tasks.insert(handle, Task::default());
        Ok(handle)
    }

    fn create_ao_voltage_chan(
        &mut self,
        task: TaskHandle,
        physical_channel: &str,
        range: VoltageRange,
    ) -> Result<(), DriverError> {
        self.create_chan(task, Kind::Output, physical_channel, range)
    }

    fn create_ai_voltage_chan(
        &mut self,
        task: TaskHandle,
        physical_channel: &str,
        range: VoltageRange,
    ) -> Result<(), DriverError> {
        self.create_chan(task, Kind::Input, physical_channel, range)
    }

    fn cfg_samp_clk_timing(
        &mut self,
        task: TaskHandle,
        clock: SampleClock,
    ) -> Result<(), DriverError> {
        if clock.rate.is_nan() || clock.rate <= 0.0 || clock.samples == 0 {
            return Err(self.fail(
                INVALID_VALUE,
                "Requested value is not a supported value for this property.",
                format!("Rate: {}, Samples Per Channel: {}", clock.rate, clock.samples),
            ));
        }
        self.idle_task(task)?.clock = Some(clock);
        Ok(())
    }

    fn write_analog_f64(
        &mut self,
        task: TaskHandle,
        samples: &[f64],
        _timeout: Duration,
    ) -> Result<usize, DriverError> {
        let target = self.idle_task(task)?;
        if target.kind != Some(Kind::Output) || samples.is_empty() {
            return Err(self.fail(
                EMPTY_BUFFER,
                "Generation cannot be started, because the output buffer is empty.",
                format!("Samples Written: {}", samples.len()),
            ));
        }
        target.buffer = samples.to_vec();
        Ok(samples.len())
    }

    fn start_task(&mut self, task: TaskHandle) -> Result<(), DriverError> {
        let target = self.idle_task(task)?;
        if target.kind == Some(Kind::Output) && target.buffer.is_empty() {
            return Err(self.fail(
                EMPTY_BUFFER,
                "Generation cannot be started, because the output buffer is empty.",
                format!("Task Handle: {:#x}", task.as_raw()),
            ));
        }
        target.running = true;
        debug!("loopback: started task on {}", target.terminal);
        let driven = (target.kind == Some(Kind::Output)).then(|| {
            let limit = target.clock.map_or(target.buffer.len(), |c| c.samples as usize);
            let range = target.range;
            target.buffer.iter().take(limit).map(|v| range.clamp(*v)).collect::<Vec<_>>()
        });
        if let Some(wire) = driven {
            self.wire = wire;
        }
        Ok(())
    }

    fn read_analog_f64(
        &mut self,
        task: TaskHandle,
        buffer: &mut [f64],
        timeout: Duration,
    ) -> Result<usize, DriverError> {
        let source_running = self
            .tasks
            .values()
            .any(|t| t.kind == Some(Kind::Output) && t.running);
        let reader = self.started_task(task)?;
        let requested = reader.clock.map_or(buffer.len(), |c| c.samples as usize).min(buffer.len());
        let range = reader.range;
        let duration = reader.duration();
        if !source_running || duration > timeout || self.wire.len() < requested {
            return Err(self.fail(
                READ_TIMEOUT,
                "Some or all of the samples requested have not yet been acquired.",
                format!("Samples Requested: {}, Timeout: {:?}", requested, timeout),
            ));
        }
        for (slot, value) in buffer.iter_mut().zip(&self.wire).take(requested) {
            *slot = range.clamp(*value);
        }
        Ok(requested)
    }

    fn wait_until_task_done(
        &mut self,
        task: TaskHandle,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let duration = self.started_task(task)?.duration();
        if duration > timeout {
            return Err(self.fail(
                WAIT_TIMEOUT,
                "Wait Until Done did not indicate all samples were generated within the timeout.",
                format!("Generation Time: {:?}, Timeout: {:?}", duration, timeout),
            ));
        }
        Ok(())
    }

    fn stop_task(&mut self, task: TaskHandle) -> Result<(), DriverError> {
        let target = self.task(task)?;
        target.running = false;
        if target.kind == Some(Kind::Output) {
            self.wire.clear();
        }
        Ok(())
    }

    fn clear_task(&mut self, task: TaskHandle) -> Result<(), DriverError> {
        self.stop_task(task)?;
        self.tasks.remove(&task);
        Ok(())
    }

    fn extended_error_info(&mut self) -> String {
        self.last_error.clone()
    }
}
