//! NI-DAQmx driver loaded at runtime.

use std::{
    ffi::{CString, c_char, c_void},
    ptr,
    time::Duration,
};

use libloading::Library;
use log::{debug, warn};

use crate::daq::{ClockEdge, Daq, DriverError, SampleClock, TaskHandle, VoltageRange};

#[cfg(windows)]
const LIBRARY_NAMES: &[&str] = &["nicaiu.dll", "C:\\Windows\\System32\\nicaiu.dll"];
#[cfg(not(windows))]
const LIBRARY_NAMES: &[&str] = &[
    "libnidaqmx.so",
    "libnidaqmx.so.1",
    "/usr/lib/x86_64-linux-gnu/libnidaqmx.so",
];

const VAL_VOLTS: i32 = 10348;
const VAL_CFG_DEFAULT: i32 = -1;
const VAL_RISING: i32 = 10280;
const VAL_FALLING: i32 = 10171;
const VAL_FINITE_SAMPS: i32 = 10178;
const VAL_GROUP_BY_CHANNEL: u32 = 0;
/// Read every sample of a finite task.
const VAL_AUTO: i32 = -1;

/// Reported for arguments the driver cannot be handed at all.
const INVALID_ARGUMENT: i32 = -200077;

type Status = i32;
type RawTask = *mut c_void;

// The driver exports `__CFUNC`, which is `__stdcall` on 32-bit Windows.
type FnCreateTask = unsafe extern "system" fn(*const c_char, *mut RawTask) -> Status;
type FnCreateAoVoltageChan = unsafe extern "system" fn(
    RawTask,
    *const c_char,
    *const c_char,
    f64,
    f64,
    i32,
    *const c_char,
) -> Status;
type FnCreateAiVoltageChan = unsafe extern "system" fn(
    RawTask,
    *const c_char,
    *const c_char,
    i32,
    f64,
    f64,
    i32,
    *const c_char,
) -> Status;
type FnCfgSampClkTiming =
    unsafe extern "system" fn(RawTask, *const c_char, f64, i32, i32, u64) -> Status;
type FnWriteAnalogF64 = unsafe extern "system" fn(
    RawTask,
    i32,
    u32,
    f64,
    u32,
    *const f64,
    *mut i32,
    *mut u32,
) -> Status;
type FnReadAnalogF64 = unsafe extern "system" fn(
    RawTask,
    i32,
    f64,
    u32,
    *mut f64,
    u32,
    *mut i32,
    *mut u32,
) -> Status;
type FnWaitUntilTaskDone = unsafe extern "system" fn(RawTask, f64) -> Status;
type FnTask = unsafe extern "system" fn(RawTask) -> Status;
type FnGetExtendedErrorInfo = unsafe extern "system" fn(*mut c_char, u32) -> Status;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot load the NI-DAQmx library (tried {tried}): {source}")]
    Load {
        tried: String,
        source: libloading::Error,
    },

    #[error("NI-DAQmx library has no symbol {symbol}: {source}")]
    MissingSymbol {
        symbol: &'static str,
        source: libloading::Error,
    },
}

pub struct NiDaqmx {
    create_task: FnCreateTask,
    create_ao_voltage_chan: FnCreateAoVoltageChan,
    create_ai_voltage_chan: FnCreateAiVoltageChan,
    cfg_samp_clk_timing: FnCfgSampClkTiming,
    write_analog_f64: FnWriteAnalogF64,
    read_analog_f64: FnReadAnalogF64,
    wait_until_task_done: FnWaitUntilTaskDone,
    start_task: FnTask,
    stop_task: FnTask,
    clear_task: FnTask,
    get_extended_error_info: FnGetExtendedErrorInfo,
    /// Set when a call is refused before it reaches the driver.
    local_error: Option<String>,
    // keeps the function pointers above valid
    _library: Library,
}

fn symbol<T: Copy>(library: &Library, symbol: &'static str) -> Result<T, Error> {
    let name = format!("{}\0", symbol);
    unsafe { library.get::<T>(name.as_bytes()) }
        .map(|s| *s)
        .map_err(|source| Error::MissingSymbol { symbol, source })
}

impl NiDaqmx {
    pub fn load() -> Result<Self, Error> {
        let mut library = unsafe { Library::new(LIBRARY_NAMES[0]) };
        for name in &LIBRARY_NAMES[1..] {
            if let Err(err) = &library {
                debug!("cannot load NI-DAQmx library: {}", err);
                library = unsafe { Library::new(name) };
            }
        }
        let library = library.map_err(|source| Error::Load {
            tried: LIBRARY_NAMES.join(", "),
            source,
        })?;
        Self::from_library(library)
    }

    fn from_library(library: Library) -> Result<Self, Error> {
        Ok(Self {
            create_task: symbol(&library, "DAQmxCreateTask")?,
            create_ao_voltage_chan: symbol(&library, "DAQmxCreateAOVoltageChan")?,
            create_ai_voltage_chan: symbol(&library, "DAQmxCreateAIVoltageChan")?,
            cfg_samp_clk_timing: symbol(&library, "DAQmxCfgSampClkTiming")?,
            write_analog_f64: symbol(&library, "DAQmxWriteAnalogF64")?,
            read_analog_f64: symbol(&library, "DAQmxReadAnalogF64")?,
            wait_until_task_done: symbol(&library, "DAQmxWaitUntilTaskDone")?,
            start_task: symbol(&library, "DAQmxStartTask")?,
            stop_task: symbol(&library, "DAQmxStopTask")?,
            clear_task: symbol(&library, "DAQmxClearTask")?,
            get_extended_error_info: symbol(&library, "DAQmxGetExtendedErrorInfo")?,
            local_error: None,
            _library: library,
        })
    }

    fn check(&mut self, call: &str, status: Status) -> Result<(), DriverError> {
        if status < 0 {
            self.local_error = None;
            debug!("{} failed with status {}", call, status);
            return Err(DriverError { code: status });
        }
        if status > 0 {
            warn!("{} returned warning {}: {}", call, status, self.driver_error_info());
        }
        Ok(())
    }

    fn refuse(&mut self, message: String) -> DriverError {
        self.local_error = Some(message);
        DriverError {
            code: INVALID_ARGUMENT,
        }
    }

    fn c_string(&mut self, value: &str) -> Result<CString, DriverError> {
        CString::new(value)
            .map_err(|_| self.refuse(format!("name contains a NUL byte: {:?}", value)))
    }

    fn sample_count(&mut self, len: usize) -> Result<i32, DriverError> {
        i32::try_from(len)
            .map_err(|_| self.refuse(format!("{} samples exceed the driver's limit", len)))
    }

    fn driver_error_info(&self) -> String {
        let mut buffer = vec![0 as c_char; 2048];
        unsafe { (self.get_extended_error_info)(buffer.as_mut_ptr(), buffer.len() as u32) };
        let bytes: Vec<u8> = buffer.iter().take_while(|c| **c != 0).map(|c| *c as u8).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn raw(task: TaskHandle) -> RawTask {
    task.as_raw() as RawTask
}

impl Daq for NiDaqmx {
    fn create_task(&mut self) -> Result<TaskHandle, DriverError> {
        let mut task: RawTask = ptr::null_mut();
        let status = unsafe { (self.create_task)(c"".as_ptr(), &mut task) };
        self.check("DAQmxCreateTask", status)?;
        Ok(TaskHandle::from_raw(task as usize))
    }

    fn create_ao_voltage_chan(
        &mut self,
        task: TaskHandle,
        physical_channel: &str,
        range: VoltageRange,
    ) -> Result<(), DriverError> {
        let channel = self.c_string(physical_channel)?;
        let status = unsafe {
            (self.create_ao_voltage_chan)(
                raw(task),
                channel.as_ptr(),
                c"".as_ptr(),
                range.min,
                range.max,
                VAL_VOLTS,
                ptr::null(),
            )
        };
        self.check("DAQmxCreateAOVoltageChan", status)
    }

    fn create_ai_voltage_chan(
        &mut self,
        task: TaskHandle,
        physical_channel: &str,
        range: VoltageRange,
    ) -> Result<(), DriverError> {
        let channel = self.c_string(physical_channel)?;
        let status = unsafe {
            (self.create_ai_voltage_chan)(
                raw(task),
                channel.as_ptr(),
                c"".as_ptr(),
                VAL_CFG_DEFAULT,
                range.min,
                range.max,
                VAL_VOLTS,
                ptr::null(),
            )
        };
        self.check("DAQmxCreateAIVoltageChan", status)
    }

    fn cfg_samp_clk_timing(
        &mut self,
        task: TaskHandle,
        clock: SampleClock,
    ) -> Result<(), DriverError> {
        let edge = match clock.edge {
            ClockEdge::Rising => VAL_RISING,
            ClockEdge::Falling => VAL_FALLING,
        };
        let status = unsafe {
            (self.cfg_samp_clk_timing)(
                raw(task),
                c"".as_ptr(),
                clock.rate,
                edge,
                VAL_FINITE_SAMPS,
                clock.samples,
            )
        };
        self.check("DAQmxCfgSampClkTiming", status)
    }

    fn write_analog_f64(
        &mut self,
        task: TaskHandle,
        samples: &[f64],
        timeout: Duration,
    ) -> Result<usize, DriverError> {
        let count = self.sample_count(samples.len())?;
        let mut written: i32 = 0;
        let status = unsafe {
            (self.write_analog_f64)(
                raw(task),
                count,
                0,
                timeout.as_secs_f64(),
                VAL_GROUP_BY_CHANNEL,
                samples.as_ptr(),
                &mut written,
                ptr::null_mut(),
            )
        };
        self.check("DAQmxWriteAnalogF64", status)?;
        Ok(written.max(0) as usize)
    }

    fn start_task(&mut self, task: TaskHandle) -> Result<(), DriverError> {
        let status = unsafe { (self.start_task)(raw(task)) };
        self.check("DAQmxStartTask", status)
    }

    fn read_analog_f64(
        &mut self,
        task: TaskHandle,
        buffer: &mut [f64],
        timeout: Duration,
    ) -> Result<usize, DriverError> {
        let len = buffer.len();
        let size = u32::try_from(len)
            .map_err(|_| self.refuse(format!("{} samples exceed the driver's limit", len)))?;
        let mut read: i32 = 0;
        let status = unsafe {
            (self.read_analog_f64)(
                raw(task),
                VAL_AUTO,
                timeout.as_secs_f64(),
                VAL_GROUP_BY_CHANNEL,
                buffer.as_mut_ptr(),
                size,
                &mut read,
                ptr::null_mut(),
            )
        };
        self.check("DAQmxReadAnalogF64", status)?;
        Ok(read.max(0) as usize)
    }

    fn wait_until_task_done(
        &mut self,
        task: TaskHandle,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let status = unsafe { (self.wait_until_task_done)(raw(task), timeout.as_secs_f64()) };
        self.check("DAQmxWaitUntilTaskDone", status)
    }

    fn stop_task(&mut self, task: TaskHandle) -> Result<(), DriverError> {
        let status = unsafe { (self.stop_task)(raw(task)) };
        self.check("DAQmxStopTask", status)
    }

    fn clear_task(&mut self, task: TaskHandle) -> Result<(), DriverError> {
        let status = unsafe { (self.clear_task)(raw(task)) };
        self.check("DAQmxClearTask", status)
    }

    fn extended_error_info(&mut self) -> String {
        match self.local_error.take() {
            Some(message) => message,
            None => self.driver_error_info(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "system" fn finished(_task: RawTask, timeout: f64) -> Status {
        if timeout > 0.0 { 0 } else { -200560 }
    }

    unsafe extern "system" fn no_info(buffer: *mut c_char, size: u32) -> Status {
        if size > 0 {
            unsafe { *buffer = 0 };
        }
        0
    }

    #[test]
    fn driver_entry_points_use_the_system_calling_convention() {
        let wait: FnWaitUntilTaskDone = finished;
        let info: FnGetExtendedErrorInfo = no_info;
        let mut buffer = [1 as c_char; 4];
        unsafe {
            assert_eq!(wait(ptr::null_mut(), 20.0), 0);
            assert_eq!(wait(ptr::null_mut(), 0.0), -200560);
            assert_eq!(info(buffer.as_mut_ptr(), buffer.len() as u32), 0);
        }
        assert_eq!(buffer[0], 0);
    }
}
