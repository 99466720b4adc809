#![allow(dead_code)]

use std::{
    cell::RefCell,
    collections::HashMap,
    path::PathBuf,
    rc::Rc,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use testtone::daq::{Daq, DriverError, SampleClock, TaskHandle, VoltageRange};

pub const INJECTED: i32 = -200999;

/// Driver entry points a [`FakeDaq`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CreateTask,
    CreateAo,
    CreateAi,
    Clock,
    Write,
    Start,
    Read,
    Wait,
    Stop,
    Clear,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateTask(TaskHandle),
    CreateAo(TaskHandle, String),
    CreateAi(TaskHandle, String),
    Clock(TaskHandle, SampleClock),
    Write(TaskHandle, Vec<f64>),
    Start(TaskHandle),
    Read(TaskHandle, usize),
    Wait(TaskHandle, Duration),
    Stop(TaskHandle),
    Clear(TaskHandle),
}

pub type CallLog = Rc<RefCell<Vec<Call>>>;

/// Records every driver call and reads back what was last written, scaled by
/// `gain`.
pub struct FakeDaq {
    calls: CallLog,
    counts: HashMap<Op, usize>,
    fail: Option<(Op, usize)>,
    next_handle: usize,
    played: Vec<f64>,
    gain: f64,
    short_by: usize,
    last_error: String,
}

impl FakeDaq {
    pub fn new() -> Self {
        Self {
            calls: Rc::new(RefCell::new(Vec::new())),
            counts: HashMap::new(),
            fail: None,
            next_handle: 0x100,
            played: Vec::new(),
            gain: 1.0,
            short_by: 0,
            last_error: String::new(),
        }
    }

    /// Fails the `occurrence`-th (1-based) call of `op`.
    pub fn fail_on(mut self, op: Op, occurrence: usize) -> Self {
        self.fail = Some((op, occurrence));
        self
    }

    pub fn gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    /// Makes every read return `missing` samples fewer than requested.
    pub fn short_reads(mut self, missing: usize) -> Self {
        self.short_by = missing;
        self
    }

    pub fn log(&self) -> CallLog {
        self.calls.clone()
    }

    fn enter(&mut self, op: Op) -> Result<(), DriverError> {
        let count = self.counts.entry(op).or_insert(0);
        *count += 1;
        if self.fail == Some((op, *count)) {
            self.last_error = format!("injected failure in {:?} #{}", op, count);
            return Err(DriverError { code: INJECTED });
        }
        Ok(())
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl Daq for FakeDaq {
    fn create_task(&mut self) -> Result<TaskHandle, DriverError> {
        self.enter(Op::CreateTask)?;
        self.next_handle += 1;
        let task = TaskHandle::from_raw(self.next_handle);
        self.record(Call::CreateTask(task));
        Ok(task)
    }

    fn create_ao_voltage_chan(
        &mut self,
        task: TaskHandle,
        physical_channel: &str,
        _range: VoltageRange,
    ) -> Result<(), DriverError> {
        self.enter(Op::CreateAo)?;
        self.record(Call::CreateAo(task, physical_channel.to_string()));
        Ok(())
    }

    fn create_ai_voltage_chan(
        &mut self,
        task: TaskHandle,
        physical_channel: &str,
        _range: VoltageRange,
    ) -> Result<(), DriverError> {
        self.enter(Op::CreateAi)?;
        self.record(Call::CreateAi(task, physical_channel.to_string()));
        Ok(())
    }

    fn cfg_samp_clk_timing(
        &mut self,
        task: TaskHandle,
        clock: SampleClock,
    ) -> Result<(), DriverError> {
        self.enter(Op::Clock)?;
        self.record(Call::Clock(task, clock));
        Ok(())
    }

    fn write_analog_f64(
        &mut self,
        task: TaskHandle,
        samples: &[f64],
        _timeout: Duration,
    ) -> Result<usize, DriverError> {
        self.enter(Op::Write)?;
        self.played = samples.to_vec();
        self.record(Call::Write(task, samples.to_vec()));
        Ok(samples.len())
    }

    fn start_task(&mut self, task: TaskHandle) -> Result<(), DriverError> {
        self.enter(Op::Start)?;
        self.record(Call::Start(task));
        Ok(())
    }

    fn read_analog_f64(
        &mut self,
        task: TaskHandle,
        buffer: &mut [f64],
        _timeout: Duration,
    ) -> Result<usize, DriverError> {
        self.enter(Op::Read)?;
        let count = buffer.len().min(self.played.len()).saturating_sub(self.short_by);
        for (slot, value) in buffer.iter_mut().zip(&self.played).take(count) {
            *slot = value * self.gain;
        }
        self.record(Call::Read(task, buffer.len()));
        Ok(count)
    }

    fn wait_until_task_done(
        &mut self,
        task: TaskHandle,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        self.enter(Op::Wait)?;
        self.record(Call::Wait(task, timeout));
        Ok(())
    }

    fn stop_task(&mut self, task: TaskHandle) -> Result<(), DriverError> {
        self.enter(Op::Stop)?;
        self.record(Call::Stop(task));
        Ok(())
    }

    fn clear_task(&mut self, task: TaskHandle) -> Result<(), DriverError> {
        self.enter(Op::Clear)?;
        self.record(Call::Clear(task));
        Ok(())
    }

    fn extended_error_info(&mut self) -> String {
        self.last_error.clone()
    }
}

pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Path in the temp directory that no other test uses.
pub fn scratch_path(name: &str) -> PathBuf {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("testtone-{}-{}-{}", std::process::id(), n, name))
}
