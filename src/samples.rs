use std::{fmt::Display, str::FromStr};

/// Capacity every [`SampleBuffer`] starts with.
pub const INITIAL_CAPACITY: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("channel count must be 1 or 2, got {0:?}")]
    InvalidChannelCount(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCount {
    One = 1,
    Two = 2,
}

impl ChannelCount {
    pub fn channels(self) -> &'static [Channel] {
        match self {
            ChannelCount::One => &[Channel::Left],
            ChannelCount::Two => &[Channel::Left, Channel::Right],
        }
    }

    pub fn count(self) -> usize {
        self as usize
    }
}

impl FromStr for ChannelCount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<i64>() {
            Ok(1) => Ok(ChannelCount::One),
            Ok(2) => Ok(ChannelCount::Two),
            _ => Err(Error::InvalidChannelCount(s.trim().to_string())),
        }
    }
}

/// Column of the input file a signal comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Left,
    Right,
}

impl Channel {
    pub fn index(self) -> usize {
        match self {
            Channel::Left => 0,
            Channel::Right => 1,
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Left => write!(f, "left channel"),
            Channel::Right => write!(f, "right channel"),
        }
    }
}

/// Growable sample storage that doubles its capacity when full.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Vec<f64>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self {
            samples: Vec::with_capacity(INITIAL_CAPACITY),
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.samples.capacity() {
            let grow_by = self.samples.capacity().max(INITIAL_CAPACITY);
            self.samples.reserve_exact(grow_by);
            log::debug!("sample buffer grown to {}", self.samples.capacity());
        }
        self.samples.push(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.samples
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Samples loaded from the input file, one buffer per channel, all of length N.
#[derive(Debug, Clone)]
pub struct Samples {
    buffers: Vec<SampleBuffer>,
}

impl Samples {
    pub fn new(count: ChannelCount) -> Self {
        Self {
            buffers: (0..count.count()).map(|_| SampleBuffer::new()).collect(),
        }
    }

    /// Appends one row. `row` must hold exactly one value per channel.
    pub fn push_row(&mut self, row: &[f64]) {
        debug_assert_eq!(row.len(), self.buffers.len());
        for (buffer, value) in self.buffers.iter_mut().zip(row) {
            buffer.push(*value);
        }
    }

    pub fn channel_count(&self) -> ChannelCount {
        if self.buffers.len() == 2 {
            ChannelCount::Two
        } else {
            ChannelCount::One
        }
    }

    pub fn channel(&self, channel: Channel) -> Option<&SampleBuffer> {
        self.buffers.get(channel.index())
    }

    /// Number of rows (N).
    pub fn rows(&self) -> usize {
        self.buffers.iter().map(SampleBuffer::len).min().unwrap_or(0)
    }
}

/// Zero-filled storage for the samples read back from the input terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedBuffer {
    samples: Vec<f64>,
}

impl CapturedBuffer {
    pub fn zeroed(len: usize) -> Self {
        Self {
            samples: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.samples
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.samples
    }
}

impl From<Vec<f64>> for CapturedBuffer {
    fn from(samples: Vec<f64>) -> Self {
        Self { samples }
    }
}
