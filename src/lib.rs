pub mod acquisition;
pub mod console;
pub mod daq;
pub mod loader;
pub mod loopback;
pub mod nidaqmx;
pub mod run;
pub mod samples;
pub mod writer;
