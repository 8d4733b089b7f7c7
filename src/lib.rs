
// External data representation, a protocol for serializing data to be sent over the network
pub mod xdr;

// Remote procedure call, a protocol build on top of XDR to provide something like C-style function calls over the network
pub mod rpc;

// A protocol using RPC that's meant to communicate with instruments like oscilloscopes, power supplies, waveform generators, etc
pub mod vxi11;

// Text command channel to an instrument, currently carried over VXI-11
pub mod instrument;

// What an oscilloscope backend has to provide to the acquisition loop
pub mod scope;

// Oscilloscope backends
pub mod devices;

// Serial link to the device under test
pub mod device;

// Trace set files
pub mod trs;

// The acquisition loop tying scope, device and trace set together
pub mod acquisition;

pub mod config;
pub mod error;
pub mod utils;

pub use acquisition::{Acquisition, CancelFlag, RunSummary};
pub use config::{AcquisitionConfig, ExperimentConfig, SampleEncoding};
pub use error::{Error, Result};
pub use scope::{Oscilloscope, PollPolicy, ScopeState};
pub use trs::{Samples, TraceRecord, TraceSetReader, TraceStore};
