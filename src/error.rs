use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
	#[error("unable to connect to instrument at {address}: {reason}")]
	Connection { address: String, reason: String },

	#[error("device port {port} unavailable: {source}")]
	DeviceUnavailable {
		port: String,
		#[source]
		source: serialport::Error,
	},

	#[error("instrument timed out during `{0}`")]
	Timeout(String),

	#[error("instrument error: {0}")]
	Instrument(String),

	#[error("instrument failed to arm: {0}")]
	InstrumentFailure(#[source] Box<Error>),

	#[error("short read from device: expected {expected} bytes, received {received}")]
	ShortRead { expected: usize, received: usize },

	#[error("trigger did not complete within the poll budget")]
	TriggerNotComplete,

	#[error("malformed waveform: {0}")]
	WaveformDecode(String),

	#[error("unable to create trace set {}: {source}", path.display())]
	StoreCreate {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("trace set write failed: {0}")]
	StoreWrite(#[source] io::Error),

	#[error("trace set read failed: {0}")]
	StoreRead(String),

	#[error("record does not match the trace set layout: {0}")]
	RecordMismatch(String),

	#[error("invalid configuration: {0}")]
	InvalidConfig(String),

	#[error("{0} session is closed")]
	SessionClosed(&'static str),

	#[error("interrupted after {completed} stored traces")]
	Interrupted { completed: u32 },

	#[error("acquisition aborted at trace {iteration}: {source}")]
	Aborted {
		iteration: u32,
		#[source]
		source: Box<Error>,
	},

	#[error("I/O error: {0}")]
	Io(#[from] io::Error),
}

impl Error {
	pub fn is_retriable(&self) -> bool {
		matches!(self, Error::TriggerNotComplete | Error::WaveformDecode(_))
	}

	// Maps an instrument transport error, keeping timeouts distinguishable
	pub(crate) fn from_instrument_io(context:&str, error:io::Error) -> Self {
		match error.kind() {
			io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::Timeout(context.to_owned()),
			_ => Error::Instrument(format!("{}: {}", context, error)),
		}
	}

	pub(crate) fn invalid_config(msg:impl Into<String>) -> Self {
		Error::InvalidConfig(msg.into())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_races_and_decode_failures_are_retried() {
		assert!(Error::TriggerNotComplete.is_retriable());
		assert!(Error::WaveformDecode("short".into()).is_retriable());
		assert!(!Error::ShortRead { expected: 16, received: 3 }.is_retriable());
		assert!(!Error::Timeout("TRMD?".into()).is_retriable());
		assert!(!Error::InstrumentFailure(Box::new(Error::WaveformDecode("x".into()))).is_retriable());
	}

	#[test]
	fn timeouts_survive_the_mapping() {
		let e = Error::from_instrument_io("TRMD?", io::Error::new(io::ErrorKind::TimedOut, "slow"));
		assert!(matches!(e, Error::Timeout(ref cmd) if cmd == "TRMD?"));
		let e = Error::from_instrument_io("TRMD?", io::Error::new(io::ErrorKind::Other, "boom"));
		assert!(matches!(e, Error::Instrument(_)));
	}
}
