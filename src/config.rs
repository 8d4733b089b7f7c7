use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::scope::PollPolicy;

// Raw integer range of a 16-bit sample
pub const INT16_SPAN:f64 = 65536.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleEncoding {
	ScaledInt16,
	Float32,
}

impl SampleEncoding {
	pub fn tag(self) -> u8 {
		match self {
			SampleEncoding::ScaledInt16 => 0,
			SampleEncoding::Float32 => 1,
		}
	}

	pub fn from_tag(tag:u8) -> Option<Self> {
		match tag {
			0 => Some(SampleEncoding::ScaledInt16),
			1 => Some(SampleEncoding::Float32),
			_ => None,
		}
	}

	pub fn bytes_per_sample(self) -> usize {
		match self {
			SampleEncoding::ScaledInt16 => 2,
			SampleEncoding::Float32 => 4,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TriggerSlope {
	#[default]
	Positive,
	Negative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
	pub trace_count: u32,
	pub sample_count: u32,
	pub sample_rate: f64,
	pub sample_encoding: SampleEncoding,
	pub vertical_range: f64,
	#[serde(default)]
	pub vertical_offset: f64,
	// Seconds; negative values capture that long after the trigger
	#[serde(default)]
	pub trigger_delay: f64,
	#[serde(default)]
	pub trigger_level: f64,
	pub plaintext_length: usize,
	pub ciphertext_length: usize,

	#[serde(default = "default_capture_channel")]
	pub capture_channel: String,
	#[serde(default = "default_trigger_channel")]
	pub trigger_channel: String,
	#[serde(default)]
	pub trigger_slope: TriggerSlope,
	// Divisions spanned by the full 16-bit range. The scale of integer samples is
	// `vertical_range / (65536 / full_scale_divisions)`
	#[serde(default = "default_full_scale_divisions")]
	pub full_scale_divisions: f64,
	#[serde(default)]
	pub trigger_poll: PollPolicy,
	#[serde(default = "default_decode_retry_limit")]
	pub decode_retry_limit: u32,
	#[serde(default = "default_progress_interval")]
	pub progress_interval: u32,
	#[serde(default = "default_is_encryption")]
	pub is_encryption: bool,
}

fn default_capture_channel() -> String { "C1".to_owned() }
fn default_trigger_channel() -> String { "C2".to_owned() }
fn default_full_scale_divisions() -> f64 { 10.0 }
fn default_decode_retry_limit() -> u32 { 3 }
fn default_progress_interval() -> u32 { 100 }
fn default_is_encryption() -> bool { true }

impl AcquisitionConfig {
	#[allow(clippy::too_many_arguments)]
	pub fn new(trace_count:u32, sample_count:u32, sample_rate:f64, sample_encoding:SampleEncoding,
		vertical_range:f64, plaintext_length:usize, ciphertext_length:usize) -> Self {

		Self{
			trace_count,
			sample_count,
			sample_rate,
			sample_encoding,
			vertical_range,
			vertical_offset: 0.0,
			trigger_delay: 0.0,
			trigger_level: 0.0,
			plaintext_length,
			ciphertext_length,
			capture_channel: default_capture_channel(),
			trigger_channel: default_trigger_channel(),
			trigger_slope: TriggerSlope::default(),
			full_scale_divisions: default_full_scale_divisions(),
			trigger_poll: PollPolicy::default(),
			decode_retry_limit: default_decode_retry_limit(),
			progress_interval: default_progress_interval(),
			is_encryption: default_is_encryption(),
		}
	}

	pub fn validate(&self) -> Result<()> {
		if self.trace_count == 0 {
			return Err(Error::invalid_config("trace_count must be positive"));
		}
		if self.sample_count == 0 {
			return Err(Error::invalid_config("sample_count must be positive"));
		}
		if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
			return Err(Error::invalid_config("sample_rate must be a positive number of Hz"));
		}
		if !(self.vertical_range.is_finite() && self.vertical_range > 0.0) {
			return Err(Error::invalid_config("vertical_range must be a positive number of V/div"));
		}
		if !(self.full_scale_divisions.is_finite() && self.full_scale_divisions > 0.0) {
			return Err(Error::invalid_config("full_scale_divisions must be positive"));
		}
		if self.plaintext_length == 0 || self.ciphertext_length == 0 {
			return Err(Error::invalid_config("plaintext and ciphertext lengths must be positive"));
		}
		if self.plaintext_length.checked_add(self.ciphertext_length).map_or(true, |n| n > u32::MAX as usize) {
			return Err(Error::invalid_config("plaintext and ciphertext do not fit the trace set header"));
		}
		if self.trigger_poll.attempts == 0 {
			return Err(Error::invalid_config("trigger_poll.attempts must be at least 1"));
		}
		if self.capture_channel.is_empty() || self.trigger_channel.is_empty() {
			return Err(Error::invalid_config("channel names must not be empty"));
		}
		Ok(())
	}

	pub fn sample_interval(&self) -> f64 {
		1.0 / self.sample_rate
	}

	pub fn capture_duration(&self) -> f64 {
		self.sample_interval() * self.sample_count as f64
	}

	// Seconds per division across the ten horizontal divisions
	pub fn timebase(&self) -> f64 {
		self.capture_duration() / 10.0
	}

	// Volts per raw sample unit as recorded in the trace set header
	pub fn amplitude_scale(&self) -> f64 {
		match self.sample_encoding {
			SampleEncoding::ScaledInt16 => self.vertical_range / (INT16_SPAN / self.full_scale_divisions),
			SampleEncoding::Float32 => 1.0,
		}
	}

	pub fn payload_length(&self) -> usize {
		self.plaintext_length + self.ciphertext_length
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backend {
	LeCroy,
	Sds1202x,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
	pub backend: Backend,
	pub address: String,
	#[serde(default = "default_instrument_timeout_ms")]
	pub timeout_ms: u64,
	#[serde(default = "default_connect_attempts")]
	pub connect_attempts: u32,
	#[serde(default = "default_connect_backoff_ms")]
	pub connect_backoff_ms: u64,
}

fn default_instrument_timeout_ms() -> u64 { 5000 }
fn default_connect_attempts() -> u32 { 3 }
fn default_connect_backoff_ms() -> u64 { 1000 }

impl InstrumentConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}

	pub fn connect_backoff(&self) -> Duration {
		Duration::from_millis(self.connect_backoff_ms)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
	pub port: String,
	#[serde(default = "default_baud_rate")]
	pub baud_rate: u32,
	// Must exceed the device's worst-case encryption latency
	#[serde(default = "default_device_timeout_ms")]
	pub read_timeout_ms: u64,
}

fn default_baud_rate() -> u32 { 9600 }
fn default_device_timeout_ms() -> u64 { 2000 }

impl DeviceConfig {
	pub fn read_timeout(&self) -> Duration {
		Duration::from_millis(self.read_timeout_ms)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
	pub acquisition: AcquisitionConfig,
	pub instrument: InstrumentConfig,
	pub device: DeviceConfig,
	pub output: PathBuf,
}

impl ExperimentConfig {
	pub fn load<P: AsRef<Path>>(path:P) -> Result<Self> {
		let path = path.as_ref();
		let text = fs::read_to_string(path)
			.map_err(|e| Error::invalid_config(format!("reading {}: {}", path.display(), e)))?;
		Self::from_json(&text)
	}

	pub fn from_json(text:&str) -> Result<Self> {
		let config:ExperimentConfig = serde_json::from_str(text)
			.map_err(|e| Error::invalid_config(e.to_string()))?;
		config.acquisition.validate()?;
		if config.instrument.connect_attempts == 0 {
			return Err(Error::invalid_config("instrument.connect_attempts must be at least 1"));
		}
		Ok(config)
	}
}
