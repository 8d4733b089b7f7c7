#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::time::Duration;

use scope_trace::config::AcquisitionConfig;
use scope_trace::device::DeviceChannel;
use scope_trace::{CancelFlag, Error, Oscilloscope, Result, SampleEncoding, Samples, ScopeState};

// What the mock scope does for one arm.
#[derive(Debug, Clone)]
pub enum Sweep {
	// Reports stopped on the given poll (1-based), then returns the waveform.
	StopsAfter(u32),
	// Never reports stopped.
	Never,
	// Stops on the first poll but the waveform read fails to decode.
	Garbled,
}

pub struct MockScope {
	pub waveform: Vec<f64>,
	pub default_sweep: Sweep,
	pub sweeps: VecDeque<Sweep>,
	pub fail_arm_on: Option<u32>,
	// Raised once the waveform of the given arm has been read
	pub cancel_after: Option<(u32, CancelFlag)>,
	pub arms: u32,
	pub polls: u32,
	pub configured: u32,
	pub closes: u32,
	state: ScopeState,
	current: Sweep,
}

impl MockScope {
	pub fn new(waveform:Vec<f64>, default_sweep:Sweep) -> Self {
		MockScope {
			waveform,
			default_sweep: default_sweep.clone(),
			sweeps: VecDeque::new(),
			fail_arm_on: None,
			cancel_after: None,
			arms: 0,
			polls: 0,
			configured: 0,
			closes: 0,
			state: ScopeState::Connected,
			current: default_sweep,
		}
	}

	// Queues sweeps used before falling back to the default.
	pub fn then(mut self, sweep:Sweep) -> Self {
		self.sweeps.push_back(sweep);
		self
	}
}

impl Oscilloscope for MockScope {
	fn configure(&mut self, _config:&AcquisitionConfig) -> Result<()> {
		self.configured += 1;
		self.state = ScopeState::Configured;
		Ok(())
	}

	fn arm(&mut self) -> Result<()> {
		self.arms += 1;
		if self.fail_arm_on == Some(self.arms) {
			return Err(Error::Instrument("arm timed out".to_owned()));
		}
		self.current = self.sweeps.pop_front().unwrap_or_else(|| self.default_sweep.clone());
		self.polls = 0;
		self.state = ScopeState::Armed;
		Ok(())
	}

	fn trigger_stopped(&mut self) -> Result<bool> {
		self.polls += 1;
		let stopped = match self.current {
			Sweep::StopsAfter(n) => self.polls >= n,
			Sweep::Never => false,
			Sweep::Garbled => true,
		};
		if stopped {
			self.state = ScopeState::Configured;
		}
		Ok(stopped)
	}

	fn read_waveform(&mut self, sample_count:usize, encoding:SampleEncoding, _channel:&str) -> Result<Samples> {
		if let Sweep::Garbled = self.current {
			return Err(Error::WaveformDecode("block header missing".to_owned()));
		}
		if let Some((arm, flag)) = &self.cancel_after {
			if *arm == self.arms {
				flag.cancel();
			}
		}
		let values = self.waveform.iter().take(sample_count);
		Ok(match encoding {
			SampleEncoding::ScaledInt16 => Samples::Int16(values.map(|&v| v as i16).collect()),
			SampleEncoding::Float32 => Samples::Float32(values.map(|&v| v as f32).collect()),
		})
	}

	fn state(&self) -> ScopeState {
		self.state
	}

	fn close(&mut self) -> Result<()> {
		self.closes += 1;
		self.state = ScopeState::Disconnected;
		Ok(())
	}
}

// Device transport answering every plaintext with its bitwise complement, truncated to
// `limit` bytes. Every plaintext written is kept in `log`.
pub struct Inverter {
	pub log: Rc<RefCell<Vec<Vec<u8>>>>,
	pending: VecDeque<u8>,
	limit: usize,
}

impl Write for Inverter {
	fn write(&mut self, buf:&[u8]) -> io::Result<usize> {
		self.log.borrow_mut().push(buf.to_vec());
		self.pending.extend(buf.iter().take(self.limit).map(|b| !b));
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

impl Read for Inverter {
	fn read(&mut self, buf:&mut [u8]) -> io::Result<usize> {
		if self.pending.is_empty() {
			return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
		}
		let n = buf.len().min(self.pending.len());
		for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
			*slot = byte;
		}
		Ok(n)
	}
}

pub fn inverting_device(config:&AcquisitionConfig, limit:usize) -> (DeviceChannel<Inverter>, Rc<RefCell<Vec<Vec<u8>>>>) {
	let log = Rc::new(RefCell::new(vec![]));
	let transport = Inverter { log: log.clone(), pending: VecDeque::new(), limit };
	let device = DeviceChannel::new(transport, config.plaintext_length, config.ciphertext_length, Duration::from_millis(20));
	(device, log)
}

// Three traces of eight int16 samples, 16-byte blocks, 18 mV range, fast polling.
pub fn small_config() -> AcquisitionConfig {
	let mut config = AcquisitionConfig::new(3, 8, 1e9, SampleEncoding::ScaledInt16, 0.018, 16, 16);
	config.trigger_poll.attempts = 3;
	config.trigger_poll.interval_ms = 1;
	config.progress_interval = 1;
	config
}

pub fn ramp() -> Vec<f64> {
	(0..8).map(|v| v as f64).collect()
}
