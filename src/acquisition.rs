use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::RngCore;

use crate::config::AcquisitionConfig;
use crate::device::DeviceChannel;
use crate::error::{Error, Result};
use crate::scope::Oscilloscope;
use crate::trs::{Samples, TraceRecord, TraceStore};
use crate::utils::hex_words;

// Checked between iterations only
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
	pub stored: u32,
	pub attempts: u32,
	pub trigger_retries: u32,
	pub decode_retries: u32,
}

pub struct Acquisition<'a, S: Oscilloscope, T: Read + Write> {
	config: &'a AcquisitionConfig,
	scope: &'a mut S,
	device: &'a mut DeviceChannel<T>,
	store: &'a mut TraceStore,
	cancel: CancelFlag,
}

impl<'a, S: Oscilloscope, T: Read + Write> Acquisition<'a, S, T> {
	pub fn new(config:&'a AcquisitionConfig, scope:&'a mut S, device:&'a mut DeviceChannel<T>, store:&'a mut TraceStore) -> Self {
		Acquisition { config, scope, device, store, cancel: CancelFlag::new() }
	}

	pub fn with_cancel(mut self, cancel:CancelFlag) -> Self {
		self.cancel = cancel;
		self
	}

	// Every session is closed on the way out. Failures come back wrapped in Aborted, except
	// Interrupted which is returned as is
	pub fn run<R: RngCore>(mut self, rng:&mut R) -> Result<RunSummary> {
		let mut summary = RunSummary::default();

		match self.acquire_all(rng, &mut summary) {
			Ok(()) => {
				self.device.close();
				if let Err(e) = self.store.close() {
					self.shutdown();
					return Err(Error::Aborted { iteration: summary.stored, source: Box::new(e) });
				}
				if let Err(e) = self.scope.close() {
					log::warn!("acquisition: closing the scope failed: {}", e);
				}
				log::info!("acquisition: done, {:?}", summary);
				Ok(summary)
			}
			Err(e) => {
				log::error!("acquisition: stopping after {} stored traces: {}", summary.stored, e);
				self.shutdown();
				match e {
					Error::Interrupted { .. } => Err(e),
					e => Err(Error::Aborted { iteration: summary.stored, source: Box::new(e) }),
				}
			}
		}
	}

	fn acquire_all<R: RngCore>(&mut self, rng:&mut R, summary:&mut RunSummary) -> Result<()> {
		self.config.validate()?;
		self.scope.configure(self.config)?;

		let mut consecutive_decode_failures = 0;
		while summary.stored < self.config.trace_count {
			if self.cancel.is_cancelled() {
				return Err(Error::Interrupted { completed: summary.stored });
			}
			summary.attempts += 1;

			match self.acquire_one(rng) {
				Ok(record) => {
					consecutive_decode_failures = 0;
					self.store.append_record(&record)?;
					summary.stored += 1;
					self.report(summary.stored - 1, &record);
				}
				Err(Error::TriggerNotComplete) => {
					summary.trigger_retries += 1;
					log::warn!("acquisition: trace {} discarded, trigger did not complete", summary.stored);
				}
				Err(Error::WaveformDecode(msg)) => {
					summary.decode_retries += 1;
					consecutive_decode_failures += 1;
					if consecutive_decode_failures > self.config.decode_retry_limit {
						return Err(Error::WaveformDecode(format!(
							"{} consecutive failures, last: {}",
							consecutive_decode_failures, msg
						)));
					}
					log::warn!("acquisition: trace {} discarded, {}", summary.stored, msg);
				}
				Err(e) => return Err(e),
			}
		}
		Ok(())
	}

	fn acquire_one<R: RngCore>(&mut self, rng:&mut R) -> Result<TraceRecord> {
		let mut plaintext:Vec<u8> = vec![0u8; self.config.plaintext_length];
		rng.fill_bytes(&mut plaintext);

		self.scope.arm().map_err(|e| Error::InstrumentFailure(Box::new(e)))?;
		let ciphertext:Vec<u8> = self.device.transact(&plaintext)?;

		if !self.scope.poll_trigger_complete(&self.config.trigger_poll)? {
			return Err(Error::TriggerNotComplete);
		}

		let samples:Samples = self.scope.read_waveform(
			self.config.sample_count as usize,
			self.config.sample_encoding,
			&self.config.capture_channel,
		)?;

		Ok(TraceRecord { plaintext, ciphertext, samples, is_encryption: self.config.is_encryption })
	}

	fn report(&self, index:u32, record:&TraceRecord) {
		let interval:u32 = self.config.progress_interval;
		if interval != 0 && index % interval == 0 {
			log::info!(
				"trace {} ({}): plain={} cipher={}",
				index,
				if record.is_encryption { "enc" } else { "dec" },
				hex_words(&record.plaintext),
				hex_words(&record.ciphertext)
			);
		}
	}

	fn shutdown(&mut self) {
		self.device.close();
		if let Err(e) = self.store.close() {
			log::error!("acquisition: closing the trace set failed: {}", e);
		}
		if let Err(e) = self.scope.close() {
			log::error!("acquisition: closing the scope failed: {}", e);
		}
	}
}
