use std::str;
use std::thread;
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::config::{AcquisitionConfig, SampleEncoding};
use crate::error::{Error, Result};
use crate::instrument::InstrumentChannel;
use crate::trs::Samples;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
	Disconnected,
	Connected,
	Configured,
	Armed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
	pub attempts: u32,
	pub interval_ms: u64,
}

impl Default for PollPolicy {
	fn default() -> Self {
		PollPolicy { attempts: 10, interval_ms: 500 }
	}
}

impl PollPolicy {
	pub fn interval(&self) -> Duration {
		Duration::from_millis(self.interval_ms)
	}
}

pub trait Oscilloscope {
	fn configure(&mut self, config:&AcquisitionConfig) -> Result<()>;

	fn arm(&mut self) -> Result<()>;

	fn trigger_stopped(&mut self) -> Result<bool>;

	fn read_waveform(&mut self, sample_count:usize, encoding:SampleEncoding, channel:&str) -> Result<Samples>;

	fn state(&self) -> ScopeState;

	fn close(&mut self) -> Result<()>;

	// Sleeps between attempts, not after the last one
	fn poll_trigger_complete(&mut self, policy:&PollPolicy) -> Result<bool> {
		for attempt in 1..=policy.attempts {
			if self.trigger_stopped()? {
				log::debug!("scope: trigger complete after {} poll(s)", attempt);
				return Ok(true);
			}
			if attempt < policy.attempts {
				thread::sleep(policy.interval());
			}
		}
		log::warn!("scope: trigger not complete after {} polls", policy.attempts);
		Ok(false)
	}
}

impl<S: Oscilloscope + ?Sized> Oscilloscope for Box<S> {
	fn configure(&mut self, config:&AcquisitionConfig) -> Result<()> { (**self).configure(config) }
	fn arm(&mut self) -> Result<()> { (**self).arm() }
	fn trigger_stopped(&mut self) -> Result<bool> { (**self).trigger_stopped() }
	fn read_waveform(&mut self, sample_count:usize, encoding:SampleEncoding, channel:&str) -> Result<Samples> {
		(**self).read_waveform(sample_count, encoding, channel)
	}
	fn state(&self) -> ScopeState { (**self).state() }
	fn close(&mut self) -> Result<()> { (**self).close() }
	fn poll_trigger_complete(&mut self, policy:&PollPolicy) -> Result<bool> { (**self).poll_trigger_complete(policy) }
}

pub struct InstrumentSession<C: InstrumentChannel> {
	channel: Option<C>,
	state: ScopeState,
}

impl<C: InstrumentChannel> InstrumentSession<C> {
	pub fn new(channel:C) -> Self {
		InstrumentSession { channel: Some(channel), state: ScopeState::Connected }
	}

	pub fn state(&self) -> ScopeState {
		self.state
	}

	pub fn set_state(&mut self, state:ScopeState) {
		if self.state != state {
			log::debug!("scope: {:?} -> {:?}", self.state, state);
			self.state = state;
		}
	}

	pub fn channel(&mut self) -> Result<&mut C> {
		self.channel.as_mut().ok_or(Error::SessionClosed("instrument"))
	}

	pub fn require(&self, operation:&str, allowed:&[ScopeState]) -> Result<()> {
		if allowed.contains(&self.state) {
			Ok(())
		} else if self.state == ScopeState::Disconnected {
			Err(Error::SessionClosed("instrument"))
		} else {
			Err(Error::Instrument(format!("cannot {} while {:?}", operation, self.state)))
		}
	}

	pub fn close(&mut self) -> Result<()> {
		self.state = ScopeState::Disconnected;
		match self.channel.take() {
			Some(mut channel) => channel.close(),
			None => Ok(()),
		}
	}
}

// IEEE 488.2 definite-length block: '#', one digit giving the width of the length field, the
// byte count, then the bytes. Anything before the '#' is a command echo such as `C1:WF DAT1,`
pub fn parse_definite_block(raw:&[u8]) -> Result<&[u8]> {
	let hash = raw.iter().position(|&b| b == b'#')
		.ok_or_else(|| Error::WaveformDecode("no block marker in response".to_owned()))?;

	let width = raw.get(hash + 1)
		.and_then(|b| (*b as char).to_digit(10))
		.ok_or_else(|| Error::WaveformDecode("block marker is not followed by a digit".to_owned()))? as usize;
	if width == 0 {
		return Err(Error::WaveformDecode("indefinite-length blocks are not supported".to_owned()));
	}

	let len_start = hash + 2;
	let len_field = raw.get(len_start..len_start + width)
		.ok_or_else(|| Error::WaveformDecode("block length field is truncated".to_owned()))?;
	let length:usize = str::from_utf8(len_field).ok()
		.and_then(|s| s.parse().ok())
		.ok_or_else(|| Error::WaveformDecode(format!("block length {:?} is not a decimal number", len_field)))?;

	let data_start = len_start + width;
	raw.get(data_start..data_start + length).ok_or_else(|| {
		Error::WaveformDecode(format!(
			"block declares {} bytes but only {} arrived",
			length,
			raw.len().saturating_sub(data_start)
		))
	})
}

pub fn decode_int16_samples(payload:&[u8], count:usize) -> Result<Vec<i16>> {
	let needed = count * 2;
	if payload.len() < needed {
		return Err(Error::WaveformDecode(format!(
			"expected {} samples, block holds {}",
			count,
			payload.len() / 2
		)));
	}
	let mut samples = vec![0i16; count];
	LittleEndian::read_i16_into(&payload[..needed], &mut samples);
	Ok(samples)
}

// Decodes `count` whitespace-separated values from a text waveform dump. The first line
// (the dump's header) is skipped and quote characters around the data are ignored
pub fn decode_float_text(raw:&[u8], count:usize) -> Result<Vec<f32>> {
	let text = str::from_utf8(raw)
		.map_err(|_| Error::WaveformDecode("text waveform is not UTF-8".to_owned()))?;
	let body = match text.find('\n') {
		Some(newline) => &text[newline + 1..],
		None => text,
	};

	let mut samples = Vec::with_capacity(count);
	for token in body.split_whitespace().map(|t| t.trim_matches('"')).filter(|t| !t.is_empty()) {
		if samples.len() == count {
			break;
		}
		match token.parse::<f32>() {
			Ok(value) => samples.push(value),
			Err(_) => break,
		}
	}

	if samples.len() != count {
		return Err(Error::WaveformDecode(format!("expected {} samples, text holds {}", count, samples.len())));
	}
	Ok(samples)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn definite_block_skips_echo_and_trailer() {
		let raw = b"C1:WF DAT1,#14\x01\x00\x02\x00\n";
		assert_eq!(parse_definite_block(raw).unwrap(), &[1, 0, 2, 0]);
	}

	#[test]
	fn definite_block_with_wide_length_field() {
		let mut raw = b"#9000000006".to_vec();
		raw.extend_from_slice(&[1, 2, 3, 4, 5, 6, b'\n']);
		assert_eq!(parse_definite_block(&raw).unwrap(), &[1, 2, 3, 4, 5, 6]);
	}

	#[test]
	fn truncated_block_is_a_decode_error() {
		let err = parse_definite_block(b"#210\x01\x02").unwrap_err();
		assert!(matches!(err, Error::WaveformDecode(_)));
		assert!(matches!(parse_definite_block(b"no marker"), Err(Error::WaveformDecode(_))));
		assert!(matches!(parse_definite_block(b"#x12"), Err(Error::WaveformDecode(_))));
	}

	#[test]
	fn int16_samples_are_little_endian_and_exact() {
		let payload = [0x01, 0x00, 0xff, 0xff, 0x00, 0x80, 0x34, 0x12];
		assert_eq!(decode_int16_samples(&payload, 3).unwrap(), vec![1, -1, i16::MIN]);
		assert!(matches!(decode_int16_samples(&payload, 5), Err(Error::WaveformDecode(_))));
	}

	#[test]
	fn float_text_skips_header_line() {
		let raw = b"C1:INSP \"\n  1.5e-3  -2.0e-3 \n 4.0e-3 \"\n";
		assert_eq!(decode_float_text(raw, 3).unwrap(), vec![1.5e-3, -2.0e-3, 4.0e-3]);
		assert_eq!(decode_float_text(raw, 2).unwrap(), vec![1.5e-3, -2.0e-3]);
		assert!(matches!(decode_float_text(raw, 4), Err(Error::WaveformDecode(_))));
	}

	struct Countdown {
		remaining: u32,
		polls: u32,
	}

	impl Oscilloscope for Countdown {
		fn configure(&mut self, _:&AcquisitionConfig) -> Result<()> { Ok(()) }
		fn arm(&mut self) -> Result<()> { Ok(()) }
		fn trigger_stopped(&mut self) -> Result<bool> {
			self.polls += 1;
			if self.remaining == 0 {
				return Ok(true);
			}
			self.remaining -= 1;
			Ok(false)
		}
		fn read_waveform(&mut self, _:usize, _:SampleEncoding, _:&str) -> Result<Samples> {
			Ok(Samples::Int16(vec![]))
		}
		fn state(&self) -> ScopeState { ScopeState::Armed }
		fn close(&mut self) -> Result<()> { Ok(()) }
	}

	#[test]
	fn poll_stops_at_first_stopped_report() {
		let policy = PollPolicy { attempts: 10, interval_ms: 1 };
		let mut scope = Countdown { remaining: 4, polls: 0 };
		assert!(scope.poll_trigger_complete(&policy).unwrap());
		assert_eq!(scope.polls, 5);
	}

	#[test]
	fn poll_gives_up_after_budget() {
		let policy = PollPolicy { attempts: 10, interval_ms: 1 };
		let mut scope = Countdown { remaining: u32::MAX, polls: 0 };
		assert!(!scope.poll_trigger_complete(&policy).unwrap());
		assert_eq!(scope.polls, 10);
	}
}
