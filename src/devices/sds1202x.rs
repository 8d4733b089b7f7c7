use std::thread;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::{AcquisitionConfig, SampleEncoding, TriggerSlope, INT16_SPAN};
use crate::error::{Error, Result};
use crate::instrument::{self, InstrumentChannel, Vxi11Channel};
use crate::scope::{self, InstrumentSession, Oscilloscope, ScopeState};
use crate::trs::Samples;

lazy_static! {
	static ref CHAN_RE: Regex = Regex::new("^C([12])$").unwrap();
	static ref SAST_RE: Regex = Regex::new("SAST\\s+(\\S+)").unwrap();
	static ref OPC_RE: Regex  = Regex::new("(\\d)\\s*$").unwrap();
}

pub const DEFAULT_TX_THROTTLE_DURATION_SEC:f32 = 0.1;

// The 8-bit ADC spans 25 codes per vertical division
pub const CODES_PER_DIV:f64 = 25.0;

// Siglent SDS1202X-E. Its ADC is 8-bit, so integer captures are rescaled onto the trace set's
// 16-bit scale and float captures are converted to volts here.
pub struct Sds1202x<C: InstrumentChannel> {
	session: InstrumentSession<C>,
	tx_throttle_duration: Duration,
	conversion: Option<Conversion>,
}

#[derive(Debug, Clone, Copy)]
struct Conversion {
	voltage_division: f64,
	voltage_offset: f64,
	// 16-bit trace set units per ADC code
	int16_per_code: f64,
}

fn chan_num(channel:&str) -> Result<u8> {
	CHAN_RE.captures(channel)
		.and_then(|cap| cap.get(1))
		.and_then(|m| m.as_str().parse().ok())
		.ok_or_else(|| Error::InvalidConfig(format!("SDS1202X only has channels C1 and C2, not {:?}", channel)))
}

impl Sds1202x<Vxi11Channel> {

	pub fn connect(address:&str, timeout:Duration, attempts:u32, backoff:Duration) -> Result<Self> {
		let mut channel = instrument::connect_with_retry(address, timeout, attempts, backoff)?;

		let idn_resp:String = channel.query("*IDN?")?;
		if !idn_resp.contains("SDS1202X") {
			return Err(Error::Connection {
				address: address.to_owned(),
				reason: format!("connected to {:?}, which doesn't appear to be an SDS1202X", idn_resp.trim()),
			});
		}

		Ok(Sds1202x::new(channel))
	}

}

impl<C: InstrumentChannel> Sds1202x<C> {

	pub fn new(channel:C) -> Self {
		let tx_throttle_duration = Duration::from_secs_f32(DEFAULT_TX_THROTTLE_DURATION_SEC);
		Sds1202x{ session: InstrumentSession::new(channel), tx_throttle_duration, conversion: None }
	}

	pub fn with_tx_throttle(mut self, throttle:Duration) -> Self {
		self.tx_throttle_duration = throttle;
		self
	}

	// The SDS1202X drops commands that arrive back to back
	fn send(&mut self, cmd:&str) -> Result<()> {
		thread::sleep(self.tx_throttle_duration);
		self.session.channel()?.send_command(cmd)
	}

	fn ask_str(&mut self, cmd:&str) -> Result<String> {
		thread::sleep(self.tx_throttle_duration);
		self.session.channel()?.query(cmd)
	}

	fn wait_complete(&mut self) -> Result<()> {
		let res:String = self.ask_str("*OPC?")?;
		match OPC_RE.captures(res.trim()).and_then(|cap| cap.get(1)).map(|m| m.as_str()) {
			Some("1") => Ok(()),
			_         => Err(Error::Instrument(format!("unexpected *OPC? response {:?}", res))),
		}
	}

}

impl<C: InstrumentChannel> Oscilloscope for Sds1202x<C> {

	fn configure(&mut self, config:&AcquisitionConfig) -> Result<()> {
		self.session.require("configure", &[ScopeState::Connected, ScopeState::Configured, ScopeState::Armed])?;

		let ch:u8   = chan_num(&config.capture_channel)?;
		let trig:u8 = chan_num(&config.trigger_channel)?;
		let slope = match config.trigger_slope { TriggerSlope::Positive => "POS", TriggerSlope::Negative => "NEG" };

		// No fixed-sample-rate mode here: the rate follows from the time division and memory depth
		log::debug!("sds1202x: sample rate follows TDIV, requested {} Sa/s", config.sample_rate);

		let cmds:Vec<String> = vec![
			format!("TDIV {:E}S", config.timebase()),
			format!("C{}:VDIV {:E}V", ch, config.vertical_range),
			format!("C{}:OFST {:.6}V", ch, config.vertical_offset),
			format!("WFSU SP,0,NP,{},FP,0", config.sample_count),
			format!("TRDL {:E}S", config.trigger_delay),
			format!("C{}:TRLV {:E}V", trig, config.trigger_level),
			format!("C{}:TRSL {}", trig, slope),
		];
		for cmd in &cmds {
			self.send(cmd)?;
		}

		self.conversion = Some(Conversion {
			voltage_division: config.vertical_range,
			voltage_offset: config.vertical_offset,
			int16_per_code: (INT16_SPAN / config.full_scale_divisions) / CODES_PER_DIV,
		});
		self.session.set_state(ScopeState::Configured);
		Ok(())
	}

	fn arm(&mut self) -> Result<()> {
		self.session.require("arm", &[ScopeState::Configured, ScopeState::Armed])?;

		self.send("TRMD STOP")?;
		self.wait_complete()?;
		self.send("TRMD SINGLE;ARM")?;
		self.wait_complete()?;

		self.session.set_state(ScopeState::Armed);
		Ok(())
	}

	fn trigger_stopped(&mut self) -> Result<bool> {
		self.session.require("poll the trigger", &[ScopeState::Armed])?;

		let res:String = self.ask_str("SAST?")?;
		let status:String = SAST_RE.captures(&res)
			.and_then(|cap| cap.get(1))
			.map(|m| m.as_str().to_owned())
			.ok_or_else(|| Error::Instrument(format!("unexpected SAST? response {:?}", res)))?;

		let stopped = status.eq_ignore_ascii_case("stop");
		if stopped {
			self.session.set_state(ScopeState::Configured);
		}
		Ok(stopped)
	}

	fn read_waveform(&mut self, sample_count:usize, encoding:SampleEncoding, channel:&str) -> Result<Samples> {
		self.session.require("read a waveform", &[ScopeState::Configured])?;
		let conv = self.conversion.ok_or_else(|| Error::Instrument("waveform read before configure".to_owned()))?;
		let ch:u8 = chan_num(channel)?;

		self.send(&format!("C{}:WF? DAT2", ch))?;
		let raw:Vec<u8> = self.session.channel()?.read_raw_block()?;
		let payload:&[u8] = scope::parse_definite_block(&raw)?;

		if payload.len() < sample_count {
			return Err(Error::WaveformDecode(format!("expected {} samples, block holds {}", sample_count, payload.len())));
		}
		let codes = payload[..sample_count].iter().map(|&b| b as i8);

		Ok(match encoding {
			SampleEncoding::ScaledInt16 => Samples::Int16(
				codes.map(|c| (c as f64 * conv.int16_per_code).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16).collect()
			),
			SampleEncoding::Float32 => Samples::Float32(
				codes.map(|c| ((c as f64) * (conv.voltage_division / CODES_PER_DIV) - conv.voltage_offset) as f32).collect()
			),
		})
	}

	fn state(&self) -> ScopeState { self.session.state() }

	fn close(&mut self) -> Result<()> { self.session.close() }

}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::devices::script::ScriptedChannel;

	fn stopped_scope(config:&AcquisitionConfig, block:Vec<u8>) -> Sds1202x<ScriptedChannel> {
		let channel = ScriptedChannel::default()
			.respond("1\n").respond("1\n").respond("SAST Stop\n")
			.block(block);
		let mut scope = Sds1202x::new(channel).with_tx_throttle(Duration::ZERO);
		scope.configure(config).unwrap();
		scope.arm().unwrap();
		assert!(scope.trigger_stopped().unwrap());
		scope
	}

	fn block(codes:&[i8]) -> Vec<u8> {
		let mut raw = format!("C1:WF DAT2,#9{:09}", codes.len()).into_bytes();
		raw.extend(codes.iter().map(|&c| c as u8));
		raw.extend_from_slice(b"\n\n");
		raw
	}

	#[test]
	fn integer_codes_are_rescaled_to_sixteen_bits() {
		let config = AcquisitionConfig::new(1, 3, 1e6, SampleEncoding::ScaledInt16, 1.0, 16, 16);
		let mut scope = stopped_scope(&config, block(&[0, 25, -25, 100]));
		let samples = scope.read_waveform(3, SampleEncoding::ScaledInt16, "C1").unwrap();

		// One division is 6553.6 units on the 16-bit scale
		assert_eq!(samples, Samples::Int16(vec![0, 6554, -6554]));
	}

	#[test]
	fn float_codes_become_volts() {
		let mut config = AcquisitionConfig::new(1, 2, 1e6, SampleEncoding::Float32, 0.5, 16, 16);
		config.vertical_offset = 0.25;
		let mut scope = stopped_scope(&config, block(&[50, 0]));
		let samples = scope.read_waveform(2, SampleEncoding::Float32, "C1").unwrap();
		assert_eq!(samples, Samples::Float32(vec![0.75, -0.25]));
	}

	#[test]
	fn arm_waits_for_operation_complete() {
		let config = AcquisitionConfig::new(1, 2, 1e6, SampleEncoding::ScaledInt16, 0.5, 16, 16);
		let mut scope = stopped_scope(&config, block(&[0, 0]));
		let sent = &scope.session.channel().unwrap().sent;
		let arm_start = sent.iter().position(|c| c == "TRMD STOP").unwrap();
		assert_eq!(&sent[arm_start..], &["TRMD STOP", "*OPC?", "TRMD SINGLE;ARM", "*OPC?", "SAST?"]);
	}

	#[test]
	fn only_two_channels() {
		let mut config = AcquisitionConfig::new(1, 2, 1e6, SampleEncoding::ScaledInt16, 0.5, 16, 16);
		config.capture_channel = "C3".to_owned();
		let mut scope = Sds1202x::new(ScriptedChannel::default()).with_tx_throttle(Duration::ZERO);
		assert!(matches!(scope.configure(&config), Err(Error::InvalidConfig(_))));
	}
}
