use std::thread;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::{AcquisitionConfig, SampleEncoding, TriggerSlope};
use crate::error::{Error, Result};
use crate::instrument::{self, InstrumentChannel, Vxi11Channel};
use crate::scope::{self, InstrumentSession, Oscilloscope, ScopeState};
use crate::trs::Samples;

lazy_static! {
	static ref TRMD_RE: Regex = Regex::new("TRMD\\s+(AUTO|NORM|SINGLE|STOP)").unwrap();
	static ref INR_RE: Regex  = Regex::new("INR\\s+(\\d+)").unwrap();
	static ref IDLE_RE: Regex = Regex::new("(-?\\d+)\\s*$").unwrap();
}

// Seconds the instrument may take to settle before WaitUntilIdle gives up
pub const IDLE_WAIT_SEC:u32 = 5;

// Bit of the internal state register that stays set while the instrument is busy after a reset
pub const INR_BUSY_BIT:u32 = 13;
pub const READY_POLL_ATTEMPTS:u32 = 20;
pub const READY_POLL_INTERVAL_SEC:f32 = 0.5;

const STOP_ACQUISITION:&str = "vbs 'app.acquisition.triggermode = \"stopped\" '";
const ARM_SINGLE:&str       = "vbs 'app.acquisition.triggermode = \"single\" '";

// LeCroy WaveRunner/WavePro driven through its automation (VBS) interface, which keeps arming
// and idle checks synchronous where the plain remote commands race
pub struct LeCroy<C: InstrumentChannel> {
	session: InstrumentSession<C>,
}

impl LeCroy<Vxi11Channel> {

	pub fn connect(address:&str, timeout:Duration, attempts:u32, backoff:Duration) -> Result<Self> {
		let mut channel = instrument::connect_with_retry(address, timeout, attempts, backoff)?;
		channel.clear()?;

		let mut scope = LeCroy::new(channel);
		scope.wait_ready()?;
		scope.wait_idle()?;
		Ok(scope)
	}

}

impl<C: InstrumentChannel> LeCroy<C> {

	pub fn new(channel:C) -> Self {
		LeCroy{ session: InstrumentSession::new(channel) }
	}

	// Blocks until WaitUntilIdle reports the acquisition system quiet
	pub fn wait_idle(&mut self) -> Result<()> {
		let query = format!("vbs? 'return=app.WaitUntilIdle({})' ", IDLE_WAIT_SEC);
		let res:String = self.session.channel()?.query(&query)?;
		let idle:i64 = IDLE_RE.captures(res.trim())
			.and_then(|cap| cap.get(1))
			.and_then(|m| m.as_str().parse().ok())
			.ok_or_else(|| Error::Instrument(format!("unexpected WaitUntilIdle response {:?}", res)))?;

		if idle == 0 {
			return Err(Error::Instrument(format!("instrument not idle after {} s", IDLE_WAIT_SEC)));
		}
		Ok(())
	}

	// Polls the internal state register until the post-reset busy bit clears
	pub fn wait_ready(&mut self) -> Result<()> {
		let interval = Duration::from_secs_f32(READY_POLL_INTERVAL_SEC);
		for _ in 0..READY_POLL_ATTEMPTS {
			let res:String = self.session.channel()?.query("INR?")?;
			let inr:u32 = INR_RE.captures(&res)
				.and_then(|cap| cap.get(1))
				.and_then(|m| m.as_str().parse().ok())
				.ok_or_else(|| Error::Instrument(format!("unexpected INR? response {:?}", res)))?;

			if (inr >> INR_BUSY_BIT) & 0x01 == 0 {
				return Ok(());
			}
			thread::sleep(interval);
		}
		Err(Error::Timeout("INR?".to_owned()))
	}

	fn send(&mut self, cmd:&str) -> Result<()> {
		self.session.channel()?.send_command(cmd)
	}

}

fn slope(s:TriggerSlope) -> &'static str {
	match s {
		TriggerSlope::Positive => "POS",
		TriggerSlope::Negative => "NEG",
	}
}

impl<C: InstrumentChannel> Oscilloscope for LeCroy<C> {

	fn configure(&mut self, config:&AcquisitionConfig) -> Result<()> {
		self.session.require("configure", &[ScopeState::Connected, ScopeState::Configured, ScopeState::Armed])?;

		let ch:&str   = &config.capture_channel;
		let trig:&str = &config.trigger_channel;

		let cmds:Vec<String> = vec![
			"vbs 'app.Acquisition.ClearSweeps' ".to_owned(),
			format!("TDIV {:E}S", config.timebase()),
			format!("{}:VDIV {:E}V", ch, config.vertical_range),
			"CFMT DEF9,WORD,BIN".to_owned(),
			"vbs 'app.Acquisition.Horizontal.Maximize = \"FixedSampleRate\" '".to_owned(),
			format!("vbs 'app.Acquisition.Horizontal.SampleRate = \"{}MS/s\" '", config.sample_rate / 1e6),
			format!("vbs 'app.Acquisition.Horizontal.AcquisitionDuration = \"{:E}S\" '", config.capture_duration()),
			format!("vbs 'app.Acquisition.{}.VerOffset = \"{:E}V\" '", ch, config.vertical_offset),
			// Trigger: a negative delay starts the capture that long after the trigger event
			format!("TRDL {:E}S", config.trigger_delay),
			format!("{}:TRLV {:E}V", trig, config.trigger_level),
			format!("{}:TRSL {}", trig, slope(config.trigger_slope)),
		];

		for cmd in &cmds {
			self.send(cmd)?;
		}

		self.session.set_state(ScopeState::Configured);
		Ok(())
	}

	fn arm(&mut self) -> Result<()> {
		self.session.require("arm", &[ScopeState::Configured, ScopeState::Armed])?;

		// Arming while the previous sweep is still settling is silently ignored, so confirm
		// idle between the stop and the arm
		self.send(STOP_ACQUISITION)?;
		self.wait_idle()?;
		self.send(ARM_SINGLE)?;
		self.wait_idle()?;

		self.session.set_state(ScopeState::Armed);
		Ok(())
	}

	fn trigger_stopped(&mut self) -> Result<bool> {
		self.session.require("poll the trigger", &[ScopeState::Armed])?;

		let res:String = self.session.channel()?.query("TRMD?")?;
		let mode:String = TRMD_RE.captures(&res)
			.and_then(|cap| cap.get(1))
			.map(|m| m.as_str().to_owned())
			.ok_or_else(|| Error::Instrument(format!("unexpected TRMD? response {:?}", res)))?;

		let stopped = mode == "STOP";
		if stopped {
			self.session.set_state(ScopeState::Configured);
		}
		Ok(stopped)
	}

	fn read_waveform(&mut self, sample_count:usize, encoding:SampleEncoding, channel:&str) -> Result<Samples> {
		self.session.require("read a waveform", &[ScopeState::Configured])?;

		match encoding {
			SampleEncoding::ScaledInt16 => {
				self.send(&format!("{}:WF? DAT1", channel))?;
				let raw:Vec<u8> = self.session.channel()?.read_raw_block()?;
				let payload:&[u8] = scope::parse_definite_block(&raw)?;
				scope::decode_int16_samples(payload, sample_count).map(Samples::Int16)
			},
			SampleEncoding::Float32 => {
				self.send(&format!("{}:INSPECT? \"SIMPLE\"", channel))?;
				let raw:Vec<u8> = self.session.channel()?.read_raw_block()?;
				scope::decode_float_text(&raw, sample_count).map(Samples::Float32)
			},
		}
	}

	fn state(&self) -> ScopeState { self.session.state() }

	fn close(&mut self) -> Result<()> { self.session.close() }

}
