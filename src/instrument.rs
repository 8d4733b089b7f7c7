use std::str;
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::vxi11::CoreClient;

// VXI-11 logical device name used by LAN-attached scopes
pub const DEFAULT_DEVICE_NAME:&str = "inst0";

pub trait InstrumentChannel {
	fn send_command(&mut self, text:&str) -> Result<()>;

	fn query(&mut self, text:&str) -> Result<String>;

	// Binary block transfers
	fn read_raw_block(&mut self) -> Result<Vec<u8>>;

	fn close(&mut self) -> Result<()>;
}

impl<C: InstrumentChannel + ?Sized> InstrumentChannel for Box<C> {
	fn send_command(&mut self, text:&str) -> Result<()> { (**self).send_command(text) }
	fn query(&mut self, text:&str) -> Result<String> { (**self).query(text) }
	fn read_raw_block(&mut self) -> Result<Vec<u8>> { (**self).read_raw_block() }
	fn close(&mut self) -> Result<()> { (**self).close() }
}

pub struct Vxi11Channel {
	address: String,
	core: Option<CoreClient>,
}

impl Vxi11Channel {
	pub fn connect(address:&str, timeout:Duration) -> Result<Self> {
		let connection_error = |e:std::io::Error| Error::Connection {
			address: address.to_owned(),
			reason: e.to_string(),
		};

		let mut core:CoreClient = CoreClient::new(address, timeout).map_err(connection_error)?;
		core.create_link(DEFAULT_DEVICE_NAME).map_err(connection_error)?;
		log::info!("instrument: linked to {} ({:?})", address, core.link());

		Ok(Self { address: address.to_owned(), core: Some(core) })
	}

	pub fn address(&self) -> &str {
		&self.address
	}

	// Issues a VXI-11 device clear, flushing any half-read response
	pub fn clear(&mut self) -> Result<()> {
		self.core()?.clear().map_err(|e| Error::from_instrument_io("device clear", e))
	}

	fn core(&mut self) -> Result<&mut CoreClient> {
		self.core.as_mut().ok_or(Error::SessionClosed("instrument"))
	}
}

impl InstrumentChannel for Vxi11Channel {
	fn send_command(&mut self, text:&str) -> Result<()> {
		log::debug!("instrument: > {}", text.trim_end());
		self.core()?.write(text.as_bytes()).map_err(|e| Error::from_instrument_io(text, e))
	}

	fn query(&mut self, text:&str) -> Result<String> {
		log::debug!("instrument: > {}", text.trim_end());
		let response:Vec<u8> = self.core()?.ask(text.as_bytes()).map_err(|e| Error::from_instrument_io(text, e))?;
		let response:String = str::from_utf8(&response)
			.map(|s| s.to_owned())
			.map_err(|_| Error::Instrument(format!("response to `{}` is not UTF-8", text)))?;
		log::debug!("instrument: < {}", response.trim_end());
		Ok(response)
	}

	fn read_raw_block(&mut self) -> Result<Vec<u8>> {
		let block:Vec<u8> = self.core()?.read().map_err(|e| Error::from_instrument_io("raw block read", e))?;
		log::debug!("instrument: < {} byte block", block.len());
		Ok(block)
	}

	fn close(&mut self) -> Result<()> {
		match self.core.take() {
			Some(mut core) => {
				log::debug!("instrument: closing link to {}", self.address);
				core.destroy_link().map_err(|e| Error::from_instrument_io("destroy link", e))
			}
			None => Ok(()),
		}
	}
}

impl Drop for Vxi11Channel {
	fn drop(&mut self) {
		if let Err(e) = self.close() {
			log::error!("instrument: unable to destroy link to {}: {}", self.address, e);
		}
	}
}

pub fn connect_with_retry(address:&str, timeout:Duration, attempts:u32, backoff:Duration) -> Result<Vxi11Channel> {
	let attempts = attempts.max(1);
	let mut attempt = 1;
	loop {
		match Vxi11Channel::connect(address, timeout) {
			Ok(channel) => return Ok(channel),
			Err(e @ Error::Connection { .. }) if attempt < attempts => {
				log::warn!("instrument: connect attempt {}/{} failed: {}", attempt, attempts, e);
				thread::sleep(backoff);
				attempt += 1;
			}
			Err(e) => return Err(e),
		}
	}
}
