use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use serialport::SerialPort;

use crate::error::{Error, Result};

// Per-read timeout on the serial port. The overall budget is enforced by `transact`
const SERIAL_POLL_TIMEOUT:Duration = Duration::from_millis(100);

pub struct DeviceChannel<T: Read + Write> {
	transport: Option<T>,
	plaintext_length: usize,
	ciphertext_length: usize,
	read_timeout: Duration,
}

pub fn open(port:&str, baud_rate:u32, plaintext_length:usize, ciphertext_length:usize, read_timeout:Duration) -> Result<DeviceChannel<Box<dyn SerialPort>>> {
	let transport = serialport::new(port, baud_rate)
		.timeout(SERIAL_POLL_TIMEOUT.min(read_timeout))
		.open()
		.map_err(|source| Error::DeviceUnavailable { port: port.to_owned(), source })?;

	// Stale ciphertext from an earlier, interrupted run would shift every later read
	if let Err(e) = transport.clear(serialport::ClearBuffer::All) {
		log::warn!("device: unable to clear buffers on {}: {}", port, e);
	}
	log::info!("device: opened {} at {} baud", port, baud_rate);

	Ok(DeviceChannel::new(transport, plaintext_length, ciphertext_length, read_timeout))
}

impl<T: Read + Write> DeviceChannel<T> {
	pub fn new(transport:T, plaintext_length:usize, ciphertext_length:usize, read_timeout:Duration) -> Self {
		DeviceChannel { transport: Some(transport), plaintext_length, ciphertext_length, read_timeout }
	}

	pub fn is_open(&self) -> bool {
		self.transport.is_some()
	}

	// Writes the plaintext and reads back exactly `ciphertext_length` bytes. The scope must
	// already be armed: the device starts working as soon as the last byte lands
	pub fn transact(&mut self, plaintext:&[u8]) -> Result<Vec<u8>> {
		if plaintext.len() != self.plaintext_length {
			return Err(Error::RecordMismatch(format!(
				"plaintext is {} bytes, device expects {}",
				plaintext.len(),
				self.plaintext_length
			)));
		}
		let expected:usize = self.ciphertext_length;
		let deadline:Instant = Instant::now() + self.read_timeout;
		let transport = self.transport.as_mut().ok_or(Error::SessionClosed("device"))?;

		transport.write_all(plaintext)?;
		transport.flush()?;

		let mut ciphertext:Vec<u8> = vec![0u8; expected];
		let mut received:usize = 0;
		while received < expected && Instant::now() < deadline {
			match transport.read(&mut ciphertext[received..]) {
				Ok(0) => break,
				Ok(n) => received += n,
				Err(e) if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock => continue,
				Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
				Err(e) => return Err(Error::Io(e)),
			}
		}

		if received < expected {
			return Err(Error::ShortRead { expected, received });
		}
		Ok(ciphertext)
	}

	pub fn close(&mut self) {
		if self.transport.take().is_some() {
			log::debug!("device: closed");
		}
	}
}
