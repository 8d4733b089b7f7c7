// Device core
pub const DEVICE_CORE_PROG:u32  = 0x0607af;
pub const DEVICE_CORE_VERS:u32  = 1;
pub const CREATE_LINK:u32       = 10;
pub const DEVICE_WRITE:u32      = 11;
pub const DEVICE_READ:u32       = 12;
pub const DEVICE_CLEAR:u32      = 15;
pub const DESTROY_LINK:u32      = 23;

pub const CLIENT_ID:i32 = 3333;
pub const DEFAULT_LOCK_TIMEOUT:u32 = 10000;

pub const OPERATION_FLAGS_END_ONLY:i32 = 8;

// Bits of the reason field in a device_read reply
pub const REASON_REQCNT:i32 = 1;
pub const REASON_CHR:i32    = 2;
pub const REASON_END:i32    = 4;

use std::io::{self, Error, ErrorKind};
use std::time::Duration;

use crate::rpc::port_mapping::{TcpPortMapperClient, Mapping, Protocol};
use crate::rpc::tcp_clients::TcpClient;

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

pub mod xdr_pack;

pub struct CoreClient {
	client: TcpClient,
	io_timeout_ms: u32,
	opt_link: Option<Link>,
}

#[derive(Debug, Clone, Copy)]
pub struct Link {
	pub link_id: i32,
	pub abort_port: u32,
	pub max_recv_size: u32,
}

// Device error codes shared by every procedure that returns a Device_Error
fn device_error(code:i32) -> io::Result<()> {
	match code {
		0  => Ok(()),
		1  => Err(err("Syntax error")),
		3  => Err(err("Device not accessible")),
		4  => Err(err("Invalid link identifier")),
		5  => Err(err("Parameter error")),
		6  => Err(err("Channel not established")),
		8  => Err(err("Operation not supported")),
		9  => Err(err("Out of resources")),
		11 => Err(err("Device locked by another link")),
		12 => Err(err("No lock held by this link")),
		15 => Err(Error::new(ErrorKind::TimedOut, "I/O timeout")),
		17 => Err(err("I/O error")),
		21 => Err(err("Invalid address")),
		23 => Err(err("Abort")),
		29 => Err(err("Channel already established")),
		_  => Err(Error::new(ErrorKind::Other, format!("Unknown device error {}", code))),
	}
}

impl CoreClient {

	fn get_link(&self) -> io::Result<Link> {
		self.opt_link.ok_or_else(|| err("No link"))
	}

	pub fn new(host:&str, timeout:Duration) -> io::Result<Self> {

		// Find the port to use for the core program
		let mut pmap_client = TcpPortMapperClient::new(host, timeout)?;

		let mapping = Mapping {
			program: DEVICE_CORE_PROG,
			version: DEVICE_CORE_VERS,
			protocol: Protocol::TCP,
			port: 0,
		};

		let port = pmap_client.get_port(&mapping)?;
		log::debug!("vxi11: core channel for {} on port {}", host, port);

		// The socket timeout has to outlast the instrument-side I/O timeout, otherwise we'd give up
		// on replies the instrument is still allowed to send
		let client = TcpClient::connect((host, port), DEVICE_CORE_PROG, DEVICE_CORE_VERS, timeout + Duration::from_secs(1))?;
		let io_timeout_ms = timeout.as_millis().min(u32::MAX as u128) as u32;

		Ok(CoreClient { client, io_timeout_ms, opt_link: None })
	}

	pub fn link(&self) -> Option<Link> { self.opt_link }

	pub fn create_link(&mut self, device:&str) -> io::Result<()> {
		if self.opt_link.is_some() {
			return Err(err("Already connected to a link"));
		}

		self.client.start_call(CREATE_LINK)?;
		xdr_pack::pack_create_link_parms(&mut self.client.packer, CLIENT_ID, false, DEFAULT_LOCK_TIMEOUT, device)?;
		self.client.do_call()?;

		let error:i32         = self.client.unpacker.unpack_i32()?;
		let link_id:i32       = self.client.unpacker.unpack_i32()?;
		let abort_port:u32    = self.client.unpacker.unpack_u32()?;
		let max_recv_size:u32 = self.client.unpacker.unpack_u32()?;

		device_error(error)?;
		self.opt_link = Some(Link{ link_id, abort_port, max_recv_size });
		Ok(())
	}

	pub fn ask(&mut self, data:&[u8]) -> io::Result<Vec<u8>> {
		self.write(data)?;
		self.read()
	}

	// Commands longer than the instrument's receive buffer go out in chunks, with END set on the last one only
	pub fn write(&mut self, data:&[u8]) -> io::Result<()> {
		let link = self.get_link()?;
		let chunk_size = (link.max_recv_size as usize).max(1);
		let chunks:Vec<&[u8]> = if data.is_empty() { vec![data] } else { data.chunks(chunk_size).collect() };
		let last_idx = chunks.len() - 1;

		for (idx, chunk) in chunks.into_iter().enumerate() {
			let flags = if idx == last_idx { OPERATION_FLAGS_END_ONLY } else { 0 };

			self.client.start_call(DEVICE_WRITE)?;
			xdr_pack::pack_device_write_parms(&mut self.client.packer, link.link_id, self.io_timeout_ms, DEFAULT_LOCK_TIMEOUT, flags, chunk)?;
			self.client.do_call()?;

			let error:i32 = self.client.unpacker.unpack_i32()?;
			let size:u32  = self.client.unpacker.unpack_u32()?;
			device_error(error)?;

			if size as usize != chunk.len() {
				return Err(err("Number of bytes in confirmation doesn't match number of bytes sent"));
			}
		}

		Ok(())
	}

	// Keeps issuing device_read until the instrument flags END, so large waveform blocks arrive whole
	pub fn read(&mut self) -> io::Result<Vec<u8>> {
		let link = self.get_link()?;
		let mut ans:Vec<u8> = vec![];

		loop {
			self.client.start_call(DEVICE_READ)?;
			xdr_pack::pack_device_read_parms(&mut self.client.packer, link.link_id, u32::MAX, self.io_timeout_ms, DEFAULT_LOCK_TIMEOUT, 0, 0)?;
			self.client.do_call()?;

			let error:i32  = self.client.unpacker.unpack_i32()?;
			let reason:i32 = self.client.unpacker.unpack_i32()?;
			let mut data:Vec<u8> = self.client.unpacker.unpack_variable_len_opaque()?;
			device_error(error)?;

			ans.append(&mut data);

			if reason & REASON_END != 0 {
				return Ok(ans);
			} else if reason & (REASON_REQCNT | REASON_CHR) == 0 {
				return Err(err("Expected one of three reason bits to be set"));
			}
		}
	}

	pub fn clear(&mut self) -> io::Result<()> {
		let link = self.get_link()?;

		self.client.start_call(DEVICE_CLEAR)?;
		xdr_pack::pack_device_generic_parms(&mut self.client.packer, link.link_id, 0, DEFAULT_LOCK_TIMEOUT, self.io_timeout_ms)?;
		self.client.do_call()?;

		device_error(self.client.unpacker.unpack_i32()?)
	}

	pub fn destroy_link(&mut self) -> io::Result<()> {
		let link = match self.opt_link.take() {
			Some(link) => link,
			None => return Ok(()),
		};

		self.client.start_call(DESTROY_LINK)?;
		self.client.packer.pack_i32(link.link_id)?;
		self.client.do_call()?;

		device_error(self.client.unpacker.unpack_i32()?)
	}

}
