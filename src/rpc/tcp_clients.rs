use std::io::{self, Read, Write, Error, ErrorKind};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use byteorder::{BigEndian, WriteBytesExt, ReadBytesExt};

use crate::xdr;
use super::{xdr_pack, xdr_unpack};

const LAST_FRAGMENT:u32 = 0x80000000;

// Largest reply accepted, across all fragments of one record
pub const MAX_RECORD_LEN:usize = 64 * 1024 * 1024;

pub struct TcpClient {
	pub stream: TcpStream,
	pub prog: u32,
	pub vers: u32,
	pub lastxid: u32,
	pub packer: xdr::Packer,
	pub unpacker: xdr::Unpacker,
}

impl TcpClient {

	// The timeout bounds every blocking read and write on the socket, not the call as a whole
	pub fn connect<A: ToSocketAddrs>(addr: A, prog: u32, vers: u32, timeout: Duration) -> io::Result<Self> {
		let sock_addr = addr.to_socket_addrs()?.next()
			.ok_or_else(|| Error::new(ErrorKind::Other, "Address did not resolve"))?;
		let stream = TcpStream::connect_timeout(&sock_addr, timeout)?;
		stream.set_read_timeout(Some(timeout))?;
		stream.set_write_timeout(Some(timeout))?;
		stream.set_nodelay(true)?;

		Ok(Self{ stream, prog, vers, lastxid: 0, packer: xdr::Packer::new(), unpacker: xdr::Unpacker::new() })
	}

	pub fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
		self.stream.set_read_timeout(Some(timeout))?;
		self.stream.set_write_timeout(Some(timeout))
	}

	// Starts a new call: bumps the xid and packs the call header so the caller can append arguments
	pub fn start_call(&mut self, prc:u32) -> io::Result<()> {
		self.lastxid = self.lastxid.wrapping_add(1);
		self.packer.reset();
		xdr_pack::pack_callheader_no_auth(&mut self.packer, self.lastxid, self.prog, self.vers, prc)
	}

	// Sends the packed call as a single record and loads the matching reply into the unpacker,
	// positioned just past the reply header
	pub fn do_call(&mut self) -> io::Result<()> {
		let call:&[u8] = self.packer.get_buf();
		let mut send_bytes:Vec<u8> = Vec::with_capacity(call.len() + 4);
		send_bytes.write_u32::<BigEndian>(call.len() as u32 | LAST_FRAGMENT)?;
		send_bytes.extend_from_slice(call);
		self.stream.write_all(&send_bytes)?;

		loop {
			let reply = self.read_record()?;
			self.unpacker.reset(&reply);

			let header = xdr_unpack::unpack_replyheader(&mut self.unpacker)?;
			if header.xid == self.lastxid {
				return Ok(());
			} else if header.xid < self.lastxid {
				// Stale reply to a call we already gave up on
				log::debug!("rpc: dropping stale reply xid={} (expecting {})", header.xid, self.lastxid);
				continue;
			} else {
				return Err(Error::new(ErrorKind::Other, "Received a reply for a call that was never made"));
			}
		}
	}

	fn read_record(&mut self) -> io::Result<Vec<u8>> {
		let mut reply:Vec<u8> = vec![];
		let mut last:bool = false;
		while !last {
			let x:u32 = self.stream.read_u32::<BigEndian>()?;
			last = (x & LAST_FRAGMENT) != 0;
			let n = (x & !LAST_FRAGMENT) as usize;

			let start = reply.len();
			if start + n > MAX_RECORD_LEN {
				return Err(Error::new(ErrorKind::InvalidData, format!("RPC record of more than {} bytes", MAX_RECORD_LEN)));
			}
			reply.resize(start + n, 0);
			self.stream.read_exact(&mut reply[start..])?;
		}
		Ok(reply)
	}

}
