use std::io::{self, Error, ErrorKind, Write};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

pub struct Packer {
	pub buff:Vec<u8>
}

// Reads from the front of a reply without shifting the buffer, so multi-megabyte waveform replies stay linear
pub struct Unpacker {
	buff:Vec<u8>,
	pos:usize,
}

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

fn padding(n:usize) -> usize { (4 - n % 4) % 4 }

impl Packer {

	pub fn new() -> Self { Packer{buff: Vec::new()} }

	pub fn reset(&mut self) { self.buff.clear(); }

	pub fn get_buf(&self) -> &[u8] { &self.buff }

	// Packing methods that can only add multiples of four bytes, so if we started off with the correct
	// padding, we'll end up with the correct padding
	pub fn pack_u32(&mut self, x:u32) -> io::Result<()> { self.buff.write_u32::<BigEndian>(x) }
	pub fn pack_i32(&mut self, x:i32) -> io::Result<()> { self.buff.write_i32::<BigEndian>(x) }

	pub fn pack_bool(&mut self, b:bool) -> io::Result<()> {
		if b { self.pack_i32(1) }
		else { self.pack_i32(0) }
	}

	pub fn pack_enum(&mut self, x:i32) -> io::Result<()> { self.pack_i32(x) }

	pub fn pack_variable_len_opaque(&mut self, data:&[u8]) -> io::Result<()> {
		self.pack_u32(data.len() as u32)?;
		self.buff.write_all(data)?;

		// Ensure alignment
		while self.buff.len() % 4 != 0 { self.buff.push(0); }
		Ok(())
	}

}

impl Default for Packer {
	fn default() -> Self { Self::new() }
}

impl Unpacker {

	pub fn new() -> Self { Unpacker{buff: Vec::new(), pos: 0} }

	pub fn reset(&mut self, data:&[u8]) {
		self.buff.clear();
		self.buff.extend_from_slice(data);
		self.pos = 0;
	}

	pub fn remaining(&self) -> usize { self.buff.len() - self.pos }

	pub fn all_data_consumed(&self) -> bool { self.remaining() == 0 }

	fn take(&mut self, n:usize) -> io::Result<&[u8]> {
		if self.remaining() < n {
			return Err(err("Tried to unpack past the end of the buffer"));
		}
		let start = self.pos;
		self.pos += n;
		Ok(&self.buff[start..self.pos])
	}

	pub fn unpack_u32(&mut self) -> io::Result<u32> { self.take(4).map(BigEndian::read_u32) }
	pub fn unpack_i32(&mut self) -> io::Result<i32> { self.take(4).map(BigEndian::read_i32) }

	// An enum is just an i32 with a restricted set of values.  We can't check that this value is in the restricted set at this
	// level because it depends on the application, so for our purposes here, an enum is the same as an i32
	pub fn unpack_enum(&mut self) -> io::Result<i32> { self.unpack_i32() }

	pub fn unpack_bool(&mut self) -> io::Result<bool> {
		match self.unpack_i32()? {
			0 => Ok(false),
			1 => Ok(true),
			_ => Err(err("Expected 0 or 1 in unpack_bool")),
		}
	}

	pub fn unpack_variable_len_opaque(&mut self) -> io::Result<Vec<u8>> {
		let n = self.unpack_u32()? as usize;
		let ans:Vec<u8> = self.take(n)?.to_vec();

		// Skip the fill bytes that keep the stream aligned
		self.take(padding(n))?;
		Ok(ans)
	}

}

impl Default for Unpacker {
	fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn opaque_is_padded_to_four_bytes() {
		let mut packer = Packer::new();
		packer.pack_variable_len_opaque(b"inst0").unwrap();
		assert_eq!(packer.get_buf(), &[0, 0, 0, 5, b'i', b'n', b's', b't', b'0', 0, 0, 0]);

		let mut unpacker = Unpacker::new();
		unpacker.reset(packer.get_buf());
		assert_eq!(unpacker.unpack_variable_len_opaque().unwrap(), b"inst0");
		assert!(unpacker.all_data_consumed());
	}

	#[test]
	fn unpacking_past_the_end_fails() {
		let mut unpacker = Unpacker::new();
		unpacker.reset(&[0, 0, 0]);
		assert!(unpacker.unpack_u32().is_err());
	}

	#[test]
	fn bool_rejects_other_values() {
		let mut unpacker = Unpacker::new();
		unpacker.reset(&[0, 0, 0, 1, 0, 0, 0, 2]);
		assert!(unpacker.unpack_bool().unwrap());
		assert!(unpacker.unpack_bool().is_err());
	}
}
