use std::io::{self, Error, ErrorKind};

use crate::xdr::Unpacker;
use crate::rpc::{REPLY, MSG_DENIED, RPC_MISMATCH, AUTH_ERROR, MSG_ACCEPTED, PROG_UNAVAIL, PROG_MISMATCH, PROC_UNAVAIL, GARBAGE_ARGS, SUCCESS};

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

#[derive(Debug, PartialEq)]
pub struct Auth {
	pub flavor: i32,
	pub body: Vec<u8>,
}

#[derive(Debug)]
pub struct ReplyHeader {
	pub xid: u32,
	pub verf: Auth,
}

pub fn unpack_auth(unpacker:&mut Unpacker) -> io::Result<Auth> {
	let flavor:i32  = unpacker.unpack_enum()?;
	let body:Vec<u8> = unpacker.unpack_variable_len_opaque()?;
	Ok(Auth{ flavor, body })
}

// Leaves the unpacker positioned at the start of the procedure's results
pub fn unpack_replyheader(unpacker:&mut Unpacker) -> io::Result<ReplyHeader> {
	let xid:u32 = unpacker.unpack_u32()?;

	if unpacker.unpack_enum()? != REPLY { return Err(err("Expected REPLY message type in RPC reply header")); }

	match unpacker.unpack_enum()? {
		MSG_DENIED => {
			return match unpacker.unpack_enum()? {
				RPC_MISMATCH => Err(err("Message denied due to RPC_MISMATCH")),
				AUTH_ERROR   => Err(err("Message denied due to AUTH_ERROR")),
				_            => Err(err("Message denied for an unknown reason")),
			};
		},
		MSG_ACCEPTED => { },
		_            => return Err(err("Neither MSG_DENIED nor MSG_ACCEPTED in RPC reply header")),
	}

	let verf = unpack_auth(unpacker)?;

	match unpacker.unpack_enum()? {
		SUCCESS       => Ok(ReplyHeader{ xid, verf }),
		PROG_UNAVAIL  => Err(err("Program unavailable")),
		PROG_MISMATCH => {
			let low  = unpacker.unpack_u32()?;
			let high = unpacker.unpack_u32()?;
			Err(Error::new(ErrorKind::Other, format!("Program mismatch, server supports versions {}..={}", low, high)))
		},
		PROC_UNAVAIL  => Err(err("Procedure unavailable")),
		GARBAGE_ARGS  => Err(err("Server could not decode the call arguments")),
		_             => Err(err("Call failed for unknown reason")),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::xdr::Packer;

	fn reply(accept_stat:i32) -> Vec<u8> {
		let mut packer = Packer::new();
		packer.pack_u32(7).unwrap();
		packer.pack_enum(REPLY).unwrap();
		packer.pack_enum(MSG_ACCEPTED).unwrap();
		packer.pack_enum(0).unwrap();
		packer.pack_variable_len_opaque(&[]).unwrap();
		packer.pack_enum(accept_stat).unwrap();
		packer.pack_u32(42).unwrap();
		packer.get_buf().to_vec()
	}

	#[test]
	fn accepted_reply_leaves_results() {
		let mut unpacker = Unpacker::new();
		unpacker.reset(&reply(SUCCESS));
		let header = unpack_replyheader(&mut unpacker).unwrap();
		assert_eq!(header.xid, 7);
		assert_eq!(header.verf, Auth{ flavor: 0, body: vec![] });
		assert_eq!(unpacker.unpack_u32().unwrap(), 42);
	}

	#[test]
	fn garbage_args_is_an_error() {
		let mut unpacker = Unpacker::new();
		unpacker.reset(&reply(GARBAGE_ARGS));
		assert!(unpack_replyheader(&mut unpacker).is_err());
	}
}
