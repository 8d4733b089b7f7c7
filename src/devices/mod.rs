// Oscilloscope backends. Each one implements the crate's Oscilloscope contract on top of an
// InstrumentChannel, so the acquisition loop never sees vendor command sets.

pub mod lecroy;
pub mod sds1202x;

#[cfg(test)]
pub(crate) mod script {

	use std::collections::VecDeque;

	use crate::error::{Error, Result};
	use crate::instrument::InstrumentChannel;

	// Records every command and answers queries and block reads from canned responses
	#[derive(Default)]
	pub struct ScriptedChannel {
		pub sent: Vec<String>,
		pub responses: VecDeque<String>,
		pub blocks: VecDeque<Vec<u8>>,
		pub closes: usize,
	}

	impl ScriptedChannel {
		pub fn respond(mut self, response:&str) -> Self {
			self.responses.push_back(response.to_owned());
			self
		}

		pub fn block(mut self, block:Vec<u8>) -> Self {
			self.blocks.push_back(block);
			self
		}
	}

	impl InstrumentChannel for ScriptedChannel {
		fn send_command(&mut self, text:&str) -> Result<()> {
			self.sent.push(text.to_owned());
			Ok(())
		}

		fn query(&mut self, text:&str) -> Result<String> {
			self.sent.push(text.to_owned());
			self.responses.pop_front().ok_or_else(|| Error::Timeout(text.to_owned()))
		}

		fn read_raw_block(&mut self) -> Result<Vec<u8>> {
			self.blocks.pop_front().ok_or_else(|| Error::Timeout("raw block read".to_owned()))
		}

		fn close(&mut self) -> Result<()> {
			self.closes += 1;
			Ok(())
		}
	}

}
