use std::time::Duration;

use clap::Parser;
use rand::RngCore;

use scope_trace::device;
use scope_trace::utils::hex_words;

/// Exchange random plaintext with the device under test, without the scope. Use it with the
/// scope in single-trigger mode to find trigger delay and level before a real acquisition.
#[derive(Parser)]
#[command(version)]
struct Args {
	/// Serial port of the device, e.g. /dev/ttyUSB0 or COM4
	#[arg(short, long)]
	port: String,

	#[arg(short, long, default_value_t = 9600)]
	baud_rate: u32,

	#[arg(long, default_value_t = 16)]
	plaintext_len: usize,

	#[arg(long, default_value_t = 16)]
	ciphertext_len: usize,

	#[arg(long, default_value_t = 2000)]
	read_timeout_ms: u64,

	/// Stop after this many exchanges instead of running until interrupted
	#[arg(short, long)]
	count: Option<u64>,

	/// Log every Nth exchange
	#[arg(long, default_value_t = 100)]
	every: u64,
}

fn main() -> scope_trace::Result<()> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
	let args = Args::parse();

	let mut device = device::open(&args.port, args.baud_rate, args.plaintext_len, args.ciphertext_len, Duration::from_millis(args.read_timeout_ms))?;
	let mut rng = rand::thread_rng();
	let mut plaintext = vec![0u8; args.plaintext_len];

	let mut i:u64 = 0;
	while args.count.map_or(true, |n| i < n) {
		rng.fill_bytes(&mut plaintext);
		let ciphertext = device.transact(&plaintext)?;

		if args.every != 0 && i % args.every == 0 {
			log::info!("i={} plain={} cipher={}", i, hex_words(&plaintext), hex_words(&ciphertext));
		}
		i += 1;
	}

	device.close();
	Ok(())
}
