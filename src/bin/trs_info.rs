use std::path::PathBuf;

use clap::Parser;

use scope_trace::utils::hex_words;
use scope_trace::TraceSetReader;

/// Print the header of a trace set file and, optionally, its first records.
#[derive(Parser)]
#[command(version)]
struct Args {
	file: PathBuf,

	/// Number of records to dump
	#[arg(short, long, default_value_t = 0)]
	records: u32,

	/// Where the plaintext ends inside each record's data
	#[arg(long, default_value_t = 16)]
	plaintext_len: usize,

	/// Samples shown per record
	#[arg(long, default_value_t = 8)]
	samples: usize,
}

fn main() -> scope_trace::Result<()> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
	let args = Args::parse();

	let mut reader = TraceSetReader::open(&args.file)?;
	let header = *reader.header();

	println!("{}", args.file.display());
	println!("  traces:          {}{}", reader.len(), if reader.is_truncated() { format!(" (header declares {})", header.trace_count) } else { String::new() });
	println!("  samples/trace:   {}", header.sample_count);
	println!("  encoding:        {:?}", header.encoding);
	println!("  data bytes:      {}", header.payload_length);
	println!("  sample interval: {:e} s", header.sample_interval);
	println!("  amplitude scale: {:e} V/unit", header.amplitude_scale);

	for (idx, trace) in reader.records().take(args.records as usize).enumerate() {
		let trace = trace?;
		let (plain, cipher) = trace.split(args.plaintext_len);
		let volts = trace.samples.volts(header.amplitude_scale);
		let shown:Vec<String> = volts.iter().take(args.samples).map(|v| format!("{:.4e}", v)).collect();
		println!("[{}] plain={} cipher={}", idx, hex_words(plain), hex_words(cipher));
		println!("     V: {}{}", shown.join(" "), if volts.len() > args.samples { " ..." } else { "" });
	}
	Ok(())
}
