use std::io::{self, ErrorKind};
use std::path::PathBuf;

use clap::Parser;

use scope_trace::config::Backend;
use scope_trace::devices::lecroy::LeCroy;
use scope_trace::devices::sds1202x::Sds1202x;
use scope_trace::{device, Acquisition, CancelFlag, Error, ExperimentConfig, Oscilloscope, TraceStore};

/// Capture a trace set: random plaintext in, ciphertext and one scope sweep out, per trace.
#[derive(Parser)]
#[command(version)]
struct Args {
	/// Experiment description (JSON)
	#[arg(short, long)]
	config: PathBuf,

	/// Overrides the output path from the config file
	#[arg(short, long)]
	output: Option<PathBuf>,
}

fn main() -> scope_trace::Result<()> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let args = Args::parse();
	let mut config = ExperimentConfig::load(&args.config)?;
	if let Some(output) = args.output {
		config.output = output;
	}
	let acq = &config.acquisition;

	let cancel = CancelFlag::new();
	let handler_flag = cancel.clone();
	ctrlc::set_handler(move || {
		log::warn!("interrupt received, stopping after the current trace");
		handler_flag.cancel();
	}).map_err(|e| Error::Io(io::Error::new(ErrorKind::Other, e)))?;

	let inst = &config.instrument;
	let mut scope:Box<dyn Oscilloscope> = match inst.backend {
		Backend::LeCroy   => Box::new(LeCroy::connect(&inst.address, inst.timeout(), inst.connect_attempts, inst.connect_backoff())?),
		Backend::Sds1202x => Box::new(Sds1202x::connect(&inst.address, inst.timeout(), inst.connect_attempts, inst.connect_backoff())?),
	};

	let dev = &config.device;
	let mut device = device::open(&dev.port, dev.baud_rate, acq.plaintext_length, acq.ciphertext_length, dev.read_timeout())?;

	let mut store = TraceStore::create(&config.output, acq)?;

	let summary = Acquisition::new(acq, &mut scope, &mut device, &mut store)
		.with_cancel(cancel)
		.run(&mut rand::thread_rng())?;

	println!("{}", serde_json::json!({
		"output": config.output,
		"stored": summary.stored,
		"attempts": summary.attempts,
		"trigger_retries": summary.trigger_retries,
		"decode_retries": summary.decode_retries,
	}));
	Ok(())
}
