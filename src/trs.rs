use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::config::{AcquisitionConfig, SampleEncoding};
use crate::error::{Error, Result};

pub const HEADER_LEN:u64 = 4 + 4 + 1 + 4 + 8 + 8;

#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
	Int16(Vec<i16>),
	Float32(Vec<f32>),
}

impl Samples {
	pub fn len(&self) -> usize {
		match self {
			Samples::Int16(s) => s.len(),
			Samples::Float32(s) => s.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn encoding(&self) -> SampleEncoding {
		match self {
			Samples::Int16(_) => SampleEncoding::ScaledInt16,
			Samples::Float32(_) => SampleEncoding::Float32,
		}
	}

	pub fn volts(&self, amplitude_scale:f64) -> Vec<f64> {
		match self {
			Samples::Int16(s) => s.iter().map(|&x| x as f64 * amplitude_scale).collect(),
			Samples::Float32(s) => s.iter().map(|&x| x as f64 * amplitude_scale).collect(),
		}
	}

	fn write_le(&self, buf:&mut Vec<u8>) -> io::Result<()> {
		match self {
			Samples::Int16(s) => s.iter().try_for_each(|&x| buf.write_i16::<LittleEndian>(x)),
			Samples::Float32(s) => s.iter().try_for_each(|&x| buf.write_f32::<LittleEndian>(x)),
		}
	}

	fn read_le(encoding:SampleEncoding, count:usize, bytes:&[u8]) -> io::Result<Self> {
		let mut rdr = bytes;
		Ok(match encoding {
			SampleEncoding::ScaledInt16 => {
				let mut s = vec![0i16; count];
				rdr.read_i16_into::<LittleEndian>(&mut s)?;
				Samples::Int16(s)
			}
			SampleEncoding::Float32 => {
				let mut s = vec![0f32; count];
				rdr.read_f32_into::<LittleEndian>(&mut s)?;
				Samples::Float32(s)
			}
		})
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
	pub plaintext: Vec<u8>,
	pub ciphertext: Vec<u8>,
	pub samples: Samples,
	// Direction of the operation. Not part of the file layout
	pub is_encryption: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceSetHeader {
	pub trace_count: u32,
	pub sample_count: u32,
	pub encoding: SampleEncoding,
	pub payload_length: u32,
	pub sample_interval: f64,
	pub amplitude_scale: f64,
}

impl TraceSetHeader {
	pub fn from_config(config:&AcquisitionConfig) -> Self {
		TraceSetHeader {
			trace_count: config.trace_count,
			sample_count: config.sample_count,
			encoding: config.sample_encoding,
			payload_length: config.payload_length() as u32,
			sample_interval: config.sample_interval(),
			amplitude_scale: config.amplitude_scale(),
		}
	}

	pub fn record_len(&self) -> u64 {
		self.payload_length as u64 + self.sample_count as u64 * self.encoding.bytes_per_sample() as u64
	}

	fn write_to<W: Write>(&self, w:&mut W) -> io::Result<()> {
		w.write_u32::<LittleEndian>(self.trace_count)?;
		w.write_u32::<LittleEndian>(self.sample_count)?;
		w.write_u8(self.encoding.tag())?;
		w.write_u32::<LittleEndian>(self.payload_length)?;
		w.write_f64::<LittleEndian>(self.sample_interval)?;
		w.write_f64::<LittleEndian>(self.amplitude_scale)
	}

	fn read_from<R: Read>(r:&mut R) -> Result<Self> {
		let short = |e: io::Error| Error::StoreRead(format!("header: {}", e));
		let trace_count = r.read_u32::<LittleEndian>().map_err(short)?;
		let sample_count = r.read_u32::<LittleEndian>().map_err(short)?;
		let tag = r.read_u8().map_err(short)?;
		let encoding = SampleEncoding::from_tag(tag)
			.ok_or_else(|| Error::StoreRead(format!("unknown sample encoding tag {}", tag)))?;
		let payload_length = r.read_u32::<LittleEndian>().map_err(short)?;
		let sample_interval = r.read_f64::<LittleEndian>().map_err(short)?;
		let amplitude_scale = r.read_f64::<LittleEndian>().map_err(short)?;
		Ok(TraceSetHeader { trace_count, sample_count, encoding, payload_length, sample_interval, amplitude_scale })
	}
}

// Append-only writer. Every record is flushed and synced before `append_record` returns
pub struct TraceStore {
	path: PathBuf,
	writer: Option<BufWriter<File>>,
	header: TraceSetHeader,
	plaintext_length: usize,
	written: u32,
}

impl TraceStore {
	pub fn create<P: AsRef<Path>>(path:P, config:&AcquisitionConfig) -> Result<Self> {
		config.validate()?;

		let path:PathBuf = path.as_ref().to_path_buf();
		let create_error = |source:io::Error| Error::StoreCreate{ path: path.clone(), source };

		let header:TraceSetHeader = TraceSetHeader::from_config(config);
		let mut writer = BufWriter::new(File::create(&path).map_err(create_error)?);
		header.write_to(&mut writer).map_err(create_error)?;
		writer.flush().map_err(create_error)?;
		log::info!("trs: created {} ({:?})", path.display(), header);

		Ok(TraceStore { path, writer: Some(writer), header, plaintext_length: config.plaintext_length, written: 0 })
	}

	pub fn header(&self) -> &TraceSetHeader {
		&self.header
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn written_count(&self) -> u32 {
		self.written
	}

	pub fn append_record(&mut self, record:&TraceRecord) -> Result<()> {
		self.check(record)?;

		let mut buf:Vec<u8> = Vec::with_capacity(self.header.record_len() as usize);
		buf.extend_from_slice(&record.plaintext);
		buf.extend_from_slice(&record.ciphertext);
		record.samples.write_le(&mut buf).map_err(Error::StoreWrite)?;

		let writer = self.writer.as_mut().ok_or(Error::SessionClosed("trace store"))?;
		writer.write_all(&buf).map_err(Error::StoreWrite)?;
		writer.flush().map_err(Error::StoreWrite)?;
		writer.get_ref().sync_data().map_err(Error::StoreWrite)?;

		self.written += 1;
		Ok(())
	}

	fn check(&self, record:&TraceRecord) -> Result<()> {
		if self.writer.is_none() {
			return Err(Error::SessionClosed("trace store"));
		}
		if self.written >= self.header.trace_count {
			return Err(Error::RecordMismatch(format!("trace set already holds {} records", self.written)));
		}
		let ciphertext_length:usize = (self.header.payload_length as usize).saturating_sub(self.plaintext_length);
		if record.plaintext.len() != self.plaintext_length || record.ciphertext.len() != ciphertext_length {
			return Err(Error::RecordMismatch(format!(
				"expected {}+{} data bytes, got {}+{}",
				self.plaintext_length,
				ciphertext_length,
				record.plaintext.len(),
				record.ciphertext.len()
			)));
		}
		if record.samples.encoding() != self.header.encoding {
			return Err(Error::RecordMismatch(format!(
				"{:?} samples in a {:?} trace set",
				record.samples.encoding(),
				self.header.encoding
			)));
		}
		if record.samples.len() != self.header.sample_count as usize {
			return Err(Error::RecordMismatch(format!(
				"expected {} samples, got {}",
				self.header.sample_count,
				record.samples.len()
			)));
		}
		Ok(())
	}

	// Rewrites the header's trace count if fewer records were written
	pub fn close(&mut self) -> Result<()> {
		let mut writer = match self.writer.take() {
			Some(writer) => writer,
			None => return Ok(()),
		};

		writer.flush().map_err(Error::StoreWrite)?;
		if self.written != self.header.trace_count {
			log::info!("trs: {} holds {} of {} declared traces, rewriting header", self.path.display(), self.written, self.header.trace_count);
			self.header.trace_count = self.written;
			writer.seek(SeekFrom::Start(0)).map_err(Error::StoreWrite)?;
			writer.write_u32::<LittleEndian>(self.written).map_err(Error::StoreWrite)?;
			writer.flush().map_err(Error::StoreWrite)?;
		}
		writer.get_ref().sync_all().map_err(Error::StoreWrite)?;
		log::info!("trs: closed {} with {} traces", self.path.display(), self.written);
		Ok(())
	}
}

impl Drop for TraceStore {
	fn drop(&mut self) {
		if let Err(e) = self.close() {
			log::error!("trs: unable to finalize {}: {}", self.path.display(), e);
		}
	}
}

// A record as read back from disk. The header does not record where plaintext ends, so the
// caller supplies the split
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTrace {
	pub data: Vec<u8>,
	pub samples: Samples,
}

impl StoredTrace {
	pub fn split(&self, plaintext_length:usize) -> (&[u8], &[u8]) {
		self.data.split_at(plaintext_length.min(self.data.len()))
	}
}

pub struct TraceSetReader {
	reader: BufReader<File>,
	header: TraceSetHeader,
	available: u32,
}

impl TraceSetReader {
	pub fn open<P: AsRef<Path>>(path:P) -> Result<Self> {
		let path = path.as_ref();
		let file = File::open(path).map_err(|e| Error::StoreRead(format!("{}: {}", path.display(), e)))?;
		let file_len = file.metadata().map_err(|e| Error::StoreRead(e.to_string()))?.len();
		let mut reader = BufReader::new(file);
		let header = TraceSetHeader::read_from(&mut reader)?;

		let record_len = header.record_len();
		let complete = if record_len == 0 { header.trace_count as u64 } else { (file_len - HEADER_LEN) / record_len };
		let available = complete.min(header.trace_count as u64) as u32;
		if available < header.trace_count {
			log::warn!("trs: {} declares {} traces but holds {} complete records", path.display(), header.trace_count, available);
		}

		Ok(TraceSetReader { reader, header, available })
	}

	pub fn header(&self) -> &TraceSetHeader {
		&self.header
	}

	pub fn len(&self) -> u32 {
		self.available
	}

	pub fn is_empty(&self) -> bool {
		self.available == 0
	}

	pub fn is_truncated(&self) -> bool {
		self.available < self.header.trace_count
	}

	pub fn read_record(&mut self, index:u32) -> Result<StoredTrace> {
		if index >= self.available {
			return Err(Error::StoreRead(format!("record {} out of range ({} records)", index, self.available)));
		}
		let record_len = self.header.record_len();
		self.reader
			.seek(SeekFrom::Start(HEADER_LEN + index as u64 * record_len))
			.map_err(|e| Error::StoreRead(e.to_string()))?;

		let mut buf = vec![0u8; record_len as usize];
		self.reader.read_exact(&mut buf).map_err(|e| Error::StoreRead(format!("record {}: {}", index, e)))?;

		let sample_bytes = buf.split_off(self.header.payload_length as usize);
		let samples = Samples::read_le(self.header.encoding, self.header.sample_count as usize, &sample_bytes)
			.map_err(|e| Error::StoreRead(format!("record {}: {}", index, e)))?;
		Ok(StoredTrace { data: buf, samples })
	}

	pub fn records(&mut self) -> impl Iterator<Item = Result<StoredTrace>> + '_ {
		(0..self.available).map(move |i| self.read_record(i))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config(encoding:SampleEncoding) -> AcquisitionConfig {
		AcquisitionConfig::new(2, 4, 1e6, encoding, 0.018, 2, 3)
	}

	#[test]
	fn header_is_twenty_nine_bytes_little_endian() {
		let header = TraceSetHeader::from_config(&config(SampleEncoding::Float32));
		let mut buf = vec![];
		header.write_to(&mut buf).unwrap();
		assert_eq!(buf.len() as u64, HEADER_LEN);
		assert_eq!(&buf[0..4], &[2, 0, 0, 0]);
		assert_eq!(&buf[4..8], &[4, 0, 0, 0]);
		assert_eq!(buf[8], 1);
		assert_eq!(&buf[9..13], &[5, 0, 0, 0]);
		assert_eq!(&buf[13..21], &1e-6f64.to_le_bytes());
		assert_eq!(&buf[21..29], &1.0f64.to_le_bytes());
	}

	#[test]
	fn record_length_depends_on_encoding() {
		assert_eq!(TraceSetHeader::from_config(&config(SampleEncoding::ScaledInt16)).record_len(), 5 + 8);
		assert_eq!(TraceSetHeader::from_config(&config(SampleEncoding::Float32)).record_len(), 5 + 16);
	}

	#[test]
	fn mismatched_records_are_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = TraceStore::create(dir.path().join("t.trs"), &config(SampleEncoding::ScaledInt16)).unwrap();

		let good = TraceRecord {
			plaintext: vec![1, 2],
			ciphertext: vec![3, 4, 5],
			samples: Samples::Int16(vec![0; 4]),
			is_encryption: true,
		};

		let mut bad = good.clone();
		bad.samples = Samples::Int16(vec![0; 3]);
		assert!(matches!(store.append_record(&bad), Err(Error::RecordMismatch(_))));

		let mut bad = good.clone();
		bad.samples = Samples::Float32(vec![0.0; 4]);
		assert!(matches!(store.append_record(&bad), Err(Error::RecordMismatch(_))));

		let mut bad = good.clone();
		bad.ciphertext.pop();
		assert!(matches!(store.append_record(&bad), Err(Error::RecordMismatch(_))));

		store.append_record(&good).unwrap();
		store.append_record(&good).unwrap();
		assert!(matches!(store.append_record(&good), Err(Error::RecordMismatch(_))));
		assert_eq!(store.written_count(), 2);
	}

	#[test]
	fn close_is_idempotent_and_blocks_appends() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = TraceStore::create(dir.path().join("t.trs"), &config(SampleEncoding::ScaledInt16)).unwrap();
		store.close().unwrap();
		store.close().unwrap();

		let record = TraceRecord {
			plaintext: vec![1, 2],
			ciphertext: vec![3, 4, 5],
			samples: Samples::Int16(vec![0; 4]),
			is_encryption: true,
		};
		assert!(matches!(store.append_record(&record), Err(Error::SessionClosed(_))));
	}

	#[test]
	fn truncated_file_reports_complete_records_only() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("t.trs");
		let cfg = config(SampleEncoding::ScaledInt16);

		let header = TraceSetHeader::from_config(&cfg);
		let mut bytes = vec![];
		header.write_to(&mut bytes).unwrap();
		bytes.extend_from_slice(&[9u8; 13]);
		bytes.extend_from_slice(&[7u8; 5]);
		std::fs::write(&path, &bytes).unwrap();

		let mut reader = TraceSetReader::open(&path).unwrap();
		assert_eq!(reader.len(), 1);
		assert!(reader.is_truncated());
		assert!(reader.read_record(1).is_err());
		assert_eq!(reader.read_record(0).unwrap().data, vec![9u8; 5]);
	}

	#[test]
	fn unknown_encoding_tag_is_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("t.trs");
		let mut bytes = vec![0u8; HEADER_LEN as usize];
		bytes[8] = 7;
		std::fs::write(&path, &bytes).unwrap();
		assert!(matches!(TraceSetReader::open(&path), Err(Error::StoreRead(_))));
	}
}
