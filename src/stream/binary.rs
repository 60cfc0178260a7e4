//! Persisted sketch streams.
//!
//! A stream is a sequence of records, without header nor terminator:
//!
//! - 1 byte : strand flag, 1 for forward, 0 for reverse
//! - 4 bytes: payload length in bytes, big endian
//! - payload: the sketch encoded by a [`SketchCodec`]
//!
//! End of data before a record starts is the normal end of the stream. End of data inside a
//! record is a [`SearchError::TruncatedRecord`], last record included: a cut stream is reported,
//! never read as a shorter one.
//!
//! The length field is not trusted: the payload buffer grows with the bytes actually read.
//!
//! The payload layout belongs to the codec. A payload from which the codec cannot extract any
//! valid comparison unit gives a [`SearchError::NoValidUnits`]: the reader logs it, skips the
//! record and goes on.

use std::io::{self, BufWriter, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use parking_lot::Mutex;

use crate::errors::{Result, SearchError};
use crate::sketch::Sketch;
use crate::stream::source::SketchSource;
use crate::utils::run_workers;

pub const FORWARD_FLAG: u8 = 1;
pub const REVERSE_FLAG: u8 = 0;

/// size of strand flag + payload length
const HEADER_SIZE: usize = 5;

/// Encoding and decoding of sketch payloads.
pub trait SketchCodec<P>: Sync {
    /// builds a sketch from a payload. forward is the strand flag of the record
    fn decode(&self, forward: bool, bytes: &[u8]) -> Result<Sketch<P>>;

    fn encode(&self, sketch: &Sketch<P>) -> Result<Vec<u8>>;
}

// reads until buf is full or end of data, returns number of bytes read
fn read_full<R: Read>(input: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut nb_read = 0;
    while nb_read < buf.len() {
        match input.read(&mut buf[nb_read..]) {
            Ok(0) => break,
            Ok(n) => nb_read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(nb_read)
} // end of read_full

//=====================================================================================

/// Reads the framing of a stream, payloads are not interpreted.
pub struct RecordReader<R> {
    input: R,
}

impl<R: Read> RecordReader<R> {
    pub fn new(input: R) -> Self {
        RecordReader { input }
    }

    /// Reads next record payload in payload (resized to its length).
    /// Returns the strand flag as forward (true) / reverse (false), or None at end of stream.
    pub fn next_record(&mut self, payload: &mut Vec<u8>) -> Result<Option<bool>> {
        let mut header = [0u8; HEADER_SIZE];
        let nb_read = read_full(&mut self.input, &mut header)?;
        if nb_read == 0 {
            return Ok(None);
        }
        if nb_read < HEADER_SIZE {
            return Err(SearchError::TruncatedRecord {
                expected: HEADER_SIZE,
                got: nb_read,
            });
        }
        let forward = header[0] == FORWARD_FLAG;
        let size = BigEndian::read_u32(&header[1..]) as usize;
        payload.clear();
        let nb_read = (&mut self.input).take(size as u64).read_to_end(payload)?;
        if nb_read < size {
            return Err(SearchError::TruncatedRecord {
                expected: size,
                got: nb_read,
            });
        }
        Ok(Some(forward))
    } // end of next_record

    pub fn into_inner(self) -> R {
        self.input
    }
} // end of impl RecordReader

/// writes one record
pub fn write_record<W: Write>(output: &mut W, forward: bool, payload: &[u8]) -> Result<()> {
    let flag = if forward { FORWARD_FLAG } else { REVERSE_FLAG };
    if payload.len() > u32::MAX as usize {
        return Err(SearchError::InvalidParameter(format!("payload too large : {}", payload.len())));
    }
    output.write_u8(flag)?;
    output.write_u32::<BigEndian>(payload.len() as u32)?;
    output.write_all(payload)?;
    Ok(())
} // end of write_record

//=====================================================================================

struct ReaderState<R> {
    records: RecordReader<R>,
    closed: bool,
}

/// A [`SketchSource`] decoding a persisted stream.
///
/// Can be shared by several threads: reading a record is serialized, decoding is done
/// by the calling thread outside the lock.
pub struct SketchStreamReader<R, C> {
    state: Mutex<ReaderState<R>>,
    codec: C,
    /// skip reverse strand records
    fwd_only: bool,
    nb_processed: AtomicUsize,
    nb_sub_windows: AtomicUsize,
    nb_skipped: AtomicUsize,
}

impl<R: Read, C> SketchStreamReader<R, C> {
    pub fn new(input: R, codec: C, fwd_only: bool) -> Self {
        SketchStreamReader {
            state: Mutex::new(ReaderState {
                records: RecordReader::new(input),
                closed: false,
            }),
            codec,
            fwd_only,
            nb_processed: AtomicUsize::new(0),
            nb_sub_windows: AtomicUsize::new(0),
            nb_skipped: AtomicUsize::new(0),
        }
    }

    /// number of records skipped because they had no valid comparison unit
    pub fn nb_skipped(&self) -> usize {
        self.nb_skipped.load(Ordering::Relaxed)
    }

    // next raw record to decode, None when stream is exhausted
    fn next_payload(&self) -> Result<Option<(bool, Vec<u8>)>> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(None);
        }
        loop {
            let mut payload = Vec::new();
            match state.records.next_record(&mut payload) {
                Ok(Some(forward)) => {
                    if self.fwd_only && !forward {
                        continue;
                    }
                    return Ok(Some((forward, payload)));
                }
                Ok(None) => {
                    state.closed = true;
                    return Ok(None);
                }
                Err(e) => {
                    state.closed = true;
                    log::error!("SketchStreamReader, error reading record : {}", e);
                    return Err(e);
                }
            }
        }
    } // end of next_payload
} // end of impl SketchStreamReader

impl<P, R, C> SketchSource<P> for SketchStreamReader<R, C>
where
    R: Read + Send,
    C: SketchCodec<P>,
{
    fn next_sketch(&self) -> Result<Option<Sketch<P>>> {
        while let Some((forward, payload)) = self.next_payload()? {
            match self.codec.decode(forward, &payload) {
                Ok(sketch) => {
                    self.nb_sub_windows.fetch_add(sketch.get_signature().nb_windows(), Ordering::Relaxed);
                    self.nb_processed.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(sketch));
                }
                Err(e) if e.is_recoverable() => {
                    self.nb_skipped.fetch_add(1, Ordering::Relaxed);
                    log::warn!("skipping record : {}", e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    } // end of next_sketch

    fn nb_processed(&self) -> usize {
        self.nb_processed.load(Ordering::Relaxed)
    }

    fn nb_sub_windows_processed(&self) -> usize {
        self.nb_sub_windows.load(Ordering::Relaxed)
    }
} // end of impl SketchSource for SketchStreamReader

//=====================================================================================

/// Writes records, possibly from several threads. Each record is written atomically.
pub struct SketchStreamWriter<W: Write> {
    output: Mutex<BufWriter<W>>,
    nb_written: AtomicUsize,
}

impl<W: Write> SketchStreamWriter<W> {
    pub fn new(output: W) -> Self {
        SketchStreamWriter {
            output: Mutex::new(BufWriter::new(output)),
            nb_written: AtomicUsize::new(0),
        }
    }

    pub fn write_record(&self, forward: bool, payload: &[u8]) -> Result<()> {
        let mut output = self.output.lock();
        write_record(&mut *output, forward, payload)?;
        self.nb_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// encodes with codec (outside of the lock) and writes
    pub fn write_sketch<P, C: SketchCodec<P>>(&self, sketch: &Sketch<P>, codec: &C) -> Result<()> {
        let payload = codec.encode(sketch)?;
        self.write_record(sketch.get_id().is_forward(), &payload)
    }

    /// Drains source with nb_threads threads, encoding and writing each sketch.
    /// If fwd_only, reverse strand sketches are dropped.
    pub fn write_all<P, S, C>(&self, source: &S, codec: &C, nb_threads: usize, fwd_only: bool) -> Result<usize>
    where
        W: Send,
        S: SketchSource<P> + ?Sized,
        C: SketchCodec<P>,
    {
        let nb_written = run_workers(nb_threads, |abort| {
            let mut nb = 0;
            while !abort.load(Ordering::Relaxed) {
                match source.next_sketch()? {
                    Some(sketch) => {
                        if fwd_only && !sketch.get_id().is_forward() {
                            continue;
                        }
                        self.write_sketch(&sketch, codec)?;
                        nb += 1;
                    }
                    None => break,
                }
            }
            Ok(nb)
        })?;
        self.flush()?;
        log::info!("SketchStreamWriter::write_all, nb sketches written : {}", nb_written);
        Ok(nb_written)
    } // end of write_all

    pub fn nb_written(&self) -> usize {
        self.nb_written.load(Ordering::Relaxed)
    }

    pub fn flush(&self) -> Result<()> {
        self.output.lock().flush()?;
        Ok(())
    }

    /// flushes and returns the underlying writer
    pub fn into_inner(self) -> Result<W> {
        let writer = self.output.into_inner();
        writer.into_inner().map_err(|e| SearchError::Io(e.into_error()))
    }
} // end of impl SketchStreamWriter

//=====================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use byteorder::ReadBytesExt;

    use crate::seqid::SeqId;
    use crate::sketch::MinHashes;
    use crate::stream::source::SketchQueue;

    // payload : id (u64) , length (u32), then min hashes (u32 each) of one window
    struct TestCodec;

    impl SketchCodec<()> for TestCodec {
        fn decode(&self, forward: bool, bytes: &[u8]) -> Result<Sketch<()>> {
            let mut input = Cursor::new(bytes);
            let id = input.read_u64::<BigEndian>()?;
            let length = input.read_u32::<BigEndian>()? as usize;
            let mut values = Vec::new();
            while let Ok(v) = input.read_u32::<BigEndian>() {
                values.push(v);
            }
            if values.is_empty() {
                return Err(SearchError::NoValidUnits {
                    message: format!("sequence {}", id),
                });
            }
            Ok(Sketch::new(SeqId::new(id, forward), length, MinHashes::whole(values)?, ()))
        }

        fn encode(&self, sketch: &Sketch<()>) -> Result<Vec<u8>> {
            let mut out = Vec::new();
            out.write_u64::<BigEndian>(sketch.get_id().header_id())?;
            out.write_u32::<BigEndian>(sketch.get_length() as u32)?;
            for v in sketch.get_signature().values() {
                out.write_u32::<BigEndian>(*v)?;
            }
            Ok(out)
        }
    }

    fn sketch(id: u64, forward: bool) -> Sketch<()> {
        Sketch::new(SeqId::new(id, forward), 1000 + id as usize, MinHashes::whole(vec![1, 2, 3]).unwrap(), ())
    }

    #[test]
    fn test_record_framing() {
        let mut data = Vec::new();
        write_record(&mut data, true, &[7, 8, 9]).unwrap();
        write_record(&mut data, false, &[]).unwrap();
        assert_eq!(&data[..8], &[1, 0, 0, 0, 3, 7, 8, 9]);
        //
        let mut reader = RecordReader::new(Cursor::new(data));
        let mut payload = Vec::new();
        assert_eq!(reader.next_record(&mut payload).unwrap(), Some(true));
        assert_eq!(payload, vec![7, 8, 9]);
        assert_eq!(reader.next_record(&mut payload).unwrap(), Some(false));
        assert!(payload.is_empty());
        assert_eq!(reader.next_record(&mut payload).unwrap(), None);
    }

    #[test]
    fn test_truncated_record() {
        let mut data = Vec::new();
        write_record(&mut data, true, &[7, 8, 9, 10]).unwrap();
        data.truncate(7);
        let mut reader = RecordReader::new(Cursor::new(data));
        let mut payload = Vec::new();
        assert!(matches!(
            reader.next_record(&mut payload),
            Err(SearchError::TruncatedRecord { expected: 4, got: 2 })
        ));
        // a length far beyond the data
        let mut reader = RecordReader::new(Cursor::new(vec![1u8, 0xFF, 0xFF, 0xFF, 0xF0]));
        assert!(matches!(
            reader.next_record(&mut payload),
            Err(SearchError::TruncatedRecord { expected: 0xFFFF_FFF0, got: 0 })
        ));
        assert!(payload.capacity() < 1 << 20);
        let mut reader = RecordReader::new(Cursor::new(vec![1u8, 0]));
        assert!(matches!(
            reader.next_record(&mut payload),
            Err(SearchError::TruncatedRecord { expected: 5, got: 2 })
        ));
    }

    #[test]
    fn test_stream_round_trip_with_bad_record() {
        let writer = SketchStreamWriter::new(Vec::new());
        writer.write_sketch(&sketch(1, true), &TestCodec).unwrap();
        writer.write_sketch(&sketch(1, false), &TestCodec).unwrap();
        // a record with no min hash
        let mut empty = Vec::new();
        empty.write_u64::<BigEndian>(2).unwrap();
        empty.write_u32::<BigEndian>(500).unwrap();
        writer.write_record(true, &empty).unwrap();
        writer.write_sketch(&sketch(3, true), &TestCodec).unwrap();
        assert_eq!(writer.nb_written(), 4);
        let data = writer.into_inner().unwrap();
        //
        let reader = SketchStreamReader::new(Cursor::new(data.clone()), TestCodec, false);
        let mut ids = Vec::new();
        while let Some(s) = SketchSource::<()>::next_sketch(&reader).unwrap() {
            ids.push(s.get_id());
        }
        assert_eq!(ids, vec![SeqId::new(1, true), SeqId::new(1, false), SeqId::new(3, true)]);
        assert_eq!(reader.nb_skipped(), 1);
        assert_eq!(SketchSource::<()>::nb_processed(&reader), 3);
        assert_eq!(SketchSource::<()>::nb_sub_windows_processed(&reader), 3);
        // forward only
        let reader = SketchStreamReader::new(Cursor::new(data), TestCodec, true);
        let queue = SketchQueue::<()>::drain_all(&reader, 3).unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_parallel_write_all() {
        let source = SketchQueue::from_sketches((1..=200).map(|i| sketch(i, i % 2 == 0))).unwrap();
        let writer = SketchStreamWriter::new(Vec::new());
        let nb = writer.write_all(&source, &TestCodec, 4, true).unwrap();
        assert_eq!(nb, 100);
        let data = writer.into_inner().unwrap();
        let reader = SketchStreamReader::new(Cursor::new(data), TestCodec, false);
        let mut nb_read = 0;
        while let Some(s) = SketchSource::<()>::next_sketch(&reader).unwrap() {
            assert!(s.get_id().is_forward());
            assert_eq!(s.get_length(), 1000 + s.get_id().header_id() as usize);
            nb_read += 1;
        }
        assert_eq!(nb_read, 100);
    }
} // end of mod tests
