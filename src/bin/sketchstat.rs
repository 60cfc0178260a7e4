//! sketchstat --stream [-s] file [--json]
//!
//! Scans a persisted sketch stream and reports the number of records, by strand, and payload sizes.
//! Payloads are not decoded, so the tool works whatever the sketch codec.
//!
//! --stream : the file containing the sketch stream
//! --json : output statistics as json on stdout

use std::fs::File;
use std::io::BufReader;
use std::time::SystemTime;

use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use env_logger::Builder;
use serde::Serialize;

use mhsearch::stream::RecordReader;

// install a logger facility
pub fn init_log() -> u64 {
    Builder::from_default_env().init();
    println!("\n ************** initializing logger *****************\n");
    1
}

#[derive(Default, Debug, Serialize)]
struct StreamStats {
    nb_records: usize,
    nb_forward: usize,
    nb_reverse: usize,
    /// payload bytes, framing excluded
    nb_bytes: usize,
    min_payload: usize,
    max_payload: usize,
}

impl StreamStats {
    fn add(&mut self, forward: bool, size: usize) {
        if self.nb_records == 0 || size < self.min_payload {
            self.min_payload = size;
        }
        self.max_payload = self.max_payload.max(size);
        self.nb_records += 1;
        self.nb_bytes += size;
        if forward {
            self.nb_forward += 1;
        } else {
            self.nb_reverse += 1;
        }
    }

    fn mean_payload(&self) -> f64 {
        if self.nb_records == 0 {
            0.
        } else {
            self.nb_bytes as f64 / self.nb_records as f64
        }
    }
} // end of impl StreamStats

fn main() -> anyhow::Result<()> {
    let _ = init_log();
    //
    let matches = Command::new("sketchstat")
        .about("statistics on a persisted sketch stream")
        .arg(
            Arg::new("stream")
                .long("stream")
                .short('s')
                .required(true)
                .help("file containing the sketch stream"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("dump statistics as json"),
        )
        .get_matches();
    //
    let fname = matches
        .get_one::<String>("stream")
        .context("sketchstat needs a stream file")?;
    let json = matches.get_flag("json");
    log::info!("sketchstat processing file : {}", fname);
    //
    let start_t = SystemTime::now();
    let file = File::open(fname).with_context(|| format!("cannot open stream file {}", fname))?;
    let mut reader = RecordReader::new(BufReader::new(file));
    let mut payload = Vec::<u8>::with_capacity(4096);
    let mut stats = StreamStats::default();
    while let Some(forward) = reader
        .next_record(&mut payload)
        .with_context(|| format!("error after {} records", stats.nb_records))?
    {
        stats.add(forward, payload.len());
    }
    log::info!(
        "sketchstat read {} records in {:.2e} s",
        stats.nb_records,
        start_t.elapsed().unwrap_or_default().as_secs_f64()
    );
    //
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("nb records : {}", stats.nb_records);
        println!("nb forward : {}, nb reverse : {}", stats.nb_forward, stats.nb_reverse);
        println!(
            "payload bytes : {}, min : {}, max : {}, mean : {:.1}",
            stats.nb_bytes,
            stats.min_payload,
            stats.max_payload,
            stats.mean_payload()
        );
    }
    Ok(())
} // end of main
