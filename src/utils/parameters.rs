//! structures related to search parameters

use std::fs::OpenOptions;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use serde_json::to_writer;

use crate::errors::SearchError;

/// name of parameters dump in a directory
pub const PARAMETERS_FILE: &str = "parameters.json";

/// Parameters used to build the index and to search it.
/// The same values must be used for construction and requests so the structure is json serialized.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    /// number of min hash functions (H), i.e number of bucket tables
    pub num_hashes: usize,
    /// minimum number of shared buckets for a candidate to be verified
    pub min_matches: u32,
    /// sequences shorter than this are short: stored and searchable but not reported as targets
    pub min_store_length: usize,
    /// bound on shift explored by verification, as fraction of sequence length
    pub max_shift: f64,
    /// minimum verifier score for a match to be reported
    pub accept_score: f64,
    /// if true short sequences are inserted in buckets too
    pub index_short_targets: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams {
            num_hashes: 512,
            min_matches: 3,
            min_store_length: 0,
            max_shift: 0.2,
            accept_score: 0.78,
            index_short_targets: false,
        }
    }
} // end of default for SearchParams

impl SearchParams {
    pub fn new(num_hashes: usize, min_matches: u32, min_store_length: usize, max_shift: f64, accept_score: f64) -> Self {
        SearchParams {
            num_hashes,
            min_matches,
            min_store_length,
            max_shift,
            accept_score,
            index_short_targets: false,
        }
    }

    /// returns a copy with short sequences inserted in buckets
    pub fn with_short_targets(mut self, index_short_targets: bool) -> Self {
        self.index_short_targets = index_short_targets;
        self
    }

    /// checks ranges of parameters
    pub fn check(&self) -> Result<(), SearchError> {
        if self.num_hashes == 0 {
            return Err(SearchError::InvalidParameter("num_hashes must be > 0".to_string()));
        }
        if self.min_matches == 0 {
            return Err(SearchError::InvalidParameter("min_matches must be > 0".to_string()));
        }
        if !(0. ..=1.).contains(&self.accept_score) {
            return Err(SearchError::InvalidParameter(format!("accept_score {} not in [0,1]", self.accept_score)));
        }
        if !(0. ..=1.).contains(&self.max_shift) {
            return Err(SearchError::InvalidParameter(format!("max_shift {} not in [0,1]", self.max_shift)));
        }
        Ok(())
    } // end of check

    /// dump in file parameters.json of directory dirpath
    pub fn dump_json(&self, dirpath: &Path) -> anyhow::Result<()> {
        //
        let filepath = dirpath.join(PARAMETERS_FILE);
        //
        log::info!("dumping SearchParams in json file : {:?}", filepath);
        //
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&filepath)
            .with_context(|| format!("SearchParams dump could not open file {:?}", filepath.as_os_str()))?;
        let mut writer = BufWriter::new(file);
        to_writer(&mut writer, &self)?;
        //
        Ok(())
    } // end of dump_json

    /// reload from a json dump. Used when querying to ensure coherence with index construction
    pub fn reload_json(dirpath: &Path) -> anyhow::Result<Self> {
        let filepath = dirpath.join(PARAMETERS_FILE);
        let file = OpenOptions::new()
            .read(true)
            .open(&filepath)
            .with_context(|| format!("SearchParams reload_json could not open file {:?}", filepath.as_os_str()))?;
        let reader = BufReader::new(file);
        let params: Self = serde_json::from_reader(reader)?;
        params.check().map_err(|e| anyhow!("reloaded parameters are invalid : {}", e))?;
        //
        log::info!(
            "SearchParams reload, nb hashes : {}, min matches : {}",
            params.num_hashes,
            params.min_matches
        );
        //
        Ok(params)
    } // end of reload_json
} // end of impl SearchParams

//=====================================================================================

/// number of threads to use when the caller does not choose
pub fn default_nb_threads() -> usize {
    num_cpus::get().max(1)
}

//=====================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check() {
        assert!(SearchParams::default().check().is_ok());
        let mut params = SearchParams::default();
        params.num_hashes = 0;
        assert!(params.check().is_err());
        let params = SearchParams::new(4, 2, 0, 0.2, 1.5);
        assert!(matches!(params.check(), Err(SearchError::InvalidParameter(_))));
        assert!(default_nb_threads() >= 1);
    }

    #[test]
    fn test_dump_reload() {
        let dir = tempfile::tempdir().unwrap();
        let params = SearchParams::new(128, 4, 2000, 0.1, 0.8).with_short_targets(true);
        params.dump_json(dir.path()).unwrap();
        let reloaded = SearchParams::reload_json(dir.path()).unwrap();
        assert_eq!(reloaded, params);
        // no dump there
        let empty = tempfile::tempdir().unwrap();
        assert!(SearchParams::reload_json(empty.path()).is_err());
    }
} // end of mod tests
