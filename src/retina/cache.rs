//! Two-tier cache of computed retinal responses: an in-run map that avoids
//! recomputation across trials within one process, and an on-disk store that
//! survives runs. The disk tier is single-writer and is bypassed whenever
//! more than one simulation shard is active.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::sync::Arc;

use itertools::Itertools;
use log::debug;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::cell::CurrentTrace;
use crate::context::RunContext;
use crate::error::LgnError;

const INDEX_FILE: &str = "stimuli.idx";

/// Identity of a presented stimulus: a name plus its parameter values. The
/// trial number is carried but excluded from the cache key, so repeated
/// trials of one stimulus share the cached responses.
///
/// The key is built from the name and parameters only. Every setting that
/// changes the response, including the presentation duration, must be part
/// of the parameters via [`with_parameter`](Self::with_parameter); otherwise
/// a later presentation with a different duration silently reuses the traces
/// computed for the first one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StimulusId {
    name: String,
    parameters: BTreeMap<String, String>,
    trial: Option<u64>,
}

impl StimulusId {
    pub fn new(name: &str) -> Self {
        StimulusId {
            name: name.to_string(),
            parameters: BTreeMap::new(),
            trial: None,
        }
    }

    pub fn with_parameter(mut self, key: &str, value: &str) -> Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_trial(mut self, trial: u64) -> Self {
        self.trial = Some(trial);
        self
    }

    pub fn trial(&self) -> Option<u64> {
        self.trial
    }

    /// The cache key: stimulus identity with the trial number stripped.
    pub fn cache_key(&self) -> String {
        let params = self
            .parameters
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .join(",");
        format!("{}[{}]", self.name, params)
    }
}

/// Cached responses to one stimulus: per-population per-neuron current
/// traces, plus the full-field frames shown to the retina (when captured).
/// Injection noise is never part of an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StimulusCacheEntry {
    pub input_currents: BTreeMap<String, Vec<CurrentTrace>>,
    pub retinal_input: Vec<Array2<f64>>,
}

/// The two-tier stimulus cache.
#[derive(Debug)]
pub struct StimulusCache {
    context: RunContext,
    in_run: HashMap<String, Arc<StimulusCacheEntry>>,
}

impl StimulusCache {
    pub fn new(context: RunContext) -> Self {
        StimulusCache {
            context,
            in_run: HashMap::new(),
        }
    }

    /// Look up the responses for a cache key: disk tier first (when active),
    /// then the in-run tier. A missing index file means an empty disk cache;
    /// an unreadable index or entry file is a fatal I/O error.
    pub fn get(&mut self, key: &str) -> Result<Option<Arc<StimulusCacheEntry>>, LgnError> {
        if self.context.disk_cache_active() {
            let index = self.load_index()?;
            if let Some(id) = index.get(key) {
                debug!("Retrieved responses for {} from the disk cache", key);
                let entry = Arc::new(self.load_entry(*id)?);
                self.in_run.insert(key.to_string(), entry.clone());
                return Ok(Some(entry));
            }
        }
        Ok(self.in_run.get(key).cloned())
    }

    /// Store an entry in both tiers (the disk tier only when active and the
    /// key is not already present).
    pub fn insert(
        &mut self,
        key: &str,
        entry: Arc<StimulusCacheEntry>,
    ) -> Result<(), LgnError> {
        if self.context.disk_cache_active() {
            let mut index = self.load_index()?;
            if !index.contains_key(key) {
                let id = index.values().max().map_or(0, |m| m + 1);
                index.insert(key.to_string(), id);
                debug!("Storing responses for {} to the disk cache ({})", key, id);
                // The entry file is written before the index so the index
                // never points at a missing file.
                self.store_entry(id, &entry)?;
                self.store_index(&index)?;
            }
        }
        self.in_run.insert(key.to_string(), entry);
        Ok(())
    }

    fn index_path(&self) -> std::path::PathBuf {
        self.context.cache_path().join(INDEX_FILE)
    }

    fn entry_path(&self, id: u64) -> std::path::PathBuf {
        self.context.cache_path().join(format!("{}.st", id))
    }

    fn load_index(&self) -> Result<BTreeMap<String, u64>, LgnError> {
        let path = self.index_path();
        if !path.is_file() {
            return Ok(BTreeMap::new());
        }
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    fn store_index(&self, index: &BTreeMap<String, u64>) -> Result<(), LgnError> {
        let mut writer = BufWriter::new(File::create(self.index_path())?);
        serde_json::to_writer(&mut writer, index)?;
        writer.flush()?;
        Ok(())
    }

    fn load_entry(&self, id: u64) -> Result<StimulusCacheEntry, LgnError> {
        let reader = BufReader::new(File::open(self.entry_path(id))?);
        Ok(serde_json::from_reader(reader)?)
    }

    fn store_entry(&self, id: u64, entry: &StimulusCacheEntry) -> Result<(), LgnError> {
        let mut writer = BufWriter::new(File::create(self.entry_path(id))?);
        serde_json::to_writer(&mut writer, entry)?;
        writer.flush()?;
        Ok(())
    }
}
