use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

pub mod models;
use models::*;

/// File name of the JSON document inside the data directory.
pub const STORE_FILE: &str = "draws.json";

/// Draws keyed by draw number. Serialised with string keys.
pub type DrawMap = BTreeMap<u32, DrawRecord>;

/// Flat-file draw cache: one JSON object mapping draw number → draw record.
///
/// Every I/O or parse failure is logged and treated as "no data"; nothing in
/// here returns an error to request handlers. Upserts inside this process are
/// serialised by a mutex, across processes the last write wins.
#[derive(Clone)]
pub struct DrawStore {
    path: Arc<PathBuf>,
    write_lock: Arc<Mutex<()>>,
}

impl DrawStore {
    /// Open (or create) the store inside `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
        Ok(DrawStore {
            path: Arc::new(dir.join(STORE_FILE)),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every valid draw in the file. Missing or unreadable file → empty map;
    /// individual malformed entries are skipped.
    pub fn read_all(&self) -> DrawMap {
        let bytes = match fs::read(self.path.as_path()) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return DrawMap::new(),
            Err(e) => {
                warn!("Failed to read draw store {}: {}", self.path.display(), e);
                return DrawMap::new();
            }
        };

        let raw: HashMap<String, serde_json::Value> = match serde_json::from_slice(&bytes) {
            Ok(r) => r,
            Err(e) => {
                warn!("Draw store {} is corrupt, ignoring it: {}", self.path.display(), e);
                return DrawMap::new();
            }
        };

        let mut draws = DrawMap::new();
        for (key, value) in raw {
            match serde_json::from_value::<DrawRecord>(value) {
                Ok(record) => {
                    if key.parse::<u32>().ok() != Some(record.draw_no) {
                        debug!("Draw store key {} holds draw {}", key, record.draw_no);
                    }
                    draws.insert(record.draw_no, record);
                }
                Err(e) => warn!("Skipping invalid stored draw {}: {}", key, e),
            }
        }
        draws
    }

    /// Persist the whole map. Failures are logged, never returned.
    pub fn write_all(&self, draws: &DrawMap) {
        if let Err(e) = self.try_write_all(draws) {
            warn!("Failed to write draw store {}: {:#}", self.path.display(), e);
        }
    }

    fn try_write_all(&self, draws: &DrawMap) -> Result<()> {
        let json = serde_json::to_vec_pretty(draws).context("Failed to serialise draws")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, self.path.as_path())
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    pub fn get(&self, draw_no: u32) -> Option<DrawRecord> {
        self.read_all().remove(&draw_no)
    }

    /// Insert or replace one draw.
    pub fn upsert(&self, record: DrawRecord) {
        self.upsert_many(std::iter::once(record));
    }

    /// Insert or replace several draws with a single write.
    /// Returns how many entries were new or changed.
    pub fn upsert_many(&self, records: impl IntoIterator<Item = DrawRecord>) -> usize {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut draws = self.read_all();
        let mut changed = 0;
        for record in records {
            if draws.get(&record.draw_no) != Some(&record) {
                draws.insert(record.draw_no, record);
                changed += 1;
            }
        }
        if changed > 0 {
            self.write_all(&draws);
            debug!("Draw store: {} draw(s) upserted, {} total", changed, draws.len());
        }
        changed
    }

    /// Highest stored draw number, 0 when empty.
    pub fn max_draw_no(&self) -> u32 {
        max_key(&self.read_all())
    }

    /// The newest stored draw, if any.
    pub fn latest(&self) -> Option<DrawRecord> {
        self.read_all().into_values().next_back()
    }

    pub fn len(&self) -> usize {
        self.read_all().len()
    }
}

/// Largest draw number in `draws`, 0 when empty.
pub fn max_key(draws: &DrawMap) -> u32 {
    draws.keys().next_back().copied().unwrap_or(0)
}
