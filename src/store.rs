//! Chunked storage of key hash triples for the build pipeline.
//!
//! Keys are hashed once per seed into `(h0, h1, h2, index)` records, grouped
//! into chunks by the high bits of `h0`. Large record sets spill to an
//! unlinked temp file, so everything on disk disappears when the store is
//! dropped, whatever the build outcome. After [`ChunkedHashStore::check_and_retry`]
//! succeeds the seed is stable and all triples are pairwise distinct, so
//! every retrieval function built from the store keys into the same triples.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, trace};

use crate::bits::BitVector;
use crate::error::MphfError;
use crate::hash::{jenkins, next_seed, HashTriple};

const LOG2_CHUNKS: u32 = 6;
const NUM_CHUNKS: usize = 1 << LOG2_CHUNKS;
const DEFAULT_SPILL_THRESHOLD: usize = 1 << 21;
const RESEED_LIMIT: u32 = 16;
const RECORD_BYTES: usize = 32;

/// One hashed key: its triple plus the index it was added under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HashRecord {
    pub h0: u64,
    pub h1: u64,
    pub h2: u64,
    pub index: u64,
}

impl HashRecord {
    #[inline]
    pub fn triple(&self) -> HashTriple {
        HashTriple {
            h0: self.h0,
            h1: self.h1,
            h2: self.h2,
        }
    }

    #[inline]
    fn chunk(&self) -> usize {
        (self.h0 >> (64 - LOG2_CHUNKS)) as usize
    }

    fn to_bytes(self) -> [u8; RECORD_BYTES] {
        let mut buf = [0u8; RECORD_BYTES];
        buf[0..8].copy_from_slice(&self.h0.to_le_bytes());
        buf[8..16].copy_from_slice(&self.h1.to_le_bytes());
        buf[16..24].copy_from_slice(&self.h2.to_le_bytes());
        buf[24..32].copy_from_slice(&self.index.to_le_bytes());
        buf
    }

    fn from_bytes(buf: &[u8; RECORD_BYTES]) -> Self {
        Self {
            h0: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            h1: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            h2: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            index: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
        }
    }
}

/// Spilled records live in an anonymous temp file, unlinked at creation.
struct Spill {
    file: File,
    records: u64,
}

impl Spill {
    fn create(temp_dir: Option<&Path>) -> std::io::Result<Self> {
        let file = match temp_dir {
            Some(dir) => tempfile::tempfile_in(dir)?,
            None => tempfile::tempfile()?,
        };
        Ok(Self { file, records: 0 })
    }

    fn append(&mut self, record: HashRecord) -> std::io::Result<()> {
        self.file
            .seek(SeekFrom::Start(self.records * RECORD_BYTES as u64))?;
        self.file.write_all(&record.to_bytes())?;
        self.records += 1;
        Ok(())
    }

    fn read_all(&self) -> std::io::Result<Vec<HashRecord>> {
        let mut reader = BufReader::new(&self.file);
        reader.seek(SeekFrom::Start(0))?;
        let mut out = Vec::with_capacity(self.records as usize);
        let mut buf = [0u8; RECORD_BYTES];
        for _ in 0..self.records {
            reader.read_exact(&mut buf)?;
            out.push(HashRecord::from_bytes(&buf));
        }
        Ok(out)
    }
}

/// Streams key hashes into chunks for the out-of-core build phase.
pub struct ChunkedHashStore {
    seed: u64,
    n: u64,
    buffers: Vec<Vec<HashRecord>>,
    spill: Option<Spill>,
    spill_threshold: usize,
    temp_dir: Option<PathBuf>,
    checked: bool,
}

impl ChunkedHashStore {
    pub fn new(seed: u64, temp_dir: Option<&Path>) -> Self {
        Self {
            seed,
            n: 0,
            buffers: vec![Vec::new(); NUM_CHUNKS],
            spill: None,
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
            temp_dir: temp_dir.map(Path::to_path_buf),
            checked: false,
        }
    }

    #[cfg(test)]
    fn with_spill_threshold(mut self, threshold: usize) -> Self {
        self.spill_threshold = threshold;
        self
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.n
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn num_chunks(&self) -> usize {
        NUM_CHUNKS
    }

    /// Hash `bv` under the current seed and append its record. The record's
    /// index is the ingestion position, i.e. the key's rank.
    pub fn add(&mut self, bv: &BitVector) -> Result<(), MphfError> {
        let t = jenkins(bv, self.seed);
        let record = HashRecord {
            h0: t.h0,
            h1: t.h1,
            h2: t.h2,
            index: self.n,
        };
        self.n += 1;
        self.checked = false;
        self.push(record)
    }

    fn push(&mut self, record: HashRecord) -> Result<(), MphfError> {
        if let Some(spill) = &mut self.spill {
            spill.append(record)?;
            return Ok(());
        }
        self.buffers[record.chunk()].push(record);
        if self.n as usize >= self.spill_threshold {
            self.start_spill()?;
        }
        Ok(())
    }

    fn start_spill(&mut self) -> Result<(), MphfError> {
        trace!("spilling {} hash records to disk", self.n);
        let mut spill = Spill::create(self.temp_dir.as_deref())?;
        for buffer in &mut self.buffers {
            for &record in buffer.iter() {
                spill.append(record)?;
            }
            buffer.clear();
        }
        self.spill = Some(spill);
        Ok(())
    }

    /// Drop all records and adopt a new seed. The next ingestion restarts
    /// index assignment from zero.
    pub fn reset(&mut self, seed: u64) {
        self.seed = seed;
        self.n = 0;
        self.checked = false;
        for buffer in &mut self.buffers {
            buffer.clear();
        }
        self.spill = None;
    }

    fn add_all(&mut self, keys: &[BitVector]) -> Result<(), MphfError> {
        let seed = self.seed;
        #[cfg(feature = "parallel")]
        let triples: Vec<HashTriple> = {
            use rayon::prelude::*;
            keys.par_iter().map(|bv| jenkins(bv, seed)).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let triples: Vec<HashTriple> = keys.iter().map(|bv| jenkins(bv, seed)).collect();

        for (index, t) in triples.into_iter().enumerate() {
            self.n += 1;
            self.push(HashRecord {
                h0: t.h0,
                h1: t.h1,
                h2: t.h2,
                index: index as u64,
            })?;
        }
        Ok(())
    }

    /// Rescan `keys` until the triples are pairwise distinct under some seed,
    /// reseeding deterministically up to a bounded number of rounds.
    ///
    /// On success the returned seed is stable: every retrieval function built
    /// from this store afterwards keys into the same triples.
    pub fn check_and_retry(&mut self, keys: &[BitVector]) -> Result<u64, MphfError> {
        let mut state = self.seed;
        for round in 0..=RESEED_LIMIT {
            if round > 0 {
                self.reset(next_seed(&mut state));
            }
            if self.n as usize != keys.len() {
                let seed = self.seed;
                self.reset(seed);
                self.add_all(keys)?;
            }
            if self.triples_distinct()? {
                self.checked = true;
                debug!("store seed 0x{:x} stable after {round} reseed(s)", self.seed);
                return Ok(self.seed);
            }
            trace!("triple collision in store, reseeding (round {})", round + 1);
        }
        Err(MphfError::ConstructionFailed)
    }

    /// True once `check_and_retry` has succeeded for the current seed.
    pub fn is_checked(&self) -> bool {
        self.checked
    }

    fn triples_distinct(&self) -> Result<bool, MphfError> {
        // Equal triples share h0, hence land in the same chunk.
        for c in 0..NUM_CHUNKS {
            let records = self.chunk(c)?;
            for w in records.windows(2) {
                if (w[0].h0, w[0].h1, w[0].h2) == (w[1].h0, w[1].h1, w[1].h2) {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Records of chunk `c`, sorted by triple then index. The order is
    /// deterministic for a given seed and key set.
    pub fn chunk(&self, c: usize) -> Result<Vec<HashRecord>, MphfError> {
        let mut records = match &self.spill {
            Some(spill) => spill
                .read_all()?
                .into_iter()
                .filter(|r| r.chunk() == c)
                .collect(),
            None => self.buffers[c].clone(),
        };
        records.sort_unstable();
        Ok(records)
    }

    /// All records, chunk by chunk, in the deterministic iteration order.
    pub fn records(&self) -> Result<Vec<HashRecord>, MphfError> {
        let mut out = Vec::with_capacity(self.n as usize);
        for c in 0..NUM_CHUNKS {
            out.extend(self.chunk(c)?);
        }
        Ok(out)
    }
}
