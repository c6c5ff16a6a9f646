//! Job scheduling and duplicate-job deduplication.
//!
//! Jobs are independent and strictly sequential internally; parallelism comes from running
//! several of them at once on a bounded [`JobPool`]. A [`ResultRegistry`] keyed by
//! [`Fingerprint`] lets identical jobs submitted concurrently share one output.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock, mpsc};

use xxhash_rust::xxh3::Xxh3;

use crate::decode::MediaSource;
use crate::engine::ProcessedOutput;
use crate::foundation::error::{ReframeError, ReframeResult};

const XXH3_SEED: u64 = 0x52_46_52_4d_5f_6a_6f_62;

/// Bounded worker pool for transform jobs.
pub struct JobPool {
    pool: rayon::ThreadPool,
}

impl std::fmt::Debug for JobPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobPool")
            .field("threads", &self.threads())
            .finish()
    }
}

impl JobPool {
    /// Build a pool with `threads` workers (`None` = one per core). `Some(0)` is rejected.
    pub fn new(threads: Option<usize>) -> ReframeResult<Self> {
        Ok(Self {
            pool: build_thread_pool(threads)?,
        })
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Queue `job` and return a handle to its result.
    pub fn submit<T, F>(&self, job: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> ReframeResult<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        self.pool.spawn(move || {
            // The receiver may be gone if the handle was dropped.
            let _ = tx.send(job());
        });
        JobHandle { rx }
    }
}

/// Pending result of a submitted job.
#[derive(Debug)]
pub struct JobHandle<T> {
    rx: mpsc::Receiver<ReframeResult<T>>,
}

impl<T> JobHandle<T> {
    /// Block until the job finishes.
    ///
    /// A job that panicked reports an error here instead of a result.
    pub fn join(self) -> ReframeResult<T> {
        self.rx
            .recv()
            .map_err(|_| ReframeError::Other(anyhow::anyhow!("job ended without a result")))?
    }
}

fn build_thread_pool(threads: Option<usize>) -> ReframeResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(ReframeError::validation("pool 'threads' must be >= 1 when set"));
    }

    let mut builder = rayon::ThreadPoolBuilder::new()
        .thread_name(|i| format!("reframe-job-{i}"))
        .panic_handler(|payload| {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(panic = %msg, "job panicked");
        });
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| ReframeError::Other(anyhow::anyhow!("failed to build job pool: {e}")))
}

/// Stable 128-bit identity of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint {
    /// High 64 bits.
    pub hi: u64,
    /// Low 64 bits.
    pub lo: u64,
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}{:016x}", self.hi, self.lo)
    }
}

/// Fingerprint a job from its source, transform key and size budget.
///
/// Byte sources hash their content; path sources hash the path.
pub fn fingerprint(
    source: &MediaSource,
    transform_key: &str,
    max_output_bytes: Option<u64>,
) -> Fingerprint {
    let mut h = Xxh3::with_seed(XXH3_SEED);
    match source {
        MediaSource::Path(p) => {
            h.update(&[0]);
            write_path(&mut h, p);
        }
        MediaSource::Bytes(b) => {
            h.update(&[1]);
            h.update(&(b.len() as u64).to_le_bytes());
            h.update(b);
        }
    }
    h.update(&(transform_key.len() as u64).to_le_bytes());
    h.update(transform_key.as_bytes());
    match max_output_bytes {
        Some(n) => {
            h.update(&[1]);
            h.update(&n.to_le_bytes());
        }
        None => h.update(&[0]),
    }
    let v = h.digest128();
    Fingerprint {
        hi: (v >> 64) as u64,
        lo: v as u64,
    }
}

fn write_path(h: &mut Xxh3, p: &Path) {
    let bytes = p.as_os_str().as_encoded_bytes();
    h.update(&(bytes.len() as u64).to_le_bytes());
    h.update(bytes);
}

type Slot = Arc<RwLock<Option<ProcessedOutput>>>;

/// Finished outputs keyed by job fingerprint.
///
/// The map lock is held only to fetch or create a slot. Computation happens under the
/// slot's own write lock, so a duplicate job blocks until the first one finishes and then
/// reuses its output. Only successful outputs stay registered.
#[derive(Debug, Default)]
pub struct ResultRegistry {
    slots: Mutex<HashMap<Fingerprint, Slot>>,
}

impl ResultRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: Fingerprint) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key).or_default())
    }

    /// Output recorded for `key`, if any.
    pub fn get(&self, key: Fingerprint) -> Option<ProcessedOutput> {
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.get(&key).cloned()
        }?;
        let value = slot.read().unwrap_or_else(PoisonError::into_inner);
        value.clone()
    }

    /// Return the recorded output for `key`, or run `compute` and record its result.
    ///
    /// A failed computation drops the key again, so a later job with the same key retries.
    pub fn get_or_compute<F>(&self, key: Fingerprint, compute: F) -> ReframeResult<ProcessedOutput>
    where
        F: FnOnce() -> ReframeResult<ProcessedOutput>,
    {
        loop {
            let slot = self.slot(key);
            if let Some(out) = slot
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
            {
                return Ok(out.clone());
            }

            let mut value = slot.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(out) = value.as_ref() {
                tracing::debug!(%key, "reusing output of duplicate job");
                return Ok(out.clone());
            }
            // The previous holder failed and evicted this slot.
            if !self.is_current(key, &slot) {
                continue;
            }
            return match compute() {
                Ok(out) => {
                    *value = Some(out.clone());
                    Ok(out)
                }
                Err(e) => {
                    self.evict(key, &slot);
                    Err(e)
                }
            };
        }
    }

    fn is_current(&self, key: Fingerprint, slot: &Slot) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(&key).is_some_and(|s| Arc::ptr_eq(s, slot))
    }

    fn evict(&self, key: Fingerprint, slot: &Slot) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.get(&key).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            slots.remove(&key);
        }
    }

    /// Number of keys recorded or in flight.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// `true` when no key is recorded or in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "../tests/unit/pool/pool.rs"]
mod tests;
