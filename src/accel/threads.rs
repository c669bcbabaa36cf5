//! Thread-pool backend.
//!
//! Candidates are classified serially for small batches and in fixed-size
//! chunks on a private rayon pool above [`PARALLEL_CLASSIFY_THRESHOLD`].
//! Chunk results are concatenated in candidate order, so output does not
//! depend on the thread count.

use std::time::Instant;

use rayon::prelude::*;

use super::buffers::{CellState, Classification, NeighborHints, RawCoord, contains_sorted};
use super::timing::StageTimings;
use crate::error::{AccelError, AccelResult};
use crate::rules::next_alive;
use crate::sparse::Coord;

/// Below this many candidates, classification runs serially.
const PARALLEL_CLASSIFY_THRESHOLD: usize = 256;
/// Candidates per parallel work item.
const CLASSIFY_CHUNK: usize = 256;

pub struct ThreadBackend {
    pool: rayon::ThreadPool,
}

impl ThreadBackend {
    pub fn new(threads: usize) -> AccelResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("sparse-life-{i}"))
            .build()
            .map_err(|e| AccelError::unavailable(format!("failed to build thread pool: {e}")))?;
        Ok(Self { pool })
    }

    pub fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Classify `candidates` against the sorted active batch.
    pub fn classify(
        &self,
        sorted_active: &[RawCoord],
        candidates: &[RawCoord],
        hint_capacity: usize,
        timings: &mut StageTimings,
    ) -> Classification {
        let dispatch_start = Instant::now();
        let mut parts: Vec<(Vec<CellState>, Vec<RawCoord>)> =
            if candidates.len() < PARALLEL_CLASSIFY_THRESHOLD {
                vec![classify_owned(sorted_active, candidates)]
            } else {
                self.pool.install(|| {
                    candidates
                        .par_chunks(CLASSIFY_CHUNK)
                        .map(|chunk| classify_owned(sorted_active, chunk))
                        .collect()
                })
            };
        timings.dispatch = dispatch_start.elapsed();

        let download_start = Instant::now();
        let (states, hints) = if parts.len() == 1 {
            parts.pop().unwrap_or_default()
        } else {
            let mut states = Vec::with_capacity(candidates.len());
            let mut hints = Vec::with_capacity(parts.iter().map(|(_, h)| h.len()).sum());
            for (chunk_states, chunk_hints) in parts {
                states.extend_from_slice(&chunk_states);
                hints.extend_from_slice(&chunk_hints);
            }
            (states, hints)
        };
        timings.download = download_start.elapsed();

        Classification {
            states,
            hints: NeighborHints::bounded(hints, hint_capacity),
        }
    }
}

#[inline]
fn classify_owned(sorted_active: &[RawCoord], chunk: &[RawCoord]) -> (Vec<CellState>, Vec<RawCoord>) {
    let mut states = Vec::with_capacity(chunk.len());
    let mut hints = Vec::new();
    classify_chunk(sorted_active, chunk, &mut states, &mut hints);
    (states, hints)
}

/// Classify one run of candidates, appending to `states` and `hints`.
pub(crate) fn classify_chunk(
    sorted_active: &[RawCoord],
    candidates: &[RawCoord],
    states: &mut Vec<CellState>,
    hints: &mut Vec<RawCoord>,
) {
    for &raw in candidates {
        let cell = Coord::from(raw);
        let neighbors = cell
            .neighbors()
            .filter(|&n| contains_sorted(sorted_active, n))
            .count() as u8;
        let alive = contains_sorted(sorted_active, cell);
        let state = CellState::new(cell, alive, next_alive(alive, neighbors));
        if state.changed() {
            hints.extend(cell.neighborhood().map(RawCoord::from));
        }
        states.push(state);
    }
}
