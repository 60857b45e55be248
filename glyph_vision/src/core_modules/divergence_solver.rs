// THEORY:
// The `divergence_solver` is the numerical heart of the engine. It factorizes
// the observed cell matrix V against the fixed dictionary W by multiplicative
// gradient descent on a beta-divergence, producing the non-negative activation
// matrix H. One parameter sweeps the whole divergence family: beta = 0 is
// Itakura-Saito, beta = 1 is Kullback-Leibler, beta = 2 is squared Euclidean.
//
// Key architectural principles:
// 1.  **Synchronous updates**: Every iteration recomputes the reconstruction
//     `Vapprox = W * H` exactly once, from the fully-updated H of the previous
//     iteration. No entry of H is ever updated against a half-updated
//     reconstruction.
// 2.  **Guarded arithmetic**: `pow(Vapprox, beta - 2)` blows up when the
//     reconstruction is at or near zero, which is routine in this domain (a
//     blank cell, a glyph's empty corner). The per-element guard lives in
//     `safe_divergence_term` so it can be tested apart from the scheduling.
// 3.  **Row-parallel workers**: Rows of H are independent within an iteration,
//     so they are updated by a fixed pool of worker tasks, each owning a
//     disjoint row range. Workers receive an immutable per-iteration snapshot
//     and reply over a oneshot channel; awaiting every reply is the barrier
//     that separates iterations. No locks, because nothing is shared mutably.

use std::ops::Range;
use std::sync::Arc;

use futures::future;
use nalgebra::DMatrix;
use rand::Rng;
use tokio::sync::{mpsc, oneshot};

use crate::core_modules::dictionary::GlyphDictionary;
use crate::error::ConversionError;

/// Reconstruction values at or below this are numerically zero for the
/// purposes of the update rule.
const EPSILON: f64 = 1e-6;

/// H is seeded strictly above zero; a multiplicative update can never lift a
/// row off an exact zero.
const INITIAL_ACTIVATION_RANGE: Range<f64> = 1e-3..1.0;

/// Tunable parameters of the iterative solver.
#[derive(Debug, Clone)]
pub struct DivergenceOptions {
    /// Member of the beta-divergence family to minimize. Any real value is
    /// accepted; 0, 1 and 2 are the named members.
    pub beta: f64,
    /// Fixed number of multiplicative updates. The loop runs to completion or
    /// fails fatally; there is no early exit.
    pub iteration_count: u16,
    /// Maximum number of row workers updating H concurrently.
    pub parallelism: usize,
}

impl Default for DivergenceOptions {
    fn default() -> Self {
        Self {
            beta: 2.0,
            iteration_count: 100,
            parallelism: num_cpus::get(),
        }
    }
}

impl DivergenceOptions {
    /// Defensive parameter check, also run by [`solve`] before any work.
    pub fn validate(&self) -> Result<(), ConversionError> {
        if self.iteration_count == 0 {
            return Err(ConversionError::ZeroIterationCount);
        }
        if self.parallelism == 0 {
            return Err(ConversionError::ZeroParallelism);
        }
        Ok(())
    }
}

/// Immutable per-iteration inputs shared by every row worker.
struct IterationSnapshot {
    /// `W * H` for the H of the previous iteration.
    reconstruction: DMatrix<f64>,
    /// The previous iteration's H.
    activations: DMatrix<f64>,
}

/// Updated values for a set of H rows, keyed by row index.
type RowBlock = Vec<(usize, Vec<f64>)>;

enum RowTask {
    Update {
        snapshot: Arc<IterationSnapshot>,
        reply: oneshot::Sender<RowBlock>,
    },
    Shutdown,
}

/// A fixed pool of row-update workers. Each worker owns one contiguous range
/// of H's rows for the lifetime of a solve.
struct RowWorkerPool {
    task_senders: Vec<mpsc::Sender<RowTask>>,
    #[allow(dead_code)]
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl RowWorkerPool {
    fn new(
        weights: Arc<DMatrix<f64>>,
        cells: Arc<DMatrix<f64>>,
        beta: f64,
        row_ranges: Vec<Range<usize>>,
    ) -> Self {
        let mut task_senders = Vec::with_capacity(row_ranges.len());
        let mut workers = Vec::with_capacity(row_ranges.len());

        for rows in row_ranges {
            let (task_sender, mut task_receiver) = mpsc::channel::<RowTask>(1);
            let weights = Arc::clone(&weights);
            let cells = Arc::clone(&cells);

            let worker = tokio::spawn(async move {
                while let Some(task) = task_receiver.recv().await {
                    match task {
                        RowTask::Update { snapshot, reply } => {
                            let block =
                                update_rows(&weights, &cells, &snapshot, rows.clone(), beta);
                            let _ = reply.send(block);
                        }
                        RowTask::Shutdown => break,
                    }
                }
            });

            task_senders.push(task_sender);
            workers.push(worker);
        }

        Self {
            task_senders,
            workers,
        }
    }

    /// Fans one iteration out to every worker and waits for all of them.
    ///
    /// Awaiting every reply before returning is the inter-iteration barrier:
    /// the caller only recomputes the reconstruction once each row of H has
    /// been delivered.
    async fn run_iteration(
        &self,
        snapshot: IterationSnapshot,
    ) -> Result<Vec<RowBlock>, ConversionError> {
        let snapshot = Arc::new(snapshot);
        let mut replies = Vec::with_capacity(self.task_senders.len());

        for task_sender in &self.task_senders {
            let (reply_sender, reply_receiver) = oneshot::channel();
            task_sender
                .send(RowTask::Update {
                    snapshot: Arc::clone(&snapshot),
                    reply: reply_sender,
                })
                .await
                .map_err(|_| ConversionError::WorkerFailure)?;
            replies.push(reply_receiver);
        }

        future::join_all(replies)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ConversionError::WorkerFailure)
    }

    async fn shutdown(self) {
        for task_sender in &self.task_senders {
            let _ = task_sender.send(RowTask::Shutdown).await;
        }
    }
}

/// Produces the non-negative activation matrix H for `cells` against the
/// dictionary, reporting progress deciles through `report_progress`.
///
/// The callback sees non-decreasing integers from {10, 20, .., 90} while the
/// loop runs, and always a final 100 after it completes. Iteration counts
/// below 10 produce no intermediate notifications at all.
pub async fn solve<F>(
    dictionary: &GlyphDictionary,
    cells: DMatrix<f64>,
    options: &DivergenceOptions,
    mut report_progress: F,
) -> Result<DMatrix<f64>, ConversionError>
where
    F: FnMut(u32),
{
    options.validate()?;

    let glyph_count = dictionary.glyph_count();
    let cell_count = cells.ncols();
    log::debug!(
        "divergence solve: beta={} iterations={} workers<={} H={}x{}",
        options.beta,
        options.iteration_count,
        options.parallelism,
        glyph_count,
        cell_count
    );

    let mut rng = rand::rng();
    let mut activations = DMatrix::from_fn(glyph_count, cell_count, |_, _| {
        rng.random_range(INITIAL_ACTIVATION_RANGE)
    });

    let weights = Arc::new(dictionary.weights().clone());
    let cells = Arc::new(cells);
    let pool = RowWorkerPool::new(
        Arc::clone(&weights),
        Arc::clone(&cells),
        options.beta,
        partition_rows(glyph_count, options.parallelism),
    );

    let iteration_count = u32::from(options.iteration_count);
    let step = iteration_count / 10;
    let mut progress = 0u32;

    for iteration in 0..iteration_count {
        let reconstruction = &*weights * &activations;
        let snapshot = IterationSnapshot {
            reconstruction,
            activations: activations.clone(),
        };

        let blocks = match pool.run_iteration(snapshot).await {
            Ok(blocks) => blocks,
            Err(error) => {
                pool.shutdown().await;
                return Err(error);
            }
        };
        for (row, values) in blocks.into_iter().flatten() {
            for (column, value) in values.into_iter().enumerate() {
                activations[(row, column)] = value;
            }
        }

        if step > 0 && (iteration + 1) % step == 0 {
            progress += 10;
            if progress < 100 {
                report_progress(progress);
            }
        }
    }

    pool.shutdown().await;
    report_progress(100);
    Ok(activations)
}

/// Splits `0..row_count` into at most `parallelism` contiguous, non-empty
/// ranges.
fn partition_rows(row_count: usize, parallelism: usize) -> Vec<Range<usize>> {
    let worker_count = parallelism.min(row_count).max(1);
    let rows_per_worker = row_count.div_ceil(worker_count);
    (0..worker_count)
        .map(|worker| (worker * rows_per_worker)..((worker + 1) * rows_per_worker).min(row_count))
        .filter(|range| !range.is_empty())
        .collect()
}

/// Applies the multiplicative update to one range of H rows.
fn update_rows(
    weights: &DMatrix<f64>,
    cells: &DMatrix<f64>,
    snapshot: &IterationSnapshot,
    rows: Range<usize>,
    beta: f64,
) -> RowBlock {
    let pixel_count = weights.nrows();
    let cell_count = cells.ncols();
    let mut block = RowBlock::with_capacity(rows.len());

    for j in rows {
        let mut updated = Vec::with_capacity(cell_count);
        for k in 0..cell_count {
            let mut numerator = 0.0;
            let mut denominator = 0.0;
            for i in 0..pixel_count {
                let (numerator_term, denominator_term) = safe_divergence_term(
                    weights[(i, j)],
                    cells[(i, k)],
                    snapshot.reconstruction[(i, k)],
                    beta,
                );
                numerator += numerator_term;
                denominator += denominator_term;
            }

            let previous = snapshot.activations[(j, k)];
            // A vanishing denominator means the ratio would blow up; scaling
            // by the numerator alone keeps the update finite.
            let next = if denominator.abs() > EPSILON {
                previous * numerator / denominator
            } else {
                previous * numerator
            };
            updated.push(next);
        }
        block.push((j, updated));
    }

    block
}

/// Per-pixel contribution of one cell to the multiplicative-update ratio.
///
/// Returns the (numerator, denominator) terms for pixel weight `weight`,
/// observed intensity `cell` and reconstructed intensity `reconstruction`.
/// When the reconstruction is at or below [`EPSILON`] the
/// `pow(reconstruction, beta - 2)` factor is unstable: the numerator falls
/// back to `weight * cell`, and the denominator keeps its power term only
/// while the exponent is positive (where it tends to zero anyway) and
/// otherwise degrades to the bare weight.
fn safe_divergence_term(weight: f64, cell: f64, reconstruction: f64, beta: f64) -> (f64, f64) {
    if reconstruction.abs() > EPSILON {
        (
            weight * cell * reconstruction.powf(beta - 2.0),
            weight * reconstruction.powf(beta - 1.0),
        )
    } else if beta - 1.0 > 0.0 {
        (weight * cell, weight * reconstruction.powf(beta - 1.0))
    } else {
        (weight * cell, weight)
    }
}
