//! Static round-robin worker pool for the frame compositor.

use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::PipelineError;

use super::compositor::{render_frame, FrameContext, FrameScratch, FrameTask};

/// Split `tasks` into `buckets` groups: task `i` goes to bucket `i % buckets`.
pub fn partition<T>(tasks: Vec<T>, buckets: usize) -> Vec<Vec<T>> {
    let buckets = buckets.max(1);
    let mut out: Vec<Vec<T>> = (0..buckets).map(|_| Vec::new()).collect();
    for (i, task) in tasks.into_iter().enumerate() {
        out[i % buckets].push(task);
    }
    out
}

/// Bucket count: configured, else the machine's available parallelism.
pub fn worker_count(configured: Option<usize>) -> usize {
    configured
        .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
        .unwrap_or(1)
        .max(1)
}

fn progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb
}

/// Per-worker RNG: `seed + 1 + bucket` when seeded (the particle field uses
/// `seed` itself), OS entropy otherwise.
fn worker_rng(seed: Option<u64>, bucket: usize) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1 + bucket as u64)),
        None => StdRng::from_os_rng(),
    }
}

/// Render every task on `workers` scoped threads and wait for all of them.
///
/// Failed PNG writes are logged as they happen; the run fails after the join
/// if any frame is missing or any worker panicked.
pub fn run(ctx: &FrameContext, tasks: Vec<FrameTask>, workers: usize, seed: Option<u64>) -> Result<(), PipelineError> {
    let total = tasks.len();
    let buckets = partition(tasks, workers);
    let active = buckets.iter().filter(|b| !b.is_empty()).count();
    log::info!("Rendering {} frames on {} workers...", total, active);

    let pb = progress_bar(total);
    let results: Vec<Result<usize, PipelineError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = buckets
            .into_iter()
            .enumerate()
            .filter(|(_, bucket)| !bucket.is_empty())
            .map(|(id, bucket)| {
                let pb = &pb;
                let handle = scope.spawn(move || {
                    let mut scratch = FrameScratch::new(ctx.layout);
                    let mut rng = worker_rng(seed, id);
                    let mut failed = 0;
                    for task in &bucket {
                        if let Err(e) = render_frame(ctx, task, &mut scratch, &mut rng) {
                            log::error!("Frame {}: {:#}", task.index, e);
                            failed += 1;
                        }
                        pb.inc(1);
                    }
                    log::debug!("Worker {} finished {} frames", id, bucket.len());
                    failed
                });
                (id, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(id, handle)| handle.join().map_err(|_| PipelineError::WorkerPanicked(id)))
            .collect()
    });
    pb.finish_with_message("Rendering complete");

    let mut failed = 0;
    for result in results {
        failed += result?;
    }
    if failed > 0 {
        return Err(PipelineError::FramesNotWritten { failed, total });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_covers_every_task_once() {
        let buckets = partition((0..10).collect(), 3);
        assert_eq!(buckets, vec![vec![0, 3, 6, 9], vec![1, 4, 7], vec![2, 5, 8]]);
        let mut all: Vec<_> = buckets.into_iter().flatten().collect();
        all.sort();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn more_buckets_than_tasks_leaves_empty_buckets() {
        let buckets = partition(vec!['a', 'b'], 4);
        assert_eq!(buckets.len(), 4);
        assert_eq!(buckets.iter().filter(|b| b.is_empty()).count(), 2);
        assert_eq!(partition(vec![1, 2], 0), vec![vec![1, 2]]);
    }

    #[test]
    fn worker_count_prefers_configuration() {
        assert_eq!(worker_count(Some(3)), 3);
        assert_eq!(worker_count(Some(0)), 1);
        assert!(worker_count(None) >= 1);
    }

    #[test]
    fn seeded_workers_get_distinct_streams() {
        use rand::Rng;
        let a: u64 = worker_rng(Some(7), 0).random();
        let b: u64 = worker_rng(Some(7), 1).random();
        let a2: u64 = worker_rng(Some(7), 0).random();
        assert_eq!(a, a2);
        assert_ne!(a, b);
    }
}
