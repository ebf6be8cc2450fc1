//! Parallel driver for the post-close partition sort.
//!
//! Rewriting the unsorted partition files is embarrassingly parallel:
//! every partition is an independent read-sort-rewrite task. The driver
//! pre-loads the partition indexes into a channel, spawns a capped set of
//! workers on a dedicated rayon pool, and lets each worker drain indexes
//! until the queue is empty — so a slow partition never idles the other
//! workers, and no partition is claimed twice. Failures do not stop the
//! run: every partition is still attempted (its final file may simply be
//! missing afterwards) and the first error surfaces once the queue is
//! dry.

use std::io;
use std::sync::Mutex;

/// How many sort workers `num_partitions` partitions get: the configured
/// `num_sort_threads`, or one per available CPU when it is 0, and never
/// more than one per partition.
pub(crate) fn worker_count(num_sort_threads: usize, num_partitions: usize) -> usize {
    let threads = if num_sort_threads == 0 {
        num_cpus::get()
    } else {
        num_sort_threads
    };
    threads.clamp(1, num_partitions.max(1))
}

/// Runs `task` once for every partition index in `0..num_partitions` on
/// `workers` threads, returning the first failure after the whole queue
/// has been drained.
pub(crate) fn run_sort_workers<F>(workers: usize, num_partitions: usize, task: F) -> io::Result<()>
where
    F: Fn(usize) -> io::Result<()> + Send + Sync,
{
    let (tx, rx) = crossbeam_channel::bounded(num_partitions);
    for i in 0..num_partitions {
        tx.send(i).expect("partition queue rejected an index");
    }
    drop(tx);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    let first_err: Mutex<Option<io::Error>> = Mutex::new(None);
    pool.scope(|scope| {
        for _ in 0..workers {
            let rx = rx.clone();
            let task = &task;
            let first_err = &first_err;
            scope.spawn(move |_| {
                while let Ok(i) = rx.try_recv() {
                    if let Err(e) = task(i) {
                        first_err.lock().unwrap().get_or_insert(e);
                    }
                }
            });
        }
    });

    match first_err.into_inner().unwrap() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_partition_claimed_exactly_once() {
        let claimed = Mutex::new(vec![0u32; 17]);
        run_sort_workers(4, 17, |i| {
            *claimed.lock().unwrap().get_mut(i).unwrap() += 1;
            Ok(())
        })
        .unwrap();
        assert!(claimed.into_inner().unwrap().iter().all(|&c| c == 1));
    }

    #[test]
    fn first_error_surfaces_after_the_queue_drains() {
        let attempted = Mutex::new(0usize);
        let result = run_sort_workers(2, 8, |i| {
            *attempted.lock().unwrap() += 1;
            if i % 3 == 0 {
                Err(io::Error::new(io::ErrorKind::Other, "partition failed"))
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
        assert_eq!(*attempted.lock().unwrap(), 8, "failures do not stop the run");
    }

    #[test]
    fn worker_count_clamps_to_partitions() {
        assert_eq!(worker_count(8, 3), 3);
        assert_eq!(worker_count(2, 10), 2);
        assert_eq!(worker_count(5, 1), 1);
        assert!(worker_count(0, 64) >= 1);
    }
}
