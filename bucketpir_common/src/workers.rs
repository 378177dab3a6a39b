use crate::error::BucketPIRError;
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};

/// Bounded pool fanning per-bucket work out over a fixed number of threads.
pub struct WorkerPool {
    threads: usize,
    pool: ThreadPool,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<WorkerPool, BucketPIRError> {
        if threads == 0 {
            return Err(BucketPIRError::ZeroValuedSchemaField("threads"));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("bucketpir-worker-{idx}"))
            .build()
            .map_err(|err| BucketPIRError::WorkerPool(err.to_string()))?;

        Ok(WorkerPool { threads, pool })
    }

    #[inline(always)]
    pub const fn threads(&self) -> usize {
        self.threads
    }

    /// Runs `task` on every element of `items`, returning results in input order once all of them finished. With a
    /// single thread, tasks run one after another in input order. Tasks always run inside the pool, so nested parallel
    /// iterators stay within its threads.
    ///
    /// The first error, in input order, is returned.
    pub fn run<T, U, F>(&self, items: &[T], task: F) -> Result<Vec<U>, BucketPIRError>
    where
        T: Sync,
        U: Send,
        F: Fn(usize, &T) -> Result<U, BucketPIRError> + Sync + Send,
    {
        if self.threads == 1 {
            return self.pool.install(|| items.iter().enumerate().map(|(idx, item)| task(idx, item)).collect());
        }

        let results: Vec<Result<U, BucketPIRError>> = self.pool.install(|| items.par_iter().enumerate().map(|(idx, item)| task(idx, item)).collect());
        results.into_iter().collect()
    }

    /// Like [`WorkerPool::run`], handing every task exclusive access to its element.
    pub fn run_mut<T, U, F>(&self, items: &mut [T], task: F) -> Result<Vec<U>, BucketPIRError>
    where
        T: Send,
        U: Send,
        F: Fn(usize, &mut T) -> Result<U, BucketPIRError> + Sync + Send,
    {
        if self.threads == 1 {
            return self.pool.install(|| items.iter_mut().enumerate().map(|(idx, item)| task(idx, item)).collect());
        }

        let results: Vec<Result<U, BucketPIRError>> = self.pool.install(|| items.par_iter_mut().enumerate().map(|(idx, item)| task(idx, item)).collect());
        results.into_iter().collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Mutex;
    use test_case::test_case;

    #[test_case(1; "sequential")]
    #[test_case(4; "parallel")]
    fn results_keep_input_order(threads: usize) {
        let pool = WorkerPool::new(threads).unwrap();
        let items: Vec<u64> = (0..100).collect();

        let squares = pool.run(&items, |idx, &v| Ok((idx as u64, v * v))).unwrap();
        assert_eq!(squares, (0..100).map(|v| (v, v * v)).collect::<Vec<_>>());
    }

    #[test]
    fn single_thread_runs_in_order() {
        let pool = WorkerPool::new(1).unwrap();
        let visited = Mutex::new(Vec::new());

        pool.run(&[3, 1, 2], |idx, _| {
            visited.lock().unwrap().push(idx);
            Ok(())
        })
        .unwrap();

        assert_eq!(visited.into_inner().unwrap(), vec![0, 1, 2]);
    }

    #[test_case(1; "single thread")]
    #[test_case(2; "two threads")]
    fn nested_parallelism_stays_within_pool(threads: usize) {
        let pool = WorkerPool::new(threads).unwrap();
        let items: Vec<u64> = (0..8).collect();

        let seen = pool.run(&items, |_, _| Ok(rayon::current_num_threads())).unwrap();
        assert!(seen.iter().all(|&n| n == threads));

        let mut items = items;
        let seen = pool.run_mut(&mut items, |_, _| Ok(rayon::current_num_threads())).unwrap();
        assert!(seen.iter().all(|&n| n == threads));
    }

    #[test]
    fn first_error_is_reported() {
        let pool = WorkerPool::new(2).unwrap();
        let items: Vec<u64> = (0..16).collect();

        let res = pool.run(&items, |_, &v| {
            if v >= 5 {
                Err(BucketPIRError::EntryOutOfRange { index: v, num: 5 })
            } else {
                Ok(v)
            }
        });
        assert!(matches!(res, Err(BucketPIRError::EntryOutOfRange { index: 5, num: 5 })));
    }

    #[test]
    fn tasks_may_mutate_their_item() {
        let pool = WorkerPool::new(3).unwrap();
        let mut items = vec![0u64; 10];

        pool.run_mut(&mut items, |idx, v| {
            *v = idx as u64 + 1;
            Ok(())
        })
        .unwrap();

        assert_eq!(items, (1..=10).collect::<Vec<u64>>());
    }

    #[test]
    fn zero_threads_are_rejected() {
        assert!(matches!(WorkerPool::new(0), Err(BucketPIRError::ZeroValuedSchemaField("threads"))));
    }
}
