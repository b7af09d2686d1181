use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;

use anyhow::Result;

/// Drain `items` with a fixed-size pool of workers and wait for every item
/// to be processed.
///
/// All items are queued before the first worker spawns. Each worker pops
/// until the queue is empty and then exits, so the pool shrinks to nothing
/// once drained. A failing item is logged and abandoned; it never takes the
/// worker or the pool down, which keeps the drain barrier reliable even when
/// some items error out. A pool size of 1 processes strictly serially.
pub async fn run_workers<T, F, Fut>(pool_size: usize, items: Vec<T>, work: F)
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<()>> + Send,
{
    let queue = Arc::new(Mutex::new(VecDeque::from(items)));
    let mut workers = JoinSet::new();

    for _ in 0..pool_size.max(1) {
        let queue = Arc::clone(&queue);
        let work = work.clone();
        workers.spawn(async move {
            loop {
                let item = queue.lock().await.pop_front();
                let Some(item) = item else {
                    return;
                };
                if let Err(err) = work(item).await {
                    eprintln!("worker error: {err:#}");
                }
            }
        });
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(err) = joined {
            eprintln!("worker task failed: {err}");
        }
    }
}
