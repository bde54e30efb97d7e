//! Serial request lanes.
//!
//! Jobs pushed under the same key run one at a time in push order. Jobs under
//! different keys run concurrently, each lane on its own task.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::ble_error;

type Runner<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

enum Slot<T> {
    Run(T),
    Flush(oneshot::Sender<()>),
}

pub(crate) struct SerialQueues<K, T> {
    runtime: Handle,
    run: Runner<T>,
    lanes: Mutex<HashMap<K, mpsc::UnboundedSender<Slot<T>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl<K, T> SerialQueues<K, T>
where
    K: Eq + Hash,
    T: Send + 'static,
{
    pub(crate) fn new(
        runtime: Handle,
        run: impl Fn(T) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            runtime,
            run: Arc::new(run),
            lanes: Mutex::new(HashMap::new()),
        }
    }

    /// Queue `job` behind everything already pushed under `key`.
    pub(crate) fn push(&self, key: K, job: T) {
        let mut lanes = lock(&self.lanes);
        let lane = lanes.entry(key).or_insert_with(|| self.open_lane());
        if lane.send(Slot::Run(job)).is_err() {
            ble_error!("request lane closed, request dropped");
        }
    }

    /// Wait until every job pushed so far has finished.
    pub(crate) async fn flush(&self) {
        let waiters: Vec<_> = lock(&self.lanes)
            .values()
            .filter_map(|lane| {
                let (done, wait) = oneshot::channel();
                lane.send(Slot::Flush(done)).ok().map(|()| wait)
            })
            .collect();
        for wait in waiters {
            let _ = wait.await;
        }
    }

    // The lane task ends once its sender is dropped and the backlog is drained.
    fn open_lane(&self) -> mpsc::UnboundedSender<Slot<T>> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let run = Arc::clone(&self.run);
        self.runtime.spawn(async move {
            while let Some(slot) = rx.recv().await {
                match slot {
                    Slot::Run(job) => run(job).await,
                    Slot::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });
        tx
    }
}
