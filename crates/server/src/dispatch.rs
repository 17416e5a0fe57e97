use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use kodbook_core::flows::InboundEvent;
use kodbook_core::ChatKey;
use kodbook_telegram::{DispatchError, InboundHandler};

#[async_trait]
pub trait EventProcessor: Send + Sync + 'static {
    async fn process(&self, event: InboundEvent);
}

struct Worker {
    generation: u64,
    sender: mpsc::UnboundedSender<InboundEvent>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    workers: HashMap<ChatKey, Worker>,
    next_generation: u64,
}

/// One sequential worker per chat key. Events for a key are processed in the order
/// they were dispatched; different keys run in parallel. Sends happen under the
/// registry lock, so a worker that retires after `idle_timeout` never drops an event.
pub struct KeyedDispatcher<P> {
    processor: Arc<P>,
    registry: Arc<Mutex<Registry>>,
    idle_timeout: Duration,
}

impl<P: EventProcessor> KeyedDispatcher<P> {
    pub fn new(processor: Arc<P>, idle_timeout: Duration) -> Self {
        Self { processor, registry: Arc::new(Mutex::new(Registry::default())), idle_timeout }
    }

    pub async fn submit(&self, event: InboundEvent) {
        let mut registry = self.registry.lock().await;
        let key = event.chat_key.clone();

        let event = match registry.workers.get(&key) {
            Some(worker) => match worker.sender.send(event) {
                Ok(()) => return,
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };

        let generation = registry.next_generation;
        registry.next_generation += 1;
        let (sender, receiver) = mpsc::unbounded_channel();
        // The receiver is alive until the spawned task drops it.
        let _ = sender.send(event);
        let handle = tokio::spawn(run_worker(
            key.clone(),
            generation,
            receiver,
            self.processor.clone(),
            self.registry.clone(),
            self.idle_timeout,
        ));
        debug!(chat_key = %key, generation, "spawned chat worker");
        registry.workers.insert(key, Worker { generation, sender, handle });
    }

    /// Stops accepting events and waits for queued ones to finish, up to `grace`.
    pub async fn shutdown(&self, grace: Duration) {
        let workers: Vec<Worker> = {
            let mut registry = self.registry.lock().await;
            registry.workers.drain().map(|(_, worker)| worker).collect()
        };

        debug!(workers = workers.len(), "draining chat workers");
        let handles: Vec<JoinHandle<()>> = workers
            .into_iter()
            .map(|Worker { sender, handle, .. }| {
                drop(sender);
                handle
            })
            .collect();

        let drained = tokio::time::timeout(grace, async {
            for handle in handles {
                let _ = handle.await;
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                event_name = "system.dispatch.shutdown_timeout",
                grace_secs = grace.as_secs(),
                "chat workers did not finish before shutdown grace period"
            );
        }
    }
}

async fn run_worker<P: EventProcessor>(
    key: ChatKey,
    generation: u64,
    mut receiver: mpsc::UnboundedReceiver<InboundEvent>,
    processor: Arc<P>,
    registry: Arc<Mutex<Registry>>,
    idle_timeout: Duration,
) {
    loop {
        match tokio::time::timeout(idle_timeout, receiver.recv()).await {
            Ok(Some(event)) => processor.process(event).await,
            Ok(None) => return,
            Err(_idle) => {
                let mut registry = registry.lock().await;
                if let Ok(event) = receiver.try_recv() {
                    drop(registry);
                    processor.process(event).await;
                    continue;
                }
                if registry.workers.get(&key).is_some_and(|worker| worker.generation == generation)
                {
                    registry.workers.remove(&key);
                }
                debug!(chat_key = %key, generation, "retired idle chat worker");
                return;
            }
        }
    }
}

#[async_trait]
impl<P: EventProcessor> InboundHandler for KeyedDispatcher<P> {
    async fn dispatch(&self, event: InboundEvent) -> Result<(), DispatchError> {
        self.submit(event).await;
        Ok(())
    }
}
