use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::broker::{BrokerChannel, Delivery, Queue, CONSUMER_GROUP};
use crate::config::Config;
use crate::error::BrokerError;
use crate::handlers::{self, Outcome};
use crate::store::{AppointmentStore, NotificationStore};

/// How long a single receive call blocks before the loop re-checks shutdown.
const POLL_BLOCK: Duration = Duration::from_secs(1);

/// The consumer. Owns the one broker connection and services all five queues
/// sequentially on a single logical thread; a slow handler delays delivery
/// for every queue. That is a deliberate trade-off, fine at the expected
/// volume, and the first thing to revisit if throughput becomes a problem.
pub struct Dispatcher {
    channel: BrokerChannel,
    appointments: Arc<dyn AppointmentStore>,
    notifications: Arc<dyn NotificationStore>,
    handler_timeout: Duration,
    max_delivery_attempts: u32,
}

impl Dispatcher {
    /// Opens the connection and declares/binds all five queues.
    pub async fn connect(
        cfg: &Config,
        appointments: Arc<dyn AppointmentStore>,
        notifications: Arc<dyn NotificationStore>,
    ) -> Result<Self, BrokerError> {
        let channel =
            BrokerChannel::bind(&cfg.redis_url, CONSUMER_GROUP, &cfg.consumer_name).await?;

        Ok(Self {
            channel,
            appointments,
            notifications,
            handler_timeout: cfg.handler_timeout,
            max_delivery_attempts: cfg.max_delivery_attempts,
        })
    }

    /// Spawns the receive loop. It runs until a fatal broker error or until
    /// the returned handle is stopped.
    pub fn start(self) -> DispatcherHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        DispatcherHandle { shutdown, task }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), BrokerError> {
        info!("dispatcher consuming {} queues", Queue::ALL.len());

        loop {
            let delivery = tokio::select! {
                _ = shutdown.changed() => break,
                next = self.channel.next(POLL_BLOCK) => next?,
            };
            let Some(delivery) = delivery else {
                continue;
            };

            let outcome = self.dispatch(&delivery).await;
            self.channel
                .settle(&delivery, outcome, self.max_delivery_attempts)
                .await?;
        }

        info!("dispatcher stopped");
        Ok(())
    }

    async fn dispatch(&self, delivery: &Delivery) -> Outcome {
        dispatch_with_timeout(
            self.appointments.as_ref(),
            self.notifications.as_ref(),
            delivery.queue,
            &delivery.body,
            self.handler_timeout,
        )
        .await
    }
}

/// Routes one message body to its queue's handler, bounded by `timeout` so a
/// hung store call cannot stall the whole loop forever. Exceeding the bound
/// is a transient failure: the message is redelivered, not lost.
pub async fn dispatch_with_timeout(
    appointments: &dyn AppointmentStore,
    notifications: &dyn NotificationStore,
    queue: Queue,
    body: &[u8],
    timeout: Duration,
) -> Outcome {
    let handler = async {
        match queue {
            Queue::Results => handlers::result_added(appointments, notifications, body).await,
            Queue::Requests => handlers::process_request(appointments, notifications, body).await,
            Queue::AppointmentUpdates => {
                handlers::process_appointment(appointments, notifications, body).await
            }
            Queue::Appointment => {
                handlers::notification_confirmed(appointments, notifications, body).await
            }
            Queue::AppointmentCanceled => {
                handlers::cancel_appointment(appointments, notifications, body).await
            }
        }
    };

    match tokio::time::timeout(timeout, handler).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(
                queue = queue.name(),
                "handler exceeded {timeout:?}, treating as transient"
            );
            Outcome::NackRequeue
        }
    }
}

/// Owns the running dispatcher task. Dropping the handle without calling
/// [`stop`](DispatcherHandle::stop) aborts nothing; the task keeps running
/// until its runtime shuts down.
pub struct DispatcherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<(), BrokerError>>,
}

impl DispatcherHandle {
    /// A cloneable trigger that requests shutdown without consuming the
    /// handle, e.g. from a signal task.
    pub fn shutdown_trigger(&self) -> watch::Sender<bool> {
        self.shutdown.clone()
    }

    /// Requests shutdown and waits for in-flight work to settle.
    pub async fn stop(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        self.task.await??;
        Ok(())
    }

    /// Waits until the loop exits on its own (shutdown trigger or fatal
    /// broker error).
    pub async fn join(self) -> anyhow::Result<()> {
        self.task.await??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{self, EventPayload};
    use crate::store::mem::MemoryStore;

    #[tokio::test]
    async fn test_hung_store_call_is_treated_as_transient() {
        let store = MemoryStore::new();
        store.insert_appointment(MemoryStore::pending(1));
        store.delay_lookups(Duration::from_secs(5));

        let body = codec::encode(&EventPayload::new(1)).unwrap();
        let outcome = dispatch_with_timeout(
            &store,
            &store,
            Queue::AppointmentCanceled,
            &body,
            Duration::from_millis(50),
        )
        .await;

        assert_eq!(outcome, Outcome::NackRequeue);
        // The handler was cut off before it could record anything.
        assert!(store.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_fast_handler_completes_within_the_bound() {
        let store = MemoryStore::new();
        store.insert_appointment(MemoryStore::pending(1));

        let body = codec::encode(&EventPayload::new(1)).unwrap();
        let outcome = dispatch_with_timeout(
            &store,
            &store,
            Queue::AppointmentCanceled,
            &body,
            Duration::from_secs(10),
        )
        .await;

        assert_eq!(outcome, Outcome::Ack);
        assert_eq!(store.notifications().len(), 1);
    }
}
