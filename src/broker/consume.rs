use std::collections::VecDeque;
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tracing::warn;

use crate::error::BrokerError;
use crate::handlers::Outcome;

use super::{
    Delivery, Queue, STREAM_ATTEMPT_KEY, STREAM_ID_ADDITIONS, STREAM_ID_HEAD, STREAM_ID_NEW,
    STREAM_PAYLOAD_KEY,
};

/// Entries fetched per read while walking the pending list on startup.
const PEL_BATCH: usize = 64;

/// What a handler outcome means for the broker, given how often the entry
/// has already been delivered.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SettleAction {
    Ack,
    DeadLetter,
    Redeliver { next_attempt: u32 },
}

pub(crate) fn settle_plan(outcome: Outcome, attempt: u32, max_attempts: u32) -> SettleAction {
    match outcome {
        Outcome::Ack => SettleAction::Ack,
        Outcome::NackDrop => SettleAction::DeadLetter,
        Outcome::NackRequeue if attempt >= max_attempts => SettleAction::DeadLetter,
        Outcome::NackRequeue => SettleAction::Redeliver {
            next_attempt: attempt + 1,
        },
    }
}

/// Owns the one connection the dispatcher consumes through. All five queues
/// are bound at construction; entries read but not yet settled sit in the
/// consumer group's pending list and are drained again after a restart.
pub struct BrokerChannel {
    con: MultiplexedConnection,
    group: String,
    consumer: String,
    backlog: VecDeque<Delivery>,
}

impl BrokerChannel {
    pub async fn bind(
        redis_url: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url)?;
        let mut con = client.get_multiplexed_async_connection().await?;

        // Create each stream and its consumer group if absent. Re-binding an
        // existing group answers BUSYGROUP, which is not an error here.
        for queue in Queue::ALL {
            con.xgroup_create_mkstream::<_, _, _, ()>(queue.name(), group, STREAM_ID_HEAD)
                .await
                .ok();
        }

        let mut channel = Self {
            con,
            group: group.to_string(),
            consumer: consumer.to_string(),
            backlog: VecDeque::new(),
        };
        channel.drain_pending().await?;
        Ok(channel)
    }

    /// Re-reads entries this consumer received before a crash but never
    /// settled, so they are processed before anything new. The pending list
    /// can hold more entries than one read returns, so the ids advance past
    /// each batch and the walk continues until every stream comes back
    /// empty.
    async fn drain_pending(&mut self) -> Result<(), BrokerError> {
        let mut cursors: Vec<(Queue, String)> = Queue::ALL
            .iter()
            .map(|q| (*q, STREAM_ID_HEAD.to_string()))
            .collect();

        while !cursors.is_empty() {
            let keys: Vec<&str> = cursors.iter().map(|(q, _)| q.name()).collect();
            let ids: Vec<&str> = cursors.iter().map(|(_, id)| id.as_str()).collect();
            let options = StreamReadOptions::default()
                .group(&self.group, &self.consumer)
                .count(PEL_BATCH);

            let reply: StreamReadReply = self.con.xread_options(&keys, &ids, &options).await?;
            let batches = self.enqueue_reply(reply);
            cursors = advance_pel_cursors(cursors, &batches);
        }

        if !self.backlog.is_empty() {
            warn!(
                pending = self.backlog.len(),
                "recovered unsettled deliveries from a previous run"
            );
        }
        Ok(())
    }

    /// Returns the next delivery, blocking up to `block` for new entries.
    /// `Ok(None)` means the wait timed out with all queues idle.
    pub async fn next(&mut self, block: Duration) -> Result<Option<Delivery>, BrokerError> {
        if let Some(delivery) = self.backlog.pop_front() {
            return Ok(Some(delivery));
        }

        let keys: Vec<&str> = Queue::ALL.iter().map(|q| q.name()).collect();
        let ids = vec![STREAM_ID_ADDITIONS; keys.len()];
        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(1)
            .block(block.as_millis() as usize);

        let reply: StreamReadReply = self.con.xread_options(&keys, &ids, &options).await?;
        self.enqueue_reply(reply);

        Ok(self.backlog.pop_front())
    }

    /// Pushes every readable entry onto the backlog and reports, per stream,
    /// the entry ids seen (readable or not) so pending-list walks can
    /// advance past them.
    fn enqueue_reply(&mut self, reply: StreamReadReply) -> Vec<(Queue, Vec<String>)> {
        let mut batches = Vec::new();
        for stream in reply.keys {
            let Some(queue) = Queue::from_key(&stream.key) else {
                warn!(key = %stream.key, "entry from unknown stream, ignoring");
                continue;
            };
            let mut seen = Vec::with_capacity(stream.ids.len());
            for entry in stream.ids {
                seen.push(entry.id.clone());
                match delivery_from_entry(queue, entry) {
                    Ok(delivery) => self.backlog.push_back(delivery),
                    Err(e) => warn!(queue = queue.name(), "dropping unreadable entry: {e}"),
                }
            }
            batches.push((queue, seen));
        }
        batches
    }

    /// Applies a handler outcome. Redelivery and dead-lettering both write
    /// the copy before the original is acknowledged, so a crash in between
    /// duplicates the entry rather than losing it (at-least-once).
    pub async fn settle(
        &mut self,
        delivery: &Delivery,
        outcome: Outcome,
        max_attempts: u32,
    ) -> Result<(), BrokerError> {
        match settle_plan(outcome, delivery.attempt, max_attempts) {
            SettleAction::Ack => {}
            SettleAction::DeadLetter => {
                let key = delivery.queue.dead_letter_key();
                warn!(
                    queue = delivery.queue.name(),
                    attempt = delivery.attempt,
                    "routing entry to {key}"
                );
                self.append(&key, &delivery.body, delivery.attempt).await?;
            }
            SettleAction::Redeliver { next_attempt } => {
                self.append(delivery.queue.name(), &delivery.body, next_attempt)
                    .await?;
            }
        }

        self.con
            .xack::<_, _, _, ()>(delivery.queue.name(), &self.group, &[&delivery.entry_id])
            .await?;
        Ok(())
    }

    async fn append(&mut self, key: &str, body: &[u8], attempt: u32) -> Result<(), BrokerError> {
        let items: [(&str, Vec<u8>); 2] = [
            (STREAM_PAYLOAD_KEY, body.to_vec()),
            (STREAM_ATTEMPT_KEY, attempt.to_string().into_bytes()),
        ];
        let _: String = self.con.xadd(key, STREAM_ID_NEW, &items).await?;
        Ok(())
    }
}

/// Next read position per stream while walking the pending list. A stream
/// that returned no entries, or none at all, is fully drained and drops out
/// of the walk; otherwise the cursor moves past the last entry seen.
fn advance_pel_cursors(
    cursors: Vec<(Queue, String)>,
    batches: &[(Queue, Vec<String>)],
) -> Vec<(Queue, String)> {
    cursors
        .into_iter()
        .filter_map(|(queue, _)| {
            let last = batches
                .iter()
                .find(|(q, _)| *q == queue)
                .and_then(|(_, ids)| ids.last().cloned())?;
            Some((queue, last))
        })
        .collect()
}

fn delivery_from_entry(queue: Queue, entry: StreamId) -> Result<Delivery, BrokerError> {
    let body = entry
        .get::<Vec<u8>>(STREAM_PAYLOAD_KEY)
        .ok_or(BrokerError::MissingPayload)?;

    // An entry without a readable counter has been tampered with or predates
    // this format. Counting it as a final attempt keeps retries bounded; a
    // reset to 1 would reopen unbounded redelivery.
    let attempt = match entry
        .get::<String>(STREAM_ATTEMPT_KEY)
        .and_then(|s| s.parse::<u32>().ok())
    {
        Some(attempt) => attempt,
        None => {
            warn!(
                queue = queue.name(),
                id = %entry.id,
                "missing or unreadable attempt counter, treating as final attempt"
            );
            u32::MAX
        }
    };

    Ok(Delivery {
        queue,
        entry_id: entry.id,
        body,
        attempt,
    })
}
