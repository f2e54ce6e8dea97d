use redis::AsyncCommands;

use crate::codec::{self, EventPayload};
use crate::error::BrokerError;

use super::{Queue, STREAM_ATTEMPT_KEY, STREAM_ID_NEW, STREAM_PAYLOAD_KEY};

/// Publishes one persisted event to a queue.
///
/// Called by the request-handling side right after its own state commit, so
/// a failure here must reach the caller: a swallowed publish means the
/// dispatcher never learns of the change. Each call opens its own short-lived
/// connection; there is no retry or backoff.
pub async fn publish(
    redis_url: &str,
    queue: Queue,
    payload: &EventPayload,
) -> Result<(), BrokerError> {
    let body = codec::encode(payload)?;

    let client = redis::Client::open(redis_url)?;
    let mut con = client.get_multiplexed_async_connection().await?;

    let items: [(&str, Vec<u8>); 2] = [
        (STREAM_PAYLOAD_KEY, body),
        (STREAM_ATTEMPT_KEY, b"1".to_vec()),
    ];
    let _: String = con.xadd(queue.name(), STREAM_ID_NEW, &items).await?;

    Ok(())
}
