//! Durable queue plumbing on top of [Redis Streams](https://redis.io/topics/streams-intro).
//!
//! Each queue is a stream; the dispatcher reads through a consumer group so
//! entries stay in the pending list until acknowledged with `XACK` and
//! survive both broker and dispatcher restarts.

const STREAM_PAYLOAD_KEY: &str = "payload";
const STREAM_ATTEMPT_KEY: &str = "attempt";
const STREAM_ID_NEW: &str = "*";
const STREAM_ID_HEAD: &str = "0";
const STREAM_ID_ADDITIONS: &str = ">";

/// Consumer group shared by all dispatcher instances.
pub const CONSUMER_GROUP: &str = "dispatcher";

mod consume;
mod publish;

pub use consume::*;
pub use publish::*;

/// The five fixed queues. Names are part of the wire contract with the
/// booking application and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queue {
    Results,
    Requests,
    AppointmentUpdates,
    Appointment,
    AppointmentCanceled,
}

impl Queue {
    pub const ALL: [Queue; 5] = [
        Queue::Results,
        Queue::Requests,
        Queue::AppointmentUpdates,
        Queue::Appointment,
        Queue::AppointmentCanceled,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Queue::Results => "results",
            Queue::Requests => "requests",
            Queue::AppointmentUpdates => "appointment_updates",
            Queue::Appointment => "appointment",
            Queue::AppointmentCanceled => "appointment_canceled",
        }
    }

    pub fn from_key(key: &str) -> Option<Queue> {
        Queue::ALL.into_iter().find(|q| q.name() == key)
    }

    /// Side stream for entries that can never be processed successfully.
    pub fn dead_letter_key(self) -> String {
        format!("{}.dead-letter", self.name())
    }
}

/// One inbound message plus the metadata needed to settle it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub queue: Queue,
    /// Broker-assigned entry id, used only for acknowledgement.
    pub entry_id: String,
    pub body: Vec<u8>,
    /// Delivery attempt, starting at 1 on first publish.
    pub attempt: u32,
}
