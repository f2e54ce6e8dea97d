use thiserror::Error;

use crate::models::AppointmentStatus;

/// Failures of the envelope codec. Decoding fails closed: anything that is
/// not a JSON object carrying a usable `appointment_id` is `Malformed`.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("appointment {0} not found")]
    AppointmentNotFound(i64),

    #[error("notification {0} not found")]
    NotificationNotFound(i64),

    /// Canceled is terminal, and Confirmed requires a lab-assigned date.
    #[error("invalid status transition {from:?} -> {to:?} for appointment {id}")]
    InvalidTransition {
        id: i64,
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("queue entry has no payload field")]
    MissingPayload,

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}
