use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Appointment, AppointmentStatus, NewNotification, Notification};

pub mod pg;

#[cfg(test)]
pub mod mem;

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn find(&self, appointment_id: i64) -> Result<Option<Appointment>, StoreError>;

    /// Atomic single-field status update. Idempotent when the status already
    /// holds; rejects transitions the state machine forbids.
    async fn update_status(
        &self,
        appointment_id: i64,
        status: AppointmentStatus,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, new: NewNotification) -> Result<Notification, StoreError>;

    /// Flips `is_confirmed` on an existing notification. The one mutation a
    /// notification sees after creation.
    async fn confirm(&self, notification_id: i64) -> Result<(), StoreError>;
}

/// Transition check shared by every store implementation, so the state
/// machine lives in one place. Confirmed additionally requires the lab to
/// have assigned a date.
pub fn validate_transition(
    current: &Appointment,
    to: AppointmentStatus,
) -> Result<(), StoreError> {
    let from = current.status;
    if !from.can_transition(to) {
        return Err(StoreError::InvalidTransition {
            id: current.appointment_id,
            from,
            to,
        });
    }
    if to == AppointmentStatus::Confirmed && current.scheduled_at.is_none() {
        return Err(StoreError::InvalidTransition {
            id: current.appointment_id,
            from,
            to,
        });
    }
    Ok(())
}
