//! One handler per queue. Each is a pure state-transition function over the
//! store traits: it decodes the payload, reads current state, appends a
//! notification, and reports what should happen to the message as an
//! [`Outcome`]. Handlers never touch the broker and never call each other.
//!
//! Error discipline (shared by all five):
//! - malformed payload is permanent, so it is never requeued (`NackDrop`);
//! - store failures and timeouts are transient (`NackRequeue`, bounded by
//!   the dispatcher);
//! - a missing appointment is handled per queue, since some queues treat it
//!   as a recordable fact and others as a race with a concurrent commit.

use tracing::warn;

use crate::codec;
use crate::error::StoreError;
use crate::models::NewNotification;
use crate::store::{AppointmentStore, NotificationStore};

/// What the dispatcher should tell the broker about a processed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Processed to a terminal result; remove from the queue.
    Ack,
    /// Transient failure; redeliver (the dispatcher bounds the attempts).
    NackRequeue,
    /// Permanent failure; move to the dead-letter stream.
    NackDrop,
}

/// Queue `results` — a lab attached a result document.
///
/// Both found and not-found are terminal: a dangling reference is recorded
/// rather than silently dropped, and the message is acknowledged either way.
pub async fn result_added(
    appointments: &dyn AppointmentStore,
    notifications: &dyn NotificationStore,
    body: &[u8],
) -> Outcome {
    let payload = match codec::decode(body) {
        Ok(p) => p,
        Err(e) => {
            warn!("results: {e}");
            return Outcome::NackDrop;
        }
    };
    let id = payload.appointment_id;

    let new = match appointments.find(id).await {
        Ok(Some(_)) => NewNotification::new(
            Some(id),
            format!("Result added for appointment {id}"),
            true,
        ),
        Ok(None) => NewNotification::new(
            None,
            format!("Result added for non-existent appointment with ID {id}"),
            true,
        ),
        Err(e) => return transient("results", e),
    };

    match notifications.create(new).await {
        Ok(_) => Outcome::Ack,
        Err(e) => transient("results", e),
    }
}

/// Queue `requests` — a new booking request awaiting lab attention.
pub async fn process_request(
    appointments: &dyn AppointmentStore,
    notifications: &dyn NotificationStore,
    body: &[u8],
) -> Outcome {
    let payload = match codec::decode(body) {
        Ok(p) => p,
        Err(e) => {
            // The body will never become parseable; record the error text
            // and dead-letter instead of looping forever.
            warn!("requests: {e}");
            let poison = NewNotification::new(None, e.to_string(), false);
            if let Err(e) = notifications.create(poison).await {
                warn!("requests: failed to record poison message: {e}");
            }
            return Outcome::NackDrop;
        }
    };
    let id = payload.appointment_id;

    let new = match appointments.find(id).await {
        Ok(Some(_)) => NewNotification::new(
            Some(id),
            format!("New request for appointment with id {id} has been made."),
            false,
        ),
        Ok(None) => {
            let message = format!(
                "An error occurred while processing the request: appointment {id} not found"
            );
            if let Err(e) = notifications.create(NewNotification::new(None, message, false)).await {
                warn!("requests: {e}");
            }
            return Outcome::NackRequeue;
        }
        Err(e) => return transient("requests", e),
    };

    match notifications.create(new).await {
        Ok(_) => Outcome::Ack,
        Err(e) => transient("requests", e),
    }
}

/// Queue `appointment_updates` — the lab proposed or changed a date; the
/// patient still has to confirm.
///
/// A missing appointment is treated as a race: the row may be committed by a
/// concurrent transaction moments later, so the message is requeued.
pub async fn process_appointment(
    appointments: &dyn AppointmentStore,
    notifications: &dyn NotificationStore,
    body: &[u8],
) -> Outcome {
    let payload = match codec::decode(body) {
        Ok(p) => p,
        Err(e) => {
            warn!("appointment_updates: {e}");
            return Outcome::NackDrop;
        }
    };
    let id = payload.appointment_id;

    match appointments.find(id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            warn!("appointment_updates: appointment {id} does not exist");
            return Outcome::NackRequeue;
        }
        Err(e) => return transient("appointment_updates", e),
    }

    let new = NewNotification::new(
        Some(id),
        format!("Appointment request updated, please confirm or decline: {id}"),
        false,
    );
    match notifications.create(new).await {
        Ok(_) => Outcome::Ack,
        Err(e) => transient("appointment_updates", e),
    }
}

/// Queue `appointment` — the patient confirmed a lab-proposed appointment.
///
/// Records the confirmation event only. The appointment's status flip to
/// Confirmed is the confirming action's own write through
/// [`AppointmentStore::update_status`], not this handler's.
pub async fn notification_confirmed(
    appointments: &dyn AppointmentStore,
    notifications: &dyn NotificationStore,
    body: &[u8],
) -> Outcome {
    let payload = match codec::decode(body) {
        Ok(p) => p,
        Err(e) => {
            warn!("appointment: {e}");
            return Outcome::NackDrop;
        }
    };
    let id = payload.appointment_id;

    match appointments.find(id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            warn!("appointment: appointment {id} does not exist");
            return Outcome::NackRequeue;
        }
        Err(e) => return transient("appointment", e),
    }

    let new = NewNotification::new(Some(id), "New appointment has been confirmed.", false);
    match notifications.create(new).await {
        Ok(_) => Outcome::Ack,
        Err(e) => transient("appointment", e),
    }
}

/// Queue `appointment_canceled` — a cancellation already committed elsewhere;
/// this only records it.
pub async fn cancel_appointment(
    appointments: &dyn AppointmentStore,
    notifications: &dyn NotificationStore,
    body: &[u8],
) -> Outcome {
    let payload = match codec::decode(body) {
        Ok(p) => p,
        Err(e) => {
            warn!("appointment_canceled: {e}");
            return Outcome::NackDrop;
        }
    };
    let id = payload.appointment_id;

    match appointments.find(id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            warn!("appointment_canceled: appointment {id} does not exist");
            return Outcome::NackRequeue;
        }
        Err(e) => return transient("appointment_canceled", e),
    }

    let new = NewNotification::new(Some(id), "Your appointment has been canceled.", false);
    match notifications.create(new).await {
        Ok(_) => Outcome::Ack,
        Err(e) => transient("appointment_canceled", e),
    }
}

fn transient(queue: &str, e: StoreError) -> Outcome {
    warn!("{queue}: transient store failure, will requeue: {e}");
    Outcome::NackRequeue
}
