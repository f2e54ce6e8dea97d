use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/* -------------------------
   Appointment
--------------------------*/

/// Status values match the booking application's DB encoding:
/// 0 Pending, 1 Confirmed, 2 Canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum AppointmentStatus {
    Pending = 0,
    Confirmed = 1,
    Canceled = 2,
}

impl AppointmentStatus {
    /// Whether a transition from `self` to `to` is allowed by the status
    /// state machine. Canceled is terminal; setting the status it already
    /// holds is always allowed (idempotent updates under at-least-once
    /// delivery).
    pub fn can_transition(self, to: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        match (self, to) {
            (from, to) if from == to => true,
            (Pending, Confirmed) => true,
            (Pending, Canceled) => true,
            (Confirmed, Canceled) => true,
            (Canceled, _) => false,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Appointment {
    pub appointment_id: i64,
    pub lab_id: i64,
    pub service_id: i64,
    pub patient_id: i64,
    /// Null until the lab proposes a date; confirmation requires it set.
    pub scheduled_at: Option<DateTime<Utc>>,
    pub fee: f64,
    pub status: AppointmentStatus,
}

/* -------------------------
   Notification
--------------------------*/

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub notification_id: i64,
    pub appointment_id: Option<i64>,
    pub message: String,
    pub is_confirmed: bool,
    pub created_at: DateTime<Utc>,
}

/// The only way to create a Notification. The confirmation flag is required
/// at every call site so no queue silently relies on a column default.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub appointment_id: Option<i64>,
    pub message: String,
    pub is_confirmed: bool,
}

impl NewNotification {
    pub fn new(appointment_id: Option<i64>, message: impl Into<String>, is_confirmed: bool) -> Self {
        Self {
            appointment_id,
            message: message.into(),
            is_confirmed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AppointmentStatus::*;

    #[test]
    fn test_pending_lifecycle() {
        assert!(Pending.can_transition(Confirmed));
        assert!(Pending.can_transition(Canceled));
        assert!(Confirmed.can_transition(Canceled));
    }

    #[test]
    fn test_canceled_is_terminal() {
        assert!(!Canceled.can_transition(Pending));
        assert!(!Canceled.can_transition(Confirmed));
    }

    #[test]
    fn test_same_status_is_idempotent() {
        assert!(Pending.can_transition(Pending));
        assert!(Confirmed.can_transition(Confirmed));
        assert!(Canceled.can_transition(Canceled));
    }

    #[test]
    fn test_no_backwards_transition() {
        assert!(!Confirmed.can_transition(Pending));
    }
}
