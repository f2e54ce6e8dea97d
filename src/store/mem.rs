//! In-memory store used by handler tests. Mirrors the Postgres semantics,
//! including the transition check and optional induced failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StoreError;
use crate::models::{Appointment, AppointmentStatus, NewNotification, Notification};

use super::{validate_transition, AppointmentStore, NotificationStore};

#[derive(Default)]
pub struct MemoryStore {
    appointments: Mutex<HashMap<i64, Appointment>>,
    notifications: Mutex<Vec<Notification>>,
    next_notification_id: AtomicI64,
    fail_lookups: AtomicBool,
    lookup_delay: Mutex<Option<std::time::Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_notification_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    pub fn insert_appointment(&self, appointment: Appointment) {
        self.appointments
            .lock()
            .unwrap()
            .insert(appointment.appointment_id, appointment);
    }

    pub fn pending(appointment_id: i64) -> Appointment {
        Appointment {
            appointment_id,
            lab_id: 1,
            service_id: 1,
            patient_id: 1,
            scheduled_at: Some(Utc::now()),
            fee: 25.0,
            status: AppointmentStatus::Pending,
        }
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    /// Makes every appointment lookup fail, to drive the transient branch.
    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    /// Makes every appointment lookup stall, to drive the timeout branch.
    pub fn delay_lookups(&self, delay: std::time::Duration) {
        *self.lookup_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl AppointmentStore for MemoryStore {
    async fn find(&self, appointment_id: i64) -> Result<Option<Appointment>, StoreError> {
        let delay = *self.lookup_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        Ok(self.appointments.lock().unwrap().get(&appointment_id).cloned())
    }

    async fn update_status(
        &self,
        appointment_id: i64,
        status: AppointmentStatus,
    ) -> Result<(), StoreError> {
        let mut appointments = self.appointments.lock().unwrap();
        let Some(current) = appointments.get_mut(&appointment_id) else {
            return Err(StoreError::AppointmentNotFound(appointment_id));
        };
        validate_transition(current, status)?;
        current.status = status;
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create(&self, new: NewNotification) -> Result<Notification, StoreError> {
        let notification = Notification {
            notification_id: self.next_notification_id.fetch_add(1, Ordering::SeqCst),
            appointment_id: new.appointment_id,
            message: new.message,
            is_confirmed: new.is_confirmed,
            created_at: Utc::now(),
        };
        self.notifications.lock().unwrap().push(notification.clone());
        Ok(notification)
    }

    async fn confirm(&self, notification_id: i64) -> Result<(), StoreError> {
        let mut notifications = self.notifications.lock().unwrap();
        match notifications
            .iter_mut()
            .find(|n| n.notification_id == notification_id)
        {
            Some(n) => {
                n.is_confirmed = true;
                Ok(())
            }
            None => Err(StoreError::NotificationNotFound(notification_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_status_walks_the_state_machine() {
        let store = MemoryStore::new();
        store.insert_appointment(MemoryStore::pending(1));

        store.update_status(1, AppointmentStatus::Confirmed).await.unwrap();
        store.update_status(1, AppointmentStatus::Canceled).await.unwrap();

        // Canceled is terminal.
        assert!(store.update_status(1, AppointmentStatus::Pending).await.is_err());
        assert!(store.update_status(1, AppointmentStatus::Confirmed).await.is_err());

        let appointment = store.find(1).await.unwrap().unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Canceled);
    }

    #[tokio::test]
    async fn test_update_status_unknown_appointment() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.update_status(404, AppointmentStatus::Canceled).await,
            Err(StoreError::AppointmentNotFound(404))
        ));
    }

    #[tokio::test]
    async fn test_confirm_flips_only_the_flag() {
        let store = MemoryStore::new();
        let created = store
            .create(NewNotification::new(None, "Result ready.", false))
            .await
            .unwrap();

        store.confirm(created.notification_id).await.unwrap();

        let stored = store.notifications();
        assert!(stored[0].is_confirmed);
        assert_eq!(stored[0].message, "Result ready.");

        assert!(store.confirm(999).await.is_err());
    }
}
