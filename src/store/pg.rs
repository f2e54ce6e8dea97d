use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::error::StoreError;
use crate::models::{Appointment, AppointmentStatus, NewNotification, Notification};

use super::{validate_transition, AppointmentStore, NotificationStore};

/// Postgres-backed store shared with the booking application. The dispatcher
/// only ever reads appointments, flips their status, and appends
/// notifications.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AppointmentStore for PgStore {
    async fn find(&self, appointment_id: i64) -> Result<Option<Appointment>, StoreError> {
        let appointment = sqlx::query_as::<_, Appointment>(
            r#"
            SELECT appointment_id, lab_id, service_id, patient_id, scheduled_at, fee, status
            FROM appointment
            WHERE appointment_id = $1
            "#,
        )
        .bind(appointment_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(appointment)
    }

    async fn update_status(
        &self,
        appointment_id: i64,
        status: AppointmentStatus,
    ) -> Result<(), StoreError> {
        let Some(current) = self.find(appointment_id).await? else {
            return Err(StoreError::AppointmentNotFound(appointment_id));
        };

        validate_transition(&current, status)?;

        // Compare-and-set on the previous status so a concurrent writer
        // cannot slip a forbidden transition in between read and write.
        let res = sqlx::query(
            r#"
            UPDATE appointment
            SET status = $2
            WHERE appointment_id = $1 AND status = $3
            "#,
        )
        .bind(appointment_id)
        .bind(status)
        .bind(current.status)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            // Lost the race. Idempotent if the other writer landed on the
            // same status, otherwise the caller has to re-evaluate.
            let now = self.find(appointment_id).await?;
            match now {
                Some(a) if a.status == status => return Ok(()),
                Some(a) => {
                    return Err(StoreError::InvalidTransition {
                        id: appointment_id,
                        from: a.status,
                        to: status,
                    })
                }
                None => return Err(StoreError::AppointmentNotFound(appointment_id)),
            }
        }

        Ok(())
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn create(&self, new: NewNotification) -> Result<Notification, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO notification (appointment_id, message, is_confirmed, created_at)
            VALUES ($1, $2, $3, now())
            RETURNING notification_id, appointment_id, message, is_confirmed, created_at
            "#,
        )
        .bind(new.appointment_id)
        .bind(&new.message)
        .bind(new.is_confirmed)
        .fetch_one(&self.pool)
        .await?;

        Ok(Notification {
            notification_id: row.try_get("notification_id")?,
            appointment_id: row.try_get("appointment_id")?,
            message: row.try_get("message")?,
            is_confirmed: row.try_get("is_confirmed")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn confirm(&self, notification_id: i64) -> Result<(), StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE notification
            SET is_confirmed = true
            WHERE notification_id = $1
            "#,
        )
        .bind(notification_id)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Err(StoreError::NotificationNotFound(notification_id));
        }
        Ok(())
    }
}
