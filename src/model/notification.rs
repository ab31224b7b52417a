use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationType {
    BirthdayReminder,
    Birthday,
    SalaryIncreaseReminder,
    SalaryIncreased,
    SalaryThresholdReached,
    Welcome,
    General,
    EmployeeCreated,
    UserUpdate,
}

impl TryFrom<String> for NotificationType {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[schema(example = 12)]
    pub id: u64,
    #[schema(example = "John Doe has a birthday in one month")]
    pub message: String,
    /// Recipient (always an admin).
    pub user_id: u64,
    /// Employee the event is about.
    pub related_user_id: u64,
    #[serde(rename = "type")]
    #[sqlx(rename = "type", try_from = "String")]
    pub kind: NotificationType,
    #[schema(example = "2026-05-17", value_type = String, format = "date")]
    pub event_date: NaiveDate,
    pub is_read: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: NaiveDateTime,
}

/// A notification about to be delivered to one or more admins.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub kind: NotificationType,
    pub message: String,
    pub event_date: NaiveDate,
    pub related_user_id: u64,
}
