use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Employee,
    Admin,
}

impl Role {
    pub fn from_db(value: &str) -> Option<Self> {
        value.parse().ok()
    }

    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Employee
    }
}
