use super::session::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// An emergency contact owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub id: String,
    pub user_id: UserId,
    pub name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl EmergencyContact {
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewEmergencyContact {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 5, max = 20))]
    pub phone: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 50))]
    pub relationship: Option<String>,
}

impl NewEmergencyContact {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            email: None,
            relationship: None,
        }
    }

    /// Materializes the record for `owner`; the id is assigned client-side.
    pub fn into_contact(self, owner: &UserId) -> EmergencyContact {
        EmergencyContact {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: owner.clone(),
            name: self.name,
            phone: self.phone,
            email: self.email,
            relationship: self.relationship,
            created_at: Some(Utc::now()),
        }
    }
}
