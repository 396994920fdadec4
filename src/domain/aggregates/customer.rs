//! Customer identity as far as ordering is concerned

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::PhoneNumber;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub phone_number: PhoneNumber,
    pub full_name: Option<String>,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// Lightweight account created the first time a phone number orders.
    pub fn register(phone_number: PhoneNumber) -> Self {
        Self { id: Uuid::now_v7(), phone_number, full_name: None, is_staff: false, created_at: Utc::now() }
    }
}
