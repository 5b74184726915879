//! User accounts: buyers and partners (shop owners)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use super::contact::Contact;
use crate::domain::value_objects::Email;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Shop,
    #[default]
    Buyer,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Shop => "shop", Self::Buyer => "buyer" }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shop" => Ok(Self::Shop),
            "buyer" => Ok(Self::Buyer),
            other => Err(format!("unknown user type {other:?}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct User {
    pub id: i64,
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub position: String,
    pub password_hash: String,
    pub is_active: bool,
    pub user_type: UserType,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_partner(&self) -> bool { self.user_type == UserType::Shop }

    pub fn apply(&mut self, patch: &UserPatch) {
        if let Some(v) = &patch.first_name { self.first_name = v.clone(); }
        if let Some(v) = &patch.last_name { self.last_name = v.clone(); }
        if let Some(v) = &patch.company { self.company = v.clone(); }
        if let Some(v) = &patch.position { self.position = v.clone(); }
    }
}

/// A user ready to be stored; the password is already hashed.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub position: String,
    pub password_hash: String,
    pub user_type: UserType,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct Registration {
    #[validate(length(min = 1, max = 150))]
    pub first_name: String,
    #[validate(length(min = 1, max = 150))]
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[validate(length(min = 1, max = 50))]
    pub company: String,
    #[validate(length(min = 1, max = 50))]
    pub position: String,
    #[serde(default, rename = "type")]
    pub user_type: UserType,
}

/// Profile edit. Unknown fields (including `email`) are rejected.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UserPatch {
    #[validate(length(min = 1, max = 150))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 150))]
    pub last_name: Option<String>,
    #[validate(length(max = 50))]
    pub company: Option<String>,
    #[validate(length(max = 50))]
    pub position: Option<String>,
    pub password: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct UserView {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub company: String,
    pub position: String,
    #[serde(rename = "type")]
    pub user_type: UserType,
    pub contacts: Vec<Contact>,
}

impl UserView {
    pub fn new(user: &User, contacts: Vec<Contact>) -> Self {
        Self {
            id: user.id, first_name: user.first_name.clone(), last_name: user.last_name.clone(),
            email: user.email.to_string(), company: user.company.clone(), position: user.position.clone(),
            user_type: user.user_type, contacts,
        }
    }
}
