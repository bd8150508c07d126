//! User accounts.

use serde::{Deserialize, Serialize};

use crate::models::now_unix;
use crate::models::validator::{is_email, Validator};
use crate::store::Record;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub created_at: i64,
    pub name: String,
    pub email: String,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

/// Registration body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub activated: Option<bool>,
}

impl Record for User {
    type New = NewUser;
    type Changes = UserChanges;

    fn id(&self) -> i64 {
        self.id
    }

    fn version(&self) -> i32 {
        self.version
    }

    fn set_version(&mut self, version: i32) {
        self.version = version;
    }

    fn create(id: i64, new: NewUser) -> Self {
        User {
            id,
            created_at: now_unix(),
            name: new.name,
            email: new.email,
            activated: false,
            version: 1,
        }
    }

    fn apply(&mut self, changes: UserChanges) {
        if let Some(name) = changes.name {
            self.name = name;
        }
        if let Some(email) = changes.email {
            self.email = email;
        }
        if let Some(activated) = changes.activated {
            self.activated = activated;
        }
    }

    /// Emails are unique regardless of case.
    fn unique_key(&self) -> Option<String> {
        Some(self.email.to_lowercase())
    }
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(is_email(email), "email", "must be a valid email address");
}

pub fn validate_user(v: &mut Validator, user: &NewUser) {
    v.check(!user.name.is_empty(), "name", "must be provided");
    v.check(user.name.len() <= 500, "name", "must not be more than 500 bytes long");
    validate_email(v, &user.email);
}
