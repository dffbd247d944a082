//! Field validation for user writes.
//!
//! Format rules are checked here without I/O; uniqueness and the position
//! lookup are done by [`super::UserService`] against the stores.

use std::collections::BTreeMap;

use serde::Serialize;

use roster_core::{Email, EmailError, Phone, PositionId};

/// Field name to messages, serialized as `{"email": ["..."]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    /// Record a message for `field`.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_owned())
            .or_default()
            .push(message.into());
    }

    /// Whether no field has been rejected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Messages recorded for `field`.
    #[must_use]
    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map_or(&[], Vec::as_slice)
    }

    /// Whether `field` has at least one message.
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }
}

/// Raw user fields as they arrive in a request body.
#[derive(Debug, Clone, Default)]
pub struct UserInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub position_id: Option<String>,
    pub password: Option<String>,
    pub photo: Option<Vec<u8>>,
}

/// Whether absent fields are an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    Update,
}

/// Fields that passed format validation. `None` means absent.
#[derive(Debug, Clone, Default)]
pub struct UserFields {
    pub name: Option<String>,
    pub email: Option<Email>,
    pub phone: Option<Phone>,
    pub position_id: Option<PositionId>,
    pub password: Option<String>,
}

pub const NAME_MIN: usize = 2;
pub const NAME_MAX: usize = 60;

/// Check every text field of `input`, recording failures in `errors`.
pub fn check_fields(input: &UserInput, mode: Mode, errors: &mut ValidationErrors) -> UserFields {
    let mut fields = UserFields::default();

    if let Some(name) = present("name", input.name.as_deref(), mode, errors) {
        let len = name.chars().count();
        if len < NAME_MIN {
            errors.add("name", format!("The name must be at least {NAME_MIN} characters."));
        } else if len > NAME_MAX {
            errors.add(
                "name",
                format!("The name may not be greater than {NAME_MAX} characters."),
            );
        } else {
            fields.name = Some(name.to_owned());
        }
    }

    if let Some(email) = present("email", input.email.as_deref(), mode, errors) {
        match Email::parse(email) {
            Ok(email) => fields.email = Some(email),
            Err(EmailError::TooLong { max }) => errors.add(
                "email",
                format!("The email may not be greater than {max} characters."),
            ),
            Err(_) => errors.add("email", "The email must be a valid email address."),
        }
    }

    if let Some(phone) = present("phone", input.phone.as_deref(), mode, errors) {
        match Phone::parse(phone) {
            Ok(phone) => fields.phone = Some(phone),
            Err(_) => errors.add("phone", "The phone format is invalid."),
        }
    }

    if let Some(position_id) = present("position_id", input.position_id.as_deref(), mode, errors) {
        match position_id.parse::<PositionId>() {
            Ok(id) => fields.position_id = Some(id),
            Err(_) => errors.add("position_id", "The position id must be an integer."),
        }
    }

    // An empty password leaves the stored hash alone
    fields.password = input
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(str::to_owned);

    fields
}

/// Trimmed, non-empty value of a field, or `None` after recording why not.
fn present<'a>(
    field: &str,
    value: Option<&'a str>,
    mode: Mode,
    errors: &mut ValidationErrors,
) -> Option<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Some(v),
        Some(_) => {
            errors.add(field, required_message(field));
            None
        }
        None => {
            if mode == Mode::Create {
                errors.add(field, required_message(field));
            }
            None
        }
    }
}

/// `The position id field is required.`
pub fn required_message(field: &str) -> String {
    format!("The {} field is required.", field.replace('_', " "))
}

/// `The email has already been taken.`
pub fn taken_message(field: &str) -> String {
    format!("The {} has already been taken.", field.replace('_', " "))
}
