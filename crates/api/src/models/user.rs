//! User and position domain types.

use serde::Serialize;

use roster_core::{Email, Phone, PhotoPath, PositionId, UserId};

/// A registered user (domain type).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Unique email address.
    pub email: Email,
    /// Unique `+380` phone number.
    pub phone: Phone,
    /// Position the user holds.
    pub position_id: PositionId,
    /// Display name of the position.
    pub position: String,
    /// Stored thumbnail, if any.
    pub photo: Option<PhotoPath>,
    /// Argon2 PHC string; `None` for users registered without a password.
    pub password_hash: Option<String>,
    /// Seconds since the Unix epoch, set once at registration.
    pub registration_timestamp: i64,
}

/// A position from the static catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Position {
    /// Position ID.
    pub id: PositionId,
    /// Display name (e.g. "Lawyer").
    pub name: String,
}

/// Fields of a user about to be inserted.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: Email,
    pub phone: Phone,
    pub position_id: PositionId,
    pub password_hash: Option<String>,
    pub photo: Option<PhotoPath>,
    pub registration_timestamp: i64,
}

/// Partial update of a user.
///
/// `None` leaves the stored value untouched. There is no registration
/// timestamp field: it never changes after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<Email>,
    pub phone: Option<Phone>,
    pub position_id: Option<PositionId>,
    pub password_hash: Option<String>,
    pub photo: Option<PhotoPath>,
}

impl UserPatch {
    /// Whether the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.position_id.is_none()
            && self.password_hash.is_none()
            && self.photo.is_none()
    }

    /// Merge the patch into `user`, field by field.
    ///
    /// The position display name is not touched; callers that change
    /// `position_id` must resolve the new name themselves.
    pub fn apply_to(self, user: &mut User) {
        if let Some(name) = self.name {
            user.name = name;
        }
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(phone) = self.phone {
            user.phone = phone;
        }
        if let Some(position_id) = self.position_id {
            user.position_id = position_id;
        }
        if let Some(password_hash) = self.password_hash {
            user.password_hash = Some(password_hash);
        }
        if let Some(photo) = self.photo {
            user.photo = Some(photo);
        }
    }
}

/// Public JSON representation of a user.
///
/// The password hash never appears here; the photo is rendered as an
/// absolute URL.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserResource {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub position: String,
    pub position_id: PositionId,
    pub registration_timestamp: i64,
    pub photo: Option<String>,
}

impl UserResource {
    /// Render `user`, resolving its photo path with `photo_url`.
    pub fn new(user: User, photo_url: impl Fn(&PhotoPath) -> String) -> Self {
        let photo = user.photo.as_ref().map(photo_url);
        Self {
            id: user.id,
            name: user.name,
            email: user.email.into_inner(),
            phone: user.phone.into_inner(),
            position: user.position,
            position_id: user.position_id,
            registration_timestamp: user.registration_timestamp,
            photo,
        }
    }
}
