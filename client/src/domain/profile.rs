//! Per-identity profile rows and the input used to edit them.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::user::UserId;

/// Minimum length of a full name accepted by [`validate_profile_input`].
pub const FULL_NAME_MIN: usize = 3;
/// Exact number of digits a phone number must contain.
pub const PHONE_NUMBER_DIGITS: usize = 10;

/// A user's profile row.
///
/// ## Invariants
/// - `id` equals the identity id of the user the profile belongs to.
/// - `full_name` and `phone_number` are `None` while the backend holds `NULL`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Identity key.
    pub id: UserId,
    /// Display name copied onto rides the user posts.
    #[serde(default)]
    pub full_name: Option<String>,
    /// Contact number shown alongside the user's rides.
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Optional avatar image location.
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl Profile {
    /// The display name to stamp on new rides, if one is recorded.
    pub fn display_name(&self) -> Option<&str> {
        self.full_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Overwrite the editable fields in place.
    pub fn apply(&mut self, update: &ProfileUpdate) {
        self.full_name = Some(update.full_name.clone());
        self.phone_number = Some(update.phone_number.clone());
    }
}

/// Edit submitted through the profile mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    /// New full name.
    pub full_name: String,
    /// New phone number.
    pub phone_number: String,
    /// Profile being edited.
    pub user_id: UserId,
}

impl ProfileUpdate {
    /// Patch body sent to the gateway.
    pub fn to_patch(&self) -> Value {
        json!({
            "full_name": self.full_name,
            "phone_number": self.phone_number,
        })
    }
}

/// Reasons profile input is refused by [`validate_profile_input`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileValidationError {
    /// The name is shorter than [`FULL_NAME_MIN`] characters.
    #[error("full name must be at least {min} characters")]
    FullNameTooShort {
        /// Required minimum.
        min: usize,
    },
    /// The phone number is not exactly [`PHONE_NUMBER_DIGITS`] digits.
    #[error("phone number must be exactly {digits} digits")]
    InvalidPhoneNumber {
        /// Required digit count.
        digits: usize,
    },
}

/// Check profile input before submitting it.
///
/// The profile mutation never validates; form layers call this first.
///
/// # Examples
/// ```
/// use carpool::domain::{ProfileValidationError, validate_profile_input};
///
/// assert!(validate_profile_input("Asha", "9999999999").is_ok());
/// assert_eq!(
///     validate_profile_input("Asha", "99999"),
///     Err(ProfileValidationError::InvalidPhoneNumber { digits: 10 }),
/// );
/// ```
pub fn validate_profile_input(
    full_name: &str,
    phone_number: &str,
) -> Result<(), ProfileValidationError> {
    if full_name.trim().chars().count() < FULL_NAME_MIN {
        return Err(ProfileValidationError::FullNameTooShort { min: FULL_NAME_MIN });
    }
    let digits_only = phone_number.chars().all(|ch| ch.is_ascii_digit());
    if !digits_only || phone_number.len() != PHONE_NUMBER_DIGITS {
        return Err(ProfileValidationError::InvalidPhoneNumber {
            digits: PHONE_NUMBER_DIGITS,
        });
    }
    Ok(())
}
