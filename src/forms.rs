//! Typed form payloads and their validation rules.
//!
//! Every form a handler accepts is deserialized into one of these structs and
//! checked with `validator`. Failures are flattened into [`FieldErrors`], a
//! field name to message map the templates render next to each input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidateEmail, ValidationError, ValidationErrors};

const MIN_PASSWORD_LENGTH: usize = 8;

/// First validation message per form field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.insert(field, message);
        errors
    }

    /// Keeps the first message recorded for a field.
    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();
        for (field, errs) in errors.field_errors() {
            if let Some(err) = errs.first() {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field));
                fields.insert(field.to_string(), message);
            }
        }
        fields
    }
}

/// Run the derived rules, handing back the value only if it passed.
pub fn validated<T: Validate>(value: T) -> Result<T, FieldErrors> {
    match value.validate() {
        Ok(()) => Ok(value),
        Err(errors) => Err(errors.into()),
    }
}

fn rule_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn email_rules(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        Err(rule_error("required", "Email is required"))
    } else if !email.validate_email() {
        Err(rule_error("email", "You email address is invalid"))
    } else {
        Ok(())
    }
}

fn confirm_rules(confirm: &str) -> Result<(), ValidationError> {
    if confirm.is_empty() {
        Err(rule_error("required", "Confirm password is required"))
    } else {
        Ok(())
    }
}

fn password_rules(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        Err(rule_error("required", "Password is required"))
    } else if password.chars().count() < MIN_PASSWORD_LENGTH {
        Err(rule_error(
            "length",
            "The minimum password length is 8 characters",
        ))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct JoinForm {
    #[serde(default)]
    #[validate(custom(function = "email_rules"))]
    pub email: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    #[serde(default)]
    #[validate(custom(function = "password_rules"))]
    pub password: String,

    #[serde(default)]
    #[validate(
        custom(function = "confirm_rules"),
        must_match(other = "password", message = "The password do not match")
    )]
    pub password_confirm: String,

    pub remember_me: Option<String>,

    pub redirect_to: Option<String>,
}

impl JoinForm {
    pub fn remember(&self) -> bool {
        self.remember_me.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct LoginForm {
    #[serde(default)]
    #[validate(custom(function = "email_rules"))]
    pub email: String,

    #[serde(default)]
    #[validate(custom(function = "password_rules"))]
    pub password: String,

    pub remember_me: Option<String>,

    pub redirect_to: Option<String>,
}

impl LoginForm {
    pub fn remember(&self) -> bool {
        self.remember_me.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ForgotPasswordForm {
    #[serde(default)]
    #[validate(custom(function = "email_rules"))]
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ResetPasswordForm {
    #[serde(default)]
    #[validate(length(min = 1, message = "Reset token is required"))]
    pub token: String,

    #[serde(default)]
    #[validate(custom(function = "password_rules"))]
    pub password: String,

    #[serde(default)]
    #[validate(
        custom(function = "confirm_rules"),
        must_match(other = "password", message = "The password do not match")
    )]
    pub password_confirm: String,
}

/// Title/body pair shared by the new-post and edit-post forms.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// The post page hosts two actions behind one form endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostActionForm {
    pub intent: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "commentId")]
    pub comment_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostIntent {
    Comment,
    DeleteComment,
}

impl PostActionForm {
    pub fn intent(&self) -> PostIntent {
        match self.intent.as_deref() {
            Some("delete-comment") => PostIntent::DeleteComment,
            _ => PostIntent::Comment,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteAccountForm {
    #[serde(default)]
    pub email: String,
}
