use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::{ApiError, FieldError};

const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
});

// Struct representing the request body for creating a new Todo
#[derive(Debug, Deserialize)]
pub struct CreateTodoSchema {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
}

/// A validated insert payload: title trimmed and non-empty, description
/// trimmed and defaulted to the empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTodo {
    pub title: String,
    pub description: String,
}

impl CreateTodoSchema {
    pub fn validate(self) -> Result<NewTodo, ApiError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ApiError::Validation(vec![FieldError::new(
                "title",
                "Title is required",
            )]));
        }
        Ok(NewTodo {
            title: title.to_string(),
            description: self
                .description
                .map(|d| d.trim().to_string())
                .unwrap_or_default(),
        })
    }
}

// Struct representing the request body for updating a Todo; every field is optional
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTodoSchema {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_completed: Option<bool>,
}

/// The set of columns an update should touch. `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_completed: Option<bool>,
}

impl TodoPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.is_completed.is_none()
    }
}

impl UpdateTodoSchema {
    // Emptiness is checked by the service after ownership, so an empty patch passes here
    pub fn validate(self) -> Result<TodoPatch, ApiError> {
        let title = match self.title {
            Some(title) => {
                let title = title.trim();
                if title.is_empty() {
                    return Err(ApiError::Validation(vec![FieldError::new(
                        "title",
                        "Title cannot be empty",
                    )]));
                }
                Some(title.to_string())
            }
            None => None,
        };
        Ok(TodoPatch {
            title,
            description: self.description.map(|d| d.trim().to_string()),
            is_completed: self.is_completed,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CredentialsSchema {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl CredentialsSchema {
    pub fn normalized_email(&self) -> String {
        self.email.trim().to_lowercase()
    }

    // Registration rules; login only needs the email normalized
    pub fn validate_registration(&self) -> Result<(), ApiError> {
        let mut errors = Vec::new();
        if !EMAIL_RE.is_match(&self.normalized_email()) {
            errors.push(FieldError::new("email", "A valid email is required"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.push(FieldError::new(
                "password",
                format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}
