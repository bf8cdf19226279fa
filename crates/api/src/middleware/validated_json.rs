//! JSON body extractor that runs `validator` rules before the handler sees
//! the payload.

use axum::extract::{FromRequest, Request};
use axum::Json;
use crowdship_core::error::{CoreError, FieldError};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

use crate::error::AppError;

/// Like [`Json`], but rejects with `VALIDATION_ERROR` and per-field details
/// when the payload fails its `#[validate]` rules, and with `BAD_REQUEST`
/// when it is not valid JSON at all.
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        value
            .validate()
            .map_err(|errors| CoreError::InvalidFields(field_errors(&errors)))?;
        Ok(Self(value))
    }
}

/// Request bodies are camelCase on the wire; report fields the way clients
/// spell them.
fn wire_name(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Flatten `validator` errors into envelope details, ordered by field.
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut details: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, list)| {
            let name = wire_name(&field);
            list.iter().map(move |err| {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{name} is invalid"));
                FieldError::new(name.clone(), message)
            })
        })
        .collect();
    details.sort_by(|a, b| a.field.cmp(&b.field));
    details
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Validate)]
    struct Sample {
        #[validate(email(message = "Email is invalid"))]
        email: String,
        #[validate(length(min = 8))]
        new_password: String,
    }

    #[test]
    fn wire_names_are_camel_case() {
        assert_eq!(wire_name("new_password"), "newPassword");
        assert_eq!(wire_name("email"), "email");
    }

    #[test]
    fn details_are_sorted_and_fall_back_to_generic_message() {
        let sample = Sample {
            email: "nope".into(),
            new_password: "short".into(),
        };
        let errors = sample.validate().unwrap_err();
        let details = field_errors(&errors);

        assert_eq!(details.len(), 2);
        assert_eq!(details[0], FieldError::new("email", "Email is invalid"));
        assert_eq!(details[1], FieldError::new("newPassword", "newPassword is invalid"));
    }
}
