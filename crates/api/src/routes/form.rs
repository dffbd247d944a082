//! User write bodies.
//!
//! `POST /users` and `PUT|POST /users/{id}` accept `multipart/form-data`
//! (the only way to send a photo) or `application/json`. Both decode into
//! the same raw [`UserInput`]; validation happens in the user service.

use axum::{
    Json,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
};
use serde::Deserialize;
use serde_json::Value;

use crate::error::AppError;
use crate::services::users::UserInput;

/// Raw user fields from a multipart or JSON body.
#[derive(Debug, Default)]
pub struct UserForm(pub UserInput);

impl<S> FromRequest<S> for UserForm
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            read_multipart(multipart).await.map(Self)
        } else if content_type.starts_with("application/json") {
            let Json(body) = Json::<JsonUserBody>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            Ok(Self(body.into()))
        } else {
            Err(AppError::BadRequest(
                "Expected a multipart/form-data or application/json body.".to_string(),
            ))
        }
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<UserInput, AppError> {
    let mut input = UserInput::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        if name == "photo" {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            // An empty file input means no photo
            if !bytes.is_empty() {
                input.photo = Some(bytes.to_vec());
            }
            continue;
        }

        let slot = match name.as_str() {
            "name" => &mut input.name,
            "email" => &mut input.email,
            "phone" => &mut input.phone,
            "position_id" => &mut input.position_id,
            "password" => &mut input.password,
            _ => continue,
        };
        let text = field
            .text()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        *slot = Some(text);
    }

    Ok(input)
}

/// JSON body. Scalars of any type are accepted and validated as text, so
/// `"position_id": 2` and `"position_id": "2"` are equivalent.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonUserBody {
    name: Option<Value>,
    email: Option<Value>,
    phone: Option<Value>,
    position_id: Option<Value>,
    password: Option<Value>,
}

fn scalar(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

impl From<JsonUserBody> for UserInput {
    fn from(body: JsonUserBody) -> Self {
        Self {
            name: scalar(body.name),
            email: scalar(body.email),
            phone: scalar(body.phone),
            position_id: scalar(body.position_id),
            password: scalar(body.password),
            photo: None,
        }
    }
}
