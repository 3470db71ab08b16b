// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook payload validation and subscription handshake.
//!
//! Strava's push body is parsed from raw JSON rather than deserialized
//! straight into `WebhookPayload` so that each malformed field gets a
//! specific rejection message.

use crate::error::AppError;
use crate::models::{AspectType, ObjectType, WebhookPayload};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use subtle::ConstantTimeEq;

/// Validate a push notification body.
///
/// Accepts only known object/aspect types and positive integer IDs.
/// `updates` never decides acceptance: scalar hints are kept as strings and
/// anything else is dropped.
pub fn validate_event(body: &Value) -> Result<WebhookPayload, AppError> {
    let obj = body
        .as_object()
        .ok_or_else(|| AppError::Validation("Event body must be a JSON object".to_string()))?;

    let object_type = match required_str(obj, "object_type")? {
        "activity" => ObjectType::Activity,
        "athlete" => ObjectType::Athlete,
        other => {
            return Err(AppError::Validation(format!(
                "Unknown object_type '{}'",
                other
            )))
        }
    };

    let aspect_type = match required_str(obj, "aspect_type")? {
        "create" => AspectType::Create,
        "update" => AspectType::Update,
        "delete" => AspectType::Delete,
        other => {
            return Err(AppError::Validation(format!(
                "Unknown aspect_type '{}'",
                other
            )))
        }
    };

    let event_time = required_id(obj, "event_time")?;

    Ok(WebhookPayload {
        object_type,
        object_id: required_id(obj, "object_id")?,
        aspect_type,
        owner_id: required_id(obj, "owner_id")?,
        subscription_id: required_id(obj, "subscription_id")?,
        event_time: i64::try_from(event_time)
            .map_err(|_| AppError::Validation("event_time out of range".to_string()))?,
        updates: updates(obj.get("updates")),
    })
}

fn required_str<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a str, AppError> {
    obj.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Validation(format!("Missing or non-string field '{}'", field)))
}

/// A positive integer. Floats, numeric strings and zero are rejected.
fn required_id(obj: &Map<String, Value>, field: &str) -> Result<u64, AppError> {
    obj.get(field)
        .and_then(Value::as_u64)
        .filter(|v| *v > 0)
        .ok_or_else(|| {
            AppError::Validation(format!("Missing or non-positive integer field '{}'", field))
        })
}

fn updates(value: Option<&Value>) -> BTreeMap<String, String> {
    let Some(Value::Object(map)) = value else {
        if !matches!(value, None | Some(Value::Null)) {
            tracing::debug!("Ignoring non-object 'updates' field");
        }
        return BTreeMap::new();
    };

    map.iter()
        .filter_map(|(k, v)| {
            let s = match v {
                Value::String(s) => s.clone(),
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                _ => {
                    tracing::debug!(key = %k, "Ignoring non-scalar update hint");
                    return None;
                }
            };
            Some((k.clone(), s))
        })
        .collect()
}

/// Subscription handshake query parameters, all optional at parse time.
#[derive(Debug, Default, serde::Deserialize)]
pub struct HandshakeParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
}

/// Verify a subscription handshake and return the challenge to echo.
///
/// Missing parameters are a `Validation` error; a wrong mode or token is an
/// `Authentication` error.
pub fn verify_subscription(params: HandshakeParams, expected_token: &str) -> Result<String, AppError> {
    let (Some(mode), Some(challenge), Some(token)) =
        (params.mode, params.challenge, params.verify_token)
    else {
        return Err(AppError::Validation(
            "Missing hub.mode, hub.challenge or hub.verify_token".to_string(),
        ));
    };

    let token_matches: bool = token.as_bytes().ct_eq(expected_token.as_bytes()).into();
    if mode != "subscribe" || !token_matches {
        return Err(AppError::Authentication(
            "Webhook verification failed".to_string(),
        ));
    }

    Ok(challenge)
}
