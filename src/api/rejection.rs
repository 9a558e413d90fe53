use std::convert::Infallible;

use log::{error, warn};
use serde_json::{json, Value};
use warp::{
    body::BodyDeserializeError,
    http::StatusCode,
    reject::{
        InvalidQuery, LengthRequired, MethodNotAllowed, PayloadTooLarge, Rejection,
        UnsupportedMediaType,
    },
    Reply,
};

use crate::error::ApiError;

fn classify(rejection: &Rejection) -> (StatusCode, Value) {
    if let Some(e) = rejection.find::<ApiError>() {
        if let ApiError::Internal(detail) = e {
            error!("Internal error: {detail}");
        }
        return (e.status(), e.body());
    }

    if rejection.is_not_found() {
        return (StatusCode::NOT_FOUND, json!({ "detail": "Not found" }));
    }

    if let Some(e) = rejection.find::<BodyDeserializeError>() {
        return (
            StatusCode::BAD_REQUEST,
            json!({ "non_field_errors": [format!("Malformed request body: {e}")] }),
        );
    }

    if let Some(e) = rejection.find::<InvalidQuery>() {
        return (
            StatusCode::BAD_REQUEST,
            json!({ "non_field_errors": [format!("Malformed query string: {e}")] }),
        );
    }

    if rejection.find::<PayloadTooLarge>().is_some() {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            json!({ "detail": "Request body is too large" }),
        );
    }

    if rejection.find::<LengthRequired>().is_some() {
        return (
            StatusCode::LENGTH_REQUIRED,
            json!({ "detail": "Content-Length header is required" }),
        );
    }

    if rejection.find::<UnsupportedMediaType>().is_some() {
        return (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            json!({ "detail": "Expected an application/json body" }),
        );
    }

    if rejection.find::<MethodNotAllowed>().is_some() {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            json!({ "detail": "Method not allowed" }),
        );
    }

    warn!("Unhandled rejection: {rejection:?}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "detail": "Internal server error" }),
    )
}

pub async fn handle_rejection(rejection: Rejection) -> Result<impl Reply, Infallible> {
    let (status, body) = classify(&rejection);

    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}
