// weatherscope - Weather readings collector and query service
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::service::{AverageResult, ServiceError, WeatherService};
use crate::store::Reading;
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const MIN_DAYS: i64 = 1;
const MAX_DAYS: i64 = 365;
const OPENMETRICS_FORMAT: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// State shared by every request handler.
pub struct RequestContext {
    service: Arc<WeatherService>,
    registry: Registry,
}

impl RequestContext {
    pub fn new(service: Arc<WeatherService>, registry: Registry) -> Self {
        RequestContext { service, registry }
    }
}

/// Build the router for the weather endpoints and `/metrics`.
pub fn router(context: Arc<RequestContext>) -> Router {
    Router::new()
        .route("/metrics", get(text_metrics))
        .route("/:city", get(current))
        .route("/avg/:city", get(average))
        .route("/trends/:city", get(trends))
        .route("/history/:city", get(history))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_methods([Method::GET]).allow_origin(Any))
        .with_state(context)
}

#[derive(Debug, Deserialize)]
pub struct DaysParams {
    days: Option<String>,
}

type CityPath = Result<Path<String>, PathRejection>;
type DaysQuery = Result<Query<DaysParams>, QueryRejection>;

async fn current(
    State(context): State<Arc<RequestContext>>,
    uri: Uri,
    city: CityPath,
) -> Result<Json<Reading>, ApiError> {
    let city = city_param(&uri, city)?;
    Ok(Json(context.service.fetch_and_persist(&city).await?))
}

async fn average(
    State(context): State<Arc<RequestContext>>,
    uri: Uri,
    city: CityPath,
    params: DaysQuery,
) -> Result<Json<AverageResult>, ApiError> {
    let city = city_param(&uri, city)?;
    let days = days_param(&uri, params)?;
    Ok(Json(context.service.average(&city, days).await?))
}

async fn trends(
    State(context): State<Arc<RequestContext>>,
    uri: Uri,
    city: CityPath,
    params: DaysQuery,
) -> Result<Json<Vec<Reading>>, ApiError> {
    let city = city_param(&uri, city)?;
    let days = days_param(&uri, params)?;
    Ok(Json(context.service.trend(&city, days).await?))
}

async fn history(
    State(context): State<Arc<RequestContext>>,
    uri: Uri,
    city: CityPath,
) -> Result<Json<Vec<Reading>>, ApiError> {
    let city = city_param(&uri, city)?;
    Ok(Json(context.service.history(&city).await?))
}

fn city_param(uri: &Uri, city: CityPath) -> Result<String, ValidationError> {
    city.map(|Path(city)| city)
        .map_err(|e| ValidationError::field("city", Value::from(uri.path()), e.body_text()))
}

fn days_param(uri: &Uri, params: DaysQuery) -> Result<u32, ValidationError> {
    let Query(params) =
        params.map_err(|e| ValidationError::field("days", Value::from(uri.query()), e.body_text()))?;
    validate_days(params.days.as_deref())
}

async fn text_metrics(State(context): State<Arc<RequestContext>>) -> Response {
    let mut buf = String::new();

    match encode(&mut buf, &context.registry) {
        Ok(_) => {
            tracing::debug!(message = "encoded prometheus metrics to text format", num_bytes = buf.len());
            ([(CONTENT_TYPE, OPENMETRICS_FORMAT)], buf).into_response()
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics", error = %e);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// Parse and bounds-check the `days` query parameter.
pub fn validate_days(raw: Option<&str>) -> Result<u32, ValidationError> {
    let raw = raw.ok_or_else(|| ValidationError::field("days", Value::Null, "must not be null"))?;
    let days: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ValidationError::field("days", Value::from(raw), "must be an integer"))?;

    if days < MIN_DAYS {
        Err(ValidationError::field(
            "days",
            Value::from(days),
            format!("must be greater than or equal to {}", MIN_DAYS),
        ))
    } else if days > MAX_DAYS {
        Err(ValidationError::field(
            "days",
            Value::from(days),
            format!("must be less than or equal to {}", MAX_DAYS),
        ))
    } else {
        // Bounds checked above
        Ok(days as u32)
    }
}

/// A single rejected request parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub message: String,
    pub field: String,
    pub invalid_value: Value,
}

/// One or more request parameters failed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    fn field<M: Into<String>>(field: &str, invalid_value: Value, message: M) -> Self {
        ValidationError {
            errors: vec![FieldError {
                message: message.into(),
                field: field.to_owned(),
                invalid_value,
            }],
        }
    }
}

/// Every error a handler can return, rendered in one place.
#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    Service(ServiceError),
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Validation(e)
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError::Service(e)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum MessageType {
    Error,
    ValidationError,
}

#[derive(Debug, Serialize)]
struct ValidationDetails {
    errors: Vec<FieldError>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorMessageResponse {
    #[serde(rename = "type")]
    type_: MessageType,
    status: u16,
    status_code: String,
    message: String,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<ValidationDetails>,
}

impl ErrorMessageResponse {
    fn new(type_: MessageType, status: StatusCode, message: String) -> Self {
        ErrorMessageResponse {
            type_,
            status: status.as_u16(),
            status_code: status_name(status),
            message,
            created_at: Utc::now(),
            details: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenericErrorResponse {
    timestamp: DateTime<Utc>,
    status: u16,
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(e) => {
                tracing::warn!(message = "request validation failed", errors = ?e.errors);
                let status = StatusCode::BAD_REQUEST;
                let mut body =
                    ErrorMessageResponse::new(MessageType::ValidationError, status, "Validation failed".to_owned());
                body.details = Some(ValidationDetails { errors: e.errors });
                (status, Json(body)).into_response()
            }
            ApiError::Service(ServiceError::Provider { status, message, cause }) => {
                tracing::error!(message = "weather provider error", reason = %message, error = %cause);
                (status, Json(ErrorMessageResponse::new(MessageType::Error, status, message))).into_response()
            }
            ApiError::Service(e @ (ServiceError::Store(_) | ServiceError::Task(_))) => {
                tracing::error!(message = "unhandled error", error = %e);
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                let body = GenericErrorResponse {
                    timestamp: Utc::now(),
                    status: status.as_u16(),
                    error: status.canonical_reason().unwrap_or("Unknown"),
                    message: e.to_string(),
                };
                (status, Json(body)).into_response()
            }
        }
    }
}

/// Constant-style name of a status code, e.g. `BAD_REQUEST`.
fn status_name(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(|r| r.to_uppercase().replace([' ', '-'], "_"))
        .unwrap_or_else(|| status.as_u16().to_string())
}

#[cfg(test)]
mod test {
    use super::{status_name, validate_days, FieldError};
    use axum::http::StatusCode;
    use serde_json::Value;

    fn rejected(raw: Option<&str>) -> FieldError {
        let mut err = validate_days(raw).unwrap_err();
        assert_eq!(1, err.errors.len());
        err.errors.remove(0)
    }

    #[test]
    fn test_validate_days_bounds() {
        assert_eq!(1, validate_days(Some("1")).unwrap());
        assert_eq!(365, validate_days(Some("365")).unwrap());

        let low = rejected(Some("0"));
        assert_eq!("days", low.field);
        assert_eq!(Value::from(0), low.invalid_value);

        let high = rejected(Some("366"));
        assert_eq!("days", high.field);
        assert_eq!(Value::from(366), high.invalid_value);
        assert_eq!("must be less than or equal to 365", high.message);
    }

    #[test]
    fn test_validate_days_malformed() {
        let err = rejected(Some("week"));
        assert_eq!("days", err.field);
        assert_eq!(Value::from("week"), err.invalid_value);

        let err = rejected(Some("-3"));
        assert_eq!(Value::from(-3), err.invalid_value);
    }

    #[test]
    fn test_validate_days_missing() {
        let err = rejected(None);
        assert_eq!("days", err.field);
        assert_eq!(Value::Null, err.invalid_value);
    }

    #[test]
    fn test_status_name() {
        assert_eq!("BAD_REQUEST", status_name(StatusCode::BAD_REQUEST));
        assert_eq!("INTERNAL_SERVER_ERROR", status_name(StatusCode::INTERNAL_SERVER_ERROR));
    }
}
