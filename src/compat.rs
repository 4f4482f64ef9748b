use std::error::Error;

use crate::error::{ApiError, ContentError};
use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct MyJson<T>(pub T);

impl<T: Serialize> IntoResponse for MyJson<T> {
    fn into_response(self) -> axum::response::Response {
        let Self(value) = self;
        axum::Json(value).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        ApiError::InvalidJson(with_sources(&value))
    }
}

#[derive(FromRequest)]
#[from_request(via(axum::Form), rejection(ApiError))]
pub struct MyForm<T>(pub T);

impl From<FormRejection> for ApiError {
    fn from(value: FormRejection) -> Self {
        ApiError::InvalidJson(with_sources(&value))
    }
}

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct MyQuery<T>(pub T);

impl From<QueryRejection> for ApiError {
    fn from(value: QueryRejection) -> Self {
        ApiError::InvalidJson(with_sources(&value))
    }
}

fn with_sources(err: &dyn Error) -> String {
    let mut s = format!("{}", err);

    let mut source_ = err.source();
    while let Some(source) = source_ {
        s.push_str(&format!(": {}", source));
        source_ = source.source();
    }

    s
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ApiError::Content(ContentError::NoRevision(_)) => StatusCode::CONFLICT,
            ApiError::Content(_) => StatusCode::BAD_REQUEST,
            ApiError::PageNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InvalidJson(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Sqlx(err) => {
                tracing::error!(error = ?err, "database error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, axum::Json(serde_json::json!({"err": self.to_string()}))).into_response()
    }
}
