use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// The ECS error kind discriminator clients match on (`__type` in the wire
/// format, spec.md §6-§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidParameter,
    ClusterNotFound,
    ServiceNotFound,
    TaskDefinitionNotFound,
    Client,
    Server,
}

impl ErrorKind {
    fn type_name(self) -> &'static str {
        match self {
            ErrorKind::InvalidParameter => "InvalidParameterException",
            ErrorKind::ClusterNotFound => "ClusterNotFoundException",
            ErrorKind::ServiceNotFound => "ServiceNotFoundException",
            ErrorKind::TaskDefinitionNotFound => "TaskDefinitionNotFoundException",
            ErrorKind::Client => "ClientException",
            ErrorKind::Server => "ServerException",
        }
    }

    fn status(self) -> StatusCode {
        match self {
            ErrorKind::Server => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// API-facing error type. Mirrors the teacher's `ServerError`: it logs 5xx
/// errors with full context on conversion to a response and never leaks
/// internal error chains to the client (see spec.md §7 "User-visible behavior").
#[derive(Debug)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub source: Option<anyhow::Error>,
    pub context: Vec<(&'static str, String)>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            context: Vec::new(),
        }
    }

    pub fn from_anyhow(source: anyhow::Error, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(source),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParameter, message)
    }

    pub fn cluster_not_found(identifier: &str) -> Self {
        Self::new(
            ErrorKind::ClusterNotFound,
            format!("Cluster not found: {identifier}"),
        )
    }

    pub fn service_not_found(identifier: &str) -> Self {
        Self::new(
            ErrorKind::ServiceNotFound,
            format!("Service not found: {identifier}"),
        )
    }

    pub fn task_definition_not_found(identifier: &str) -> Self {
        Self::new(
            ErrorKind::TaskDefinitionNotFound,
            format!("Task definition not found: {identifier}"),
        )
    }

    pub fn client(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Client, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Server, message)
    }

    pub fn internal_anyhow(source: anyhow::Error, message: impl Into<String>) -> Self {
        Self::from_anyhow(source, ErrorKind::Server, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        if status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = status.as_u16(),
                    message = %self.message,
                    context = ?self.context,
                    error = ?source,
                    "server error"
                );
            } else {
                tracing::error!(
                    status = status.as_u16(),
                    message = %self.message,
                    context = ?self.context,
                    "server error"
                );
            }
        }

        let body = Json(json!({
            "__type": self.kind.type_name(),
            "message": self.message,
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::internal_anyhow(err.into(), "store operation failed")
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal_anyhow(err, "internal server error")
    }
}

/// Extension trait for converting arbitrary results into `ApiError`s, mirroring
/// the teacher's `ServerErrorExt`.
pub trait ApiErrorExt<T> {
    fn api_err(self, kind: ErrorKind, message: impl Into<String>) -> Result<T, ApiError>;
    fn internal_err(self, message: impl Into<String>) -> Result<T, ApiError>;
}

impl<T, E> ApiErrorExt<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn api_err(self, kind: ErrorKind, message: impl Into<String>) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::from_anyhow(e.into(), kind, message))
    }

    fn internal_err(self, message: impl Into<String>) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::internal_anyhow(e.into(), message))
    }
}
