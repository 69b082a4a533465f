use thiserror::Error;

/// Errors produced anywhere in the portal.
#[derive(Error, Debug)]
pub enum PortalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Spreadsheet could not be parsed: {0}")]
    Spreadsheet(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("No data: {0}")]
    NoData(String),

    #[cfg(feature = "web")]
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote service returned {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("Remote storage is not configured")]
    RemoteDisabled,

    #[error("Invalid username or password")]
    Unauthorized,

    #[error("Administrator access required")]
    Forbidden,

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Every storage sink failed: {0}")]
    AllSinksFailed(String),
}

pub type Result<T> = std::result::Result<T, PortalError>;

#[cfg(feature = "web")]
impl axum::response::IntoResponse for PortalError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match self {
            PortalError::Unauthorized => StatusCode::UNAUTHORIZED,
            PortalError::Forbidden => StatusCode::FORBIDDEN,
            PortalError::Validation(_) | PortalError::UnsupportedFormat(_) => {
                StatusCode::BAD_REQUEST
            }
            PortalError::NotFound(_) | PortalError::NoData(_) => StatusCode::NOT_FOUND,
            PortalError::Remote { .. } | PortalError::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("{self}");
        }

        (status, self.to_string()).into_response()
    }
}
