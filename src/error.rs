use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cookie store error: {0}")]
    Cookies(String),

    #[error("Not logged in: {0}")]
    NotLoggedIn(String),

    #[error("Session rejected by server (HTTP {0}), cookies need refreshing")]
    Unauthorized(u16),

    #[error("Invalid query window: {0}")]
    InvalidWindow(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Google Sheets error: {0}")]
    Sheets(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
