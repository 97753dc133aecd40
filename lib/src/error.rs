use std::error::Error as StdError;
use std::path::PathBuf;

/// All possible blastmail errors.
///
/// Attachment, address, and request errors raised while sending are
/// counted per delivery by the pipeline; everything else aborts the run.
#[derive(Debug)]
pub enum Error {
    Config(String),
    Template(String),
    Sheet(String),
    InvalidRows(usize),
    Conversion(String),
    Io(String),
    Json(String),
    AttachmentNotFound(PathBuf),
    InvalidAddress(String),
    UrlParseError(String),
    RequestTimeout,
    RequestError(String),
    BadInput(String),
    Unauthorized(String),
    NotFound(String),
    RateLimited(String),
    Internal(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            Error::Config(ref msg) => write!(f, "Config: {}", msg),
            Error::Template(ref msg) => write!(f, "Template: {}", msg),
            Error::Sheet(ref msg) => write!(f, "Sheet: {}", msg),
            Error::InvalidRows(count) => write!(f, "{} row(s) failed validation", count),
            Error::Conversion(ref msg) => write!(f, "Conversion: {}", msg),
            Error::Io(ref msg) => write!(f, "Io: {}", msg),
            Error::Json(ref msg) => write!(f, "Json: {}", msg),
            Error::AttachmentNotFound(ref path) => {
                write!(f, "Attachment not found: {}", path.display())
            }
            Error::InvalidAddress(ref addr) => write!(f, "Invalid email address: {:?}", addr),
            Error::UrlParseError(ref msg) => write!(f, "UrlParseError: {}", msg),
            Error::RequestTimeout => f.write_str("RequestTimeout"),
            Error::RequestError(ref msg) => write!(f, "RequestError: {}", msg),
            Error::BadInput(ref msg) => write!(f, "BadInput: {}", msg),
            Error::Unauthorized(ref msg) => write!(f, "Unauthorized: {}", msg),
            Error::NotFound(ref msg) => write!(f, "NotFound: {}", msg),
            Error::RateLimited(ref msg) => write!(f, "RateLimited: {}", msg),
            Error::Internal(ref msg) => write!(f, "Internal Error: {}", msg),
        }
    }
}

impl StdError for Error {}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<dotenvy::Error> for Error {
    fn from(err: dotenvy::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Tera hides the useful part of a render failure (e.g. which variable
/// was missing) in the source chain, so flatten it into the message.
impl From<tera::Error> for Error {
    fn from(err: tera::Error) -> Self {
        let mut msg = err.to_string();
        let mut source = err.source();

        while let Some(e) = source {
            msg.push_str(": ");
            msg.push_str(&e.to_string());
            source = e.source();
        }

        Self::Template(msg)
    }
}

impl From<calamine::Error> for Error {
    fn from(err: calamine::Error) -> Self {
        Self::Sheet(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Self::Sheet(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::error::Error> for Error {
    fn from(err: serde_json::error::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::UrlParseError(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::RequestTimeout
        } else {
            Self::RequestError(err.to_string())
        }
    }
}
