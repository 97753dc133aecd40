use base64::Engine;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Error;

pub const DEFAULT_BASE_URL: &str = "https://app.engn.jp/api/v1";

// Request timeout, in seconds
pub(crate) const REQUEST_TIMEOUT: u64 = 30;

pub const ENCODING: &str = "UTF-8";

/// Bearer token for the API: base64 of the lowercase hex SHA-256 of
/// the login id followed by the API key.
pub fn token(username: &str, api_key: &str) -> String {
    let digest = Sha256::digest(format!("{}{}", username, api_key).as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hex::encode(digest))
}

/// Map possible API errors to the crate error type
pub async fn map_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();

    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let msg = format!("{}: {}", status, body);

    match status {
        StatusCode::BAD_REQUEST => Err(Error::BadInput(msg)),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Unauthorized(msg)),
        StatusCode::NOT_FOUND => Err(Error::NotFound(msg)),
        StatusCode::TOO_MANY_REQUESTS => Err(Error::RateLimited(msg)),
        _ => Err(Error::Internal(msg)),
    }
}

pub enum Endpoint {
    Transaction,
    MailResults,
}

#[inline]
pub fn build_endpoint_url(base: &str, endpoint: Endpoint) -> Result<url::Url, Error> {
    let base = base.trim_end_matches('/');
    let url = match endpoint {
        Endpoint::Transaction => format!("{}/{}", base, "deliveries/transaction"),
        Endpoint::MailResults => format!("{}/{}", base, "logs/mails/results"),
    };
    Ok(url::Url::parse(&url)?)
}

#[derive(Serialize, Debug)]
pub struct FromAddress<'a> {
    pub email: &'a str,
    pub name: &'a str,
}

/// Body of a transaction submission. Sent as JSON, or as the `data`
/// part of a multipart request when there is an attachment.
#[derive(Serialize, Debug)]
pub struct TransactionRequest<'a> {
    pub from: FromAddress<'a>,
    pub to: &'a str,
    #[serde(skip_serializing_if = "no_cc")]
    pub cc: &'a [String],
    pub subject: &'a str,
    pub encode: &'static str,
    pub text_part: &'a str,
    pub html_part: &'a str,
}

fn no_cc(cc: &&[String]) -> bool {
    cc.is_empty()
}

#[derive(Deserialize, Debug)]
pub struct TransactionResult {
    pub delivery_id: u64,
}

#[derive(Deserialize, Debug)]
pub struct MailResults {
    pub data: Vec<serde_json::Value>,
}
