use std::time::Duration;

use reqwest::multipart::{Form, Part};

use super::api;

use crate::config::Settings;
use crate::transport::{ClientFuture, DeliveryId, Payload, ResultLookup, Transport};
use crate::Error;

pub struct BlastEngineClient {
    token: String,
    base_url: String,
    client: reqwest::Client,
}

impl BlastEngineClient {
    pub fn new(
        username: &str,
        api_key: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            token: api::token(username, api_key),
            base_url: base_url.to_string(),
            client,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, Error> {
        Self::new(
            &settings.be_username,
            settings.api_key(),
            &settings.be_base_url,
            Duration::from_secs(settings.request_timeout),
        )
    }

    /// Submit a single transaction email.
    ///
    /// With an attachment the request is multipart: the JSON body goes in
    /// the `data` part and the file in the `file` part.
    pub async fn send_transaction(&self, payload: &Payload) -> Result<DeliveryId, Error> {
        let url = api::build_endpoint_url(&self.base_url, api::Endpoint::Transaction)?;

        let body = api::TransactionRequest {
            from: api::FromAddress {
                email: &payload.from.email,
                name: &payload.from.name,
            },
            to: &payload.to,
            cc: &payload.cc,
            subject: &payload.subject,
            encode: api::ENCODING,
            text_part: &payload.text_part,
            html_part: &payload.html_part,
        };

        let req = self.client.post(url).bearer_auth(&self.token);

        let req = match &payload.attachment {
            Some(path) => {
                let data = tokio::fs::read(path).await?;
                let name = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or("attachment")
                    .to_string();

                let form = Form::new()
                    .part(
                        "data",
                        Part::text(serde_json::to_string(&body)?).mime_str("application/json")?,
                    )
                    .part(
                        "file",
                        Part::bytes(data)
                            .file_name(name.clone())
                            .mime_str(mime_for(&name))?,
                    );

                req.multipart(form)
            }
            None => req.json(&body),
        };

        // Map response into an error if applicable
        let resp = api::map_status(req.send().await?).await?;
        let result: api::TransactionResult = resp.json().await?;

        Ok(DeliveryId(result.delivery_id))
    }

    /// Fetch the delivery result (timestamps, status, open time, ...)
    pub async fn fetch_result(&self, id: DeliveryId) -> Result<serde_json::Value, Error> {
        let url = api::build_endpoint_url(&self.base_url, api::Endpoint::MailResults)?;

        let req = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .query(&[("delivery_id", id.0)]);

        let resp = api::map_status(req.send().await?).await?;
        let results: api::MailResults = resp.json().await?;

        results
            .data
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("No result for delivery {}", id)))
    }
}

fn mime_for(name: &str) -> &'static str {
    if name.to_lowercase().ends_with(".pdf") {
        "application/pdf"
    } else {
        "application/octet-stream"
    }
}

impl Transport for BlastEngineClient {
    fn submit<'a>(&'a self, payload: &'a Payload) -> ClientFuture<'a, DeliveryId> {
        Box::pin(self.send_transaction(payload))
    }
}

impl ResultLookup for BlastEngineClient {
    fn mail_result(&self, id: DeliveryId) -> ClientFuture<'_, serde_json::Value> {
        Box::pin(self.fetch_result(id))
    }
}
