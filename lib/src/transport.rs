use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use serde::Serialize;

use crate::config::Settings;
use crate::delivery::Delivery;
use crate::template::Rendered;
use crate::Error;

// Definition of future types for async use
pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

/// Opaque id the provider assigns to a submitted delivery.
/// Dry-runs use 0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DeliveryId(pub u64);

impl std::fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub struct Sender {
    pub email: String,
    pub name: String,
}

/// Everything the provider needs to send one email
#[derive(Clone, Debug)]
pub struct Payload {
    pub subject: String,
    pub from: Sender,
    pub to: String,
    pub cc: Vec<String>,
    pub text_part: String,
    pub html_part: String,
    pub attachment: Option<PathBuf>,
}

impl Payload {
    /// Assemble the payload for `delivery`. Fails if the delivery carries
    /// an attachment that is not on disk.
    pub fn build(
        delivery: &Delivery,
        settings: &Settings,
        rendered: &Rendered,
    ) -> Result<Self, Error> {
        let attachment = delivery.attachment_path(&settings.attachment_dir);

        if let Some(path) = &attachment {
            if !path.is_file() {
                return Err(Error::AttachmentNotFound(path.clone()));
            }
        }

        Ok(Self {
            subject: settings.email_subject.clone(),
            from: Sender {
                email: settings.from_address.clone(),
                name: settings.from_name.clone(),
            },
            to: delivery.to_addr().to_string(),
            cc: delivery.cc_list().to_vec(),
            text_part: rendered.text.clone(),
            html_part: rendered.html.clone(),
            attachment,
        })
    }
}

/// Submits payloads to an email provider
pub trait Transport {
    fn submit<'a>(&'a self, payload: &'a Payload) -> ClientFuture<'a, DeliveryId>;
}

/// Looks up the delivery result of a previously submitted email
pub trait ResultLookup {
    fn mail_result(&self, id: DeliveryId) -> ClientFuture<'_, serde_json::Value>;
}
