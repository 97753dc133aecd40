use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::blastengine::api::{DEFAULT_BASE_URL, REQUEST_TIMEOUT};
use crate::delivery::{self, Layout};
use crate::Error;

/// Optional config file, looked up relative to the working directory.
pub const DEFAULT_PATH: &str = "blastmail";

/// Process-wide settings. Loaded once and passed to every component.
#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default = "default_sheet_name")]
    pub send_list_sheetname: String,

    pub from_name: String,
    pub from_address: String,
    pub email_subject: String,

    pub be_username: String,
    pub be_api_key: SecretString,

    #[serde(default = "default_txt_template")]
    pub txt_template: PathBuf,
    #[serde(default = "default_html_template")]
    pub html_template: PathBuf,

    #[serde(default)]
    pub layout: Layout,

    /// Directory the per-recipient PDFs are resolved against
    #[serde(default = "default_attachment_dir")]
    pub attachment_dir: PathBuf,

    /// Comma separated
    #[serde(default)]
    pub cc_addresses: String,

    #[serde(default = "default_base_url")]
    pub be_base_url: String,

    /// Request timeout, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_sheet_name() -> String {
    "Sheet1".to_string()
}

fn default_txt_template() -> PathBuf {
    PathBuf::from("./templates/template.txt.j2")
}

fn default_html_template() -> PathBuf {
    PathBuf::from("./templates/template.html.j2")
}

fn default_attachment_dir() -> PathBuf {
    PathBuf::from("./pdf")
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    REQUEST_TIMEOUT
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

/// Loads a `.env` file into the process environment.
///
/// An explicit path must exist. Without one, `.env` in the working
/// directory is used if present.
pub fn load_env_file(path: Option<&Path>) -> Result<(), Error> {
    match path {
        Some(path) => {
            dotenvy::from_path(path)?;
            log::debug!("Loaded environment from {}", path.display());
        }
        None => {
            if let Ok(path) = dotenvy::dotenv() {
                log::debug!("Loaded environment from {}", path.display());
            }
        }
    }

    Ok(())
}

impl Settings {
    /// Loads settings from `blastmail.toml` (if any) merged with the
    /// process environment. Environment variables win.
    pub fn load() -> Result<Self, Error> {
        let c = config::Config::builder()
            .add_source(config::File::with_name(DEFAULT_PATH).required(false))
            .add_source(config::Environment::default())
            .build()?;

        Self::from_config(c)
    }

    pub fn from_config(c: config::Config) -> Result<Self, Error> {
        let settings: Settings = c.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), Error> {
        if delivery::validate_address(&self.from_address).is_err() {
            return Err(Error::Config(format!(
                "from_address is not a valid address: {:?}",
                self.from_address
            )));
        }

        for addr in self.cc_list() {
            if delivery::validate_address(&addr).is_err() {
                return Err(Error::Config(format!(
                    "cc_addresses contains an invalid address: {:?}",
                    addr
                )));
            }
        }

        Ok(())
    }

    /// Default CC list applied to deliveries that do not carry their own
    pub fn cc_list(&self) -> Vec<String> {
        delivery::split_addresses(&self.cc_addresses)
    }

    pub fn api_key(&self) -> &str {
        self.be_api_key.expose_secret()
    }

    /// JSON view of the settings for logging. Credentials are redacted.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "send_list_sheetname": self.send_list_sheetname,
            "from_name": self.from_name,
            "from_address": self.from_address,
            "email_subject": self.email_subject,
            "be_username": self.be_username,
            "be_api_key": "**********",
            "txt_template": self.txt_template,
            "html_template": self.html_template,
            "layout": self.layout.to_string(),
            "attachment_dir": self.attachment_dir,
            "cc_addresses": self.cc_list(),
            "be_base_url": self.be_base_url,
            "request_timeout": self.request_timeout,
            "log_dir": self.log_dir,
        })
    }
}
