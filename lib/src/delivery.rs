use std::path::{Path, PathBuf};

use email_address_parser::EmailAddress;
use serde::{Deserialize, Serialize};

use crate::sheet::Row;
use crate::Error;

/// Spreadsheet schemas this tool knows how to send from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// One PDF attached per recipient
    Invoice,
    /// Plain notice, header below a 3-row banner
    Notice,
}

impl Default for Layout {
    fn default() -> Self {
        Layout::Notice
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            Self::Invoice => write!(f, "invoice"),
            Self::Notice => write!(f, "notice"),
        }
    }
}

impl std::str::FromStr for Layout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invoice" => Ok(Self::Invoice),
            "notice" => Ok(Self::Notice),
            _ => Err(Error::Config(format!("Unknown layout: {}", s))),
        }
    }
}

const INVOICE_HEADERS: &[(&str, &str)] = &[
    ("メールアドレス", "email_address"),
    ("発行番号", "iss_num"),
    ("宛名", "addressee"),
    ("支払日", "paydate"),
    ("申請番号", "app_num"),
    ("PDFファイル名", "pdf_filename"),
];

const NOTICE_HEADERS: &[(&str, &str)] = &[
    ("通し番号", "app_id"),
    ("メールアドレス", "email_address"),
    ("CC", "cc"),
];

impl Layout {
    /// Number of rows above the header row
    pub fn skip_rows(&self) -> usize {
        match *self {
            Self::Invoice => 0,
            Self::Notice => 3,
        }
    }

    /// Map a localized column header to its canonical field name.
    /// Unknown headers are passed through unchanged.
    pub fn canonical_header<'a>(&self, header: &'a str) -> &'a str {
        let table = match *self {
            Self::Invoice => INVOICE_HEADERS,
            Self::Notice => NOTICE_HEADERS,
        };

        table
            .iter()
            .find(|(localized, _)| *localized == header)
            .map(|(_, canonical)| *canonical)
            .unwrap_or(header)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InvoiceDelivery {
    pub email_address: String,
    pub iss_num: String,
    pub addressee: String,
    pub paydate: String,
    pub app_num: String,
    pub pdf_filename: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoticeDelivery {
    pub app_id: String,
    pub email_address: String,
    #[serde(rename = "cc", default, deserialize_with = "deserialize_addresses")]
    pub cc_list: Vec<String>,
}

/// A single recipient's data. Serializes to a flat object of canonical
/// field names, which is also the template context.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Delivery {
    Invoice(InvoiceDelivery),
    Notice(NoticeDelivery),
}

fn deserialize_addresses<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(split_addresses(&raw))
}

/// Split a comma or semicolon separated address list, dropping blanks
pub fn split_addresses(raw: &str) -> Vec<String> {
    raw.split(|c| c == ',' || c == ';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Syntactic address check. No DNS or mailbox lookups.
pub fn validate_address(addr: &str) -> Result<(), Error> {
    match EmailAddress::parse(addr.trim(), None) {
        Some(_) => Ok(()),
        None => Err(Error::InvalidAddress(addr.to_string())),
    }
}

impl Delivery {
    /// Build a typed record from a spreadsheet row. Columns the layout
    /// does not use are ignored.
    pub fn from_row(
        row: &Row,
        layout: Layout,
        default_cc: &[String],
    ) -> Result<Self, serde_json::Error> {
        let fields = serde_json::Value::Object(row.fields.clone());

        match layout {
            Layout::Invoice => Ok(Self::Invoice(serde_json::from_value(fields)?)),
            Layout::Notice => {
                let mut notice: NoticeDelivery = serde_json::from_value(fields)?;
                if notice.cc_list.is_empty() {
                    notice.cc_list = default_cc.to_vec();
                }
                Ok(Self::Notice(notice))
            }
        }
    }

    pub fn to_addr(&self) -> &str {
        match self {
            Self::Invoice(d) => d.email_address.trim(),
            Self::Notice(d) => d.email_address.trim(),
        }
    }

    pub fn cc_list(&self) -> &[String] {
        match self {
            Self::Invoice(_) => &[],
            Self::Notice(d) => &d.cc_list,
        }
    }

    /// Path of the file attached to this delivery, if the layout has one
    pub fn attachment_path(&self, dir: &Path) -> Option<PathBuf> {
        match self {
            Self::Invoice(d) => Some(dir.join(&d.pdf_filename)),
            Self::Notice(_) => None,
        }
    }

    /// Record fields as a JSON object, for logs
    pub fn fields(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

/// Validate every row into a delivery.
///
/// All rows are checked and every failure is logged with the row's
/// contents. If any row fails, no deliveries are returned at all.
pub fn build_deliveries(
    rows: &[Row],
    layout: Layout,
    default_cc: &[String],
) -> Result<Vec<Delivery>, Error> {
    let mut deliveries = Vec::with_capacity(rows.len());
    let mut failed = 0;

    for row in rows {
        match Delivery::from_row(row, layout, default_cc) {
            Ok(delivery) => deliveries.push(delivery),
            Err(e) => {
                log::error!(
                    "Failed to read row {}: {} (row = {})",
                    row.line,
                    e,
                    serde_json::Value::Object(row.fields.clone())
                );
                failed += 1;
            }
        }
    }

    if failed > 0 {
        Err(Error::InvalidRows(failed))
    } else {
        Ok(deliveries)
    }
}
