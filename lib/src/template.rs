use std::path::Path;

use tera::{Context, Tera};

use crate::config::Settings;
use crate::delivery::Delivery;
use crate::Error;

const TXT: &str = "txt";
const HTML: &str = "html";

/// Bodies rendered for a single delivery
#[derive(Clone, Debug)]
pub struct Rendered {
    pub text: String,
    pub html: String,
}

/// The plain-text and HTML body templates.
///
/// Tera fails on any placeholder missing from the context, so a template
/// that does not match the send list never renders a blank.
pub struct Templates {
    tera: Tera,
}

impl Templates {
    pub fn load(settings: &Settings) -> Result<Self, Error> {
        Self::from_files(&settings.txt_template, &settings.html_template)
    }

    pub fn from_files(txt: &Path, html: &Path) -> Result<Self, Error> {
        for path in &[txt, html] {
            if !path.is_file() {
                return Err(Error::Template(format!(
                    "Template not found: {}",
                    path.display()
                )));
            }
        }

        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_template_file(txt, Some(TXT))?;
        tera.add_template_file(html, Some(HTML))?;

        log::debug!("Loaded templates {} and {}", txt.display(), html.display());

        Ok(Self { tera })
    }

    pub fn from_strings(txt: &str, html: &str) -> Result<Self, Error> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_templates(vec![(TXT, txt), (HTML, html)])?;

        Ok(Self { tera })
    }

    pub fn render(&self, delivery: &Delivery) -> Result<Rendered, Error> {
        let context = Context::from_serialize(delivery)?;

        Ok(Rendered {
            text: self.tera.render(TXT, &context)?,
            html: self.tera.render(HTML, &context)?,
        })
    }
}
