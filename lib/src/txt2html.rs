use std::path::{Path, PathBuf};

use crate::Error;

pub const TXT_SUFFIX: &str = ".txt.j2";
pub const HTML_SUFFIX: &str = ".html.j2";

/// HTML-escape a plain-text body and mark every line break with `<br>`.
///
/// Escaping runs first so the inserted markers are never escaped.
pub fn escape(text: &str) -> String {
    let escaped = html_escape::encode_quoted_attribute(text);
    let mut out = String::with_capacity(escaped.len() + escaped.len() / 8);

    for line in escaped.split_inclusive('\n') {
        if let Some(body) = line.strip_suffix("\r\n") {
            out.push_str(body);
            out.push_str("<br>\r\n");
        } else if let Some(body) = line.strip_suffix('\n') {
            out.push_str(body);
            out.push_str("<br>\n");
        } else {
            out.push_str(line);
        }
    }

    out
}

/// Path of the HTML template generated from `src`
pub fn target_path(src: &Path) -> Result<PathBuf, Error> {
    let name = src.file_name().and_then(|name| name.to_str()).unwrap_or("");

    match name.strip_suffix(TXT_SUFFIX) {
        Some(stem) => Ok(src.with_file_name(format!("{}{}", stem, HTML_SUFFIX))),
        None => Err(Error::Conversion(format!(
            "Expected a file ending in {:?}: {}",
            TXT_SUFFIX,
            src.display()
        ))),
    }
}

/// Convert a `*.txt.j2` template into a `*.html.j2` next to it.
/// Never overwrites an existing file.
pub fn convert(src: &Path) -> Result<PathBuf, Error> {
    if !src.is_file() {
        return Err(Error::Conversion(format!("Not a file: {}", src.display())));
    }

    let target = target_path(src)?;

    if target.exists() {
        return Err(Error::Conversion(format!(
            "Target already exists: {}",
            target.display()
        )));
    }

    let text = std::fs::read_to_string(src)?;
    std::fs::write(&target, escape(&text))?;

    log::info!("Converted {} -> {}", src.display(), target.display());

    Ok(target)
}

/// Convert every `*.txt.j2` directly inside `dir`, in name order.
/// Stops at the first failure.
pub fn convert_dir(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut sources = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_template = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.ends_with(TXT_SUFFIX))
            .unwrap_or(false);

        if is_template && path.is_file() {
            sources.push(path);
        }
    }

    if sources.is_empty() {
        log::warn!("No {} templates in {}", TXT_SUFFIX, dir.display());
    }

    sources.sort();
    sources.iter().map(|src| convert(src)).collect()
}

/// Convert a single template or a whole directory of them
pub fn convert_path(path: &Path) -> Result<Vec<PathBuf>, Error> {
    if path.is_dir() {
        convert_dir(path)
    } else {
        convert(path).map(|target| vec![target])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape("<b>Tom & \"Jerry\"</b>\nline 2\n"),
            "&lt;b&gt;Tom &amp; &quot;Jerry&quot;&lt;/b&gt;<br>\nline 2<br>\n"
        );
        assert_eq!(escape("it's"), "it&#x27;s");
    }

    #[test]
    fn test_escape_crlf_and_no_trailing_newline() {
        assert_eq!(escape("a\r\nb\r\nc"), "a<br>\r\nb<br>\r\nc");
    }

    #[test]
    fn test_convert() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("mail.txt.j2");
        std::fs::write(&src, "{{ addressee }} 様\n1 < 2\n").unwrap();

        let target = convert(&src).unwrap();

        assert_eq!(target, dir.path().join("mail.html.j2"));
        assert_eq!(
            std::fs::read_to_string(&target).unwrap(),
            "{{ addressee }} 様<br>\n1 &lt; 2<br>\n"
        );
    }

    #[test]
    fn test_wrong_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("mail.txt");
        std::fs::write(&src, "hello\n").unwrap();

        let result = convert(&src);

        assert!(matches!(result, Err(Error::Conversion(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("mail.txt.j2");
        let target = dir.path().join("mail.html.j2");
        std::fs::write(&src, "new\n").unwrap();
        std::fs::write(&target, "existing").unwrap();

        let result = convert(&src);

        assert!(matches!(result, Err(Error::Conversion(_))));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "existing");
    }

    #[test]
    fn test_second_run_fails() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("mail.txt.j2");
        std::fs::write(&src, "hello\n").unwrap();

        assert!(convert(&src).is_ok());
        assert!(matches!(convert(&src), Err(Error::Conversion(_))));
    }

    #[test]
    fn test_not_a_file() {
        let dir = tempfile::tempdir().unwrap();

        let result = convert(&dir.path().join("missing.txt.j2"));

        assert!(matches!(result, Err(Error::Conversion(_))));
    }

    #[test]
    fn test_convert_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt.j2"), "b\n").unwrap();
        std::fs::write(dir.path().join("a.txt.j2"), "a\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip\n").unwrap();

        let targets = convert_path(dir.path()).unwrap();

        assert_eq!(
            targets,
            vec![dir.path().join("a.html.j2"), dir.path().join("b.html.j2")]
        );
        assert!(!dir.path().join("notes.html.j2").exists());
    }
}
