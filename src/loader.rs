//! Form document loading from various sources.
//!
//! Handles loading documents from files, strings, and HTTP URLs.

use std::path::Path;

use serde_json::Value;

use crate::document::{parse_document, FormDocument};
use crate::error::CompileError;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Load raw JSON from a file path.
///
/// Used for form data as well as documents.
///
/// # Errors
///
/// Returns `CompileError::FileNotFound` if the file doesn't exist,
/// or `CompileError::InvalidJson` if the file isn't valid JSON.
pub fn load_value(path: &Path) -> Result<Value, CompileError> {
    if !path.exists() {
        return Err(CompileError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| CompileError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| CompileError::InvalidJson { source })
}

/// Load a form document from a file path.
///
/// # Errors
///
/// IO and JSON errors as for [`load_value`], or
/// `CompileError::InvalidSchema` if the document is malformed.
pub fn load_document(path: &Path) -> Result<FormDocument, CompileError> {
    parse_document(&load_value(path)?)
}

/// Load a form document from a JSON string.
///
/// # Errors
///
/// Returns `CompileError::InvalidJson` if the string isn't valid JSON, or
/// `CompileError::InvalidSchema` if the document is malformed.
pub fn load_document_str(content: &str) -> Result<FormDocument, CompileError> {
    let value: Value =
        serde_json::from_str(content).map_err(|source| CompileError::InvalidJson { source })?;
    parse_document(&value)
}

/// Load a form document from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `CompileError::NetworkError` if the request fails or the body
/// isn't JSON, or `CompileError::InvalidSchema` if the document is malformed.
#[cfg(feature = "remote")]
pub fn load_document_url(url: &str) -> Result<FormDocument, CompileError> {
    let network = |source| CompileError::NetworkError {
        url: url.to_string(),
        source,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(network)?;

    tracing::debug!(url, "fetching form document");
    let value: Value = client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.json())
        .map_err(network)?;

    parse_document(&value)
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load a form document from a file path or URL.
///
/// URL loading requires the `remote` feature.
///
/// # Errors
///
/// Returns appropriate errors based on the source type.
pub fn load_document_auto(source: &str) -> Result<FormDocument, CompileError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_document_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(CompileError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        load_document(Path::new(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const DOCUMENT: &str = r#"{
        "schema": {
            "name": {"type": "string", "constraints": ["required"]},
            "age": {"type": "number"}
        },
        "flow": ["name", "age"]
    }"#;

    #[test]
    fn load_document_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", DOCUMENT).unwrap();

        let document = load_document(file.path()).unwrap();
        assert_eq!(document.schema.len(), 2);
        assert_eq!(document.flow.unwrap().keys(), vec!["name", "age"]);
    }

    #[test]
    fn load_document_file_not_found() {
        let result = load_document(Path::new("/nonexistent/form.json"));
        assert!(matches!(result, Err(CompileError::FileNotFound { .. })));
    }

    #[test]
    fn load_value_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid json").unwrap();

        let result = load_value(file.path());
        assert!(matches!(result, Err(CompileError::InvalidJson { .. })));
    }

    #[test]
    fn load_document_str_valid() {
        let document = load_document_str(DOCUMENT).unwrap();
        assert!(document.schema.contains_key("age"));
    }

    #[test]
    fn load_document_str_invalid() {
        let result = load_document_str("not json");
        assert!(matches!(result, Err(CompileError::InvalidJson { .. })));
    }

    #[test]
    fn load_document_str_malformed_entry() {
        let result = load_document_str(r#"{"schema": {"a": {"type": "colour"}}}"#);
        assert!(matches!(result, Err(CompileError::InvalidSchema { .. })));
    }

    #[test]
    fn is_url_https() {
        assert!(is_url("https://example.com/form.json"));
    }

    #[test]
    fn is_url_http() {
        assert!(is_url("http://example.com/form.json"));
    }

    #[test]
    fn is_url_file_path() {
        assert!(!is_url("/path/to/form.json"));
        assert!(!is_url("./form.json"));
        assert!(!is_url("form.json"));
    }

    #[test]
    fn load_document_auto_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", DOCUMENT).unwrap();

        let document = load_document_auto(file.path().to_str().unwrap()).unwrap();
        assert_eq!(document.schema.len(), 2);
    }

    #[cfg(feature = "remote")]
    mod remote {
        use super::*;

        #[test]
        fn load_document_url_valid() {
            let mut server = mockito::Server::new();
            let mock = server
                .mock("GET", "/form.json")
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(DOCUMENT)
                .create();

            let document = load_document_url(&format!("{}/form.json", server.url())).unwrap();
            assert!(document.schema.contains_key("name"));
            mock.assert();
        }

        #[test]
        fn load_document_url_404() {
            let mut server = mockito::Server::new();
            let _mock = server.mock("GET", "/missing.json").with_status(404).create();

            let result = load_document_url(&format!("{}/missing.json", server.url()));
            assert!(matches!(result, Err(CompileError::NetworkError { .. })));
        }

        #[test]
        fn load_document_url_not_json() {
            let mut server = mockito::Server::new();
            let _mock = server
                .mock("GET", "/form.json")
                .with_status(200)
                .with_body("<html></html>")
                .create();

            let result = load_document_url(&format!("{}/form.json", server.url()));
            assert!(matches!(result, Err(CompileError::NetworkError { .. })));
        }

        #[test]
        fn load_document_auto_url() {
            let mut server = mockito::Server::new();
            let _mock = server
                .mock("GET", "/form.json")
                .with_status(200)
                .with_body(DOCUMENT)
                .create();

            assert!(load_document_auto(&format!("{}/form.json", server.url())).is_ok());
        }
    }
}
