//! Share links and API locators
//!
//! A share link is `<share_base>/file/<id>`. The API locator for the same file
//! is `<api_base>/file/<id>`: the base is swapped and the id kept.

use crate::error::{SealError, SealResult};

const FILE_SEGMENT: &str = "file/";
const MAX_ID_LEN: usize = 128;

/// Public link handed to whoever should receive the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLink {
    url: String,
    id: String,
}

impl ShareLink {
    pub fn new(share_base: &str, id: &str) -> Self {
        Self {
            url: format!("{}/{FILE_SEGMENT}{id}", share_base.trim_end_matches('/')),
            id: id.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Display for ShareLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

/// Where the remote service serves a file's header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiLocator {
    pub url: String,
    pub id: String,
}

impl ApiLocator {
    /// Rewrite a share link (or any URL ending in `file/<id>`) onto `api_base`.
    pub fn from_share_url(share_url: &str, api_base: &str) -> SealResult<Self> {
        let id = parse_file_id(share_url)?;
        Ok(Self {
            url: format!("{}/{FILE_SEGMENT}{id}", api_base.trim_end_matches('/')),
            id: id.to_string(),
        })
    }
}

/// Extract the resource id from the text after the last `file/`.
///
/// A query string, fragment, or trailing `/` is dropped. The id must be
/// non-empty and URL-safe (`A-Z a-z 0-9 - _`).
pub fn parse_file_id(url: &str) -> SealResult<&str> {
    let url = url.trim();
    let start = url
        .rfind(FILE_SEGMENT)
        .map(|i| i + FILE_SEGMENT.len())
        .ok_or_else(|| SealError::InvalidShareLink(format!("no `file/` segment in {url:?}")))?;

    let rest = &url[start..];
    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    let id = rest[..end].trim_end_matches('/');

    if id.is_empty() {
        return Err(SealError::InvalidShareLink(format!("empty file id in {url:?}")));
    }
    if id.len() > MAX_ID_LEN {
        return Err(SealError::InvalidShareLink(format!(
            "file id longer than {MAX_ID_LEN} characters"
        )));
    }
    if !is_url_safe(id) {
        return Err(SealError::InvalidShareLink(format!("file id {id:?} is not URL-safe")));
    }
    Ok(id)
}

pub fn is_url_safe(s: &str) -> bool {
    s.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
