//! Header definitions
//!
//! Well-known header names travel as one type byte, custom names as
//! `254` followed by the name string. The StatusCode header value is a
//! single byte, every other value is a string.

use std::fmt;

/// Type byte announcing a custom header name
pub const HEADER_CUSTOM: u8 = 254;

/// Type byte terminating the header list
pub const HEADER_END: u8 = 255;

/// Reply status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StatusCode {
    Success = 0,
    InvalidMessageFormat = 1,
    InvalidRequestUri = 2,
    AccessDenied = 3,
    ServerBusy = 4,
    ServerError = 254,
    InternalError = 255,
}

impl StatusCode {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(StatusCode::Success),
            1 => Some(StatusCode::InvalidMessageFormat),
            2 => Some(StatusCode::InvalidRequestUri),
            3 => Some(StatusCode::AccessDenied),
            4 => Some(StatusCode::ServerBusy),
            254 => Some(StatusCode::ServerError),
            255 => Some(StatusCode::InternalError),
            _ => None,
        }
    }

    /// Statuses the server reports with an error frame before closing
    pub fn closes_connection(self) -> bool {
        matches!(
            self,
            StatusCode::InvalidMessageFormat
                | StatusCode::InvalidRequestUri
                | StatusCode::ServerBusy
                | StatusCode::InternalError
        )
    }
}

/// Header names
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HeaderName {
    ConnectionId,
    RequestUri,
    StatusCode,
    ErrorMessage,
    AuthToken,
    ContentType,
    Custom(String),
}

impl HeaderName {
    /// Type byte written before the header
    pub fn code(&self) -> u8 {
        match self {
            HeaderName::ConnectionId => 0,
            HeaderName::RequestUri => 1,
            HeaderName::StatusCode => 2,
            HeaderName::ErrorMessage => 3,
            HeaderName::AuthToken => 4,
            HeaderName::ContentType => 5,
            HeaderName::Custom(_) => HEADER_CUSTOM,
        }
    }

    /// Well-known name for a type byte (custom and end markers excluded)
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(HeaderName::ConnectionId),
            1 => Some(HeaderName::RequestUri),
            2 => Some(HeaderName::StatusCode),
            3 => Some(HeaderName::ErrorMessage),
            4 => Some(HeaderName::AuthToken),
            5 => Some(HeaderName::ContentType),
            _ => None,
        }
    }

    pub fn custom(name: impl Into<String>) -> Self {
        HeaderName::Custom(name.into())
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderName::Custom(name) => f.write_str(name),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Header value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Text(String),
    Status(StatusCode),
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(text) => Some(text),
            HeaderValue::Status(_) => None,
        }
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Text(value)
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Text(value.to_string())
    }
}

impl From<StatusCode> for HeaderValue {
    fn from(value: StatusCode) -> Self {
        HeaderValue::Status(value)
    }
}

/// Ordered header list; a name appears at most once
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(HeaderName, HeaderValue)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing an earlier value in place
    pub fn insert(&mut self, name: HeaderName, value: impl Into<HeaderValue>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Builder-style `insert`
    pub fn with(mut self, name: HeaderName, value: impl Into<HeaderValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_str(&self, name: &HeaderName) -> Option<&str> {
        self.get(name).and_then(HeaderValue::as_str)
    }

    pub fn get_custom(&self, name: &str) -> Option<&str> {
        self.entries.iter().find_map(|(n, v)| match n {
            HeaderName::Custom(custom) if custom == name => v.as_str(),
            _ => None,
        })
    }

    pub fn remove(&mut self, name: &HeaderName) -> Option<HeaderValue> {
        let idx = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self.get(&HeaderName::StatusCode) {
            Some(HeaderValue::Status(status)) => Some(*status),
            _ => None,
        }
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.insert(HeaderName::StatusCode, status);
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get_str(&HeaderName::ContentType)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.get_str(&HeaderName::ErrorMessage)
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.get_str(&HeaderName::AuthToken)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.entries.iter().map(|(n, v)| (n, v))
    }
}

impl FromIterator<(HeaderName, HeaderValue)> for Headers {
    fn from_iter<I: IntoIterator<Item = (HeaderName, HeaderValue)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}
