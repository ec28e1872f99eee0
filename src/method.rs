//! HTTP method as a typed enum.
//!
//! Route contracts only speak the four methods services use to talk to each
//! other. Anything else is rejected at the server level with
//! `405 Method Not Allowed` before it reaches a pipeline.

use std::fmt;
use std::str::FromStr;

/// A route contract's HTTP method. Defaults to `Get`.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Method {
    Delete,
    #[default]
    Get,
    Post,
    Put,
}

impl Method {
    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Get    => "GET",
            Self::Post   => "POST",
            Self::Put    => "PUT",
        }
    }

    pub(crate) fn from_http(method: &http::Method) -> Option<Self> {
        method.as_str().parse().ok()
    }
}

/// Parses an uppercase method string (e.g. `"GET"`). Case-sensitive per RFC 9110 §9.1.
impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DELETE" => Ok(Self::Delete),
            "GET"    => Ok(Self::Get),
            "POST"   => Ok(Self::Post),
            "PUT"    => Ok(Self::Put),
            _        => Err(()),
        }
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Delete => http::Method::DELETE,
            Method::Get    => http::Method::GET,
            Method::Post   => http::Method::POST,
            Method::Put    => http::Method::PUT,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_get() {
        assert_eq!(Method::default(), Method::Get);
    }

    #[test]
    fn parsing_is_case_sensitive() {
        assert_eq!("POST".parse(), Ok(Method::Post));
        assert_eq!("post".parse::<Method>(), Err(()));
    }

    #[test]
    fn maps_from_http_and_back() {
        assert_eq!(Method::from_http(&http::Method::PUT), Some(Method::Put));
        assert_eq!(Method::from_http(&http::Method::PATCH), None);
        assert_eq!(http::Method::from(Method::Delete), http::Method::DELETE);
    }
}
