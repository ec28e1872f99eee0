//! Path templates and query strings.
//!
//! A route path such as `/users/:id/posts/:post` names its variable segments
//! with `:identifier` tokens (`[a-zA-Z0-9]+`). Callers fill them in from a
//! [`ParamSource`]; the server registers the same template with the router
//! after rewriting it to matchit's `{identifier}` syntax.
//!
//! Substituted values are percent-encoded as single path segments, so a value
//! holding `/`, `?` or a space stays inside its segment. The router decodes
//! captures again before they reach a handler.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use regex::{Captures, Regex};

use crate::error::{Error, Result};
use crate::form::Fields;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":([a-zA-Z0-9]+)").expect("placeholder pattern is valid"));

/// Bytes escaped inside one path segment: controls, space, the URL
/// delimiters and `%` itself.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Anything route params can be looked up in.
pub trait ParamSource {
    /// The value for `name`. Multi-valued sources return their first value.
    fn first(&self, name: &str) -> Option<&str>;
}

impl ParamSource for Fields {
    fn first(&self, name: &str) -> Option<&str> {
        Fields::first(self, name)
    }
}

impl ParamSource for BTreeMap<String, String> {
    fn first(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl ParamSource for HashMap<String, String> {
    fn first(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

/// Names of every placeholder in `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Replaces every `:name` in `template` with its value from `params`.
///
/// Values are percent-encoded as path segments. Fails with
/// [`Error::MissingRouteParam`] on the first placeholder that has no value.
/// A template without placeholders comes back unchanged.
pub fn substitute_path(template: &str, params: &impl ParamSource) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let (whole, name) = match (caps.get(0), caps.get(1)) {
            (Some(whole), Some(name)) => (whole, name.as_str()),
            _ => continue,
        };
        let value = params
            .first(name)
            .ok_or_else(|| Error::MissingRouteParam { name: name.to_owned() })?;
        out.push_str(&template[last..whole.start()]);
        out.extend(utf8_percent_encode(value, PATH_SEGMENT));
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

/// Substitutes `template` and splices the result into `url` in its place.
///
/// The template literal is searched from the end of `url`, where the resolver
/// put it, so a namespace that happens to equal the path is left alone. If the
/// literal is absent `url` is returned unchanged.
pub fn substitute_in_url(url: &str, template: &str, params: &impl ParamSource) -> Result<String> {
    let path = substitute_path(template, params)?;
    if path == template {
        return Ok(url.to_owned());
    }
    let Some(at) = url.rfind(template) else {
        return Ok(url.to_owned());
    };
    let mut out = String::with_capacity(url.len() - template.len() + path.len());
    out.push_str(&url[..at]);
    out.push_str(&path);
    out.push_str(&url[at + template.len()..]);
    Ok(out)
}

/// Appends `fields` as a URL-encoded query string.
///
/// Joins with `&` when `url` already carries a query, so the result never has
/// two `?`. Empty `fields` leave `url` untouched.
pub fn append_query(url: &str, fields: &Fields) -> Result<String> {
    if fields.is_empty() {
        return Ok(url.to_owned());
    }
    let query = fields.encode()?;
    if query.is_empty() {
        return Ok(url.to_owned());
    }

    let separator = match url.find('?') {
        None => "?",
        Some(at) if at + 1 == url.len() || url.ends_with('&') => "",
        Some(_) => "&",
    };
    let mut out = String::with_capacity(url.len() + separator.len() + query.len());
    out.push_str(url);
    out.push_str(separator);
    out.push_str(&query);
    Ok(out)
}

/// Rewrites `:name` placeholders into the router's `{name}` syntax.
pub fn to_router_path(template: &str) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| format!("{{{}}}", &caps[1]))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    #[test]
    fn substitutes_every_placeholder() {
        let path = substitute_path(
            "/users/:id/posts/:post",
            &params(&[("id", "42"), ("post", "7")]),
        )
        .unwrap();
        assert_eq!(path, "/users/42/posts/7");
        assert!(placeholders(&path).is_empty());
    }

    #[test]
    fn values_are_escaped_as_one_segment() {
        let path = substitute_path("/users/:id", &params(&[("id", "ana maria/x?y%")])).unwrap();
        assert_eq!(path, "/users/ana%20maria%2Fx%3Fy%25");
        assert_eq!(substitute_path("/users/:id", &params(&[("id", "ana-maria_1.x")])).unwrap(), "/users/ana-maria_1.x");
    }

    #[test]
    fn missing_param_is_an_error() {
        let err = substitute_path("/users/:id/posts/:post", &params(&[("id", "42")])).unwrap_err();
        match err {
            Error::MissingRouteParam { name } => assert_eq!(name, "post"),
            other => panic!("expected MissingRouteParam, got {other:?}"),
        }
    }

    #[test]
    fn multi_valued_sources_use_the_first_value() {
        let fields: Fields = [("id", "1"), ("id", "2")].into_iter().collect();
        assert_eq!(substitute_path("/items/:id", &fields).unwrap(), "/items/1");
    }

    #[test]
    fn template_without_placeholders_is_unchanged() {
        assert_eq!(substitute_path("/echo", &params(&[])).unwrap(), "/echo");
    }

    #[test]
    fn substitution_rewrites_only_the_path_part_of_the_url() {
        let url = "http://localhost:8080/echo/v0/echo/:id";
        let out = substitute_in_url(url, "/echo/:id", &params(&[("id", "9")])).unwrap();
        assert_eq!(out, "http://localhost:8080/echo/v0/echo/9");
    }

    #[test]
    fn appends_query() {
        let fields: Fields = [("b", "2"), ("a", "x y")].into_iter().collect();
        let url = append_query("http://h:1/v0/find", &fields).unwrap();
        assert_eq!(url, "http://h:1/v0/find?a=x+y&b=2");
    }

    #[test]
    fn existing_query_is_joined_with_ampersand() {
        let fields: Fields = [("page", "2")].into_iter().collect();
        let url = append_query("http://h:1/v0/find?q=rust", &fields).unwrap();
        assert_eq!(url, "http://h:1/v0/find?q=rust&page=2");
        assert_eq!(url.matches('?').count(), 1);

        let bare = append_query("http://h:1/v0/find?", &fields).unwrap();
        assert_eq!(bare, "http://h:1/v0/find?page=2");
    }

    #[test]
    fn empty_query_leaves_url_alone() {
        assert_eq!(append_query("http://h:1/x", &Fields::new()).unwrap(), "http://h:1/x");
    }

    #[test]
    fn router_path_uses_braces() {
        assert_eq!(to_router_path("/users/:id/posts/:post"), "/users/{id}/posts/{post}");
        assert_eq!(to_router_path("/echo"), "/echo");
    }

    #[test]
    fn lists_placeholders_in_order() {
        assert_eq!(placeholders("/a/:x/b/:y2"), ["x", "y2"]);
    }
}
