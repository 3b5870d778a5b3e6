//! Borrowed view of an incoming request, handed to key extractors.

use http::{Extensions, HeaderMap, Method, Request, Uri};
use url::form_urlencoded;

/// The parts of a request a key extractor may look at.
///
/// Borrowing instead of taking the whole `http::Request<B>` keeps key
/// extractors independent of the body type.
#[derive(Debug, Clone, Copy)]
pub struct RequestHead<'a> {
    /// Request method
    pub method: &'a Method,
    /// Request URI, including the query string
    pub uri: &'a Uri,
    /// Request headers
    pub headers: &'a HeaderMap,
    /// Extensions set by earlier layers (e.g. connection info)
    pub extensions: &'a Extensions,
}

impl<'a> RequestHead<'a> {
    /// Borrow the head of `request`.
    pub fn from_request<B>(request: &'a Request<B>) -> Self {
        Self {
            method: request.method(),
            uri: request.uri(),
            headers: request.headers(),
            extensions: request.extensions(),
        }
    }

    /// First value of query parameter `name`, percent-decoded.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.uri.query()?;
        form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Value of header `name`, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Path segment at `index`, ignoring the leading slash.
    ///
    /// For `/accounts/42/orders`, index 1 is `"42"`.
    pub fn path_segment(&self, index: usize) -> Option<&'a str> {
        self.uri
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
            .nth(index)
    }
}

impl<'a, B> From<&'a Request<B>> for RequestHead<'a> {
    fn from(request: &'a Request<B>) -> Self {
        Self::from_request(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> Request<()> {
        Request::builder()
            .uri(uri)
            .header("x-api-key", "abc")
            .body(())
            .unwrap()
    }

    #[test]
    fn test_query_param() {
        let req = request("/orders?account_id=42&name=a%20b");
        let head = RequestHead::from_request(&req);

        assert_eq!(head.query_param("account_id"), Some("42".to_string()));
        assert_eq!(head.query_param("name"), Some("a b".to_string()));
        assert_eq!(head.query_param("missing"), None);
    }

    #[test]
    fn test_query_param_without_query() {
        let req = request("/orders");
        assert_eq!(RequestHead::from_request(&req).query_param("account_id"), None);
    }

    #[test]
    fn test_header() {
        let req = request("/");
        let head = RequestHead::from(&req);

        assert_eq!(head.header("x-api-key"), Some("abc"));
        assert_eq!(head.header("X-Api-Key"), Some("abc"));
        assert_eq!(head.header("authorization"), None);
    }

    #[test]
    fn test_path_segment() {
        let req = request("/accounts/42/orders");
        let head = RequestHead::from_request(&req);

        assert_eq!(head.path_segment(0), Some("accounts"));
        assert_eq!(head.path_segment(1), Some("42"));
        assert_eq!(head.path_segment(3), None);
    }
}
