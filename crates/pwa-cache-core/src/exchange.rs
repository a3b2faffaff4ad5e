//! Request and response capabilities
//!
//! The engine only ever reads intercepted traffic through these two traits.
//! A host adapter that produces `http::Request<Bytes>` and
//! `http::Response<Bytes>` gets them for free.

use bytes::Bytes;
use http::{Method, Request, Response};

/// What the engine needs from an intercepted request
pub trait RequestInfo {
    /// Identity the request is cached under
    fn identity(&self) -> String;

    /// Whether a response to this request may be stored
    fn is_cacheable_method(&self) -> bool;

    /// Owned copy that can outlive the caller
    fn snapshot(&self) -> Request<Bytes>;
}

/// What the engine needs from a response
pub trait ResponseInfo {
    fn status_code(&self) -> u16;

    /// Header value by case-insensitive name, if it is valid text
    fn header(&self, name: &str) -> Option<&str>;

    /// Owned copy sharing the body buffer
    fn snapshot(&self) -> Response<Bytes>;

    /// Only plain 200 responses are written to the runtime partition
    fn is_storable(&self) -> bool {
        self.status_code() == 200
    }
}

impl RequestInfo for Request<Bytes> {
    fn identity(&self) -> String {
        self.uri().to_string()
    }

    fn is_cacheable_method(&self) -> bool {
        self.method() == Method::GET
    }

    fn snapshot(&self) -> Request<Bytes> {
        let mut request = Request::new(self.body().clone());
        *request.method_mut() = self.method().clone();
        *request.uri_mut() = self.uri().clone();
        *request.version_mut() = self.version();
        *request.headers_mut() = self.headers().clone();
        request
    }
}

impl ResponseInfo for Response<Bytes> {
    fn status_code(&self) -> u16 {
        self.status().as_u16()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|v| v.to_str().ok())
    }

    fn snapshot(&self) -> Response<Bytes> {
        let mut response = Response::new(self.body().clone());
        *response.status_mut() = self.status();
        *response.version_mut() = self.version();
        *response.headers_mut() = self.headers().clone();
        response
    }
}
