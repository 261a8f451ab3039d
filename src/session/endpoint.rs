//! Streaming endpoint derivation.

use url::Url;

/// Path of the interactive execution endpoint on the service.
pub const SESSION_PATH: &str = "/compile/ws";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// The base URL could not be parsed.
    InvalidUrl { url: String, reason: String },
    /// The base URL has no host to connect to.
    MissingHost { url: String },
}

impl std::fmt::Display for EndpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUrl { url, reason } => write!(f, "invalid service URL '{}': {}", url, reason),
            Self::MissingHost { url } => write!(f, "service URL '{}' has no host", url),
        }
    }
}

impl std::error::Error for EndpointError {}

/// Derives the streaming endpoint from a base service URL.
///
/// `https` (and `wss`) map to `wss`, every other scheme to `ws`. The host and
/// any explicit port are kept; path, query and fragment are replaced by
/// [`SESSION_PATH`].
pub fn session_endpoint(base: &str) -> Result<Url, EndpointError> {
    let parsed = Url::parse(base).map_err(|e| EndpointError::InvalidUrl {
        url: base.to_string(),
        reason: e.to_string(),
    })?;

    let host = parsed.host_str().ok_or_else(|| EndpointError::MissingHost {
        url: base.to_string(),
    })?;

    let scheme = match parsed.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };

    let authority = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let endpoint = format!("{}://{}{}", scheme, authority, SESSION_PATH);
    Url::parse(&endpoint).map_err(|e| EndpointError::InvalidUrl {
        url: endpoint,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_maps_to_wss() {
        let url = session_endpoint("https://play.example.com").unwrap();
        assert_eq!(url.as_str(), "wss://play.example.com/compile/ws");
    }

    #[test]
    fn test_http_maps_to_ws_and_keeps_port() {
        let url = session_endpoint("http://localhost:3000").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:3000/compile/ws");
    }

    #[test]
    fn test_path_query_and_fragment_are_replaced() {
        let url = session_endpoint("https://example.com:8443/api/v1?x=1#top").unwrap();
        assert_eq!(url.as_str(), "wss://example.com:8443/compile/ws");
    }

    #[test]
    fn test_streaming_schemes_are_accepted() {
        assert_eq!(
            session_endpoint("ws://127.0.0.1:9000").unwrap().as_str(),
            "ws://127.0.0.1:9000/compile/ws"
        );
        assert_eq!(
            session_endpoint("wss://example.com").unwrap().as_str(),
            "wss://example.com/compile/ws"
        );
    }

    #[test]
    fn test_ipv6_host() {
        let url = session_endpoint("http://[::1]:3000").unwrap();
        assert_eq!(url.as_str(), "ws://[::1]:3000/compile/ws");
    }

    #[test]
    fn test_invalid_url() {
        let err = session_endpoint("not a url").unwrap_err();
        assert!(matches!(err, EndpointError::InvalidUrl { .. }));
        assert!(err.to_string().contains("not a url"));
    }

    #[test]
    fn test_url_without_host() {
        let err = session_endpoint("mailto:someone@example.com").unwrap_err();
        assert!(matches!(err, EndpointError::MissingHost { .. }));
    }
}
