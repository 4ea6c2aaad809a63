use axum::http::{HeaderMap, Method, header::ACCEPT};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not intercepted: the request goes straight to the network and never
    /// touches the cache.
    PassThrough,
    /// Network first, cache as fallback. `store` is set when a successful
    /// response may be written back to the cache.
    NetworkFirst { store: bool },
}

/// What to serve when the network failed and the cache has no entry for the
/// request URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    OfflinePage,
    Unavailable,
}

pub fn route(url: &str, method: &Method, backend_hosts: &[String]) -> Route {
    let Ok(parsed) = Url::parse(url) else {
        return Route::PassThrough;
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return Route::PassThrough;
    }

    let is_backend = parsed
        .host_str()
        .is_some_and(|host| {
            backend_hosts
                .iter()
                .any(|backend| backend.eq_ignore_ascii_case(host))
        });
    if is_backend {
        return Route::PassThrough;
    }

    Route::NetworkFirst {
        store: *method == Method::GET,
    }
}

pub fn miss_fallback(headers: &HeaderMap) -> Fallback {
    if accepts_html(headers) {
        Fallback::OfflinePage
    } else {
        Fallback::Unavailable
    }
}

pub fn accepts_html(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains("text/html"))
}
