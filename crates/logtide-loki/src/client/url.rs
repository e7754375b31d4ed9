//! Endpoint URL construction for the Loki API.

use url::Url;

/// Readiness probe endpoint.
pub const READY_ENDPOINT: &str = "ready";
/// Paginated historical query endpoint.
pub const QUERY_RANGE_ENDPOINT: &str = "loki/api/v1/query_range";
/// Streaming tail endpoint (WebSocket).
pub const TAIL_ENDPOINT: &str = "loki/api/v1/tail";

/// Builds the URL for `endpoint` from the configured base URL and prefix.
///
/// The resulting path is `prefix / base-path / endpoint` with exactly one
/// slash between segments. Query parameters in `params` replace colliding
/// parameters already present on the base URL. The tail endpoint switches the
/// scheme to its WebSocket counterpart (`http` -> `ws`, `https` -> `wss`).
///
/// An unparsable base URL yields the empty string: the config resolver
/// validates the URL up front, so an empty result is a programming error on
/// the caller's side, not a runtime condition.
pub fn build_url(base: &str, prefix: &str, endpoint: &str, params: &[(&str, String)]) -> String {
    let mut url = match Url::parse(base) {
        Ok(url) => url,
        Err(_) => return String::new(),
    };

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .filter(|(k, _)| !params.iter().any(|(name, _)| name == k))
        .collect();
    pairs.extend(params.iter().map(|(k, v)| (k.to_string(), v.clone())));

    let path = join_path(&[prefix, url.path(), endpoint]);
    url.set_path(&path);

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    if endpoint == TAIL_ENDPOINT {
        let ws_scheme = if url.scheme() == "http" { "ws" } else { "wss" };
        if url.set_scheme(ws_scheme).is_err() {
            return String::new();
        }
    }

    url.to_string()
}

/// Joins path segments with single slashes, ignoring empty pieces.
fn join_path(segments: &[&str]) -> String {
    let mut path = String::new();
    for part in segments
        .iter()
        .flat_map(|segment| segment.split('/'))
        .filter(|part| !part.is_empty())
    {
        path.push('/');
        path.push_str(part);
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}
