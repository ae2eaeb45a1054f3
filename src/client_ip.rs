use axum::http::HeaderMap;

pub const UNKNOWN_CLIENT: &str = "unknown";

// Checked in order, first usable value wins
const CLIENT_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

// Rate limit key for a request. Clients behind one proxy that sets none of
// these headers all share a key.
pub fn identify(headers: &HeaderMap) -> String {
    CLIENT_HEADERS
        .iter()
        .filter_map(|name| {
            let value = headers.get(*name)?.to_str().ok()?;
            // forwarded-for is a list, the client is the first hop
            let value = if *name == "x-forwarded-for" {
                value.split(',').next().unwrap_or_default()
            } else {
                value
            };
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        })
        .next()
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
