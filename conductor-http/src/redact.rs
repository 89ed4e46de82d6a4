use url::Url;

/// Query parameter name fragments whose values never reach the logs.
const SENSITIVE_PARAMS: [&str; 8] = [
    "api_key",
    "apikey",
    "token",
    "password",
    "auth",
    "secret",
    "key",
    "credential",
];

const REDACTED: &str = "[REDACTED]";

/// Replace the values of sensitive query parameters with `[REDACTED]`.
///
/// Matching is by case-insensitive substring on the parameter name, so
/// `X-Api-Key`, `session_token`, and `authKey` are all caught. URLs that
/// fail to parse are passed through untouched rather than dropped from the
/// log line.
pub fn sanitize_url(raw: &str) -> String {
    let mut url = match Url::parse(raw) {
        Ok(url) => url,
        Err(_) => return raw.to_owned(),
    };
    if url.query().is_none() {
        return url.to_string();
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let lowered = k.to_lowercase();
            if SENSITIVE_PARAMS.iter().any(|p| lowered.contains(p)) {
                (k.into_owned(), REDACTED.to_owned())
            } else {
                (k.into_owned(), v.into_owned())
            }
        })
        .collect();

    url.query_pairs_mut().clear().extend_pairs(pairs);
    url.to_string()
}
