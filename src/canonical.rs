use url::Url;

/// Normalize a URL into the identity form used for Frontier dedup and the
/// store's Page uniqueness constraint.
///
/// Lowercases scheme and host, strips the fragment, strips a trailing slash
/// from a non-root path. Query strings are left exactly as given — no
/// reordering, no percent-decoding — since either could change what the
/// origin server returns.
pub fn canonicalize(url: &Url) -> Url {
    let mut out = url.clone();

    let _ = out.set_scheme(&url.scheme().to_lowercase());
    if let Some(host) = out.host_str() {
        let lower = host.to_lowercase();
        let _ = out.set_host(Some(&lower));
    }
    out.set_fragment(None);

    let path = out.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        out.set_path(path.trim_end_matches('/'));
    }

    out
}

pub fn canonicalize_str(raw: &str) -> Result<Url, url::ParseError> {
    let parsed = Url::parse(raw)?;
    Ok(canonicalize(&parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fragment_and_trailing_slash() {
        let u = Url::parse("HTTPS://Example.COM/about/#section").unwrap();
        let c = canonicalize(&u);
        assert_eq!(c.as_str(), "https://example.com/about");
    }

    #[test]
    fn root_path_trailing_slash_preserved() {
        let u = Url::parse("https://example.com/").unwrap();
        let c = canonicalize(&u);
        assert_eq!(c.as_str(), "https://example.com/");
    }

    #[test]
    fn query_params_not_reordered() {
        let u = Url::parse("https://example.com/search?b=2&a=1").unwrap();
        let c = canonicalize(&u);
        assert_eq!(c.query(), Some("b=2&a=1"));
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let u = Url::parse("https://Example.com/a/b/").unwrap();
        let once = canonicalize(&u);
        let twice = canonicalize(&once);
        assert_eq!(once, twice);
    }
}
