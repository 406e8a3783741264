//! Target URL normalization and the domain tag used in output file names.

use url::Url;

/// Prefix `https://` onto entries that carry no scheme.
pub fn normalize_target(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    }
}

/// Filesystem-safe domain tag: lowercase host with a leading `www.` stripped
/// and `:port` rendered as `_port`.
///
/// Input that does not parse as a URL falls back to a sanitized version of the
/// raw string so a report can still be named.
pub fn extract_domain(url: &str) -> String {
    let normalized = normalize_target(url);
    let Ok(parsed) = Url::parse(&normalized) else {
        return sanitize(url);
    };
    let Some(host) = parsed.host_str().map(str::to_lowercase) else {
        return sanitize(url);
    };
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    match explicit_port(&normalized) {
        Some(port) => format!("{host}_{port}"),
        None => host,
    }
}

/// Port as written in the authority. `Url::port` hides default ports, which
/// would drop an explicit `:443` from the tag.
fn explicit_port(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);
    let after_host = match host_port.rfind(']') {
        Some(end) => &host_port[end + 1..],
        None => host_port,
    };
    let (_, port) = after_host.rsplit_once(':')?;
    (!port.is_empty() && port.bytes().all(|b| b.is_ascii_digit())).then_some(port)
}

fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_matches('_').to_string();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_target_adds_scheme() {
        assert_eq!(normalize_target("example.com"), "https://example.com");
        assert_eq!(normalize_target(" http://a.test "), "http://a.test");
        assert_eq!(normalize_target("https://a.test/x"), "https://a.test/x");
    }

    #[test]
    fn test_extract_domain_strips_www_and_keeps_port() {
        assert_eq!(extract_domain("https://www.Example.com:8080/x"), "example.com_8080");
        assert_eq!(extract_domain("https://shop.example.com/"), "shop.example.com");
        assert_eq!(extract_domain("example.com"), "example.com");
    }

    #[test]
    fn test_extract_domain_keeps_explicit_default_port() {
        assert_eq!(extract_domain("https://example.com:443/"), "example.com_443");
        assert_eq!(extract_domain("http://www.example.com:80"), "example.com_80");
        assert_eq!(extract_domain("https://user:pw@example.com/a:b"), "example.com");
        assert_eq!(extract_domain("https://example.com?next=a:1"), "example.com");
    }

    #[test]
    fn test_extract_domain_fallback() {
        assert_eq!(extract_domain("https://"), "https");
        assert_eq!(extract_domain("   "), "unknown");
    }
}
