//! Caller identity for rate limiting.
//!
//! The identity is a short, stable partition key derived from the client
//! IP. It is a checksum, not a credential: anyone who can set the headers
//! can choose their key.

use reqwest::header::HeaderMap;

/// Identity used when no IP header is present.
pub const ANONYMOUS: &str = "anonymous";

/// IP headers in order of trust.
const IP_HEADERS: [&str; 3] = ["cf-connecting-ip", "x-forwarded-for", "x-real-ip"];

/// Resolve the rate limit identity for a request.
#[must_use]
pub fn resolve_identity(headers: &HeaderMap) -> String {
    client_ip(headers).map_or_else(|| ANONYMOUS.to_string(), |ip| identity_hash(&ip))
}

/// Extract the client IP from request headers.
///
/// `x-forwarded-for` may hold a chain of proxies; the first entry is the
/// client.
#[must_use]
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    IP_HEADERS.iter().find_map(|name| {
        let value = headers.get(*name)?.to_str().ok()?;
        let ip = value.split(',').next()?.trim();
        (!ip.is_empty()).then(|| ip.to_string())
    })
}

/// Hash a string to a base-36 key.
///
/// `h = h * 31 + unit` over UTF-16 code units with 32-bit wrapping, then
/// the absolute value.
#[must_use]
pub fn identity_hash(input: &str) -> String {
    let hash = input.encode_utf16().fold(0i32, |h, unit| {
        h.wrapping_shl(5)
            .wrapping_sub(h)
            .wrapping_add(i32::from(unit))
    });
    to_base36(hash.unsigned_abs())
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if n == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(identity_hash("1.2.3.4"), identity_hash("1.2.3.4"));
        assert_ne!(identity_hash("1.2.3.4"), identity_hash("5.6.7.8"));
    }

    #[test]
    fn test_hash_known_values() {
        assert_eq!(identity_hash(""), "0");
        // 'a' = 97 = 2p in base 36
        assert_eq!(identity_hash("a"), "2p");
        // 97 * 31 + 98 = 3105
        assert_eq!(identity_hash("ab"), "2e9");
    }

    #[test]
    fn test_header_preference() {
        let map = headers(&[
            ("x-real-ip", "9.9.9.9"),
            ("x-forwarded-for", "5.6.7.8, 10.0.0.1"),
            ("cf-connecting-ip", "1.2.3.4"),
        ]);
        assert_eq!(client_ip(&map).as_deref(), Some("1.2.3.4"));

        let map = headers(&[
            ("x-real-ip", "9.9.9.9"),
            ("x-forwarded-for", " 5.6.7.8 , 10.0.0.1"),
        ]);
        assert_eq!(client_ip(&map).as_deref(), Some("5.6.7.8"));

        let map = headers(&[("x-real-ip", "9.9.9.9")]);
        assert_eq!(resolve_identity(&map), identity_hash("9.9.9.9"));
    }

    #[test]
    fn test_missing_headers_are_anonymous() {
        assert_eq!(resolve_identity(&HeaderMap::new()), ANONYMOUS);
    }
}
