use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a token string.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare a presented bearer token against the configured one.
///
/// Both sides are hashed first so the comparison always runs over
/// equal-length digests, and the byte loop does not exit early.
pub fn token_matches(presented: &str, expected: &str) -> bool {
    let presented = hash_token(presented);
    let expected = hash_token(expected);
    presented
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn parse_bearer(header: &str) -> Result<&str, &'static str> {
    let mut parts = header.splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err("Invalid authorization scheme");
    }
    if token.is_empty() {
        return Err("Missing access token");
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_token_is_stable_hex() {
        let digest = hash_token("secret");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hash_token("secret"));
    }

    #[test]
    fn token_matches_only_identical_tokens() {
        assert!(token_matches("s3cr3t", "s3cr3t"));
        assert!(!token_matches("s3cr3t", "s3cr3t "));
        assert!(!token_matches("", "s3cr3t"));
    }

    #[test]
    fn parse_bearer_requires_scheme_and_token() {
        assert_eq!(parse_bearer("Bearer abc"), Ok("abc"));
        assert_eq!(parse_bearer("bearer   abc  "), Ok("abc"));
        assert_eq!(parse_bearer("Basic abc"), Err("Invalid authorization scheme"));
        assert_eq!(parse_bearer("Bearer "), Err("Missing access token"));
    }
}
