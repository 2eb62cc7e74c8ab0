//! Cache keys.
//!
//! Every person lives under `person:<id>`. Keys can only be built through
//! [`CacheKey::person`], so the namespace prefix is never forgotten.

const PERSON_PREFIX: &str = "person:";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    inner: String,
}

impl CacheKey {
    /// Key for the person with the given id.
    pub fn person(id: &str) -> Self {
        let mut inner = String::with_capacity(PERSON_PREFIX.len() + id.len());
        inner.push_str(PERSON_PREFIX);
        inner.push_str(id);
        Self { inner }
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Encoded form for byte-keyed backends.
    pub fn encode(&self) -> &[u8] {
        self.inner.as_bytes()
    }

    /// Parse an encoded key. Returns `None` for bytes outside the person
    /// namespace or that are not UTF-8.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let s = std::str::from_utf8(bytes).ok()?;
        s.strip_prefix(PERSON_PREFIX)?;
        Some(Self {
            inner: s.to_string(),
        })
    }

    /// The person id this key addresses.
    pub fn person_id(&self) -> &str {
        &self.inner[PERSON_PREFIX.len()..]
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_key_format() {
        let key = CacheKey::person("abc");
        assert_eq!(key.as_str(), "person:abc");
        assert_eq!(key.person_id(), "abc");
        assert_eq!(key.to_string(), "person:abc");
    }

    #[test]
    fn test_decode_roundtrip() {
        let key = CacheKey::person("0190b5c8-0000-7000-8000-000000000001");
        assert_eq!(CacheKey::decode(key.encode()), Some(key));
    }

    #[test]
    fn test_decode_rejects_foreign_keys() {
        assert!(CacheKey::decode(b"session:abc").is_none());
        assert!(CacheKey::decode(&[0xff, 0xfe]).is_none());
    }
}
