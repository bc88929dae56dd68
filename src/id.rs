// Grounded on fuurin's Uuid (include/fuurin/uuid.h): null/random/
// namespace-derived construction, cached text form.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::part::Part;

/// 128-bit identifier, wrapping `uuid::Uuid` with a cached canonical string
/// form so repeated logging/formatting doesn't re-render the hyphenated
/// representation every time.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Id {
    inner: uuid::Uuid,
    text: Arc<str>,
}

impl Id {
    pub fn null() -> Id {
        Id::from(uuid::Uuid::nil())
    }

    pub fn random() -> Id {
        Id::from(uuid::Uuid::new_v4())
    }

    /// Derives a namespace-scoped (v5) identifier, mirroring the RFC4122
    /// namespace constants used to seed broker/worker identities from a
    /// stable name rather than randomness.
    pub fn from_name(namespace: &Id, name: &str) -> Id {
        Id::from(uuid::Uuid::new_v5(&namespace.inner, name.as_bytes()))
    }

    pub fn is_null(&self) -> bool {
        self.inner.is_nil()
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.inner.as_bytes()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn to_part(&self) -> Part {
        Part::from_bytes(self.inner.as_bytes().to_vec())
    }

    pub fn from_part(part: &Part) -> Result<Id> {
        let bytes = part.as_bytes();
        if bytes.len() != 16 {
            return Err(Error::Part(format!(
                "expected 16 bytes for an identifier, got {}",
                bytes.len()
            )));
        }
        let mut buf = [0u8; 16];
        buf.copy_from_slice(bytes);
        Ok(Id::from(uuid::Uuid::from_bytes(buf)))
    }
}

impl From<uuid::Uuid> for Id {
    fn from(inner: uuid::Uuid) -> Id {
        let mut buf = uuid::Uuid::encode_buffer();
        let text = inner.hyphenated().encode_lower(&mut buf).to_string();
        Id {
            inner,
            text: Arc::from(text),
        }
    }
}

impl Default for Id {
    fn default() -> Id {
        Id::null()
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl serde::Serialize for Id {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> serde::Deserialize<'de> for Id {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Id, D::Error> {
        let s = String::deserialize(deserializer)?;
        let inner = uuid::Uuid::parse_str(&s).map_err(serde::de::Error::custom)?;
        Ok(Id::from(inner))
    }
}

pub mod namespace {
    use super::Id;
    use std::sync::OnceLock;

    macro_rules! well_known {
        ($name:ident, $uuid:expr) => {
            pub fn $name() -> Id {
                static CELL: OnceLock<Id> = OnceLock::new();
                CELL.get_or_init(|| Id::from(uuid::uuid!($uuid))).clone()
            }
        };
    }

    well_known!(dns, "6ba7b810-9dad-11d1-80b4-00c04fd430c8");
    well_known!(url, "6ba7b811-9dad-11d1-80b4-00c04fd430c8");
    well_known!(oid, "6ba7b812-9dad-11d1-80b4-00c04fd430c8");
    well_known!(x500, "6ba7b814-9dad-11d1-80b4-00c04fd430c8");
}

/// Generation counter shared between a [`Runner`](crate::runner::Runner) and
/// its [`Session`](crate::session::Session), allocated fresh on every
/// `start()` so stale cross-generation messages can be filtered rather than
/// mis-dispatched.
///
/// Wraps like the id sequence it is derived from: after 255 it rolls back to
/// 1, skipping 0 which is reserved to mean "no generation yet".
#[derive(Debug)]
pub struct TokenSource {
    value: AtomicU8,
}

impl TokenSource {
    pub fn new() -> TokenSource {
        TokenSource {
            value: AtomicU8::new(0),
        }
    }

    /// Allocates and returns the next token, skipping the reserved value 0.
    pub fn next(&self) -> u8 {
        loop {
            let cur = self.value.load(Ordering::SeqCst);
            let next = if cur == 255 { 1 } else { cur + 1 };
            if self
                .value
                .compare_exchange(cur, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return next;
            }
        }
    }

    pub fn current(&self) -> u8 {
        self.value.load(Ordering::SeqCst)
    }
}

impl Default for TokenSource {
    fn default() -> Self {
        TokenSource::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_id_is_recognised() {
        assert!(Id::null().is_null());
        assert!(!Id::random().is_null());
    }

    #[test]
    fn id_part_round_trips() {
        let id = Id::random();
        let part = id.to_part();
        assert_eq!(id, Id::from_part(&part).unwrap());
    }

    #[test]
    fn namespace_derivation_is_stable() {
        let a = Id::from_name(&namespace::dns(), "example.org");
        let b = Id::from_name(&namespace::dns(), "example.org");
        assert_eq!(a, b);
    }

    #[test]
    fn token_source_wraps_after_255_and_skips_zero() {
        let seq = TokenSource::new();
        for expected in 1..=255u8 {
            assert_eq!(expected, seq.next());
        }
        assert_eq!(1, seq.next());
    }
}
