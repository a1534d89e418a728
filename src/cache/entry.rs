//! Cached entry value object.

use std::collections::BTreeSet;
use std::time::Duration;

use bytes::Bytes;
use time::OffsetDateTime;

/// How long a populated entry stays live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Live until explicitly deleted or invalidated.
    Forever,
    For(Duration),
}

impl Ttl {
    pub fn seconds(secs: u64) -> Self {
        Self::For(Duration::from_secs(secs))
    }

    /// A TTL reaching past the representable date range never expires.
    pub fn expiry_from(self, created_at: OffsetDateTime) -> Expiry {
        match self {
            Ttl::Forever => Expiry::Never,
            Ttl::For(ttl) => time::Duration::try_from(ttl)
                .ok()
                .and_then(|ttl| created_at.checked_add(ttl))
                .map_or(Expiry::Never, Expiry::At),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Never,
    At(OffsetDateTime),
}

/// Logical status of an entry at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Live,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub payload: Bytes,
    pub created_at: OffsetDateTime,
    pub expires_at: Expiry,
    pub tags: BTreeSet<String>,
}

impl Entry {
    pub fn new(
        key: impl Into<String>,
        payload: Bytes,
        created_at: OffsetDateTime,
        ttl: Ttl,
        tags: BTreeSet<String>,
    ) -> Self {
        Self {
            key: key.into(),
            payload,
            created_at,
            expires_at: ttl.expiry_from(created_at),
            tags,
        }
    }

    pub fn status_at(&self, now: OffsetDateTime) -> EntryStatus {
        match self.expires_at {
            Expiry::Never => EntryStatus::Live,
            Expiry::At(at) if now < at => EntryStatus::Live,
            Expiry::At(_) => EntryStatus::Expired,
        }
    }

    pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
        self.status_at(now) == EntryStatus::Live
    }

    pub fn is_permanent(&self) -> bool {
        self.expires_at == Expiry::Never
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ttl: Ttl) -> Entry {
        Entry::new(
            "posts",
            Bytes::from_static(b"[]"),
            OffsetDateTime::UNIX_EPOCH,
            ttl,
            BTreeSet::from(["tag_1".to_string()]),
        )
    }

    #[test]
    fn expiry_is_exclusive_at_the_boundary() {
        let entry = entry(Ttl::seconds(60));
        let t0 = OffsetDateTime::UNIX_EPOCH;

        assert!(entry.is_live_at(t0 + Duration::from_secs(59)));
        assert_eq!(
            entry.status_at(t0 + Duration::from_secs(60)),
            EntryStatus::Expired
        );
        assert!(!entry.is_live_at(t0 + Duration::from_secs(61)));
    }

    #[test]
    fn forever_entries_never_expire() {
        let entry = entry(Ttl::Forever);
        assert!(entry.is_permanent());
        assert!(entry.is_live_at(OffsetDateTime::UNIX_EPOCH + Duration::from_secs(10 * 365 * 86_400)));
    }

    #[test]
    fn out_of_range_ttl_never_expires() {
        assert_eq!(
            Ttl::seconds(u64::MAX).expiry_from(OffsetDateTime::UNIX_EPOCH),
            Expiry::Never
        );
        assert_eq!(
            Ttl::For(Duration::MAX).expiry_from(OffsetDateTime::UNIX_EPOCH),
            Expiry::Never
        );
        assert!(entry(Ttl::seconds(u64::MAX)).is_permanent());
    }
}
