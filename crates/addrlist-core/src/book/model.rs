//! Address record model.

use chrono::{DateTime, Utc};

/// Marker written in the fourth store column for ignored records.
pub const IGNORE_MARKER: &str = "IGNORE";

/// Normalized (lowercased) email address identifying one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddressKey(String);

impl AddressKey {
    /// Normalizes an email address into a key.
    #[must_use]
    pub fn new(email: &str) -> Self {
        Self(email.to_lowercase())
    }

    /// Returns the normalized email.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AddressKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One contact in the address book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    /// Email address, lowercase.
    pub email: String,
    /// Display name (may be empty).
    pub name: String,
    /// When the address was last seen.
    pub last_used: DateTime<Utc>,
    /// Hidden from lookups.
    pub ignore: bool,
}

impl AddressRecord {
    /// Builds a record from a raw sighting, applying the normalization rules.
    ///
    /// The email is lowercased, and a name that only repeats the address is
    /// dropped.
    #[must_use]
    pub fn from_sighting(email: &str, name: &str, last_used: DateTime<Utc>) -> Self {
        let email = email.to_lowercase();
        let name = if name.to_lowercase() == email {
            String::new()
        } else {
            name.to_string()
        };
        Self {
            email,
            name,
            last_used,
            ignore: false,
        }
    }

    /// Returns the key for this record.
    #[must_use]
    pub fn key(&self) -> AddressKey {
        AddressKey::new(&self.email)
    }

    /// Returns the store representation of the ignore flag.
    #[must_use]
    pub const fn ignore_marker(&self) -> &'static str {
        if self.ignore { IGNORE_MARKER } else { "" }
    }

    /// Returns the part of the email before `@` and the part after it.
    ///
    /// An address without `@` has an empty domain.
    #[must_use]
    pub fn split_email(&self) -> (&str, &str) {
        self.email
            .split_once('@')
            .unwrap_or((self.email.as_str(), ""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    #[test]
    fn test_from_sighting_lowercases_email() {
        let record = AddressRecord::from_sighting("Alice@Example.COM", "Alice", epoch());
        assert_eq!(record.email, "alice@example.com");
        assert_eq!(record.name, "Alice");
        assert!(!record.ignore);
    }

    #[test]
    fn test_from_sighting_drops_name_equal_to_email() {
        let record =
            AddressRecord::from_sighting("alice@example.com", "ALICE@example.com", epoch());
        assert_eq!(record.name, "");
    }

    #[test]
    fn test_split_email() {
        let record = AddressRecord::from_sighting("bob@mail.example.org", "", epoch());
        assert_eq!(record.split_email(), ("bob", "mail.example.org"));

        let local = AddressRecord::from_sighting("postmaster", "", epoch());
        assert_eq!(local.split_email(), ("postmaster", ""));
    }

    #[test]
    fn test_ignore_marker() {
        let mut record = AddressRecord::from_sighting("a@b.c", "", epoch());
        assert_eq!(record.ignore_marker(), "");
        record.ignore = true;
        assert_eq!(record.ignore_marker(), IGNORE_MARKER);
    }
}
