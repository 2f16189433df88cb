//! Fuzzy lookup against the persisted store.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::model::AddressRecord;
use super::store::read_records;
use crate::Result;

/// Runs of anything outside ASCII `[0-9A-Za-z_]`.
static SEPARATORS: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"[^0-9A-Za-z_]+").expect("separator pattern is valid")
});

/// Splits a query into lowercase search terms.
///
/// Terms are separated by runs of non-word characters, where only ASCII
/// letters, digits and `_` count as word characters (`Müller` yields `m`
/// and `ller`). Empty terms are dropped.
#[must_use]
pub fn tokenize(query: &str) -> Vec<String> {
    SEPARATORS
        .split(&query.to_lowercase())
        .filter(|term| !term.is_empty())
        .map(str::to_string)
        .collect()
}

/// Checks whether a record satisfies every search term.
///
/// A term matches when it is contained in the name, in the local part of the
/// email, or in the domain at a label boundary (`com` and `example.com`
/// match `example.com`, `ample` does not). Ignored records never match.
#[must_use]
pub fn is_match(record: &AddressRecord, terms: &[String]) -> bool {
    if record.ignore {
        return false;
    }

    let name = record.name.to_lowercase();
    let email = record.email.to_lowercase();
    let (local, domain) = email.split_once('@').unwrap_or((email.as_str(), ""));
    let domain = format!(".{domain}");

    terms.iter().all(|term| {
        name.contains(term.as_str())
            || local.contains(term.as_str())
            || domain.contains(&format!(".{term}"))
    })
}

/// Scans the store at `path` for records matching `query`.
///
/// Reads the file from scratch on every call and never consults an in-memory
/// book. Stops after `max_results` matches; results come back in file order.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or contains a malformed row.
pub fn find_matches(
    query: &str,
    path: impl AsRef<Path>,
    max_results: usize,
) -> Result<Vec<AddressRecord>> {
    if max_results == 0 {
        return Ok(Vec::new());
    }

    let terms = tokenize(query);
    let file = File::open(path.as_ref())?;
    let mut matches = Vec::with_capacity(max_results);

    for record in read_records(BufReader::new(file)) {
        let record = record?;
        if is_match(&record, &terms) {
            matches.push(record);
            if matches.len() == max_results {
                break;
            }
        }
    }

    tracing::debug!(
        query,
        path = %path.as_ref().display(),
        found = matches.len(),
        "lookup finished"
    );
    Ok(matches)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    fn record(email: &str, name: &str) -> AddressRecord {
        AddressRecord::from_sighting(email, name, DateTime::<Utc>::UNIX_EPOCH)
    }

    fn terms(query: &str) -> Vec<String> {
        tokenize(query)
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Jane  Doe"), vec!["jane", "doe"]);
        assert_eq!(tokenize("  example.com "), vec!["example", "com"]);
        assert_eq!(tokenize("o'brien"), vec!["o", "brien"]);
        assert!(tokenize("--").is_empty());
    }

    #[test]
    fn test_tokenize_splits_on_non_ascii() {
        assert_eq!(tokenize("Müller"), vec!["m", "ller"]);
        assert_eq!(tokenize("José_2"), vec!["jos", "_2"]);
        assert!(is_match(&record("hm@x.de", "Hans Müller"), &terms("Müller")));
    }

    #[test]
    fn test_match_name_and_local_part() {
        let rec = record("jdoe@example.com", "Jane Doe");
        assert!(is_match(&rec, &terms("jane")));
        assert!(is_match(&rec, &terms("DOE")));
        assert!(is_match(&rec, &terms("jdo")));
        assert!(!is_match(&rec, &terms("john")));
    }

    #[test]
    fn test_domain_matches_on_label_boundary() {
        let rec = record("x@example.com", "");
        assert!(is_match(&rec, &terms("com")));
        assert!(is_match(&rec, &terms("exam")));
        assert!(!is_match(&rec, &terms("ample")));
    }

    #[test]
    fn test_every_term_must_match() {
        let rec = record("jdoe@example.com", "Jane Doe");
        assert!(is_match(&rec, &terms("jane example")));
        assert!(!is_match(&rec, &terms("jane other")));
    }

    #[test]
    fn test_ignored_never_matches() {
        let mut rec = record("jdoe@example.com", "Jane Doe");
        rec.ignore = true;
        assert!(!is_match(&rec, &terms("jane")));
    }

    #[test]
    fn test_empty_query_matches_everything_not_ignored() {
        let rec = record("jdoe@example.com", "Jane Doe");
        assert!(is_match(&rec, &terms("")));
    }

    fn acme_store() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("addresses.csv");
        std::fs::write(
            &path,
            concat!(
                "alice@acme.com,Alice,2024-03-01T12:00:00Z,\n",
                "bob@other.com,Bob,2024-02-01T12:00:00Z,\n",
                "carol@sub.acme.com,Carol,2024-01-01T12:00:00Z,\n",
                "acme@acme.com,Acme Sales,2023-01-01T12:00:00Z,IGNORE\n",
            ),
        )
        .unwrap();
        (dir, path)
    }

    fn emails(records: &[AddressRecord]) -> Vec<&str> {
        records.iter().map(|r| r.email.as_str()).collect()
    }

    #[test]
    fn test_find_matches_domain_query() {
        let (_dir, path) = acme_store();
        let found = find_matches("acme", &path, 20).unwrap();
        assert_eq!(emails(&found), vec!["alice@acme.com", "carol@sub.acme.com"]);
    }

    #[test]
    fn test_find_matches_stops_at_limit() {
        let (_dir, path) = acme_store();
        let found = find_matches("acme", &path, 1).unwrap();
        assert_eq!(emails(&found), vec!["alice@acme.com"]);
    }

    #[test]
    fn test_find_matches_zero_limit_is_empty() {
        let (dir, path) = acme_store();
        assert!(find_matches("acme", &path, 0).unwrap().is_empty());
        // The file is not even opened.
        assert!(find_matches("acme", dir.path().join("missing.csv"), 0)
            .unwrap()
            .is_empty());
    }
}
