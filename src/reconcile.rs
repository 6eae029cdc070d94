//! Diffing scraped candidates against the ids already in the record store.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::config;
use crate::types::{CandidateRecord, NewRecord, StoredRow};

static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("static regex"));

/// Canonical digit-only form of an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalId {
    pub value: String,
    /// Resolved by pulling the first digit run out of non-numeric text.
    pub via_fallback: bool,
}

/// Normalises `3615`, `3615.0`, `3,615` and `id=3615text` to `3615`.
///
/// Numeric parsing is tried first (thousands separators stripped, fractions
/// truncated); only when the text is not a number is the first digit run
/// taken, and the result is marked `via_fallback`. Text without digits has no
/// canonical form.
pub fn canonicalize(raw: &str) -> Option<CanonicalId> {
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }

    if cleaned.bytes().all(|b| b.is_ascii_digit()) {
        return Some(CanonicalId {
            value: strip_leading_zeros(&cleaned).to_string(),
            via_fallback: false,
        });
    }

    if let Some(value) = numeric_value(&cleaned) {
        return Some(CanonicalId {
            value,
            via_fallback: false,
        });
    }

    let digits = DIGIT_RUN.find(&cleaned)?.as_str();
    Some(CanonicalId {
        value: strip_leading_zeros(digits).to_string(),
        via_fallback: true,
    })
}

/// Integer part of a non-negative number as a digit string. Values past
/// u64 keep every digit of their truncated float.
fn numeric_value(s: &str) -> Option<String> {
    if let Ok(n) = s.parse::<u64>() {
        return Some(n.to_string());
    }
    let f = s.parse::<f64>().ok()?;
    if !f.is_finite() || f < 0.0 {
        return None;
    }
    // 2^64
    if f < 18_446_744_073_709_551_616.0 {
        Some((f.trunc() as u64).to_string())
    } else {
        Some(format!("{:.0}", f.trunc()))
    }
}

fn strip_leading_zeros(digits: &str) -> &str {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() { "0" } else { trimmed }
}

/// Ordering key: the id as a u64, 0 when it does not fit.
pub fn order_key(canonical: &str) -> u64 {
    canonical.parse().unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdOrder {
    Ascending,
    Descending,
}

// -------------------------
// Known set
// -------------------------

/// Canonical ids already persisted, plus those accepted during this run.
#[derive(Debug, Default, Clone)]
pub struct KnownIds {
    ids: HashSet<String>,
}

impl KnownIds {
    /// Builds the set from a store snapshot, canonicalising whatever text the
    /// store hands back for the id column.
    pub fn from_rows(rows: &[StoredRow]) -> Self {
        let mut known = Self::default();
        let mut fallback = 0usize;
        for row in rows {
            if let Some(id) = canonicalize(&row.identifier) {
                fallback += usize::from(id.via_fallback);
                known.ids.insert(id.value);
            }
        }
        if fallback > 0 {
            tracing::warn!(count = fallback, "stored ids needed digit-run extraction");
        }
        tracing::info!(rows = rows.len(), unique = known.len(), "loaded known ids");
        known
    }

    pub fn contains(&self, canonical: &str) -> bool {
        self.ids.contains(canonical)
    }

    /// Returns false if the id was already known.
    pub fn insert(&mut self, canonical: String) -> bool {
        self.ids.insert(canonical)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for KnownIds {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}

// -------------------------
// Reconciliation
// -------------------------

/// An accepted record whose id only resolved through digit-run extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewItem {
    pub raw: String,
    pub canonical: String,
}

#[derive(Debug, Default)]
pub struct Reconciliation {
    pub new_records: Vec<NewRecord>,
    pub needs_review: Vec<ReviewItem>,
    /// Candidates whose id had no digits at all.
    pub unusable: usize,
    /// Candidates rejected as already known or repeated within the batch.
    pub duplicates: usize,
}

/// Computes the records to persist and marks them known in `known`.
///
/// First occurrence of a canonical id wins; the output is sorted by numeric
/// id in `order`, ties keeping discovery order.
pub fn reconcile(
    candidates: Vec<CandidateRecord>,
    known: &mut KnownIds,
    detail_template: &str,
    order: IdOrder,
) -> Reconciliation {
    let mut out = Reconciliation::default();

    for candidate in candidates {
        let Some(id) = canonicalize(&candidate.identifier) else {
            tracing::warn!(raw = %candidate.identifier, "dropping candidate without a numeric id");
            out.unusable += 1;
            continue;
        };

        if !known.insert(id.value.clone()) {
            out.duplicates += 1;
            continue;
        }

        if id.via_fallback {
            tracing::warn!(
                raw = %candidate.identifier,
                canonical = %id.value,
                "id extracted from free text, flagged for manual review"
            );
            out.needs_review.push(ReviewItem {
                raw: candidate.identifier.clone(),
                canonical: id.value.clone(),
            });
        }

        out.new_records.push(NewRecord {
            detail_link: config::detail_link(detail_template, &id.value),
            identifier: id.value,
            display_url: candidate.display_url,
        });
    }

    match order {
        IdOrder::Ascending => out.new_records.sort_by_key(|r| order_key(&r.identifier)),
        IdOrder::Descending => out
            .new_records
            .sort_by_key(|r| Reverse(order_key(&r.identifier))),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL: &str = "https://admin.example/site?site_id={id}";

    fn ids(records: &[NewRecord]) -> Vec<&str> {
        records.iter().map(|r| r.identifier.as_str()).collect()
    }

    #[test]
    fn encodings_collapse_to_one_id() {
        for raw in ["3615", "3615.0", "3,615", "id=3615text", " 3615 ", "003615"] {
            assert_eq!(canonicalize(raw).unwrap().value, "3615", "input {raw:?}");
        }
    }

    #[test]
    fn canonical_form_is_a_fixed_point() {
        for raw in ["3615", "3615.9", "1,234,567", "site-42-b", "0", "7e2"] {
            let once = canonicalize(raw).unwrap();
            let twice = canonicalize(&once.value).unwrap();
            assert_eq!(once.value, twice.value);
            assert!(!twice.via_fallback);
        }
    }

    #[test]
    fn fallback_is_marked_and_numbers_are_not() {
        assert!(!canonicalize("3615.0").unwrap().via_fallback);
        assert!(!canonicalize("1e3").unwrap().via_fallback);
        assert_eq!(canonicalize("1e3").unwrap().value, "1000");

        let fb = canonicalize("https://x.example/site/77?ref=3").unwrap();
        assert!(fb.via_fallback);
        assert_eq!(fb.value, "77");

        let negative = canonicalize("-12").unwrap();
        assert!(negative.via_fallback);
        assert_eq!(negative.value, "12");
    }

    #[test]
    fn no_digits_no_id() {
        assert_eq!(canonicalize(""), None);
        assert_eq!(canonicalize("  "), None);
        assert_eq!(canonicalize("n/a"), None);
        assert_eq!(canonicalize("NaN"), None);
        assert_eq!(canonicalize("inf"), None);
    }

    #[test]
    fn huge_ids_survive_and_order_as_zero() {
        let huge = "123456789012345678901234567890";
        let id = canonicalize(huge).unwrap();
        assert_eq!(id.value, huge);
        assert_eq!(order_key(&id.value), 0);
    }

    #[test]
    fn exponent_notation_past_u64_keeps_its_magnitude() {
        let id = canonicalize("1e30").unwrap();
        assert!(!id.via_fallback);
        assert_eq!(id.value.len(), 31);
        assert!(id.value.starts_with('1') && id.value.bytes().all(|b| b.is_ascii_digit()));
        assert_eq!(order_key(&id.value), 0);
        assert_eq!(canonicalize("1.5E+25").unwrap().value.len(), 26);

        let mut known: KnownIds = ["1"].into_iter().collect();
        let out = reconcile(
            vec![CandidateRecord::new("1e30", "big.example")],
            &mut known,
            DETAIL,
            IdOrder::Ascending,
        );
        assert_eq!(out.new_records.len(), 1);
        assert_eq!(out.duplicates, 0);
        assert_eq!(out.new_records[0].identifier, id.value);
    }

    #[test]
    fn known_duplicate_and_alternate_encoding_are_rejected() {
        let mut known: KnownIds = ["100", "101"].into_iter().collect();
        let out = reconcile(
            vec![
                CandidateRecord::new("100", "u1"),
                CandidateRecord::new("102", "u2"),
                CandidateRecord::new("102.0", "u2"),
            ],
            &mut known,
            DETAIL,
            IdOrder::Ascending,
        );
        assert_eq!(
            out.new_records,
            vec![NewRecord {
                identifier: "102".into(),
                display_url: "u2".into(),
                detail_link: "https://admin.example/site?site_id=102".into(),
            }]
        );
        assert_eq!(out.duplicates, 2);
        assert!(known.contains("102"));
    }

    #[test]
    fn second_pass_over_same_batch_is_empty() {
        let batch = vec![
            CandidateRecord::new("5", "a"),
            CandidateRecord::new("9", "b"),
            CandidateRecord::new("5.0", "c"),
        ];
        let mut known = KnownIds::default();
        let first = reconcile(batch.clone(), &mut known, DETAIL, IdOrder::Ascending);
        assert_eq!(ids(&first.new_records), vec!["5", "9"]);

        let second = reconcile(batch, &mut known, DETAIL, IdOrder::Ascending);
        assert!(second.new_records.is_empty());
    }

    #[test]
    fn first_occurrence_wins() {
        let mut known = KnownIds::default();
        let out = reconcile(
            vec![
                CandidateRecord::new("3,615", "first.example"),
                CandidateRecord::new("3615", "second.example"),
            ],
            &mut known,
            DETAIL,
            IdOrder::Ascending,
        );
        assert_eq!(out.new_records.len(), 1);
        assert_eq!(out.new_records[0].display_url, "first.example");
    }

    #[test]
    fn order_follows_the_requested_direction() {
        let batch = || {
            vec![
                CandidateRecord::new("20", "b"),
                CandidateRecord::new("3", "a"),
                CandidateRecord::new("100", "c"),
            ]
        };
        let asc = reconcile(batch(), &mut KnownIds::default(), DETAIL, IdOrder::Ascending);
        assert_eq!(ids(&asc.new_records), vec!["3", "20", "100"]);

        let desc = reconcile(batch(), &mut KnownIds::default(), DETAIL, IdOrder::Descending);
        assert_eq!(ids(&desc.new_records), vec!["100", "20", "3"]);
    }

    #[test]
    fn unusable_ids_are_dropped_and_fallback_ids_flagged() {
        let mut known = KnownIds::default();
        let out = reconcile(
            vec![
                CandidateRecord::new("—", "nothing.example"),
                CandidateRecord::new("site #88", "eighty-eight.example"),
            ],
            &mut known,
            DETAIL,
            IdOrder::Ascending,
        );
        assert_eq!(out.unusable, 1);
        assert_eq!(ids(&out.new_records), vec!["88"]);
        assert_eq!(
            out.needs_review,
            vec![ReviewItem {
                raw: "site #88".into(),
                canonical: "88".into(),
            }]
        );
    }

    #[test]
    fn snapshot_load_canonicalises_stored_ids() {
        let rows = vec![
            StoredRow::from_cells(&["3615.0", "a"]),
            StoredRow::from_cells(&["3,616", "b"]),
            StoredRow::from_cells(&["", "c"]),
            StoredRow::from_cells(&["3615", "d"]),
        ];
        let known = KnownIds::from_rows(&rows);
        assert_eq!(known.len(), 2);
        assert!(known.contains("3615"));
        assert!(known.contains("3616"));
    }
}
