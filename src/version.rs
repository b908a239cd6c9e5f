// src/version.rs

//! RPM version ordering
//!
//! The closure engine never compares versions itself. Index adapters need
//! an ordering to honour `latest_only`, so this implements the comparison
//! rules of `rpmvercmp` over epoch, version and release.

use std::cmp::Ordering;

/// Compare two version (or release) strings using RPM rules
///
/// Strings are split into alternating numeric and alphabetic segments.
/// Numeric segments compare numerically and always sort newer than
/// alphabetic ones; `~` sorts before anything (pre-releases) and `^` sorts
/// after the bare version but before any further segment (snapshots).
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let one = a.as_bytes();
    let two = b.as_bytes();
    let at = |s: &[u8], i: usize| -> u8 { s.get(i).copied().unwrap_or(0) };
    let separator = |c: u8| c != 0 && !c.is_ascii_alphanumeric() && c != b'~' && c != b'^';

    let (mut i, mut j) = (0usize, 0usize);

    while i < one.len() || j < two.len() {
        while separator(at(one, i)) {
            i += 1;
        }
        while separator(at(two, j)) {
            j += 1;
        }

        if at(one, i) == b'~' || at(two, j) == b'~' {
            if at(one, i) != b'~' {
                return Ordering::Greater;
            }
            if at(two, j) != b'~' {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        if at(one, i) == b'^' || at(two, j) == b'^' {
            if i >= one.len() {
                return Ordering::Less;
            }
            if j >= two.len() {
                return Ordering::Greater;
            }
            if at(one, i) != b'^' {
                return Ordering::Greater;
            }
            if at(two, j) != b'^' {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        if i >= one.len() || j >= two.len() {
            break;
        }

        let numeric = one[i].is_ascii_digit();
        let take = |s: &[u8], start: usize| -> usize {
            let mut end = start;
            while end < s.len()
                && if numeric {
                    s[end].is_ascii_digit()
                } else {
                    s[end].is_ascii_alphabetic()
                }
            {
                end += 1;
            }
            end
        };

        let end_one = take(one, i);
        let end_two = take(two, j);
        let seg_one = &one[i..end_one];
        let seg_two = &two[j..end_two];

        // Segments of different types: numeric wins
        if seg_two.is_empty() {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ordering = if numeric {
            let trim = |s: &[u8]| -> usize { s.iter().take_while(|c| **c == b'0').count() };
            let seg_one = &seg_one[trim(seg_one)..];
            let seg_two = &seg_two[trim(seg_two)..];
            seg_one
                .len()
                .cmp(&seg_two.len())
                .then_with(|| seg_one.cmp(seg_two))
        } else {
            seg_one.cmp(seg_two)
        };

        if ordering != Ordering::Equal {
            return ordering;
        }

        i = end_one;
        j = end_two;
    }

    match (i >= one.len(), j >= two.len()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        _ => Ordering::Greater,
    }
}

/// Compare full epoch/version/release triples
pub fn compare_evr(
    (epoch_a, version_a, release_a): (u32, &str, &str),
    (epoch_b, version_b, release_b): (u32, &str, &str),
) -> Ordering {
    epoch_a
        .cmp(&epoch_b)
        .then_with(|| rpmvercmp(version_a, version_b))
        .then_with(|| rpmvercmp(release_a, release_b))
}
