//! Distance functions. Every function returns a similarity in `[0, 1]`
//! where `1.0` means identical.

use std::collections::{BTreeMap, BTreeSet};

/// Default decay rate for [`spatial_decay`], per pixel.
pub const DEFAULT_LAMBDA: f64 = 0.005;

const WINKLER_PREFIX_MAX: usize = 4;
const WINKLER_SCALING: f64 = 0.1;

/// Exact match. Two empty strings are identical; one empty side never is.
pub fn equality(a: &str, b: &str) -> f64 {
    if a == b {
        1.0
    } else {
        0.0
    }
}

/// Classic edit distance over chars, two-row dynamic programming table.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// `1 - distance / max(len)`.
pub fn normalized_levenshtein(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(a, b) as f64 / longest as f64
}

/// Jaccard index over the character sets of both strings.
pub fn jaccard_chars(a: &str, b: &str) -> f64 {
    let left: BTreeSet<char> = a.chars().collect();
    let right: BTreeSet<char> = b.chars().collect();
    jaccard(&left, &right)
}

pub fn jaro(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let window = (a.len().max(b.len()) / 2).saturating_sub(1);
    let mut a_matched = vec![false; a.len()];
    let mut b_matched = vec![false; b.len()];
    let mut matches = 0usize;
    for (i, ca) in a.iter().enumerate() {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(b.len());
        for j in start..end {
            if !b_matched[j] && *ca == b[j] {
                a_matched[i] = true;
                b_matched[j] = true;
                matches += 1;
                break;
            }
        }
    }
    if matches == 0 {
        return 0.0;
    }
    let left = a.iter().zip(&a_matched).filter(|(_, m)| **m).map(|(c, _)| c);
    let right = b.iter().zip(&b_matched).filter(|(_, m)| **m).map(|(c, _)| c);
    let half_transpositions = left.zip(right).filter(|(x, y)| x != y).count();
    let m = matches as f64;
    let t = half_transpositions as f64 / 2.0;
    (m / a.len() as f64 + m / b.len() as f64 + (m - t) / m) / 3.0
}

/// Jaro similarity plus a bonus for a shared prefix of up to four chars.
pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    let base = jaro(a, b);
    let prefix = a
        .chars()
        .zip(b.chars())
        .take(WINKLER_PREFIX_MAX)
        .take_while(|(x, y)| x == y)
        .count();
    (base + prefix as f64 * WINKLER_SCALING * (1.0 - base)).min(1.0)
}

/// Case-insensitive Jaccard over whitespace-separated tokens.
pub fn token_set(a: &str, b: &str) -> f64 {
    let left: BTreeSet<String> = a.split_whitespace().map(str::to_lowercase).collect();
    let right: BTreeSet<String> = b.split_whitespace().map(str::to_lowercase).collect();
    jaccard(&left, &right)
}

/// [`token_set`] over an already tokenized sequence.
pub fn list_set(a: &[String], b: &[String]) -> f64 {
    let normalize = |items: &[String]| -> BTreeSet<String> {
        items
            .iter()
            .map(|item| item.trim().to_lowercase())
            .filter(|item| !item.is_empty())
            .collect()
    };
    jaccard(&normalize(a), &normalize(b))
}

/// `exp(-lambda * euclidean distance)`.
pub fn spatial_decay(a: (f64, f64), b: (f64, f64), lambda: f64) -> f64 {
    let distance = ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt();
    let value = (-lambda * distance).exp();
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// `min(area) / max(area)`; two zero areas are identical.
pub fn area_ratio(a: f64, b: f64) -> f64 {
    let (a, b) = (a.max(0.0), b.max(0.0));
    let largest = a.max(b);
    if largest == 0.0 {
        return 1.0;
    }
    a.min(b) / largest
}

pub fn boolean(a: bool, b: bool) -> f64 {
    if a == b {
        1.0
    } else {
        0.0
    }
}

/// Shared keys whose values also match, over the larger map's size.
pub fn key_value(a: &BTreeMap<String, String>, b: &BTreeMap<String, String>) -> f64 {
    let largest = a.len().max(b.len());
    if largest == 0 {
        return 1.0;
    }
    let matching = a
        .iter()
        .filter(|(key, value)| b.get(*key) == Some(*value))
        .count();
    matching as f64 / largest as f64
}

fn jaccard<T: Ord>(left: &BTreeSet<T>, right: &BTreeSet<T>) -> f64 {
    let union = left.union(right).count();
    if union == 0 {
        return 1.0;
    }
    left.intersection(right).count() as f64 / union as f64
}
