//! Maps what a person typed onto a channel of a catalog.

use regex::RegexBuilder;

use crate::api::Channel;

/// Resolves `search` to a channel id.
///
/// Tiers, first hit wins:
/// 1. a positive number is a 1-based position in the catalog (not an id);
///    out of range simply falls through;
/// 2. case-insensitive full-name equality;
/// 3. the search string as a case-insensitive regex, first catalog entry
///    that matches (an invalid pattern matches nothing);
/// 4. word overlap: every alphanumeric word of the search found inside the
///    name scores a point, best score wins, ties go to the lower id.
pub fn resolve(search: &str, catalog: &[Channel]) -> Option<u64> {
    by_position(search, catalog)
        .or_else(|| by_name(search, catalog))
        .or_else(|| by_pattern(search, catalog))
        .or_else(|| by_words(search, catalog))
}

fn by_position(search: &str, catalog: &[Channel]) -> Option<u64> {
    let trimmed = search.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let position: usize = trimmed.parse().ok()?;
    if position == 0 {
        return None;
    }

    catalog.get(position - 1).map(|ch| ch.id)
}

fn by_name(search: &str, catalog: &[Channel]) -> Option<u64> {
    let needle = search.to_lowercase();
    catalog
        .iter()
        .find(|ch| ch.name.to_lowercase() == needle)
        .map(|ch| ch.id)
}

fn by_pattern(search: &str, catalog: &[Channel]) -> Option<u64> {
    let pattern = match RegexBuilder::new(search).case_insensitive(true).build() {
        Ok(re) => re,
        Err(e) => {
            log::debug!("Search {search:?} is not a usable pattern: {e}");
            return None;
        }
    };

    catalog
        .iter()
        .find(|ch| pattern.is_match(&ch.name))
        .map(|ch| ch.id)
}

fn by_words(search: &str, catalog: &[Channel]) -> Option<u64> {
    let lowered = search.to_lowercase();
    let words: Vec<&str> = lowered
        .split(' ')
        .filter(|w| !w.is_empty() && w.chars().all(|c| c.is_ascii_alphanumeric()))
        .collect();

    if words.is_empty() {
        return None;
    }

    catalog
        .iter()
        .filter_map(|ch| {
            let name = ch.name.to_lowercase();
            let score = words.iter().filter(|w| name.contains(*w)).count();
            (score > 0).then_some((score, ch.id))
        })
        .fold(None, |best: Option<(usize, u64)>, (score, id)| match best {
            Some((best_score, best_id))
                if best_score > score || (best_score == score && best_id < id) =>
            {
                best
            }
            _ => Some((score, id)),
        })
        .map(|(_, id)| id)
}
