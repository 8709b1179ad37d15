use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::{Catalog, VehicleRecord};

const MODEL_SIMILARITY_CUTOFF: f64 = 0.7;

#[derive(Debug, PartialEq)]
pub enum MatchResult<'a> {
    Match(&'a VehicleRecord),
    Ambiguous(Vec<&'a VehicleRecord>),
    NoMatch,
}

struct Keywords {
    words: Vec<String>,
    year: Option<i32>,
}

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+").expect("word pattern"))
}

fn extract_keywords(text: &str) -> Keywords {
    let text = text.to_lowercase();
    let words: Vec<String> = word_re()
        .find_iter(&text)
        .map(|m| m.as_str().to_string())
        .collect();

    // At most one model-year hint: the first plausible 4-digit token.
    let year = words
        .iter()
        .filter(|w| w.len() == 4)
        .filter_map(|w| w.parse::<i32>().ok())
        .find(|y| (1980..=2050).contains(y));

    Keywords { words, year }
}

// Best fuzzy candidate for a single token. Candidates iterate in sorted order,
// so equal similarity scores tie-break deterministically on model name.
fn best_model_for_token<'a>(token: &str, models: &'a BTreeSet<String>) -> Option<&'a str> {
    let mut best: Option<(&str, f64)> = None;
    for model in models {
        let score = strsim::normalized_levenshtein(token, model.as_str());
        if score >= MODEL_SIMILARITY_CUTOFF && best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((model.as_str(), score));
        }
    }
    best.map(|(m, _)| m)
}

pub fn match_vehicle<'a>(text: &str, catalog: &'a Catalog) -> MatchResult<'a> {
    let keywords = extract_keywords(text);

    let models: BTreeSet<String> = catalog
        .vehicles
        .iter()
        .map(|v| v.model.to_lowercase())
        .collect();

    // First token with a fuzzy candidate wins, in reading order.
    let Some(selected_model) = keywords
        .words
        .iter()
        .find_map(|w| best_model_for_token(w, &models))
    else {
        return MatchResult::NoMatch;
    };

    let model_matches: Vec<&VehicleRecord> = catalog
        .vehicles
        .iter()
        .filter(|v| v.model.to_lowercase() == selected_model)
        .collect();

    if let Some(year) = keywords.year {
        let year_matches: Vec<&VehicleRecord> = model_matches
            .iter()
            .copied()
            .filter(|v| v.year == year)
            .collect();
        match year_matches.len() {
            0 => {} // fall through to the most-recent-year pick
            1 => return MatchResult::Match(year_matches[0]),
            _ => return MatchResult::Ambiguous(year_matches),
        }
    }

    // Most recent year wins; the first record of that year on ties.
    let latest = model_matches
        .iter()
        .copied()
        .reduce(|best, v| if v.year > best.year { v } else { best });
    match latest {
        Some(latest) => MatchResult::Match(latest),
        None => MatchResult::NoMatch,
    }
}
