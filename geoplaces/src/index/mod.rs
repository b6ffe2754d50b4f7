//! In-memory country index and search matching.
//!
//! A [`CountryIndex`] is the immutable record set one data server built for
//! its country. Once handed to the manager it is shared behind an `Arc`;
//! search handlers read it concurrently without any locking because nothing
//! ever mutates it.

use crate::records::CityRecord;

/// A matching query against city names.
///
/// The term is lowercased once at construction; matching is always
/// case-insensitive.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    term: String,
    starts_with: bool,
    whole_word: bool,
}

impl SearchQuery {
    /// Create a query for the given term and match modes.
    pub fn new(term: &str, starts_with: bool, whole_word: bool) -> Self {
        Self {
            term: term.to_lowercase(),
            starts_with,
            whole_word,
        }
    }

    /// The lowercased search term.
    pub fn term(&self) -> &str {
        &self.term
    }

    /// Whether a city name matches this query.
    ///
    /// - default: substring match
    /// - `starts_with`: prefix match
    /// - `whole_word`: the term appears as a whole word
    /// - both: exact name match
    pub fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        match (self.starts_with, self.whole_word) {
            (true, true) => name == self.term,
            (true, false) => name.starts_with(&self.term),
            (false, true) => name
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| word == self.term),
            (false, false) => name.contains(&self.term),
        }
    }
}

/// The immutable, fully built index of one country's populated places.
#[derive(Debug)]
pub struct CountryIndex {
    country_code: String,
    records: Vec<CityRecord>,
    mem_usage: u64,
}

impl CountryIndex {
    /// Build an index from a joined record set.
    pub fn new(country_code: &str, records: Vec<CityRecord>) -> Self {
        let mem_usage = records.iter().map(CityRecord::mem_usage).sum();
        Self {
            country_code: country_code.to_uppercase(),
            records,
            mem_usage,
        }
    }

    /// The country this index belongs to.
    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    /// Number of cities in the index.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the index holds no cities.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Estimated heap footprint of the loaded record set in bytes.
    pub fn mem_usage(&self) -> u64 {
        self.mem_usage
    }

    /// All records matching the query, in index order.
    pub fn search(&self, query: &SearchQuery) -> Vec<&CityRecord> {
        self.records
            .iter()
            .filter(|record| query.matches(&record.name))
            .collect()
    }
}
