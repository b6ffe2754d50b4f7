//! Parser for the geonames countryInfo.txt catalog file.
//!
//! The file is a line-based, tab-separated format where:
//! - Lines starting with `#` are comments
//! - Column 0 is the ISO alpha-2 code, column 4 the country name,
//!   column 8 the two-letter continent code
//!
//! Continent codes are expanded to the names used for presentation sorting.

use std::io::{BufRead, BufReader, Read};

use super::Country;

/// Error type for catalog parsing.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid countryInfo.txt format at line {line}: {message}")]
    InvalidFormat { line: usize, message: String },
}

/// Parser for the geonames countryInfo.txt format.
pub struct CatalogParser;

impl CatalogParser {
    /// Parse catalog entries from a countryInfo.txt reader.
    ///
    /// Comment lines and blank lines are skipped. Rows with too few columns
    /// yield an error item; `parse_all` logs and skips those.
    pub fn parse<R: Read>(reader: R) -> impl Iterator<Item = Result<Country, CatalogError>> {
        BufReader::new(reader)
            .lines()
            .enumerate()
            .filter_map(|(number, line)| match line {
                Ok(line) => {
                    let trimmed = line.trim_end();
                    if trimmed.is_empty() || trimmed.starts_with('#') {
                        None
                    } else {
                        Some(parse_row(number + 1, trimmed))
                    }
                }
                Err(e) => Some(Err(CatalogError::Io(e))),
            })
    }

    /// Parse all catalog entries into a vector.
    ///
    /// Skips rows that fail to parse and logs warnings, preserving file order.
    pub fn parse_all<R: Read>(reader: R) -> Result<Vec<Country>, CatalogError> {
        let mut countries = Vec::new();
        for result in Self::parse(reader) {
            match result {
                Ok(country) => countries.push(country),
                Err(e @ CatalogError::Io(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!("Skipping catalog row due to parse error: {}", e);
                }
            }
        }
        Ok(countries)
    }
}

/// Parse one data row.
///
/// countryInfo.txt columns: ISO, ISO3, ISO-Numeric, fips, Country, Capital,
/// Area, Population, Continent, ...
fn parse_row(line: usize, row: &str) -> Result<Country, CatalogError> {
    let columns: Vec<&str> = row.split('\t').collect();
    if columns.len() < 9 {
        return Err(CatalogError::InvalidFormat {
            line,
            message: format!("expected at least 9 columns, found {}", columns.len()),
        });
    }

    let code = columns[0].trim();
    if code.len() != 2 {
        return Err(CatalogError::InvalidFormat {
            line,
            message: format!("invalid country code {:?}", code),
        });
    }

    Ok(Country::new(code, columns[4], continent_name(columns[8])))
}

/// Expand a geonames continent code to its presentation name.
fn continent_name(code: &str) -> &str {
    match code {
        "AF" => "Africa",
        "AN" => "Antarctica",
        "AS" => "Asia",
        "EU" => "Europe",
        "NA" => "North America",
        "OC" => "Oceania",
        "SA" => "South America",
        other => other,
    }
}
