//! Scanner for raw geonames country dump files.
//!
//! The dump is a tab-separated format with 19 columns per row:
//! geonameid, name, asciiname, alternatenames, latitude, longitude,
//! feature class, feature code, country code, cc2, admin1..admin4 codes,
//! population, elevation, dem, timezone, modification date.
//!
//! The scan retains class `P` rows at or above the population threshold and
//! every class `A` row (needed for the administrative join). Anything the
//! format promises but cannot deliver is a hard error: one malformed row
//! fails the whole country, which surfaces as a `country_file_error`.

use super::{FeatureClass, RawPlace};

/// Column count of a geonames dump row.
const COLUMNS: usize = 19;

/// Error type for dump scanning.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("invalid country file row at line {line}: {message}")]
    InvalidFormat { line: usize, message: String },
}

/// Scan a raw country dump, retaining class-A rows and qualifying class-P rows.
///
/// Row order is preserved. Blank lines are skipped; any other deviation from
/// the 19-column contract fails the scan.
pub fn scan_records(text: &str, population_min: i64) -> Result<Vec<RawPlace>, ScanError> {
    let mut places = Vec::new();

    for (number, row) in text.lines().enumerate() {
        let line = number + 1;
        if row.trim().is_empty() {
            continue;
        }

        let columns: Vec<&str> = row.split('\t').collect();
        if columns.len() != COLUMNS {
            return Err(ScanError::InvalidFormat {
                line,
                message: format!("expected {} columns, found {}", COLUMNS, columns.len()),
            });
        }

        let feature_class = match columns[6] {
            "P" => FeatureClass::Populated,
            "A" => FeatureClass::Admin,
            _ => continue,
        };

        let population = parse_population(line, columns[14])?;
        if feature_class == FeatureClass::Populated && population < population_min {
            continue;
        }

        places.push(RawPlace {
            name: columns[1].to_string(),
            lat: parse_column(line, "latitude", columns[4])?,
            lng: parse_column(line, "longitude", columns[5])?,
            feature_class,
            feature_code: columns[7].to_string(),
            country_code: columns[8].to_string(),
            admin1_code: columns[10].to_string(),
            admin2_code: columns[11].to_string(),
            admin3_code: columns[12].to_string(),
            admin4_code: columns[13].to_string(),
            population,
            timezone: columns[17].to_string(),
        });
    }

    Ok(places)
}

fn parse_column<T: std::str::FromStr>(
    line: usize,
    field: &str,
    value: &str,
) -> Result<T, ScanError> {
    value.parse().map_err(|_| ScanError::InvalidFormat {
        line,
        message: format!("unparseable {} {:?}", field, value),
    })
}

/// Geonames leaves population empty for some admin rows; that is the one
/// column where an empty value means zero rather than a malformed row.
fn parse_population(line: usize, value: &str) -> Result<i64, ScanError> {
    if value.is_empty() {
        return Ok(0);
    }
    parse_column(line, "population", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, class: &str, code: &str, population: i64) -> String {
        format!(
            "1\t{name}\t{name}\t\t51.5\t-0.12\t{class}\t{code}\tGB\t\tENG\tGLA\t\t\t{population}\t\t25\tEurope/London\t2024-01-01"
        )
    }

    #[test]
    fn test_scan_retains_qualifying_populated_places() {
        let text = format!(
            "{}\n{}\n",
            row("London", "P", "PPLC", 7556900),
            row("Tiny Hamlet", "P", "PPL", 12)
        );
        let places = scan_records(&text, 500).unwrap();
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].name, "London");
        assert_eq!(places[0].feature_class, FeatureClass::Populated);
    }

    #[test]
    fn test_scan_retains_admin_rows_regardless_of_population() {
        let text = row("England", "A", "ADM1", 0);
        let places = scan_records(&text, 500).unwrap();
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].feature_class, FeatureClass::Admin);
    }

    #[test]
    fn test_scan_drops_other_feature_classes() {
        let text = row("Thames", "H", "STM", 0);
        let places = scan_records(&text, 500).unwrap();
        assert!(places.is_empty());
    }

    #[test]
    fn test_scan_empty_population_treated_as_zero() {
        let text =
            "1\tEngland\tEngland\t\t52.5\t-1.5\tA\tADM1\tGB\t\tENG\t\t\t\t\t\t25\tEurope/London\t2024-01-01";
        let places = scan_records(text, 500).unwrap();
        assert_eq!(places[0].population, 0);
    }

    #[test]
    fn test_scan_fails_on_wrong_column_count() {
        let err = scan_records("only\tthree\tcolumns", 500).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_scan_fails_on_empty_latitude() {
        let text =
            "1\tX\tX\t\t\t-0.12\tP\tPPL\tGB\t\t\t\t\t\t900\t\t25\tEurope/London\t2024-01-01";
        let err = scan_records(text, 500).unwrap_err();
        assert!(err.to_string().contains("latitude"));
    }

    #[test]
    fn test_scan_fails_on_bad_latitude() {
        let text =
            "1\tX\tX\t\tnot-a-number\t-0.12\tP\tPPL\tGB\t\t\t\t\t\t900\t\t25\tEurope/London\t2024-01-01";
        let err = scan_records(text, 500).unwrap_err();
        assert!(err.to_string().contains("latitude"));
    }

    #[test]
    fn test_scan_skips_blank_lines() {
        let text = format!("\n{}\n\n", row("London", "P", "PPLC", 7556900));
        let places = scan_records(&text, 500).unwrap();
        assert_eq!(places.len(), 1);
    }
}
