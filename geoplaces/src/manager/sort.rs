//! Ordering of the status list.
//!
//! The table itself is keyed by country code; presentation order is a
//! separate view recomputed on each sort command. One comparator rule is
//! load-bearing: an absent value compares greater than any present value,
//! so undefined entries sink to the end under ascending order and surface
//! first under descending.

use std::cmp::Ordering;

use super::status::CountryStatus;

/// Sortable columns of the status list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Continent,
    CountryName,
    CountryCode,
    CityCount,
    MemUsage,
    StartupTime,
}

impl SortColumn {
    /// Parse a column name as it appears on the admin surface.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "continent" => Some(SortColumn::Continent),
            "country_name" => Some(SortColumn::CountryName),
            "country_code" => Some(SortColumn::CountryCode),
            "city_count" => Some(SortColumn::CityCount),
            "mem_usage" => Some(SortColumn::MemUsage),
            "startup_time" => Some(SortColumn::StartupTime),
            _ => None,
        }
    }
}

/// Sort direction. Anything that is not `ascending` sorts descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn parse(direction: &str) -> Self {
        if direction == "ascending" {
            SortDirection::Ascending
        } else {
            SortDirection::Descending
        }
    }
}

/// Compare two records on a column, in the given direction.
///
/// Descending is the base comparator; ascending swaps the arguments.
pub fn compare_directed(
    column: SortColumn,
    direction: SortDirection,
    a: &CountryStatus,
    b: &CountryStatus,
) -> Ordering {
    match direction {
        SortDirection::Ascending => compare(column, a, b),
        SortDirection::Descending => compare(column, b, a),
    }
}

/// The ascending comparator for a column.
///
/// `continent` ties fall through to the country name; every other column is
/// a total order with absent values greatest.
pub fn compare(column: SortColumn, a: &CountryStatus, b: &CountryStatus) -> Ordering {
    match column {
        SortColumn::Continent => a
            .continent
            .cmp(&b.continent)
            .then_with(|| a.country_name.cmp(&b.country_name)),
        SortColumn::CountryName => a.country_name.cmp(&b.country_name),
        SortColumn::CountryCode => a.country_code.cmp(&b.country_code),
        SortColumn::CityCount => cmp_absent_greatest(a.city_count, b.city_count),
        SortColumn::MemUsage => cmp_absent_greatest(a.mem_usage, b.mem_usage),
        SortColumn::StartupTime => cmp_absent_greatest(a.startup_time, b.startup_time),
    }
}

/// Total order over optional values where `None` is the greatest element.
fn cmp_absent_greatest<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Country;

    fn record(code: &str, name: &str, continent: &str) -> CountryStatus {
        CountryStatus::initial(&Country::new(code, name, continent))
    }

    #[test]
    fn test_column_parse() {
        assert_eq!(SortColumn::parse("mem_usage"), Some(SortColumn::MemUsage));
        assert_eq!(SortColumn::parse("bogus"), None);
    }

    #[test]
    fn test_unknown_direction_is_descending() {
        assert_eq!(SortDirection::parse("ascending"), SortDirection::Ascending);
        assert_eq!(SortDirection::parse("descending"), SortDirection::Descending);
        assert_eq!(SortDirection::parse("sideways"), SortDirection::Descending);
    }

    #[test]
    fn test_continent_ties_fall_through_to_name() {
        let fr = record("FR", "France", "Europe");
        let de = record("DE", "Germany", "Europe");
        assert_eq!(compare(SortColumn::Continent, &fr, &de), Ordering::Less);
    }

    #[test]
    fn test_absent_is_greatest_under_ascending() {
        let mut with_count = record("GB", "United Kingdom", "Europe");
        with_count.city_count = Some(42);
        let without = record("FR", "France", "Europe");
        assert!(without.city_count.is_none());

        assert_eq!(
            compare_directed(
                SortColumn::CityCount,
                SortDirection::Ascending,
                &with_count,
                &without
            ),
            Ordering::Less
        );
        assert_eq!(
            compare_directed(
                SortColumn::CityCount,
                SortDirection::Descending,
                &with_count,
                &without
            ),
            Ordering::Greater
        );
    }

    #[test]
    fn test_ascending_swaps_descending() {
        let a = record("AA", "Alpha", "Europe");
        let b = record("BB", "Beta", "Europe");
        assert_eq!(
            compare_directed(SortColumn::CountryCode, SortDirection::Ascending, &a, &b),
            Ordering::Less
        );
        assert_eq!(
            compare_directed(SortColumn::CountryCode, SortDirection::Descending, &a, &b),
            Ordering::Greater
        );
    }
}
