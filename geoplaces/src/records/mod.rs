//! Country record model and the transforms that produce it.
//!
//! A country's raw geonames dump is scanned into [`RawPlace`] rows
//! (populated places and administrative regions), the populated places are
//! joined with their administrative parents into [`CityRecord`]s, and the
//! joined set is materialized on disk as the country's cache file so later
//! incarnations can skip the download entirely.

mod fcp;
mod join;
mod parser;

pub use fcp::{fcp_path, FcpError, FcpFile, FcpHeader};
pub use join::join_admin_regions;
pub use parser::{scan_records, ScanError};

/// Feature class of a raw geonames row.
///
/// Only `P` (populated place) and `A` (administrative region) rows survive
/// the scan; everything else is dropped on sight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureClass {
    /// Populated place (city, town, village).
    Populated,
    /// Administrative region (country subdivision).
    Admin,
}

impl FeatureClass {
    /// The single-letter geonames code for this class.
    pub fn code(self) -> char {
        match self {
            FeatureClass::Populated => 'P',
            FeatureClass::Admin => 'A',
        }
    }
}

/// One retained row from a raw geonames country dump.
///
/// Class-P rows become cities; class-A rows contribute the names of the
/// administrative hierarchy during the join.
#[derive(Debug, Clone)]
pub struct RawPlace {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub feature_class: FeatureClass,
    pub feature_code: String,
    pub country_code: String,
    /// Hierarchical admin codes; higher levels may be empty.
    pub admin1_code: String,
    pub admin2_code: String,
    pub admin3_code: String,
    pub admin4_code: String,
    pub population: i64,
    pub timezone: String,
}

/// One populated place retained after filtering and joining.
///
/// Built once during country startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CityRecord {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub feature_class: char,
    pub feature_code: String,
    pub country_code: String,
    /// Names of the administrative hierarchy; empty when unresolved.
    pub admin1: String,
    pub admin2: String,
    pub admin3: String,
    pub admin4: String,
    pub timezone: String,
}

impl CityRecord {
    /// Estimated heap footprint of this record in bytes.
    pub fn mem_usage(&self) -> u64 {
        (std::mem::size_of::<CityRecord>()
            + self.name.capacity()
            + self.feature_code.capacity()
            + self.country_code.capacity()
            + self.admin1.capacity()
            + self.admin2.capacity()
            + self.admin3.capacity()
            + self.admin4.capacity()
            + self.timezone.capacity()) as u64
    }
}
