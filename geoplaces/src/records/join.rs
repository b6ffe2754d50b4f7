//! Join of populated places with their administrative hierarchy.
//!
//! Geonames encodes a place's region membership as up to four hierarchical
//! admin codes. The names of those regions live in separate class-A rows
//! (feature codes ADM1..ADM4) keyed by the same code prefix. The join
//! resolves each populated place's codes to region names; unresolved levels
//! stay empty.

use std::collections::HashMap;

use super::{CityRecord, FeatureClass, RawPlace};

/// Join every class-P row with its administrative parents.
///
/// Input order of the populated places is preserved in the output.
pub fn join_admin_regions(places: Vec<RawPlace>) -> Vec<CityRecord> {
    let mut adm1: HashMap<String, String> = HashMap::new();
    let mut adm2: HashMap<(String, String), String> = HashMap::new();
    let mut adm3: HashMap<(String, String, String), String> = HashMap::new();
    let mut adm4: HashMap<(String, String, String, String), String> = HashMap::new();

    for place in places.iter().filter(|p| p.feature_class == FeatureClass::Admin) {
        match place.feature_code.as_str() {
            "ADM1" => {
                adm1.insert(place.admin1_code.clone(), place.name.clone());
            }
            "ADM2" => {
                adm2.insert(
                    (place.admin1_code.clone(), place.admin2_code.clone()),
                    place.name.clone(),
                );
            }
            "ADM3" => {
                adm3.insert(
                    (
                        place.admin1_code.clone(),
                        place.admin2_code.clone(),
                        place.admin3_code.clone(),
                    ),
                    place.name.clone(),
                );
            }
            "ADM4" => {
                adm4.insert(
                    (
                        place.admin1_code.clone(),
                        place.admin2_code.clone(),
                        place.admin3_code.clone(),
                        place.admin4_code.clone(),
                    ),
                    place.name.clone(),
                );
            }
            _ => {}
        }
    }

    places
        .into_iter()
        .filter(|p| p.feature_class == FeatureClass::Populated)
        .map(|place| {
            let a1 = adm1.get(&place.admin1_code).cloned().unwrap_or_default();
            let a2 = adm2
                .get(&(place.admin1_code.clone(), place.admin2_code.clone()))
                .cloned()
                .unwrap_or_default();
            let a3 = adm3
                .get(&(
                    place.admin1_code.clone(),
                    place.admin2_code.clone(),
                    place.admin3_code.clone(),
                ))
                .cloned()
                .unwrap_or_default();
            let a4 = adm4
                .get(&(
                    place.admin1_code.clone(),
                    place.admin2_code.clone(),
                    place.admin3_code.clone(),
                    place.admin4_code.clone(),
                ))
                .cloned()
                .unwrap_or_default();

            CityRecord {
                name: place.name,
                lat: place.lat,
                lng: place.lng,
                feature_class: place.feature_class.code(),
                feature_code: place.feature_code,
                country_code: place.country_code,
                admin1: a1,
                admin2: a2,
                admin3: a3,
                admin4: a4,
                timezone: place.timezone,
            }
        })
        .collect()
}
