//! City directory: static name → coordinates lookup.
//!
//! The dataset file is re-read on every lookup, matching the original
//! deployment model where the file can be swapped without a restart.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Geographic coordinates as stored in the dataset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coords {
    pub lat: f64,
    pub lon: f64,
}

/// One dataset entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CityEntry {
    pub name: String,
    pub coords: Coords,
}

/// Lookup table over the JSON city dataset.
#[derive(Debug, Clone)]
pub struct CityDirectory {
    dataset_path: PathBuf,
}

impl CityDirectory {
    #[must_use]
    pub fn new(dataset_path: impl Into<PathBuf>) -> Self {
        Self {
            dataset_path: dataset_path.into(),
        }
    }

    /// Load the full dataset.
    pub fn load(&self) -> Result<Vec<CityEntry>> {
        let raw = std::fs::read_to_string(&self.dataset_path)?;
        let entries: Vec<CityEntry> = serde_json::from_str(&raw)?;
        debug!(count = entries.len(), "Loaded city dataset");
        Ok(entries)
    }

    /// Look up coordinates by exact, case-sensitive city name.
    ///
    /// Absence is a value, not an error: callers must check for `None`.
    /// No trimming, case-folding, or transliteration happens here; any
    /// normalization is the caller's business.
    pub fn coords_by_name(&self, name: &str) -> Result<Option<Coords>> {
        let entries = self.load()?;
        Ok(entries
            .into_iter()
            .find(|city| city.name == name)
            .map(|city| city.coords))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    fn dataset() -> (tempfile::TempDir, CityDirectory) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"[
                {{"name": "Москва", "coords": {{"lat": 55.755833333333, "lon": 37.617777777778}}}},
                {{"name": "Санкт-Петербург", "coords": {{"lat": 59.938955, "lon": 30.315644}}}},
                {{"name": "Омск", "coords": {{"lat": 54.991375, "lon": 73.371529}}}}
            ]"#
        )
        .unwrap();
        let directory = CityDirectory::new(path);
        (dir, directory)
    }

    #[rstest]
    #[case("Москва", 55.755833333333, 37.617777777778)]
    #[case("Санкт-Петербург", 59.938955, 30.315644)]
    #[case("Омск", 54.991375, 73.371529)]
    fn known_city_returns_exact_coords(#[case] name: &str, #[case] lat: f64, #[case] lon: f64) {
        let (_dir, directory) = dataset();
        let coords = directory.coords_by_name(name).unwrap().unwrap();
        assert_eq!(coords.lat, lat);
        assert_eq!(coords.lon, lon);
        assert!(coords.lat.is_finite() && coords.lon.is_finite());
    }

    #[test]
    fn unknown_city_returns_none() {
        let (_dir, directory) = dataset();
        assert!(directory.coords_by_name("Несуществующий город").unwrap().is_none());
    }

    #[test]
    fn match_is_case_sensitive_and_unnormalized() {
        let (_dir, directory) = dataset();
        assert!(directory.coords_by_name("москва").unwrap().is_none());
        assert!(directory.coords_by_name(" Москва").unwrap().is_none());
    }

    #[test]
    fn load_returns_all_entries() {
        let (_dir, directory) = dataset();
        let entries = directory.load().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, "Москва");
    }

    #[test]
    fn missing_dataset_is_an_error() {
        let directory = CityDirectory::new("/nonexistent/cities.json");
        assert!(directory.coords_by_name("Москва").is_err());
    }

    #[test]
    fn malformed_dataset_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities.json");
        std::fs::write(&path, "not json").unwrap();
        let directory = CityDirectory::new(path);
        assert!(directory.load().is_err());
    }
}
