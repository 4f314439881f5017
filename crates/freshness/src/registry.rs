//! City registry: the fixed catalog every other component is seeded from.

use std::collections::HashMap;
use std::path::Path;

use common::{CityRecord, Error, Result};
use tracing::info;

/// Read-only catalog of known cities, keyed by name.
#[derive(Debug, Clone)]
pub struct CityRegistry {
    cities: Vec<CityRecord>,
    index: HashMap<String, usize>,
}

impl CityRegistry {
    /// Build a registry, rejecting catalogs that would break the cache's
    /// fallback guarantee.
    pub fn new(cities: Vec<CityRecord>) -> Result<Self> {
        if cities.is_empty() {
            return Err(Error::Config("city catalog is empty".into()));
        }

        let mut issues: Vec<String> = Vec::new();
        let mut index = HashMap::with_capacity(cities.len());

        for (i, city) in cities.iter().enumerate() {
            if city.name.trim().is_empty() {
                issues.push(format!("city #{i} has an empty name"));
                continue;
            }
            if index.insert(city.name.clone(), i).is_some() {
                issues.push(format!("duplicate city name: {}", city.name));
            }
            if !city.latitude.is_finite() || !city.longitude.is_finite() {
                issues.push(format!("{}: coordinates must be finite", city.name));
            }
            if !city.baseline_pm25.is_finite() || city.baseline_pm25 <= 0.0 {
                issues.push(format!(
                    "{}: baseline pm25 must be a finite number > 0",
                    city.name
                ));
            }
        }

        if !issues.is_empty() {
            return Err(Error::Config(format!(
                "Invalid city catalog:\n - {}",
                issues.join("\n - ")
            )));
        }

        Ok(Self { cities, index })
    }

    /// Parse a JSON array of city records.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let cities: Vec<CityRecord> = serde_json::from_str(raw)?;
        Self::new(cities)
    }

    /// Load a JSON catalog from disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let registry = Self::from_json_str(&raw)?;
        info!(
            "Loaded {} cities from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    /// All cities in catalog order.
    pub fn list_cities(&self) -> &[CityRecord] {
        &self.cities
    }

    pub fn get(&self, key: &str) -> Result<&CityRecord> {
        self.index
            .get(key)
            .map(|&i| &self.cities[i])
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::config::default_cities;

    #[test]
    fn test_builtin_catalog_loads() {
        let registry = CityRegistry::new(default_cities()).expect("catalog should load");
        assert_eq!(registry.len(), default_cities().len());
        assert_eq!(registry.get("Delhi").expect("known").region, "South Asia");
        assert_eq!(registry.list_cities()[0].name, "New York City");
    }

    #[test]
    fn test_unknown_city_is_not_found() {
        let registry = CityRegistry::new(default_cities()).expect("catalog should load");
        assert!(matches!(registry.get("Atlantis"), Err(Error::NotFound(_))));
        assert!(!registry.contains("delhi"));
    }

    #[test]
    fn test_rejects_duplicates_and_bad_baselines() {
        let mut cities = default_cities();
        cities.truncate(2);
        cities.push(cities[0].clone());
        cities[1].baseline_pm25 = 0.0;

        let err = CityRegistry::new(cities).expect_err("catalog should be rejected");
        let msg = err.to_string();
        assert!(msg.contains("duplicate city name"));
        assert!(msg.contains("baseline pm25"));
    }

    #[test]
    fn test_rejects_empty_catalog() {
        assert!(matches!(CityRegistry::new(vec![]), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_json_str() {
        let raw = r#"[
            {"city": "Delhi", "lat": 28.61, "lon": 77.21, "region": "South Asia", "population": 32900000, "pm25": 98.6},
            {"name": "Paris", "latitude": 48.85, "longitude": 2.35, "region": "Western Europe", "baseline_pm25": 11.2, "station": "paris"}
        ]"#;
        let registry = CityRegistry::from_json_str(raw).expect("json catalog should load");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("Paris").expect("known").population, 0);
    }

    #[test]
    fn test_from_json_file_missing_is_io_error() {
        let err = CityRegistry::from_json_file("/definitely/not/here/cities.json")
            .expect_err("missing file");
        assert!(matches!(err, Error::Io(_)));
    }
}
