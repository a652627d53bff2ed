//! Region hierarchy used to narrow oversized searches
//!
//! The search page filters by a two-level region code: a province and an
//! optional city within it. The table is loaded once at startup and shared
//! read-only for the rest of the crawl.

use crate::config::{selects_all_regions, CrawlerConfig};
use crate::ConfigError;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// City code meaning "the whole province"
pub const WHOLE_PROVINCE: u32 = 1000;

const BUILTIN_REGIONS: &str = include_str!("regions.toml");

/// A city (or district) inside a province
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct City {
    pub name: String,
    pub code: u32,
}

/// A province with its cities in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Province {
    pub name: String,
    pub code: u32,
    #[serde(default)]
    pub cities: Vec<City>,
}

impl Province {
    /// Looks up a city of this province by code
    pub fn city(&self, code: u32) -> Option<&City> {
        self.cities.iter().find(|c| c.code == code)
    }
}

#[derive(Debug, Deserialize)]
struct RegionFile {
    #[serde(default)]
    province: Vec<Province>,
}

/// Static province → city mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionTable {
    provinces: Vec<Province>,
}

impl RegionTable {
    /// Returns the table compiled into the binary
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_toml_str(BUILTIN_REGIONS)
    }

    /// Loads a replacement table from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// The table named by `regions-path`, or the built-in one
    pub fn for_config(crawler: &CrawlerConfig) -> Result<Self, ConfigError> {
        match &crawler.regions_path {
            Some(path) => Self::load(Path::new(path)),
            None => Self::builtin(),
        }
    }

    /// Parses and checks a table in the `[[province]]` format
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: RegionFile = toml::from_str(content)?;
        Self::from_provinces(file.province)
    }

    /// Builds a table from provinces, rejecting duplicate codes
    pub fn from_provinces(provinces: Vec<Province>) -> Result<Self, ConfigError> {
        if provinces.is_empty() {
            return Err(ConfigError::Validation(
                "region table has no provinces".to_string(),
            ));
        }

        let mut province_codes = HashSet::new();
        for province in &provinces {
            if !province_codes.insert(province.code) {
                return Err(ConfigError::Validation(format!(
                    "duplicate province code {} ({})",
                    province.code, province.name
                )));
            }

            let mut city_codes = HashSet::new();
            for city in &province.cities {
                if city.code == WHOLE_PROVINCE || !city_codes.insert(city.code) {
                    return Err(ConfigError::Validation(format!(
                        "invalid or duplicate city code {} in {}",
                        city.code, province.name
                    )));
                }
            }
        }

        Ok(Self { provinces })
    }

    /// All provinces in declaration order
    pub fn provinces(&self) -> &[Province] {
        &self.provinces
    }

    /// Looks up a province by code
    pub fn province(&self, code: u32) -> Option<&Province> {
        self.provinces.iter().find(|p| p.code == code)
    }

    /// Looks up a province by display name
    pub fn find_by_name(&self, name: &str) -> Option<&Province> {
        self.provinces.iter().find(|p| p.name == name.trim())
    }

    /// Resolves configured region names to province codes
    ///
    /// `"all"` (or `"全部"`) anywhere in the list selects every province in
    /// table order; otherwise the configured order is kept and duplicates
    /// are dropped.
    pub fn select(&self, names: &[String]) -> Result<Vec<u32>, ConfigError> {
        if selects_all_regions(names) {
            return Ok(self.provinces.iter().map(|p| p.code).collect());
        }

        let mut codes = Vec::new();
        for name in names {
            let province = self
                .find_by_name(name)
                .ok_or_else(|| ConfigError::UnknownRegion(name.clone()))?;
            if !codes.contains(&province.code) {
                codes.push(province.code);
            }
        }
        Ok(codes)
    }

    /// Human-readable label for a (province, city) pair
    pub fn describe(&self, province: u32, city: Option<u32>) -> String {
        let Some(p) = self.province(province) else {
            return format!("province {}", province);
        };
        match city.and_then(|c| p.city(c)) {
            Some(c) => format!("{}/{}", p.name, c.name),
            None => match city {
                Some(code) => format!("{}/{}", p.name, code),
                None => p.name.clone(),
            },
        }
    }
}
