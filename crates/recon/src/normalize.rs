use std::fmt;

/// Separator for composite keys. Never appears in administrative names.
pub const KEY_DELIMITER: char = '|';

/// Canonical form of a free-text administrative name: surrounding
/// whitespace (including full-width spaces) removed, interior untouched.
pub fn normalize(field: &str) -> String {
    field.trim().to_string()
}

/// (county, district, village) join key between vote records and the registry.
///
/// Fields are normalized on construction, so two keys built from differently
/// padded spellings of the same names compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey {
    pub county: String,
    pub district: String,
    pub village: String,
}

impl CompositeKey {
    pub fn new(county: &str, district: &str, village: &str) -> Self {
        Self {
            county: normalize(county),
            district: normalize(district),
            village: normalize(village),
        }
    }

    pub fn with_district(&self, district: &str) -> Self {
        Self {
            county: self.county.clone(),
            district: district.to_string(),
            village: self.village.clone(),
        }
    }

    pub fn with_village(&self, village: &str) -> Self {
        Self {
            county: self.county.clone(),
            district: self.district.clone(),
            village: village.to_string(),
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{KEY_DELIMITER}{}{KEY_DELIMITER}{}",
            self.county, self.district, self.village
        )
    }
}
