use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LicenseType {
    Apache2,
    Eclipse2,
    Mit,
    Gpl,
    Lgpl,
    Other,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct License {
    pub name: String,
    pub license_type: LicenseType,
}

impl License {
    /// Classifies the free-text license name found in a descriptor. This is a heuristic: names are
    ///  not standardized, so it goes by well-known substrings.
    pub fn from_name(name: &str) -> License {
        let name = name.trim();
        let lower = name.to_lowercase();

        let license_type = if name.is_empty() {
            LicenseType::Unknown
        }
        // LGPL first: its long names contain "general public license" as well
        else if name.contains("LGPL") || lower.contains("lesser general public") || lower.contains("library general public") {
            LicenseType::Lgpl
        }
        else if name.contains("GPL") || lower.contains("general public license") {
            LicenseType::Gpl
        }
        else if lower.contains("apache") || name.contains("ASF") {
            LicenseType::Apache2
        }
        else if lower.contains("eclipse") || name.contains("EPL") {
            LicenseType::Eclipse2
        }
        else if name.contains("MIT") {
            LicenseType::Mit
        }
        else {
            LicenseType::Other
        };

        License {
            name: name.to_string(),
            license_type,
        }
    }
}
