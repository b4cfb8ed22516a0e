//! Grid regions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A data center the grid runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Region {
    UsWest1,
    UsEast4,
    EuCentral1,
    ApacSoutheast1,
    Staging,
}

impl Region {
    pub const ALL: [Region; 5] = [
        Region::UsWest1,
        Region::UsEast4,
        Region::EuCentral1,
        Region::ApacSoutheast1,
        Region::Staging,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::UsWest1 => "us-west-1",
            Region::UsEast4 => "us-east-4",
            Region::EuCentral1 => "eu-central-1",
            Region::ApacSoutheast1 => "apac-southeast-1",
            Region::Staging => "staging",
        }
    }

    /// Base URL of the REST API for this region.
    pub fn api_base_url(&self) -> String {
        match self {
            Region::Staging => "https://api.staging.saucelabs.net".to_string(),
            other => format!("https://api.{}.saucelabs.com", other.as_str()),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a region name that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "unknown region '{0}' (expected one of: us-west-1, us-east-4, eu-central-1, \
     apac-southeast-1, staging)"
)]
pub struct UnknownRegion(pub String);

impl FromStr for Region {
    type Err = UnknownRegion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Region::ALL
            .into_iter()
            .find(|r| r.as_str() == normalized)
            .ok_or_else(|| UnknownRegion(s.to_string()))
    }
}

impl TryFrom<String> for Region {
    type Error = UnknownRegion;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Region> for String {
    fn from(region: Region) -> Self {
        region.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_regions() {
        for region in Region::ALL {
            assert_eq!(region.as_str().parse::<Region>().unwrap(), region);
        }
        assert_eq!(" US-West-1 ".parse::<Region>().unwrap(), Region::UsWest1);
    }

    #[test]
    fn test_unknown_region() {
        let err = "mars-north-1".parse::<Region>().unwrap_err();
        assert!(err.to_string().contains("mars-north-1"));
    }

    #[test]
    fn test_api_base_url() {
        assert_eq!(
            Region::EuCentral1.api_base_url(),
            "https://api.eu-central-1.saucelabs.com"
        );
        assert_eq!(
            Region::Staging.api_base_url(),
            "https://api.staging.saucelabs.net"
        );
    }

    #[test]
    fn test_serde_uses_region_names() {
        let yaml = serde_yaml::to_string(&Region::UsEast4).unwrap();
        assert_eq!(yaml.trim(), "us-east-4");
        let parsed: Region = serde_yaml::from_str("apac-southeast-1").unwrap();
        assert_eq!(parsed, Region::ApacSoutheast1);
    }
}
