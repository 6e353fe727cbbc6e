use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MAX_NETWORK_LEN: usize = 2;
const MAX_STATION_LEN: usize = 5;
const MAX_LOCATION_LEN: usize = 2;
const MAX_SELECTOR_LEN: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NslError {
    #[error("invalid NSL code '{0}': expected NET.STA.LOC")]
    Format(String),

    #[error("invalid network '{0}': at most {MAX_NETWORK_LEN} characters")]
    Network(String),

    #[error("invalid station '{0}': 1 to {MAX_STATION_LEN} characters")]
    Station(String),

    #[error("invalid location '{0}': at most {MAX_LOCATION_LEN} characters")]
    Location(String),

    #[error("invalid channel selector '{0}': at most {MAX_SELECTOR_LEN} characters of [A-Za-z0-9*?]")]
    Selector(String),
}

/// Network, station and location of a recording site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nsl {
    pub network: String,
    pub station: String,
    pub location: String,
}

impl Nsl {
    pub fn new(network: &str, station: &str, location: &str) -> Result<Self, NslError> {
        if network.len() > MAX_NETWORK_LEN {
            return Err(NslError::Network(network.to_string()));
        }
        if station.is_empty() || station.len() > MAX_STATION_LEN {
            return Err(NslError::Station(station.to_string()));
        }
        if location.len() > MAX_LOCATION_LEN {
            return Err(NslError::Location(location.to_string()));
        }

        Ok(Self {
            network: network.to_string(),
            station: station.to_string(),
            location: location.to_string(),
        })
    }
}

impl fmt::Display for Nsl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.network, self.station, self.location)
    }
}

impl FromStr for Nsl {
    type Err = NslError;

    /// Parses `NET.STA.LOC` or `NET.STA` (empty location).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        match parts.as_slice() {
            [network, station] => Nsl::new(network, station, ""),
            [network, station, location] => Nsl::new(network, station, location),
            _ => Err(NslError::Format(s.to_string())),
        }
    }
}

impl Serialize for Nsl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Nsl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Code(String),
            Parts(String, String, String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Code(code) => code.parse().map_err(serde::de::Error::custom),
            Repr::Parts(network, station, location) => {
                Nsl::new(&network, &station, &location).map_err(serde::de::Error::custom)
            }
        }
    }
}

/// Wildcard pattern selecting channel codes, e.g. `EN?` or `*`.
#[derive(Debug, Clone)]
pub struct ChannelSelector {
    pattern: String,
    regex: Regex,
}

impl ChannelSelector {
    pub fn new(pattern: &str) -> Result<Self, NslError> {
        let valid_chars = pattern
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '*' || c == '?');
        if pattern.is_empty() || pattern.len() > MAX_SELECTOR_LEN || !valid_chars {
            return Err(NslError::Selector(pattern.to_string()));
        }

        let mut expr = String::with_capacity(pattern.len() + 4);
        expr.push('^');
        for c in pattern.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                c => expr.push(c),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|_| NslError::Selector(pattern.to_string()))?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, channel: &str) -> bool {
        self.regex.is_match(channel)
    }
}

impl Default for ChannelSelector {
    fn default() -> Self {
        Self {
            pattern: "*".to_string(),
            regex: Regex::new("^.*$").expect("static regex"),
        }
    }
}

impl PartialEq for ChannelSelector {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl fmt::Display for ChannelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

impl Serialize for ChannelSelector {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.pattern)
    }
}

impl<'de> Deserialize<'de> for ChannelSelector {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pattern = String::deserialize(deserializer)?;
        ChannelSelector::new(&pattern).map_err(serde::de::Error::custom)
    }
}

/// A query code: one station combined with a channel selector.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelCode {
    pub nsl: Nsl,
    pub selector: ChannelSelector,
}

impl ChannelCode {
    pub fn matches(&self, nsl: &Nsl, channel: &str) -> bool {
        self.nsl == *nsl && self.selector.matches(channel)
    }
}

impl fmt::Display for ChannelCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.nsl, self.selector)
    }
}

/// Source of the stations a stream should query.
pub trait StationSelection: Send + Sync {
    fn nsls(&self) -> Vec<Nsl>;
}

impl StationSelection for Vec<Nsl> {
    fn nsls(&self) -> Vec<Nsl> {
        self.clone()
    }
}

/// Combine every selected station with the channel selector.
pub fn query_codes(stations: &dyn StationSelection, selector: &ChannelSelector) -> Vec<ChannelCode> {
    stations
        .nsls()
        .into_iter()
        .map(|nsl| ChannelCode {
            nsl,
            selector: selector.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nsl_with_empty_location() {
        let nsl: Nsl = "6E.TE234.".parse().unwrap();
        assert_eq!(nsl.network, "6E");
        assert_eq!(nsl.station, "TE234");
        assert_eq!(nsl.location, "");
        assert_eq!(nsl.to_string(), "6E.TE234.");
    }

    #[test]
    fn test_parse_nsl_two_parts() {
        let nsl: Nsl = ".TE232".parse().unwrap();
        assert_eq!(nsl.network, "");
        assert_eq!(nsl.station, "TE232");
        assert_eq!(nsl.location, "");
    }

    #[test]
    fn test_parse_nsl_invalid_codes() {
        for code in ["6E", "6E5.", "6E.", "6E.TE123112", "A.B.C.D"] {
            assert!(code.parse::<Nsl>().is_err(), "{} should be rejected", code);
        }
    }

    #[test]
    fn test_deserialize_nsl_string_and_array() {
        let yaml = r#"
- "6E.TE234."
- ["6E", "TY123", ""]
- "GR.BFO.00"
"#;
        let nsls: Vec<Nsl> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(nsls.len(), 3);
        assert_eq!(nsls[1].station, "TY123");
        assert_eq!(nsls[2].location, "00");

        let err = serde_yaml::from_str::<Vec<Nsl>>(r#"["6E5.TE1."]"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_selector_wildcards() {
        let selector = ChannelSelector::new("EN?").unwrap();
        assert!(selector.matches("ENZ"));
        assert!(selector.matches("ENE"));
        assert!(!selector.matches("HHZ"));
        assert!(!selector.matches("ENZZ"));

        let any = ChannelSelector::new("*").unwrap();
        assert!(any.matches("HHZ"));
        assert!(any.matches(""));

        let suffix = ChannelSelector::new("*Z").unwrap();
        assert!(suffix.matches("HHZ"));
        assert!(!suffix.matches("HHN"));
    }

    #[test]
    fn test_selector_rejects_long_or_invalid_patterns() {
        assert!(ChannelSelector::new("HHZZ").is_err());
        assert!(ChannelSelector::new("").is_err());
        assert!(ChannelSelector::new("H.Z").is_err());
    }

    #[test]
    fn test_query_codes_combine_stations_and_selector() {
        let stations = vec![
            Nsl::new("6E", "TE01", "").unwrap(),
            Nsl::new("6E", "TE02", "").unwrap(),
        ];
        let selector = ChannelSelector::new("HH?").unwrap();
        let codes = query_codes(&stations, &selector);

        assert_eq!(codes.len(), 2);
        assert_eq!(codes[0].to_string(), "6E.TE01..HH?");
        assert!(codes[1].matches(&stations[1], "HHZ"));
        assert!(!codes[1].matches(&stations[0], "HHZ"));
    }
}
