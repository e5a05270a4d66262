use std::fmt::Display;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Quality {
    Low,
    Medium,
    #[default]
    High,
    Original,
}

/// Encoder settings a quality profile resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodingParameters {
    pub quality_factor: u8,
    pub speed_preset: &'static str,
}

impl Quality {
    pub const NAMES: [&'static str; 4] = ["low", "medium", "high", "original"];

    pub fn parameters(self) -> EncodingParameters {
        match self {
            Quality::Low => EncodingParameters { quality_factor: 28, speed_preset: "veryfast" },
            Quality::Medium => EncodingParameters { quality_factor: 23, speed_preset: "medium" },
            Quality::High => EncodingParameters { quality_factor: 18, speed_preset: "slow" },
            // lossless target
            Quality::Original => EncodingParameters { quality_factor: 0, speed_preset: "medium" },
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            "original" => Ok(Quality::Original),
            other => Err(format!("unknown quality {:?}; expected one of {}", other, Quality::NAMES.join(", "))),
        }
    }
}

impl Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("{:?}", self).to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters() {
        assert_eq!(Quality::Low.parameters(), EncodingParameters { quality_factor: 28, speed_preset: "veryfast" });
        assert_eq!(Quality::Medium.parameters(), EncodingParameters { quality_factor: 23, speed_preset: "medium" });
        assert_eq!(Quality::High.parameters(), EncodingParameters { quality_factor: 18, speed_preset: "slow" });
        assert_eq!(Quality::Original.parameters(), EncodingParameters { quality_factor: 0, speed_preset: "medium" });
    }

    #[test]
    fn test_from_str() {
        assert_eq!("low".parse::<Quality>(), Ok(Quality::Low));
        assert_eq!(" HIGH ".parse::<Quality>(), Ok(Quality::High));
        assert_eq!("Original".parse::<Quality>(), Ok(Quality::Original));
        assert!("insane".parse::<Quality>().is_err());
    }

    #[test]
    fn test_display() {
        for name in Quality::NAMES {
            assert_eq!(name.parse::<Quality>().unwrap().to_string(), name);
        }
    }
}
