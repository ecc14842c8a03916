//! Simulation scenarios for the tracking pipeline.

use crate::error::SimError;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Stationary device inside a ring of access points
    StaticDevice,

    /// Device walking through an access point grid
    Walk,

    /// Only one access point in range
    SingleAp,

    /// One access point disappears and comes back
    ApOutage,

    /// Scanning pauses longer than the staleness window
    StaleGap,

    /// Reference fixes of mixed quality
    NoisyReference,
}

impl ScenarioId {
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::StaticDevice,
            ScenarioId::Walk,
            ScenarioId::SingleAp,
            ScenarioId::ApOutage,
            ScenarioId::StaleGap,
            ScenarioId::NoisyReference,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::StaticDevice => "static_device",
            ScenarioId::Walk => "walk",
            ScenarioId::SingleAp => "single_ap",
            ScenarioId::ApOutage => "ap_outage",
            ScenarioId::StaleGap => "stale_gap",
            ScenarioId::NoisyReference => "noisy_reference",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::StaticDevice => {
                "Stationary device, 4 APs, 2 dB shadowing; mean error under 25 m"
            }
            ScenarioId::Walk => "Walk at 1.2 m/s through a 6-AP grid; estimate follows the device",
            ScenarioId::SingleAp => "One AP in range; every estimate is a uniform 36-point ring",
            ScenarioId::ApOutage => {
                "AP hidden then restored, plus a radio timeout; both topology changes accepted"
            }
            ScenarioId::StaleGap => {
                "Identical scans rejected until a gap longer than the staleness window"
            }
            ScenarioId::NoisyReference => {
                "Alternating 5 m / 40 m reference fixes; coarse fixes rejected"
            }
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "static_device" | "static" => Ok(ScenarioId::StaticDevice),
            "walk" => Ok(ScenarioId::Walk),
            "single_ap" => Ok(ScenarioId::SingleAp),
            "ap_outage" | "outage" => Ok(ScenarioId::ApOutage),
            "stale_gap" | "stale" => Ok(ScenarioId::StaleGap),
            "noisy_reference" => Ok(ScenarioId::NoisyReference),
            _ => Err(SimError::UnknownScenario(s.to_string())),
        }
    }
}
