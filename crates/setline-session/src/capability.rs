//! Pure feature predicates over device facts.
//!
//! Callers consult [`supports`] before any lock is taken so that an
//! unsupported platform fails without touching the candidate.

use strum::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::facts::{DeviceFacts, HardwareFamily};

/// Features whose availability depends on platform or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum Feature {
    /// Zone-based security policies.
    SecurityPolicies,
    /// Source, destination and static NAT.
    SecurityNat,
    /// Chassis cluster redundancy groups.
    ChassisCluster,
    /// EVPN instances.
    Evpn,
    /// Virtual chassis membership.
    VirtualChassis,
    /// Security policies using dynamic applications.
    DynamicApplications,
}

/// Errors encountered while parsing a [`Feature`] from text.
pub type FeatureParseError = strum::ParseError;

const FIREWALLS: &[HardwareFamily] = &[
    HardwareFamily::Srx,
    HardwareFamily::VSrx,
    HardwareFamily::JSeries,
];

struct Rule {
    feature: Feature,
    families: &'static [HardwareFamily],
    minimum: Option<(u32, u32)>,
}

const RULES: &[Rule] = &[
    Rule {
        feature: Feature::SecurityPolicies,
        families: FIREWALLS,
        minimum: None,
    },
    Rule {
        feature: Feature::SecurityNat,
        families: FIREWALLS,
        minimum: None,
    },
    Rule {
        feature: Feature::ChassisCluster,
        families: &[HardwareFamily::Srx, HardwareFamily::VSrx],
        minimum: None,
    },
    Rule {
        feature: Feature::DynamicApplications,
        families: &[HardwareFamily::Srx, HardwareFamily::VSrx],
        minimum: Some((12, 1)),
    },
    Rule {
        feature: Feature::Evpn,
        families: &[
            HardwareFamily::Mx,
            HardwareFamily::VMx,
            HardwareFamily::Qfx,
            HardwareFamily::Ex,
            HardwareFamily::Acx,
            HardwareFamily::Ptx,
        ],
        minimum: Some((14, 1)),
    },
    Rule {
        feature: Feature::VirtualChassis,
        families: &[HardwareFamily::Ex, HardwareFamily::Qfx, HardwareFamily::Mx],
        minimum: None,
    },
];

/// Returns true when the device can configure `feature`.
///
/// Deterministic and free of I/O.
#[must_use]
pub fn supports(feature: Feature, facts: &DeviceFacts) -> bool {
    RULES
        .iter()
        .filter(|rule| rule.feature == feature)
        .any(|rule| {
            rule.families.contains(&facts.family())
                && rule
                    .minimum
                    .is_none_or(|(major, minor)| facts.version().at_least(major, minor))
        })
}

/// Error returned by [`require`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{feature} is not supported on {model} running {version}")]
pub struct Unsupported {
    /// Requested feature.
    pub feature: Feature,
    /// Device model.
    pub model: String,
    /// Device software version.
    pub version: String,
}

/// Fails with [`Unsupported`] unless the device supports `feature`.
///
/// # Errors
///
/// Returns [`Unsupported`] naming the feature and the device.
pub fn require(feature: Feature, facts: &DeviceFacts) -> Result<(), Unsupported> {
    if supports(feature, facts) {
        return Ok(());
    }
    Err(Unsupported {
        feature,
        model: facts.model().to_owned(),
        version: facts.version().to_string(),
    })
}
