//! Device facts captured once when a session opens.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::rpc::{ReplyParseError, scan};

/// Hardware platform family derived from the model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareFamily {
    /// SRX services gateways.
    Srx,
    /// Virtual SRX.
    VSrx,
    /// J-series services routers.
    JSeries,
    /// MX routers.
    Mx,
    /// Virtual MX.
    VMx,
    /// EX switches.
    Ex,
    /// QFX switches.
    Qfx,
    /// PTX packet transport routers.
    Ptx,
    /// ACX access routers.
    Acx,
    /// Anything else.
    Other,
}

impl HardwareFamily {
    /// Classifies a model name such as `mx480` or `vSRX`.
    #[must_use]
    pub fn from_model(model: &str) -> Self {
        let model = model.trim().to_ascii_lowercase();
        let prefixes: [(&str, Self); 9] = [
            ("vsrx", Self::VSrx),
            ("firefly-perimeter", Self::VSrx),
            ("srx", Self::Srx),
            ("vmx", Self::VMx),
            ("mx", Self::Mx),
            ("ex", Self::Ex),
            ("qfx", Self::Qfx),
            ("ptx", Self::Ptx),
            ("acx", Self::Acx),
        ];
        if let Some((_, family)) = prefixes.iter().find(|(prefix, _)| model.starts_with(prefix)) {
            return *family;
        }
        let mut chars = model.chars();
        if chars.next() == Some('j') && chars.next().is_some_and(|c| c.is_ascii_digit()) {
            return Self::JSeries;
        }
        Self::Other
    }

    /// Returns the marketing name of the family.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Srx => "SRX",
            Self::VSrx => "vSRX",
            Self::JSeries => "J-series",
            Self::Mx => "MX",
            Self::VMx => "vMX",
            Self::Ex => "EX",
            Self::Qfx => "QFX",
            Self::Ptx => "PTX",
            Self::Acx => "ACX",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for HardwareFamily {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Error returned when a version string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised software version '{input}'")]
pub struct VersionParseError {
    input: String,
}

/// Software release such as `21.4R3-S2.3` or `12.1X46-D40.2`.
///
/// Ordering compares major, minor and then the numeric components of the
/// remainder; the release letter breaks ties.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SoftwareVersion {
    major: u32,
    minor: u32,
    release: Option<char>,
    components: Vec<u32>,
    raw: String,
}

impl SoftwareVersion {
    /// Creates a bare `major.minor` version.
    #[must_use]
    pub fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            release: None,
            components: Vec::new(),
            raw: format!("{major}.{minor}"),
        }
    }

    /// Returns the major number.
    #[must_use]
    pub const fn major(&self) -> u32 {
        self.major
    }

    /// Returns the minor number.
    #[must_use]
    pub const fn minor(&self) -> u32 {
        self.minor
    }

    /// Returns the release type letter (`R`, `X`, `F`, …).
    #[must_use]
    pub const fn release(&self) -> Option<char> {
        self.release
    }

    /// Returns true when this version is at least `major.minor`.
    #[must_use]
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl FromStr for SoftwareVersion {
    type Err = VersionParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let raw = input.trim();
        let invalid = || VersionParseError {
            input: input.to_owned(),
        };
        let (major, rest) = raw.split_once('.').ok_or_else(invalid)?;
        let major = major.parse().map_err(|_| invalid())?;
        let digits = rest.chars().take_while(char::is_ascii_digit).count();
        let (minor, rest) = rest.split_at(digits);
        let minor = minor.parse().map_err(|_| invalid())?;
        let mut remainder = rest.chars();
        let release = remainder.next().filter(char::is_ascii_alphabetic);
        let components = remainder
            .as_str()
            .split(|c: char| !c.is_ascii_digit())
            .filter(|part| !part.is_empty())
            .filter_map(|part| part.parse().ok())
            .collect();
        Ok(Self {
            major,
            minor,
            release: release.map(|c| c.to_ascii_uppercase()),
            components,
            raw: raw.to_owned(),
        })
    }
}

impl PartialOrd for SoftwareVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SoftwareVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, &self.components, self.release, &self.raw).cmp(&(
            other.major,
            other.minor,
            &other.components,
            other.release,
            &other.raw,
        ))
    }
}

impl fmt::Display for SoftwareVersion {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.raw)
    }
}

/// Errors raised while reading facts from a software-information reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FactsError {
    /// The reply was not well-formed.
    #[error(transparent)]
    Reply(#[from] ReplyParseError),
    /// No hardware model was reported.
    #[error("software information carries no product model")]
    MissingModel,
    /// No software version was reported.
    #[error("software information carries no software version")]
    MissingVersion,
    /// The reported version could not be parsed.
    #[error(transparent)]
    Version(#[from] VersionParseError),
}

/// Immutable hardware and software facts for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFacts {
    hostname: Option<String>,
    model: String,
    family: HardwareFamily,
    version: SoftwareVersion,
}

impl DeviceFacts {
    /// Creates facts from a model name and version.
    #[must_use]
    pub fn new(model: impl Into<String>, version: SoftwareVersion) -> Self {
        let model = model.into();
        Self {
            hostname: None,
            family: HardwareFamily::from_model(&model),
            model,
            version,
        }
    }

    /// Attaches the device host name.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Reads facts from a `get-software-information` reply.
    ///
    /// Multi-routing-engine replies report one entry per engine; the first
    /// engine's values are used. Older releases only report the version in
    /// the bracketed package comment, which is used as a fallback.
    ///
    /// # Errors
    ///
    /// Returns [`FactsError`] when the model or version is missing or invalid.
    pub fn from_reply(xml: &str) -> Result<Self, FactsError> {
        let elements = scan(xml)?;
        let first = |name: &str| {
            elements
                .iter()
                .find(|element| element.name() == name)
                .map(|element| element.text().trim().to_owned())
                .filter(|text| !text.is_empty())
        };

        let model = first("product-model").ok_or(FactsError::MissingModel)?;
        let version_text = first("junos-version")
            .or_else(|| {
                elements
                    .iter()
                    .filter(|element| element.name() == "comment")
                    .find_map(|element| bracketed(element.text()))
            })
            .ok_or(FactsError::MissingVersion)?;
        let version: SoftwareVersion = version_text.parse()?;

        let facts = Self::new(model, version);
        Ok(match first("host-name") {
            Some(hostname) => facts.with_hostname(hostname),
            None => facts,
        })
    }

    /// Returns the host name, when reported.
    #[must_use]
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Returns the hardware model.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the hardware family.
    #[must_use]
    pub const fn family(&self) -> HardwareFamily {
        self.family
    }

    /// Returns the software version.
    #[must_use]
    pub const fn version(&self) -> &SoftwareVersion {
        &self.version
    }
}

fn bracketed(text: &str) -> Option<String> {
    let (_, rest) = text.split_once('[')?;
    let (inner, _) = rest.split_once(']')?;
    Some(inner.trim().to_owned())
}
