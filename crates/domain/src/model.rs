//! Hosted model references.

use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// `owner/name` or `owner/name:version`.
///
/// A reference with a version targets that exact build; without one the
/// hosted API runs the model's latest published version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelRef {
    pub owner: String,
    pub name: String,
    pub version: Option<String>,
}

impl ModelRef {
    pub fn is_versioned(&self) -> bool {
        self.version.is_some()
    }
}

impl FromStr for ModelRef {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let (path, version) = match raw.split_once(':') {
            Some((path, version)) => {
                let version = version.trim();
                if version.is_empty() {
                    return Err(DomainError::parse(format!(
                        "model reference '{}' has an empty version",
                        raw
                    )));
                }
                (path, Some(version.to_string()))
            }
            None => (raw, None),
        };
        let (owner, name) = path
            .split_once('/')
            .filter(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'))
            .ok_or_else(|| {
                DomainError::parse(format!(
                    "model reference '{}' must look like owner/name[:version]",
                    raw
                ))
            })?;
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            version,
        })
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)?;
        if let Some(version) = &self.version {
            write!(f, ":{}", version)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_versioned_reference() {
        let model: ModelRef = "stability-ai/sdxl:39ed52f2a78e934b3ba6e2a89f5b1c712de7dfea535525255b1aa35c5565e08b"
            .parse()
            .expect("valid ref");
        assert_eq!(model.owner, "stability-ai");
        assert_eq!(model.name, "sdxl");
        assert!(model.is_versioned());
    }

    #[test]
    fn parses_latest_reference() {
        let model: ModelRef = "black-forest-labs/flux-dev".parse().expect("valid ref");
        assert_eq!(model.version, None);
        assert_eq!(model.to_string(), "black-forest-labs/flux-dev");
    }

    #[test]
    fn rejects_malformed_references() {
        for raw in ["", "sdxl", "/sdxl", "owner/", "a/b/c", "owner/name:"] {
            assert!(raw.parse::<ModelRef>().is_err(), "{raw} should fail");
        }
    }
}
