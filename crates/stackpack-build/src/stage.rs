//! The fixed build stage order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One build stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Target is active and has enabled members.
    Validation,
    /// Configurations loaded, variables resolved, dependency rules checked.
    Configuration,
    /// Configuration files rendered or copied.
    TemplateRender,
    /// Assets embedded or deferred.
    AssetResolution,
    /// Member compose fragments merged.
    ComposeMerge,
    /// Merged document linted in strict mode.
    Linting,
    /// Bundle assembled and uploaded.
    Packaging,
}

impl Stage {
    /// Every stage, in execution order.
    pub const ALL: [Self; 7] = [
        Self::Validation,
        Self::Configuration,
        Self::TemplateRender,
        Self::AssetResolution,
        Self::ComposeMerge,
        Self::Linting,
        Self::Packaging,
    ];

    /// Stage name as persisted in status strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Configuration => "configuration",
            Self::TemplateRender => "template_render",
            Self::AssetResolution => "asset_resolution",
            Self::ComposeMerge => "compose_merge",
            Self::Linting => "linting",
            Self::Packaging => "packaging",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown stage: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_is_fixed() {
        let names: Vec<_> = Stage::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            [
                "validation",
                "configuration",
                "template_render",
                "asset_resolution",
                "compose_merge",
                "linting",
                "packaging"
            ]
        );
        assert!(Stage::ALL.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn parse_round_trips_names() {
        assert_eq!("compose_merge".parse::<Stage>(), Ok(Stage::ComposeMerge));
        assert!("deploy".parse::<Stage>().is_err());
    }
}
