use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Morphological model family, ordered by complexity
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum ModelFamily {
    PointSource = 1,
    CompactGalaxy = 2,
    ExpGalaxy = 3,
    DevGalaxy = 4,
    CompositeGalaxy = 5,
}

impl ModelFamily {
    pub const ALL: [Self; 5] = [
        Self::PointSource,
        Self::CompactGalaxy,
        Self::ExpGalaxy,
        Self::DevGalaxy,
        Self::CompositeGalaxy,
    ];

    /// Numeric identifier, 1 to 5
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|family| family.id() == id)
    }

    /// Next more complex family
    pub fn next(self) -> Option<Self> {
        Self::from_id(self.id() + 1)
    }

    /// Catalog name of the family
    pub fn name(self) -> &'static str {
        match self {
            Self::PointSource => "PointSource",
            Self::CompactGalaxy => "SimpleGalaxy",
            Self::ExpGalaxy => "ExpGalaxy",
            Self::DevGalaxy => "DevGalaxy",
            Self::CompositeGalaxy => "CompositeGalaxy",
        }
    }

    /// Families with a free shape, which get shape columns in the catalog
    pub fn is_extended(self) -> bool {
        matches!(
            self,
            Self::ExpGalaxy | Self::DevGalaxy | Self::CompositeGalaxy
        )
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
