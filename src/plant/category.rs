use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of green the plant is; drives weather sensitivity and care gain.
///
/// Stored values that match no known category deserialize to `Unknown`,
/// which uses the default transition row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Tree,
    Flowerbed,
    VerticalGarden,
    Hedge,
    Bush,
    Potted,
    Succulent,
    #[serde(other)]
    Unknown,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Tree,
        Category::Flowerbed,
        Category::VerticalGarden,
        Category::Hedge,
        Category::Bush,
        Category::Potted,
        Category::Succulent,
        Category::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Tree => "tree",
            Category::Flowerbed => "flowerbed",
            Category::VerticalGarden => "vertical_garden",
            Category::Hedge => "hedge",
            Category::Bush => "bush",
            Category::Potted => "potted",
            Category::Succulent => "succulent",
            Category::Unknown => "unknown",
        }
    }

    /// Parse a stored category name; anything unrecognized maps to `Unknown`.
    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == name)
            .unwrap_or(Category::Unknown)
    }

    /// Level gained by a care action when no explicit amount is given.
    pub fn care_amount(&self) -> i32 {
        match self {
            Category::Tree | Category::Flowerbed | Category::VerticalGarden => 20,
            Category::Hedge | Category::Bush => 30,
            Category::Potted => 40,
            Category::Succulent => 15,
            Category::Unknown => 20,
        }
    }

    pub fn care_kind(&self) -> CareKind {
        match self {
            Category::Hedge | Category::Bush => CareKind::Prune,
            Category::Potted | Category::Succulent => CareKind::Treat,
            _ => CareKind::Water,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a user care action looks like for a category
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CareKind {
    Water,
    Prune,
    Treat,
}
