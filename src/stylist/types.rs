use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use image::DynamicImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    Top,
    Bottom,
    Shoes,
    Jacket,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Top => "top",
            ItemType::Bottom => "bottom",
            ItemType::Shoes => "shoes",
            ItemType::Jacket => "jacket",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ItemType::Top => "Top",
            ItemType::Bottom => "Bottom",
            ItemType::Shoes => "Shoes",
            ItemType::Jacket => "Jacket",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "top" | "shirt" => Ok(ItemType::Top),
            "bottom" | "pants" | "skirt" => Ok(ItemType::Bottom),
            "shoes" | "shoe" => Ok(ItemType::Shoes),
            "jacket" | "coat" => Ok(ItemType::Jacket),
            other => Err(format!("unknown clothing item '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gender {
    #[default]
    Unisex,
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Unisex => "unisex",
            Gender::Female => "female",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClothingDescription {
    pub item_type: ItemType,
    pub text: String,
    pub inferred_gender: Gender,
}

/// Result of describing one garment photo.
///
/// A fallback carries a usable placeholder description, so the pipeline can
/// always proceed; the reason is kept for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptionOutcome {
    Described(ClothingDescription),
    Fallback {
        description: ClothingDescription,
        reason: String,
    },
}

impl DescriptionOutcome {
    pub fn description(&self) -> &ClothingDescription {
        match self {
            DescriptionOutcome::Described(description) => description,
            DescriptionOutcome::Fallback { description, .. } => description,
        }
    }

    pub fn into_description(self) -> ClothingDescription {
        match self {
            DescriptionOutcome::Described(description) => description,
            DescriptionOutcome::Fallback { description, .. } => description,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, DescriptionOutcome::Fallback { .. })
    }
}

/// Source photos for one outfit. The jacket is optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutfitImages {
    pub top: PathBuf,
    pub bottom: PathBuf,
    pub shoes: PathBuf,
    pub jacket: Option<PathBuf>,
}

impl OutfitImages {
    pub fn iter(&self) -> impl Iterator<Item = (ItemType, &PathBuf)> {
        [
            (ItemType::Top, Some(&self.top)),
            (ItemType::Bottom, Some(&self.bottom)),
            (ItemType::Shoes, Some(&self.shoes)),
            (ItemType::Jacket, self.jacket.as_ref()),
        ]
        .into_iter()
        .filter_map(|(item, path)| path.map(|path| (item, path)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutfitDescriptions {
    pub top: ClothingDescription,
    pub bottom: ClothingDescription,
    pub shoes: ClothingDescription,
    pub jacket: Option<ClothingDescription>,
}

impl OutfitDescriptions {
    pub fn iter(&self) -> impl Iterator<Item = &ClothingDescription> {
        [
            Some(&self.top),
            Some(&self.bottom),
            Some(&self.shoes),
            self.jacket.as_ref(),
        ]
        .into_iter()
        .flatten()
    }

    /// Female if any garment inferred so; kept as bookkeeping only.
    pub fn inferred_gender(&self) -> Gender {
        if self.iter().any(|item| item.inferred_gender == Gender::Female) {
            Gender::Female
        } else {
            Gender::Unisex
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub bitmap: DynamicImage,
    pub seed: u64,
}
