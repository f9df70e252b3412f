use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// What a single rewrite touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixCategory {
    FontsNormalized,
    FontsScaled,
    ThemeFontsStripped,
    ColorsConverted,
    TablesOptimized,
    SpacingNormalized,
    IndentsRounded,
    PaginationFixed,
    SectionsNormalized,
    EffectsStripped,
    ImagesNormalized,
    StylesFlattened,
}

impl fmt::Display for FixCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FixCategory::FontsNormalized => "fonts normalized",
            FixCategory::FontsScaled => "font sizes scaled",
            FixCategory::ThemeFontsStripped => "theme fonts stripped",
            FixCategory::ColorsConverted => "colors converted",
            FixCategory::TablesOptimized => "tables optimized",
            FixCategory::SpacingNormalized => "spacing normalized",
            FixCategory::IndentsRounded => "indents rounded",
            FixCategory::PaginationFixed => "pagination fixed",
            FixCategory::SectionsNormalized => "sections normalized",
            FixCategory::EffectsStripped => "effects stripped",
            FixCategory::ImagesNormalized => "images normalized",
            FixCategory::StylesFlattened => "styles flattened",
        };
        f.write_str(s)
    }
}

/// Per-category fix counts for one preprocessing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixCounters(BTreeMap<FixCategory, u64>);

impl FixCounters {
    pub fn add(&mut self, category: FixCategory, n: u64) {
        if n > 0 {
            *self.0.entry(category).or_insert(0) += n;
        }
    }

    pub fn bump(&mut self, category: FixCategory) {
        self.add(category, 1);
    }

    pub fn get(&self, category: FixCategory) -> u64 {
        self.0.get(&category).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn merge(&mut self, other: &FixCounters) {
        for (cat, n) in &other.0 {
            self.add(*cat, *n);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (FixCategory, u64)> + '_ {
        self.0.iter().map(|(c, n)| (*c, *n))
    }
}

impl fmt::Display for FixCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("no fixes");
        }
        let parts: Vec<String> = self.iter().map(|(c, n)| format!("{c}: {n}")).collect();
        f.write_str(&parts.join(", "))
    }
}
