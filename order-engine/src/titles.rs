//! Title catalog and promotion evaluation
//!
//! Titles are reference rows seeded into the store on first open and held
//! in memory afterwards. Promotion is a pure function of the catalog and a
//! lit-province count, so the engine can evaluate it inside a unit of work
//! without extra reads.

use crate::config::TitleSeed;
use market_core::{Error, Result, Storage, Title};

/// In-memory title catalog, ordered by level ascending
#[derive(Debug, Clone)]
pub struct TitleCatalog {
    titles: Vec<Title>,
}

impl TitleCatalog {
    /// Load the catalog from storage, seeding it from `seeds` on first open.
    ///
    /// Stored rows win over seeds on later opens, so a running deployment
    /// keeps its catalog even if the config changes.
    pub fn open(storage: &Storage, seeds: &[TitleSeed]) -> Result<Self> {
        let mut titles = storage.titles()?;

        if titles.is_empty() {
            titles = seeds
                .iter()
                .map(|seed| Title {
                    level: seed.level,
                    name: seed.name.clone(),
                    required_provinces: seed.required_provinces,
                })
                .collect();
            validate(&titles)?;

            let mut unit = storage.begin_unit();
            for title in &titles {
                unit.stage_title(title)?;
            }
            unit.commit()?;
            tracing::info!(titles = titles.len(), "Seeded title catalog");
        } else {
            validate(&titles)?;
        }

        Ok(Self { titles })
    }

    /// All titles, level ascending
    pub fn all(&self) -> &[Title] {
        &self.titles
    }

    /// Title at an exact level
    pub fn by_level(&self, level: u8) -> Option<&Title> {
        self.titles.iter().find(|t| t.level == level)
    }

    /// The title one level above the given one
    pub fn next_after(&self, level: u8) -> Option<&Title> {
        level.checked_add(1).and_then(|next| self.by_level(next))
    }
}

/// The highest title whose threshold is within the lit-province count.
///
/// Returns `None` when no threshold is met yet. Promotion compares the
/// result against the account's current level and only ever moves up.
pub fn qualifying_title(titles: &[Title], provinces_lit: u32) -> Option<&Title> {
    titles
        .iter()
        .rev()
        .find(|t| t.required_provinces <= provinces_lit)
}

/// Catalog rows must be strictly increasing in both level and threshold
fn validate(titles: &[Title]) -> Result<()> {
    for title in titles {
        if title.name.trim().is_empty() {
            return Err(Error::Config(format!(
                "title at level {} has a blank name",
                title.level
            )));
        }
    }
    for pair in titles.windows(2) {
        if pair[1].level <= pair[0].level {
            return Err(Error::Config(format!(
                "title levels must be strictly increasing: {} then {}",
                pair[0].level, pair[1].level
            )));
        }
        if pair[1].required_provinces <= pair[0].required_provinces {
            return Err(Error::Config(format!(
                "title thresholds must be strictly increasing: {} then {}",
                pair[0].required_provinces, pair[1].required_provinces
            )));
        }
    }
    Ok(())
}
