//! Reference data for the hiring pipeline: stages and the named statuses inside them.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Catalog-wide unique status identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusId(pub u32);

impl std::fmt::Display for StatusId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse phase of the hiring pipeline. Declaration order is display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Applied,
    Screen,
    Interview,
    Offer,
    Outcome,
}

impl Stage {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::Applied,
            Self::Screen,
            Self::Interview,
            Self::Offer,
            Self::Outcome,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Applied => "Applied",
            Self::Screen => "Screen",
            Self::Interview => "Interview",
            Self::Offer => "Offer",
            Self::Outcome => "Outcome",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "APPLIED" => Some(Self::Applied),
            "SCREEN" => Some(Self::Screen),
            "INTERVIEW" => Some(Self::Interview),
            "OFFER" => Some(Self::Offer),
            "OUTCOME" => Some(Self::Outcome),
            _ => None,
        }
    }
}

/// A named point inside a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: StatusId,
    pub stage: Stage,
    pub name: String,
    /// Sort hint only; transitions are never validated against it.
    pub rank: i32,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        self.stage == Stage::Outcome
    }
}

/// Statuses of one stage, in catalog order.
#[derive(Debug, Clone, Serialize)]
pub struct StageGroupView {
    pub stage: Stage,
    pub stage_label: &'static str,
    pub statuses: Vec<Status>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read status catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid status catalog CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("unknown stage '{value}' for status '{name}'")]
    UnknownStage { value: String, name: String },
    #[error("status id {id} appears more than once")]
    DuplicateStatus { id: StatusId },
    #[error("status catalog is empty")]
    Empty,
    #[error("status {id} is not in the catalog")]
    UnknownStatus { id: StatusId },
    #[error("status {id} needs an explicit rank")]
    RankOutOfRange { id: StatusId },
}

const STANDARD_STATUSES: &[(Stage, &str)] = &[
    (Stage::Applied, "Applied"),
    (Stage::Applied, "Applied with referral"),
    (Stage::Screen, "Phone screen"),
    (Stage::Screen, "Online assessment"),
    (Stage::Interview, "Technical interview"),
    (Stage::Interview, "Behavioral interview"),
    (Stage::Interview, "Hiring manager interview"),
    (Stage::Offer, "Offer"),
    (Stage::Outcome, "Rejected"),
    (Stage::Outcome, "Offer accepted"),
    (Stage::Outcome, "Offer refused"),
    (Stage::Outcome, "No response"),
];

/// Immutable, ordered status catalog.
#[derive(Debug, Clone)]
pub struct StatusCatalog {
    statuses: Vec<Status>,
    index: HashMap<StatusId, usize>,
}

impl StatusCatalog {
    pub fn new(statuses: Vec<Status>) -> Result<Self, CatalogError> {
        if statuses.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut index = HashMap::with_capacity(statuses.len());
        for (position, status) in statuses.iter().enumerate() {
            if index.insert(status.id, position).is_some() {
                return Err(CatalogError::DuplicateStatus { id: status.id });
            }
        }

        Ok(Self { statuses, index })
    }

    /// The default hiring pipeline; ids start at 1 and rank follows id.
    pub fn standard() -> Self {
        let statuses = STANDARD_STATUSES
            .iter()
            .zip(1u8..)
            .map(|(&(stage, name), id)| Status {
                id: StatusId(u32::from(id)),
                stage,
                name: name.to_string(),
                rank: i32::from(id),
            })
            .collect::<Vec<_>>();
        let index = statuses
            .iter()
            .enumerate()
            .map(|(position, status)| (status.id, position))
            .collect();
        Self { statuses, index }
    }

    /// Load a catalog from CSV with an `id,stage,name,rank` header. `rank` may be blank.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, CatalogError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut statuses = Vec::new();
        for row in csv_reader.deserialize::<CatalogRow>() {
            let row = row?;
            let stage = Stage::parse(&row.stage).ok_or_else(|| CatalogError::UnknownStage {
                value: row.stage.clone(),
                name: row.name.clone(),
            })?;
            let rank = match row.rank {
                Some(rank) => rank,
                None => i32::try_from(row.id).map_err(|_| CatalogError::RankOutOfRange {
                    id: StatusId(row.id),
                })?,
            };
            statuses.push(Status {
                id: StatusId(row.id),
                stage,
                rank,
                name: row.name,
            });
        }

        Self::new(statuses)
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let file = File::open(path)?;
        Self::from_csv_reader(file)
    }

    pub fn all_statuses(&self) -> &[Status] {
        &self.statuses
    }

    pub fn status_by_id(&self, id: StatusId) -> Result<&Status, CatalogError> {
        self.index
            .get(&id)
            .map(|&position| &self.statuses[position])
            .ok_or(CatalogError::UnknownStatus { id })
    }

    pub fn contains(&self, id: StatusId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Statuses grouped by stage, keeping catalog order within each stage.
    pub fn statuses_by_stage(&self) -> BTreeMap<Stage, Vec<&Status>> {
        let mut groups: BTreeMap<Stage, Vec<&Status>> = BTreeMap::new();
        for status in &self.statuses {
            groups.entry(status.stage).or_default().push(status);
        }
        groups
    }

    pub fn grouped_view(&self) -> Vec<StageGroupView> {
        self.statuses_by_stage()
            .into_iter()
            .map(|(stage, statuses)| StageGroupView {
                stage,
                stage_label: stage.label(),
                statuses: statuses.into_iter().cloned().collect(),
            })
            .collect()
    }

    /// Compare two statuses by stage, then rank. `None` if either is unknown.
    pub fn compare_rank(&self, left: StatusId, right: StatusId) -> Option<Ordering> {
        let left = self.status_by_id(left).ok()?;
        let right = self.status_by_id(right).ok()?;
        Some(
            left.stage
                .cmp(&right.stage)
                .then(left.rank.cmp(&right.rank)),
        )
    }

    /// Statuses a picker offers by default from `current`: same or later rank.
    pub fn forward_options(
        &self,
        current: StatusId,
    ) -> Result<BTreeMap<Stage, Vec<&Status>>, CatalogError> {
        let current = self.status_by_id(current)?.id;
        let mut groups = self.statuses_by_stage();
        for statuses in groups.values_mut() {
            statuses.retain(|status| {
                matches!(
                    self.compare_rank(status.id, current),
                    Some(Ordering::Greater | Ordering::Equal)
                )
            });
        }
        groups.retain(|_, statuses| !statuses.is_empty());
        Ok(groups)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    id: u32,
    stage: String,
    name: String,
    #[serde(default)]
    rank: Option<i32>,
}
