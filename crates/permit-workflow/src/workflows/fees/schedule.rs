use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One row of the official fee schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeScheduleEntry {
    pub activity_type: String,
    /// Grouping used to pick a comparable activity when no exact entry exists.
    pub activity_category: String,
    pub permit_level: String,
    pub administration_fee: Decimal,
    pub technical_fee: Decimal,
    pub administration_form: String,
    pub technical_form: String,
    pub processing_days: u32,
}

impl FeeScheduleEntry {
    pub fn total_fee(&self) -> Decimal {
        self.administration_fee + self.technical_fee
    }

    pub(crate) fn matches(&self, activity_type: &str, permit_level: &str) -> bool {
        normalize_key(&self.activity_type) == normalize_key(activity_type)
            && normalize_key(&self.permit_level) == normalize_key(permit_level)
    }
}

/// Immutable reference table keyed by `(activity type, permit level)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeeSchedule {
    entries: Vec<FeeScheduleEntry>,
}

type StandardRow = (&'static str, &'static str, &'static str, i64, i64, &'static str, &'static str, u32);

const STANDARD_ROWS: &[StandardRow] = &[
    ("Mining", "Extractive", "Level 1", 250, 750, "ENV-ADM-01", "ENV-TEC-M1", 30),
    ("Mining", "Extractive", "Level 2", 500, 1500, "ENV-ADM-02", "ENV-TEC-M2", 60),
    ("Mining", "Extractive", "Level 3", 1000, 4000, "ENV-ADM-03", "ENV-TEC-M3", 120),
    ("Quarrying", "Extractive", "Level 1", 200, 600, "ENV-ADM-01", "ENV-TEC-Q1", 30),
    ("Quarrying", "Extractive", "Level 2", 400, 1200, "ENV-ADM-02", "ENV-TEC-Q2", 60),
    ("Petroleum Exploration", "Extractive", "Level 2", 750, 2250, "ENV-ADM-02", "ENV-TEC-P2", 90),
    ("Petroleum Exploration", "Extractive", "Level 3", 1500, 6000, "ENV-ADM-03", "ENV-TEC-P3", 150),
    ("Agriculture", "Agriculture", "Level 1", 100, 300, "ENV-ADM-01", "ENV-TEC-A1", 21),
    ("Agriculture", "Agriculture", "Level 2", 250, 750, "ENV-ADM-02", "ENV-TEC-A2", 45),
    ("Forestry", "Agriculture", "Level 1", 150, 450, "ENV-ADM-01", "ENV-TEC-F1", 30),
    ("Forestry", "Agriculture", "Level 2", 350, 1150, "ENV-ADM-02", "ENV-TEC-F2", 60),
    ("Aquaculture", "Agriculture", "Level 1", 100, 250, "ENV-ADM-01", "ENV-TEC-AQ1", 21),
    ("Road Construction", "Infrastructure", "Level 1", 150, 350, "ENV-ADM-01", "ENV-TEC-R1", 30),
    ("Road Construction", "Infrastructure", "Level 2", 300, 900, "ENV-ADM-02", "ENV-TEC-R2", 60),
    ("Power Generation", "Infrastructure", "Level 2", 450, 1350, "ENV-ADM-02", "ENV-TEC-E2", 75),
    ("Manufacturing", "Industrial", "Level 1", 200, 500, "ENV-ADM-01", "ENV-TEC-I1", 30),
    ("Manufacturing", "Industrial", "Level 2", 400, 1100, "ENV-ADM-02", "ENV-TEC-I2", 60),
    ("Waste Management", "Industrial", "Level 2", 350, 1050, "ENV-ADM-02", "ENV-TEC-W2", 60),
];

impl FeeSchedule {
    pub fn new(entries: Vec<FeeScheduleEntry>) -> Result<Self, FeeScheduleImportError> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.activity_type.trim().is_empty() || entry.permit_level.trim().is_empty() {
                return Err(FeeScheduleImportError::InvalidEntry(
                    "activity_type and permit_level are required".to_string(),
                ));
            }
            if entry.administration_fee < Decimal::ZERO || entry.technical_fee < Decimal::ZERO {
                return Err(FeeScheduleImportError::InvalidEntry(format!(
                    "negative fee for {} / {}",
                    entry.activity_type, entry.permit_level
                )));
            }
            let key = (
                normalize_key(&entry.activity_type),
                normalize_key(&entry.permit_level),
            );
            if !seen.insert(key) {
                return Err(FeeScheduleImportError::DuplicateEntry {
                    activity_type: entry.activity_type.clone(),
                    permit_level: entry.permit_level.clone(),
                });
            }
        }
        Ok(Self { entries })
    }

    /// Built-in schedule used when no CSV export is configured.
    pub fn standard() -> Self {
        let entries = STANDARD_ROWS
            .iter()
            .map(
                |&(activity, category, level, admin, technical, admin_form, technical_form, days)| {
                    FeeScheduleEntry {
                        activity_type: activity.to_string(),
                        activity_category: category.to_string(),
                        permit_level: level.to_string(),
                        administration_fee: Decimal::from(admin),
                        technical_fee: Decimal::from(technical),
                        administration_form: admin_form.to_string(),
                        technical_form: technical_form.to_string(),
                        processing_days: days,
                    }
                },
            )
            .collect();
        Self { entries }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, FeeScheduleImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut entries = Vec::new();
        for row in csv_reader.deserialize::<ScheduleRow>() {
            entries.push(row?.into());
        }
        Self::new(entries)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FeeScheduleImportError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn entries(&self) -> &[FeeScheduleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find_exact(&self, activity_type: &str, permit_level: &str) -> Option<&FeeScheduleEntry> {
        self.entries
            .iter()
            .find(|entry| entry.matches(activity_type, permit_level))
    }

    pub fn for_level<'a>(
        &'a self,
        permit_level: &str,
    ) -> impl Iterator<Item = &'a FeeScheduleEntry> + 'a {
        let level = normalize_key(permit_level);
        self.entries
            .iter()
            .filter(move |entry| normalize_key(&entry.permit_level) == level)
    }

    /// Category the schedule assigns to an activity at any level.
    pub fn category_of(&self, activity_type: &str) -> Option<&str> {
        let activity = normalize_key(activity_type);
        self.entries
            .iter()
            .find(|entry| normalize_key(&entry.activity_type) == activity)
            .map(|entry| entry.activity_category.as_str())
    }
}

/// Case-insensitive key with internal whitespace collapsed.
pub(crate) fn normalize_key(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Deserialize)]
struct ScheduleRow {
    activity_type: String,
    activity_category: String,
    permit_level: String,
    #[serde(with = "rust_decimal::serde::str")]
    administration_fee: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    technical_fee: Decimal,
    administration_form: String,
    technical_form: String,
    processing_days: u32,
}

impl From<ScheduleRow> for FeeScheduleEntry {
    fn from(row: ScheduleRow) -> Self {
        Self {
            activity_type: row.activity_type,
            activity_category: row.activity_category,
            permit_level: row.permit_level,
            administration_fee: row.administration_fee,
            technical_fee: row.technical_fee,
            administration_form: row.administration_form,
            technical_form: row.technical_form,
            processing_days: row.processing_days,
        }
    }
}

#[derive(Debug)]
pub enum FeeScheduleImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidEntry(String),
    DuplicateEntry {
        activity_type: String,
        permit_level: String,
    },
}

impl fmt::Display for FeeScheduleImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeeScheduleImportError::Io(err) => write!(f, "failed to read fee schedule: {}", err),
            FeeScheduleImportError::Csv(err) => write!(f, "invalid fee schedule CSV: {}", err),
            FeeScheduleImportError::InvalidEntry(reason) => {
                write!(f, "invalid fee schedule entry: {}", reason)
            }
            FeeScheduleImportError::DuplicateEntry {
                activity_type,
                permit_level,
            } => write!(
                f,
                "fee schedule lists {} / {} more than once",
                activity_type, permit_level
            ),
        }
    }
}

impl std::error::Error for FeeScheduleImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FeeScheduleImportError::Io(err) => Some(err),
            FeeScheduleImportError::Csv(err) => Some(err),
            FeeScheduleImportError::InvalidEntry(_) | FeeScheduleImportError::DuplicateEntry { .. } => {
                None
            }
        }
    }
}

impl From<std::io::Error> for FeeScheduleImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for FeeScheduleImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}
