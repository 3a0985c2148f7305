use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::schedule::{normalize_key, FeeSchedule, FeeScheduleEntry};

/// Activity and level an applicant selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuery {
    pub activity_type: String,
    pub permit_level: String,
    #[serde(default)]
    pub activity_category: Option<String>,
}

impl FeeQuery {
    pub fn new(activity_type: impl Into<String>, permit_level: impl Into<String>) -> Self {
        Self {
            activity_type: activity_type.into(),
            permit_level: permit_level.into(),
            activity_category: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.activity_category = Some(category.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeSource {
    Official,
    Estimated,
}

impl FeeSource {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Official => "official",
            Self::Estimated => "estimated",
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Resolved fees for one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCalculation {
    pub administration_fee: Decimal,
    pub technical_fee: Decimal,
    pub total_fee: Decimal,
    pub administration_form: String,
    pub technical_form: String,
    pub processing_days: u32,
    pub source: FeeSource,
    /// Set on estimates so callers can warn that official processing may change the amount.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_estimated: bool,
    /// Schedule activity the amounts were taken from.
    pub basis_activity: String,
    pub permit_level: String,
}

impl FeeCalculation {
    fn from_entry(entry: &FeeScheduleEntry, source: FeeSource) -> Self {
        Self {
            administration_fee: entry.administration_fee,
            technical_fee: entry.technical_fee,
            total_fee: entry.total_fee(),
            administration_form: entry.administration_form.clone(),
            technical_form: entry.technical_form.clone(),
            processing_days: entry.processing_days,
            source,
            is_estimated: source == FeeSource::Estimated,
            basis_activity: entry.activity_type.clone(),
            permit_level: entry.permit_level.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotCalculableReason {
    MissingActivityType,
    MissingPermitLevel,
    NoScheduleForLevel,
}

impl NotCalculableReason {
    pub const fn describe(self) -> &'static str {
        match self {
            Self::MissingActivityType => "select an activity type",
            Self::MissingPermitLevel => "select a permit level",
            Self::NoScheduleForLevel => "no fees are published for this permit level",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FeeOutcome {
    Calculated(FeeCalculation),
    NotCalculable { reason: NotCalculableReason },
}

impl FeeOutcome {
    pub fn calculation(&self) -> Option<&FeeCalculation> {
        match self {
            FeeOutcome::Calculated(calculation) => Some(calculation),
            FeeOutcome::NotCalculable { .. } => None,
        }
    }
}

/// Looks fees up in the schedule and estimates from a comparable activity when needed.
#[derive(Debug, Clone)]
pub struct FeeCalculator {
    schedule: Arc<FeeSchedule>,
}

impl FeeCalculator {
    pub fn new(schedule: Arc<FeeSchedule>) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &FeeSchedule {
        &self.schedule
    }

    pub fn calculate(&self, query: &FeeQuery) -> FeeOutcome {
        if query.activity_type.trim().is_empty() {
            return FeeOutcome::NotCalculable {
                reason: NotCalculableReason::MissingActivityType,
            };
        }
        if query.permit_level.trim().is_empty() {
            return FeeOutcome::NotCalculable {
                reason: NotCalculableReason::MissingPermitLevel,
            };
        }

        if let Some(entry) = self
            .schedule
            .find_exact(&query.activity_type, &query.permit_level)
        {
            return FeeOutcome::Calculated(FeeCalculation::from_entry(entry, FeeSource::Official));
        }

        match self.nearest(query) {
            Some(entry) => {
                FeeOutcome::Calculated(FeeCalculation::from_entry(entry, FeeSource::Estimated))
            }
            None => FeeOutcome::NotCalculable {
                reason: NotCalculableReason::NoScheduleForLevel,
            },
        }
    }

    /// Same-level entry closest to the requested activity.
    ///
    /// Candidates rank by matching category, then shared words with the requested activity,
    /// then the highest total fee, then activity name ascending so the choice is stable.
    fn nearest(&self, query: &FeeQuery) -> Option<&FeeScheduleEntry> {
        let category = query
            .activity_category
            .as_deref()
            .filter(|category| !category.trim().is_empty())
            .or_else(|| self.schedule.category_of(&query.activity_type))
            .map(normalize_key);
        let wanted = words(&query.activity_type);

        self.schedule
            .for_level(&query.permit_level)
            .map(|entry| {
                let same_category = category
                    .as_deref()
                    .map(|category| normalize_key(&entry.activity_category) == category)
                    .unwrap_or(false);
                let shared = words(&entry.activity_type).intersection(&wanted).count();
                (entry, (same_category, shared, entry.total_fee()))
            })
            .max_by(|(left, left_rank), (right, right_rank)| {
                left_rank
                    .cmp(right_rank)
                    .then_with(|| compare_names(right, left))
            })
            .map(|(entry, _)| entry)
    }
}

fn compare_names(left: &FeeScheduleEntry, right: &FeeScheduleEntry) -> Ordering {
    normalize_key(&left.activity_type).cmp(&normalize_key(&right.activity_type))
}

fn words(raw: &str) -> BTreeSet<String> {
    raw.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}
