use std::cmp::Ordering;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::{FcType, FsType, LevelIndex, RateType, Score, SongType};

pub const CLEAR_ACHIEVEMENTS: f64 = 80.0;

pub const LEVEL_BOUNDS: [f64; 2] = [1.0, 15.0];
pub const DX_RATING_BOUNDS: [f64; 2] = [0.0, 400.0];

/// Categorical lists act as "any of"; an empty list does not constrain.
/// Ranges are inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    pub difficulties: Vec<LevelIndex>,
    pub song_types: Vec<SongType>,
    pub genres: Vec<String>,
    pub versions: Vec<u32>,
    pub fc: Vec<FcType>,
    pub fs: Vec<FsType>,
    pub rates: Vec<RateType>,
    pub level_range: [f64; 2],
    pub dx_rating_range: [f64; 2],
    pub cleared_only: bool,
    pub upload_time: Option<[NaiveDate; 2]>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            difficulties: LevelIndex::ALL.to_vec(),
            song_types: vec![SongType::Standard, SongType::Dx],
            genres: Vec::new(),
            versions: Vec::new(),
            fc: Vec::new(),
            fs: Vec::new(),
            rates: Vec::new(),
            level_range: LEVEL_BOUNDS,
            dx_rating_range: DX_RATING_BOUNDS,
            cleared_only: false,
            upload_time: None,
        }
    }
}

impl FilterState {
    pub fn seeded(seed: &FilterSeed) -> Self {
        let mut state = Self::default();
        state.merge(seed);
        state
    }

    fn merge(&mut self, seed: &FilterSeed) {
        let seed = seed.clone();
        if let Some(v) = seed.difficulties {
            self.difficulties = v;
        }
        if let Some(v) = seed.song_types {
            self.song_types = v;
        }
        if let Some(v) = seed.genres {
            self.genres = v;
        }
        if let Some(v) = seed.versions {
            self.versions = v;
        }
        if let Some(v) = seed.fc {
            self.fc = v;
        }
        if let Some(v) = seed.fs {
            self.fs = v;
        }
        if let Some(v) = seed.rates {
            self.rates = v;
        }
        if let Some(v) = seed.level_range {
            self.level_range = v;
        }
        if let Some(v) = seed.dx_rating_range {
            self.dx_rating_range = v;
        }
        if let Some(v) = seed.cleared_only {
            self.cleared_only = v;
        }
        if let Some(v) = seed.upload_time {
            self.upload_time = Some(v);
        }
    }

    fn apply(&mut self, update: FilterUpdate) {
        match update {
            FilterUpdate::Difficulties(v) => self.difficulties = v,
            FilterUpdate::SongTypes(v) => self.song_types = v,
            FilterUpdate::Genres(v) => self.genres = v,
            FilterUpdate::Versions(v) => self.versions = v,
            FilterUpdate::Fc(v) => self.fc = v,
            FilterUpdate::Fs(v) => self.fs = v,
            FilterUpdate::Rates(v) => self.rates = v,
            FilterUpdate::LevelRange(v) => self.level_range = v,
            FilterUpdate::DxRatingRange(v) => self.dx_rating_range = v,
            FilterUpdate::ClearedOnly(v) => self.cleared_only = v,
            FilterUpdate::UploadTime(v) => self.upload_time = v,
        }
    }

    pub fn matches(&self, score: &Score) -> bool {
        any_of(&self.difficulties, &score.level_index)
            && any_of(&self.song_types, &score.song_type)
            && optional_any_of(&self.genres, score.genre.as_ref())
            && optional_any_of(&self.versions, score.version.as_ref())
            && optional_any_of(&self.fc, score.fc.as_ref())
            && optional_any_of(&self.fs, score.fs.as_ref())
            && any_of(&self.rates, &score.rate)
            && within(self.level_range, score.level_value())
            && within(self.dx_rating_range, score.dx_rating)
            && (!self.cleared_only || score.achievements >= CLEAR_ACHIEVEMENTS)
            && self.upload_time.is_none_or(|[from, to]| {
                score
                    .upload_time
                    .map(|at| at.date_naive())
                    .is_some_and(|day| day >= from && day <= to)
            })
    }
}

fn any_of<T: PartialEq>(allowed: &[T], value: &T) -> bool {
    allowed.is_empty() || allowed.contains(value)
}

fn optional_any_of<T: PartialEq>(allowed: &[T], value: Option<&T>) -> bool {
    allowed.is_empty() || value.is_some_and(|value| allowed.contains(value))
}

fn within([min, max]: [f64; 2], value: f64) -> bool {
    value >= min && value <= max
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterUpdate {
    Difficulties(Vec<LevelIndex>),
    SongTypes(Vec<SongType>),
    Genres(Vec<String>),
    Versions(Vec<u32>),
    Fc(Vec<FcType>),
    Fs(Vec<FsType>),
    Rates(Vec<RateType>),
    LevelRange([f64; 2]),
    DxRatingRange([f64; 2]),
    ClearedOnly(bool),
    UploadTime(Option<[NaiveDate; 2]>),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSeed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulties: Option<Vec<LevelIndex>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub song_types: Option<Vec<SongType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genres: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versions: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fc: Option<Vec<FcType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fs: Option<Vec<FsType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rates: Option<Vec<RateType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_range: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dx_rating_range: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleared_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_time: Option<[NaiveDate; 2]>,
}

impl FilterSeed {
    pub fn from_state(state: &FilterState) -> Self {
        let defaults = FilterState::default();
        fn changed<T: PartialEq + Clone>(value: &T, default: &T) -> Option<T> {
            (value != default).then(|| value.clone())
        }
        Self {
            difficulties: changed(&state.difficulties, &defaults.difficulties),
            song_types: changed(&state.song_types, &defaults.song_types),
            genres: changed(&state.genres, &defaults.genres),
            versions: changed(&state.versions, &defaults.versions),
            fc: changed(&state.fc, &defaults.fc),
            fs: changed(&state.fs, &defaults.fs),
            rates: changed(&state.rates, &defaults.rates),
            level_range: changed(&state.level_range, &defaults.level_range),
            dx_rating_range: changed(&state.dx_rating_range, &defaults.dx_rating_range),
            cleared_only: changed(&state.cleared_only, &defaults.cleared_only),
            upload_time: state.upload_time,
        }
    }

    pub fn to_json(&self) -> Result<String, ApiError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, ApiError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterAction {
    Set(FilterUpdate),
    Reset(FilterSeed),
}

pub fn reduce(state: &FilterState, action: FilterAction) -> FilterState {
    match action {
        FilterAction::Set(update) => {
            let mut next = state.clone();
            next.apply(update);
            next
        }
        FilterAction::Reset(seed) => FilterState::seeded(&seed),
    }
}

#[derive(Debug, Clone)]
pub struct ScoreFilterStore {
    initial: Arc<FilterState>,
    current: Arc<FilterState>,
}

impl Default for ScoreFilterStore {
    fn default() -> Self {
        Self::new(FilterSeed::default())
    }
}

impl ScoreFilterStore {
    pub fn new(overrides: FilterSeed) -> Self {
        let initial = Arc::new(FilterState::seeded(&overrides));
        Self {
            current: Arc::clone(&initial),
            initial,
        }
    }

    pub fn dispatch(&mut self, action: FilterAction) -> Arc<FilterState> {
        self.current = Arc::new(reduce(&self.current, action));
        Arc::clone(&self.current)
    }

    pub fn set(&mut self, update: FilterUpdate) -> Arc<FilterState> {
        self.dispatch(FilterAction::Set(update))
    }

    pub fn reset(&mut self, seed: FilterSeed) -> Arc<FilterState> {
        self.dispatch(FilterAction::Reset(seed))
    }

    pub fn state(&self) -> Arc<FilterState> {
        Arc::clone(&self.current)
    }

    pub fn initial(&self) -> Arc<FilterState> {
        Arc::clone(&self.initial)
    }

    /// Field-wise equality with the initial state. Lists compare by
    /// position, so a reordered selection counts as a change.
    pub fn is_default(&self) -> bool {
        *self.current == *self.initial
    }

    pub fn share(&self) -> FilterSeed {
        FilterSeed::from_state(&self.current)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoreSort {
    #[default]
    Achievements,
    DxRating,
    Level,
    DxScore,
    UploadTime,
}

pub fn filter_scores<'a>(state: &FilterState, scores: &'a [Score]) -> Vec<&'a Score> {
    scores.iter().filter(|score| state.matches(score)).collect()
}

pub fn sort_scores(scores: &mut [&Score], sort: ScoreSort) {
    match sort {
        ScoreSort::Achievements => scores.sort_by(|a, b| desc(a.achievements, b.achievements)),
        ScoreSort::DxRating => scores.sort_by(|a, b| desc(a.dx_rating, b.dx_rating)),
        ScoreSort::Level => scores.sort_by(|a, b| desc(a.level_value(), b.level_value())),
        ScoreSort::DxScore => scores.sort_by(|a, b| b.dx_score.cmp(&a.dx_score)),
        ScoreSort::UploadTime => scores.sort_by(|a, b| b.upload_time.cmp(&a.upload_time)),
    }
}

fn desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(level: &str, achievements: f64, rating: f64) -> Score {
        Score {
            id: 1,
            song_name: "test".to_string(),
            level: level.to_string(),
            level_index: LevelIndex::Master,
            achievements,
            fc: None,
            fs: None,
            dx_score: 0,
            dx_rating: rating,
            rate: RateType::S,
            song_type: SongType::Dx,
            genre: None,
            version: None,
            upload_time: None,
        }
    }

    #[test]
    fn set_replaces_one_field() {
        let before = FilterState::default();
        let after = reduce(&before, FilterAction::Set(FilterUpdate::ClearedOnly(true)));
        assert!(after.cleared_only);
        assert_eq!(
            FilterState {
                cleared_only: false,
                ..after
            },
            before
        );
    }

    #[test]
    fn reset_then_default_iff_seed_matches_defaults() {
        let mut store = ScoreFilterStore::default();
        store.set(FilterUpdate::LevelRange([12.0, 14.0]));
        assert!(!store.is_default());

        store.reset(FilterSeed::default());
        assert!(store.is_default());

        store.reset(FilterSeed {
            cleared_only: Some(true),
            ..FilterSeed::default()
        });
        assert!(!store.is_default());
    }

    #[test]
    fn reordered_list_is_not_default() {
        let mut store = ScoreFilterStore::default();
        let mut reversed = LevelIndex::ALL.to_vec();
        reversed.reverse();
        store.set(FilterUpdate::Difficulties(reversed));
        assert!(!store.is_default());

        store.set(FilterUpdate::Difficulties(LevelIndex::ALL[..4].to_vec()));
        assert!(!store.is_default());
    }

    #[test]
    fn constructor_overrides_are_the_baseline() {
        let overrides = FilterSeed {
            song_types: Some(vec![SongType::Dx]),
            ..FilterSeed::default()
        };
        let mut store = ScoreFilterStore::new(overrides.clone());
        assert!(store.is_default());
        assert_eq!(store.state().song_types, vec![SongType::Dx]);

        store.reset(FilterSeed::default());
        assert!(!store.is_default());
        store.reset(overrides);
        assert!(store.is_default());
    }

    #[test]
    fn snapshots_are_not_mutated_by_later_dispatches() {
        let mut store = ScoreFilterStore::default();
        let before = store.state();
        store.set(FilterUpdate::Rates(vec![RateType::Sssp]));
        assert!(before.rates.is_empty());
        assert_eq!(store.state().rates, vec![RateType::Sssp]);
    }

    #[test]
    fn shared_seed_only_carries_changes() {
        let mut store = ScoreFilterStore::default();
        store.set(FilterUpdate::ClearedOnly(true));
        let json = store.share().to_json().expect("serialize seed");
        assert_eq!(json, r#"{"cleared_only":true}"#);

        let seed = FilterSeed::from_json(&json).expect("parse seed");
        let mut other = ScoreFilterStore::default();
        other.reset(seed);
        assert_eq!(other.state(), store.state());
    }

    #[test]
    fn cleared_only_and_level_range() {
        let scores = vec![
            score("13+", 100.5, 300.0),
            score("12", 79.9, 150.0),
            score("14", 99.0, 310.0),
        ];
        let mut state = FilterState::default();
        state.cleared_only = true;
        state.level_range = [13.0, 13.9];
        let hits = filter_scores(&state, &scores);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].level, "13+");
    }

    #[test]
    fn sort_by_rating_descending() {
        let scores = vec![score("13", 99.0, 200.0), score("14", 98.0, 280.0)];
        let mut hits = filter_scores(&FilterState::default(), &scores);
        sort_scores(&mut hits, ScoreSort::DxRating);
        assert_eq!(hits[0].level, "14");
        sort_scores(&mut hits, ScoreSort::Achievements);
        assert_eq!(hits[0].level, "13");
    }
}
