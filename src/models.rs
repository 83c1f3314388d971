use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Game {
    #[default]
    Maimai,
    Chunithm,
}

impl Game {
    pub fn as_str(self) -> &'static str {
        match self {
            Game::Maimai => "maimai",
            Game::Chunithm => "chunithm",
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chart difficulty, sent over the wire as `0..=4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LevelIndex {
    Basic,
    Advanced,
    Expert,
    Master,
    ReMaster,
}

impl LevelIndex {
    pub const ALL: [LevelIndex; 5] = [
        LevelIndex::Basic,
        LevelIndex::Advanced,
        LevelIndex::Expert,
        LevelIndex::Master,
        LevelIndex::ReMaster,
    ];
}

impl TryFrom<u8> for LevelIndex {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        LevelIndex::ALL
            .get(usize::from(value))
            .copied()
            .ok_or_else(|| format!("unknown level index {value}"))
    }
}

impl From<LevelIndex> for u8 {
    fn from(value: LevelIndex) -> Self {
        value as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SongType {
    Standard,
    Dx,
    Utage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FcType {
    Fc,
    Fcp,
    Ap,
    App,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsType {
    Sync,
    Fs,
    Fsp,
    Fsd,
    Fsdp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateType {
    D,
    C,
    B,
    Bb,
    Bbb,
    A,
    Aa,
    Aaa,
    S,
    Sp,
    Ss,
    Ssp,
    Sss,
    Sssp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub id: u32,
    #[serde(default)]
    pub song_name: String,
    pub level: String,
    pub level_index: LevelIndex,
    pub achievements: f64,
    #[serde(default)]
    pub fc: Option<FcType>,
    #[serde(default)]
    pub fs: Option<FsType>,
    #[serde(default)]
    pub dx_score: u32,
    #[serde(default)]
    pub dx_rating: f64,
    pub rate: RateType,
    #[serde(rename = "type")]
    pub song_type: SongType,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub upload_time: Option<DateTime<Utc>>,
}

impl Score {
    /// Numeric level used for range filters: `13` is 13.0, `13+` is 13.7.
    pub fn level_value(&self) -> f64 {
        parse_level(&self.level).unwrap_or(0.0)
    }
}

pub fn parse_level(level: &str) -> Option<f64> {
    let trimmed = level.trim();
    let (base, plus) = match trimmed.strip_suffix('+') {
        Some(base) => (base, true),
        None => (trimmed, false),
    };
    let value = base.parse::<f64>().ok()?;
    Some(if plus { value + 0.7 } else { value })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Trophy,
    Icon,
    Plate,
    Frame,
}

impl CollectionKind {
    pub fn segment(self) -> &'static str {
        match self {
            CollectionKind::Trophy => "trophy",
            CollectionKind::Icon => "icon",
            CollectionKind::Plate => "plate",
            CollectionKind::Frame => "frame",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    #[serde(default)]
    pub rating: u32,
    pub friend_code: u64,
    #[serde(default)]
    pub course_rank: u32,
    #[serde(default)]
    pub class_rank: u32,
    #[serde(default)]
    pub star: u32,
    #[serde(default)]
    pub trophy: Option<Collection>,
    #[serde(default)]
    pub icon: Option<Collection>,
    #[serde(default)]
    pub name_plate: Option<Collection>,
    #[serde(default)]
    pub frame: Option<Collection>,
    #[serde(default)]
    pub upload_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Bests {
    pub standard_total: u32,
    pub dx_total: u32,
    pub standard: Vec<Score>,
    pub dx: Vec<Score>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasSong {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub song_type: Option<SongType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AliasWeight {
    pub up: u32,
    pub down: u32,
    pub total: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alias {
    pub alias_id: u32,
    pub song: AliasSong,
    pub alias: String,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub weight: AliasWeight,
    #[serde(default)]
    pub upload_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub vote: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AliasPage {
    pub aliases: Vec<Alias>,
    pub page_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AliasSort {
    #[default]
    Newest,
    Votes,
}

impl AliasSort {
    pub fn as_str(self) -> &'static str {
        match self {
            AliasSort::Newest => "alias_id",
            AliasSort::Votes => "weight.total",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasQuery {
    pub page: u32,
    pub sort: AliasSort,
    pub approved: Option<bool>,
    pub song_id: Option<u32>,
}

impl Default for AliasQuery {
    fn default() -> Self {
        Self {
            page: 1,
            sort: AliasSort::default(),
            approved: None,
            song_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub permission: u32,
    #[serde(default)]
    pub register_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub allow_crawl_scores: bool,
    pub allow_crawl_name_plate: bool,
    pub allow_crawl_frame: bool,
    pub allow_third_party_fetch_player: bool,
    pub allow_third_party_fetch_scores: bool,
    pub allow_third_party_fetch_history: bool,
    pub allow_third_party_write_data: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeveloperApp {
    pub id: u32,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub apply_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeveloperAppForm {
    pub name: String,
    pub url: String,
    pub reason: String,
}

impl DeveloperAppForm {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::validation("name", "name is required"));
        }
        if self.name.chars().count() > 64 {
            return Err(ApiError::validation("name", "name must be at most 64 characters"));
        }
        validate_http_url("url", &self.url)?;
        if self.reason.trim().is_empty() {
            return Err(ApiError::validation("reason", "reason is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthApp {
    pub client_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OAuthAppForm {
    pub name: String,
    pub description: String,
    pub website: String,
    pub redirect_uris: Vec<String>,
}

impl OAuthAppForm {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::validation("name", "name is required"));
        }
        if !self.website.trim().is_empty() {
            validate_http_url("website", &self.website)?;
        }
        if self.redirect_uris.is_empty() {
            return Err(ApiError::validation(
                "redirect_uris",
                "at least one redirect uri is required",
            ));
        }
        for uri in &self.redirect_uris {
            validate_http_url("redirect_uris", uri)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct YearInReview {
    pub year: u32,
    pub play_count: u32,
    pub new_scores: u32,
    pub rating_start: u32,
    pub rating_end: u32,
    pub most_played: Vec<Score>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub maintenance: bool,
    pub notice: Option<String>,
    pub asset_base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub token: String,
}

fn validate_http_url(field: &'static str, raw: &str) -> Result<(), ApiError> {
    match Url::parse(raw.trim()) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(()),
        _ => Err(ApiError::validation(field, "must be an http(s) url")),
    }
}
