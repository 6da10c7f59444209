//! Per league/season ingestion ledger
//!
//! One JSON document per league season records, for every stage, its status,
//! progress counters, API calls spent and the ids already fetched. Every
//! mutator persists before returning, so the file on disk is always the
//! latest checkpoint. Id sets only ever grow (set union), and the overall
//! status is derived from the stage statuses on every save.

use crate::persist;
use crate::{IdKey, LeagueSeason, OverallStatus, Stage, StageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Current ledger schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum allowed ledger size (10 MB) to prevent memory exhaustion
pub const MAX_STATE_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Ledger filename suffix
pub const STATE_FILE_SUFFIX: &str = "_state.json";

/// Rate limiter state shares the directory but is not a ledger
const RATE_LIMITER_FILE: &str = "rate_limiter_state.json";

/// Ledger path for a league season
pub fn state_path(state_dir: &Path, league: &LeagueSeason) -> PathBuf {
    state_dir.join(format!("{}{}", league.dir_name(), STATE_FILE_SUFFIX))
}

/// Progress of one stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionState {
    /// Stage status
    #[serde(default)]
    pub status: StageStatus,
    /// Records expected
    #[serde(default)]
    pub total: u64,
    /// Records fetched so far
    #[serde(default)]
    pub fetched: u64,
    /// API calls spent on this stage across all runs
    #[serde(default)]
    pub api_calls: u64,
    /// Last checkpoint
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// Fetched team ids
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_ids: Option<BTreeSet<i64>>,
    /// Fetched match ids
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_ids: Option<BTreeSet<i64>>,
    /// Fetched player ids
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_ids: Option<BTreeSet<i64>>,
    /// Fetched referee ids
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referee_ids: Option<BTreeSet<i64>>,
    /// H2H files generated in the last run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<u64>,
}

impl CollectionState {
    /// Empty state with the id list the stage tracks
    pub fn for_stage(stage: Stage) -> Self {
        let mut state = Self::default();
        if let Some(key) = stage.id_key() {
            state.ids_mut(key);
        }
        if stage == Stage::HeadToHead {
            state.generated = Some(0);
        }
        state
    }

    /// The id list for `key`, if present
    pub fn ids(&self, key: IdKey) -> Option<&BTreeSet<i64>> {
        match key {
            IdKey::TeamIds => self.team_ids.as_ref(),
            IdKey::MatchIds => self.match_ids.as_ref(),
            IdKey::PlayerIds => self.player_ids.as_ref(),
            IdKey::RefereeIds => self.referee_ids.as_ref(),
        }
    }

    fn ids_mut(&mut self, key: IdKey) -> &mut BTreeSet<i64> {
        let slot = match key {
            IdKey::TeamIds => &mut self.team_ids,
            IdKey::MatchIds => &mut self.match_ids,
            IdKey::PlayerIds => &mut self.player_ids,
            IdKey::RefereeIds => &mut self.referee_ids,
        };
        slot.get_or_insert_with(BTreeSet::new)
    }
}

/// On-disk ledger document
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Ledger {
    schema_version: String,
    league: String,
    season_id: i64,
    #[serde(default)]
    season_year: String,
    started_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    status: OverallStatus,
    #[serde(default)]
    collections: BTreeMap<Stage, CollectionState>,
    #[serde(default)]
    total_api_calls: u64,
}

/// Condensed view of a ledger for status output
#[derive(Debug, Clone, Serialize)]
pub struct StateSummary {
    /// League key
    pub league: String,
    /// Season id
    pub season_id: i64,
    /// Season display year
    pub season_year: String,
    /// Derived overall status
    pub status: OverallStatus,
    /// First ledger creation
    pub started_at: DateTime<Utc>,
    /// Last checkpoint
    pub last_updated: DateTime<Utc>,
    /// Last full completion
    pub completed_at: Option<DateTime<Utc>>,
    /// API calls across all stages and runs
    pub total_api_calls: u64,
    /// Stages complete
    pub stages_complete: usize,
    /// Stages tracked
    pub stages_total: usize,
    /// Per-stage status and counters
    pub collections: BTreeMap<Stage, CollectionState>,
}

/// Resumable progress ledger for one league season
#[derive(Debug, Clone)]
pub struct IngestionState {
    path: PathBuf,
    ledger: Ledger,
}

impl IngestionState {
    /// Load the ledger for `league`, creating it when absent.
    ///
    /// An unreadable ledger is moved aside to `*.corrupt` and replaced by a
    /// fresh one; stored entity files still seed the known-id baselines. A
    /// schema version mismatch is an error.
    pub fn open(state_dir: &Path, league: &LeagueSeason) -> Result<Self, StateError> {
        let path = state_path(state_dir, league);

        if path.exists() {
            match Self::load(&path) {
                Ok(state) => {
                    info!(
                        league = %league,
                        status = %state.get_overall_status(),
                        total_api_calls = state.ledger.total_api_calls,
                        "Ingestion ledger loaded"
                    );
                    return Ok(state);
                }
                Err(e @ StateError::SchemaVersionMismatch { .. }) => return Err(e),
                Err(e) => {
                    let aside = path.with_extension("json.corrupt");
                    warn!(
                        path = %path.display(),
                        moved_to = %aside.display(),
                        error = %e,
                        "Unreadable ingestion ledger, starting a fresh one"
                    );
                    std::fs::rename(&path, &aside).map_err(|e| StateError::IoError(e.to_string()))?;
                }
            }
        }

        let mut state = Self::new(path, league);
        state.save()?;
        info!(league = %league, path = %state.path.display(), "Ingestion ledger created");
        Ok(state)
    }

    /// Fresh in-memory ledger; nothing is written until the first save
    pub fn new(path: impl Into<PathBuf>, league: &LeagueSeason) -> Self {
        let now = Utc::now();
        let collections = Stage::ALL
            .iter()
            .map(|stage| (*stage, CollectionState::for_stage(*stage)))
            .collect();
        Self {
            path: path.into(),
            ledger: Ledger {
                schema_version: SCHEMA_VERSION.to_string(),
                league: league.league_key.clone(),
                season_id: league.season_id,
                season_year: league.season_year.clone(),
                started_at: now,
                last_updated: now,
                completed_at: None,
                status: OverallStatus::NotStarted,
                collections,
                total_api_calls: 0,
            },
        }
    }

    /// Load a ledger file
    pub fn load(path: &Path) -> Result<Self, StateError> {
        debug!(path = %path.display(), "Loading ingestion ledger");

        let metadata = std::fs::metadata(path).map_err(|e| StateError::IoError(e.to_string()))?;
        if metadata.len() > MAX_STATE_FILE_SIZE {
            return Err(StateError::StateTooLarge {
                size: metadata.len(),
                max: MAX_STATE_FILE_SIZE,
            });
        }

        let contents = std::fs::read_to_string(path).map_err(|e| StateError::IoError(e.to_string()))?;
        let mut ledger: Ledger = serde_json::from_str(&contents).map_err(|e| {
            warn!(error = %e, "Failed to deserialize ingestion ledger");
            StateError::DeserializationError(e.to_string())
        })?;

        if ledger.schema_version != SCHEMA_VERSION {
            warn!(
                found_version = %ledger.schema_version,
                expected_version = SCHEMA_VERSION,
                "Ingestion ledger schema version mismatch"
            );
            return Err(StateError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: ledger.schema_version,
            });
        }

        for stage in Stage::ALL {
            ledger
                .collections
                .entry(stage)
                .or_insert_with(|| CollectionState::for_stage(stage));
        }

        Ok(Self {
            path: path.to_path_buf(),
            ledger,
        })
    }

    /// Every ledger in `state_dir`, sorted by filename. Unreadable ledgers
    /// are logged and skipped.
    pub fn list_all(state_dir: &Path) -> Vec<IngestionState> {
        let entries = match std::fs::read_dir(state_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %state_dir.display(), error = %e, "No ledger directory");
                return Vec::new();
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(STATE_FILE_SUFFIX) && n != RATE_LIMITER_FILE)
            })
            .collect();
        paths.sort();

        paths
            .into_iter()
            .filter_map(|path| match Self::load(&path) {
                Ok(state) => Some(state),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable ledger");
                    None
                }
            })
            .collect()
    }

    /// Ledger file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// League key
    pub fn league(&self) -> &str {
        &self.ledger.league
    }

    /// Season id
    pub fn season_id(&self) -> i64 {
        self.ledger.season_id
    }

    /// Season display year
    pub fn season_year(&self) -> &str {
        &self.ledger.season_year
    }

    /// League season this ledger tracks
    pub fn league_season(&self) -> LeagueSeason {
        LeagueSeason::new(
            self.ledger.league.clone(),
            self.ledger.season_id,
            self.ledger.season_year.clone(),
        )
    }

    /// API calls across all stages and runs
    pub fn total_api_calls(&self) -> u64 {
        self.ledger.total_api_calls
    }

    /// Last full completion
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.ledger.completed_at
    }

    /// Last checkpoint time
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.ledger.last_updated
    }

    /// State of one stage
    pub fn collection(&self, stage: Stage) -> CollectionState {
        self.ledger
            .collections
            .get(&stage)
            .cloned()
            .unwrap_or_else(|| CollectionState::for_stage(stage))
    }

    fn collection_mut(&mut self, stage: Stage) -> &mut CollectionState {
        self.ledger
            .collections
            .entry(stage)
            .or_insert_with(|| CollectionState::for_stage(stage))
    }

    /// Whether a stage is complete
    pub fn is_collection_complete(&self, stage: Stage) -> bool {
        self.ledger
            .collections
            .get(&stage)
            .is_some_and(|c| c.status == StageStatus::Complete)
    }

    /// Ids recorded for a stage; empty for stages without an id list
    pub fn fetched_ids(&self, stage: Stage) -> BTreeSet<i64> {
        stage
            .id_key()
            .and_then(|key| self.ledger.collections.get(&stage)?.ids(key).cloned())
            .unwrap_or_default()
    }

    /// Mark a stage as started and persist
    pub fn mark_collection_in_progress(&mut self, stage: Stage) -> Result<(), StateError> {
        let collection = self.collection_mut(stage);
        collection.status = StageStatus::InProgress;
        collection.last_updated = Some(Utc::now());
        self.save()
    }

    /// Mark a stage as complete and persist
    pub fn mark_collection_complete(&mut self, stage: Stage) -> Result<(), StateError> {
        let collection = self.collection_mut(stage);
        collection.status = StageStatus::Complete;
        collection.last_updated = Some(Utc::now());
        info!(stage = %stage, fetched = collection.fetched, "Stage marked complete");
        self.save()
    }

    /// Checkpoint a stage.
    ///
    /// `fetched` replaces the counter, `total` replaces the expected count
    /// when given, `ids` are unioned into the stage's id list and
    /// `api_calls` is added to both the stage and the ledger totals.
    pub fn update_collection_progress<I>(
        &mut self,
        stage: Stage,
        fetched: u64,
        total: Option<u64>,
        ids: I,
        api_calls: u64,
    ) -> Result<(), StateError>
    where
        I: IntoIterator<Item = i64>,
    {
        let collection = self.collection_mut(stage);
        collection.fetched = fetched;
        if let Some(total) = total {
            collection.total = total;
        }
        if let Some(key) = stage.id_key() {
            collection.ids_mut(key).extend(ids);
        }
        collection.api_calls += api_calls;
        collection.last_updated = Some(Utc::now());
        self.ledger.total_api_calls += api_calls;

        debug!(
            stage = %stage,
            fetched = fetched,
            api_calls = api_calls,
            "Stage checkpoint"
        );
        self.save()
    }

    /// Record how many H2H files the last run generated
    pub fn record_h2h_generated(&mut self, generated: u64) -> Result<(), StateError> {
        let collection = self.collection_mut(Stage::HeadToHead);
        collection.generated = Some(generated);
        collection.fetched = generated;
        collection.total = generated;
        collection.last_updated = Some(Utc::now());
        self.save()
    }

    /// Stamp the ledger as fully ingested
    pub fn mark_complete(&mut self) -> Result<(), StateError> {
        self.ledger.completed_at = Some(Utc::now());
        self.save()
    }

    /// Overall status derived from the stages
    pub fn get_overall_status(&self) -> OverallStatus {
        derive_status(&self.ledger.collections)
    }

    /// Condensed view for status output
    pub fn summary(&self) -> StateSummary {
        let stages_complete = self
            .ledger
            .collections
            .values()
            .filter(|c| c.status == StageStatus::Complete)
            .count();
        StateSummary {
            league: self.ledger.league.clone(),
            season_id: self.ledger.season_id,
            season_year: self.ledger.season_year.clone(),
            status: self.get_overall_status(),
            started_at: self.ledger.started_at,
            last_updated: self.ledger.last_updated,
            completed_at: self.ledger.completed_at,
            total_api_calls: self.ledger.total_api_calls,
            stages_complete,
            stages_total: self.ledger.collections.len(),
            collections: self.ledger.collections.clone(),
        }
    }

    /// Persist atomically, refreshing `last_updated` and the derived status
    pub fn save(&mut self) -> Result<(), StateError> {
        self.ledger.last_updated = Utc::now();
        self.ledger.status = derive_status(&self.ledger.collections);

        persist::write_json_atomic(&self.path, &self.ledger).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                StateError::SerializationError(e.to_string())
            } else {
                StateError::IoError(e.to_string())
            }
        })?;

        debug!(
            path = %self.path.display(),
            status = %self.ledger.status,
            total_api_calls = self.ledger.total_api_calls,
            "Ingestion ledger saved"
        );
        Ok(())
    }
}

fn derive_status(collections: &BTreeMap<Stage, CollectionState>) -> OverallStatus {
    let statuses: Vec<StageStatus> = Stage::ALL
        .iter()
        .map(|stage| collections.get(stage).map(|c| c.status).unwrap_or_default())
        .collect();

    if statuses.iter().all(|s| *s == StageStatus::Complete) {
        OverallStatus::Complete
    } else if statuses.iter().any(|s| *s != StageStatus::Pending) {
        OverallStatus::InProgress
    } else {
        OverallStatus::NotStarted
    }
}

/// Errors related to the ingestion ledger
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: String,
        /// Found schema version
        found: String,
    },

    /// State file too large
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),

    /// Another process is ingesting the same league season
    #[error("ledger {0} is locked by another ingestion")]
    Locked(PathBuf),
}
