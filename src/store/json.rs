//! Filesystem-backed [`LeagueStore`]

use super::naming::sanitize_filename;
use super::{h2h_key, Document, EntityKind, LeagueStore, StoreError, StoreResult};
use crate::persist::{self, with_saved_at};
use crate::LeagueSeason;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

const ENTITY_KINDS: [EntityKind; 6] = [
    EntityKind::Team,
    EntityKind::TeamLastX,
    EntityKind::Match,
    EntityKind::MatchDetail,
    EntityKind::Player,
    EntityKind::Referee,
];

const H2H_DIR: &str = "h2h";

/// Marker that team and last-X files must not end their name part with
const LASTX_MARKER: &str = "lastx";

/// Files of one kind on disk, by id
type KindIndex = BTreeMap<i64, Vec<PathBuf>>;

/// JSON files under `<leagues_dir>/<league_key>_<season_id>/`
///
/// Named kinds keep an id -> files index, built from the directory on the
/// first save of that kind, so a save finds a renamed entity's old file
/// without rescanning the directory. The store assumes it is the only
/// writer of its directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
    league: LeagueSeason,
    index: Arc<Mutex<HashMap<EntityKind, KindIndex>>>,
}

impl JsonFileStore {
    /// Open the store, creating the directory tree if needed
    pub fn open(leagues_dir: impl AsRef<Path>, league: &LeagueSeason) -> StoreResult<Self> {
        let root = leagues_dir.as_ref().join(league.dir_name());
        for dir in ENTITY_KINDS
            .iter()
            .map(EntityKind::dir_name)
            .chain(std::iter::once(H2H_DIR))
        {
            let path = root.join(dir);
            std::fs::create_dir_all(&path).map_err(|e| StoreError::io(&path, e))?;
        }
        debug!(root = %root.display(), "League store opened");
        Ok(Self {
            root,
            league: league.clone(),
            index: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// League directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir(&self, kind: EntityKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    fn entity_path(&self, kind: EntityKind, id: i64, name: &str) -> PathBuf {
        let file_name = if kind.is_named() {
            format!("{id}_{}{}.json", file_name_part(kind, name), kind.suffix())
        } else {
            format!("{id}{}.json", kind.suffix())
        };
        self.kind_dir(kind).join(file_name)
    }

    fn h2h_path(&self, team_a: i64, team_b: i64) -> PathBuf {
        let (low, high) = h2h_key(team_a, team_b);
        self.root.join(H2H_DIR).join(format!("{low}_vs_{high}.json"))
    }

    /// Files of `kind` whose name resolves to `id`, sorted
    fn files_for(&self, kind: EntityKind, id: i64) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .list_kind(kind)
            .into_iter()
            .filter(|(file_id, _)| *file_id == id)
            .map(|(_, path)| path)
            .collect();
        files.sort();
        files
    }

    fn lock_index(&self) -> MutexGuard<'_, HashMap<EntityKind, KindIndex>> {
        self.index.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record `path` as the only file of `id` and return the files it replaces
    fn replace_indexed(&self, kind: EntityKind, id: i64, path: &Path) -> Vec<PathBuf> {
        let mut index = self.lock_index();
        let files = index.entry(kind).or_insert_with(|| {
            let mut by_id = KindIndex::new();
            for (file_id, file) in self.list_kind(kind) {
                by_id.entry(file_id).or_default().push(file);
            }
            by_id
        });
        let previous = files.insert(id, vec![path.to_path_buf()]).unwrap_or_default();
        previous.into_iter().filter(|p| p != path).collect()
    }

    /// Every `(id, path)` of `kind`
    fn list_kind(&self, kind: EntityKind) -> Vec<(i64, PathBuf)> {
        let dir = self.kind_dir(kind);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(dir = %dir.display(), error = %e, "Failed to list directory");
                }
                return Vec::new();
            }
        };

        entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let file_name = entry.file_name();
                let id = parse_file_id(kind, file_name.to_str()?)?;
                Some((id, entry.path()))
            })
            .collect()
    }

    fn read(&self, path: &Path) -> Option<Value> {
        match persist::read_json::<Value>(path) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read stored document");
                None
            }
        }
    }

    fn write(&self, path: &Path, payload: Value) -> StoreResult<()> {
        persist::write_json_atomic(path, &with_saved_at(payload)).map_err(|e| StoreError::io(path, e))
    }
}

/// Name part of a named entity's filename.
///
/// Teams and their last-X files share a directory and differ only by the
/// `_lastx` suffix, so a team name that itself ends in `lastx` gets a
/// trailing `_`.
fn file_name_part(kind: EntityKind, name: &str) -> String {
    let mut part = sanitize_filename(name);
    if matches!(kind, EntityKind::Team | EntityKind::TeamLastX) && part.ends_with(LASTX_MARKER) {
        part.push('_');
    }
    part
}

/// Id encoded in an entity filename, if the file belongs to `kind`
fn parse_file_id(kind: EntityKind, file_name: &str) -> Option<i64> {
    let stem = file_name.strip_suffix(".json")?;
    if kind.is_named() {
        let is_lastx = stem.ends_with(EntityKind::TeamLastX.suffix());
        if (kind == EntityKind::TeamLastX) != is_lastx {
            return None;
        }
        let (id, _) = stem.split_once('_')?;
        id.parse().ok()
    } else {
        stem.strip_suffix(kind.suffix())?.parse().ok()
    }
}

/// `_saved_at` of a stored document, empty when absent
fn saved_at(document: &Value) -> &str {
    document
        .get(persist::SAVED_AT_FIELD)
        .and_then(Value::as_str)
        .unwrap_or("")
}

impl LeagueStore for JsonFileStore {
    fn league_season(&self) -> &LeagueSeason {
        &self.league
    }

    fn save_document(&self, document: Document, payload: Value) -> StoreResult<()> {
        self.write(&self.root.join(document.file_name()), payload)
    }

    fn load_document(&self, document: Document) -> Option<Value> {
        self.read(&self.root.join(document.file_name()))
    }

    fn save_entity(&self, kind: EntityKind, id: i64, name: &str, payload: Value) -> StoreResult<()> {
        let path = self.entity_path(kind, id, name);
        self.write(&path, payload)?;

        if kind.is_named() {
            // A renamed entity leaves its old file behind; drop it
            for stale in self.replace_indexed(kind, id, &path) {
                match std::fs::remove_file(&stale) {
                    Ok(()) => debug!(path = %stale.display(), "Removed file of renamed entity"),
                    Err(e) => warn!(path = %stale.display(), error = %e, "Failed to remove stale entity file"),
                }
            }
        }
        Ok(())
    }

    fn load_entity(&self, kind: EntityKind, id: i64) -> Option<Value> {
        if kind.is_named() {
            // Old and renamed files can both survive a crash; the newest wins
            self.files_for(kind, id)
                .iter()
                .filter_map(|path| self.read(path))
                .max_by(|a, b| saved_at(a).cmp(saved_at(b)))
        } else {
            self.read(&self.entity_path(kind, id, ""))
        }
    }

    fn entity_ids(&self, kind: EntityKind) -> Vec<i64> {
        let mut ids: Vec<i64> = self.list_kind(kind).into_iter().map(|(id, _)| id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    fn save_h2h(&self, team_a: i64, team_b: i64, payload: Value) -> StoreResult<()> {
        self.write(&self.h2h_path(team_a, team_b), payload)
    }

    fn load_h2h(&self, team_a: i64, team_b: i64) -> Option<Value> {
        self.read(&self.h2h_path(team_a, team_b))
    }

    fn h2h_pairs(&self) -> Vec<(i64, i64)> {
        let dir = self.root.join(H2H_DIR);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut pairs: Vec<(i64, i64)> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let file_name = entry.file_name();
                let stem = file_name.to_str()?.strip_suffix(".json")?.to_string();
                let (low, high) = stem.split_once("_vs_")?;
                Some((low.parse().ok()?, high.parse().ok()?))
            })
            .collect();
        pairs.sort_unstable();
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store(temp_dir: &TempDir) -> JsonFileStore {
        let league = LeagueSeason::new("england_premier_league", 9660, "2023/2024");
        JsonFileStore::open(temp_dir.path(), &league).unwrap()
    }

    #[test]
    fn test_parse_file_id() {
        assert_eq!(parse_file_id(EntityKind::Team, "59_arsenal.json"), Some(59));
        assert_eq!(parse_file_id(EntityKind::Team, "59_arsenal_lastx.json"), None);
        assert_eq!(parse_file_id(EntityKind::TeamLastX, "59_arsenal_lastx.json"), Some(59));
        assert_eq!(parse_file_id(EntityKind::TeamLastX, "59_arsenal.json"), None);
        assert_eq!(parse_file_id(EntityKind::Match, "101.json"), Some(101));
        assert_eq!(parse_file_id(EntityKind::Match, ".tmpAbc.partial"), None);
        assert_eq!(parse_file_id(EntityKind::Player, "notanid_x.json"), None);
    }

    #[test]
    fn test_layout_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        store.save_team(59, "Arsenal FC", json!({"id": 59})).unwrap();
        store.save_team_lastx(59, "Arsenal FC", json!([{"last_x": 5}])).unwrap();
        store.save_match(101, json!({"id": 101})).unwrap();
        store.save_h2h(93, 59, json!({"matches": []})).unwrap();

        let root = temp_dir.path().join("england_premier_league_9660");
        assert!(root.join("teams/59_arsenal_fc.json").exists());
        assert!(root.join("teams/59_arsenal_fc_lastx.json").exists());
        assert!(root.join("matches/101.json").exists());
        assert!(root.join("h2h/59_vs_93.json").exists());
        assert_eq!(store.root(), root.as_path());
    }

    #[test]
    fn test_saved_at_injected() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        store.save_league_stats(json!({"name": "Premier League"})).unwrap();
        let loaded = store.load_league_stats().unwrap();
        assert_eq!(loaded["name"], "Premier League");
        assert!(loaded["_saved_at"].is_string());
    }

    #[test]
    fn test_team_listing_excludes_lastx() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        store.save_team(12, "Chelsea", json!({"id": 12})).unwrap();
        store.save_team(3, "Brentford", json!({"id": 3})).unwrap();
        store.save_team_lastx(12, "Chelsea", json!([])).unwrap();

        assert_eq!(store.get_all_team_ids(), vec![3, 12]);
        assert_eq!(store.get_all_team_lastx_ids(), vec![12]);

        let lastx = store.load_team_lastx(12).unwrap();
        assert_eq!(lastx["team_id"], 12);
        assert_eq!(lastx["team_name"], "Chelsea");
        assert_eq!(lastx["data"], json!([]));
    }

    #[test]
    fn test_rename_replaces_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        store.save_player(7, "J. Smith", json!({"id": 7, "v": 1})).unwrap();
        store.save_player(7, "John Smith", json!({"id": 7, "v": 2})).unwrap();

        assert_eq!(store.get_all_player_ids(), vec![7]);
        assert_eq!(store.load_player(7).unwrap()["v"], 2);
        let files: Vec<_> = std::fs::read_dir(store.root().join("players")).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_team_name_ending_in_lastx() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        store.save_team(7, "Real Lastx", json!({"id": 7})).unwrap();
        store.save_team(8, "Arsenal", json!({"id": 8})).unwrap();
        store.save_team_lastx(7, "Real Lastx", json!([{"id": 7}])).unwrap();
        store.save_team(9, "Lastx", json!({"id": 9})).unwrap();

        assert_eq!(store.get_all_team_ids(), vec![7, 8, 9]);
        assert_eq!(store.get_all_team_lastx_ids(), vec![7]);
        assert_eq!(store.load_team(7).unwrap()["id"], 7);
        assert_eq!(store.load_team_lastx(7).unwrap()["team_id"], 7);

        let teams = store.root().join("teams");
        assert!(teams.join("7_real_lastx_.json").exists());
        assert!(teams.join("7_real_lastx__lastx.json").exists());
        assert!(teams.join("9_lastx_.json").exists());
    }

    #[test]
    fn test_file_name_part() {
        assert_eq!(file_name_part(EntityKind::Team, "Real Lastx"), "real_lastx_");
        assert_eq!(file_name_part(EntityKind::TeamLastX, "Real Lastx"), "real_lastx_");
        assert_eq!(file_name_part(EntityKind::Team, "Arsenal FC"), "arsenal_fc");
        assert_eq!(file_name_part(EntityKind::Player, "Max Lastx"), "max_lastx");
    }

    #[test]
    fn test_newest_of_duplicate_files_is_loaded() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let players = store.root().join("players");

        let old = json!({"id": 7, "v": 1, "_saved_at": "2024-01-01T00:00:00+00:00"});
        let new = json!({"id": 7, "v": 2, "_saved_at": "2024-03-01T00:00:00+00:00"});
        std::fs::write(players.join("7_a_smith.json"), old.to_string()).unwrap();
        std::fs::write(players.join("7_b_smith.json"), new.to_string()).unwrap();

        assert_eq!(store.get_all_player_ids(), vec![7]);
        assert_eq!(store.load_player(7).unwrap()["v"], 2);
    }

    #[test]
    fn test_file_left_by_earlier_run_is_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let referees = store.root().join("referees");
        std::fs::write(referees.join("4_m_dean.json"), r#"{"id": 4}"#).unwrap();

        store.save_referee(5, "Anthony Taylor", json!({"id": 5})).unwrap();
        store.save_referee(4, "Mike Dean", json!({"id": 4})).unwrap();

        let mut files: Vec<String> = std::fs::read_dir(&referees)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(files, vec!["4_mike_dean.json", "5_anthony_taylor.json"]);
    }

    #[test]
    fn test_missing_and_corrupt_loads() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        assert!(store.load_match(404).is_none());
        assert!(store.load_referee(1).is_none());

        std::fs::write(store.root().join("matches/5.json"), "{broken").unwrap();
        assert!(store.load_match(5).is_none());
        // Still listed: the id exists on disk
        assert_eq!(store.get_all_match_ids(), vec![5]);
    }

    #[test]
    fn test_h2h_is_order_insensitive() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        store.save_h2h(59, 12, json!({"team_a_id": 12})).unwrap();
        assert_eq!(store.load_h2h(12, 59).unwrap()["team_a_id"], 12);
        assert_eq!(store.load_h2h(59, 12).unwrap()["team_a_id"], 12);
        assert_eq!(store.h2h_pairs(), vec![(12, 59)]);
    }
}
