//! # Profile Store
//!
//! JSON-file-backed repository of reveal profiles.
//!
//! One profile owns a set of secret triggers, a list of covert pages, an
//! optional final page, and the instant-replace flag. The reserved `default`
//! profile can never be updated or deleted and seeds every newly created
//! profile.
//!
//! Invariant: no trigger string appears in more than one profile, at any
//! point in time. Every mutation validates against the in-memory set and
//! persists the whole store atomically (temp file + rename) only after
//! validation succeeds, so concurrent writers cannot leave a half-written
//! or colliding profile set on disk.
use std::{
    collections::{BTreeMap, HashSet},
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::RwLock,
};

use rand::{Rng, thread_rng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::AppError;

pub const DEFAULT_PROFILE: &str = "default";

const TRIGGER_LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const TRIGGER_LEN: usize = 4;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub coverts: Vec<String>,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalpage: Option<String>,
    #[serde(default, rename = "instantReplace")]
    pub instant_replace: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProfileSet {
    pub profiles: BTreeMap<String, Profile>,
}

impl ProfileSet {
    fn duplicate_trigger(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        for profile in self.profiles.values() {
            for trigger in &profile.triggers {
                if !seen.insert(trigger.as_str()) {
                    return Some(trigger);
                }
            }
        }
        None
    }
}

pub struct ProfileStore {
    path: Option<PathBuf>,
    inner: RwLock<ProfileSet>,
}

impl ProfileStore {
    /// Loads the store from disk, seeding a fresh default profile when the
    /// file does not exist yet.
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let set = if path.exists() {
            let raw = fs::read_to_string(path)?;
            let set: ProfileSet = serde_json::from_str(&raw)?;
            if let Some(trigger) = set.duplicate_trigger() {
                return Err(AppError::Conflict(format!(
                    "trigger \"{trigger}\" appears in more than one profile"
                )));
            }
            set
        } else {
            info!("Profile store {} missing, seeding defaults", path.display());
            let mut set = ProfileSet::default();
            set.profiles.insert(
                DEFAULT_PROFILE.to_string(),
                Profile {
                    coverts: vec!["chat".to_string(), "fromage".to_string()],
                    triggers: generate_triggers(&HashSet::new()),
                    finalpage: Some("philosophie".to_string()),
                    instant_replace: false,
                },
            );
            let store = Self {
                path: Some(path.to_path_buf()),
                inner: RwLock::new(set),
            };
            store.persist(&store.snapshot())?;
            return Ok(store);
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            inner: RwLock::new(set),
        })
    }

    /// Pathless store used by tests; never touches the filesystem.
    pub fn in_memory(set: ProfileSet) -> Self {
        Self {
            path: None,
            inner: RwLock::new(set),
        }
    }

    pub fn snapshot(&self) -> ProfileSet {
        self.inner.read().expect("profile store lock poisoned").clone()
    }

    pub fn get(&self, name: &str) -> Result<Profile, AppError> {
        self.inner
            .read()
            .expect("profile store lock poisoned")
            .profiles
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("profile \"{name}\"")))
    }

    /// Creates a profile seeded from the default profile's coverts and final
    /// page, with a freshly generated trigger no other profile uses.
    pub fn create(&self, name: &str) -> Result<Profile, AppError> {
        let mut set = self.inner.write().expect("profile store lock poisoned");
        if set.profiles.contains_key(name) {
            return Err(AppError::Conflict(format!("profile \"{name}\" already exists")));
        }

        let default = set
            .profiles
            .get(DEFAULT_PROFILE)
            .cloned()
            .ok_or_else(|| AppError::NotFound("default profile".to_string()))?;

        let used: HashSet<String> = set
            .profiles
            .values()
            .flat_map(|p| p.triggers.iter().cloned())
            .collect();

        let profile = Profile {
            coverts: default.coverts,
            triggers: generate_triggers(&used),
            finalpage: default.finalpage,
            instant_replace: false,
        };

        set.profiles.insert(name.to_string(), profile.clone());
        self.persist(&set)?;

        Ok(profile)
    }

    /// Updates a single parameter of a profile. The reserved default profile
    /// is immutable; trigger updates are rejected when they would collide
    /// with another profile's triggers.
    pub fn update(&self, name: &str, param: &str, value: Value) -> Result<Profile, AppError> {
        let mut set = self.inner.write().expect("profile store lock poisoned");
        if !set.profiles.contains_key(name) {
            return Err(AppError::NotFound(format!("profile \"{name}\"")));
        }
        if name == DEFAULT_PROFILE {
            return Err(AppError::Forbidden("cannot override default profile".to_string()));
        }

        match param {
            "coverts" => {
                let list = normalize_list(value);
                set.profiles.get_mut(name).unwrap().coverts = list;
            }
            "triggers" => {
                let list = normalize_list(value);
                let used: HashSet<String> = set
                    .profiles
                    .iter()
                    .filter(|(other, _)| other.as_str() != name)
                    .flat_map(|(_, p)| p.triggers.iter().cloned())
                    .collect();
                if let Some(trigger) = list.iter().find(|t| used.contains(*t)) {
                    return Err(AppError::Conflict(format!(
                        "trigger \"{trigger}\" is already in use by another profile"
                    )));
                }
                set.profiles.get_mut(name).unwrap().triggers = list;
            }
            "finalpage" => {
                let page = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                set.profiles.get_mut(name).unwrap().finalpage = Some(page);
            }
            _ => return Err(AppError::Validation(format!("unknown parameter \"{param}\""))),
        }

        self.persist(&set)?;
        Ok(set.profiles.get(name).cloned().unwrap())
    }

    pub fn delete(&self, name: &str) -> Result<(), AppError> {
        let mut set = self.inner.write().expect("profile store lock poisoned");
        if name == DEFAULT_PROFILE {
            return Err(AppError::Forbidden("cannot delete default profile".to_string()));
        }
        if set.profiles.remove(name).is_none() {
            return Err(AppError::NotFound(format!("profile \"{name}\"")));
        }

        self.persist(&set)?;
        Ok(())
    }

    /// Replaces the whole store after validating trigger uniqueness across
    /// the incoming set.
    pub fn replace(&self, new: ProfileSet) -> Result<(), AppError> {
        if !new.profiles.contains_key(DEFAULT_PROFILE) {
            return Err(AppError::Validation(
                "replacement config must contain the default profile".to_string(),
            ));
        }
        if let Some(trigger) = new.duplicate_trigger() {
            return Err(AppError::Conflict(format!(
                "duplicate trigger \"{trigger}\" in provided config"
            )));
        }

        let mut set = self.inner.write().expect("profile store lock poisoned");
        *set = new;
        self.persist(&set)?;
        Ok(())
    }

    fn persist(&self, set: &ProfileSet) -> Result<(), AppError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let bytes = serde_json::to_vec_pretty(set)?;
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = match dir {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new_in(".")?,
        };
        tmp.write_all(&bytes)?;
        tmp.persist(path).map_err(|e| AppError::Store(e.error))?;
        Ok(())
    }
}

/// Generates one 4-uppercase-letter trigger not present in `used`.
fn generate_triggers(used: &HashSet<String>) -> Vec<String> {
    let mut rng = thread_rng();
    loop {
        let trigger: String = (0..TRIGGER_LEN)
            .map(|_| TRIGGER_LETTERS[rng.gen_range(0..TRIGGER_LETTERS.len())] as char)
            .collect();
        if !used.contains(&trigger) {
            return vec![trigger];
        }
    }
}

/// Accepts a JSON array, a JSON-encoded array string, or a comma-separated
/// string, and normalizes it to a list of trimmed entries.
fn normalize_list(value: Value) -> Vec<String> {
    let items: Vec<String> = match value {
        Value::Array(items) => items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        Value::String(s) => match serde_json::from_str::<Vec<String>>(&s) {
            Ok(parsed) => parsed,
            Err(_) => s.split(',').map(str::to_string).collect(),
        },
        other => vec![other.to_string()],
    };

    items
        .into_iter()
        .map(|s| s.trim().trim_matches('"').trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> ProfileStore {
        let mut set = ProfileSet::default();
        set.profiles.insert(
            DEFAULT_PROFILE.to_string(),
            Profile {
                coverts: vec!["chat".to_string()],
                triggers: vec!["WIKI".to_string()],
                finalpage: Some("philosophie".to_string()),
                instant_replace: false,
            },
        );
        ProfileStore::in_memory(set)
    }

    #[test]
    fn test_create_generates_unique_trigger() {
        let store = seeded();
        let profile = store.create("alice").unwrap();

        assert_eq!(profile.coverts, vec!["chat"]);
        assert_eq!(profile.triggers.len(), 1);
        assert_ne!(profile.triggers[0], "WIKI");
        assert_eq!(profile.finalpage.as_deref(), Some("philosophie"));
    }

    #[test]
    fn test_create_existing_conflicts() {
        let store = seeded();
        store.create("alice").unwrap();

        assert!(matches!(store.create("alice"), Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_update_trigger_collision_rejected() {
        let store = seeded();
        store.create("alice").unwrap();

        let result = store.update("alice", "triggers", Value::String("WIKI".to_string()));
        assert!(matches!(result, Err(AppError::Conflict(_))));

        // the colliding update must not have landed
        assert_eq!(store.get("alice").unwrap().triggers.len(), 1);
        assert_ne!(store.get("alice").unwrap().triggers[0], "WIKI");
    }

    #[test]
    fn test_default_profile_immutable() {
        let store = seeded();

        let update = store.update(
            DEFAULT_PROFILE,
            "finalpage",
            Value::String("autre".to_string()),
        );
        assert!(matches!(update, Err(AppError::Forbidden(_))));
        assert!(matches!(store.delete(DEFAULT_PROFILE), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn test_update_unknown_param() {
        let store = seeded();
        store.create("alice").unwrap();

        let result = store.update("alice", "secret", Value::String("x".to_string()));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_delete() {
        let store = seeded();
        store.create("alice").unwrap();

        store.delete("alice").unwrap();
        assert!(matches!(store.get("alice"), Err(AppError::NotFound(_))));
        assert!(matches!(store.delete("alice"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_replace_rejects_duplicate_triggers() {
        let store = seeded();

        let mut set = store.snapshot();
        set.profiles.insert(
            "alice".to_string(),
            Profile {
                coverts: vec![],
                triggers: vec!["WIKI".to_string()],
                finalpage: None,
                instant_replace: false,
            },
        );

        assert!(matches!(store.replace(set), Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_replace_requires_default() {
        let store = seeded();

        let result = store.replace(ProfileSet::default());
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_normalize_list_accepts_all_shapes() {
        let from_array = normalize_list(serde_json::json!(["a", " b "]));
        assert_eq!(from_array, vec!["a", "b"]);

        let from_json_string = normalize_list(Value::String("[\"a\",\"b\"]".to_string()));
        assert_eq!(from_json_string, vec!["a", "b"]);

        let from_csv = normalize_list(Value::String("a, b, ,c".to_string()));
        assert_eq!(from_csv, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_open_round_trips_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let store = ProfileStore::open(&path).unwrap();
        store.create("alice").unwrap();

        let reopened = ProfileStore::open(&path).unwrap();
        assert_eq!(reopened.get("alice").unwrap(), store.get("alice").unwrap());
        assert!(reopened.get(DEFAULT_PROFILE).is_ok());
    }

    #[test]
    fn test_open_rejects_colliding_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"profiles":{"default":{"triggers":["ABCD"]},"x":{"triggers":["ABCD"]}}}"#,
        )
        .unwrap();

        assert!(matches!(ProfileStore::open(&path), Err(AppError::Conflict(_))));
    }
}
