//! # Reveal Session State Machine
//!
//! Owns the durable per-client reveal state. The hosting runtime tears the
//! whole session down between single-page navigations, so every field
//! round-trips through a narrow key-value [`SessionStore`] port instead of
//! living in process memory.
//!
//! The machine never fetches anything itself. Given current state it only
//! decides which request the next navigation must carry
//! ([`next_request`]), and commits progress only once that request
//! succeeded ([`on_fetch_success`]). A failed fetch leaves every persisted
//! field untouched, so the identical letter/position is retried unchanged
//! on the next attempt.
use std::collections::HashMap;

use tracing::info;

use crate::{
    pages::{Namespace, clean_page_ref, ref_namespace},
    profiles::Profile,
};

/// Final page used when a profile carries none.
const FALLBACK_FINAL_PAGE: &str = "philosophie";

/// Durable client-local keys. Internal contract, not wire-visible.
pub mod keys {
    pub const PROFILE_NAME: &str = "profileName";
    pub const COVERTS: &str = "coverts";
    pub const TRIGGERS: &str = "triggers";
    pub const FINALPAGE: &str = "finalpage";
    pub const SECRET: &str = "secret";
    pub const WORD: &str = "word";
    pub const LETTER_POSITION: &str = "letterPosition";
    pub const CURRENT_LETTER_INDEX: &str = "currentLetterIndex";
    pub const COVERT_PAGE: &str = "covertPage";
    pub const LAST_FETCHED_PAGE: &str = "lastFetchedPage";
    pub const INSTANT_REPLACE: &str = "instantReplace";
}

/// Reveal-only keys, cleared on finalization or cancel. Profile metadata
/// (profileName, coverts, triggers, finalpage) survives for reuse.
const REVEAL_KEYS: [&str; 6] = [
    keys::WORD,
    keys::LETTER_POSITION,
    keys::SECRET,
    keys::CURRENT_LETTER_INDEX,
    keys::COVERT_PAGE,
    keys::LAST_FETCHED_PAGE,
];

/// Narrow durable storage port; any key-value medium that survives
/// navigation teardown qualifies.
pub trait SessionStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
    fn clear(&mut self);
}

/// In-memory store, used by tests and embedders without a durable medium.
#[derive(Debug, Default)]
pub struct MemoryStore(HashMap<String, String>);

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.0.remove(key);
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Active,
    Finalized,
}

/// Request parameters the next outgoing page navigation must carry.
#[derive(Clone, Debug, PartialEq)]
pub enum PageRequest {
    Plain {
        ns: Namespace,
        title: String,
    },
    Letter {
        ns: Namespace,
        title: String,
        letter: char,
        /// One-based wire form; the route layer converts to zero-based.
        position: u32,
    },
    Final {
        ns: Namespace,
        title: String,
        final_page: String,
    },
}

impl PageRequest {
    /// Wire path for the request.
    pub fn path(&self) -> String {
        use crate::fetch::encode_component;
        match self {
            PageRequest::Plain { ns, title } => {
                format!("{}/{}", ns.route_prefix(), encode_component(title))
            }
            PageRequest::Letter {
                ns,
                title,
                letter,
                position,
            } => format!(
                "{}/{}/{letter}/{position}",
                ns.route_prefix(),
                encode_component(title)
            ),
            PageRequest::Final {
                ns,
                title,
                final_page,
            } => format!(
                "{}/{}/{}",
                ns.route_prefix(),
                encode_component(title),
                encode_component(final_page)
            ),
        }
    }
}

/// Begins a session the instant a trigger is recognized: persists the
/// owning profile's metadata, resets per-reveal state, and fixes the chosen
/// covert page for the session lifetime.
pub fn start(
    store: &mut impl SessionStore,
    profile_name: &str,
    profile: &Profile,
    trigger: &str,
    covert_page: &str,
) {
    info!("reveal session started for profile {profile_name}");

    store.set(
        keys::COVERTS,
        &serde_json::to_string(&profile.coverts).unwrap_or_default(),
    );
    store.set(
        keys::TRIGGERS,
        &serde_json::to_string(&profile.triggers).unwrap_or_default(),
    );
    match &profile.finalpage {
        Some(page) => store.set(keys::FINALPAGE, page),
        None => store.remove(keys::FINALPAGE),
    }
    store.set(keys::PROFILE_NAME, profile_name);
    store.set(keys::SECRET, trigger);
    store.set(
        keys::INSTANT_REPLACE,
        if profile.instant_replace { "1" } else { "0" },
    );

    store.remove(keys::WORD);
    store.remove(keys::LETTER_POSITION);
    store.remove(keys::LAST_FETCHED_PAGE);
    store.set(keys::CURRENT_LETTER_INDEX, "0");
    store.set(keys::COVERT_PAGE, covert_page);
}

/// Records the decoded word and position once the capture terminator is
/// seen, restarting the letter walk from index zero.
pub fn record_word(store: &mut impl SessionStore, position: u32, word: &str) {
    if !word.is_empty() {
        store.set(keys::WORD, word);
    }
    store.set(keys::LETTER_POSITION, &position.to_string());
    store.set(keys::CURRENT_LETTER_INDEX, "0");
}

/// Discards all reveal-only state; profile metadata is retained.
pub fn cancel(store: &mut impl SessionStore) {
    for key in REVEAL_KEYS {
        store.remove(key);
    }
}

pub fn phase(store: &impl SessionStore) -> Phase {
    let word = store.get(keys::WORD).unwrap_or_default();
    if word.is_empty() || store.get(keys::LETTER_POSITION).is_none() {
        return Phase::Idle;
    }
    if read_index(store) >= word.chars().count() {
        Phase::Finalized
    } else {
        Phase::Active
    }
}

/// Decides what the next outgoing request must carry for a navigation to
/// `title` inside `current_ns`. Pure read of persisted state.
pub fn next_request(
    store: &impl SessionStore,
    title: &str,
    current_ns: Namespace,
) -> PageRequest {
    let word = store.get(keys::WORD).unwrap_or_default();

    // An empty word always takes the unfiltered path.
    if word.is_empty() || store.get(keys::LETTER_POSITION).is_none() {
        return PageRequest::Plain {
            ns: current_ns,
            title: title.to_string(),
        };
    }

    let index = read_index(store);
    if index >= word.chars().count() {
        let reference = store
            .get(keys::FINALPAGE)
            .unwrap_or_else(|| FALLBACK_FINAL_PAGE.to_string());
        return PageRequest::Final {
            ns: ref_namespace(&reference),
            title: title.to_string(),
            final_page: clean_page_ref(&reference),
        };
    }

    let letter = word.chars().nth(index).unwrap_or('a');
    PageRequest::Letter {
        ns: current_ns,
        title: title.to_string(),
        letter,
        position: read_position(store),
    }
}

/// Commits the transition for a request that completed successfully. The
/// letter index only ever advances here, so a failed fetch retries the
/// identical request.
pub fn on_fetch_success(store: &mut impl SessionStore, request: &PageRequest) {
    match request {
        PageRequest::Plain { title, .. } => {
            store.set(keys::LAST_FETCHED_PAGE, title);
        }
        PageRequest::Letter { title, .. } => {
            store.set(keys::LAST_FETCHED_PAGE, title);
            let next = read_index(store) + 1;
            store.set(keys::CURRENT_LETTER_INDEX, &next.to_string());
        }
        PageRequest::Final { .. } => {
            info!("reveal complete, clearing session");
            cancel(store);
        }
    }
}

/// Corrupt or missing numerics are coerced to 0, never raised.
fn read_index(store: &impl SessionStore) -> usize {
    read_coerced(store, keys::CURRENT_LETTER_INDEX)
}

fn read_position(store: &impl SessionStore) -> u32 {
    read_coerced::<u32>(store, keys::LETTER_POSITION)
}

fn read_coerced<T: std::str::FromStr + Default>(store: &impl SessionStore, key: &str) -> T {
    store
        .get(key)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> Profile {
        Profile {
            coverts: vec!["/wikiPage/Chat".to_string(), "fromage".to_string()],
            triggers: vec!["ABCD".to_string()],
            finalpage: Some("/dicoPage/philosophie".to_string()),
            instant_replace: false,
        }
    }

    fn started() -> MemoryStore {
        let mut store = MemoryStore::default();
        start(&mut store, "alice", &profile(), "ABCD", "chat");
        store
    }

    #[test]
    fn test_start_resets_reveal_state() {
        let store = started();

        assert_eq!(store.get(keys::PROFILE_NAME).as_deref(), Some("alice"));
        assert_eq!(store.get(keys::SECRET).as_deref(), Some("ABCD"));
        assert_eq!(store.get(keys::COVERT_PAGE).as_deref(), Some("chat"));
        assert_eq!(store.get(keys::CURRENT_LETTER_INDEX).as_deref(), Some("0"));
        assert_eq!(store.get(keys::WORD), None);
        assert_eq!(phase(&store), Phase::Idle);
    }

    #[test]
    fn test_empty_word_always_takes_plain_path() {
        let store = started();

        let request = next_request(&store, "chat", Namespace::Wiki);
        assert_eq!(
            request,
            PageRequest::Plain {
                ns: Namespace::Wiki,
                title: "chat".to_string()
            }
        );
    }

    #[test]
    fn test_letter_walk_and_finalization() {
        let mut store = started();
        record_word(&mut store, 2, "dog");
        assert_eq!(phase(&store), Phase::Active);

        // three successful letter fetches: index 0 -> 1 -> 2 -> 3
        for expected in ['d', 'o', 'g'] {
            let request = next_request(&store, "chat", Namespace::Wiki);
            match &request {
                PageRequest::Letter {
                    letter, position, ..
                } => {
                    assert_eq!(*letter, expected);
                    assert_eq!(*position, 2);
                }
                other => panic!("expected letter request, got {other:?}"),
            }
            on_fetch_success(&mut store, &request);
        }

        assert_eq!(store.get(keys::CURRENT_LETTER_INDEX).as_deref(), Some("3"));
        assert_eq!(phase(&store), Phase::Finalized);

        // the next navigation must request the final page
        let request = next_request(&store, "chat", Namespace::Wiki);
        assert_eq!(
            request,
            PageRequest::Final {
                ns: Namespace::Dico,
                title: "chat".to_string(),
                final_page: "philosophie".to_string(),
            }
        );

        on_fetch_success(&mut store, &request);

        // reveal-only keys cleared, profile metadata retained
        assert_eq!(store.get(keys::WORD), None);
        assert_eq!(store.get(keys::LETTER_POSITION), None);
        assert_eq!(store.get(keys::SECRET), None);
        assert_eq!(store.get(keys::CURRENT_LETTER_INDEX), None);
        assert_eq!(store.get(keys::PROFILE_NAME).as_deref(), Some("alice"));
        assert!(store.get(keys::COVERTS).is_some());
        assert!(store.get(keys::TRIGGERS).is_some());
        assert!(store.get(keys::FINALPAGE).is_some());
        assert_eq!(phase(&store), Phase::Idle);
    }

    #[test]
    fn test_failed_fetch_retries_identical_request() {
        let mut store = started();
        record_word(&mut store, 1, "chat");

        let first = next_request(&store, "fromage", Namespace::Wiki);
        // no on_fetch_success: the fetch failed, state must be unchanged
        let retry = next_request(&store, "fromage", Namespace::Wiki);
        assert_eq!(first, retry);
    }

    #[test]
    fn test_cancel_keeps_profile_metadata() {
        let mut store = started();
        record_word(&mut store, 1, "chat");

        cancel(&mut store);

        assert_eq!(store.get(keys::WORD), None);
        assert_eq!(store.get(keys::SECRET), None);
        assert_eq!(store.get(keys::PROFILE_NAME).as_deref(), Some("alice"));
        assert_eq!(phase(&store), Phase::Idle);
    }

    #[test]
    fn test_corrupt_index_coerced_to_zero() {
        let mut store = started();
        record_word(&mut store, 2, "dog");
        store.set(keys::CURRENT_LETTER_INDEX, "garbage");

        let request = next_request(&store, "chat", Namespace::Wiki);
        match request {
            PageRequest::Letter { letter, .. } => assert_eq!(letter, 'd'),
            other => panic!("expected letter request, got {other:?}"),
        }
    }

    #[test]
    fn test_final_page_falls_back_when_profile_has_none() {
        let mut store = MemoryStore::default();
        let mut bare = profile();
        bare.finalpage = None;
        start(&mut store, "alice", &bare, "ABCD", "chat");
        record_word(&mut store, 1, "a");
        let request = next_request(&store, "chat", Namespace::Wiki);
        on_fetch_success(&mut store, &request);

        let request = next_request(&store, "chat", Namespace::Wiki);
        assert_eq!(
            request,
            PageRequest::Final {
                ns: Namespace::Wiki,
                title: "chat".to_string(),
                final_page: "philosophie".to_string(),
            }
        );
    }

    #[test]
    fn test_request_paths() {
        let plain = PageRequest::Plain {
            ns: Namespace::Wiki,
            title: "chat".to_string(),
        };
        assert_eq!(plain.path(), "/wikiPage/chat");

        let letter = PageRequest::Letter {
            ns: Namespace::Wiki,
            title: "chat".to_string(),
            letter: 'h',
            position: 2,
        };
        assert_eq!(letter.path(), "/wikiPage/chat/h/2");

        let fin = PageRequest::Final {
            ns: Namespace::Dico,
            title: "chat".to_string(),
            final_page: "philosophie".to_string(),
        };
        assert_eq!(fin.path(), "/dicoPage/chat/philosophie");
    }
}
