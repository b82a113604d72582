//! Memoized, validated and paced access to a text service.
use crate::cache::cache_key;
use crate::cache::KeyValueStore;
use crate::config::Config;
use crate::oracle::ContextRoomsRequest;
use crate::oracle::OracleError;
use crate::oracle::ProposedSession;
use crate::oracle::SlotRequest;
use crate::oracle::TextOracle;
use crate::schedule::categories::repair_mapping;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;
use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;
use std::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;

// Bumped whenever the request or answer shape of a kind changes
const SLOT_VERSION: &str = "slots-4";
const CATEGORY_VERSION: &str = "categories-1";
const TIMEZONE_VERSION: &str = "timezone-1";
const ROOMS_VERSION: &str = "rooms-2";

/// Retry and pacing rules for service calls
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CallPolicy {
    pub max_attempts: u32,
    /// Wait before retry `n` is `n * backoff`
    pub backoff: Duration,
    /// Minimum delay between the starts of two calls
    pub min_interval: Duration,
}

impl CallPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.backoff(1),
            min_interval: config.min_call_interval(),
        }
    }

    /// Single attempt without pacing, for services that never fail transiently
    pub fn immediate() -> Self {
        Self { max_attempts: 1, backoff: Duration::ZERO, min_interval: Duration::ZERO }
    }
}

fn is_retryable(error: &OracleError) -> bool {
    match error {
        OracleError::MissingApiKey(_) | OracleError::Unsupported(..) => false,
        OracleError::Status(code, _) => *code == 429 || *code >= 500,
        OracleError::Http(_) | OracleError::EmptyAnswer | OracleError::Malformed(_) => true,
    }
}

/// Plausible IANA identifier such as `Europe/Stockholm` or `UTC`
fn is_timezone_name(name: &str) -> bool {
    let name = name.trim();
    name == "UTC"
        || (name.contains('/')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-' | '+')))
}

/// Text service behind a key-value store.
///
/// Every request kind is keyed by its kind, the service name with the prompt version, and the
/// canonical request payload. Only validated answers are stored, so a failed call is retried
/// on the next run.
pub struct Gateway<S: KeyValueStore> {
    oracle: Box<dyn TextOracle>,
    store: S,
    policy: CallPolicy,
    last_call: Option<Instant>,
    calls: usize,
    cache_hits: usize,
}

impl<S: KeyValueStore> Gateway<S> {
    pub fn new(oracle: Box<dyn TextOracle>, store: S, policy: CallPolicy) -> Self {
        Self { oracle, store, policy, last_call: None, calls: 0, cache_hits: 0 }
    }

    /// Service calls made, retries included
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn cache_hits(&self) -> usize {
        self.cache_hits
    }

    pub fn oracle_name(&self) -> &'static str {
        self.oracle.name()
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn key(&self, kind: &str, version: &str, payload: &Value) -> String {
        cache_key(kind, &format!("{}:{}", self.oracle.name(), version), payload)
    }

    fn cached<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        let value = self.store.get(key)?;
        match serde_json::from_value(value) {
            Ok(answer) => {
                self.cache_hits += 1;
                debug!(key, "cache hit");
                Some(answer)
            }
            Err(error) => {
                debug!(key, %error, "stale cache entry ignored");
                None
            }
        }
    }

    fn remember<T: Serialize>(&mut self, key: &str, answer: &T) {
        match serde_json::to_value(answer) {
            Ok(value) => self.store.put(key, &value),
            Err(error) => warn!(key, %error, "answer not cached"),
        }
    }

    fn pace(&mut self) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.policy.min_interval {
                thread::sleep(self.policy.min_interval - elapsed);
            }
        }
        self.last_call = Some(Instant::now());
    }

    /// Calls the service until it answers or the attempts run out
    fn attempt<T, F>(&mut self, kind: &str, request: F) -> Option<T>
    where
        F: Fn(&dyn TextOracle) -> Result<T, OracleError>,
    {
        for attempt in 1..=self.policy.max_attempts {
            self.pace();
            self.calls += 1;
            match request(self.oracle.as_ref()) {
                Ok(answer) => return Some(answer),
                Err(error) if is_retryable(&error) && attempt < self.policy.max_attempts => {
                    let wait = self.policy.backoff * attempt;
                    warn!(kind, attempt, wait_secs = wait.as_secs(), %error, "service call failed, retrying");
                    thread::sleep(wait);
                }
                Err(error) => {
                    warn!(kind, attempt, %error, "service call failed");
                    return None;
                }
            }
        }
        None
    }

    /// Proposed sessions of a slot, empty when the service cannot answer
    pub fn slot_sessions(&mut self, request: &SlotRequest) -> Vec<ProposedSession> {
        let payload = match serde_json::to_value(request) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%error, "slot request not serializable");
                return Vec::new();
            }
        };
        let key = self.key("slot", SLOT_VERSION, &payload);
        if let Some(sessions) = self.cached::<Vec<ProposedSession>>(&key) {
            return sessions;
        }

        match self.attempt("slot", |oracle| oracle.slot_sessions(request)) {
            Some(sessions) => {
                debug!(day = %request.day, start = %request.block_start, sessions = sessions.len(), "slot answered");
                self.remember(&key, &sessions);
                sessions
            }
            None => Vec::new(),
        }
    }

    /// Total mapping over `labels`; identity for labels the service leaves out
    pub fn category_mapping(&mut self, labels: &[String]) -> BTreeMap<String, String> {
        let key = self.key("categories", CATEGORY_VERSION, &json!({ "labels": labels }));
        let raw = match self.cached::<BTreeMap<String, String>>(&key) {
            Some(mapping) => mapping,
            None => match self.attempt("categories", |oracle| oracle.category_mapping(labels)) {
                Some(mapping) => {
                    self.remember(&key, &mapping);
                    mapping
                }
                None => BTreeMap::new(),
            },
        };
        repair_mapping(labels, raw)
    }

    /// IANA timezone of a location line
    pub fn timezone(&mut self, location: &str) -> Option<String> {
        let key = self.key("timezone", TIMEZONE_VERSION, &json!({ "location": location }));
        if let Some(timezone) = self.cached::<String>(&key) {
            return Some(timezone);
        }

        let timezone = self.attempt("timezone", |oracle| oracle.timezone(location))?;
        let timezone = timezone.trim().to_owned();
        if !is_timezone_name(&timezone) {
            warn!(%timezone, "implausible timezone ignored");
            return None;
        }
        info!(%location, %timezone, "timezone resolved");
        self.remember(&key, &timezone);
        Some(timezone)
    }

    /// Rooms a table heading refers to, restricted to the available names
    pub fn context_rooms(&mut self, request: &ContextRoomsRequest) -> Option<Vec<String>> {
        let payload = json!({
            "context": request.context,
            "online": request.online,
            "offline": request.offline,
            "needed": request.needed,
        });
        let key = self.key("rooms", ROOMS_VERSION, &payload);
        if let Some(names) = self.cached::<Vec<String>>(&key) {
            return Some(names);
        }

        let answer = self.attempt("rooms", |oracle| oracle.context_rooms(request))?;
        let available = request.available();
        let mut names: Vec<String> = Vec::new();
        for name in answer {
            let name = name.trim().to_owned();
            if available.contains(&name) && !names.contains(&name) {
                names.push(name);
            }
        }
        names.truncate(request.needed);
        if names.is_empty() {
            debug!(context = %request.context, "no known room named by heading");
            return None;
        }
        self.remember(&key, &names);
        Some(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::oracle::PrimaryEntry;
    use crate::schedule::Day;
    use std::cell::Cell;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Replays scripted slot answers and counts every call
    #[derive(Default)]
    struct ScriptedOracle {
        slots: RefCell<VecDeque<Result<Vec<ProposedSession>, OracleError>>>,
        rooms: Vec<String>,
        timezone: String,
        calls: Rc<Cell<usize>>,
    }

    impl TextOracle for ScriptedOracle {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn slot_sessions(&self, _request: &SlotRequest) -> Result<Vec<ProposedSession>, OracleError> {
            self.calls.set(self.calls.get() + 1);
            self.slots.borrow_mut().pop_front().unwrap_or(Err(OracleError::EmptyAnswer))
        }

        fn category_mapping(&self, labels: &[String]) -> Result<BTreeMap<String, String>, OracleError> {
            self.calls.set(self.calls.get() + 1);
            Ok(labels.iter().take(1).map(|label| (label.clone(), "Family".to_owned())).collect())
        }

        fn timezone(&self, _location: &str) -> Result<String, OracleError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.timezone.clone())
        }

        fn context_rooms(&self, _request: &ContextRoomsRequest) -> Result<Vec<String>, OracleError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.rooms.clone())
        }
    }

    fn policy() -> CallPolicy {
        CallPolicy { max_attempts: 3, backoff: Duration::ZERO, min_interval: Duration::ZERO }
    }

    fn request() -> SlotRequest {
        SlotRequest {
            day: Day::Wednesday,
            block_start: "14:30".to_owned(),
            block_end: "16:30".to_owned(),
            block_duration: 120,
            rooms: Vec::new(),
            primary: vec![PrimaryEntry { room: "primary room".to_owned(), text: "R20 A-IoT (120)".to_owned() }],
            supplementary: Vec::new(),
        }
    }

    fn session(name: &str) -> ProposedSession {
        ProposedSession {
            room_alias: "primary room".to_owned(),
            name: name.to_owned(),
            duration_minutes: 120,
            chair: None,
            group_header: String::new(),
            agenda_item: None,
        }
    }

    #[test]
    fn identical_requests_are_answered_from_the_store() {
        let calls = Rc::new(Cell::new(0));
        let oracle = ScriptedOracle {
            slots: RefCell::new(VecDeque::from([Ok(vec![session("R20 A-IoT")])])),
            calls: calls.clone(),
            ..ScriptedOracle::default()
        };
        let mut gateway = Gateway::new(Box::new(oracle), MemoryStore::default(), policy());
        assert_eq!(gateway.slot_sessions(&request()), vec![session("R20 A-IoT")]);
        assert_eq!(gateway.calls(), 1);
        let store = gateway.into_store();

        let oracle = ScriptedOracle { calls: calls.clone(), ..ScriptedOracle::default() };
        let mut gateway = Gateway::new(Box::new(oracle), store, policy());
        assert_eq!(gateway.slot_sessions(&request()), vec![session("R20 A-IoT")]);
        assert_eq!(gateway.calls(), 0);
        assert_eq!(gateway.cache_hits(), 1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn transient_failures_are_retried() {
        let oracle = ScriptedOracle {
            slots: RefCell::new(VecDeque::from([
                Err(OracleError::Status(503, "busy".to_owned())),
                Err(OracleError::Malformed("truncated".to_owned())),
                Ok(vec![session("R20 A-IoT")]),
            ])),
            ..ScriptedOracle::default()
        };
        let mut gateway = Gateway::new(Box::new(oracle), MemoryStore::default(), policy());
        assert_eq!(gateway.slot_sessions(&request()).len(), 1);
        assert_eq!(gateway.calls(), 3);
    }

    #[test]
    fn exhausted_attempts_give_nothing_and_are_not_stored() {
        let oracle = ScriptedOracle::default();
        let mut gateway = Gateway::new(Box::new(oracle), MemoryStore::default(), policy());
        assert!(gateway.slot_sessions(&request()).is_empty());
        assert_eq!(gateway.calls(), 3);
        assert!(gateway.into_store().is_empty());
    }

    #[test]
    fn client_errors_are_not_retried() {
        let oracle = ScriptedOracle {
            slots: RefCell::new(VecDeque::from([Err(OracleError::Status(400, "bad request".to_owned()))])),
            ..ScriptedOracle::default()
        };
        let mut gateway = Gateway::new(Box::new(oracle), MemoryStore::default(), policy());
        assert!(gateway.slot_sessions(&request()).is_empty());
        assert_eq!(gateway.calls(), 1);
    }

    #[test]
    fn category_answers_are_made_total() {
        let mut gateway = Gateway::new(Box::new(ScriptedOracle::default()), MemoryStore::default(), policy());
        let labels = vec!["6GR / Overall".to_owned(), "R20".to_owned()];
        let mapping = gateway.category_mapping(&labels);
        assert_eq!(mapping["6GR / Overall"], "Family");
        assert_eq!(mapping["R20"], "R20");
    }

    #[test]
    fn room_answers_are_restricted_to_available_names() {
        let oracle = ScriptedOracle {
            rooms: vec!["Z9".to_owned(), "A3".to_owned(), "A3".to_owned(), "A1".to_owned()],
            ..ScriptedOracle::default()
        };
        let mut gateway = Gateway::new(Box::new(oracle), MemoryStore::default(), policy());
        let request = ContextRoomsRequest {
            context: "Brk#2".to_owned(),
            online: vec!["F1+F2+F3".to_owned(), "A1".to_owned(), "A3".to_owned()],
            offline: Vec::new(),
            needed: 1,
        };
        assert_eq!(gateway.context_rooms(&request), Some(vec!["A3".to_owned()]));
        assert_eq!(gateway.context_rooms(&request), Some(vec!["A3".to_owned()]));
        assert_eq!(gateway.calls(), 1);
    }

    #[test]
    fn implausible_timezones_are_rejected() {
        let oracle = ScriptedOracle { timezone: "somewhere nice".to_owned(), ..ScriptedOracle::default() };
        let mut gateway = Gateway::new(Box::new(oracle), MemoryStore::default(), policy());
        assert_eq!(gateway.timezone("Gothenburg, SE"), None);

        let oracle = ScriptedOracle { timezone: "Europe/Stockholm".to_owned(), ..ScriptedOracle::default() };
        let mut gateway = Gateway::new(Box::new(oracle), MemoryStore::default(), policy());
        assert_eq!(gateway.timezone("Gothenburg, SE").as_deref(), Some("Europe/Stockholm"));
    }
}
