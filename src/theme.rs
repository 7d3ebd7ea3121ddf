//! Defines the [`PreferenceStore`], the single owner of the light/dark theme
//! preference, along with the seams it talks to: a durable [`Storage`] slot,
//! a [`ColorSchemeSignal`], and a [`StyleScope`] on the document root.
//!
//! Initialization happens in two phases. [`PreferenceStore::new`] always
//! yields the disabled preference so that a pre-rendered page is identical no
//! matter which environment renders it. [`PreferenceStore::finalize`] then
//! inspects the environment once, replaces the value, and notifies
//! subscribers. Site builds never call `finalize`.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// The key under which the preference is persisted.
pub const STORAGE_KEY: &str = "isDarkMode";

/// The class added to the document root while dark mode is enabled.
pub const DARK_CLASS: &str = "dark";

const DARK_THEME_COLOR: &str = "#111827";
const LIGHT_THEME_COLOR: &str = "#fbcfe8";

/// The theme preference. Rendered into every page context as `theme`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Preference {
    pub is_dark_enabled: bool,
}

impl Preference {
    /// The class to put on the document root, if any.
    pub fn root_class(&self) -> Option<&'static str> {
        if self.is_dark_enabled {
            Some(DARK_CLASS)
        } else {
            None
        }
    }

    /// The value for the `theme-color` meta tag.
    pub fn theme_color(&self) -> &'static str {
        if self.is_dark_enabled {
            DARK_THEME_COLOR
        } else {
            LIGHT_THEME_COLOR
        }
    }
}

impl Serialize for Preference {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Preference", 3)?;
        s.serialize_field("is_dark_enabled", &self.is_dark_enabled)?;
        s.serialize_field("root_class", &self.root_class())?;
        s.serialize_field("theme_color", self.theme_color())?;
        s.end()
    }
}

/// A durable key-value slot that survives across sessions.
pub trait Storage {
    /// Returns the stored value for `key`, or `None` if nothing is stored.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`.
    fn set(&mut self, key: &str, value: &str) -> std::io::Result<()>;
}

/// A read-only indicator of the ambient color-scheme preference.
pub trait ColorSchemeSignal {
    /// Returns `Some(true)` if the environment prefers a dark color scheme,
    /// `Some(false)` if it doesn't, and `None` if the signal is unavailable.
    fn prefers_dark(&self) -> Option<bool>;
}

/// The document root on which the dark marker is toggled.
pub trait StyleScope {
    fn add_marker(&mut self, marker: &str);
    fn remove_marker(&mut self, marker: &str);
}

/// The environment a [`PreferenceStore`] runs in. Every capability is
/// optional; a missing capability is the normal pre-render case, not an
/// error.
#[derive(Default)]
pub struct Client {
    pub storage: Option<Box<dyn Storage>>,
    pub signal: Option<Box<dyn ColorSchemeSignal>>,
    pub scope: Option<Box<dyn StyleScope>>,
}

impl Client {
    /// A client with no storage, no signal and no document.
    pub fn headless() -> Client {
        Client::default()
    }
}

/// Identifies a subscription so it can be cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubscriptionId(usize);

type Subscriber = Box<dyn FnMut(Preference)>;

/// Owns the theme preference, applies it to the style scope, persists it, and
/// broadcasts changes to subscribers.
pub struct PreferenceStore {
    preference: Preference,
    client: Client,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: usize,
    finalized: bool,
}

impl PreferenceStore {
    /// Constructs the store with dark mode disabled. Nothing is read from or
    /// written to the client here.
    pub fn new(client: Client) -> PreferenceStore {
        PreferenceStore {
            preference: Preference::default(),
            client,
            subscribers: Vec::new(),
            next_subscription: 0,
            finalized: false,
        }
    }

    /// The current preference.
    pub fn preference(&self) -> Preference {
        self.preference
    }

    pub fn is_dark_enabled(&self) -> bool {
        self.preference.is_dark_enabled
    }

    /// Whether [`PreferenceStore::finalize`] has run.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Inspects the client: a stored `"true"` wins; with nothing stored the
    /// system signal decides; anything else, or no client capabilities at
    /// all, resolves to `false`.
    pub fn resolve_preference(&self) -> bool {
        let storage = match &self.client.storage {
            Some(storage) => storage,
            None => return false,
        };
        match storage.get(STORAGE_KEY).as_deref() {
            Some("true") => true,
            Some(_) => false,
            None => self
                .client
                .signal
                .as_ref()
                .and_then(|signal| signal.prefers_dark())
                .unwrap_or(false),
        }
    }

    /// Runs the one-time environment resolution and publishes the result.
    /// Later calls return the current value without touching the client.
    pub fn finalize(&mut self) -> bool {
        if self.finalized {
            tracing::debug!("preference store already finalized");
            return self.is_dark_enabled();
        }
        self.finalized = true;
        let resolved = self.resolve_preference();
        tracing::debug!(dark = resolved, "resolved theme preference");
        self.set(resolved);
        resolved
    }

    /// Flips the preference and publishes the new value.
    pub fn toggle(&mut self) -> bool {
        let flipped = !self.is_dark_enabled();
        self.set(flipped);
        flipped
    }

    /// Registers `subscriber` to be called with the current preference after
    /// every change.
    pub fn subscribe<F>(&mut self, subscriber: F) -> SubscriptionId
    where
        F: FnMut(Preference) + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    /// Removes a subscriber. Returns `false` if `id` wasn't subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    fn set(&mut self, value: bool) {
        self.preference = Preference {
            is_dark_enabled: value,
        };
        self.apply_preference();
        self.persist();
        let preference = self.preference;
        for (_, subscriber) in self.subscribers.iter_mut() {
            subscriber(preference);
        }
    }

    fn apply_preference(&mut self) {
        if let Some(scope) = &mut self.client.scope {
            if self.preference.is_dark_enabled {
                scope.add_marker(DARK_CLASS);
            } else {
                scope.remove_marker(DARK_CLASS);
            }
        }
    }

    fn persist(&mut self) {
        let value = if self.preference.is_dark_enabled {
            "true"
        } else {
            "false"
        };
        if let Some(storage) = &mut self.client.storage {
            if let Err(err) = storage.set(STORAGE_KEY, value) {
                tracing::warn!(%err, "failed to persist theme preference");
            }
        }
    }
}

impl fmt::Debug for PreferenceStore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PreferenceStore")
            .field("preference", &self.preference)
            .field("finalized", &self.finalized)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// A [`Storage`] backed by a YAML string map on disk. The file is read on
/// every `get` and rewritten on every `set`.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new<P: Into<PathBuf>>(path: P) -> FileStorage {
        FileStorage { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> std::io::Result<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => serde_yaml::from_str(&contents).map_err(|e| {
                std::io::Error::new(std::io::ErrorKind::InvalidData, e)
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(BTreeMap::new())
            }
            Err(e) => Err(e),
        }
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        match self.load() {
            Ok(mut values) => values.remove(key),
            Err(err) => {
                tracing::warn!(
                    %err,
                    path = %self.path.display(),
                    "ignoring unreadable preference file"
                );
                None
            }
        }
    }

    fn set(&mut self, key: &str, value: &str) -> std::io::Result<()> {
        // An unreadable file is replaced rather than preserved.
        let mut values = self.load().unwrap_or_default();
        values.insert(key.to_owned(), value.to_owned());
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let contents = serde_yaml::to_string(&values).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e)
        })?;
        std::fs::write(&self.path, contents)
    }
}

/// A [`ColorSchemeSignal`] read from the terminal's `COLORFGBG` variable.
pub struct TerminalSignal {
    value: Option<String>,
}

impl TerminalSignal {
    /// Reads `COLORFGBG` from the process environment.
    pub fn from_env() -> TerminalSignal {
        TerminalSignal {
            value: std::env::var("COLORFGBG").ok(),
        }
    }

    pub fn new(value: Option<String>) -> TerminalSignal {
        TerminalSignal { value }
    }
}

impl ColorSchemeSignal for TerminalSignal {
    fn prefers_dark(&self) -> Option<bool> {
        self.value.as_deref().and_then(parse_colorfgbg)
    }
}

/// `COLORFGBG` looks like `15;0` or `15;default;0`; the last field is the
/// background color index. Indices 0-6 and 8 are dark.
fn parse_colorfgbg(value: &str) -> Option<bool> {
    let background: u8 = value.rsplit(';').next()?.trim().parse().ok()?;
    Some(background <= 6 || background == 8)
}

/// The class list of a document root.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RootClassList(BTreeSet<String>);

impl RootClassList {
    pub fn contains(&self, class: &str) -> bool {
        self.0.contains(class)
    }
}

impl fmt::Display for RootClassList {
    /// Displays the classes as a space-separated `class` attribute value.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for class in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(class)?;
            first = false;
        }
        Ok(())
    }
}

impl StyleScope for RootClassList {
    fn add_marker(&mut self, marker: &str) {
        self.0.insert(marker.to_owned());
    }

    fn remove_marker(&mut self, marker: &str) {
        self.0.remove(marker);
    }
}

impl<T: StyleScope> StyleScope for std::rc::Rc<std::cell::RefCell<T>> {
    fn add_marker(&mut self, marker: &str) {
        self.borrow_mut().add_marker(marker)
    }

    fn remove_marker(&mut self, marker: &str) {
        self.borrow_mut().remove_marker(marker)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    /// Records every write so tests can see exactly what was persisted.
    #[derive(Clone, Default)]
    struct RecordingStorage {
        values: Rc<RefCell<HashMap<String, String>>>,
        writes: Rc<RefCell<Vec<String>>>,
    }

    impl RecordingStorage {
        fn with(key: &str, value: &str) -> RecordingStorage {
            let storage = RecordingStorage::default();
            storage
                .values
                .borrow_mut()
                .insert(key.to_owned(), value.to_owned());
            storage
        }
    }

    impl Storage for RecordingStorage {
        fn get(&self, key: &str) -> Option<String> {
            self.values.borrow().get(key).cloned()
        }

        fn set(&mut self, key: &str, value: &str) -> std::io::Result<()> {
            self.values
                .borrow_mut()
                .insert(key.to_owned(), value.to_owned());
            self.writes.borrow_mut().push(value.to_owned());
            Ok(())
        }
    }

    struct FixedSignal(Option<bool>);

    impl ColorSchemeSignal for FixedSignal {
        fn prefers_dark(&self) -> Option<bool> {
            self.0
        }
    }

    fn client(storage: &RecordingStorage, signal: Option<bool>) -> Client {
        Client {
            storage: Some(Box::new(storage.clone())),
            signal: Some(Box::new(FixedSignal(signal))),
            scope: None,
        }
    }

    #[test]
    fn test_new_is_disabled_regardless_of_environment() {
        let storage = RecordingStorage::with(STORAGE_KEY, "true");
        let store = PreferenceStore::new(client(&storage, Some(true)));
        assert!(!store.is_dark_enabled());
        assert!(!store.is_finalized());
        assert!(storage.writes.borrow().is_empty());
    }

    #[test]
    fn test_stored_true_wins_over_signal() {
        let storage = RecordingStorage::with(STORAGE_KEY, "true");
        let store = PreferenceStore::new(client(&storage, Some(false)));
        assert!(store.resolve_preference());
    }

    #[test]
    fn test_stored_false_ignores_signal() {
        let storage = RecordingStorage::with(STORAGE_KEY, "false");
        let store = PreferenceStore::new(client(&storage, Some(true)));
        assert!(!store.resolve_preference());
    }

    #[test]
    fn test_no_stored_value_uses_signal() {
        let storage = RecordingStorage::default();
        let dark = PreferenceStore::new(client(&storage, Some(true)));
        assert!(dark.resolve_preference());

        let light = PreferenceStore::new(client(&storage, Some(false)));
        assert!(!light.resolve_preference());

        let unavailable = PreferenceStore::new(client(&storage, None));
        assert!(!unavailable.resolve_preference());
    }

    #[test]
    fn test_headless_resolves_to_disabled() {
        let mut store = PreferenceStore::new(Client::headless());
        assert!(!store.resolve_preference());
        assert!(!store.finalize());
        assert!(store.is_finalized());
    }

    #[test]
    fn test_toggle_parity() {
        for n in 0..8 {
            let mut store = PreferenceStore::new(Client::headless());
            for _ in 0..n {
                store.toggle();
            }
            assert_eq!(n % 2 == 1, store.is_dark_enabled(), "{} toggles", n);
        }
    }

    #[test]
    fn test_persist_tracks_current_value() {
        let storage = RecordingStorage::default();
        let mut store = PreferenceStore::new(client(&storage, Some(true)));
        let mut wanted = vec![String::from("true")];
        store.finalize();
        for _ in 0..3 {
            let value = store.toggle();
            wanted.push(value.to_string());
        }
        assert_eq!(wanted, *storage.writes.borrow());
        assert_eq!(
            Some(store.is_dark_enabled().to_string()),
            storage.get(STORAGE_KEY)
        );
    }

    #[test]
    fn test_finalize_runs_once() {
        let storage = RecordingStorage::default();
        let mut store = PreferenceStore::new(client(&storage, Some(true)));
        assert!(store.finalize());
        store.toggle();
        assert!(!store.finalize());
        assert_eq!(vec!["true", "false"], *storage.writes.borrow());
    }

    #[test]
    fn test_finalize_overrides_earlier_toggle() {
        let storage = RecordingStorage::default();
        let mut store = PreferenceStore::new(client(&storage, Some(false)));
        assert!(store.toggle());
        assert!(!store.finalize());
        assert!(!store.is_dark_enabled());
    }

    #[test]
    fn test_scope_marker_follows_preference() {
        let scope = Rc::new(RefCell::new(RootClassList::default()));
        let mut store = PreferenceStore::new(Client {
            storage: Some(Box::new(RecordingStorage::with(STORAGE_KEY, "true"))),
            signal: None,
            scope: Some(Box::new(scope.clone())),
        });
        assert!(!scope.borrow().contains(DARK_CLASS));
        store.finalize();
        assert!(scope.borrow().contains(DARK_CLASS));
        assert_eq!("dark", scope.borrow().to_string());
        store.toggle();
        assert!(!scope.borrow().contains(DARK_CLASS));
        assert_eq!("", scope.borrow().to_string());
    }

    #[test]
    fn test_subscribers_see_current_value() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut store = PreferenceStore::new(Client::headless());
        let id = {
            let seen = seen.clone();
            store.subscribe(move |p: Preference| {
                seen.borrow_mut().push(p.is_dark_enabled)
            })
        };
        store.finalize();
        store.toggle();
        store.toggle();
        assert_eq!(vec![false, true, false], *seen.borrow());

        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.toggle();
        assert_eq!(3, seen.borrow().len());
    }

    #[test]
    fn test_preference_presentation() {
        let dark = Preference {
            is_dark_enabled: true,
        };
        assert_eq!(Some("dark"), dark.root_class());
        assert_eq!("#111827", dark.theme_color());
        assert_eq!(None, Preference::default().root_class());
        assert_eq!("#fbcfe8", Preference::default().theme_color());
    }

    #[test]
    fn test_parse_colorfgbg() {
        assert_eq!(Some(true), parse_colorfgbg("15;0"));
        assert_eq!(Some(true), parse_colorfgbg("15;default;8"));
        assert_eq!(Some(false), parse_colorfgbg("0;15"));
        assert_eq!(Some(false), parse_colorfgbg("0;7"));
        assert_eq!(None, parse_colorfgbg("garbage"));
        assert_eq!(None, parse_colorfgbg(""));
        assert_eq!(None, TerminalSignal::new(None).prefers_dark());
    }

    #[test]
    fn test_file_storage() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("state").join("preferences.yaml");
        let mut storage = FileStorage::new(&path);
        assert_eq!(None, storage.get(STORAGE_KEY));

        storage.set(STORAGE_KEY, "true")?;
        storage.set("other", "value")?;
        assert_eq!(Some(String::from("true")), storage.get(STORAGE_KEY));

        let reopened = FileStorage::new(&path);
        assert_eq!(Some(String::from("value")), reopened.get("other"));
        Ok(())
    }
}
