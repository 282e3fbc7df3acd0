use std::env;
use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;
use foldhash::{HashMap, HashMapExt};

/// Environment variable controlling instrumentation globally.
const GLOBAL_KEY: &str = "INSTRUMENT";

/// Prefix of the per-instance environment variables, `INSTRUMENT_<NAME>`.
const INSTANCE_KEY_PREFIX: &str = "INSTRUMENT_";

#[derive(Debug)]
struct Settings {
    global: bool,
    per_name: HashMap<String, bool>,
}

impl Settings {
    fn from_env() -> Self {
        let mut global = true;
        let mut per_name = HashMap::new();

        for (key, value) in env::vars() {
            if key == GLOBAL_KEY {
                global = parse_enabled(&value);
            } else if let Some(name) = key.strip_prefix(INSTANCE_KEY_PREFIX) {
                per_name.insert(name.to_owned(), parse_enabled(&value));
            }
        }

        Self { global, per_name }
    }
}

/// Anything other than an explicit "false" or "0" enables.
fn parse_enabled(value: &str) -> bool {
    !(value.eq_ignore_ascii_case("false") || value == "0")
}

/// Maps an instance name onto its environment variable suffix: uppercased, with every
/// non-alphanumeric character folded to an underscore.
fn normalize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Process-wide instrumentation toggles, sourced from the environment.
///
/// Instrumentation is on by default. `INSTRUMENT=false` turns everything off;
/// `INSTRUMENT_<NAME>=false` turns off one instrumented instance, where `<NAME>` is
/// the instance name uppercased with non-alphanumeric characters replaced by
/// underscores. An instance is enabled only when both the global and its own toggle
/// allow it.
///
/// The environment is read once at construction; call [`reload()`][Self::reload] to
/// pick up changes. Reads are a single lock-free snapshot load, cheap enough to sit on
/// the dispatch path.
#[derive(Debug)]
pub struct InstrumentationProperties {
    settings: ArcSwap<Settings>,
}

impl InstrumentationProperties {
    /// Reads the current environment into a fresh set of properties.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            settings: ArcSwap::from_pointee(Settings::from_env()),
        }
    }

    /// Builds properties from explicit values instead of the environment, for tests
    /// and embedded configuration. Names are normalized the same way the environment
    /// keys are.
    #[must_use]
    pub fn from_overrides<'a>(
        global: bool,
        overrides: impl IntoIterator<Item = (&'a str, bool)>,
    ) -> Self {
        let per_name = overrides
            .into_iter()
            .map(|(name, enabled)| (normalize(name), enabled))
            .collect();

        Self {
            settings: ArcSwap::from_pointee(Settings { global, per_name }),
        }
    }

    /// Re-reads the environment, atomically replacing the snapshot that all
    /// dispatchers consult.
    pub fn reload(&self) {
        self.settings.store(Arc::new(Settings::from_env()));
    }

    /// Whether the named instance should currently be instrumented.
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        let settings = self.settings.load();

        settings.global
            && settings
                .per_name
                .get(&normalize(name))
                .copied()
                .unwrap_or(true)
    }

    /// A shareable supplier answering [`is_enabled()`][Self::is_enabled] for one
    /// fixed name, for wiring into a dispatcher.
    #[must_use]
    pub fn enabled_supplier(
        self: &Arc<Self>,
        name: &str,
    ) -> Arc<dyn Fn() -> bool + Send + Sync> {
        let properties = Arc::clone(self);
        let name = name.to_owned();

        Arc::new(move || properties.is_enabled(&name))
    }

    /// The process-wide properties instance, read from the environment on first use.
    #[must_use]
    pub fn global() -> &'static Arc<Self> {
        static GLOBAL: LazyLock<Arc<InstrumentationProperties>> =
            LazyLock::new(|| Arc::new(InstrumentationProperties::from_env()));

        &GLOBAL
    }
}
