use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;

/// Storage key the preference is persisted under.
pub const THEME_STORAGE_KEY: &str = "theme";

/// Root element attribute the stylesheet keys off.
pub const DATA_THEME_ATTR: &str = "data-theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }

    /// Resolves the theme to switch to from whatever the document currently carries.
    /// Anything other than `"dark"` counts as light.
    pub fn next_from(current: Option<&str>) -> Self {
        match current {
            Some("dark") => Theme::Light,
            _ => Theme::Dark,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            other => anyhow::bail!("unknown theme {other:?}"),
        }
    }
}

pub trait PreferenceStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

pub trait ThemeSink {
    fn current(&self) -> Option<String>;
    fn apply(&mut self, value: &str);
}

pub trait ColorSchemeQuery {
    fn prefers_dark(&self) -> bool;
}

/// OS/browser `prefers-color-scheme` answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorScheme {
    Dark,
    Light,
    NoPreference,
}

impl ColorSchemeQuery for ColorScheme {
    fn prefers_dark(&self) -> bool {
        matches!(self, ColorScheme::Dark)
    }
}

pub struct ThemeController<'a, S, K> {
    store: &'a mut S,
    sink: &'a mut K,
}

impl<'a, S, K> ThemeController<'a, S, K>
where
    S: PreferenceStore,
    K: ThemeSink,
{
    pub fn new(store: &'a mut S, sink: &'a mut K) -> Self {
        Self { store, sink }
    }

    /// Load-time initialization. Returns the value applied, if any.
    pub fn initialize(
        &mut self,
        scheme: &impl ColorSchemeQuery,
    ) -> anyhow::Result<Option<String>> {
        if let Some(saved) = self.store.get(THEME_STORAGE_KEY)? {
            if !saved.is_empty() {
                tracing::debug!(theme = %saved, "applying saved theme");
                self.sink.apply(&saved);
                return Ok(Some(saved));
            }
        }

        if scheme.prefers_dark() {
            tracing::debug!("no saved theme; os prefers dark");
            self.sink.apply(Theme::Dark.as_str());
            return Ok(Some(Theme::Dark.as_str().to_string()));
        }

        Ok(None)
    }

    pub fn toggle(&mut self) -> anyhow::Result<Theme> {
        let current = self.sink.current();
        let next = Theme::next_from(current.as_deref());
        self.sink.apply(next.as_str());
        self.store.set(THEME_STORAGE_KEY, next.as_str())?;
        tracing::info!(from = ?current, to = %next, "toggled theme");
        Ok(next)
    }
}
