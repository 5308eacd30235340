//! Configuration types for observers and monitors.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::comparison::NameComparison;
use crate::error::{MonitorError, Result};
use crate::filter::GlobFilter;
use crate::fs::OsFileSystem;
use crate::monitor::{DEFAULT_INTERVAL, FileAlterationMonitor};
use crate::observer::{FileAlterationObserver, Observer};

/// Configuration for one observed directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserverConfig {
    /// Root of the tree. Need not exist yet.
    pub path: PathBuf,

    /// Whether the monitor should observe this tree.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How entry names are compared.
    #[serde(default)]
    pub name_comparison: NameComparison,

    /// Patterns to exclude (glob patterns, relative to `path`).
    #[serde(default = "ObserverConfig::default_excludes")]
    pub exclude_patterns: Vec<String>,

    /// Whether to follow symbolic links.
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_true() -> bool {
    true
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl ObserverConfig {
    /// Create a new observer config.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            enabled: true,
            name_comparison: NameComparison::default(),
            exclude_patterns: Self::default_excludes(),
            follow_symlinks: false,
        }
    }

    /// Set the name comparison.
    pub fn with_comparison(mut self, comparison: NameComparison) -> Self {
        self.name_comparison = comparison;
        self
    }

    /// Add an exclude pattern.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    /// Drop every exclude pattern, including the defaults.
    pub fn without_excludes(mut self) -> Self {
        self.exclude_patterns.clear();
        self
    }

    /// Enable following symbolic links.
    pub fn follow_symlinks(mut self) -> Self {
        self.follow_symlinks = true;
        self
    }

    /// Disable the tree.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Get default exclude patterns.
    pub fn default_excludes() -> Vec<String> {
        vec![
            // Version control
            "**/.git".to_string(),
            "**/.git/**".to_string(),
            "**/.svn/**".to_string(),
            "**/.hg/**".to_string(),
            // Editor droppings
            "**/*.swp".to_string(),
            "**/*~".to_string(),
            // System files
            "**/.DS_Store".to_string(),
            "**/Thumbs.db".to_string(),
        ]
    }

    /// Compile the exclude patterns into a filter.
    pub fn filter(&self) -> Result<GlobFilter> {
        Ok(GlobFilter::new(&self.exclude_patterns)?.relative_to(&self.path))
    }

    /// Build an observer for this tree.
    pub fn build(&self) -> Result<FileAlterationObserver> {
        let mut file_system = OsFileSystem::new();
        if self.follow_symlinks {
            file_system = file_system.follow_symlinks();
        }

        let mut observer = FileAlterationObserver::new(&self.path)?
            .with_comparison(self.name_comparison)
            .with_file_system(file_system);
        if !self.exclude_patterns.is_empty() {
            observer = observer.with_filter(self.filter()?);
        }
        Ok(observer)
    }
}

/// Configuration for a monitor and the trees it observes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Milliseconds slept between scans.
    #[serde(default = "MonitorConfig::default_interval_ms")]
    pub interval_ms: u64,

    /// Observed trees.
    #[serde(default)]
    pub observers: Vec<ObserverConfig>,
}

impl MonitorConfig {
    fn default_interval_ms() -> u64 {
        duration_to_millis(DEFAULT_INTERVAL)
    }

    /// Create a config with the given interval and no observers.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_ms: duration_to_millis(interval),
            observers: Vec::new(),
        }
    }

    /// Add an observed tree.
    pub fn with_observer(mut self, observer: ObserverConfig) -> Self {
        self.observers.push(observer);
        self
    }

    /// Interval between scans.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Parse a JSON config.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl FileAlterationMonitor {
    /// Build a monitor with one observer per enabled tree in `config`.
    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        if config.interval_ms == 0 {
            return Err(MonitorError::Config(
                "interval_ms must be greater than zero".to_string(),
            ));
        }

        let observers = config
            .observers
            .iter()
            .filter(|observer| observer.enabled)
            .map(|observer| {
                debug!("Configuring observer for {}", observer.path.display());
                observer
                    .build()
                    .map(|built| Arc::new(built) as Arc<dyn Observer>)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::with_observers(config.interval(), observers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FileFilter;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    #[test]
    fn test_observer_config_creation() {
        let config = ObserverConfig::new("/home/user/documents")
            .with_comparison(NameComparison::Insensitive)
            .exclude("**/*.log");

        assert_eq!(config.path, Path::new("/home/user/documents"));
        assert_eq!(config.name_comparison, NameComparison::Insensitive);
        assert!(config.exclude_patterns.contains(&"**/*.log".to_string()));
        assert!(config.enabled);
    }

    #[test]
    fn test_exclude_patterns() {
        let filter = ObserverConfig::new("/test").filter().unwrap();

        assert!(!filter.accept(Path::new("/test/.git/config")));
        assert!(!filter.accept(Path::new("/test/notes.txt.swp")));
        assert!(filter.accept(Path::new("/test/src/main.rs")));
    }

    #[test]
    fn test_invalid_pattern_fails_build() {
        let result = ObserverConfig::new("/test").exclude("[oops").build();

        assert!(matches!(result, Err(MonitorError::InvalidPattern(_))));
    }

    #[test]
    fn test_build_observer() {
        let observer = ObserverConfig::new("/srv/data")
            .with_comparison(NameComparison::Sensitive)
            .build()
            .unwrap();

        assert_eq!(observer.root_path(), Path::new("/srv/data"));
        assert_eq!(observer.comparison(), NameComparison::Sensitive);
        assert!(observer.has_filter());

        let unfiltered = ObserverConfig::new("/srv/data")
            .without_excludes()
            .build()
            .unwrap();
        assert!(!unfiltered.has_filter());
    }

    #[test]
    fn test_monitor_config_from_json() {
        let config = MonitorConfig::from_json(
            r#"{
                "interval_ms": 250,
                "observers": [
                    { "path": "/a", "name_comparison": "insensitive" },
                    { "path": "/b", "enabled": false, "exclude_patterns": [] }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.interval(), Duration::from_millis(250));
        assert_eq!(config.observers.len(), 2);
        assert_eq!(config.observers[0].name_comparison, NameComparison::Insensitive);
        assert_eq!(
            config.observers[0].exclude_patterns,
            ObserverConfig::default_excludes()
        );
        assert!(!config.observers[1].enabled);
        assert!(config.observers[1].exclude_patterns.is_empty());
    }

    #[test]
    fn test_monitor_config_defaults() {
        let config = MonitorConfig::from_json("{}").unwrap();

        assert_eq!(config.interval(), Duration::from_secs(10));
        assert!(config.observers.is_empty());
        assert_eq!(config, MonitorConfig::default());
    }

    #[test]
    fn test_huge_interval_saturates() {
        let config = MonitorConfig::new(Duration::MAX);
        assert_eq!(config.interval_ms, u64::MAX);

        let config = MonitorConfig::new(Duration::from_millis(1500));
        assert_eq!(config.interval_ms, 1500);
    }

    #[test]
    fn test_malformed_json() {
        let result = MonitorConfig::from_json("{ not json");
        assert!(matches!(result, Err(MonitorError::Serialization(_))));
    }

    #[test]
    fn test_monitor_from_config_skips_disabled() {
        let config = MonitorConfig::new(Duration::from_millis(100))
            .with_observer(ObserverConfig::new("/a"))
            .with_observer(ObserverConfig::new("/b").disabled());

        let monitor = FileAlterationMonitor::from_config(&config).unwrap();

        assert_eq!(monitor.interval(), Duration::from_millis(100));
        let observers = monitor.observers();
        assert_eq!(observers.len(), 1);
        assert_eq!(observers[0].root_path(), Path::new("/a"));
    }

    #[test]
    fn test_monitor_from_config_rejects_zero_interval() {
        let config = MonitorConfig::new(Duration::ZERO);

        assert!(matches!(
            FileAlterationMonitor::from_config(&config),
            Err(MonitorError::Config(_))
        ));
    }
}
