use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::time::Duration;

use crate::threads::{ManagedThread, ThreadBuilder, ThreadConfig, ThreadError, ThreadRegistry, ThreadWork};

fn default_tick_ms() -> u64 {
    100
}

/// What a configured thread does when started
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Behaviour {
    /// Tick until stopped
    Idle {
        #[serde(default = "default_tick_ms")]
        tick_ms: u64,
    },
    /// Sleep once, then return. Wakes early on stop.
    Sleep { ms: u64 },
    /// Return an error
    Fail { message: String },
    /// Panic
    Panic { message: String },
}

impl Default for Behaviour {
    fn default() -> Self {
        Behaviour::Idle {
            tick_ms: default_tick_ms(),
        }
    }
}

impl Behaviour {
    pub fn into_work(self) -> ThreadWork {
        match self {
            Behaviour::Idle { tick_ms } => ThreadWork::plain(move |ctx| {
                let tick = Duration::from_millis(tick_ms);
                let mut ticks: u64 = 0;
                while ctx.sleep(tick).is_ok() {
                    ticks += 1;
                    tracing::trace!(ticks, "Idle tick");
                }
                tracing::debug!(ticks, "Idle worker stopping");
                Ok(())
            }),
            Behaviour::Sleep { ms } => ThreadWork::plain(move |ctx| {
                ctx.sleep(Duration::from_millis(ms))?;
                Ok(())
            }),
            Behaviour::Fail { message } => {
                ThreadWork::plain(move |_| Err(message.clone().into()))
            }
            Behaviour::Panic { message } => ThreadWork::plain(move |_| panic!("{}", message)),
        }
    }
}

/// One node of a configured thread tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSpec {
    pub name: String,
    #[serde(default)]
    pub background: bool,
    #[serde(default)]
    pub critical: bool,
    #[serde(default)]
    pub behaviour: Behaviour,
    #[serde(default)]
    pub children: Vec<ThreadSpec>,
}

impl ThreadSpec {
    fn builder(&self) -> ThreadBuilder {
        ThreadBuilder::new(self.name.clone())
            .background(self.background)
            .critical(self.critical)
            .with_work(self.behaviour.clone().into_work())
    }

    fn attach_children(&self, parent: &ManagedThread) -> Result<(), ThreadError> {
        for spec in &self.children {
            let child = parent.add_child(spec.builder())?;
            spec.attach_children(&child)?;
        }
        Ok(())
    }
}

/// A tree file: registry settings plus top-level thread specs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    #[serde(default)]
    pub stop_timeout_ms: Option<u64>,
    #[serde(default)]
    pub panic_history_limit: Option<usize>,
    #[serde(default)]
    pub threads: Vec<ThreadSpec>,
}

impl TreeConfig {
    pub fn thread_config(&self) -> ThreadConfig {
        let defaults = ThreadConfig::default();
        ThreadConfig {
            stop_timeout: self
                .stop_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.stop_timeout),
            panic_history_limit: self
                .panic_history_limit
                .unwrap_or(defaults.panic_history_limit),
            ..defaults
        }
    }

    /// Total number of threads, children included
    pub fn thread_count(&self) -> usize {
        fn count(specs: &[ThreadSpec]) -> usize {
            specs.iter().map(|s| 1 + count(&s.children)).sum()
        }
        count(&self.threads)
    }

    /// Create every configured thread in `registry` without starting any
    pub fn build_into(&self, registry: &ThreadRegistry) -> Result<Vec<ManagedThread>, ThreadError> {
        let mut top_level = Vec::with_capacity(self.threads.len());
        for spec in &self.threads {
            let thread = spec.builder().build_in(registry)?;
            spec.attach_children(&thread)?;
            top_level.push(thread);
        }
        Ok(top_level)
    }
}

/// Read a tree file from YAML
pub fn read_tree(path: &str) -> eyre::Result<TreeConfig> {
    let file = File::open(path).wrap_err_with(|| format!("Failed to open tree file {path}"))?;
    let tree: TreeConfig = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse tree file {path}"))?;
    Ok(tree)
}

/// Resolved settings for one `threadctl run`
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub tree_file: String,
    pub run_for: Option<Duration>,
    pub tree: TreeConfig,
}

impl AppConfig {
    /// Load the tree file and apply command line overrides
    pub fn load(
        tree_file: &str,
        log_level: &str,
        run_for_ms: Option<u64>,
        stop_timeout_ms: Option<u64>,
    ) -> eyre::Result<Self> {
        let mut tree = read_tree(tree_file)?;
        if stop_timeout_ms.is_some() {
            tree.stop_timeout_ms = stop_timeout_ms;
        }
        if tree.threads.is_empty() {
            eyre::bail!("Tree file {tree_file} does not define any threads");
        }

        Ok(Self {
            log_level: log_level.to_string(),
            tree_file: tree_file.to_string(),
            run_for: run_for_ms.map(Duration::from_millis),
            tree,
        })
    }

    pub fn thread_config(&self) -> ThreadConfig {
        self.tree.thread_config()
    }
}
