//! Plugin registry
//!
//! Maps a [`Capability`] plus a symbolic name to a factory. The registry is
//! populated once at startup and is read-only afterwards; every resolution
//! constructs a fresh instance owned by the caller.

use crate::client::{HTTP_OUTPUT_PLUGIN, HttpOutput};
use crate::error::{Result, TransferError};
use crate::etl::{
    DEFAULT_TRANSFER_MANAGER, DefaultTransferManager, InputAdapter, OutputAdapter, TransferManager,
};
use crate::storage::{
    CSV_INPUT_PLUGIN, CSV_OUTPUT_PLUGIN, CsvInput, CsvOutput, MAILDIR_INPUT_PLUGIN,
    MAILDIR_OUTPUT_PLUGIN, MaildirInput, MaildirOutput, NDJSON_INPUT_PLUGIN, NDJSON_OUTPUT_PLUGIN,
    NdjsonInput, NdjsonOutput, SQLITE_INPUT_PLUGIN, SQLITE_OUTPUT_PLUGIN, SqliteInput,
    SqliteOutput,
};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// The dimension along which plugins are named and resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    Input,
    Output,
    Manager,
}

impl Capability {
    pub const ALL: [Capability; 3] = [Capability::Manager, Capability::Input, Capability::Output];
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input plugin"),
            Self::Output => write!(f, "output plugin"),
            Self::Manager => write!(f, "transfer manager"),
        }
    }
}

pub type InputFactory = Arc<dyn Fn() -> Box<dyn InputAdapter> + Send + Sync>;
pub type OutputFactory = Arc<dyn Fn() -> Box<dyn OutputAdapter> + Send + Sync>;
pub type ManagerFactory = Arc<dyn Fn() -> Box<dyn TransferManager> + Send + Sync>;

/// Constructor for one capability
#[derive(Clone)]
pub enum Factory {
    Input(InputFactory),
    Output(OutputFactory),
    Manager(ManagerFactory),
}

impl Factory {
    pub fn capability(&self) -> Capability {
        match self {
            Self::Input(_) => Capability::Input,
            Self::Output(_) => Capability::Output,
            Self::Manager(_) => Capability::Manager,
        }
    }
}

/// A registered plugin
#[derive(Clone)]
pub struct PluginDescriptor {
    name: String,
    help: &'static str,
    factory: Factory,
}

impl PluginDescriptor {
    pub fn input(
        name: impl Into<String>,
        help: &'static str,
        factory: impl Fn() -> Box<dyn InputAdapter> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            help,
            factory: Factory::Input(Arc::new(factory)),
        }
    }

    pub fn output(
        name: impl Into<String>,
        help: &'static str,
        factory: impl Fn() -> Box<dyn OutputAdapter> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            help,
            factory: Factory::Output(Arc::new(factory)),
        }
    }

    pub fn manager(
        name: impl Into<String>,
        help: &'static str,
        factory: impl Fn() -> Box<dyn TransferManager> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            help,
            factory: Factory::Manager(Arc::new(factory)),
        }
    }

    pub fn capability(&self) -> Capability {
        self.factory.capability()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &'static str {
        self.help
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("capability", &self.capability())
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Capability/name → factory lookup
///
/// # Example
/// ```
/// use record_transfer::registry::{Capability, Registry};
///
/// let registry = Registry::builtin();
/// assert!(registry.is_registered(Capability::Input, "CSV_INPUT_PLUGIN"));
/// assert!(!registry.is_registered(Capability::Output, "CSV_INPUT_PLUGIN"));
///
/// let missing = registry.missing(&[
///     (Capability::Manager, "DEFAULT_TRANSFER_MANAGER"),
///     (Capability::Input, "XML_INPUT_PLUGIN"),
///     (Capability::Output, "FAX_OUTPUT_PLUGIN"),
/// ]);
/// assert_eq!(missing.len(), 2);
/// ```
#[derive(Debug, Default, Clone)]
pub struct Registry {
    plugins: BTreeMap<(Capability, String), PluginDescriptor>,
}

impl Registry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every plugin shipped with this crate
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins = [
            PluginDescriptor::manager(
                DEFAULT_TRANSFER_MANAGER,
                DefaultTransferManager::help_text(),
                || Box::new(DefaultTransferManager::new()),
            ),
            PluginDescriptor::input(CSV_INPUT_PLUGIN, CsvInput::help_text(), || {
                Box::new(CsvInput::new())
            }),
            PluginDescriptor::output(CSV_OUTPUT_PLUGIN, CsvOutput::help_text(), || {
                Box::new(CsvOutput::new())
            }),
            PluginDescriptor::input(SQLITE_INPUT_PLUGIN, SqliteInput::help_text(), || {
                Box::new(SqliteInput::new())
            }),
            PluginDescriptor::output(SQLITE_OUTPUT_PLUGIN, SqliteOutput::help_text(), || {
                Box::new(SqliteOutput::new())
            }),
            PluginDescriptor::input(MAILDIR_INPUT_PLUGIN, MaildirInput::help_text(), || {
                Box::new(MaildirInput::new())
            }),
            PluginDescriptor::output(MAILDIR_OUTPUT_PLUGIN, MaildirOutput::help_text(), || {
                Box::new(MaildirOutput::new())
            }),
            PluginDescriptor::input(NDJSON_INPUT_PLUGIN, NdjsonInput::help_text(), || {
                Box::new(NdjsonInput::new())
            }),
            PluginDescriptor::output(NDJSON_OUTPUT_PLUGIN, NdjsonOutput::help_text(), || {
                Box::new(NdjsonOutput::new())
            }),
            PluginDescriptor::output(HTTP_OUTPUT_PLUGIN, HttpOutput::help_text(), || {
                Box::new(HttpOutput::new())
            }),
        ];
        for descriptor in builtins {
            registry
                .register(descriptor)
                .expect("built-in plugin names are distinct");
        }
        registry
    }

    /// The process-wide registry of built-in plugins
    pub fn builtin() -> &'static Registry {
        static BUILTIN: OnceLock<Registry> = OnceLock::new();
        BUILTIN.get_or_init(|| {
            log::debug!("Registering built-in plugins");
            Registry::with_builtins()
        })
    }

    /// Register a plugin; a capability/name pair can only be registered once
    pub fn register(&mut self, descriptor: PluginDescriptor) -> Result<()> {
        let key = (descriptor.capability(), descriptor.name.clone());
        if self.plugins.contains_key(&key) {
            return Err(TransferError::DuplicatePlugin {
                capability: key.0,
                name: key.1,
            });
        }
        log::debug!("Registered {} '{}'", key.0, key.1);
        self.plugins.insert(key, descriptor);
        Ok(())
    }

    pub fn is_registered(&self, capability: Capability, name: &str) -> bool {
        self.descriptor(capability, name).is_some()
    }

    pub fn descriptor(&self, capability: Capability, name: &str) -> Option<&PluginDescriptor> {
        self.plugins.get(&(capability, name.to_string()))
    }

    /// Static help text of a plugin, without constructing it
    pub fn help(&self, capability: Capability, name: &str) -> Option<&'static str> {
        self.descriptor(capability, name).map(PluginDescriptor::help)
    }

    /// Registered names for a capability, sorted
    pub fn names(&self, capability: Capability) -> Vec<&str> {
        self.plugins
            .keys()
            .filter(|(c, _)| *c == capability)
            .map(|(_, n)| n.as_str())
            .collect()
    }

    /// Every selection that cannot be resolved, checked before anything is built
    pub fn missing(&self, wanted: &[(Capability, &str)]) -> Vec<TransferError> {
        wanted
            .iter()
            .filter(|(capability, name)| !self.is_registered(*capability, name))
            .map(|(capability, name)| TransferError::PluginResolution {
                capability: *capability,
                name: name.to_string(),
            })
            .collect()
    }

    pub fn resolve_input(&self, name: &str) -> Result<Box<dyn InputAdapter>> {
        match &self.lookup(Capability::Input, name)?.factory {
            Factory::Input(factory) => Ok(factory()),
            _ => Err(Self::unresolved(Capability::Input, name)),
        }
    }

    pub fn resolve_output(&self, name: &str) -> Result<Box<dyn OutputAdapter>> {
        match &self.lookup(Capability::Output, name)?.factory {
            Factory::Output(factory) => Ok(factory()),
            _ => Err(Self::unresolved(Capability::Output, name)),
        }
    }

    pub fn resolve_manager(&self, name: &str) -> Result<Box<dyn TransferManager>> {
        match &self.lookup(Capability::Manager, name)?.factory {
            Factory::Manager(factory) => Ok(factory()),
            _ => Err(Self::unresolved(Capability::Manager, name)),
        }
    }

    fn lookup(&self, capability: Capability, name: &str) -> Result<&PluginDescriptor> {
        self.descriptor(capability, name)
            .ok_or_else(|| Self::unresolved(capability, name))
    }

    fn unresolved(capability: Capability, name: &str) -> TransferError {
        TransferError::PluginResolution {
            capability,
            name: name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::testing::{Tally, RecordingOutput, VecInput};
    use crate::etl::AdapterState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_builtins_registered() {
        let registry = Registry::builtin();
        assert_eq!(registry.names(Capability::Manager), vec![DEFAULT_TRANSFER_MANAGER]);
        assert_eq!(
            registry.names(Capability::Input),
            vec![
                CSV_INPUT_PLUGIN,
                MAILDIR_INPUT_PLUGIN,
                NDJSON_INPUT_PLUGIN,
                SQLITE_INPUT_PLUGIN
            ]
        );
        assert!(registry.names(Capability::Output).contains(&HTTP_OUTPUT_PLUGIN));
        assert!(
            registry
                .help(Capability::Input, CSV_INPUT_PLUGIN)
                .unwrap()
                .contains("hasheader")
        );
    }

    #[test]
    fn test_resolve_unregistered_never_constructs() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let mut registry = Registry::new();
        registry
            .register(PluginDescriptor::input("VEC", "help", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Box::new(VecInput::uninitialized(vec![], &Tally::default()))
            }))
            .unwrap();

        assert!(matches!(
            registry.resolve_input("OTHER"),
            Err(TransferError::PluginResolution { capability: Capability::Input, .. })
        ));
        assert!(matches!(
            registry.resolve_output("VEC"),
            Err(TransferError::PluginResolution { capability: Capability::Output, .. })
        ));
        assert_eq!(built.load(Ordering::SeqCst), 0);

        let input = registry.resolve_input("VEC").unwrap();
        assert_eq!(input.state(), AdapterState::Uninitialized);
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_each_resolution_is_a_new_instance() {
        let tally = Tally::default();
        let mut registry = Registry::new();
        let shared = tally.clone();
        registry
            .register(PluginDescriptor::output("REC", "help", move || {
                Box::new(RecordingOutput::uninitialized(&shared))
            }))
            .unwrap();

        let mut first = registry.resolve_output("REC").unwrap();
        let second = registry.resolve_output("REC").unwrap();
        first.close().unwrap();
        assert_eq!(first.state(), AdapterState::Closed);
        assert_eq!(second.state(), AdapterState::Uninitialized);
        assert_eq!(tally.closes(), 1);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = Registry::with_builtins();
        let err = registry
            .register(PluginDescriptor::manager(DEFAULT_TRANSFER_MANAGER, "again", || {
                Box::new(DefaultTransferManager::new())
            }))
            .unwrap_err();
        assert!(matches!(err, TransferError::DuplicatePlugin { .. }));

        // Same name under another capability is a different plugin
        registry
            .register(PluginDescriptor::input(DEFAULT_TRANSFER_MANAGER, "odd", || {
                Box::new(VecInput::uninitialized(vec![], &Tally::default()))
            }))
            .unwrap();
    }

    #[test]
    fn test_missing_reports_everything() {
        let registry = Registry::with_builtins();
        let missing = registry.missing(&[
            (Capability::Manager, "FAST_MANAGER"),
            (Capability::Input, CSV_INPUT_PLUGIN),
            (Capability::Output, "XML_OUTPUT_PLUGIN"),
        ]);
        let messages: Vec<String> = missing.iter().map(ToString::to_string).collect();
        assert_eq!(
            messages,
            vec![
                "transfer manager 'FAST_MANAGER' isn't registered",
                "output plugin 'XML_OUTPUT_PLUGIN' isn't registered",
            ]
        );
    }
}
