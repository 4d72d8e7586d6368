//! Namespace-prefixing merge of compose fragments.
//!
//! Every module's services, networks, and volumes are renamed
//! `{module}__{name}`. References a service makes to entities of its own
//! module (`depends_on`, `networks`, named `volumes`) follow the rename;
//! references to entities of other modules are left as written.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use stackpack_common::constants::NAMESPACE_SEPARATOR;

use crate::document::{self, DEFAULT_NETWORK, NETWORKS, SERVICES, VERSION, VOLUMES};
use crate::error::ComposeError;

/// One compose fragment with its default variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Namespace the fragment's entities are merged under.
    pub name: String,
    /// Compose document text.
    pub compose: String,
    /// Default values for `${NAME}` placeholders in this fragment.
    pub variables: BTreeMap<String, String>,
}

impl Module {
    /// Creates a module without default variables.
    pub fn new(name: impl Into<String>, compose: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            compose: compose.into(),
            variables: BTreeMap::new(),
        }
    }

    /// Sets the module's default variables.
    #[must_use]
    pub fn with_variables(mut self, variables: BTreeMap<String, String>) -> Self {
        self.variables = variables;
        self
    }
}

/// Kind of a renamed top-level entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Entry under `services`.
    Service,
    /// Entry under `networks`.
    Network,
    /// Entry under `volumes`.
    Volume,
}

impl EntityKind {
    const ALL: [Self; 3] = [Self::Service, Self::Network, Self::Volume];

    /// Top-level section holding this kind.
    #[must_use]
    pub const fn section(self) -> &'static str {
        match self {
            Self::Service => SERVICES,
            Self::Network => NETWORKS,
            Self::Volume => VOLUMES,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service => write!(f, "service"),
            Self::Network => write!(f, "network"),
            Self::Volume => write!(f, "volume"),
        }
    }
}

/// One rename performed during a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenamedEntity {
    /// Module the entity came from.
    pub module: String,
    /// Entity kind.
    pub kind: EntityKind,
    /// Name as written in the module.
    pub original: String,
    /// Name in the merged document.
    pub renamed: String,
}

/// Every rename performed by one merge, in merge order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NameMapping {
    entries: Vec<RenamedEntity>,
}

impl NameMapping {
    /// Looks up the merged name of a module's entity.
    #[must_use]
    pub fn get(&self, module: &str, kind: EntityKind, original: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.module == module && e.kind == kind && e.original == original)
            .map(|e| e.renamed.as_str())
    }

    /// Iterates over all renames.
    pub fn iter(&self) -> impl Iterator<Item = &RenamedEntity> {
        self.entries.iter()
    }

    /// Number of renames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was renamed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Output of [`Merger::merge`].
#[derive(Debug, Clone, Serialize)]
pub struct MergeResult {
    /// Merged document as YAML text.
    pub document: String,
    /// Every rename performed.
    pub mapping: NameMapping,
    /// Non-fatal findings, in the order they were found.
    pub warnings: Vec<String>,
}

/// Combines modules into one namespaced compose document.
#[derive(Debug, Clone, Copy, Default)]
pub struct Merger;

impl Merger {
    /// Creates a merger.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Merges `modules` in order.
    ///
    /// `${NAME}` placeholders in string values resolve from `project`
    /// first, then from the module's own variables; anything else is left
    /// intact.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError::Parse`] or [`ComposeError::InvalidDocument`]
    /// naming the first module that does not parse. Nothing is merged in
    /// that case.
    pub fn merge(
        &self,
        modules: &[Module],
        project: &BTreeMap<String, String>,
    ) -> Result<MergeResult, ComposeError> {
        tracing::info!(modules = modules.len(), "merging compose fragments");
        let mut state = MergeState::default();
        for module in modules {
            state.add_module(module, project)?;
        }
        state.warn_port_collisions();
        let document = state.serialize()?;
        Ok(MergeResult {
            document,
            mapping: state.mapping,
            warnings: state.warnings,
        })
    }
}

/// Renames local to one module, used to rewrite its references.
#[derive(Default)]
struct ModuleNames {
    services: BTreeMap<String, String>,
    networks: BTreeMap<String, String>,
    volumes: BTreeMap<String, String>,
}

impl ModuleNames {
    fn insert(&mut self, kind: EntityKind, original: &str, renamed: &str) {
        let table = match kind {
            EntityKind::Service => &mut self.services,
            EntityKind::Network if original == DEFAULT_NETWORK => return,
            EntityKind::Network => &mut self.networks,
            EntityKind::Volume => &mut self.volumes,
        };
        let _ = table.insert(original.to_string(), renamed.to_string());
    }
}

#[derive(Default)]
struct MergeState {
    version: Option<Value>,
    services: Mapping,
    networks: Mapping,
    volumes: Mapping,
    mapping: NameMapping,
    warnings: Vec<String>,
}

impl MergeState {
    fn add_module(
        &mut self,
        module: &Module,
        project: &BTreeMap<String, String>,
    ) -> Result<(), ComposeError> {
        let root = document::parse(&module.name, &module.compose)?;
        tracing::debug!(module = %module.name, "merging module");

        let lookup = |name: &str| {
            project
                .get(name)
                .or_else(|| module.variables.get(name))
                .map(String::as_str)
        };

        for (key, value) in &root {
            match key.as_str() {
                Some(VERSION) => {
                    if self.version.is_none() {
                        let mut version = value.clone();
                        substitute_tree(&mut version, &lookup);
                        self.version = Some(version);
                    }
                }
                Some(SERVICES | NETWORKS | VOLUMES) => {}
                _ => self.warn(format!(
                    "module {}: dropped unsupported top-level key {}",
                    module.name,
                    display_key(key)
                )),
            }
        }

        for kind in EntityKind::ALL {
            for key in document::non_string_keys(document::section(&root, kind.section())) {
                self.warn(format!(
                    "module {}: skipped {kind} with non-string name {}",
                    module.name,
                    display_key(key)
                ));
            }
        }

        let mut names = ModuleNames::default();
        for kind in EntityKind::ALL {
            for (original, _) in document::entries(document::section(&root, kind.section())) {
                let renamed = format!("{}{NAMESPACE_SEPARATOR}{original}", module.name);
                names.insert(kind, original, &renamed);
                self.mapping.entries.push(RenamedEntity {
                    module: module.name.clone(),
                    kind,
                    original: original.to_string(),
                    renamed,
                });
            }
        }

        for kind in EntityKind::ALL {
            for (original, definition) in document::entries(document::section(&root, kind.section())) {
                let mut definition = definition.clone();
                substitute_tree(&mut definition, &lookup);
                if kind == EntityKind::Service {
                    rewrite_references(&mut definition, &names);
                }
                let renamed = format!("{}{NAMESPACE_SEPARATOR}{original}", module.name);
                self.insert(kind, renamed, definition);
            }
        }
        Ok(())
    }

    fn insert(&mut self, kind: EntityKind, name: String, definition: Value) {
        let target = match kind {
            EntityKind::Service => &mut self.services,
            EntityKind::Network => &mut self.networks,
            EntityKind::Volume => &mut self.volumes,
        };
        if target.insert(Value::String(name.clone()), definition).is_some() {
            self.warn(format!("{kind} {name} defined by more than one module; last definition kept"));
        }
    }

    fn warn_port_collisions(&mut self) {
        let bindings = document::host_port_bindings(Some(&self.services));
        for (port, owners) in bindings {
            if owners.len() > 1 {
                self.warn(format!(
                    "host port {port} is bound by multiple services: {}",
                    owners.join(", ")
                ));
            }
        }
    }

    fn warn(&mut self, message: String) {
        tracing::warn!(%message, "merge warning");
        self.warnings.push(message);
    }

    fn serialize(&mut self) -> Result<String, ComposeError> {
        let mut root = Mapping::new();
        if let Some(version) = self.version.take() {
            let _ = root.insert(Value::from(VERSION), version);
        }
        let _ = root.insert(
            Value::from(SERVICES),
            Value::Mapping(std::mem::take(&mut self.services)),
        );
        if !self.networks.is_empty() {
            let _ = root.insert(
                Value::from(NETWORKS),
                Value::Mapping(std::mem::take(&mut self.networks)),
            );
        }
        if !self.volumes.is_empty() {
            let _ = root.insert(
                Value::from(VOLUMES),
                Value::Mapping(std::mem::take(&mut self.volumes)),
            );
        }
        Ok(serde_yaml::to_string(&Value::Mapping(root))?)
    }
}

fn display_key(key: &Value) -> String {
    key.as_str().map_or_else(
        || serde_yaml::to_string(key).map_or_else(|_| "?".into(), |s| s.trim_end().to_string()),
        str::to_string,
    )
}

/// Substitutes placeholders in every string leaf; mapping keys are left alone.
fn substitute_tree<'a, F>(value: &mut Value, lookup: &F)
where
    F: Fn(&str) -> Option<&'a str>,
{
    match value {
        Value::String(text) if text.contains("${") => {
            *text = document::substitute(text, lookup);
        }
        Value::Sequence(items) => {
            for item in items {
                substitute_tree(item, lookup);
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                substitute_tree(item, lookup);
            }
        }
        Value::Tagged(tagged) => substitute_tree(&mut tagged.value, lookup),
        _ => {}
    }
}

fn rewrite_references(service: &mut Value, names: &ModuleNames) {
    let Some(map) = service.as_mapping_mut() else {
        return;
    };
    if let Some(deps) = map.get_mut("depends_on") {
        rename_list_or_map(deps, &names.services);
    }
    if let Some(networks) = map.get_mut("networks") {
        rename_list_or_map(networks, &names.networks);
    }
    if let Some(Value::Sequence(volumes)) = map.get_mut("volumes") {
        for entry in volumes {
            rename_volume(entry, &names.volumes);
        }
    }
}

fn rename_list_or_map(value: &mut Value, names: &BTreeMap<String, String>) {
    match value {
        Value::Sequence(items) => {
            for item in items {
                if let Some(renamed) = item.as_str().and_then(|n| names.get(n)) {
                    *item = Value::String(renamed.clone());
                }
            }
        }
        Value::Mapping(map) => {
            *map = std::mem::take(map)
                .into_iter()
                .map(|(key, entry)| {
                    let renamed = key.as_str().and_then(|n| names.get(n)).cloned();
                    (renamed.map_or(key, Value::String), entry)
                })
                .collect();
        }
        _ => {}
    }
}

fn rename_volume(entry: &mut Value, names: &BTreeMap<String, String>) {
    match entry {
        Value::String(spec) => {
            let renamed = spec
                .split_once(':')
                .and_then(|(source, rest)| names.get(source).map(|new| format!("{new}:{rest}")));
            if let Some(renamed) = renamed {
                *spec = renamed;
            }
        }
        Value::Mapping(map) => {
            if map.get("type").and_then(Value::as_str).is_some_and(|t| t != "volume") {
                return;
            }
            if let Some(source) = map.get_mut("source") {
                if let Some(renamed) = source.as_str().and_then(|n| names.get(n)) {
                    *source = Value::String(renamed.clone());
                }
            }
        }
        _ => {}
    }
}
