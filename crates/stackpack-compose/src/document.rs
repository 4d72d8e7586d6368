//! Compose document access over the YAML value tree.
//!
//! Both the merger and the linter work on `serde_yaml::Value` directly.
//! The helpers here extract the references a service makes to other
//! top-level entities, its host port bindings, and `${NAME}` placeholders.

use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value};

use crate::error::ComposeError;

/// Top-level section holding services.
pub const SERVICES: &str = "services";
/// Top-level section holding networks.
pub const NETWORKS: &str = "networks";
/// Top-level section holding named volumes.
pub const VOLUMES: &str = "volumes";
/// Top-level version key.
pub const VERSION: &str = "version";

/// Network every service joins implicitly; never declared.
pub const DEFAULT_NETWORK: &str = "default";

/// Parses a compose document into its top-level mapping.
///
/// An empty document parses as an empty mapping.
///
/// # Errors
///
/// Returns [`ComposeError::Parse`] for invalid YAML and
/// [`ComposeError::InvalidDocument`] when the root or one of the three
/// entity sections is not a mapping.
pub fn parse(document: &str, text: &str) -> Result<Mapping, ComposeError> {
    let value: Value = serde_yaml::from_str(text).map_err(|source| ComposeError::Parse {
        document: document.to_string(),
        source,
    })?;
    let root = match value {
        Value::Null => Mapping::new(),
        Value::Mapping(map) => map,
        _ => {
            return Err(ComposeError::InvalidDocument {
                document: document.to_string(),
                message: "top level must be a mapping".into(),
            });
        }
    };
    for key in [SERVICES, NETWORKS, VOLUMES] {
        match root.get(key) {
            None | Some(Value::Null | Value::Mapping(_)) => {}
            Some(_) => {
                return Err(ComposeError::InvalidDocument {
                    document: document.to_string(),
                    message: format!("`{key}` must be a mapping"),
                });
            }
        }
    }
    Ok(root)
}

/// Returns a top-level section as a mapping, if present and non-null.
#[must_use]
pub fn section<'a>(root: &'a Mapping, key: &str) -> Option<&'a Mapping> {
    root.get(key).and_then(Value::as_mapping)
}

/// Iterates `(name, definition)` pairs of a section, skipping non-string keys.
pub fn entries(section: Option<&Mapping>) -> impl Iterator<Item = (&str, &Value)> {
    section
        .into_iter()
        .flat_map(Mapping::iter)
        .filter_map(|(k, v)| k.as_str().map(|name| (name, v)))
}

/// Keys of a section that are not strings and so cannot name an entity.
pub fn non_string_keys(section: Option<&Mapping>) -> impl Iterator<Item = &Value> {
    section
        .into_iter()
        .flat_map(Mapping::keys)
        .filter(|k| !k.is_string())
}

/// Short name of a YAML value's type, for messages.
#[must_use]
pub const fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Names a service lists under `depends_on`, in either list or map form.
#[must_use]
pub fn depends_on(service: &Value) -> Vec<String> {
    names_in_list_or_map(service.get("depends_on"))
}

/// Networks a service joins, in either list or map form.
#[must_use]
pub fn networks(service: &Value) -> Vec<String> {
    names_in_list_or_map(service.get("networks"))
}

fn names_in_list_or_map(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::Mapping(map)) => map
            .keys()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Named volumes a service mounts; bind mounts and anonymous volumes are skipped.
#[must_use]
pub fn named_volumes(service: &Value) -> Vec<String> {
    let Some(Value::Sequence(items)) = service.get("volumes") else {
        return Vec::new();
    };
    items.iter().filter_map(volume_source).collect()
}

/// Source of one volume entry when it names a declared volume.
#[must_use]
pub fn volume_source(entry: &Value) -> Option<String> {
    let source = match entry {
        Value::String(spec) => spec.split_once(':').map(|(src, _)| src)?,
        Value::Mapping(map) => {
            let kind = map.get("type").and_then(Value::as_str).unwrap_or("volume");
            if kind != "volume" {
                return None;
            }
            map.get("source").and_then(Value::as_str)?
        }
        _ => return None,
    };
    is_named_volume(source).then(|| source.to_string())
}

/// Whether a mount source names a volume rather than a host path.
#[must_use]
pub fn is_named_volume(source: &str) -> bool {
    !source.is_empty()
        && !source.contains('/')
        && !source.starts_with('.')
        && !source.starts_with('~')
        && !source.starts_with('$')
}

/// Host bindings of a service's `ports` entries, in declaration order.
#[must_use]
pub fn host_ports(service: &Value) -> Vec<String> {
    let Some(Value::Sequence(items)) = service.get("ports") else {
        return Vec::new();
    };
    items.iter().filter_map(host_port).collect()
}

/// Host binding of one `ports` entry.
///
/// `"127.0.0.1:8080:80"` binds `127.0.0.1:8080`, `"8080:80/tcp"` binds
/// `8080`, and a bare container port binds nothing. Long-syntax entries
/// bind their `published` value.
#[must_use]
pub fn host_port(entry: &Value) -> Option<String> {
    match entry {
        Value::String(spec) => spec
            .rsplit_once(':')
            .map(|(host, _)| host)
            .filter(|host| !host.is_empty())
            .map(str::to_string),
        Value::Mapping(map) => match map.get("published")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        },
        _ => None,
    }
}

/// Services binding each host port, keyed by the host port literal.
///
/// A service binding the same port twice is listed once.
#[must_use]
pub fn host_port_bindings(services: Option<&Mapping>) -> BTreeMap<String, Vec<String>> {
    let mut bindings: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, service) in entries(services) {
        for port in host_ports(service) {
            let owners = bindings.entry(port).or_default();
            if !owners.iter().any(|owner| owner == name) {
                owners.push(name.to_string());
            }
        }
    }
    bindings
}

/// One `${...}` occurrence in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Text between `${` and `}`.
    pub expression: String,
    /// 1-based line of the occurrence.
    pub line: usize,
}

impl Placeholder {
    /// Whether the expression is a bare variable name.
    #[must_use]
    pub fn is_plain(&self) -> bool {
        is_identifier(&self.expression)
    }

    /// Whether the expression supplies a default (`:-` or `-` form).
    #[must_use]
    pub fn has_default(&self) -> bool {
        self.expression.contains('-')
    }

    /// Variable name the expression refers to.
    #[must_use]
    pub fn name(&self) -> &str {
        let end = self
            .expression
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(self.expression.len());
        &self.expression[..end]
    }
}

/// Finds every `${...}` in `text`; `$${...}` escapes are skipped.
#[must_use]
pub fn placeholders(text: &str) -> Vec<Placeholder> {
    let mut found = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let mut search = 0;
        while let Some(offset) = line[search..].find("${") {
            let start = search + offset;
            let body = start + 2;
            let Some(len) = line[body..].find('}') else {
                break;
            };
            let escaped = start > 0 && line.as_bytes()[start - 1] == b'$';
            if !escaped {
                found.push(Placeholder {
                    expression: line[body..body + len].to_string(),
                    line: index + 1,
                });
            }
            search = body + len + 1;
        }
    }
    found
}

/// Replaces every `${NAME}` whose name `lookup` resolves.
///
/// Placeholders with operators (`${NAME:-x}`) and unresolved names are
/// left untouched.
pub fn substitute<'a>(text: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        out.push_str(&rest[..start]);
        match lookup(name).filter(|_| is_identifier(name)) {
            Some(value) => out.push_str(value),
            None => {
                out.push_str("${");
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// `[A-Za-z_][A-Za-z0-9_]*`
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
