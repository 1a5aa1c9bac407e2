//! Parsed form of the selector registry source.
//!
//! The source is a mapping of category → entry name → `{description, strategies}`.
//! Groups may nest, so a path can have more than two segments. A `_meta` block
//! carries registry metadata; other keys starting with `_` are comments.

use super::RegistryError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_yaml::Value;
use std::collections::BTreeMap;
use tether_common::protocol::LocatorExpression;

pub const META_KEY: &str = "_meta";
const STRATEGIES_KEY: &str = "strategies";
const DESCRIPTION_KEY: &str = "description";

/// Ordered candidate expressions for one UI element, most specific first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyEntry {
    pub description: String,
    pub strategies: Vec<LocatorExpression>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_validated: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryNode {
    Entry(StrategyEntry),
    Group(Group),
    /// Present in the source but unusable, e.g. an entry without strategies.
    Invalid { reason: String },
}

/// Children in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    children: Vec<(String, RegistryNode)>,
}

impl Group {
    pub fn get(&self, name: &str) -> Option<&RegistryNode> {
        self.children
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, node)| node)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RegistryNode)> {
        self.children.iter().map(|(key, node)| (key.as_str(), node))
    }
}

impl Serialize for Group {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.children.len()))?;
        for (key, node) in &self.children {
            map.serialize_entry(key, node)?;
        }
        map.end()
    }
}

impl Serialize for RegistryNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RegistryNode::Entry(entry) => entry.serialize(serializer),
            RegistryNode::Group(group) => group.serialize(serializer),
            RegistryNode::Invalid { reason } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("invalid", reason)?;
                map.end()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistryDocument {
    root: Group,
    metadata: RegistryMetadata,
}

impl RegistryDocument {
    /// Parse a registry source. `origin` names the source in error messages.
    pub fn parse(content: &str, origin: &str) -> Result<Self, RegistryError> {
        let load_error = |reason: String| RegistryError::ConfigLoad {
            origin: origin.to_string(),
            reason,
        };

        let value: Value =
            serde_yaml::from_str(content).map_err(|e| load_error(format!("parse error: {}", e)))?;
        let Value::Mapping(mapping) = value else {
            return Err(load_error("top level must be a mapping of categories".into()));
        };

        let mut metadata = RegistryMetadata::default();
        let mut children = Vec::new();
        for (key, value) in mapping {
            let key = match key {
                Value::String(key) => key,
                other => return Err(load_error(format!("non-string key {:?}", other))),
            };
            if key == META_KEY {
                metadata = serde_yaml::from_value(value)
                    .map_err(|e| load_error(format!("invalid {} block: {}", META_KEY, e)))?;
                continue;
            }
            if key.starts_with('_') {
                continue;
            }
            if !matches!(value, Value::Mapping(_)) {
                return Err(load_error(format!("category '{}' must be a mapping", key)));
            }
            let node = parse_node(value, &key);
            children.push((key, node));
        }

        Ok(Self {
            root: Group { children },
            metadata,
        })
    }

    pub fn metadata(&self) -> &RegistryMetadata {
        &self.metadata
    }

    pub fn with_last_validated(&self, timestamp: String) -> Self {
        let mut next = self.clone();
        next.metadata.last_validated = Some(timestamp);
        next
    }

    pub fn categories(&self) -> Vec<&str> {
        self.root.names().collect()
    }

    pub fn category(&self, name: &str) -> Option<&RegistryNode> {
        self.root.get(name)
    }

    pub fn root(&self) -> &Group {
        &self.root
    }

    /// Walk a dotted path down to an entry.
    pub fn lookup(&self, path: &str) -> Result<&StrategyEntry, RegistryError> {
        let unknown = |reason: String| RegistryError::UnknownSelector {
            path: path.to_string(),
            reason,
        };

        let mut current: Option<&RegistryNode> = None;
        let mut walked = Vec::new();
        for segment in path.split('.') {
            if segment.is_empty() {
                return Err(unknown("empty path segment".into()));
            }
            let next = match current {
                None => self.root.get(segment),
                Some(RegistryNode::Group(group)) => group.get(segment),
                Some(_) => None,
            };
            let Some(node) = next else {
                let parent = if walked.is_empty() {
                    "the registry".to_string()
                } else {
                    format!("'{}'", walked.join("."))
                };
                return Err(unknown(format!("no '{}' under {}", segment, parent)));
            };
            walked.push(segment);
            current = Some(node);
        }

        match current {
            Some(RegistryNode::Entry(entry)) => Ok(entry),
            Some(RegistryNode::Group(_)) => {
                Err(unknown("path names a group, not an entry".into()))
            }
            Some(RegistryNode::Invalid { reason }) => Err(unknown(reason.clone())),
            None => Err(unknown("empty path".into())),
        }
    }

    /// Every usable entry in source order, optionally limited to one category.
    pub fn entries(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<(String, &StrategyEntry)>, RegistryError> {
        let mut out = Vec::new();
        match category {
            Some(name) => {
                let node = self
                    .root
                    .get(name)
                    .ok_or_else(|| RegistryError::UnknownSelector {
                        path: name.to_string(),
                        reason: "no such category".into(),
                    })?;
                collect_entries(node, name, &mut out);
            }
            None => {
                for (name, node) in self.root.iter() {
                    collect_entries(node, name, &mut out);
                }
            }
        }
        Ok(out)
    }

    /// Paths of unusable entries with the reason they were rejected.
    pub fn invalid_entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (name, node) in self.root.iter() {
            collect_invalid(node, name, &mut out);
        }
        out
    }

    pub fn len(&self) -> usize {
        let mut out = Vec::new();
        for (name, node) in self.root.iter() {
            collect_entries(node, name, &mut out);
        }
        out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn collect_entries<'a>(
    node: &'a RegistryNode,
    path: &str,
    out: &mut Vec<(String, &'a StrategyEntry)>,
) {
    match node {
        RegistryNode::Entry(entry) => out.push((path.to_string(), entry)),
        RegistryNode::Group(group) => {
            for (name, child) in group.iter() {
                collect_entries(child, &format!("{}.{}", path, name), out);
            }
        }
        RegistryNode::Invalid { .. } => {}
    }
}

fn collect_invalid(node: &RegistryNode, path: &str, out: &mut Vec<(String, String)>) {
    match node {
        RegistryNode::Invalid { reason } => out.push((path.to_string(), reason.clone())),
        RegistryNode::Group(group) => {
            for (name, child) in group.iter() {
                collect_invalid(child, &format!("{}.{}", path, name), out);
            }
        }
        RegistryNode::Entry(_) => {}
    }
}

fn parse_node(value: Value, path: &str) -> RegistryNode {
    let Value::Mapping(mapping) = value else {
        return RegistryNode::Invalid {
            reason: "expected a mapping with 'strategies'".into(),
        };
    };

    if let Some(strategies) = mapping.get(STRATEGIES_KEY) {
        return parse_entry(strategies, mapping.get(DESCRIPTION_KEY), path);
    }

    let mut children = Vec::new();
    for (key, child) in mapping {
        let Value::String(key) = key else {
            continue;
        };
        if key.starts_with('_') || key == DESCRIPTION_KEY {
            continue;
        }
        let child_path = format!("{}.{}", path, key);
        let node = parse_node(child, &child_path);
        children.push((key, node));
    }
    RegistryNode::Group(Group { children })
}

fn parse_entry(strategies: &Value, description: Option<&Value>, path: &str) -> RegistryNode {
    let Value::Sequence(items) = strategies else {
        return RegistryNode::Invalid {
            reason: "'strategies' must be a list of expressions".into(),
        };
    };

    let mut expressions = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) if !s.trim().is_empty() => {
                expressions.push(LocatorExpression::new(s.clone()))
            }
            _ => {
                return RegistryNode::Invalid {
                    reason: "every strategy must be a non-empty string".into(),
                };
            }
        }
    }
    if expressions.is_empty() {
        return RegistryNode::Invalid {
            reason: "entry has no strategies".into(),
        };
    }

    let description = match description {
        Some(Value::String(s)) => s.clone(),
        _ => path.to_string(),
    };

    RegistryNode::Entry(StrategyEntry {
        description,
        strategies: expressions,
    })
}
