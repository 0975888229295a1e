//! In-process JSON transformation.
//!
//! The mapping file is a JSON document with up to three operations applied
//! in order:
//!
//! ```json
//! {
//!   "shift":   { "/title": "/metadata/name", "/size/width": "/image/w" },
//!   "default": { "/license": "CC-BY-4.0" },
//!   "remove":  ["/size/width"]
//! }
//! ```
//!
//! `shift` copies the value at each input JSON pointer to the paired output
//! pointer, creating intermediate objects; missing inputs are skipped.
//! `default` fills output pointers that are still absent. `remove` deletes
//! output pointers.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::io_failure;
use crate::contract::MappingPlugin;
use crate::descriptor::PluginDescriptor;
use crate::outcome::ExecutionOutcome;

/// Plugin that evaluates a JSON transformation document without a
/// subprocess.
#[derive(Debug, Clone)]
pub struct JsonQueryPlugin {
    descriptor: PluginDescriptor,
}

impl JsonQueryPlugin {
    /// Creates the plugin.
    #[must_use]
    pub const fn new(descriptor: PluginDescriptor) -> Self {
        Self { descriptor }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Transform {
    #[serde(default)]
    shift: BTreeMap<String, String>,
    #[serde(default)]
    default: BTreeMap<String, Value>,
    #[serde(default)]
    remove: Vec<String>,
}

impl Transform {
    fn apply(&self, input: &Value) -> Result<Value, String> {
        let mut output = Value::Object(Map::new());
        for (target, source) in &self.shift {
            if let Some(value) = input.pointer(source) {
                set_pointer(&mut output, target, value.clone())?;
            }
        }
        for (target, value) in &self.default {
            if output.pointer(target).is_none() {
                set_pointer(&mut output, target, value.clone())?;
            }
        }
        for target in &self.remove {
            remove_pointer(&mut output, target);
        }
        Ok(output)
    }
}

impl MappingPlugin for JsonQueryPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn map_file(&self, mapping: &Path, input: &Path, output: &Path) -> ExecutionOutcome {
        let transform: Transform = match read_json(mapping) {
            Ok(transform) => transform,
            Err(outcome) => return outcome,
        };
        let document: Value = match read_json(input) {
            Ok(document) => document,
            Err(outcome) => return outcome,
        };
        let result = match transform.apply(&document) {
            Ok(result) => result,
            Err(message) => return ExecutionOutcome::invalid_input().with_detail(message),
        };
        let rendered = match serde_json::to_vec_pretty(&result) {
            Ok(rendered) => rendered,
            Err(error) => return ExecutionOutcome::unknown_error().with_detail(error.to_string()),
        };
        match fs::write(output, rendered) {
            Ok(()) => ExecutionOutcome::success(),
            Err(error) => io_failure("failed to write", output, &error),
        }
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ExecutionOutcome> {
    let text = fs::read(path).map_err(|error| io_failure("failed to read", path, &error))?;
    serde_json::from_slice(&text).map_err(|error| {
        ExecutionOutcome::invalid_input()
            .with_detail(format!("malformed JSON in '{}': {error}", path.display()))
    })
}

/// Splits a JSON pointer into unescaped reference tokens.
fn tokens(pointer: &str) -> Result<Vec<String>, String> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(format!("JSON pointer '{pointer}' must start with '/'"));
    };
    Ok(rest
        .split('/')
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
        .collect())
}

fn set_pointer(root: &mut Value, pointer: &str, value: Value) -> Result<(), String> {
    let path = tokens(pointer)?;
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return Ok(());
    };
    let mut current = root;
    for token in parents {
        let Value::Object(map) = current else {
            return Err(format!("cannot descend into non-object at '{pointer}'"));
        };
        current = map
            .entry(token.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    let Value::Object(map) = current else {
        return Err(format!("cannot write into non-object at '{pointer}'"));
    };
    map.insert(last.clone(), value);
    Ok(())
}

fn remove_pointer(root: &mut Value, pointer: &str) {
    let Ok(path) = tokens(pointer) else {
        return;
    };
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = root;
    for token in parents {
        match current {
            Value::Object(map) => match map.get_mut(token) {
                Some(next) => current = next,
                None => return,
            },
            _ => return,
        }
    }
    if let Value::Object(map) = current {
        map.remove(last);
    }
}
