use json_patch::jsonptr::PointerBuf;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// A single RFC 6902 edit emitted by the mutators.
///
/// Only `add` and `replace` are ever produced: the webhook corrects or fills in
/// fields, it never removes anything the user wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: PointerBuf, value: Value },
    Replace { path: PointerBuf, value: Value },
}

impl PatchOperation {
    pub fn add<V: Into<Value>>(path: PointerBuf, value: V) -> Self {
        PatchOperation::Add {
            path,
            value: value.into(),
        }
    }

    pub fn replace<V: Into<Value>>(path: PointerBuf, value: V) -> Self {
        PatchOperation::Replace {
            path,
            value: value.into(),
        }
    }

    pub fn path(&self) -> &PointerBuf {
        match self {
            PatchOperation::Add { path, .. } | PatchOperation::Replace { path, .. } => path,
        }
    }
}

impl fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchOperation::Add { path, value } => write!(f, "add {} = {}", path, value),
            PatchOperation::Replace { path, value } => write!(f, "replace {} = {}", path, value),
        }
    }
}

impl From<PatchOperation> for json_patch::PatchOperation {
    fn from(op: PatchOperation) -> Self {
        match op {
            PatchOperation::Add { path, value } => {
                json_patch::PatchOperation::Add(json_patch::AddOperation { path, value })
            }
            PatchOperation::Replace { path, value } => {
                json_patch::PatchOperation::Replace(json_patch::ReplaceOperation { path, value })
            }
        }
    }
}

/// Builds the pointer `/spec/{list}/{index}/{field}` for a container field.
pub fn container_field(list: &str, index: usize, field: &str) -> PointerBuf {
    PointerBuf::from_tokens(["spec", list, index.to_string().as_str(), field])
}

pub fn into_json_patch(ops: Vec<PatchOperation>) -> json_patch::Patch {
    json_patch::Patch(ops.into_iter().map(Into::into).collect())
}
