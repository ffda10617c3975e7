//! Method tables for BFM classes.

use super::param::{ParamKind, ParamType};
use crate::error::{Error, Result};
use serde::Serialize;

/// Which side of the boundary implements a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Implemented by the simulator; called from host code.
    Import,
    /// Implemented by the host driver; called from the simulator.
    Export,
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamInfo {
    /// Parameter name.
    pub name: String,
    /// Marshaling kind.
    pub kind: ParamKind,
}

/// One method in an import or export table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodInfo {
    /// Position in its table; the `method_id` on the wire.
    pub id: usize,
    /// `"<Class>.<method>"`.
    pub qualified_name: String,
    /// The part after the last `.`.
    pub name: String,
    /// Ordered parameters.
    pub params: Vec<ParamInfo>,
    /// Which table the method lives in.
    pub direction: Direction,
}

impl MethodInfo {
    /// Parameter kinds in declaration order.
    #[must_use]
    pub fn kinds(&self) -> Vec<ParamKind> {
        self.params.iter().map(|p| p.kind).collect()
    }
}

/// The import and export tables of one BFM class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BfmTypeInfo {
    /// `"<package>.<Class>"`.
    pub class_path: String,
    /// The class name, last segment of the class path.
    pub type_name: String,
    /// Methods the host calls on the simulator.
    pub imports: Vec<MethodInfo>,
    /// Methods the simulator calls on the host.
    pub exports: Vec<MethodInfo>,
}

impl BfmTypeInfo {
    pub(crate) fn new(class_path: &str) -> Result<Self> {
        let (_, type_name) = split_class_path(class_path)?;
        Ok(Self {
            class_path: class_path.to_string(),
            type_name: type_name.to_string(),
            imports: Vec::new(),
            exports: Vec::new(),
        })
    }

    /// Looks up an import by short name.
    #[must_use]
    pub fn import(&self, name: &str) -> Option<&MethodInfo> {
        self.imports.iter().find(|m| m.name == name)
    }

    /// Looks up an export by short name.
    #[must_use]
    pub fn export(&self, name: &str) -> Option<&MethodInfo> {
        self.exports.iter().find(|m| m.name == name)
    }

    /// Serializes the tables for the glue generator.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            Error::internal(format!("serializing `{}`: {e}", self.class_path)).with_source(e)
        })
    }
}

/// A method declaration before it is placed in a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl {
    pub(crate) qualified_name: String,
    pub(crate) params: Vec<(String, ParamType)>,
}

impl MethodDecl {
    /// Starts a declaration for `"<Class>.<method>"`.
    #[must_use]
    pub fn new(qualified_name: impl Into<String>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            params: Vec::new(),
        }
    }

    /// Appends a parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.params.push((name.into(), ty));
        self
    }
}

/// Splits `"<package>.<Class>"` at its last `.`.
///
/// A path without a separator, or with an empty side, is a resolution
/// failure.
pub fn split_class_path(class_path: &str) -> Result<(&str, &str)> {
    match class_path.rsplit_once('.') {
        Some((package, class)) if !package.is_empty() && !class.is_empty() => Ok((package, class)),
        _ => Err(Error::resolution(format!(
            "class path `{class_path}` is not of the form `<package>.<Class>`"
        ))),
    }
}
