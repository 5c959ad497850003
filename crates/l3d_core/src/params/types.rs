//! Parameter node types and errors.

use std::fmt;

use thiserror::Error;

/// Errors from parameter tree operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("Parameter '{0}' not found")]
    NotFound(String),

    #[error("'{parent}' already has a child named '{name}'")]
    DuplicateName { parent: String, name: String },

    #[error("Parameter '{path}' expects {expected}, got {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("Parameter '{0}' is read-only")]
    Readonly(String),

    #[error("'{value}' is not a valid choice for '{path}' (allowed: {})", .allowed.join(", "))]
    InvalidChoice {
        path: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("Invalid parameter name '{0}'")]
    InvalidName(String),

    #[error("{videos} videos but {names} camera names")]
    CameraCount { videos: usize, names: usize },
}

impl ParamError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn type_mismatch(
        path: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            path: path.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn duplicate(parent: impl Into<String>, name: impl Into<String>) -> Self {
        Self::DuplicateName {
            parent: parent.into(),
            name: name.into(),
        }
    }
}

/// Result type for parameter operations.
pub type ParamResult<T> = Result<T, ParamError>;

/// A scalar parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Str(_) => ParamKind::Str,
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Float(_) => ParamKind::Float,
            ParamValue::Bool(_) => ParamKind::Bool,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float value; integers widen.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) => f.write_str(s),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Str(s)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

/// Declared kind of a scalar parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Str,
    Int,
    Float,
    Bool,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Str => "str",
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Bool => "bool",
        }
    }
}

/// Whether a file parameter names an input or an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileMode {
    #[default]
    Open,
    Save,
}

impl FileMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileMode::Open => "open",
            FileMode::Save => "save",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(FileMode::Open),
            "save" => Some(FileMode::Save),
            _ => None,
        }
    }
}

/// Node payload. Closed set of variants; every consumer matches exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterNode {
    Group(Vec<Parameter>),
    Scalar { value: ParamValue, readonly: bool },
    Choice { value: String, limits: Vec<String> },
    FilePath { value: String, mode: FileMode },
    Action,
}

impl ParameterNode {
    /// Type tag, as used in persisted documents.
    pub fn type_name(&self) -> &'static str {
        match self {
            ParameterNode::Group(_) => "group",
            ParameterNode::Scalar { value, .. } => value.kind().as_str(),
            ParameterNode::Choice { .. } => "list",
            ParameterNode::FilePath { .. } => "file",
            ParameterNode::Action => "action",
        }
    }
}

/// A named node in the parameter tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub node: ParameterNode,
}

impl Parameter {
    pub fn new(name: impl Into<String>, node: ParameterNode) -> Self {
        Self {
            name: name.into(),
            node,
        }
    }

    pub fn group(name: impl Into<String>, children: Vec<Parameter>) -> Self {
        Self::new(name, ParameterNode::Group(children))
    }

    pub fn scalar(name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self::new(
            name,
            ParameterNode::Scalar {
                value: value.into(),
                readonly: false,
            },
        )
    }

    pub fn readonly(name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self::new(
            name,
            ParameterNode::Scalar {
                value: value.into(),
                readonly: true,
            },
        )
    }

    pub fn choice(name: impl Into<String>, value: impl Into<String>, limits: Vec<String>) -> Self {
        Self::new(
            name,
            ParameterNode::Choice {
                value: value.into(),
                limits,
            },
        )
    }

    pub fn file(name: impl Into<String>, value: impl Into<String>, mode: FileMode) -> Self {
        Self::new(
            name,
            ParameterNode::FilePath {
                value: value.into(),
                mode,
            },
        )
    }

    pub fn action(name: impl Into<String>) -> Self {
        Self::new(name, ParameterNode::Action)
    }

    pub fn is_group(&self) -> bool {
        matches!(self.node, ParameterNode::Group(_))
    }

    /// Current value. Choices and file paths read as strings;
    /// groups and actions have none.
    pub fn value(&self) -> Option<ParamValue> {
        match &self.node {
            ParameterNode::Scalar { value, .. } => Some(value.clone()),
            ParameterNode::Choice { value, .. } | ParameterNode::FilePath { value, .. } => {
                Some(ParamValue::Str(value.clone()))
            }
            ParameterNode::Group(_) | ParameterNode::Action => None,
        }
    }

    pub fn children(&self) -> &[Parameter] {
        match &self.node {
            ParameterNode::Group(children) => children.as_slice(),
            _ => &[],
        }
    }

    pub fn child(&self, name: &str) -> Option<&Parameter> {
        self.children().iter().find(|c| c.name == name)
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<Parameter>> {
        match &mut self.node {
            ParameterNode::Group(children) => Some(children),
            _ => None,
        }
    }

    /// Check that sibling names are unique at every level and that every
    /// choice holds one of its limits.
    pub fn validate(&self) -> ParamResult<()> {
        if let ParameterNode::Choice { value, limits } = &self.node {
            if !limits.contains(value) {
                return Err(ParamError::InvalidChoice {
                    path: self.name.clone(),
                    value: value.clone(),
                    allowed: limits.clone(),
                });
            }
        }

        let children = self.children();
        for (i, child) in children.iter().enumerate() {
            check_name(&child.name)?;
            if children[..i].iter().any(|c| c.name == child.name) {
                return Err(ParamError::duplicate(&self.name, &child.name));
            }
            child.validate()?;
        }
        Ok(())
    }
}

/// Names starting with this are kept for document bookkeeping keys.
pub(crate) const RESERVED_PREFIX: &str = "__";

pub(crate) fn check_name(name: &str) -> ParamResult<()> {
    if name.is_empty() || name.contains('/') || name.starts_with(RESERVED_PREFIX) {
        return Err(ParamError::InvalidName(name.to_string()));
    }
    Ok(())
}
