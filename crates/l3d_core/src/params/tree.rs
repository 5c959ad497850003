//! Hierarchical parameter store with change notification.
//!
//! Nodes are addressed by `/`-separated name paths relative to the root
//! (`"Calibration/Frame Step"`); the empty path is the root itself.
//! Listeners are called synchronously on the thread that mutates the tree.

use std::fmt;

use super::types::{
    check_name, ParamError, ParamKind, ParamResult, ParamValue, Parameter, ParameterNode,
};

/// Name of the root group.
pub const ROOT_NAME: &str = "Parameters";

/// Change notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeEvent {
    /// Children were added, replaced or removed under `path`.
    StructureChanged { path: String },
    ValueChanged { path: String, value: ParamValue },
    ActionFired { path: String },
}

/// Callback receiving tree events.
pub type TreeListener = Box<dyn Fn(&TreeEvent) + Send + Sync>;

/// Token returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

/// The project's parameter tree.
pub struct ParameterTree {
    root: Parameter,
    listeners: Vec<(ListenerId, TreeListener)>,
    next_listener: u64,
}

impl ParameterTree {
    /// Empty tree.
    pub fn new() -> Self {
        Self {
            root: Parameter::group(ROOT_NAME, Vec::new()),
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    /// Tree with the given top-level children.
    pub fn from_children(children: Vec<Parameter>) -> ParamResult<Self> {
        let root = Self::create_group(ROOT_NAME, children)?;
        Ok(Self {
            root,
            ..Self::new()
        })
    }

    /// Build a validated group node.
    pub fn create_group(name: impl Into<String>, children: Vec<Parameter>) -> ParamResult<Parameter> {
        let group = Parameter::group(name, children);
        group.validate()?;
        Ok(group)
    }

    /// Take over the nodes of `other`, keeping this tree's listeners.
    pub fn replace_root(&mut self, other: ParameterTree) {
        self.root = other.root;
        self.emit(&TreeEvent::StructureChanged {
            path: String::new(),
        });
    }

    pub fn root(&self) -> &Parameter {
        &self.root
    }

    /// Top-level children.
    pub fn children(&self) -> &[Parameter] {
        self.root.children()
    }

    pub fn subscribe(&mut self, listener: TreeListener) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_ok()
    }

    pub fn get(&self, path: &str) -> ParamResult<&Parameter> {
        let mut node = &self.root;
        for segment in segments(path) {
            node = node.child(segment).ok_or_else(|| ParamError::not_found(path))?;
        }
        Ok(node)
    }

    fn get_mut(&mut self, path: &str) -> ParamResult<&mut Parameter> {
        let mut node = &mut self.root;
        for segment in segments(path) {
            node = node
                .children_mut()
                .and_then(|children| children.iter_mut().find(|c| c.name == segment))
                .ok_or_else(|| ParamError::not_found(path))?;
        }
        Ok(node)
    }

    /// Add `child` under the group at `parent`.
    ///
    /// An existing sibling with the same name is an error unless `exist_ok`,
    /// in which case it is replaced in place.
    pub fn add_child(&mut self, parent: &str, child: Parameter, exist_ok: bool) -> ParamResult<()> {
        check_name(&child.name)?;
        child.validate()?;

        let group = self.get_mut(parent)?;
        let type_name = group.node.type_name();
        let parent_name = group.name.clone();
        let children = group
            .children_mut()
            .ok_or_else(|| ParamError::type_mismatch(parent, "group", type_name))?;

        match children.iter().position(|c| c.name == child.name) {
            Some(_) if !exist_ok => return Err(ParamError::duplicate(parent_name, child.name)),
            Some(idx) => children[idx] = child,
            None => children.push(child),
        }

        self.emit(&TreeEvent::StructureChanged {
            path: parent.to_string(),
        });
        Ok(())
    }

    /// Add several children, emitting one structure event.
    pub fn add_children(
        &mut self,
        parent: &str,
        new_children: Vec<Parameter>,
        exist_ok: bool,
    ) -> ParamResult<()> {
        // Validate everything first so a failure leaves the tree untouched
        {
            let group = self.get(parent)?;
            if !group.is_group() {
                return Err(ParamError::type_mismatch(parent, "group", group.node.type_name()));
            }
            for (i, child) in new_children.iter().enumerate() {
                check_name(&child.name)?;
                child.validate()?;
                let clash = group.child(&child.name).is_some()
                    || new_children[..i].iter().any(|c| c.name == child.name);
                if clash && !exist_ok {
                    return Err(ParamError::duplicate(&group.name, &child.name));
                }
            }
        }

        let children = self
            .get_mut(parent)?
            .children_mut()
            .ok_or_else(|| ParamError::type_mismatch(parent, "group", "leaf"))?;
        for child in new_children {
            match children.iter().position(|c| c.name == child.name) {
                Some(idx) => children[idx] = child,
                None => children.push(child),
            }
        }

        self.emit(&TreeEvent::StructureChanged {
            path: parent.to_string(),
        });
        Ok(())
    }

    /// Set the value of a scalar, choice or file node.
    ///
    /// Integers are accepted for float nodes. Listeners are only notified
    /// when the stored value actually changes.
    pub fn set_value(&mut self, path: &str, value: impl Into<ParamValue>) -> ParamResult<()> {
        let value = value.into();
        let param = self.get_mut(path)?;
        let type_name = param.node.type_name();

        let changed = match &mut param.node {
            ParameterNode::Scalar {
                value: current,
                readonly,
            } => {
                if *readonly {
                    return Err(ParamError::Readonly(path.to_string()));
                }
                let value = match (current.kind(), value) {
                    (ParamKind::Float, ParamValue::Int(v)) => ParamValue::Float(v as f64),
                    (_, v) => v,
                };
                if value.kind() != current.kind() {
                    return Err(ParamError::type_mismatch(
                        path,
                        current.kind().as_str(),
                        value.kind().as_str(),
                    ));
                }
                let changed = *current != value;
                *current = value;
                changed
            }
            ParameterNode::Choice {
                value: current,
                limits,
            } => {
                let s = value
                    .as_str()
                    .ok_or_else(|| ParamError::type_mismatch(path, "str", value.kind().as_str()))?;
                if !limits.iter().any(|l| l == s) {
                    return Err(ParamError::InvalidChoice {
                        path: path.to_string(),
                        value: s.to_string(),
                        allowed: limits.clone(),
                    });
                }
                let changed = current != s;
                *current = s.to_string();
                changed
            }
            ParameterNode::FilePath { value: current, .. } => {
                let s = value
                    .as_str()
                    .ok_or_else(|| ParamError::type_mismatch(path, "str", value.kind().as_str()))?;
                let changed = current != s;
                *current = s.to_string();
                changed
            }
            ParameterNode::Group(_) | ParameterNode::Action => {
                return Err(ParamError::type_mismatch(path, "a value node", type_name));
            }
        };

        let stored = param.value();
        if let (true, Some(stored)) = (changed, stored) {
            self.emit(&TreeEvent::ValueChanged {
                path: path.to_string(),
                value: stored,
            });
        }
        Ok(())
    }

    /// Remove and return the node at `path`.
    pub fn remove(&mut self, path: &str) -> ParamResult<Parameter> {
        let (parent, name) = match path.trim_matches('/').rsplit_once('/') {
            Some((parent, name)) => (parent.to_string(), name.to_string()),
            None if !path.trim_matches('/').is_empty() => {
                (String::new(), path.trim_matches('/').to_string())
            }
            None => return Err(ParamError::InvalidName(path.to_string())),
        };

        let children = self
            .get_mut(&parent)?
            .children_mut()
            .ok_or_else(|| ParamError::not_found(path))?;
        let idx = children
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| ParamError::not_found(path))?;
        let removed = children.remove(idx);

        self.emit(&TreeEvent::StructureChanged { path: parent });
        Ok(removed)
    }

    /// Trigger an action node.
    pub fn fire_action(&self, path: &str) -> ParamResult<()> {
        let param = self.get(path)?;
        if !matches!(param.node, ParameterNode::Action) {
            return Err(ParamError::type_mismatch(path, "action", param.node.type_name()));
        }
        tracing::debug!("[Params] Action fired: {}", path);
        self.emit(&TreeEvent::ActionFired {
            path: path.to_string(),
        });
        Ok(())
    }

    pub fn value(&self, path: &str) -> ParamResult<ParamValue> {
        let param = self.get(path)?;
        param
            .value()
            .ok_or_else(|| ParamError::type_mismatch(path, "a value node", param.node.type_name()))
    }

    /// String value of a str scalar, choice or file node.
    pub fn get_str(&self, path: &str) -> ParamResult<&str> {
        let param = self.get(path)?;
        match &param.node {
            ParameterNode::Scalar {
                value: ParamValue::Str(s),
                ..
            }
            | ParameterNode::Choice { value: s, .. }
            | ParameterNode::FilePath { value: s, .. } => Ok(s.as_str()),
            node => Err(ParamError::type_mismatch(path, "str", node.type_name())),
        }
    }

    pub fn get_int(&self, path: &str) -> ParamResult<i64> {
        let value = self.value(path)?;
        value
            .as_int()
            .ok_or_else(|| ParamError::type_mismatch(path, "int", value.kind().as_str()))
    }

    pub fn get_float(&self, path: &str) -> ParamResult<f64> {
        let value = self.value(path)?;
        value
            .as_float()
            .ok_or_else(|| ParamError::type_mismatch(path, "float", value.kind().as_str()))
    }

    pub fn get_bool(&self, path: &str) -> ParamResult<bool> {
        let value = self.value(path)?;
        value
            .as_bool()
            .ok_or_else(|| ParamError::type_mismatch(path, "bool", value.kind().as_str()))
    }

    fn emit(&self, event: &TreeEvent) {
        for (_, listener) in &self.listeners {
            listener(event);
        }
    }
}

impl Default for ParameterTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ParameterTree {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl fmt::Debug for ParameterTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterTree")
            .field("root", &self.root)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}
