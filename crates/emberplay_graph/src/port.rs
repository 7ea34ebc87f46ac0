// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port definitions for node connection points.

use serde::{Deserialize, Serialize};

/// Zero-based index of a port within a node's port array.
///
/// Stable for a given node configuration; regenerating a node's ports
/// replaces the whole array and may invalidate indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortIndex(pub u16);

impl PortIndex {
    /// Array index for this port
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl std::fmt::Display for PortIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortDirection {
    /// Control-flow entry (receives calls)
    ControlEnter,
    /// Control-flow exit (emits calls)
    ControlExit,
    /// Data input (pulls values)
    DataInput,
    /// Data output (produces values)
    DataOutput,
}

impl PortDirection {
    /// Check if this is a control-flow direction
    pub fn is_control_flow(self) -> bool {
        matches!(self, Self::ControlEnter | Self::ControlExit)
    }

    /// Check if this is a data direction
    pub fn is_data(self) -> bool {
        matches!(self, Self::DataInput | Self::DataOutput)
    }

    /// Check if this is a receiving direction (enter or data input)
    pub fn is_input(self) -> bool {
        matches!(self, Self::ControlEnter | Self::DataInput)
    }

    /// Check if this is an emitting direction (exit or data output)
    pub fn is_output(self) -> bool {
        matches!(self, Self::ControlExit | Self::DataOutput)
    }
}

/// Data type that can flow through ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    /// Boolean value
    Bool,
    /// Integer value
    Int,
    /// Floating point value
    Float,
    /// 3D vector
    Vector3,
    /// String value
    String,
    /// Host entity reference
    Entity,
    /// Any type (for generic nodes)
    Any,
}

impl ValueType {
    /// Check whether a value of type `source` may arrive at a port of this type.
    ///
    /// `Any` bridges everything; `Int` and `Float` convert implicitly.
    pub fn accepts(self, source: ValueType) -> bool {
        if matches!(self, Self::Any) || matches!(source, Self::Any) {
            return true;
        }
        if self == source {
            return true;
        }
        matches!(
            (self, source),
            (Self::Int, Self::Float) | (Self::Float, Self::Int)
        )
    }
}

/// Value that can flow through a data port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i32),
    /// Float
    Float(f32),
    /// 3D vector
    Vector3([f32; 3]),
    /// String
    String(String),
    /// Host entity handle
    Entity(u64),
}

impl Value {
    /// Get the type of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::Vector3(_) => ValueType::Vector3,
            Self::String(_) => ValueType::String,
            Self::Entity(_) => ValueType::Entity,
        }
    }

    /// Get as a boolean, if it is one
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as an integer, converting from float if needed
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) => Some(*f as i32),
            _ => None,
        }
    }

    /// Get as a float, converting from integer if needed
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f32),
            _ => None,
        }
    }

    /// Get as a string slice, if it is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as a 3D vector, if it is one
    pub fn as_vector3(&self) -> Option<[f32; 3]> {
        match self {
            Self::Vector3(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as an entity handle, if it is one
    pub fn as_entity(&self) -> Option<u64> {
        match self {
            Self::Entity(e) => Some(*e),
            _ => None,
        }
    }
}

/// A connection point on a node.
///
/// Immutable once produced by a node's port-generation step; changing a
/// node's configuration regenerates the whole port array, it never mutates
/// a port in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    /// Port name
    pub name: String,
    /// Port direction
    pub direction: PortDirection,
    /// Data type; `None` for untyped pass-through ports
    pub data_type: Option<ValueType>,
    /// Inline default for unlinked data inputs
    pub default_value: Option<Value>,
    /// Whether a data input accepts several incoming links
    pub is_multiple: bool,
    /// Whether this port is forwarded to/from an owning sub-graph node
    pub is_external: bool,
}

impl Port {
    /// Create a control-flow entry port
    pub fn control_enter(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::ControlEnter,
            data_type: None,
            default_value: None,
            is_multiple: false,
            is_external: false,
        }
    }

    /// Create a control-flow exit port
    pub fn control_exit(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::ControlExit,
            data_type: None,
            default_value: None,
            is_multiple: false,
            is_external: false,
        }
    }

    /// Create a data input port
    pub fn input(name: impl Into<String>, data_type: ValueType) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::DataInput,
            data_type: Some(data_type),
            default_value: None,
            is_multiple: false,
            is_external: false,
        }
    }

    /// Create a data output port
    pub fn output(name: impl Into<String>, data_type: ValueType) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::DataOutput,
            data_type: Some(data_type),
            default_value: None,
            is_multiple: false,
            is_external: false,
        }
    }

    /// Set the inline default value
    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Allow several incoming links on this input
    pub fn multiple(mut self) -> Self {
        self.is_multiple = true;
        self
    }

    /// Mark this port as forwarded across a sub-graph boundary
    pub fn external(mut self) -> Self {
        self.is_external = true;
        self
    }

    /// Check if this is a control-flow port
    pub fn is_control_flow(&self) -> bool {
        self.direction.is_control_flow()
    }

    /// Check if this is a data port
    pub fn is_data(&self) -> bool {
        self.direction.is_data()
    }

    /// Check whether a link from this port to `target` would be valid.
    ///
    /// `self` is the emitting side. Control exits feed control enters, data
    /// outputs feed data inputs; data types must be compatible. A port
    /// without a declared type passes anything through.
    pub fn can_link_to(&self, target: &Port) -> bool {
        match (self.direction, target.direction) {
            (PortDirection::ControlExit, PortDirection::ControlEnter) => true,
            (PortDirection::DataOutput, PortDirection::DataInput) => {
                match (self.data_type, target.data_type) {
                    (Some(src), Some(dst)) => dst.accepts(src),
                    _ => true,
                }
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_classification() {
        assert!(PortDirection::ControlEnter.is_control_flow());
        assert!(PortDirection::ControlEnter.is_input());
        assert!(PortDirection::ControlExit.is_output());
        assert!(PortDirection::DataInput.is_data());
        assert!(!PortDirection::DataOutput.is_control_flow());
    }

    #[test]
    fn test_type_compatibility() {
        assert!(ValueType::Float.accepts(ValueType::Int));
        assert!(ValueType::Int.accepts(ValueType::Float));
        assert!(ValueType::Any.accepts(ValueType::String));
        assert!(ValueType::String.accepts(ValueType::Any));
        assert!(!ValueType::Bool.accepts(ValueType::String));
    }

    #[test]
    fn test_value_coercion() {
        assert_eq!(Value::Int(3).as_float(), Some(3.0));
        assert_eq!(Value::Float(2.5).as_int(), Some(2));
        assert_eq!(Value::Bool(true).as_int(), None);
        assert_eq!(Value::String("x".into()).as_str(), Some("x"));
    }

    #[test]
    fn test_link_compatibility() {
        let exit = Port::control_exit("Exec");
        let enter = Port::control_enter("Exec");
        assert!(exit.can_link_to(&enter));
        assert!(!enter.can_link_to(&exit));

        let out = Port::output("Value", ValueType::Int);
        let input = Port::input("Value", ValueType::Float);
        assert!(out.can_link_to(&input));
        assert!(!out.can_link_to(&enter));

        let untyped = Port {
            data_type: None,
            ..Port::output("Pass", ValueType::Any)
        };
        assert!(untyped.can_link_to(&input));
    }
}
