//! Runtime values passed to a native module's compile-time implementation.
//! Grounded on `original_source/source/native_module/native_module.h`'s
//! `c_native_module_compile_time_argument` union, generalized into a proper
//! Rust sum type over `{real, bool, string} × {value, reference} × {scalar,
//! array}` (12 variants).

use crate::types::{DataType, Primitive, QualifiedType};

#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    RealValue(f32),
    RealValueArray(Vec<f32>),
    RealRef(f32),
    RealRefArray(Vec<f32>),
    BoolValue(bool),
    BoolValueArray(Vec<bool>),
    BoolRef(bool),
    BoolRefArray(Vec<bool>),
    StringValue(String),
    StringValueArray(Vec<String>),
    StringRef(String),
    StringRefArray(Vec<String>),
}

/// Whether a formal argument is passed by value (a fresh copy, used for
/// `in`-only scalars the implementation cannot mutate through) or by
/// reference (an out-argument slot the implementation writes into).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AccessMode {
    Value,
    Reference,
}

impl NativeValue {
    pub fn data_type(&self) -> DataType {
        match self {
            NativeValue::RealValue(_) | NativeValue::RealRef(_) => DataType::scalar(Primitive::Real),
            NativeValue::RealValueArray(_) | NativeValue::RealRefArray(_) => DataType::array(Primitive::Real),
            NativeValue::BoolValue(_) | NativeValue::BoolRef(_) => DataType::scalar(Primitive::Bool),
            NativeValue::BoolValueArray(_) | NativeValue::BoolRefArray(_) => DataType::array(Primitive::Bool),
            NativeValue::StringValue(_) | NativeValue::StringRef(_) => DataType::scalar(Primitive::String),
            NativeValue::StringValueArray(_) | NativeValue::StringRefArray(_) => DataType::array(Primitive::String),
        }
    }

    pub fn access_mode(&self) -> AccessMode {
        match self {
            NativeValue::RealRef(_)
            | NativeValue::RealRefArray(_)
            | NativeValue::BoolRef(_)
            | NativeValue::BoolRefArray(_)
            | NativeValue::StringRef(_)
            | NativeValue::StringRefArray(_) => AccessMode::Reference,
            _ => AccessMode::Value,
        }
    }

    pub fn as_real(&self) -> Option<f32> {
        match self {
            NativeValue::RealValue(v) | NativeValue::RealRef(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            NativeValue::BoolValue(v) | NativeValue::BoolRef(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            NativeValue::StringValue(v) | NativeValue::StringRef(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// A zeroed placeholder value of the given shape, used to allocate an
    /// out-argument slot before a compile-time implementation writes it.
    pub fn zeroed(qualified_type: QualifiedType, access_mode: AccessMode) -> Self {
        use AccessMode::*;
        use Primitive::*;
        let is_array = qualified_type.data_type.is_array;
        match (qualified_type.data_type.primitive, is_array, access_mode) {
            (Real, false, Value) => NativeValue::RealValue(0.0),
            (Real, false, Reference) => NativeValue::RealRef(0.0),
            (Real, true, Value) => NativeValue::RealValueArray(Vec::new()),
            (Real, true, Reference) => NativeValue::RealRefArray(Vec::new()),
            (Bool, false, Value) => NativeValue::BoolValue(false),
            (Bool, false, Reference) => NativeValue::BoolRef(false),
            (Bool, true, Value) => NativeValue::BoolValueArray(Vec::new()),
            (Bool, true, Reference) => NativeValue::BoolRefArray(Vec::new()),
            (String, false, Value) => NativeValue::StringValue(String::new()),
            (String, false, Reference) => NativeValue::StringRef(String::new()),
            (String, true, Value) => NativeValue::StringValueArray(Vec::new()),
            (String, true, Reference) => NativeValue::StringRefArray(Vec::new()),
        }
    }
}
