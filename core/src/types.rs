//! The WaveLang value-type system: primitive kind, array-ness, upsample
//! factor, and a mutability lattice. Grounded directly on
//! `original_source/source/native_module/native_module_data_type.h`'s
//! `c_native_module_data_type`/`c_native_module_qualified_data_type` split.

use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Primitive {
    Real,
    Bool,
    String,
}

impl Primitive {
    /// Strings may never hold a runtime-variable value (spec.md §3.5); every
    /// other primitive permits all three mutability levels.
    pub fn is_constant_only(self) -> bool {
        matches!(self, Primitive::String)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Primitive::Real => "real",
            Primitive::Bool => "bool",
            Primitive::String => "string",
        })
    }
}

/// Ordered such that `a >= b` means a value of mutability `a` is assignable
/// to a slot of mutability `b`: `Constant >= DependentConstant >= Variable`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mutability {
    Variable,
    DependentConstant,
    Constant,
}

/// An unqualified shape: primitive, array-ness, upsample factor. Upsample
/// factor is always `1` for a constant value (spec.md §3.5); non-constant
/// values may upsample to represent per-sample-block oversampling.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DataType {
    pub primitive: Primitive,
    pub is_array: bool,
    pub upsample_factor: u32,
}

impl DataType {
    pub fn scalar(primitive: Primitive) -> Self {
        DataType { primitive, is_array: false, upsample_factor: 1 }
    }

    pub fn array(primitive: Primitive) -> Self {
        DataType { primitive, is_array: true, upsample_factor: 1 }
    }

    pub fn element_type(self) -> DataType {
        DataType { is_array: false, ..self }
    }

    pub fn array_type(self) -> DataType {
        DataType { is_array: true, ..self }
    }

    pub fn upsampled(self, factor: u32) -> DataType {
        DataType { upsample_factor: factor, ..self }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primitive)?;
        if self.is_array {
            write!(f, "[]")?;
        }
        if self.upsample_factor != 1 {
            write!(f, "@{}x", self.upsample_factor)?;
        }
        Ok(())
    }
}

/// A [`DataType`] paired with its [`Mutability`]. This is the type every
/// value declaration, expression, and argument slot carries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedType {
    pub data_type: DataType,
    pub mutability: Mutability,
}

impl QualifiedType {
    pub fn new(data_type: DataType, mutability: Mutability) -> Self {
        if data_type.primitive.is_constant_only() {
            debug_assert_eq!(mutability, Mutability::Constant);
        }
        QualifiedType { data_type, mutability }
    }

    pub fn with_mutability(self, mutability: Mutability) -> Self {
        QualifiedType { mutability, ..self }
    }

    pub fn element_type(self) -> Self {
        QualifiedType { data_type: self.data_type.element_type(), ..self }
    }

    pub fn array_type(self) -> Self {
        QualifiedType { data_type: self.data_type.array_type(), ..self }
    }
}

impl fmt::Display for QualifiedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mutability == Mutability::Constant {
            write!(f, "const ")?;
        }
        write!(f, "{}", self.data_type)
    }
}

/// Whether `from` can be implicitly used where `to` is expected: same data
/// type, and `from`'s mutability is at least as constant as `to`'s
/// (spec.md §3.5: "assignable A→B iff A ≥ B").
pub fn is_assignable(from: QualifiedType, to: QualifiedType) -> bool {
    from.data_type == to.data_type && from.mutability >= to.mutability
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_assignable_to_variable() {
        let constant = QualifiedType::new(DataType::scalar(Primitive::Real), Mutability::Constant);
        let variable = QualifiedType::new(DataType::scalar(Primitive::Real), Mutability::Variable);
        assert!(is_assignable(constant, variable));
        assert!(!is_assignable(variable, constant));
    }

    #[test]
    fn mismatched_data_type_never_assignable() {
        let real = QualifiedType::new(DataType::scalar(Primitive::Real), Mutability::Constant);
        let boolean = QualifiedType::new(DataType::scalar(Primitive::Bool), Mutability::Constant);
        assert!(!is_assignable(real, boolean));
    }
}
