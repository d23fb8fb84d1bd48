//! Conversion traits for typed argument extraction and result production.
//!
//! - [`FromSlot`]: extract a Rust value from a [`Dynamic`] boundary slot
//! - [`IntoSlot`]: convert a Rust value into a [`Dynamic`] boundary slot
//!
//! Narrowing integer conversions are bounds-checked; a failed extraction is
//! reported as a [`ConversionError`] carrying the expected and actual type
//! names, which the dispatch layer raises through the runtime error channel.

use crate::error::ConversionError;
use crate::value::Dynamic;

/// Extract a value from a boundary slot.
pub trait FromSlot: Sized {
    /// Extract a value from the given slot.
    ///
    /// Returns a `ConversionError` if the slot contains an incompatible type.
    fn from_slot(slot: &Dynamic) -> Result<Self, ConversionError>;
}

/// Convert a value into a boundary slot.
pub trait IntoSlot {
    /// Convert this value into a boundary slot.
    fn into_slot(self) -> Dynamic;
}

macro_rules! impl_from_slot_int {
    ($($ty:ty),*) => {
        $(
            impl FromSlot for $ty {
                fn from_slot(slot: &Dynamic) -> Result<Self, ConversionError> {
                    match slot {
                        Dynamic::Int(v) => {
                            if *v >= Self::MIN as i64 && *v <= Self::MAX as i64 {
                                Ok(*v as Self)
                            } else {
                                Err(ConversionError::IntegerOverflow {
                                    value: *v,
                                    target_type: stringify!($ty),
                                })
                            }
                        }
                        _ => Err(ConversionError::TypeMismatch {
                            expected: "int",
                            actual: slot.type_name(),
                        }),
                    }
                }
            }

            impl IntoSlot for $ty {
                fn into_slot(self) -> Dynamic {
                    Dynamic::Int(self as i64)
                }
            }
        )*
    };
}

impl_from_slot_int!(i8, i16, i32, i64);

macro_rules! impl_from_slot_uint {
    ($($ty:ty),*) => {
        $(
            impl FromSlot for $ty {
                fn from_slot(slot: &Dynamic) -> Result<Self, ConversionError> {
                    match slot {
                        Dynamic::Int(v) => {
                            if *v >= 0 && *v <= Self::MAX as i64 {
                                Ok(*v as Self)
                            } else {
                                Err(ConversionError::IntegerOverflow {
                                    value: *v,
                                    target_type: stringify!($ty),
                                })
                            }
                        }
                        _ => Err(ConversionError::TypeMismatch {
                            expected: "int",
                            actual: slot.type_name(),
                        }),
                    }
                }
            }

            impl IntoSlot for $ty {
                fn into_slot(self) -> Dynamic {
                    Dynamic::Int(self as i64)
                }
            }
        )*
    };
}

impl_from_slot_uint!(u8, u16, u32);

// u64 round-trips through bit reinterpretation to preserve the full range.
impl FromSlot for u64 {
    fn from_slot(slot: &Dynamic) -> Result<Self, ConversionError> {
        match slot {
            Dynamic::Int(v) => Ok(*v as u64),
            _ => Err(ConversionError::TypeMismatch {
                expected: "int",
                actual: slot.type_name(),
            }),
        }
    }
}

impl IntoSlot for u64 {
    fn into_slot(self) -> Dynamic {
        Dynamic::Int(self as i64)
    }
}

impl FromSlot for f64 {
    fn from_slot(slot: &Dynamic) -> Result<Self, ConversionError> {
        match slot {
            Dynamic::Float(v) => Ok(*v),
            Dynamic::Int(v) => Ok(*v as f64),
            _ => Err(ConversionError::TypeMismatch {
                expected: "float",
                actual: slot.type_name(),
            }),
        }
    }
}

impl IntoSlot for f64 {
    fn into_slot(self) -> Dynamic {
        Dynamic::Float(self)
    }
}

impl FromSlot for f32 {
    fn from_slot(slot: &Dynamic) -> Result<Self, ConversionError> {
        match slot {
            Dynamic::Float(v) => {
                if !v.is_finite() || (*v <= f32::MAX as f64 && *v >= f32::MIN as f64) {
                    Ok(*v as f32)
                } else {
                    Err(ConversionError::FloatConversion {
                        value: *v,
                        target_type: "f32",
                    })
                }
            }
            Dynamic::Int(v) => Ok(*v as f32),
            _ => Err(ConversionError::TypeMismatch {
                expected: "float",
                actual: slot.type_name(),
            }),
        }
    }
}

impl IntoSlot for f32 {
    fn into_slot(self) -> Dynamic {
        Dynamic::Float(self as f64)
    }
}

impl FromSlot for bool {
    fn from_slot(slot: &Dynamic) -> Result<Self, ConversionError> {
        match slot {
            Dynamic::Bool(v) => Ok(*v),
            _ => Err(ConversionError::TypeMismatch {
                expected: "bool",
                actual: slot.type_name(),
            }),
        }
    }
}

impl IntoSlot for bool {
    fn into_slot(self) -> Dynamic {
        Dynamic::Bool(self)
    }
}

impl FromSlot for String {
    fn from_slot(slot: &Dynamic) -> Result<Self, ConversionError> {
        match slot {
            Dynamic::Str(s) => Ok(s.clone()),
            _ => Err(ConversionError::TypeMismatch {
                expected: "string",
                actual: slot.type_name(),
            }),
        }
    }
}

impl IntoSlot for String {
    fn into_slot(self) -> Dynamic {
        Dynamic::Str(self)
    }
}

impl IntoSlot for &str {
    fn into_slot(self) -> Dynamic {
        Dynamic::Str(self.to_string())
    }
}

impl FromSlot for Dynamic {
    fn from_slot(slot: &Dynamic) -> Result<Self, ConversionError> {
        Ok(slot.clone())
    }
}

impl IntoSlot for Dynamic {
    fn into_slot(self) -> Dynamic {
        self
    }
}

impl IntoSlot for () {
    fn into_slot(self) -> Dynamic {
        Dynamic::Nil
    }
}
