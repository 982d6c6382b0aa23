//! Checked types and element data types.
//!
//! Types are plain values: `PartialEq`/`Hash` are structural, which is exactly
//! the equality the inference engine uses to decide whether a checked type
//! changed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Element type class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataTypeCode {
    Int,
    UInt,
    Float,
    Bool,
}

/// Element data type of a tensor (`float32`, `int64`, `float16x4`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataType {
    pub code: DataTypeCode,
    pub bits: u16,
    pub lanes: u16,
}

impl DataType {
    pub const fn new(code: DataTypeCode, bits: u16, lanes: u16) -> Self {
        Self { code, bits, lanes }
    }

    pub const fn float(bits: u16) -> Self {
        Self::new(DataTypeCode::Float, bits, 1)
    }

    pub const fn int(bits: u16) -> Self {
        Self::new(DataTypeCode::Int, bits, 1)
    }

    pub const fn uint(bits: u16) -> Self {
        Self::new(DataTypeCode::UInt, bits, 1)
    }

    pub const fn bool() -> Self {
        Self::new(DataTypeCode::Bool, 1, 1)
    }

    pub fn is_bool(&self) -> bool {
        self.code == DataTypeCode::Bool
    }

    /// Total width of one element in bits (`bits * lanes`).
    pub fn total_bits(&self) -> i64 {
        i64::from(self.bits) * i64::from(self.lanes)
    }

    /// Bytes needed to store one element, rounding partial bytes up.
    pub fn storage_bytes(&self) -> i64 {
        (self.total_bits() + 7) / 8
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            DataTypeCode::Bool => write!(f, "bool")?,
            DataTypeCode::Int => write!(f, "int{}", self.bits)?,
            DataTypeCode::UInt => write!(f, "uint{}", self.bits)?,
            DataTypeCode::Float => write!(f, "float{}", self.bits)?,
        }
        if self.lanes > 1 {
            write!(f, "x{}", self.lanes)?;
        }
        Ok(())
    }
}

/// Error returned when a dtype string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid dtype '{0}'")]
pub struct ParseDataTypeError(pub String);

impl FromStr for DataType {
    type Err = ParseDataTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseDataTypeError(s.to_string());
        let (base, lanes) = match s.split_once('x') {
            Some((base, lanes)) => (base, lanes.parse::<u16>().map_err(|_| err())?),
            None => (s, 1),
        };
        if lanes == 0 {
            return Err(err());
        }
        if base == "bool" {
            return Ok(DataType::new(DataTypeCode::Bool, 1, lanes));
        }
        let (code, bits) = if let Some(bits) = base.strip_prefix("float") {
            (DataTypeCode::Float, bits)
        } else if let Some(bits) = base.strip_prefix("uint") {
            (DataTypeCode::UInt, bits)
        } else if let Some(bits) = base.strip_prefix("int") {
            (DataTypeCode::Int, bits)
        } else {
            return Err(err());
        };
        let bits = bits.parse::<u16>().map_err(|_| err())?;
        if bits == 0 {
            return Err(err());
        }
        Ok(DataType::new(code, bits, lanes))
    }
}

/// Checked type of an expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// Tensor with possibly unknown rank and element type.
    DynTensor {
        rank: Option<usize>,
        dtype: Option<DataType>,
    },
    /// A shape value (list of symbolic integers).
    Shape,
    Tuple(Vec<Type>),
    Func { params: Vec<Type>, ret: Box<Type> },
}

impl Type {
    pub fn tensor(rank: usize, dtype: DataType) -> Self {
        Type::DynTensor {
            rank: Some(rank),
            dtype: Some(dtype),
        }
    }

    pub fn dyn_tensor(rank: Option<usize>, dtype: Option<DataType>) -> Self {
        Type::DynTensor { rank, dtype }
    }

    pub fn func(params: Vec<Type>, ret: Type) -> Self {
        Type::Func {
            params,
            ret: Box::new(ret),
        }
    }

    pub fn is_tensor(&self) -> bool {
        matches!(self, Type::DynTensor { .. })
    }

    /// Rank and dtype of a tensor-like type.
    pub fn as_tensor(&self) -> Option<(Option<usize>, Option<DataType>)> {
        match self {
            Type::DynTensor { rank, dtype } => Some((*rank, *dtype)),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::DynTensor { rank, dtype } => {
                write!(f, "Tensor[")?;
                match rank {
                    Some(r) => write!(f, "rank={}", r)?,
                    None => write!(f, "rank=?")?,
                }
                match dtype {
                    Some(dt) => write!(f, ", {}]", dt),
                    None => write!(f, ", ?]"),
                }
            }
            Type::Shape => write!(f, "Shape"),
            Type::Tuple(fields) => {
                write!(f, "(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, ")")
            }
            Type::Func { params, ret } => {
                write!(f, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}", ret)
            }
        }
    }
}
