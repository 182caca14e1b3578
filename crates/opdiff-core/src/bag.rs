//! Raw key/value attribute form exchanged with an external compiler.
//!
//! `AttributeSet::from_bag` is the only way in from this untyped form; it
//! validates every key and value before a typed record is produced.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    AttributeSet, DataFormat, NormAttrs, OpKind, OpdiffError, PoolAttrs, PoolType, Result,
};

pub const KERNEL_SIZE: &str = "kernel_size";
pub const STRIDE_SIZE: &str = "stride_size";
pub const PADDING_SIZE: &str = "padding_size";
pub const POOL_TYPE: &str = "pool_type";
pub const CEIL_MODE: &str = "ceil_mode";
pub const EXCLUSIVE: &str = "exclusive";
pub const DATA_FORMAT: &str = "data_format";
pub const EPSILON: &str = "epsilon";

/// A single attribute value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Ints(Vec<i64>),
    Str(String),
}

impl AttrValue {
    fn kind(&self) -> &'static str {
        match self {
            AttrValue::Bool(_) => "bool",
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Ints(_) => "int list",
            AttrValue::Str(_) => "string",
        }
    }
}

/// Attribute name to value, iterated in key order.
pub type AttrBag = BTreeMap<String, AttrValue>;

struct BagReader<'a> {
    bag: &'a AttrBag,
}

impl<'a> BagReader<'a> {
    fn get(&self, key: &str) -> Option<&'a AttrValue> {
        self.bag.get(key)
    }

    fn required(&self, key: &str) -> Result<&'a AttrValue> {
        self.get(key)
            .ok_or_else(|| OpdiffError::Configuration(format!("missing attribute {key:?}")))
    }

    fn sizes(&self, key: &str) -> Result<Vec<usize>> {
        match self.required(key)? {
            AttrValue::Ints(v) => v
                .iter()
                .map(|&x| {
                    usize::try_from(x).map_err(|_| {
                        OpdiffError::Configuration(format!("{key} entries must be >= 0, got {x}"))
                    })
                })
                .collect(),
            other => Err(type_error(key, "int list", other)),
        }
    }

    fn string(&self, key: &str) -> Result<&'a str> {
        match self.required(key)? {
            AttrValue::Str(s) => Ok(s),
            other => Err(type_error(key, "string", other)),
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(AttrValue::Bool(b)) => Ok(*b),
            Some(other) => Err(type_error(key, "bool", other)),
        }
    }

    fn reject_unknown(&self, known: &[&str]) -> Result<()> {
        match self.bag.keys().find(|k| !known.contains(&k.as_str())) {
            Some(k) => Err(OpdiffError::Configuration(format!("unknown attribute {k:?}"))),
            None => Ok(()),
        }
    }
}

fn type_error(key: &str, expected: &str, got: &AttrValue) -> OpdiffError {
    OpdiffError::Configuration(format!("{key} must be {expected}, got {}", got.kind()))
}

fn ints(v: &[usize]) -> AttrValue {
    AttrValue::Ints(v.iter().map(|&x| x as i64).collect())
}

impl AttributeSet {
    /// Build and validate the typed record for `op` from raw attributes.
    pub fn from_bag(op: OpKind, bag: &AttrBag) -> Result<AttributeSet> {
        let r = BagReader { bag };
        let attrs = match op {
            OpKind::Pool1d | OpKind::Pool2d | OpKind::Pool3d => {
                r.reject_unknown(&[
                    KERNEL_SIZE,
                    STRIDE_SIZE,
                    PADDING_SIZE,
                    POOL_TYPE,
                    CEIL_MODE,
                    EXCLUSIVE,
                    DATA_FORMAT,
                ])?;
                let pool_type: PoolType = r.string(POOL_TYPE)?.parse()?;
                let data_format: DataFormat = r.string(DATA_FORMAT)?.parse()?;
                let pool = PoolAttrs::new(
                    pool_type,
                    &r.sizes(KERNEL_SIZE)?,
                    &r.sizes(STRIDE_SIZE)?,
                    &r.sizes(PADDING_SIZE)?,
                    data_format,
                )?
                .with_ceil_mode(r.flag(CEIL_MODE, false)?)
                .with_exclusive(r.flag(EXCLUSIVE, true)?);
                AttributeSet::Pool(pool)
            }
            OpKind::BatchNorm => {
                r.reject_unknown(&[EPSILON])?;
                match r.get(EPSILON) {
                    None => AttributeSet::Norm(NormAttrs::default()),
                    Some(AttrValue::Float(eps)) => AttributeSet::Norm(NormAttrs::new(*eps as f32)?),
                    Some(other) => return Err(type_error(EPSILON, "float", other)),
                }
            }
            OpKind::Relu | OpKind::Relu6 => {
                r.reject_unknown(&[])?;
                AttributeSet::Empty
            }
        };
        attrs.validate_for(op)?;
        Ok(attrs)
    }

    /// The raw key/value form of this record.
    pub fn to_bag(&self) -> AttrBag {
        let mut bag = AttrBag::new();
        match self {
            AttributeSet::Pool(p) => {
                bag.insert(KERNEL_SIZE.into(), ints(p.kernel_size()));
                bag.insert(STRIDE_SIZE.into(), ints(p.stride_size()));
                bag.insert(PADDING_SIZE.into(), ints(p.padding_size()));
                bag.insert(POOL_TYPE.into(), AttrValue::Str(p.pool_type().to_string()));
                bag.insert(CEIL_MODE.into(), AttrValue::Bool(p.ceil_mode()));
                bag.insert(EXCLUSIVE.into(), AttrValue::Bool(p.exclusive()));
                bag.insert(DATA_FORMAT.into(), AttrValue::Str(p.data_format().to_string()));
            }
            AttributeSet::Norm(n) => {
                bag.insert(EPSILON.into(), AttrValue::Float(n.epsilon() as f64));
            }
            AttributeSet::Empty => {}
        }
        bag
    }
}
