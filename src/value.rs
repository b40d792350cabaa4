//! The dynamic value type flowing through script-built patterns, and the
//! arithmetic used by control patterns.
//!
//! Operations never fail loudly: a mismatched or undefined operation gives
//! `None`, and the pattern-level operators keep the left value in that case.

use crate::error::EvalError;
use crate::pattern::{app_left, Pattern};
use crate::rational::Rational;
use crate::registry::{arg_f64, arg_pattern, expect_args, RegistryBuilder};
use std::collections::BTreeMap;
use std::fmt;

/// A value that can be the payload of an event.
#[derive(Clone)]
pub enum Value {
    Number(f64),
    Str(String),
    Bool(bool),
    Seq(Vec<Value>),
    Pattern(Pattern<Value>),
    /// Named control fields, e.g. `{s: "bd", gain: 0.5}`.
    Map(BTreeMap<String, Value>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({})", n),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Seq(items) => f.debug_tuple("Seq").field(items).finish(),
            Value::Pattern(_) => write!(f, "Pattern(...)"),
            Value::Map(fields) => f.debug_tuple("Map").field(fields).finish(),
        }
    }
}

impl PartialEq for Value {
    /// Structural equality. Patterns are never equal to anything.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Seq(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Pattern(_) => write!(f, "<pattern>"),
            Value::Map(fields) => {
                write!(f, "{{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Pattern<Value>> for Value {
    fn from(pat: Pattern<Value>) -> Self {
        Value::Pattern(pat)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Seq(items)
    }
}

impl Value {
    /// A one-field map.
    pub fn field(name: &str, value: impl Into<Value>) -> Value {
        let mut fields = BTreeMap::new();
        fields.insert(name.to_string(), value.into());
        Value::Map(fields)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Seq(_) => "sequence",
            Value::Pattern(_) => "pattern",
            Value::Map(_) => "map",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_rational(&self) -> Option<Rational> {
        self.as_number().and_then(Rational::from_f64)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a field of a map value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Map(fields) => fields.get(name),
            _ => None,
        }
    }

    /// Numbers are true when non-zero, strings when non-blank and not "false".
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.trim().is_empty() && s != "false",
            Value::Bool(b) => *b,
            Value::Seq(items) => !items.is_empty(),
            Value::Map(fields) => !fields.is_empty(),
            Value::Pattern(_) => true,
        }
    }

    /// Merge `other`'s fields over this map. Non-map values are replaced.
    pub fn merge(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Map(a), Value::Map(b)) => {
                let mut fields = a.clone();
                fields.extend(b.iter().map(|(k, v)| (k.clone(), v.clone())));
                Value::Map(fields)
            }
            _ => other.clone(),
        }
    }

    /// Apply a numeric operation, spreading it over map fields.
    ///
    /// Map with number applies to every numeric field; map with map
    /// combines shared keys and keeps the rest. Fields the operation is
    /// undefined for keep their left-hand value.
    fn numeric(&self, other: &Value, op: fn(f64, f64) -> Option<f64>) -> Option<Value> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => {
                op(*a, *b).filter(|n| n.is_finite()).map(Value::Number)
            }
            (Value::Map(fields), Value::Number(_)) => Some(Value::Map(
                fields
                    .iter()
                    .map(|(k, v)| {
                        let combined = v.numeric(other, op).unwrap_or_else(|| v.clone());
                        (k.clone(), combined)
                    })
                    .collect(),
            )),
            (Value::Number(_), Value::Map(fields)) => Some(Value::Map(
                fields
                    .iter()
                    .map(|(k, v)| {
                        let combined = self.numeric(v, op).unwrap_or_else(|| v.clone());
                        (k.clone(), combined)
                    })
                    .collect(),
            )),
            (Value::Map(left), Value::Map(right)) => {
                let mut fields = left.clone();
                for (key, r) in right {
                    let combined = match left.get(key) {
                        Some(l) => l.numeric(r, op).unwrap_or_else(|| l.clone()),
                        None => r.clone(),
                    };
                    fields.insert(key.clone(), combined);
                }
                Some(Value::Map(fields))
            }
            _ => None,
        }
    }

    fn compare(&self, other: &Value, op: fn(f64, f64) -> bool) -> Option<Value> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Some(Value::Bool(op(*a, *b))),
            _ => None,
        }
    }

    pub fn add(&self, other: &Value) -> Option<Value> {
        self.numeric(other, |a, b| Some(a + b))
    }

    pub fn sub(&self, other: &Value) -> Option<Value> {
        self.numeric(other, |a, b| Some(a - b))
    }

    pub fn mul(&self, other: &Value) -> Option<Value> {
        self.numeric(other, |a, b| Some(a * b))
    }

    /// Division; dividing by zero gives no value.
    pub fn div(&self, other: &Value) -> Option<Value> {
        self.numeric(other, |a, b| if b == 0.0 { None } else { Some(a / b) })
    }

    /// Euclidean modulo, so results share the divisor's sign convention.
    pub fn modulo(&self, other: &Value) -> Option<Value> {
        self.numeric(other, |a, b| {
            if b == 0.0 {
                None
            } else {
                Some(((a % b) + b) % b)
            }
        })
    }

    pub fn pow(&self, other: &Value) -> Option<Value> {
        self.numeric(other, |a, b| Some(a.powf(b)))
    }

    pub fn lt(&self, other: &Value) -> Option<Value> {
        self.compare(other, |a, b| a < b)
    }

    pub fn gt(&self, other: &Value) -> Option<Value> {
        self.compare(other, |a, b| a > b)
    }

    pub fn lte(&self, other: &Value) -> Option<Value> {
        self.compare(other, |a, b| a <= b)
    }

    pub fn gte(&self, other: &Value) -> Option<Value> {
        self.compare(other, |a, b| a >= b)
    }

    /// Numeric equality for numbers, string comparison otherwise.
    pub fn eq_value(&self, other: &Value) -> Option<Value> {
        let equal = match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            _ => self.to_string() == other.to_string(),
        };
        Some(Value::Bool(equal))
    }

    pub fn ne_value(&self, other: &Value) -> Option<Value> {
        match self.eq_value(other) {
            Some(Value::Bool(equal)) => Some(Value::Bool(!equal)),
            _ => None,
        }
    }
}

/// A binary operation on values.
pub type ValueOp = fn(&Value, &Value) -> Option<Value>;

impl Pattern<Value> {
    /// Combine with `other`, structure from the left.
    ///
    /// Where the operation has no result the left value is kept.
    pub fn op_left(self, other: Pattern<Value>, op: ValueOp) -> Pattern<Value> {
        let (weight, steps) = (self.weight(), self.steps());
        let curried = self.fmap(move |left: Value| {
            move |right: Value| op(&left, &right).unwrap_or_else(|| left.clone())
        });
        app_left(curried, other)
            .with_weight(weight)
            .with_steps(steps)
    }

    pub fn add(self, other: Pattern<Value>) -> Pattern<Value> {
        self.op_left(other, Value::add)
    }

    pub fn sub(self, other: Pattern<Value>) -> Pattern<Value> {
        self.op_left(other, Value::sub)
    }

    pub fn mul(self, other: Pattern<Value>) -> Pattern<Value> {
        self.op_left(other, Value::mul)
    }

    pub fn div(self, other: Pattern<Value>) -> Pattern<Value> {
        self.op_left(other, Value::div)
    }

    pub fn modulo(self, other: Pattern<Value>) -> Pattern<Value> {
        self.op_left(other, Value::modulo)
    }

    pub fn pow(self, other: Pattern<Value>) -> Pattern<Value> {
        self.op_left(other, Value::pow)
    }

    pub fn lt(self, other: Pattern<Value>) -> Pattern<Value> {
        self.op_left(other, Value::lt)
    }

    pub fn gt(self, other: Pattern<Value>) -> Pattern<Value> {
        self.op_left(other, Value::gt)
    }

    pub fn lte(self, other: Pattern<Value>) -> Pattern<Value> {
        self.op_left(other, Value::lte)
    }

    pub fn gte(self, other: Pattern<Value>) -> Pattern<Value> {
        self.op_left(other, Value::gte)
    }

    pub fn eq(self, other: Pattern<Value>) -> Pattern<Value> {
        self.op_left(other, Value::eq_value)
    }

    pub fn ne(self, other: Pattern<Value>) -> Pattern<Value> {
        self.op_left(other, Value::ne_value)
    }

    /// Scale numbers from `[0, 1]` to `[lo, hi]`; other values pass through.
    pub fn range_values(self, lo: f64, hi: f64) -> Pattern<Value> {
        self.fmap(move |v| match v {
            Value::Number(n) => Value::Number(lo + n * (hi - lo)),
            other => other,
        })
    }
}

const OPERATORS: &[(&str, &str, ValueOp)] = &[
    ("add", "+", Value::add),
    ("sub", "-", Value::sub),
    ("mul", "*", Value::mul),
    ("div", "/", Value::div),
    ("mod", "%", Value::modulo),
    ("pow", "**", Value::pow),
    ("lt", "<", Value::lt),
    ("gt", ">", Value::gt),
    ("lte", "<=", Value::lte),
    ("gte", ">=", Value::gte),
    ("eq", "==", Value::eq_value),
    ("ne", "!=", Value::ne_value),
];

pub(crate) fn register(reg: &mut RegistryBuilder) {
    // (add amount pat): the pattern comes last, so it owns the structure.
    for &(name, symbol, op) in OPERATORS {
        reg.register(name, move |args| {
            expect_args(name, args, 2)?;
            let amount = arg_pattern(name, &args[0])?;
            Ok(Value::Pattern(arg_pattern(name, &args[1])?.op_left(amount, op)))
        });
        reg.alias(symbol, name);
    }
    reg.register("range", |args| {
        expect_args("range", args, 3)?;
        let lo = arg_f64("range", &args[0])?;
        let hi = arg_f64("range", &args[1])?;
        Ok(Value::Pattern(arg_pattern("range", &args[2])?.range_values(lo, hi)))
    });
    reg.register("list", |args| Ok(Value::Seq(args.to_vec())));
    reg.register("dict", |args| {
        if args.len() % 2 != 0 {
            return Err(EvalError::type_error("dict", "expects key/value pairs"));
        }
        let fields = args
            .chunks(2)
            .map(|pair| (pair[0].to_string(), pair[1].clone()))
            .collect();
        Ok(Value::Map(fields))
    });
}
