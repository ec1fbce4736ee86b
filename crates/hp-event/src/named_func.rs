//! Named per-event functions.
//!
//! A [`NamedFunc`] is the common currency for cuts, weights and plotted
//! variables. It evaluates to either one scalar or a vector with one entry per
//! object, and its type tag is fixed when it is built. Combining a scalar with
//! a vector broadcasts the scalar over every position; combining two vectors
//! works position by position over the shorter of the two.
//!
//! ```
//! use hp_event::{MapEvent, NamedFunc, Value};
//!
//! let ht = NamedFunc::scalar_field("ht");
//! let pt = NamedFunc::vector_field("jets_pt");
//! let cut = ht.greater(500.0).and(pt.greater(30.0));
//!
//! let ev = MapEvent::new().with_scalar("ht", 700.0).with_vector("jets_pt", vec![45.0, 20.0]);
//! assert_eq!(cut.eval(&ev).unwrap(), Value::Vector(vec![1.0, 0.0]));
//! assert_eq!(cut.name(), "(ht>500)&&(jets_pt>30)");
//! assert_eq!(cut.plain_name(), "ht_GTR_500_AND_jets_pt_GTR_30");
//! ```

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Not, Rem, Sub};
use std::sync::Arc;

use hp_core::{Error, Result};

use crate::event::{Event, FieldKind, Schema};

/// Scalar-valued event closure.
pub type ScalarFn = dyn Fn(&dyn Event) -> Result<f64> + Send + Sync;

/// Vector-valued event closure.
pub type VectorFn = dyn Fn(&dyn Event) -> Result<Vec<f64>> + Send + Sync;

/// Result of evaluating a [`NamedFunc`] on one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Single value.
    Scalar(f64),
    /// One value per object.
    Vector(Vec<f64>),
}

impl Value {
    /// Length of a vector value, `None` for scalars.
    pub fn vector_len(&self) -> Option<usize> {
        match self {
            Value::Scalar(_) => None,
            Value::Vector(v) => Some(v.len()),
        }
    }

    /// Value at position `i`; scalars broadcast to every position.
    pub fn at(&self, i: usize) -> f64 {
        match self {
            Value::Scalar(x) => *x,
            Value::Vector(v) => v[i],
        }
    }

    /// Whether the value selects anything: a nonzero scalar, or a vector with
    /// at least one nonzero entry.
    pub fn passes(&self) -> bool {
        match self {
            Value::Scalar(x) => *x != 0.0,
            Value::Vector(v) => v.iter().any(|x| *x != 0.0),
        }
    }

    /// Type tag of the value.
    pub fn kind(&self) -> FieldKind {
        match self {
            Value::Scalar(_) => FieldKind::Scalar,
            Value::Vector(_) => FieldKind::Vector,
        }
    }
}

#[derive(Clone)]
enum Repr {
    Constant(f64),
    ScalarField(Arc<str>),
    VectorField(Arc<str>),
    Scalar(Arc<ScalarFn>),
    Vector(Arc<VectorFn>),
}

/// A named, lazily evaluated function of one event.
///
/// Cloning is cheap: closures are reference counted and never copied.
#[derive(Clone)]
pub struct NamedFunc {
    name: String,
    composite: bool,
    repr: Repr,
}

impl fmt::Debug for NamedFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedFunc").field("name", &self.name).field("kind", &self.kind()).finish()
    }
}

impl fmt::Display for NamedFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl NamedFunc {
    /// Constant scalar. Named after its value.
    pub fn constant(value: f64) -> Self {
        Self { name: format_number(value), composite: false, repr: Repr::Constant(value) }
    }

    /// Reference to a scalar event field.
    pub fn scalar_field(name: impl Into<String>) -> Self {
        let name = name.into();
        Self { repr: Repr::ScalarField(Arc::from(name.as_str())), name, composite: false }
    }

    /// Reference to a vector event field.
    pub fn vector_field(name: impl Into<String>) -> Self {
        let name = name.into();
        Self { repr: Repr::VectorField(Arc::from(name.as_str())), name, composite: false }
    }

    /// Reference to field `name` with the kind recorded in `schema`.
    pub fn field(name: &str, schema: &Schema) -> Result<Self> {
        match schema.kind(name) {
            Some(FieldKind::Scalar) => Ok(Self::scalar_field(name)),
            Some(FieldKind::Vector) => Ok(Self::vector_field(name)),
            None => Err(Error::Expression(format!("unknown field '{name}'"))),
        }
    }

    /// Scalar function backed by a closure. Closures have no textual form, so
    /// the name is mandatory.
    pub fn scalar_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&dyn Event) -> Result<f64> + Send + Sync + 'static,
    {
        Self { name: name.into(), composite: false, repr: Repr::Scalar(Arc::new(f)) }
    }

    /// Vector function backed by a closure.
    pub fn vector_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&dyn Event) -> Result<Vec<f64>> + Send + Sync + 'static,
    {
        Self { name: name.into(), composite: false, repr: Repr::Vector(Arc::new(f)) }
    }

    /// Same function under a different name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self.composite = false;
        self
    }

    /// Display name (the expression text for parsed and combined functions).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical, file-name-safe form of [`name`](Self::name).
    pub fn plain_name(&self) -> String {
        canonical_name(&self.name)
    }

    /// Type tag.
    pub fn kind(&self) -> FieldKind {
        match self.repr {
            Repr::Constant(_) | Repr::ScalarField(_) | Repr::Scalar(_) => FieldKind::Scalar,
            Repr::VectorField(_) | Repr::Vector(_) => FieldKind::Vector,
        }
    }

    /// Whether the function is scalar valued.
    pub fn is_scalar(&self) -> bool {
        self.kind() == FieldKind::Scalar
    }

    /// Whether the function is vector valued.
    pub fn is_vector(&self) -> bool {
        self.kind() == FieldKind::Vector
    }

    /// The constant value, if this is a constant.
    pub fn as_constant(&self) -> Option<f64> {
        match self.repr {
            Repr::Constant(v) => Some(v),
            _ => None,
        }
    }

    /// Evaluate a scalar function. Errors if the function is vector valued.
    pub fn get_scalar(&self, ev: &dyn Event) -> Result<f64> {
        match &self.repr {
            Repr::Constant(v) => Ok(*v),
            Repr::ScalarField(n) => ev.scalar(n).ok_or_else(|| missing_field(n, FieldKind::Scalar)),
            Repr::Scalar(f) => f(ev),
            Repr::VectorField(_) | Repr::Vector(_) => Err(Error::Expression(format!(
                "'{}' is vector valued and has no scalar value",
                self.name
            ))),
        }
    }

    /// Evaluate a vector function. Errors if the function is scalar valued.
    pub fn get_vector(&self, ev: &dyn Event) -> Result<Vec<f64>> {
        match &self.repr {
            Repr::VectorField(n) => ev
                .vector(n)
                .map(|v| v.to_vec())
                .ok_or_else(|| missing_field(n, FieldKind::Vector)),
            Repr::Vector(f) => f(ev),
            Repr::Constant(_) | Repr::ScalarField(_) | Repr::Scalar(_) => Err(Error::Expression(
                format!("'{}' is scalar valued and has no vector value", self.name),
            )),
        }
    }

    /// Evaluate according to the type tag.
    pub fn eval(&self, ev: &dyn Event) -> Result<Value> {
        match self.kind() {
            FieldKind::Scalar => self.get_scalar(ev).map(Value::Scalar),
            FieldKind::Vector => self.get_vector(ev).map(Value::Vector),
        }
    }

    /// Logical AND. Scalar operands short-circuit: `rhs` is not evaluated when
    /// `self` is false.
    pub fn and(&self, rhs: impl Into<NamedFunc>) -> NamedFunc {
        binary(self.clone(), rhs.into(), BinaryOp::And)
    }

    /// Logical OR. Scalar operands short-circuit: `rhs` is not evaluated when
    /// `self` is true.
    pub fn or(&self, rhs: impl Into<NamedFunc>) -> NamedFunc {
        binary(self.clone(), rhs.into(), BinaryOp::Or)
    }

    /// `self == rhs` as 1/0.
    pub fn equal(&self, rhs: impl Into<NamedFunc>) -> NamedFunc {
        binary(self.clone(), rhs.into(), BinaryOp::Eq)
    }

    /// `self != rhs` as 1/0.
    pub fn not_equal(&self, rhs: impl Into<NamedFunc>) -> NamedFunc {
        binary(self.clone(), rhs.into(), BinaryOp::Ne)
    }

    /// `self < rhs` as 1/0.
    pub fn less(&self, rhs: impl Into<NamedFunc>) -> NamedFunc {
        binary(self.clone(), rhs.into(), BinaryOp::Lt)
    }

    /// `self <= rhs` as 1/0.
    pub fn less_equal(&self, rhs: impl Into<NamedFunc>) -> NamedFunc {
        binary(self.clone(), rhs.into(), BinaryOp::Le)
    }

    /// `self > rhs` as 1/0.
    pub fn greater(&self, rhs: impl Into<NamedFunc>) -> NamedFunc {
        binary(self.clone(), rhs.into(), BinaryOp::Gt)
    }

    /// `self >= rhs` as 1/0.
    pub fn greater_equal(&self, rhs: impl Into<NamedFunc>) -> NamedFunc {
        binary(self.clone(), rhs.into(), BinaryOp::Ge)
    }

    /// `pow(self, rhs)`.
    pub fn pow(&self, rhs: impl Into<NamedFunc>) -> NamedFunc {
        binary(self.clone(), rhs.into(), BinaryOp::Pow)
    }

    /// `min(self, rhs)`.
    pub fn min(&self, rhs: impl Into<NamedFunc>) -> NamedFunc {
        binary(self.clone(), rhs.into(), BinaryOp::Min)
    }

    /// `max(self, rhs)`.
    pub fn max(&self, rhs: impl Into<NamedFunc>) -> NamedFunc {
        binary(self.clone(), rhs.into(), BinaryOp::Max)
    }

    /// `abs(self)`.
    pub fn abs(&self) -> NamedFunc {
        unary(self.clone(), UnaryOp::Abs)
    }

    /// `sqrt(self)`.
    pub fn sqrt(&self) -> NamedFunc {
        unary(self.clone(), UnaryOp::Sqrt)
    }

    /// Natural logarithm.
    pub fn ln(&self) -> NamedFunc {
        unary(self.clone(), UnaryOp::Log)
    }

    /// `exp(self)`.
    pub fn exp(&self) -> NamedFunc {
        unary(self.clone(), UnaryOp::Exp)
    }

    /// Element `index` of a vector function, as a scalar.
    ///
    /// Errors at construction if `self` is scalar or `index` is vector valued;
    /// an index outside the event's vector is an evaluation error.
    pub fn at(&self, index: impl Into<NamedFunc>) -> Result<NamedFunc> {
        let index = index.into();
        if !self.is_vector() {
            return Err(Error::Expression(format!("cannot subscript scalar '{}'", self.name)));
        }
        if !index.is_scalar() {
            return Err(Error::Expression(format!(
                "subscript of '{}' must be scalar, got vector '{}'",
                self.name, index.name
            )));
        }
        let name = format!("{}[{}]", self.name, index.name);
        let base = self.clone();
        let label = name.clone();
        let f = move |ev: &dyn Event| -> Result<f64> {
            let idx = index.get_scalar(ev)?;
            let values = base.get_vector(ev)?;
            if idx < 0.0 || idx.fract() != 0.0 || idx as usize >= values.len() {
                return Err(Error::Expression(format!(
                    "index {idx} out of range in '{label}' (size {})",
                    values.len()
                )));
            }
            Ok(values[idx as usize])
        };
        Ok(Self { name, composite: false, repr: Repr::Scalar(Arc::new(f)) })
    }
}

impl From<f64> for NamedFunc {
    fn from(value: f64) -> Self {
        NamedFunc::constant(value)
    }
}

impl From<i32> for NamedFunc {
    fn from(value: i32) -> Self {
        NamedFunc::constant(f64::from(value))
    }
}

impl From<&NamedFunc> for NamedFunc {
    fn from(value: &NamedFunc) -> Self {
        value.clone()
    }
}

/// Canonicalize expression text into a file-name-safe token.
///
/// Spaces and grouping parentheses are removed, operators and subscript
/// brackets become mnemonic words, and any other character that is not
/// alphanumeric or `_` is dropped.
pub fn canonical_name(text: &str) -> String {
    const TWO: [(&str, &str); 6] = [
        ("&&", "_AND_"),
        ("||", "_OR_"),
        ("==", "_EQL_"),
        ("!=", "_NEQ_"),
        ("<=", "_LEQ_"),
        (">=", "_GEQ_"),
    ];
    let mut out = String::with_capacity(text.len() * 2);
    let mut rest = text;
    'outer: while let Some(c) = rest.chars().next() {
        for (op, word) in TWO {
            if let Some(tail) = rest.strip_prefix(op) {
                out.push_str(word);
                rest = tail;
                continue 'outer;
            }
        }
        match c {
            '.' => out.push('p'),
            '[' => out.push_str("OB"),
            ']' => out.push_str("CB"),
            '+' => out.push_str("_PLS_"),
            '-' => out.push_str("_MNS_"),
            '*' => out.push_str("_TMS_"),
            '/' => out.push_str("_DIV_"),
            '%' => out.push_str("_MOD_"),
            '!' => out.push_str("NOT_"),
            '>' => out.push_str("_GTR_"),
            '<' => out.push_str("_LES_"),
            ',' => out.push('_'),
            c if c.is_ascii_alphanumeric() || c == '_' => out.push(c),
            _ => {}
        }
        rest = &rest[c.len_utf8()..];
    }
    let mut squashed = String::with_capacity(out.len());
    for c in out.chars() {
        if c == '_' && squashed.ends_with('_') {
            continue;
        }
        squashed.push(c);
    }
    squashed.trim_matches('_').to_string()
}

fn format_number(v: f64) -> String {
    format!("{v}")
}

fn missing_field(name: &str, kind: FieldKind) -> Error {
    let kind = match kind {
        FieldKind::Scalar => "scalar",
        FieldKind::Vector => "vector",
    };
    Error::Expression(format!("{kind} field '{name}' is not available in this event source"))
}

#[inline]
fn flag(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Pow,
    Min,
    Max,
}

impl BinaryOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Rem => a % b,
            BinaryOp::Eq => flag(a == b),
            BinaryOp::Ne => flag(a != b),
            BinaryOp::Lt => flag(a < b),
            BinaryOp::Le => flag(a <= b),
            BinaryOp::Gt => flag(a > b),
            BinaryOp::Ge => flag(a >= b),
            BinaryOp::And => flag(a != 0.0 && b != 0.0),
            BinaryOp::Or => flag(a != 0.0 || b != 0.0),
            BinaryOp::Pow => a.powf(b),
            BinaryOp::Min => a.min(b),
            BinaryOp::Max => a.max(b),
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Pow => "pow",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
        }
    }

    fn is_call(self) -> bool {
        matches!(self, BinaryOp::Pow | BinaryOp::Min | BinaryOp::Max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Not,
    Abs,
    Sqrt,
    Log,
    Exp,
}

impl UnaryOp {
    fn apply(self, a: f64) -> f64 {
        match self {
            UnaryOp::Neg => -a,
            UnaryOp::Not => flag(a == 0.0),
            UnaryOp::Abs => a.abs(),
            UnaryOp::Sqrt => a.sqrt(),
            UnaryOp::Log => a.ln(),
            UnaryOp::Exp => a.exp(),
        }
    }
}

fn wrapped(f: &NamedFunc) -> String {
    if f.composite { format!("({})", f.name) } else { f.name.clone() }
}

pub(crate) fn binary(lhs: NamedFunc, rhs: NamedFunc, op: BinaryOp) -> NamedFunc {
    let (name, composite) = if op.is_call() {
        (format!("{}({},{})", op.symbol(), lhs.name, rhs.name), false)
    } else {
        (format!("{}{}{}", wrapped(&lhs), op.symbol(), wrapped(&rhs)), true)
    };

    if let (Some(a), Some(b)) = (lhs.as_constant(), rhs.as_constant()) {
        return NamedFunc { name, composite, repr: Repr::Constant(op.apply(a, b)) };
    }

    let repr = match (lhs.kind(), rhs.kind()) {
        (FieldKind::Scalar, FieldKind::Scalar) => {
            let f: Arc<ScalarFn> = match op {
                BinaryOp::And => Arc::new(move |ev: &dyn Event| {
                    if lhs.get_scalar(ev)? == 0.0 {
                        return Ok(0.0);
                    }
                    Ok(flag(rhs.get_scalar(ev)? != 0.0))
                }),
                BinaryOp::Or => Arc::new(move |ev: &dyn Event| {
                    if lhs.get_scalar(ev)? != 0.0 {
                        return Ok(1.0);
                    }
                    Ok(flag(rhs.get_scalar(ev)? != 0.0))
                }),
                _ => Arc::new(move |ev: &dyn Event| {
                    Ok(op.apply(lhs.get_scalar(ev)?, rhs.get_scalar(ev)?))
                }),
            };
            Repr::Scalar(f)
        }
        _ => {
            let f: Arc<VectorFn> = Arc::new(move |ev: &dyn Event| {
                let a = lhs.eval(ev)?;
                let b = rhs.eval(ev)?;
                Ok(combine_values(&a, &b, |x, y| op.apply(x, y)))
            });
            Repr::Vector(f)
        }
    };
    NamedFunc { name, composite, repr }
}

pub(crate) fn unary(arg: NamedFunc, op: UnaryOp) -> NamedFunc {
    let (name, composite) = match op {
        UnaryOp::Neg => (format!("-{}", wrapped(&arg)), true),
        UnaryOp::Not => (format!("!{}", wrapped(&arg)), true),
        UnaryOp::Abs => (format!("abs({})", arg.name), false),
        UnaryOp::Sqrt => (format!("sqrt({})", arg.name), false),
        UnaryOp::Log => (format!("log({})", arg.name), false),
        UnaryOp::Exp => (format!("exp({})", arg.name), false),
    };
    if let Some(a) = arg.as_constant() {
        let value = op.apply(a);
        // Keep literal names like "-3" readable.
        let name = if op == UnaryOp::Neg { format_number(value) } else { name };
        return NamedFunc { name, composite: false, repr: Repr::Constant(value) };
    }
    let repr = match arg.kind() {
        FieldKind::Scalar => {
            Repr::Scalar(Arc::new(move |ev: &dyn Event| Ok(op.apply(arg.get_scalar(ev)?))))
        }
        FieldKind::Vector => Repr::Vector(Arc::new(move |ev: &dyn Event| {
            Ok(arg.get_vector(ev)?.into_iter().map(|x| op.apply(x)).collect())
        })),
    };
    NamedFunc { name, composite, repr }
}

/// Elementwise combination with scalar broadcasting. Two vectors combine over
/// the length of the shorter one.
pub fn combine_values(a: &Value, b: &Value, f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    match (a, b) {
        (Value::Scalar(x), Value::Scalar(y)) => vec![f(*x, *y)],
        (Value::Scalar(x), Value::Vector(v)) => v.iter().map(|y| f(*x, *y)).collect(),
        (Value::Vector(v), Value::Scalar(y)) => v.iter().map(|x| f(*x, *y)).collect(),
        (Value::Vector(u), Value::Vector(v)) => u.iter().zip(v).map(|(x, y)| f(*x, *y)).collect(),
    }
}

macro_rules! impl_arith {
    ($tr:ident, $method:ident, $op:expr) => {
        impl<R: Into<NamedFunc>> $tr<R> for NamedFunc {
            type Output = NamedFunc;

            fn $method(self, rhs: R) -> NamedFunc {
                binary(self, rhs.into(), $op)
            }
        }

        impl<R: Into<NamedFunc>> $tr<R> for &NamedFunc {
            type Output = NamedFunc;

            fn $method(self, rhs: R) -> NamedFunc {
                binary(self.clone(), rhs.into(), $op)
            }
        }
    };
}

impl_arith!(Add, add, BinaryOp::Add);
impl_arith!(Sub, sub, BinaryOp::Sub);
impl_arith!(Mul, mul, BinaryOp::Mul);
impl_arith!(Div, div, BinaryOp::Div);
impl_arith!(Rem, rem, BinaryOp::Rem);

impl Neg for NamedFunc {
    type Output = NamedFunc;

    fn neg(self) -> NamedFunc {
        unary(self, UnaryOp::Neg)
    }
}

impl Neg for &NamedFunc {
    type Output = NamedFunc;

    fn neg(self) -> NamedFunc {
        unary(self.clone(), UnaryOp::Neg)
    }
}

impl Not for NamedFunc {
    type Output = NamedFunc;

    fn not(self) -> NamedFunc {
        unary(self, UnaryOp::Not)
    }
}

impl Not for &NamedFunc {
    type Output = NamedFunc;

    fn not(self) -> NamedFunc {
        unary(self.clone(), UnaryOp::Not)
    }
}
