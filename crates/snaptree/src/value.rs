//! Leaf values, path steps and the input/output item types.

use std::fmt;

use indexmap::IndexMap;
use serde_json::{Number, Value};

use crate::view::View;

/// A leaf of the stored tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl Scalar {
    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Number(n) => Value::Number(n.clone()),
            Scalar::String(s) => Value::String(s.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Number(v.into())
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Number(v.into())
    }
}

impl From<u64> for Scalar {
    fn from(v: u64) -> Self {
        Scalar::Number(v.into())
    }
}

impl From<f64> for Scalar {
    /// Non-finite floats have no JSON representation and become `Null`.
    fn from(v: f64) -> Self {
        Number::from_f64(v).map_or(Scalar::Null, Scalar::Number)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::String(v.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::String(v)
    }
}

/// One step of a location inside the tree: a map key or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

impl PathStep {
    /// The step as a map key. Indices become their decimal form.
    pub fn to_key(&self) -> String {
        match self {
            PathStep::Key(k) => k.clone(),
            PathStep::Index(i) => i.to_string(),
        }
    }

    /// The step as a list index, if it is one or is a key in canonical
    /// decimal form (`"1"`, not `"01"` or `"+1"`).
    pub fn to_index(&self) -> Option<usize> {
        match self {
            PathStep::Key(k) => canonical_index(k),
            PathStep::Index(i) => Some(*i),
        }
    }
}

pub(crate) fn canonical_index(token: &str) -> Option<usize> {
    let canonical = token == "0" || (!token.starts_with('0') && token.bytes().all(|b| b.is_ascii_digit()));
    if !canonical {
        return None;
    }
    token.parse().ok()
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Key(k) => f.write_str(k),
            PathStep::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for PathStep {
    fn from(v: &str) -> Self {
        PathStep::Key(v.to_owned())
    }
}

impl From<String> for PathStep {
    fn from(v: String) -> Self {
        PathStep::Key(v)
    }
}

impl From<&String> for PathStep {
    fn from(v: &String) -> Self {
        PathStep::Key(v.clone())
    }
}

impl From<usize> for PathStep {
    fn from(v: usize) -> Self {
        PathStep::Index(v)
    }
}

impl From<&PathStep> for PathStep {
    fn from(v: &PathStep) -> Self {
        v.clone()
    }
}

/// An entry of a [`View`]: either a leaf or a nested view.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Scalar(Scalar),
    View(View),
}

impl Item {
    pub fn as_view(&self) -> Option<&View> {
        match self {
            Item::View(v) => Some(v),
            Item::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Item::Scalar(s) => Some(s),
            Item::View(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_scalar().and_then(Scalar::as_i64)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_str)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Item::Scalar(Scalar::Null))
    }

    /// Plain JSON for this entry, recursing into views.
    pub fn value(&self) -> Value {
        match self {
            Item::Scalar(s) => s.to_json(),
            Item::View(v) => v.value(),
        }
    }
}

/// Input accepted by every mutation: plain data that may embed views of the
/// store at any depth.
#[derive(Debug, Clone)]
pub enum Fragment {
    Scalar(Scalar),
    Map(IndexMap<String, Fragment>),
    List(Vec<Fragment>),
    View(View),
}

impl Fragment {
    pub fn map<K, V, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Fragment>,
    {
        Fragment::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn list<V, I>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Fragment>,
    {
        Fragment::List(items.into_iter().map(Into::into).collect())
    }

    pub fn null() -> Self {
        Fragment::Scalar(Scalar::Null)
    }
}

impl From<Value> for Fragment {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Fragment::Scalar(Scalar::Null),
            Value::Bool(b) => Fragment::Scalar(Scalar::Bool(b)),
            Value::Number(n) => Fragment::Scalar(Scalar::Number(n)),
            Value::String(s) => Fragment::Scalar(Scalar::String(s)),
            Value::Array(items) => Fragment::List(items.into_iter().map(Fragment::from).collect()),
            Value::Object(map) => Fragment::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Fragment::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&Value> for Fragment {
    fn from(v: &Value) -> Self {
        Fragment::from(v.clone())
    }
}

impl From<View> for Fragment {
    fn from(v: View) -> Self {
        Fragment::View(v)
    }
}

impl From<&View> for Fragment {
    fn from(v: &View) -> Self {
        Fragment::View(v.clone())
    }
}

impl From<Item> for Fragment {
    fn from(v: Item) -> Self {
        match v {
            Item::Scalar(s) => Fragment::Scalar(s),
            Item::View(v) => Fragment::View(v),
        }
    }
}

impl From<&Item> for Fragment {
    fn from(v: &Item) -> Self {
        Fragment::from(v.clone())
    }
}

impl From<Scalar> for Fragment {
    fn from(v: Scalar) -> Self {
        Fragment::Scalar(v)
    }
}

macro_rules! fragment_from_scalar {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Fragment {
                fn from(v: $t) -> Self {
                    Fragment::Scalar(Scalar::from(v))
                }
            }
        )*
    };
}

fragment_from_scalar!(bool, i32, i64, u64, f64, &str, String);
