//! Parameter resolution
//!
//! Callers pass a heterogeneous list of [`Param`]s. [`ParamTable::resolve`]
//! flattens them into one lookup table addressed three ways:
//! - positional index (`"0"`, `"1"`, ...) for scalar and list arguments
//! - bare key for map arguments
//! - `Name.field` for struct arguments
//!
//! When two arguments define the same key, the later argument wins.

use crate::error::{Error, Result};
use crate::value::Value;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// How placeholder names may address parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Addressing {
    /// Positional indexes, map keys and `Struct.field` paths
    #[default]
    Named,
    /// Only positional indexes
    Positional,
}

/// One caller-supplied argument
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Param {
    Value(Value),
    Map(BTreeMap<String, Value>),
    Struct(StructParam),
}

/// A struct argument flattened into `(key, value)` pairs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructParam {
    pub name: String,
    pub fields: Vec<(String, Value)>,
}

macro_rules! impl_param_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Param {
            fn from(v: $t) -> Self {
                Param::Value(v.into())
            }
        })*
    };
}

impl_param_from!(
    Value, i8, i16, i32, i64, u8, u16, u32, u64, isize, usize, f32, f64, bool, &str, String,
    chrono::NaiveDateTime, chrono::NaiveDate
);

impl<Tz: chrono::TimeZone> From<chrono::DateTime<Tz>> for Param {
    fn from(v: chrono::DateTime<Tz>) -> Self {
        Param::Value(v.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        Param::Value(v.into())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Param {
    fn from(v: Vec<T>) -> Self {
        Param::Value(v.into())
    }
}

impl From<BTreeMap<String, Value>> for Param {
    fn from(m: BTreeMap<String, Value>) -> Self {
        Param::Map(m)
    }
}

impl From<StructParam> for Param {
    fn from(s: StructParam) -> Self {
        Param::Struct(s)
    }
}

impl Param {
    pub fn value(v: impl Into<Value>) -> Self {
        Param::Value(v.into())
    }

    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Param::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Flatten a bound struct through its cached [`Binding`]
    pub fn entity<T: Entity>(entity: &T) -> Self {
        let binding = binding_for::<T>();
        Param::Struct(StructParam {
            name: binding.name.clone(),
            fields: binding
                .fields
                .iter()
                .map(|f| (f.key.clone(), (f.get)(entity)))
                .collect(),
        })
    }

    /// Flatten any serializable struct under `name`.
    ///
    /// `#[serde(rename)]` acts as the binding tag and `#[serde(skip)]`
    /// excludes a field.
    pub fn record<T: Serialize>(name: impl Into<String>, record: &T) -> Result<Self> {
        let json = serde_json::to_value(record)
            .map_err(|e| Error::resolution(format!("cannot serialize record: {}", e)))?;
        match json {
            serde_json::Value::Object(obj) => Ok(Param::Struct(StructParam {
                name: name.into(),
                fields: obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            })),
            other => Err(Error::resolution(format!(
                "record must serialize to an object, got {}",
                other
            ))),
        }
    }

    /// JSON objects become maps, anything else a positional value
    pub fn json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Object(obj) => Param::Map(
                obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
            other => Param::Value(Value::from(other)),
        }
    }

    /// True when any value nested in this argument is a NaN or infinite float
    pub fn has_non_finite(&self) -> bool {
        match self {
            Param::Value(v) => v.has_non_finite(),
            Param::Map(m) => m.values().any(Value::has_non_finite),
            Param::Struct(s) => s.fields.iter().any(|(_, v)| v.has_non_finite()),
        }
    }

    /// JSON form used as the template engine's context
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Param::Value(v) => v.to_json(),
            Param::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Param::Struct(s) => serde_json::Value::Object(
                s.fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

/// Build a `Vec<Param>` from heterogeneous expressions
#[macro_export]
macro_rules! params {
    () => { ::std::vec::Vec::<$crate::Param>::new() };
    ($($p:expr),+ $(,)?) => { ::std::vec![$($crate::Param::from($p)),+] };
}

/// A type that can be bound as a struct parameter
///
/// ```
/// use dynsql::{Binding, Entity};
///
/// struct User { id: i64, name: String, password: String }
///
/// impl Entity for User {
///     fn bind(b: &mut Binding<Self>) {
///         b.field("id", |u| u.id)
///             .tagged("Name", "name", |u| u.name.clone())
///             .tagged("Password", "-", |u| u.password.clone());
///     }
/// }
/// ```
pub trait Entity: Sized + 'static {
    fn bind(binding: &mut Binding<Self>);
}

type Accessor<T> = Box<dyn Fn(&T) -> Value + Send + Sync>;

struct FieldBinding<T> {
    key: String,
    get: Accessor<T>,
}

/// Binding descriptor: logical struct name plus `key -> accessor` pairs
pub struct Binding<T> {
    name: String,
    fields: Vec<FieldBinding<T>>,
}

impl<T: 'static> Binding<T> {
    fn new() -> Self {
        let full = std::any::type_name::<T>();
        let base = full.split('<').next().unwrap_or(full);
        let name = base.rsplit("::").next().unwrap_or(base).to_string();
        Self {
            name,
            fields: Vec::new(),
        }
    }

    /// Override the logical struct name (defaults to the type name)
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    /// Bind a field under its own name
    pub fn field<V, F>(&mut self, name: &str, get: F) -> &mut Self
    where
        V: Into<Value>,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        self.tagged(name, "", get)
    }

    /// Bind a field under `tag`; an empty tag keeps the field name, `-` skips it
    pub fn tagged<V, F>(&mut self, name: &str, tag: &str, get: F) -> &mut Self
    where
        V: Into<Value>,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        if tag == "-" {
            return self;
        }
        let key = if tag.is_empty() { name } else { tag };
        self.fields.push(FieldBinding {
            key: key.to_string(),
            get: Box::new(move |t: &T| get(t).into()),
        });
        self
    }

    /// Bind every field of a nested entity under `prefix.key`
    pub fn nested<U, F>(&mut self, prefix: &str, get: F) -> &mut Self
    where
        U: Entity,
        F: Fn(&T) -> &U + Send + Sync + 'static,
    {
        let inner = binding_for::<U>();
        let get = Arc::new(get);
        for index in 0..inner.fields.len() {
            let inner = Arc::clone(&inner);
            let get = Arc::clone(&get);
            self.fields.push(FieldBinding {
                key: format!("{}.{}", prefix, inner.fields[index].key),
                get: Box::new(move |t: &T| (inner.fields[index].get)((*get)(t))),
            });
        }
        self
    }

    pub fn struct_name(&self) -> &str {
        &self.name
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.key.as_str())
    }
}

static BINDINGS: Lazy<Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Descriptor for `T`, built on first use and cached by type.
///
/// `T::bind` runs without the cache lock held, so it may look up the
/// bindings of nested entities.
pub fn binding_for<T: Entity>() -> Arc<Binding<T>> {
    let cached = BINDINGS
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .get(&TypeId::of::<T>())
        .cloned();

    let erased = match cached {
        Some(erased) => erased,
        None => {
            let mut binding = Binding::<T>::new();
            T::bind(&mut binding);
            let built: Arc<dyn Any + Send + Sync> = Arc::new(binding);
            let mut cache = BINDINGS.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(cache.entry(TypeId::of::<T>()).or_insert(built))
        }
    };

    match erased.downcast::<Binding<T>>() {
        Ok(binding) => binding,
        Err(_) => unreachable!("binding cache keyed by TypeId"),
    }
}

/// Flat lookup table built from a parameter list
#[derive(Debug, Clone, Default)]
pub struct ParamTable {
    entries: HashMap<String, Value>,
    positional: usize,
    addressing: Addressing,
}

impl ParamTable {
    pub fn resolve(params: &[Param], addressing: Addressing) -> Self {
        let mut entries = HashMap::new();

        for (index, param) in params.iter().enumerate() {
            match param {
                Param::Value(v) => {
                    entries.insert(index.to_string(), v.clone());
                }
                Param::Map(map) => {
                    for (k, v) in map {
                        entries.insert(k.clone(), v.clone());
                    }
                }
                Param::Struct(s) => {
                    for (k, v) in &s.fields {
                        entries.insert(format!("{}.{}", s.name, k), v.clone());
                    }
                }
            }
        }

        Self {
            entries,
            positional: params.len(),
            addressing,
        }
    }

    /// Look up a placeholder name
    pub fn lookup(&self, name: &str) -> Result<&Value> {
        if let Ok(index) = name.parse::<usize>() {
            if index >= self.positional {
                return Err(Error::resolution(format!(
                    "index {} out of range, {} parameter(s) supplied",
                    index, self.positional
                )));
            }
            return self.entries.get(name).ok_or_else(|| {
                Error::resolution(format!("parameter {} is not a scalar value", index))
            });
        }

        if self.addressing == Addressing::Positional {
            return Err(Error::ParamAddressing {
                name: name.to_string(),
            });
        }

        self.entries
            .get(name)
            .ok_or_else(|| Error::resolution(format!("no parameter named '{}'", name)))
    }

    /// Truthiness of a conditional reference; unknown names are false
    pub fn test(&self, name: &str) -> Result<bool> {
        match self.lookup(name) {
            Ok(v) => Ok(v.is_truthy()),
            Err(Error::ParamResolution { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Account {
        id: i64,
        secret: String,
    }

    impl Entity for Account {
        fn bind(b: &mut Binding<Self>) {
            b.field("id", |a| a.id).tagged("secret", "-", |a| a.secret.clone());
        }
    }

    #[test]
    fn binding_is_built_once_per_type() {
        let first = binding_for::<Account>();
        let second = binding_for::<Account>();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.struct_name(), "Account");
        assert_eq!(first.keys().collect::<Vec<_>>(), vec!["id"]);
    }

    struct Customer {
        id: i64,
    }

    impl Entity for Customer {
        fn bind(b: &mut Binding<Self>) {
            b.field("id", |c| c.id);
        }
    }

    struct Invoice {
        number: String,
        customer: Customer,
    }

    impl Entity for Invoice {
        fn bind(b: &mut Binding<Self>) {
            b.field("number", |i| i.number.clone())
                .nested("customer", |i: &Invoice| &i.customer);
        }
    }

    #[test]
    fn nested_entities_bind_through_the_cache() {
        let p = Param::entity(&Invoice {
            number: "A-1".into(),
            customer: Customer { id: 9 },
        });
        let table = ParamTable::resolve(&[p], Addressing::Named);
        assert_eq!(table.lookup("Invoice.number").unwrap(), &Value::from("A-1"));
        assert_eq!(table.lookup("Invoice.customer.id").unwrap(), &Value::Int(9));
        assert_eq!(
            binding_for::<Invoice>().keys().collect::<Vec<_>>(),
            vec!["number", "customer.id"]
        );
    }

    #[test]
    fn entity_fields_are_prefixed() {
        let p = Param::entity(&Account {
            id: 3,
            secret: "x".into(),
        });
        let table = ParamTable::resolve(&[p], Addressing::Named);
        assert_eq!(table.lookup("Account.id").unwrap(), &Value::Int(3));
        assert!(table.lookup("Account.secret").is_err());
    }
}
