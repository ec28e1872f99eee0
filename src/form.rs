//! Flattening payloads into `key → [values]` form fields, and back.
//!
//! Form bodies, route params and query strings all carry the same shape: a
//! set of named fields, each holding one or more strings. [`flatten`] turns any
//! `Serialize` payload into that shape; [`from_fields`] deserializes it back
//! into a typed value.
//!
//! Keys are kept sorted, so the same payload always encodes to the same bytes.

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::de::value::{MapDeserializer, SeqDeserializer};
use serde::de::{self, DeserializeOwned, IntoDeserializer, Unexpected, Visitor};
use serde::{Deserializer, Serialize, forward_to_deserialize_any};
use serde_json::Value;

use crate::error::{Error, Result};

// ── Fields ────────────────────────────────────────────────────────────────────

/// Named, multi-valued string fields.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Fields(BTreeMap<String, Vec<String>>);

impl Fields {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Adds one value under `key`, keeping any values already there.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    /// Replaces every value under `key`.
    pub fn insert(&mut self, key: impl Into<String>, values: Vec<String>) {
        self.0.insert(key.into(), values);
    }

    /// First value under `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.first().map(String::as_str)
    }

    /// All values under `key`; empty when the key is absent.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<String>> {
        self.0.iter()
    }

    /// Appends every value of `other`. Values of shared keys are concatenated.
    pub fn merge(&mut self, other: Fields) {
        for (key, values) in other.0 {
            self.0.entry(key).or_default().extend(values);
        }
    }

    /// `application/x-www-form-urlencoded` rendering. Multi-valued keys repeat.
    pub fn encode(&self) -> Result<String> {
        let pairs: Vec<(&str, &str)> = self
            .0
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
            .collect();
        serde_urlencoded::to_string(pairs).map_err(|e| Error::encoding("form", e))
    }

    /// Parses an `application/x-www-form-urlencoded` body or query string.
    pub fn parse(input: &[u8]) -> Result<Self> {
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_bytes(input).map_err(|e| Error::encoding("form", e))?;
        Ok(pairs.into_iter().collect())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.append(k, v);
        }
        fields
    }
}

impl IntoIterator for Fields {
    type Item = (String, Vec<String>);
    type IntoIter = btree_map::IntoIter<String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ── Flattening ────────────────────────────────────────────────────────────────

/// Result of a flattening pass that kept going past conversion failures.
#[derive(Debug, Default)]
pub struct Flattened {
    pub fields: Fields,
    /// One `TypeConversion` error per value that could not be stringified, in
    /// field order.
    pub errors: Vec<Error>,
}

impl Flattened {
    /// The fields, or the first conversion error if there was one.
    pub fn into_result(self) -> Result<Fields> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(self.fields),
        }
    }
}

/// Flattens `payload` into form fields.
///
/// Sequences become multi-valued fields, scalars single-valued ones. `null`
/// fields are skipped. Fails with the first `TypeConversion` error after every
/// field has been attempted.
pub fn flatten<T: Serialize + ?Sized>(payload: &T) -> Result<Fields> {
    flatten_lossy(payload)?.into_result()
}

/// Like [`flatten`], but hands back whatever converted alongside the errors.
///
/// Only a serializer failure, or a payload that is not a struct or map, aborts.
pub fn flatten_lossy<T: Serialize + ?Sized>(payload: &T) -> Result<Flattened> {
    let value = serde_json::to_value(payload).map_err(|e| Error::encoding("form", e))?;
    let map = match value {
        Value::Null => return Ok(Flattened::default()),
        Value::Object(map) => map,
        other => {
            return Err(Error::TypeConversion {
                field: String::new(),
                reason: format!("expected a struct or map payload, got {}", kind(&other)),
            });
        }
    };

    let mut out = Flattened::default();
    for (key, value) in map {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    match stringify(item) {
                        Some(s) => values.push(s),
                        None => out.errors.push(Error::TypeConversion {
                            field: format!("{key}[{i}]"),
                            reason: format!("{} is not a scalar", kind(item)),
                        }),
                    }
                }
                out.fields.insert(key, values);
            }
            scalar => match stringify(&scalar) {
                Some(s) => out.fields.insert(key, vec![s]),
                None => out.errors.push(Error::TypeConversion {
                    reason: format!("{} is not a scalar", kind(&scalar)),
                    field: key,
                }),
            },
        }
    }
    Ok(out)
}

fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "map",
    }
}

// ── Typed decoding ────────────────────────────────────────────────────────────

/// Deserializes form fields into `T`.
///
/// A field with one value reads as a scalar or a one-element sequence,
/// whichever `T` asks for. Numbers and booleans are parsed from their string
/// form.
///
/// An empty list encodes to no pairs at all, so it comes back as a missing
/// field. Mark list fields `#[serde(default)]` when they may be empty.
pub fn from_fields<T: DeserializeOwned>(fields: Fields) -> Result<T> {
    let de = MapDeserializer::<_, de::value::Error>::new(
        fields.into_iter().map(|(key, values)| (key, Values(values))),
    );
    T::deserialize(de).map_err(|e| Error::encoding("form", e))
}

struct Values(Vec<String>);

impl Values {
    fn first(&self) -> std::result::Result<&str, de::value::Error> {
        self.0
            .first()
            .map(String::as_str)
            .ok_or_else(|| de::Error::custom("field has no value"))
    }

    fn take_first(self) -> std::result::Result<String, de::value::Error> {
        self.0
            .into_iter()
            .next()
            .ok_or_else(|| de::Error::custom("field has no value"))
    }
}

impl<'de> IntoDeserializer<'de, de::value::Error> for Values {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

macro_rules! parse_first {
    ($($method:ident => $visit:ident,)*) => {$(
        fn $method<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
            let raw = self.first()?;
            let parsed = raw
                .parse()
                .map_err(|_| {
                    <de::value::Error as de::Error>::invalid_value(Unexpected::Str(raw), &visitor)
                })?;
            visitor.$visit(parsed)
        }
    )*};
}

impl<'de> Deserializer<'de> for Values {
    type Error = de::value::Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        if self.0.len() == 1 {
            visitor.visit_string(self.take_first()?)
        } else {
            self.deserialize_seq(visitor)
        }
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        visitor.visit_seq(SeqDeserializer::<_, de::value::Error>::new(self.0.into_iter()))
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> std::result::Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        if self.0.is_empty() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        visitor.visit_string(self.take_first()?)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        visitor.visit_string(self.take_first()?)
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> std::result::Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> std::result::Result<V::Value, Self::Error> {
        let variant: String = self.take_first()?;
        visitor.visit_enum(<String as IntoDeserializer<'de, de::value::Error>>::into_deserializer(variant))
    }

    parse_first! {
        deserialize_bool => visit_bool,
        deserialize_i8   => visit_i8,
        deserialize_i16  => visit_i16,
        deserialize_i32  => visit_i32,
        deserialize_i64  => visit_i64,
        deserialize_u8   => visit_u8,
        deserialize_u16  => visit_u16,
        deserialize_u32  => visit_u32,
        deserialize_u64  => visit_u64,
        deserialize_f32  => visit_f32,
        deserialize_f64  => visit_f64,
        deserialize_char => visit_char,
    }

    forward_to_deserialize_any! {
        bytes byte_buf unit_struct tuple_struct map struct identifier ignored_any
    }
}
