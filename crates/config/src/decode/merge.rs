//! Decoding a source on top of a value that already holds data.
//!
//! [`Merging`] wraps a format's own deserializer and pairs it with the
//! serialized form of the current target (the base):
//! - struct fields named by the source are decoded over the matching base
//!   field, recursively; fields the source leaves out come from the base;
//! - map entries named by the source are decoded fresh and replace the base
//!   entry outright; other base entries are kept;
//! - every other value is replaced.
//!
//! Scalars go straight through the format's deserializer, so its own
//! coercions still apply (a plain YAML `12345` fills a `String` field as
//! `"12345"`). Keys the target drops through `deserialize_ignored_any` are
//! recorded as unknown, by dotted path.

use serde::de::{
    self, DeserializeSeed, Deserializer, EnumAccess, IntoDeserializer, MapAccess, SeqAccess,
    Visitor,
};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::fmt;

/// Unknown field paths seen during one decode, in source order.
pub(crate) type Unknown = RefCell<Vec<String>>;

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn key_deserializer<E: de::Error>(key: String) -> de::value::StringDeserializer<E> {
    key.into_deserializer()
}

/// A format deserializer paired with the base value it decodes over.
pub(crate) struct Merging<'a, D> {
    de: D,
    base: Option<Value>,
    path: String,
    unknown: &'a Unknown,
}

impl<'a, D> Merging<'a, D> {
    pub(crate) fn root(de: D, base: Value, unknown: &'a Unknown) -> Self {
        Self {
            de,
            base: Some(base),
            path: String::new(),
            unknown,
        }
    }

    fn split<V>(self, inner: V, merge_fields: bool) -> (D, Wrap<'a, V>) {
        let wrap = Wrap {
            inner,
            base: self.base,
            path: self.path,
            unknown: self.unknown,
            merge_fields,
        };
        (self.de, wrap)
    }
}

macro_rules! forward_plain {
    ($($method:ident)*) => {
        $(
            fn $method<V>(self, visitor: V) -> Result<V::Value, Self::Error>
            where
                V: Visitor<'de>,
            {
                self.de.$method(visitor)
            }
        )*
    };
}

impl<'de, D> Deserializer<'de> for Merging<'_, D>
where
    D: Deserializer<'de>,
{
    type Error = D::Error;

    forward_plain! {
        deserialize_bool deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_i128 deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64
        deserialize_u128 deserialize_f32 deserialize_f64 deserialize_char deserialize_str
        deserialize_string deserialize_bytes deserialize_byte_buf deserialize_unit
        deserialize_identifier
    }

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        let (de, wrap) = self.split(visitor, false);
        de.deserialize_any(wrap)
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        let (de, wrap) = self.split(visitor, false);
        de.deserialize_option(wrap)
    }

    fn deserialize_unit_struct<V>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.de.deserialize_unit_struct(name, visitor)
    }

    fn deserialize_newtype_struct<V>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        let (de, wrap) = self.split(visitor, false);
        de.deserialize_newtype_struct(name, wrap)
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        let (de, wrap) = self.split(visitor, false);
        de.deserialize_seq(wrap)
    }

    fn deserialize_tuple<V>(self, len: usize, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        let (de, wrap) = self.split(visitor, false);
        de.deserialize_tuple(len, wrap)
    }

    fn deserialize_tuple_struct<V>(
        self,
        name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        let (de, wrap) = self.split(visitor, false);
        de.deserialize_tuple_struct(name, len, wrap)
    }

    fn deserialize_map<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        let (de, wrap) = self.split(visitor, false);
        de.deserialize_map(wrap)
    }

    fn deserialize_struct<V>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        let (de, wrap) = self.split(visitor, true);
        de.deserialize_struct(name, fields, wrap)
    }

    fn deserialize_enum<V>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.de.deserialize_enum(name, variants, visitor)
    }

    fn deserialize_ignored_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        if !self.path.is_empty() {
            self.unknown.borrow_mut().push(self.path);
        }
        self.de.deserialize_ignored_any(visitor)
    }

    fn is_human_readable(&self) -> bool {
        self.de.is_human_readable()
    }
}

/// Visitor adapter that routes maps, sequences and options back through
/// [`Merging`].
struct Wrap<'a, V> {
    inner: V,
    base: Option<Value>,
    path: String,
    unknown: &'a Unknown,
    merge_fields: bool,
}

macro_rules! forward_visit {
    ($($method:ident($ty:ty))*) => {
        $(
            fn $method<E>(self, v: $ty) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                self.inner.$method(v)
            }
        )*
    };
}

impl<'de, V> Visitor<'de> for Wrap<'_, V>
where
    V: Visitor<'de>,
{
    type Value = V::Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.expecting(f)
    }

    forward_visit! {
        visit_bool(bool) visit_i8(i8) visit_i16(i16) visit_i32(i32) visit_i64(i64)
        visit_i128(i128) visit_u8(u8) visit_u16(u16) visit_u32(u32) visit_u64(u64)
        visit_u128(u128) visit_f32(f32) visit_f64(f64) visit_char(char)
        visit_str(&str) visit_string(String) visit_bytes(&[u8]) visit_byte_buf(Vec<u8>)
    }

    fn visit_borrowed_str<E>(self, v: &'de str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        self.inner.visit_borrowed_str(v)
    }

    fn visit_borrowed_bytes<E>(self, v: &'de [u8]) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        self.inner.visit_borrowed_bytes(v)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        self.inner.visit_none()
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        self.inner.visit_unit()
    }

    fn visit_some<D>(self, de: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        self.inner.visit_some(Merging {
            de,
            base: self.base.filter(|base| !base.is_null()),
            path: self.path,
            unknown: self.unknown,
        })
    }

    fn visit_newtype_struct<D>(self, de: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        self.inner.visit_newtype_struct(Merging {
            de,
            base: self.base,
            path: self.path,
            unknown: self.unknown,
        })
    }

    fn visit_seq<A>(self, seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        self.inner.visit_seq(FreshSeq {
            seq,
            index: 0,
            path: self.path,
            unknown: self.unknown,
        })
    }

    fn visit_map<A>(self, map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let base = match self.base {
            Some(Value::Object(base)) => base,
            _ => Map::new(),
        };
        self.inner.visit_map(MergeMap {
            source: Some(map),
            base,
            rest: None,
            pending: None,
            merge_fields: self.merge_fields,
            path: self.path,
            unknown: self.unknown,
        })
    }

    fn visit_enum<A>(self, data: A) -> Result<Self::Value, A::Error>
    where
        A: EnumAccess<'de>,
    {
        self.inner.visit_enum(data)
    }
}

/// Seed that decodes one value through [`Merging`].
struct MergeSeed<'a, S> {
    seed: S,
    base: Option<Value>,
    path: String,
    unknown: &'a Unknown,
}

impl<'de, S> DeserializeSeed<'de> for MergeSeed<'_, S>
where
    S: DeserializeSeed<'de>,
{
    type Value = S::Value;

    fn deserialize<D>(self, de: D) -> Result<S::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        self.seed.deserialize(Merging {
            de,
            base: self.base,
            path: self.path,
            unknown: self.unknown,
        })
    }
}

/// Sequence elements never merge; each is decoded fresh.
struct FreshSeq<'a, A> {
    seq: A,
    index: usize,
    path: String,
    unknown: &'a Unknown,
}

impl<'de, A> SeqAccess<'de> for FreshSeq<'_, A>
where
    A: SeqAccess<'de>,
{
    type Error = A::Error;

    fn next_element_seed<S>(&mut self, seed: S) -> Result<Option<S::Value>, A::Error>
    where
        S: DeserializeSeed<'de>,
    {
        let path = format!("{}[{}]", self.path, self.index);
        self.index += 1;
        self.seq.next_element_seed(MergeSeed {
            seed,
            base: None,
            path,
            unknown: self.unknown,
        })
    }

    fn size_hint(&self) -> Option<usize> {
        self.seq.size_hint()
    }
}

enum Pending {
    /// The next value comes from the source, over this base value.
    Source(String, Option<Value>),
    /// The next value is a base entry the source did not name.
    Base(Value),
}

/// Source entries first, then the base entries the source left out.
struct MergeMap<'a, A> {
    source: Option<A>,
    base: Map<String, Value>,
    rest: Option<serde_json::map::IntoIter>,
    pending: Option<Pending>,
    merge_fields: bool,
    path: String,
    unknown: &'a Unknown,
}

impl<'de, A> MapAccess<'de> for MergeMap<'_, A>
where
    A: MapAccess<'de>,
{
    type Error = A::Error;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>, A::Error>
    where
        K: DeserializeSeed<'de>,
    {
        if let Some(source) = self.source.as_mut() {
            if let Some(key) = source.next_key::<String>()? {
                let base = self.base.remove(&key);
                let decoded = seed.deserialize(key_deserializer::<A::Error>(key.clone()))?;
                self.pending = Some(Pending::Source(key, base));
                return Ok(Some(decoded));
            }
            self.source = None;
        }

        let base = &mut self.base;
        let rest = self
            .rest
            .get_or_insert_with(|| std::mem::take(base).into_iter());
        match rest.next() {
            Some((key, value)) => {
                let decoded = seed.deserialize(key_deserializer::<A::Error>(key))?;
                self.pending = Some(Pending::Base(value));
                Ok(Some(decoded))
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<S>(&mut self, seed: S) -> Result<S::Value, A::Error>
    where
        S: DeserializeSeed<'de>,
    {
        match self.pending.take() {
            Some(Pending::Base(value)) => seed.deserialize(value).map_err(de::Error::custom),
            Some(Pending::Source(key, base)) => {
                let source = self
                    .source
                    .as_mut()
                    .ok_or_else(|| <A::Error as de::Error>::custom("map source exhausted"))?;
                source.next_value_seed(MergeSeed {
                    seed,
                    base: if self.merge_fields { base } else { None },
                    path: join(&self.path, &key),
                    unknown: self.unknown,
                })
            }
            None => Err(de::Error::custom("map value requested before its key")),
        }
    }
}
