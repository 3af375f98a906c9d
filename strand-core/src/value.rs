//! Type-erased value container.
//!
//! [`Value`] owns exactly one value of some concrete type. The type is
//! forgotten at compile time, but the value still knows how to clone and
//! serialize itself. Reading it back requires naming the exact type it was
//! created with.

use std::any::{type_name, Any};
use std::fmt;

use serde::de::{DeserializeOwned, Error as DeError};
use serde::ser::Error as SerError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::registry::{self, TypeKey};
use crate::Result;

/// Set of capabilities required from anything that goes into a [`Value`].
///
/// Implemented automatically for every type satisfying the bounds, so a type
/// that can't be serialized, cloned or sent is rejected at compile time.
pub trait Data: Serialize + DeserializeOwned + Clone + Send + 'static {}

impl<T> Data for T where T: Serialize + DeserializeOwned + Clone + Send + 'static {}

/// Capabilities of a boxed value after its concrete type is erased.
trait ErasedData: Send {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn type_name(&self) -> &'static str;
    fn clone_box(&self) -> Box<dyn ErasedData>;
    fn save(&self) -> Result<(TypeKey, Vec<u8>)>;
}

impl<T: Data> ErasedData for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn clone_box(&self) -> Box<dyn ErasedData> {
        Box::new(self.clone())
    }

    fn save(&self) -> Result<(TypeKey, Vec<u8>)> {
        let key = registry::ensure_value::<T>();
        Ok((key, bincode::serialize(self)?))
    }
}

/// Owned, type-erased slot holding a single value.
///
/// # Serialization
///
/// A serialized value is a pair of the registry key of the concrete type
/// and the bincode representation of the value itself. The key is looked up
/// in the process-wide registry on the receiving side to find the matching
/// deserializer. See [`registry`](../registry/index.html).
pub struct Value {
    inner: Box<dyn ErasedData>,
}

impl Value {
    /// Moves `value` into a new type-erased container.
    pub fn new<T: Data>(value: T) -> Self {
        Value {
            inner: Box::new(value),
        }
    }

    /// Creates a value holding `()`, used where no value is needed.
    pub fn unit() -> Self {
        Value::new(())
    }

    /// Name of the concrete type stored inside.
    pub fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }

    /// Checks whether the stored value is of type `T`.
    pub fn is<T: Data>(&self) -> bool {
        self.inner.as_any().is::<T>()
    }

    /// Returns a reference to the stored value.
    ///
    /// # Panics
    ///
    /// Panics if the value was not created with type `T`.
    pub fn get<T: Data>(&self) -> &T {
        match self.inner.as_any().downcast_ref::<T>() {
            Some(v) => v,
            None => mismatch::<T>(self.type_name()),
        }
    }

    /// Returns a mutable reference to the stored value.
    ///
    /// # Panics
    ///
    /// Panics if the value was not created with type `T`.
    pub fn get_mut<T: Data>(&mut self) -> &mut T {
        let stored = self.type_name();
        match self.inner.as_any_mut().downcast_mut::<T>() {
            Some(v) => v,
            None => mismatch::<T>(stored),
        }
    }

    /// Takes the stored value out of the container.
    ///
    /// # Panics
    ///
    /// Panics if the value was not created with type `T`.
    pub fn into_inner<T: Data>(self) -> T {
        let stored = self.type_name();
        match self.inner.into_any().downcast::<T>() {
            Ok(v) => *v,
            Err(_) => mismatch::<T>(stored),
        }
    }

    /// Serializes the stored value, registering its type on first use.
    pub(crate) fn save(&self) -> Result<(TypeKey, Vec<u8>)> {
        self.inner.save()
    }

    /// Reconstructs a value from the key and bytes produced by `save`.
    pub(crate) fn load(key: TypeKey, bytes: &[u8]) -> Result<Value> {
        let load = registry::get().load_fn(key)?;
        load(bytes)
    }
}

fn mismatch<T>(stored: &str) -> ! {
    panic!(
        "value holds `{}`, but was read as `{}`",
        stored,
        type_name::<T>()
    )
}

/// Deserializer thunk stored in the registry for every value type.
pub(crate) fn load_value<T: Data>(bytes: &[u8]) -> Result<Value> {
    let v: T = bincode::deserialize(bytes)?;
    Ok(Value::new(v))
}

impl Clone for Value {
    fn clone(&self) -> Self {
        Value {
            inner: self.inner.clone_box(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({})", self.type_name())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let (key, bytes) = self.save().map_err(S::Error::custom)?;
        (key, serde_bytes::Bytes::new(&bytes)).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let (key, bytes): (TypeKey, serde_bytes::ByteBuf) =
            Deserialize::deserialize(deserializer)?;
        Value::load(key, &bytes).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn read_back_as_constructed_type() {
        let mut v = Value::new(Point { x: 1, y: 2 });
        assert!(v.is::<Point>());
        assert!(!v.is::<i32>());
        assert_eq!(v.get::<Point>().x, 1);
        v.get_mut::<Point>().y = 5;
        assert_eq!(v.into_inner::<Point>(), Point { x: 1, y: 5 });
    }

    #[test]
    #[should_panic(expected = "was read as")]
    fn read_as_wrong_type_panics() {
        let v = Value::new(10u32);
        v.get::<i64>();
    }

    #[test]
    #[should_panic(expected = "was read as")]
    fn take_as_wrong_type_panics() {
        let v = Value::new(String::from("strand"));
        v.into_inner::<Vec<u8>>();
    }

    #[test]
    fn clone_is_deep() {
        let mut a = Value::new(vec![1, 2, 3]);
        let b = a.clone();
        a.get_mut::<Vec<i32>>().push(4);
        assert_eq!(b.get::<Vec<i32>>(), &vec![1, 2, 3]);
        assert_eq!(a.get::<Vec<i32>>().len(), 4);
    }

    #[test]
    fn survives_bincode() {
        let v = Value::new((String::from("abc"), vec![1u8, 2, 3]));
        let bytes = bincode::serialize(&v).unwrap();
        let back: Value = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.type_name(), v.type_name());
        assert_eq!(
            back.into_inner::<(String, Vec<u8>)>(),
            (String::from("abc"), vec![1, 2, 3])
        );
    }

    #[test]
    fn nested_values_survive_bincode() {
        let v = Value::new(vec![Value::new(1u64), Value::new(String::from("two"))]);
        let bytes = bincode::serialize(&v).unwrap();
        let mut back = bincode::deserialize::<Value>(&bytes)
            .unwrap()
            .into_inner::<Vec<Value>>();
        let second = back.pop().unwrap();
        let first = back.pop().unwrap();
        assert_eq!(*first.get::<u64>(), 1);
        assert_eq!(second.get::<String>(), "two");
    }

    #[test]
    fn unit_value() {
        let v = Value::unit();
        assert!(v.is::<()>());
        assert_eq!(format!("{:?}", v), "Value(())");
    }
}
