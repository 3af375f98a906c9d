//! Process-wide registry of types that can be rebuilt from bytes.
//!
//! Every value or closure crossing a process boundary is written as a
//! registry key followed by its own bytes. The receiving side looks the key
//! up in its own registry to find the function able to rebuild the right
//! concrete type.
//!
//! # Identical program image
//!
//! Keys are derived from the full type name and the `TypeId` of the
//! concrete type, which are only stable within a single build of a program.
//! Mixing in the `TypeId` keeps apart distinct types that share a name, such
//! as two `Item`s declared inside different function bodies of one module. Type names, layouts and
//! field orders may change between builds. Workers of one cluster must all
//! run the exact same binary, otherwise keys can point to the wrong types or
//! to nothing at all.
//!
//! # Registration
//!
//! Entries are created on first use: the first time a value of some type is
//! serialized, or the first time a closure over some callable is created.
//! Within a single process this is enough, since the sending side always
//! registers before anything can be received. A process that receives a
//! type it never used itself needs the type registered upfront with
//! [`register`] or [`register_closure`] during startup.
//!
//! The registry is append-only. Registration may race between worker
//! threads, so the table is guarded by a single lock, taken for writing
//! only when a new entry is added.

use std::any::{type_name, TypeId};
use std::hash::{Hash, Hasher};
use std::sync::{PoisonError, RwLock};

use fnv::{FnvHashMap, FnvHasher};

use crate::closure::{self, Callable, Caller};
use crate::error::{Error, Result};
use crate::value::{self, Data, Value};
use crate::worker::Worker;

/// Registry id of a concrete type, valid only within one program image.
pub type TypeKey = u64;

/// Rebuilds a value from its bytes.
pub(crate) type LoadFn = fn(&[u8]) -> Result<Value>;
/// Invokes a callable against its captured arguments and an external one.
pub(crate) type CallerFn = fn(Value, Value, &mut Worker, Value) -> Value;

#[derive(Copy, Clone)]
enum Thunk {
    Load(LoadFn),
    Call(CallerFn),
}

struct Entry {
    name: &'static str,
    type_id: TypeId,
    thunk: Thunk,
}

impl Entry {
    fn check(&self, key: TypeKey, type_id: TypeId, name: &str) {
        if self.type_id != type_id {
            panic!(
                "registry key collision: {:#018x} used by both `{}` and `{}`",
                key, self.name, name
            );
        }
    }
}

/// Table mapping type keys to (de)serialization and invocation thunks.
pub struct Registry {
    entries: RwLock<FnvHashMap<TypeKey, Entry>>,
}

/// Returns the process-wide registry.
pub(crate) fn get() -> &'static Registry {
    lazy_static! {
        static ref REGISTRY: Registry = Registry {
            entries: RwLock::new(FnvHashMap::default()),
        };
    }
    &*REGISTRY
}

/// Computes the key for type `T`.
pub fn key_of<T: ?Sized + 'static>() -> TypeKey {
    let mut hasher = FnvHasher::default();
    hasher.write(type_name::<T>().as_bytes());
    TypeId::of::<T>().hash(&mut hasher);
    hasher.finish()
}

impl Registry {
    fn ensure<T: 'static>(&self, thunk: Thunk) -> TypeKey {
        let key = key_of::<T>();
        let type_id = TypeId::of::<T>();
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = entries.get(&key) {
                entry.check(key, type_id, type_name::<T>());
                return key;
            }
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.entry(key).or_insert_with(|| {
            trace!("registered `{}` as {:#018x}", type_name::<T>(), key);
            Entry {
                name: type_name::<T>(),
                type_id,
                thunk,
            }
        });
        entry.check(key, type_id, type_name::<T>());
        key
    }

    fn thunk(&self, key: TypeKey) -> Result<Thunk> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&key)
            .map(|entry| entry.thunk)
            .ok_or(Error::UnknownTypeKey(key))
    }

    pub(crate) fn load_fn(&self, key: TypeKey) -> Result<LoadFn> {
        match self.thunk(key)? {
            Thunk::Load(f) => Ok(f),
            Thunk::Call(_) => Err(Error::WrongEntryKind(key, "value")),
        }
    }

    pub(crate) fn caller_fn(&self, key: TypeKey) -> Result<CallerFn> {
        match self.thunk(key)? {
            Thunk::Call(f) => Ok(f),
            Thunk::Load(_) => Err(Error::WrongEntryKind(key, "closure")),
        }
    }

    /// Checks whether anything is registered under `key`.
    pub fn contains(&self, key: TypeKey) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.len()
    }
}

pub(crate) fn ensure_value<T: Data>() -> TypeKey {
    get().ensure::<T>(Thunk::Load(value::load_value::<T>))
}

pub(crate) fn ensure_caller<F, A>() -> TypeKey
where
    F: Callable<A>,
    A: Data,
{
    get().ensure::<Caller<F, A>>(Thunk::Call(closure::invoke::<F, A>))
}

/// Registers value type `T` so that it can be received before this process
/// ever serializes a value of that type itself.
pub fn register<T: Data>() -> TypeKey {
    ensure_value::<T>()
}

/// Registers everything needed to receive a closure over callable `F` with
/// captured arguments of type `A`.
pub fn register_closure<F, A>() -> TypeKey
where
    F: Callable<A>,
    A: Data,
{
    register::<F>();
    register::<A>();
    register::<F::Output>();
    ensure_caller::<F, A>()
}

/// Checks whether anything is registered under `key` in this process.
pub fn is_registered(key: TypeKey) -> bool {
    get().contains(key)
}
