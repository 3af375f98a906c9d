//! Serializable units of work.
//!
//! A [`Closure`] pairs the code to run, a [`Callable`], with the arguments
//! it captured when it was created. Both halves are kept as type-erased
//! [`Value`]s, together with a caller thunk specialized for the concrete
//! callable type. This is what allows a closure to be sent to another worker
//! and invoked there without the receiving side knowing its type upfront.

use std::fmt;
use std::marker::PhantomData;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::registry::{self, CallerFn, TypeKey};
use crate::value::{Data, Value};
use crate::worker::Worker;

/// Code half of a [`Closure`].
///
/// Implemented by named, serializable types. The callable is consumed when
/// invoked, together with the captured arguments, since every closure runs
/// at most once.
///
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Scale;
///
/// impl Callable<Vec<i64>> for Scale {
///     type Output = Vec<i64>;
///     fn call(self, _: &mut Worker, captured: Vec<i64>, arg: Value) -> Vec<i64> {
///         let by = *arg.get::<i64>();
///         captured.into_iter().map(|v| v * by).collect()
///     }
/// }
/// ```
pub trait Callable<A: Data>: Data {
    type Output: Data;

    fn call(self, worker: &mut Worker, captured: A, arg: Value) -> Self::Output;
}

/// Marker type naming the registry entry of the caller for `F` over `A`.
pub(crate) struct Caller<F, A>(PhantomData<(F, A)>);

/// Caller thunk, monomorphized for every callable and argument type pair.
pub(crate) fn invoke<F, A>(f: Value, captured: Value, worker: &mut Worker, arg: Value) -> Value
where
    F: Callable<A>,
    A: Data,
{
    let f = f.into_inner::<F>();
    Value::new(f.call(worker, captured.into_inner::<A>(), arg))
}

/// Transmissible unit of work.
///
/// The default closure is the null sentinel: it holds no callable and
/// represents "no task".
#[derive(Clone)]
pub struct Closure {
    f: Value,
    captured: Value,
    caller: Option<(TypeKey, CallerFn)>,
}

impl Closure {
    /// Creates a new closure from a callable and its captured arguments.
    pub fn new<F, A>(f: F, captured: A) -> Closure
    where
        F: Callable<A>,
        A: Data,
    {
        let key = registry::ensure_caller::<F, A>();
        Closure {
            f: Value::new(f),
            captured: Value::new(captured),
            caller: Some((key, invoke::<F, A> as CallerFn)),
        }
    }

    /// Returns the null sentinel.
    pub fn null() -> Closure {
        Closure {
            f: Value::unit(),
            captured: Value::unit(),
            caller: None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.caller.is_none()
    }

    /// Name of the concrete callable type.
    pub fn callable_name(&self) -> &'static str {
        self.f.type_name()
    }

    /// Invokes the closure without an external argument.
    pub fn call(self, worker: &mut Worker) -> Value {
        self.call_with(worker, Value::unit())
    }

    /// Invokes the closure with a single external argument.
    ///
    /// # Panics
    ///
    /// Panics when called on the null closure.
    pub fn call_with(self, worker: &mut Worker, arg: Value) -> Value {
        match self.caller {
            Some((_, caller)) => caller(self.f, self.captured, worker, arg),
            None => panic!("called a null closure"),
        }
    }
}

impl Default for Closure {
    fn default() -> Self {
        Closure::null()
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Closure(null)")
        } else {
            write!(f, "Closure({})", self.callable_name())
        }
    }
}

#[derive(Serialize)]
struct ClosureRepr<'a> {
    caller: Option<TypeKey>,
    f: &'a Value,
    captured: &'a Value,
}

#[derive(Deserialize)]
struct ClosureOwned {
    caller: Option<TypeKey>,
    f: Value,
    captured: Value,
}

impl Serialize for Closure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ClosureRepr {
            caller: self.caller.map(|(key, _)| key),
            f: &self.f,
            captured: &self.captured,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Closure {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = ClosureOwned::deserialize(deserializer)?;
        let caller = match repr.caller {
            Some(key) => {
                let caller = registry::get().caller_fn(key).map_err(D::Error::custom)?;
                Some((key, caller))
            }
            None => None,
        };
        Ok(Closure {
            f: repr.f,
            captured: repr.captured,
            caller,
        })
    }
}
