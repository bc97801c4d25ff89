//! User logic behind a handler step, erased to a uniform call shape.
//!
//! Closures of up to [`MAX_HANDLER_ARITY`] arguments convert into a
//! [`LogicRef`] through [`SyncLogic`] or [`AsyncLogic`]. The erased form
//! remembers the argument and result types so the synthesizer can check a
//! step's declared bindings against what the closure actually accepts.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;

use crate::value::{Value, ValueType};

/// Highest number of arguments a single handler step may take.
pub const MAX_HANDLER_ARITY: usize = 8;

pub type LogicRef = Arc<dyn ErasedLogic>;

/// Result of calling a step's logic.
pub enum LogicOutput {
    Ready(Value),
    Pending(BoxFuture<'static, Value>),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvokeError {
    #[error("expected {expected} arguments, got {actual}")]
    Arity { expected: usize, actual: usize },
    #[error("argument {position} is not a '{expected}'")]
    ArgumentType {
        position: usize,
        expected: &'static str,
    },
}

pub trait ErasedLogic: Send + Sync {
    fn param_types(&self) -> &[ValueType];

    fn return_type(&self) -> ValueType;

    fn suspends(&self) -> bool;

    fn call(&self, args: Vec<Value>) -> Result<LogicOutput, InvokeError>;

    fn arity(&self) -> usize {
        self.param_types().len()
    }
}

/// Synchronous closure usable as handler logic.
pub trait SyncLogic<Args, R>: Send + Sync + Sized + 'static {
    fn into_logic(self) -> LogicRef;
}

/// Closure returning a future, usable as suspending handler logic.
pub trait AsyncLogic<Args, R>: Send + Sync + Sized + 'static {
    fn into_logic(self) -> LogicRef;
}

struct SyncFn<F, Args, R> {
    f: F,
    params: Vec<ValueType>,
    returns: ValueType,
    _marker: PhantomData<fn() -> (Args, R)>,
}

struct AsyncFn<F, Args, R> {
    f: F,
    params: Vec<ValueType>,
    returns: ValueType,
    _marker: PhantomData<fn() -> (Args, R)>,
}

fn take_arg<T: Clone + 'static>(
    args: &mut std::vec::IntoIter<Value>,
    position: &mut usize,
) -> Result<T, InvokeError> {
    *position += 1;
    let expected = std::any::type_name::<T>();
    let value = args.next().ok_or(InvokeError::ArgumentType {
        position: *position,
        expected,
    })?;
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or(InvokeError::ArgumentType {
            position: *position,
            expected,
        })
}

fn check_arity(expected: usize, actual: usize) -> Result<(), InvokeError> {
    if expected == actual {
        Ok(())
    } else {
        Err(InvokeError::Arity { expected, actual })
    }
}

macro_rules! impl_logic {
    ($($ty:ident),*) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<F, R, $($ty,)*> ErasedLogic for SyncFn<F, ($($ty,)*), R>
        where
            F: Fn($($ty),*) -> R + Send + Sync + 'static,
            R: Serialize + Send + Sync + 'static,
            $($ty: Clone + Send + Sync + 'static,)*
        {
            fn param_types(&self) -> &[ValueType] {
                &self.params
            }

            fn return_type(&self) -> ValueType {
                self.returns
            }

            fn suspends(&self) -> bool {
                false
            }

            fn call(&self, args: Vec<Value>) -> Result<LogicOutput, InvokeError> {
                check_arity(self.params.len(), args.len())?;
                let mut args = args.into_iter();
                let mut position = 0usize;
                $(let $ty = take_arg::<$ty>(&mut args, &mut position)?;)*
                let out = (self.f)($($ty),*);
                Ok(LogicOutput::Ready(Arc::new(out)))
            }
        }

        impl<F, R, $($ty,)*> SyncLogic<($($ty,)*), R> for F
        where
            F: Fn($($ty),*) -> R + Send + Sync + 'static,
            R: Serialize + Send + Sync + 'static,
            $($ty: Clone + Send + Sync + 'static,)*
        {
            fn into_logic(self) -> LogicRef {
                Arc::new(SyncFn::<F, ($($ty,)*), R> {
                    f: self,
                    params: vec![$(ValueType::of::<$ty>()),*],
                    returns: ValueType::serializable::<R>(),
                    _marker: PhantomData,
                })
            }
        }

        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<F, Fut, R, $($ty,)*> ErasedLogic for AsyncFn<F, ($($ty,)*), R>
        where
            F: Fn($($ty),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: Serialize + Send + Sync + 'static,
            $($ty: Clone + Send + Sync + 'static,)*
        {
            fn param_types(&self) -> &[ValueType] {
                &self.params
            }

            fn return_type(&self) -> ValueType {
                self.returns
            }

            fn suspends(&self) -> bool {
                true
            }

            fn call(&self, args: Vec<Value>) -> Result<LogicOutput, InvokeError> {
                check_arity(self.params.len(), args.len())?;
                let mut args = args.into_iter();
                let mut position = 0usize;
                $(let $ty = take_arg::<$ty>(&mut args, &mut position)?;)*
                let fut = (self.f)($($ty),*);
                Ok(LogicOutput::Pending(Box::pin(async move {
                    Arc::new(fut.await) as Value
                })))
            }
        }

        impl<F, Fut, R, $($ty,)*> AsyncLogic<($($ty,)*), R> for F
        where
            F: Fn($($ty),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: Serialize + Send + Sync + 'static,
            $($ty: Clone + Send + Sync + 'static,)*
        {
            fn into_logic(self) -> LogicRef {
                Arc::new(AsyncFn::<F, ($($ty,)*), R> {
                    f: self,
                    params: vec![$(ValueType::of::<$ty>()),*],
                    returns: ValueType::serializable::<R>(),
                    _marker: PhantomData,
                })
            }
        }
    };
}

impl_logic!();
impl_logic!(T1);
impl_logic!(T1, T2);
impl_logic!(T1, T2, T3);
impl_logic!(T1, T2, T3, T4);
impl_logic!(T1, T2, T3, T4, T5);
impl_logic!(T1, T2, T3, T4, T5, T6);
impl_logic!(T1, T2, T3, T4, T5, T6, T7);
impl_logic!(T1, T2, T3, T4, T5, T6, T7, T8);
