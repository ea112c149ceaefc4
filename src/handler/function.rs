//! Registered handler functions and their calling convention.
//!
//! A handler function declares how many parameters it takes when it is registered. It
//! either takes exactly its nominal arguments, or those arguments plus a trailing request
//! context. [`HandlerFn::invoke`] compares the declared count against the nominal one
//! and passes the context only to functions that asked for it.

use std::fmt;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::{HandlerResult, InferenceError};

/// Argument tuple of a handler function.
pub trait HandlerArgs {
    /// Number of nominal arguments, excluding the optional context.
    const COUNT: usize;
}

macro_rules! handler_args {
    ($count:expr; $($name:ident),+) => {
        impl<$($name),+> HandlerArgs for ($($name,)+) {
            const COUNT: usize = $count;
        }
    };
}

handler_args!(1; A);
handler_args!(2; A, B);
handler_args!(3; A, B, C);
handler_args!(4; A, B, C, D);

type Callable<A, R> =
    dyn Fn(A, Option<&dyn RequestContext>) -> HandlerResult<R> + Send + Sync;

pub struct HandlerFn<A, R> {
    name: String,
    params: usize,
    func: Arc<Callable<A, R>>,
}

impl<A: HandlerArgs, R> HandlerFn<A, R> {
    /// A function taking exactly its nominal arguments.
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(A) -> HandlerResult<R> + Send + Sync + 'static,
    {
        let func: Arc<Callable<A, R>> =
            Arc::new(move |args: A, _context: Option<&dyn RequestContext>| f(args));
        HandlerFn {
            name: name.into(),
            params: A::COUNT,
            func,
        }
    }

    /// A function that also receives the request context of the current call.
    ///
    /// The context is `None` when the function runs outside of a request, for example a
    /// `model_fn` during an initialization that was not given one.
    pub fn with_context<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(A, Option<&dyn RequestContext>) -> HandlerResult<R> + Send + Sync + 'static,
    {
        Self::with_arity(name, A::COUNT + 1, f)
    }

    /// A function with an explicitly declared parameter count.
    ///
    /// Counts other than the nominal count or one more make every invocation fail.
    pub fn with_arity<F>(name: impl Into<String>, params: usize, f: F) -> Self
    where
        F: Fn(A, Option<&dyn RequestContext>) -> HandlerResult<R> + Send + Sync + 'static,
    {
        HandlerFn {
            name: name.into(),
            params,
            func: Arc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> usize {
        self.params
    }

    pub fn accepts_context(&self) -> bool {
        self.params == A::COUNT + 1
    }

    pub fn invoke(&self, args: A, context: Option<&dyn RequestContext>) -> HandlerResult<R> {
        let given = A::COUNT;
        if self.params == given {
            (self.func)(args, None)
        } else if self.params == given + 1 {
            (self.func)(args, context)
        } else {
            Err(InferenceError::Arity {
                name: self.name.clone(),
                declared: self.params,
                given,
            })
        }
    }
}

impl<A, R> Clone for HandlerFn<A, R> {
    fn clone(&self) -> Self {
        HandlerFn {
            name: self.name.clone(),
            params: self.params,
            func: Arc::clone(&self.func),
        }
    }
}

impl<A, R> fmt::Debug for HandlerFn<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}
