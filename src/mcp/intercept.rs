//! Interceptor stack
//!
//! An interceptor turns one [`UnaryFunc`] into another. A [`Chain`] of `[a, b, c]` wrapping
//! `f` behaves as `a(b(c(f)))`: `a` sees the call first on the way in and last on the way out.

use std::{future::Future, sync::Arc};

use futures::future::BoxFuture;

use crate::errors::RpcError;
use crate::mcp::{
    context::Context,
    request::{AnyRequest, AnyResponse},
};

pub type UnaryResult = Result<Box<dyn AnyResponse>, RpcError>;

pub type UnaryFunc =
    Arc<dyn Fn(Context, Box<dyn AnyRequest>) -> BoxFuture<'static, UnaryResult> + Send + Sync>;

pub trait Interceptor: Send + Sync {
    fn wrap_unary(&self, next: UnaryFunc) -> UnaryFunc;
}

/// Builds a [`UnaryFunc`] from an async closure.
pub fn unary_fn<F, Fut>(f: F) -> UnaryFunc
where
    F: Fn(Context, Box<dyn AnyRequest>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = UnaryResult> + Send + 'static,
{
    Arc::new(
        move |ctx: Context, request: Box<dyn AnyRequest>| -> BoxFuture<'static, UnaryResult> {
            Box::pin(f(ctx, request))
        },
    )
}

/// Adapts a plain `Fn(UnaryFunc) -> UnaryFunc` into an [`Interceptor`].
#[derive(Clone)]
pub struct UnaryInterceptorFn<F> {
    wrap: F,
}

pub fn unary_interceptor_fn<F>(wrap: F) -> UnaryInterceptorFn<F>
where
    F: Fn(UnaryFunc) -> UnaryFunc + Send + Sync,
{
    UnaryInterceptorFn { wrap }
}

impl<F> Interceptor for UnaryInterceptorFn<F>
where
    F: Fn(UnaryFunc) -> UnaryFunc + Send + Sync,
{
    fn wrap_unary(&self, next: UnaryFunc) -> UnaryFunc {
        (self.wrap)(next)
    }
}

#[derive(Clone, Default)]
pub struct Chain {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
}

impl Chain {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self {
            interceptors: interceptors.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl Interceptor for Chain {
    fn wrap_unary(&self, next: UnaryFunc) -> UnaryFunc {
        self.interceptors
            .iter()
            .rev()
            .fold(next, |next, interceptor| interceptor.wrap_unary(next))
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}
