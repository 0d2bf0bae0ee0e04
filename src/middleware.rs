//! Tower middleware that charges each request against a [`RateLimiter`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use pin_project::pin_project;
use tower_layer::Layer;
use tower_service::Service;

use crate::bucket::CallerId;
use crate::category::QuotaCategory;
use crate::error::QuotaError;
use crate::limiter::{Decision, RateLimiter};

/// What a request costs and whom to charge.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaClaim {
    pub caller: CallerId,
    pub category: QuotaCategory,
    pub cost: f64,
}

impl QuotaClaim {
    pub fn new(caller: impl Into<CallerId>, category: QuotaCategory, cost: f64) -> Self {
        Self { caller: caller.into(), category, cost }
    }
}

/// A layer that enforces quotas using a [`RateLimiter`].
///
/// `F` maps each request to the [`QuotaClaim`] it should be charged for; deciding what one unit
/// of cost means stays with the integrating service.
pub struct QuotaLayer<F> {
    limiter: RateLimiter,
    classify: Arc<F>,
}

impl<F> Clone for QuotaLayer<F> {
    fn clone(&self) -> Self {
        Self { limiter: self.limiter.clone(), classify: self.classify.clone() }
    }
}

impl<F> QuotaLayer<F> {
    pub fn new(limiter: RateLimiter, classify: F) -> Self {
        Self { limiter, classify: Arc::new(classify) }
    }
}

impl<F> std::fmt::Debug for QuotaLayer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaLayer").field("limiter", &self.limiter).finish_non_exhaustive()
    }
}

impl<S, F> Layer<S> for QuotaLayer<F> {
    type Service = QuotaService<S, F>;

    fn layer(&self, service: S) -> Self::Service {
        QuotaService {
            inner: service,
            limiter: self.limiter.clone(),
            classify: self.classify.clone(),
        }
    }
}

/// Middleware service that enforces quotas.
pub struct QuotaService<S, F> {
    inner: S,
    limiter: RateLimiter,
    classify: Arc<F>,
}

impl<S: Clone, F> Clone for QuotaService<S, F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: self.limiter.clone(),
            classify: self.classify.clone(),
        }
    }
}

impl<S, F> std::fmt::Debug for QuotaService<S, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaService").field("limiter", &self.limiter).finish_non_exhaustive()
    }
}

impl<S, F, Req> Service<Req> for QuotaService<S, F>
where
    S: Service<Req>,
    F: Fn(&Req) -> QuotaClaim,
{
    type Response = S::Response;
    type Error = QuotaError<S::Error>;
    type Future = ResponseFuture<S::Future, S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(QuotaError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let claim = (self.classify)(&req);
        match self.limiter.try_consume(claim.caller, claim.category, claim.cost) {
            Ok(Decision::Allowed { .. }) => ResponseFuture::Forward { inner: self.inner.call(req) },
            Ok(Decision::Denied { retry_after }) => ResponseFuture::Rejected {
                error: Some(QuotaError::RateLimited { retry_after }),
            },
            Err(violation) => ResponseFuture::Rejected { error: Some(QuotaError::Contract(violation)) },
        }
    }
}

/// Response future of [`QuotaService`].
#[pin_project(project = ResponseFutureProj)]
#[derive(Debug)]
pub enum ResponseFuture<Fut, E> {
    /// Admitted; waiting on the inner service.
    Forward {
        #[pin]
        inner: Fut,
    },
    /// Rejected before reaching the inner service.
    Rejected { error: Option<QuotaError<E>> },
}

impl<Fut, T, E> Future for ResponseFuture<Fut, E>
where
    Fut: Future<Output = Result<T, E>>,
{
    type Output = Result<T, QuotaError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            ResponseFutureProj::Forward { inner } => inner.poll(cx).map_err(QuotaError::Inner),
            ResponseFutureProj::Rejected { error } => match error.take() {
                Some(e) => Poll::Ready(Err(e)),
                None => panic!("ResponseFuture polled after completion"),
            },
        }
    }
}
