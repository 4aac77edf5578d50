//! Route table and dispatch.
//!
//! Routes are kept in registration order and scanned linearly; the first
//! route whose method and pattern both match wins. There is no specificity
//! ranking, so `/items/{id}` registered before `/items/current` shadows it.
//! Registering the same method and template twice leaves the second entry
//! unreachable.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::debug;

use crate::http::context::RequestContext;
use crate::http::request::Method;
use crate::http::response::Response;
use crate::routing::pattern::{PatternError, RoutePattern};

/// Future returned by a [`Handler`].
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Business logic invoked for a matched route.
///
/// A handler must write exactly one response through the context before its
/// future completes. Returning an error (or panicking) makes the server
/// answer with a 500 if nothing was written yet.
pub trait Handler: Send + Sync {
    fn call(&self, ctx: RequestContext) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn call(&self, ctx: RequestContext) -> HandlerFuture {
        Box::pin(self(ctx))
    }
}

/// A registered (method, template, handler) triple.
pub struct Route {
    method: String,
    pattern: RoutePattern,
    handler: Arc<dyn Handler>,
}

impl Route {
    /// Upper-cased method token.
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    fn matches_method(&self, method: &str) -> bool {
        self.method.eq_ignore_ascii_case(method)
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("template", &self.pattern.template())
            .finish_non_exhaustive()
    }
}

/// The outcome of a successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    /// Decoded captures in template order.
    pub params: Vec<(String, String)>,
}

/// Ordered route table.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles `template` and appends a route for `method`.
    pub fn register<F, Fut>(
        &mut self,
        method: &str,
        template: &str,
        handler: F,
    ) -> Result<&mut Self, PatternError>
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register_handler(method, template, Arc::new(handler))
    }

    /// Appends a route backed by an existing handler object.
    pub fn register_handler(
        &mut self,
        method: &str,
        template: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<&mut Self, PatternError> {
        let pattern = RoutePattern::compile(template)?;
        debug!(
            method = %method.to_ascii_uppercase(),
            template = %template,
            params = ?pattern.param_names(),
            "Route registered"
        );
        self.routes.push(Route {
            method: method.to_ascii_uppercase(),
            pattern,
            handler,
        });
        Ok(self)
    }

    pub fn get<F, Fut>(&mut self, template: &str, handler: F) -> Result<&mut Self, PatternError>
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(Method::GET.as_str(), template, handler)
    }

    pub fn post<F, Fut>(&mut self, template: &str, handler: F) -> Result<&mut Self, PatternError>
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(Method::POST.as_str(), template, handler)
    }

    pub fn put<F, Fut>(&mut self, template: &str, handler: F) -> Result<&mut Self, PatternError>
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(Method::PUT.as_str(), template, handler)
    }

    pub fn delete<F, Fut>(&mut self, template: &str, handler: F) -> Result<&mut Self, PatternError>
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(Method::DELETE.as_str(), template, handler)
    }

    pub fn patch<F, Fut>(&mut self, template: &str, handler: F) -> Result<&mut Self, PatternError>
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(Method::PATCH.as_str(), template, handler)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Finds the first route matching `method` and the raw request path.
    pub fn find(&self, method: &str, raw_path: &str) -> Option<RouteMatch<'_>> {
        self.routes
            .iter()
            .filter(|route| route.matches_method(method))
            .find_map(|route| {
                route
                    .pattern
                    .match_path(raw_path)
                    .map(|params| RouteMatch { route, params })
            })
    }

    /// Routes `ctx` to the first matching handler, or answers 404.
    ///
    /// Errors returned by the handler are passed through untouched.
    pub async fn dispatch(&self, mut ctx: RequestContext) -> anyhow::Result<()> {
        let Some(matched) = self.find(ctx.method(), ctx.raw_path()) else {
            debug!(method = %ctx.method(), path = %ctx.path(), "No route matched");
            let response = Response::not_found(ctx.method(), ctx.path());
            ctx.write_response(response).await?;
            return Ok(());
        };

        debug!(
            method = %ctx.method(),
            path = %ctx.path(),
            template = %matched.route.pattern,
            "Route matched"
        );
        let handler = Arc::clone(&matched.route.handler);
        ctx.set_route_params(matched.params);
        handler.call(ctx).await
    }
}
