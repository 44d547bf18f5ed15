use std::sync::Arc;

use tracing::{debug, error, info};

use super::functional::FnResolver;
use super::registry::HandlerRegistry;
use super::status::StatusMetadataResolver;
use super::{RequestHead, Resolution, Resolver, ResolverError};
use crate::failure::Failure;

/// Ordered resolvers, highest priority first
///
/// Built once at startup and shared read-only across requests.
pub struct ResolverChain {
    resolvers: Vec<Arc<dyn Resolver>>,
}

impl ResolverChain {
    pub fn builder() -> ResolverChainBuilder {
        ResolverChainBuilder::default()
    }

    pub fn resolver_names(&self) -> Vec<&str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    /// Run resolvers in order; the first non-`Unresolved` outcome is final
    ///
    /// `Ok(Resolution::Unresolved)` means every resolver passed and the
    /// failure goes back to the transport. A resolver error stops the chain
    /// and must be treated as fatal by the caller.
    pub fn dispatch(
        &self,
        failure: &Failure,
        request: &RequestHead,
    ) -> Result<Resolution, ResolverError> {
        for resolver in &self.resolvers {
            let outcome = resolver.resolve(failure, request).map_err(|err| {
                error!(resolver = resolver.name(), error = %err, "Resolver failed");
                err
            })?;

            if outcome.is_unresolved() {
                debug!(resolver = resolver.name(), kind = %failure.kind(), "Resolver passed");
                continue;
            }

            info!(resolver = resolver.name(), kind = %failure.kind(), "Failure resolved");
            return Ok(outcome);
        }

        info!(kind = %failure.kind(), "No resolver claimed failure, passing through");
        Ok(Resolution::Unresolved)
    }
}

impl std::fmt::Debug for ResolverChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverChain")
            .field("resolvers", &self.resolver_names())
            .finish()
    }
}

/// Assembles a chain in fixed priority order regardless of call order
#[derive(Default)]
pub struct ResolverChainBuilder {
    registry: Option<Arc<dyn Resolver>>,
    status_metadata: Option<Arc<dyn Resolver>>,
    custom: Vec<Arc<dyn Resolver>>,
}

impl ResolverChainBuilder {
    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    pub fn status_metadata(mut self, resolver: StatusMetadataResolver) -> Self {
        self.status_metadata = Some(Arc::new(resolver));
        self
    }

    /// Append a generic resolver; these run after the built-in ones
    pub fn resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.custom.push(Arc::new(resolver));
        self
    }

    pub fn resolver_fn<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Failure, &RequestHead) -> Result<Resolution, ResolverError> + Send + Sync + 'static,
    {
        self.resolver(FnResolver::new(name, f))
    }

    pub fn build(self) -> ResolverChain {
        let resolvers = self
            .registry
            .into_iter()
            .chain(self.status_metadata)
            .chain(self.custom)
            .collect();
        ResolverChain { resolvers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::FailureKind;
    use crate::negotiate::{ErrorResult, Representation, respond};
    use crate::resolve::{HandlerRegistration, HandlerReply, MessageCatalog};
    use axum::http::{HeaderMap, Method, StatusCode, Uri};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn head() -> RequestHead {
        RequestHead::new(Method::GET, Uri::from_static("/test"), HeaderMap::new())
    }

    fn registry() -> HandlerRegistry {
        let mut builder = HandlerRegistry::builder();
        builder.register(
            HandlerRegistration::new(FailureKind::BadRequest, |f| {
                Ok(HandlerReply::body(ErrorResult::new("from-registry", f.message())))
            })
            .with_fixed_status(StatusCode::CONFLICT),
        );
        builder.build().unwrap()
    }

    #[test]
    fn test_priority_order_ignores_call_order() {
        let chain = ResolverChain::builder()
            .resolver_fn("custom", |_, _| Ok(Resolution::Unresolved))
            .status_metadata(StatusMetadataResolver::new(Arc::new(MessageCatalog::new())))
            .registry(registry())
            .build();

        assert_eq!(
            chain.resolver_names(),
            vec!["handler-registry", "status-metadata", "custom"]
        );
    }

    #[test]
    fn test_registry_beats_status_metadata() {
        // bad-request has status metadata, but the registry sees it first
        let chain = ResolverChain::builder()
            .registry(registry())
            .status_metadata(StatusMetadataResolver::new(Arc::new(MessageCatalog::new())))
            .build();

        let failure = Failure::new(FailureKind::BadRequest, "dup");
        match chain.dispatch(&failure, &head()).unwrap() {
            Resolution::Responded(response) => {
                assert_eq!(response.status, StatusCode::CONFLICT);
                assert_eq!(response.result().code(), "from-registry");
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_first_answer_stops_chain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let chain = ResolverChain::builder()
            .resolver_fn("first", |_, _| {
                Ok(Resolution::Responded(respond(
                    StatusCode::IM_A_TEAPOT,
                    ErrorResult::new("tea", "short and stout"),
                    Representation::Json,
                )))
            })
            .resolver_fn("second", move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Resolution::Unresolved)
            })
            .build();

        let outcome = chain.dispatch(&Failure::runtime("x"), &head()).unwrap();
        assert!(matches!(outcome, Resolution::Responded(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_all_unresolved_passes_through() {
        let chain = ResolverChain::builder()
            .registry(registry())
            .resolver_fn("never", |_, _| Ok(Resolution::Unresolved))
            .build();

        let outcome = chain.dispatch(&Failure::runtime("boom"), &head()).unwrap();
        assert!(outcome.is_unresolved());
    }

    #[test]
    fn test_resolver_error_stops_chain() {
        let chain = ResolverChain::builder()
            .resolver_fn("broken", |_, _| {
                Err(ResolverError::Failed {
                    resolver: "broken".to_string(),
                    message: "writer closed".to_string(),
                })
            })
            .resolver_fn("after", |_, _| Ok(Resolution::Unresolved))
            .build();

        let result = chain.dispatch(&Failure::runtime("x"), &head());
        assert!(matches!(result, Err(ResolverError::Failed { .. })));
    }

    #[test]
    fn test_dispatch_is_idempotent() {
        let chain = ResolverChain::builder()
            .registry(registry())
            .status_metadata(StatusMetadataResolver::new(Arc::new(MessageCatalog::new())))
            .build();

        let failure = Failure::new(FailureKind::NotFound, "row 7");
        let first = chain.dispatch(&failure, &head()).unwrap().describe();
        let second = chain.dispatch(&failure, &head()).unwrap().describe();
        assert_eq!(first, second);
    }
}
