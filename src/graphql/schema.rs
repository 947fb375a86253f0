use crate::analytics::AnalyticsEngine;
use crate::app::{AppServices, IngestUseCase};
use crate::common::error::IgsError;
use crate::graphql::resolvers::Query;
use async_graphql::{EmptyMutation, EmptySubscription, ErrorExtensions, Schema};
use std::sync::Arc;

/// GraphQL context containing shared application state
pub struct GraphQLContext {
    pub engine: Arc<AnalyticsEngine>,
    pub ingest: Arc<IngestUseCase>,
}

/// The complete GraphQL schema
pub type GraphQLSchema = Schema<Query, EmptyMutation, EmptySubscription>;

/// Create a new GraphQL schema over the given services
pub fn create_schema(services: &AppServices) -> GraphQLSchema {
    Schema::build(Query, EmptyMutation, EmptySubscription)
        .data(GraphQLContext {
            engine: Arc::clone(&services.engine),
            ingest: Arc::clone(&services.ingest),
        })
        .finish()
}

/// Caller errors surface as `BAD_REQUEST` under `extensions.code`; the
/// specific kind is kept under `extensions.kind`
impl ErrorExtensions for IgsError {
    fn extend(&self) -> async_graphql::Error {
        let code = if self.is_caller_error() {
            "BAD_REQUEST"
        } else {
            self.code()
        };
        async_graphql::Error::new(self.to_string()).extend_with(|_, e| {
            e.set("code", code);
            e.set("kind", self.code());
        })
    }
}
