use crate::app::AppServices;
use crate::common::error::IgsError;
use crate::config::ServerConfig;
use crate::graphql::{create_schema, GraphQLSchema};
use crate::observability;
use axum::{
    http::{HeaderValue, Method, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Json as AxumJson, Router,
};
use hyper::Server;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{info, warn};

use async_graphql_axum::{GraphQLRequest, GraphQLResponse};

/// Health check endpoint
async fn health(Extension(services): Extension<AppServices>) -> impl IntoResponse {
    let status = services.engine.status();
    Json(serde_json::json!({
        "status": "healthy",
        "service": "igs-analytics",
        "version": env!("CARGO_PKG_VERSION"),
        "store_version": status.version,
        "records": status.record_count,
    }))
}

/// GraphQL handler (supports GET and POST)
async fn graphql_handler(
    Extension(schema): Extension<GraphQLSchema>,
    req: GraphQLRequest,
) -> GraphQLResponse {
    schema.execute(req.into_inner()).await.into()
}

/// Prometheus exposition of the process metrics
async fn metrics_handler() -> Response {
    match observability::metrics::render() {
        Some(body) => body.into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

/// GraphiQL UI (pinned CDN versions to avoid upstream breaking changes)
async fn graphiql() -> impl IntoResponse {
    let html = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>GraphiQL</title>
    <link id="graphiql-css" rel="stylesheet" href="/assets/graphiql/graphiql.min.css" onerror="this.onerror=null;this.href='https://cdn.jsdelivr.net/npm/graphiql@2.7.5/graphiql.min.css'" />
    <style>
      html, body, #graphiql { height: 100%; margin: 0; width: 100%; }
      .error { padding: 16px; font-family: sans-serif; color: #b00020; }
    </style>
  </head>
  <body>
    <div id="graphiql"></div>
    <div id="error" class="error" style="display:none"></div>
    <script>
      function loadScript(src, cb){
        var s=document.createElement('script');
        s.src=src; s.crossOrigin='anonymous';
        s.onload=function(){ cb && cb(); };
        s.onerror=function(){ cb && cb(new Error('load failed: '+src)); };
        document.head.appendChild(s);
      }
      function render(){
        try {
          const fetcher = GraphiQL.createFetcher({ url: '/graphql' });
          const root = ReactDOM.createRoot(document.getElementById('graphiql'));
          root.render(React.createElement(GraphiQL, { fetcher }));
        } catch (e) {
          var el=document.getElementById('error');
          el.style.display='block';
          el.textContent='Failed to initialize GraphiQL: '+e;
        }
      }
      function start(){
        if (window.GraphiQL && window.React && window.ReactDOM) { return render(); }
        // Prefer local assets, then fall back to CDNs
        loadScript('/assets/graphiql/react.production.min.js', function(){
          if (!window.React) return loadScript('https://cdn.jsdelivr.net/npm/react@18/umd/react.production.min.js', function(){});
        });
        loadScript('/assets/graphiql/react-dom.production.min.js', function(){
          if (!window.ReactDOM) return loadScript('https://cdn.jsdelivr.net/npm/react-dom@18/umd/react-dom.production.min.js', function(){});
        });
        loadScript('/assets/graphiql/graphiql.min.js', function(err){
          if (err || !window.GraphiQL){
            loadScript('https://cdn.jsdelivr.net/npm/graphiql@2.7.5/graphiql.min.js', function(){
              if (window.GraphiQL) render();
              else {
                var el=document.getElementById('error');
                el.style.display='block';
                el.textContent='Could not load GraphiQL assets from CDNs. Check network/CSP or use a different network.';
              }
            });
          } else {
            render();
          }
        });
      }
      // Kick off after DOM ready
      (document.readyState === 'loading') ? document.addEventListener('DOMContentLoaded', start) : start();
    </script>
  </body>
</html>"#;
    Html(html.to_string())
}

/// Body of `POST /admin/ingest`; without a path the configured source is used
#[derive(Debug, Default, Deserialize)]
pub struct IngestParams {
    pub path: Option<PathBuf>,
}

pub fn status_for(error: &IgsError) -> StatusCode {
    match error {
        IgsError::NotFound { .. } => StatusCode::NOT_FOUND,
        IgsError::MalformedSource { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        e if e.is_caller_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Resolve the path an ingest request asks for. Requests may only name files
/// under the directory of the configured source; relative paths are taken
/// from that directory.
pub fn ingest_path_for(requested: Option<PathBuf>, default_source: &Path) -> Result<PathBuf, IgsError> {
    let Some(requested) = requested else {
        return Ok(default_source.to_path_buf());
    };
    let source_dir = match default_source.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let candidate = if requested.is_absolute() {
        requested
    } else {
        source_dir.join(requested)
    };
    let climbs = candidate.components().any(|c| matches!(c, Component::ParentDir));
    if climbs || !candidate.starts_with(source_dir) {
        return Err(IgsError::InvalidQuery(format!(
            "ingest path {} is outside {}",
            candidate.display(),
            source_dir.display()
        )));
    }
    Ok(candidate)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();
    if parsed.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(AllowOrigin::list(parsed))
    }
}

/// Create the HTTP server with all routes, including GraphQL
pub fn create_server(services: AppServices, config: &ServerConfig, default_source: PathBuf) -> Router {
    let schema: GraphQLSchema = create_schema(&services);
    let ingest = Arc::clone(&services.ingest);

    let mut router = Router::new()
        .route("/health", get(health))
        // Serve local assets (GraphiQL JS/CSS)
        .nest_service("/assets", ServeDir::new("assets"))
        // GraphQL endpoints
        .route("/graphql", post(graphql_handler).get(graphql_handler))
        .route("/graphiql", get(graphiql));

    if config.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .route(
            "/admin/ingest",
            post({
                move |params: Option<AxumJson<IngestParams>>| {
                    let ingest = Arc::clone(&ingest);
                    let path = ingest_path_for(params.and_then(|AxumJson(p)| p.path), &default_source);
                    async move {
                        let path = match path {
                            Ok(path) => path,
                            Err(e) => {
                                warn!("Refused ingest request: {}", e);
                                return (status_for(&e), e.to_string()).into_response();
                            }
                        };
                        match ingest.ingest_path(&path).await {
                            Ok(report) => AxumJson(report).into_response(),
                            Err(e) => (status_for(&e), e.to_string()).into_response(),
                        }
                    }
                }
            }),
        )
        .layer(Extension(schema))
        .layer(Extension(services))
        .layer(ServiceBuilder::new().layer(cors_layer(&config.cors_origins)))
}

/// Start the HTTP server on the configured address
pub async fn start_server(
    services: AppServices,
    config: &ServerConfig,
    default_source: PathBuf,
) -> anyhow::Result<()> {
    let app = create_server(services, config, default_source);

    let ip: IpAddr = config.host.parse()?;
    let addr = SocketAddr::new(ip, config.port);
    let port = config.port;

    info!("HTTP server running on http://{addr}");
    info!("Health check: http://localhost:{port}/health");
    info!("GraphQL:      http://localhost:{port}/graphql");
    info!("GraphiQL UI:  http://localhost:{port}/graphiql");

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses() {
        let not_found = IgsError::NotFound {
            tract_id: "13089021415".into(),
            year: None,
        };
        assert_eq!(status_for(&not_found), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&IgsError::UnknownMetric("bogus".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&IgsError::MalformedSource {
                row: 1,
                byte_offset: 0,
                message: "no header".into()
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&IgsError::Config("bad".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn ingest_paths_stay_under_the_source_directory() {
        let source = Path::new("data/raw/igs.csv");
        assert_eq!(ingest_path_for(None, source).unwrap(), source);
        assert_eq!(
            ingest_path_for(Some("igs_2021.csv".into()), source).unwrap(),
            Path::new("data/raw/igs_2021.csv")
        );

        for escape in ["/etc/passwd", "../secrets.csv", "nested/../../db.sqlite"] {
            let err = ingest_path_for(Some(escape.into()), source).unwrap_err();
            assert!(matches!(err, IgsError::InvalidQuery(_)), "{escape}");
            assert_eq!(status_for(&err), StatusCode::BAD_REQUEST);
        }

        let bare = Path::new("igs.csv");
        assert_eq!(
            ingest_path_for(Some("other.csv".into()), bare).unwrap(),
            Path::new("./other.csv")
        );
        assert!(ingest_path_for(Some("/tmp/other.csv".into()), bare).is_err());
    }
}
