use crate::http::{full_body, make_boxed_error_response, make_json_response};
use crate::metrics_defs::MetricDef;
use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared readiness flag. Starts out not ready; the owning service flips it
/// once its backing stores are reachable.
#[derive(Clone, Default, Debug)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, ready: bool) {
        self.0.store(ready, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Serves `/health`, `/ready` and `/metrics` (the catalogue of emitted metrics).
pub struct AdminService<E> {
    readiness: Readiness,
    metrics: Vec<MetricDef>,
    _error: PhantomData<E>,
}

impl<E> AdminService<E> {
    pub fn new(readiness: Readiness, metric_groups: &[&[MetricDef]]) -> Self {
        Self {
            readiness,
            metrics: metric_groups.iter().flat_map(|g| g.iter().copied()).collect(),
            _error: PhantomData,
        }
    }
}

impl<B, E> Service<Request<B>> for AdminService<E>
where
    E: Send + 'static,
{
    type Response = Response<BoxBody<Bytes, E>>;
    type Error = E;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        let res = match req.uri().path() {
            "/health" => Response::new(full_body("ok\n")),
            "/ready" => match self.readiness.is_ready() {
                true => Response::new(full_body("ok\n")),
                false => make_boxed_error_response(StatusCode::SERVICE_UNAVAILABLE),
            },
            "/metrics" => {
                let catalogue: Vec<_> = self
                    .metrics
                    .iter()
                    .map(|def| {
                        serde_json::json!({
                            "name": def.name,
                            "type": def.metric_type.as_str(),
                            "description": def.description,
                        })
                    })
                    .collect();
                make_json_response(StatusCode::OK, &catalogue)
            }
            _ => make_boxed_error_response(StatusCode::NOT_FOUND),
        };

        Box::pin(async move { Ok(res) })
    }
}
