use actix_web::body::EitherBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, ResponseError};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::time::Duration;

use crate::error::ApiError;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Boundary deadline for a whole request. Slow storage or a wedged handler
/// surfaces as the timeout envelope instead of a connection the client has
/// to abandon.
#[derive(Clone, Copy)]
pub struct RequestTimeout {
    pub limit: Duration,
}

impl Default for RequestTimeout {
    fn default() -> Self {
        Self {
            limit: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl RequestTimeout {
    pub fn from_env() -> Self {
        let secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self {
            limit: Duration::from_secs(secs),
        }
    }

    pub fn with_limit(mut self, limit: Duration) -> Self {
        self.limit = limit;
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestTimeout
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestTimeoutMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestTimeoutMiddleware {
            service: Rc::new(service),
            limit: self.limit,
        }))
    }
}

pub struct RequestTimeoutMiddleware<S> {
    service: Rc<S>,
    limit: Duration,
}

impl<S, B> Service<ServiceRequest> for RequestTimeoutMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();
        let limit = self.limit;
        Box::pin(async move {
            // keep a handle on the request so the timeout arm can still
            // build a response for it
            let (http_req, payload) = req.into_parts();
            let inner = ServiceRequest::from_parts(http_req.clone(), payload);
            match tokio::time::timeout(limit, svc.call(inner)).await {
                Ok(res) => Ok(res?.map_into_left_body()),
                Err(_) => {
                    log::warn!("request to {} timed out after {limit:?}", http_req.path());
                    let res = ServiceResponse::new(http_req, ApiError::Timeout.error_response());
                    Ok(res.map_into_right_body())
                }
            }
        })
    }
}
