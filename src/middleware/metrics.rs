use actix_web::{
    body::{BodySize, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::StatusCode,
    web::Bytes,
};
use std::{
    future::{ready, Future, Ready},
    pin::Pin,
    task::{Context, Poll},
    time::Instant,
};

use crate::error::Error;

/// Counts and times requests by tubely route, response status, and error code
pub(crate) struct Metrics;

pub(crate) struct MetricsMiddleware<S> {
    inner: S,
}

/// Records once the response body is finished, or when the request is abandoned
struct RequestTimer {
    start: Instant,
    route: String,
    status: Option<StatusCode>,
    code: &'static str,
}

impl RequestTimer {
    fn start(route: Option<String>) -> Self {
        let route = route.unwrap_or_else(|| String::from("unmatched"));

        metrics::counter!(crate::init_metrics::REQUEST_START, "route" => route.clone())
            .increment(1);

        RequestTimer {
            start: Instant::now(),
            route,
            status: None,
            code: "none",
        }
    }

    fn responded(mut self, status: StatusCode, error: Option<&actix_web::Error>) -> Self {
        self.status = Some(status);

        if let Some(error) = error {
            self.code = error
                .as_error::<Error>()
                .map(|e| e.error_code().as_str())
                .unwrap_or("unknown-error");
        }

        self
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        let status = self
            .status
            .map(|status| status.as_str().to_string())
            .unwrap_or_else(|| String::from("cancelled"));

        metrics::counter!(
            crate::init_metrics::REQUEST_END,
            "route" => self.route.clone(),
            "status" => status.clone(),
            "code" => self.code
        )
        .increment(1);
        metrics::histogram!(
            crate::init_metrics::REQUEST_TIMINGS,
            "route" => self.route.clone(),
            "status" => status
        )
        .record(self.start.elapsed().as_secs_f64());
    }
}

pin_project_lite::pin_project! {
    pub(crate) struct MetricsFuture<F> {
        timer: Option<RequestTimer>,

        #[pin]
        inner: F,
    }
}

pin_project_lite::pin_project! {
    pub(crate) struct MetricsBody<B> {
        timer: Option<RequestTimer>,

        #[pin]
        inner: B,
    }
}

impl<S, B> Transform<S, ServiceRequest> for Metrics
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>>,
    S::Future: 'static,
    S::Error: Into<actix_web::Error>,
{
    type Response = ServiceResponse<MetricsBody<B>>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = MetricsMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddleware { inner: service }))
    }
}

impl<S, B> Service<ServiceRequest> for MetricsMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>>,
    S::Future: 'static,
    S::Error: Into<actix_web::Error>,
{
    type Response = ServiceResponse<MetricsBody<B>>;
    type Error = actix_web::Error;
    type Future = MetricsFuture<S::Future>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(ctx).map_err(Into::into)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        MetricsFuture {
            timer: Some(RequestTimer::start(req.match_pattern())),
            inner: self.inner.call(req),
        }
    }
}

impl<F, B, E> Future for MetricsFuture<F>
where
    F: Future<Output = Result<ServiceResponse<B>, E>>,
    E: Into<actix_web::Error>,
{
    type Output = Result<ServiceResponse<MetricsBody<B>>, actix_web::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let res = std::task::ready!(this.inner.poll(cx));
        let timer = this.timer.take();

        match res {
            Ok(response) => {
                let timer = timer
                    .map(|timer| timer.responded(response.status(), response.response().error()));

                Poll::Ready(Ok(response.map_body(|_, inner| MetricsBody { timer, inner })))
            }
            Err(e) => {
                let e: actix_web::Error = e.into();

                // nothing streams after an error escapes the service, so record it now
                if let Some(timer) = timer {
                    drop(timer.responded(e.as_response_error().status_code(), Some(&e)));
                }

                Poll::Ready(Err(e))
            }
        }
    }
}

impl<B> MessageBody for MetricsBody<B>
where
    B: MessageBody,
{
    type Error = B::Error;

    fn size(&self) -> BodySize {
        self.inner.size()
    }

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Bytes, Self::Error>>> {
        let this = self.project();

        let opt = std::task::ready!(this.inner.poll_next(cx));

        if opt.is_none() {
            this.timer.take();
        }

        Poll::Ready(opt)
    }
}
