use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::{Duration, Instant},
};

pub(crate) trait WithTimeout: Future {
    fn with_timeout(self, duration: Duration) -> tokio::time::Timeout<Self>
    where
        Self: Sized,
    {
        tokio::time::timeout(duration, self)
    }
}

impl<F> WithTimeout for F where F: Future {}

/// Time a fallible repo or store call under `name`, labelled by how it ended
pub(crate) trait WithMetrics: Future + Sized {
    fn with_metrics(self, name: &'static str) -> MetricsFuture<Self> {
        MetricsFuture {
            future: self,
            timing: Timing {
                name,
                start: Instant::now(),
                outcome: Outcome::Cancelled,
            },
        }
    }
}

impl<F, T, E> WithMetrics for F where F: Future<Output = Result<T, E>> {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Cancelled,
}

impl Outcome {
    fn of<T, E>(res: &Result<T, E>) -> Self {
        if res.is_ok() {
            Self::Success
        } else {
            Self::Failure
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
        }
    }
}

struct Timing {
    name: &'static str,
    start: Instant,
    outcome: Outcome,
}

impl Drop for Timing {
    fn drop(&mut self) {
        metrics::histogram!(self.name, "outcome" => self.outcome.as_str())
            .record(self.start.elapsed().as_secs_f64());
    }
}

pin_project_lite::pin_project! {
    pub(crate) struct MetricsFuture<F> {
        #[pin]
        future: F,

        timing: Timing,
    }
}

impl<F, T, E> Future for MetricsFuture<F>
where
    F: Future<Output = Result<T, E>>,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let res = std::task::ready!(this.future.poll(cx));
        this.timing.outcome = Outcome::of(&res);

        Poll::Ready(res)
    }
}
