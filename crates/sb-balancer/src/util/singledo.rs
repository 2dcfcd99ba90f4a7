//! Single-flight with a short memo window.
//!
//! Concurrent callers of [`Single::run`] share one execution of the supplied
//! future, and the outcome (value *or* error) is reused until `wait` has passed
//! since that execution started. The execution is driven by its own tokio task
//! and records its own result, so it runs to completion even when every caller
//! that was waiting on it has gone away.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

type Call<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

struct State<T, E> {
    last: Option<(Instant, Result<T, E>)>,
    call: Option<Call<T, E>>,
}

enum Step<T, E> {
    Done(Result<T, E>),
    Join(Call<T, E>),
    Lead(Call<T, E>),
}

pub struct Single<T, E> {
    wait: Duration,
    state: Arc<Mutex<State<T, E>>>,
}

impl<T, E> Single<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(wait: Duration) -> Self {
        Self {
            wait,
            state: Arc::new(Mutex::new(State {
                last: None,
                call: None,
            })),
        }
    }

    /// Returns the outcome and whether it was shared (memoised or joined in flight).
    ///
    /// `f` is only invoked when neither a fresh memo nor an in-flight call exists.
    /// Must be called from within a tokio runtime.
    pub async fn run<F, Fut>(&self, f: F) -> (Result<T, E>, bool)
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let step = {
            let mut st = self.state.lock();
            let now = Instant::now();
            let fresh = st
                .last
                .as_ref()
                .filter(|(at, _)| now.duration_since(*at) < self.wait)
                .map(|(_, res)| res.clone());
            if let Some(res) = fresh {
                Step::Done(res)
            } else if let Some(call) = st.call.clone() {
                Step::Join(call)
            } else {
                let state = Arc::clone(&self.state);
                let fut = f();
                let call: Call<T, E> = async move {
                    let res = fut.await;
                    let mut st = state.lock();
                    st.last = Some((now, res.clone()));
                    st.call = None;
                    res
                }
                .boxed()
                .shared();
                st.call = Some(call.clone());
                Step::Lead(call)
            }
        };
        match step {
            Step::Done(res) => (res, true),
            Step::Join(call) => (call.await, true),
            Step::Lead(call) => {
                // 独立任务驱动，调用方被取消也不会停在半途
                tokio::spawn(call.clone());
                (call.await, false)
            }
        }
    }

    /// Forget the memoised outcome; an in-flight call is left alone.
    pub fn reset(&self) {
        self.state.lock().last = None;
    }
}

impl<T, E> std::fmt::Debug for Single<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Single").field("wait", &self.wait).finish()
    }
}
