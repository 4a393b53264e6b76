//! Future / promise / continuation (§4.3): a reference-counted node for a
//! deferred value and the callbacks chained onto it.
//!
//! The source's `future_header` is a hand-rolled intrusive refcounted node
//! with a manually-dispatched `header_ops` table distinguishing results,
//! ready futures, dependents, and promises, to avoid a virtual call on the
//! hot increment/decrement path. Rust's `Arc` already gives us the
//! refcounting half of that for free; we keep the *shape* of the API
//! (`then`, `when_all`, `wait`, `ready`/`result`) and let `Arc<Mutex<_>>`
//! stand in for the bespoke header rather than reimplementing intrusive
//! refcounting by hand, which is exactly the kind of unsafe plumbing not
//! worth re-deriving without a compiler to check it against.
//!
//! One real simplification versus the source: a future's continuations
//! here require `T: Clone`, since more than one `then` may be attached to
//! the same node and each needs its own copy of the result (the source
//! instead proxies a dependent directly at the pointed-to result header).

use std::sync::{Arc, Condvar, Mutex};

type Continuation<T> = Box<dyn FnOnce(T) + Send>;

enum State<T> {
    Pending(Vec<Continuation<T>>),
    Ready(T),
}

struct Inner<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

/// A reference-counted, possibly-not-yet-computed value.
pub struct Future<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Future { inner: self.inner.clone() }
    }
}

/// The writer half of a [`Future`]: fulfilling it wakes every waiter and
/// runs every attached continuation.
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Clone + Send + 'static> Future<T> {
    /// Creates a not-yet-ready future and its paired promise.
    pub fn pending() -> (Future<T>, Promise<T>) {
        let inner = Arc::new(Inner { state: Mutex::new(State::Pending(Vec::new())), ready: Condvar::new() });
        (Future { inner: inner.clone() }, Promise { inner })
    }

    /// Creates an already-ready future over `value` (the source's
    /// `make_future`).
    pub fn ready_with(value: T) -> Future<T> {
        let inner = Arc::new(Inner { state: Mutex::new(State::Ready(value)), ready: Condvar::new() });
        Future { inner }
    }

    /// True if the value is available.
    pub fn ready(&self) -> bool {
        matches!(&*self.inner.state.lock().expect("future mutex poisoned"), State::Ready(_))
    }

    /// Returns the value. Panics if not yet [`Future::ready`] — ready-only
    /// accessor, as in the source.
    pub fn result(&self) -> T {
        match &*self.inner.state.lock().expect("future mutex poisoned") {
            State::Ready(value) => value.clone(),
            State::Pending(_) => panic!("result() called on a future that is not ready"),
        }
    }

    /// Spins calling `progress_fn` until ready, then returns the value.
    pub fn wait(&self, mut progress_fn: impl FnMut()) -> T {
        loop {
            if self.ready() {
                return self.result();
            }
            progress_fn();
        }
    }

    /// Chains `f` to run once this future is ready; returns a future for
    /// `f`'s result. If already ready, `f` runs immediately (on the
    /// calling thread, per the "current persona" default of §4.3).
    pub fn then<R, F>(&self, f: F) -> Future<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> R + Send + 'static,
    {
        let (future, promise) = Future::pending();
        self.attach(Box::new(move |value| promise.fulfill(f(value))));
        future
    }

    /// Like [`Future::then`], but `f` itself returns a future; the result
    /// is flattened rather than nesting `Future<Future<R>>`.
    pub fn then_flatten<R, F>(&self, f: F) -> Future<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> Future<R> + Send + 'static,
    {
        let (future, promise) = Future::pending();
        self.attach(Box::new(move |value| {
            let inner = f(value);
            inner.attach(Box::new(move |r| promise.fulfill(r)));
        }));
        future
    }

    fn attach(&self, continuation: Continuation<T>) {
        let mut state = self.inner.state.lock().expect("future mutex poisoned");
        match &mut *state {
            State::Pending(waiters) => waiters.push(continuation),
            State::Ready(value) => {
                let value = value.clone();
                drop(state);
                continuation(value);
            }
        }
    }
}

impl<T1, T2> Future<(T1, T2)>
where
    T1: Clone + Send + 'static,
    T2: Clone + Send + 'static,
{
    /// Aggregates two futures: ready once both inputs are, with their
    /// results paired (§4.3 `when_all`, two-argument case — Rust has no
    /// variadic futures, so wider aggregates are built by nesting pairs or
    /// via [`when_all`] over a homogeneous `Vec`).
    pub fn when_all2(a: &Future<T1>, b: &Future<T2>) -> Future<(T1, T2)> {
        let (future, promise) = Future::pending();
        let promise = Arc::new(Mutex::new(Some(promise)));
        let slot_a: Arc<Mutex<Option<T1>>> = Arc::new(Mutex::new(None));
        let slot_b: Arc<Mutex<Option<T2>>> = Arc::new(Mutex::new(None));

        let (pa, sa, sb) = (promise.clone(), slot_a.clone(), slot_b.clone());
        a.attach(Box::new(move |v| {
            *sa.lock().expect("slot mutex poisoned") = Some(v);
            maybe_complete(&pa, &sa, &sb);
        }));
        let (pb, sa2, sb2) = (promise, slot_a, slot_b);
        b.attach(Box::new(move |v| {
            *sb2.lock().expect("slot mutex poisoned") = Some(v);
            maybe_complete(&pb, &sa2, &sb2);
        }));

        fn maybe_complete<T1: Clone + Send + 'static, T2: Clone + Send + 'static>(
            promise: &Arc<Mutex<Option<Promise<(T1, T2)>>>>,
            slot_a: &Arc<Mutex<Option<T1>>>,
            slot_b: &Arc<Mutex<Option<T2>>>,
        ) {
            let a = slot_a.lock().expect("slot mutex poisoned").clone();
            let b = slot_b.lock().expect("slot mutex poisoned").clone();
            if let (Some(a), Some(b)) = (a, b) {
                if let Some(promise) = promise.lock().expect("promise mutex poisoned").take() {
                    promise.fulfill((a, b));
                }
            }
        }

        future
    }
}

/// Aggregates a homogeneous collection of futures into one future of their
/// collected results, ready once every input is (§4.3 `when_all`).
pub fn when_all<T: Clone + Send + 'static>(futures: Vec<Future<T>>) -> Future<Vec<T>> {
    let (future, promise) = Future::pending();
    let remaining = Arc::new(Mutex::new(futures.len()));
    let results: Arc<Mutex<Vec<Option<T>>>> = Arc::new(Mutex::new(vec![None; futures.len()]));
    let promise = Arc::new(Mutex::new(Some(promise)));

    if futures.is_empty() {
        promise.lock().expect("promise mutex poisoned").take().expect("just constructed").fulfill(Vec::new());
        return future;
    }

    for (index, input) in futures.iter().enumerate() {
        let remaining = remaining.clone();
        let results = results.clone();
        let promise = promise.clone();
        input.attach(Box::new(move |value| {
            results.lock().expect("results mutex poisoned")[index] = Some(value);
            let mut left = remaining.lock().expect("remaining mutex poisoned");
            *left -= 1;
            if *left == 0 {
                let collected = results.lock().expect("results mutex poisoned").drain(..).map(|v| v.expect("all slots filled when remaining hits zero")).collect();
                if let Some(promise) = promise.lock().expect("promise mutex poisoned").take() {
                    promise.fulfill(collected);
                }
            }
        }));
    }

    future
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Fulfills the promise, waking any [`Future::wait`]ers and running
    /// every attached continuation with the value.
    pub fn fulfill(self, value: T) {
        let waiters = {
            let mut state = self.inner.state.lock().expect("future mutex poisoned");
            let previous = std::mem::replace(&mut *state, State::Ready(value.clone()));
            match previous {
                State::Pending(waiters) => waiters,
                State::Ready(_) => panic!("promise fulfilled twice"),
            }
        };
        self.inner.ready.notify_all();
        for waiter in waiters {
            waiter(value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_with_is_immediately_ready() {
        let f = Future::ready_with(42u32);
        assert!(f.ready());
        assert_eq!(f.result(), 42);
    }

    #[test]
    fn then_on_a_ready_future_runs_immediately() {
        let f = Future::ready_with(10u32).then(|v| v * 2);
        assert!(f.ready());
        assert_eq!(f.result(), 20);
    }

    #[test]
    fn then_on_a_pending_future_runs_on_fulfillment() {
        let (future, promise) = Future::<u32>::pending();
        let doubled = future.then(|v| v * 2);
        assert!(!doubled.ready());
        promise.fulfill(21);
        assert!(doubled.ready());
        assert_eq!(doubled.result(), 42);
    }

    #[test]
    fn then_flatten_monad_law_holds_for_ready_futures() {
        // make_future(v).then(f) == f(v)
        let v = 5u32;
        let lhs = Future::ready_with(v).then_flatten(|x| Future::ready_with(x + 1));
        let rhs = Future::ready_with(v + 1);
        assert_eq!(lhs.result(), rhs.result());
    }

    #[test]
    fn when_all_waits_for_both_inputs() {
        let (fa, pa) = Future::<u32>::pending();
        let (fb, pb) = Future::<u32>::pending();
        let both = Future::when_all2(&fa, &fb);
        assert!(!both.ready());
        pa.fulfill(1);
        assert!(!both.ready());
        pb.fulfill(2);
        assert!(both.ready());
        assert_eq!(both.result(), (1, 2));
    }

    #[test]
    fn when_all_vec_collects_in_order() {
        let mut promises = Vec::new();
        let mut futures = Vec::new();
        for _ in 0..4 {
            let (f, p) = Future::<u32>::pending();
            futures.push(f);
            promises.push(p);
        }
        let all = when_all(futures);
        for (i, p) in promises.into_iter().enumerate() {
            p.fulfill(i as u32);
        }
        assert_eq!(all.result(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn wait_spins_until_fulfilled() {
        let (future, promise) = Future::<u32>::pending();
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(5));
            promise.fulfill(99);
        });
        let mut polls = 0;
        let value = future.wait(|| polls += 1);
        assert_eq!(value, 99);
        assert!(polls > 0);
    }
}
