//! Dispatch middleware.
//!
//! Middleware wraps partial-state dispatches. Each middleware receives the
//! action, the state before the dispatch and a [`Next`] handle. Calling
//! [`Next::run`] hands the (possibly rewritten) action to the rest of the
//! chain; returning without calling it aborts the dispatch.

use crate::error::BoxError;
use crate::Value;
use std::sync::Arc;

/// One link of the dispatch chain.
pub trait Middleware: Send + Sync {
    /// Inspect or rewrite `action`, then continue with `next` or abort.
    fn handle(&self, action: Value, prev: &Value, next: Next<'_>) -> Result<(), BoxError>;
}

/// The remainder of the chain.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    prev: &'a Value,
    out: &'a mut Option<Value>,
}

impl Next<'_> {
    /// Continue the chain with `action`.
    pub fn run(self, action: Value) -> Result<(), BoxError> {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle(
                action,
                self.prev,
                Next {
                    chain: rest,
                    prev: self.prev,
                    out: self.out,
                },
            ),
            None => {
                *self.out = Some(action);
                Ok(())
            }
        }
    }
}

/// Run `action` through `chain`. `Ok(None)` means a middleware aborted.
pub(crate) fn run_chain(
    chain: &[Arc<dyn Middleware>],
    action: Value,
    prev: &Value,
) -> Result<Option<Value>, BoxError> {
    let mut out = None;
    Next {
        chain,
        prev,
        out: &mut out,
    }
    .run(action)?;
    Ok(out)
}

/// Middleware backed by a closure. See [`middleware_fn`].
pub struct FnMiddleware<F>(F);

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(Value, &Value, Next<'_>) -> Result<(), BoxError> + Send + Sync,
{
    fn handle(&self, action: Value, prev: &Value, next: Next<'_>) -> Result<(), BoxError> {
        (self.0)(action, prev, next)
    }
}

/// Wrap a closure as middleware.
///
/// ```
/// use arbor::{middleware_fn, Value};
///
/// let passthrough = middleware_fn(|action: Value, _prev: &Value, next| next.run(action));
/// # let _ = passthrough;
/// ```
pub fn middleware_fn<F>(f: F) -> FnMiddleware<F>
where
    F: Fn(Value, &Value, Next<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
{
    FnMiddleware(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn test_empty_chain_passes_action_through() {
        let out = run_chain(&[], Value::from(json!({"a": 1})), &Value::object()).unwrap();
        assert_eq!(out.unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_chain_runs_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = {
            let seen = seen.clone();
            middleware_fn(move |action, _prev, next| {
                seen.lock().push("first");
                next.run(action)
            })
        };
        let second = {
            let seen = seen.clone();
            middleware_fn(move |action, _prev, next| {
                seen.lock().push("second");
                next.run(action)
            })
        };
        let items: Vec<Arc<dyn Middleware>> = vec![Arc::new(first), Arc::new(second)];
        run_chain(&items, Value::object(), &Value::object()).unwrap();
        assert_eq!(*seen.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_middleware_can_rewrite_and_abort() {
        let rewrite = middleware_fn(|_action, _prev, next| next.run(Value::from(json!({"b": 2}))));
        let items: Vec<Arc<dyn Middleware>> = vec![Arc::new(rewrite)];
        let out = run_chain(&items, Value::from(json!({"a": 1})), &Value::object()).unwrap();
        assert_eq!(out.unwrap(), json!({"b": 2}));

        let abort = middleware_fn(|_action, _prev, _next| Ok(()));
        let items: Vec<Arc<dyn Middleware>> = vec![Arc::new(abort)];
        let out = run_chain(&items, Value::object(), &Value::object()).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_middleware_sees_prev_state() {
        let guard = middleware_fn(|action, prev: &Value, next| {
            if prev["locked"] == true {
                return Err("state is locked".into());
            }
            next.run(action)
        });
        let items: Vec<Arc<dyn Middleware>> = vec![Arc::new(guard)];
        let locked = Value::from(json!({"locked": true}));
        let err = run_chain(&items, Value::object(), &locked).unwrap_err();
        assert_eq!(err.to_string(), "state is locked");
    }
}
