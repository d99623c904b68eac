//! Change subscriptions.
//!
//! Every committed change runs one notification pass over a snapshot of the
//! registry, in registration order. Listeners added during a pass wait for the
//! next one; listeners removed during a pass are skipped.

use crate::diff::Diff;
use crate::error::{SelectorError, StoreError};
use crate::selector::Selector;
use crate::{get_at_path, Path, Value};
use parking_lot::Mutex;
use std::cell::OnceCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{trace, warn};

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) type Listener = Arc<dyn Fn(&Value, &Value) + Send + Sync>;
type Equality = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// Options for selector and path subscriptions.
///
/// ```
/// use arbor::SubscribeOptions;
/// use std::time::Duration;
///
/// let options = SubscribeOptions::new()
///     .immediate(true)
///     .debounce(Duration::from_millis(50))
///     .equality(|a, b| a["id"] == b["id"]);
/// # let _ = options;
/// ```
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    equality: Option<Equality>,
    debounce: Option<Duration>,
    immediate: bool,
}

impl SubscribeOptions {
    /// Structural equality, no debounce, no immediate call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide when the watched value counts as unchanged.
    ///
    /// For multi-selector subscriptions the function compares one member at
    /// a time.
    pub fn equality<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        self.equality = Some(Arc::new(f));
        self
    }

    /// Coalesce changes arriving within `window`.
    pub fn debounce(mut self, window: Duration) -> Self {
        self.debounce = Some(window);
        self
    }

    /// Call the listener once at registration with `(current, current)`.
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }
}

impl fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("custom_equality", &self.equality.is_some())
            .field("debounce", &self.debounce)
            .field("immediate", &self.immediate)
            .finish()
    }
}

pub(crate) enum Watch {
    State,
    Selector(Selector),
    Selectors(Vec<Selector>),
    Path(Path),
}

pub(crate) struct Subscription {
    id: u64,
    active: AtomicBool,
    watch: Watch,
    listener: Listener,
    equality: Option<Equality>,
    debounce: Option<Duration>,
    last: Mutex<Value>,
    baseline: Mutex<Option<Value>>,
}

impl Subscription {
    #[inline]
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn read(&self, root: &Value) -> Result<Value, SelectorError> {
        match &self.watch {
            Watch::State => Ok(root.clone()),
            Watch::Selector(selector) => selector.evaluate(root),
            Watch::Selectors(selectors) => selectors
                .iter()
                .map(|selector| selector.evaluate(root))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::from),
            Watch::Path(path) => Ok(get_at_path(root, path).cloned().unwrap_or(Value::Null)),
        }
    }

    fn equal(&self, a: &Value, b: &Value) -> bool {
        let eq = |x: &Value, y: &Value| match &self.equality {
            Some(f) => f(x, y),
            None => x == y,
        };
        match &self.watch {
            Watch::Selectors(_) => match (a.as_array(), b.as_array()) {
                (Some(xs), Some(ys)) => {
                    xs.len() == ys.len() && xs.iter().zip(ys.iter()).all(|(x, y)| eq(x, y))
                }
                _ => eq(a, b),
            },
            _ => eq(a, b),
        }
    }

    fn observe(
        self: &Arc<Self>,
        prev: &Value,
        next: &Value,
        diff: &OnceCell<Diff>,
        report: &dyn Fn(StoreError),
    ) {
        if let Watch::State = self.watch {
            (self.listener)(next, prev);
            return;
        }
        if let Watch::Path(path) = &self.watch {
            if !diff.get_or_init(|| Diff::between(prev, next)).affects(path) {
                return;
            }
        }

        let current = match self.read(next) {
            Ok(value) => value,
            Err(err) => {
                report(err.into());
                return;
            }
        };
        let previous = self.last.lock().clone();
        if self.equal(&previous, &current) {
            return;
        }
        *self.last.lock() = current.clone();
        self.deliver(current, previous);
    }

    fn deliver(self: &Arc<Self>, current: Value, old: Value) {
        let Some(window) = self.debounce else {
            (self.listener)(&current, &old);
            return;
        };

        {
            let mut baseline = self.baseline.lock();
            if baseline.is_some() {
                return;
            }
            *baseline = Some(old);
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let subscription = Arc::clone(self);
                handle.spawn(async move {
                    tokio::time::sleep(window).await;
                    subscription.flush_debounced();
                });
            }
            Err(_) => {
                warn!(
                    subscription = self.id,
                    "no tokio runtime for debounced subscription, notifying immediately"
                );
                self.flush_debounced();
            }
        }
    }

    fn flush_debounced(&self) {
        let Some(baseline) = self.baseline.lock().take() else {
            return;
        };
        if !self.is_active() {
            return;
        }
        let latest = self.last.lock().clone();
        if self.equal(&baseline, &latest) {
            trace!(subscription = self.id, "debounced change settled back");
            return;
        }
        (self.listener)(&latest, &baseline);
    }
}

/// Subscriptions of one store.
#[derive(Default)]
pub(crate) struct Registry {
    entries: Arc<Mutex<Vec<Arc<Subscription>>>>,
}

impl Registry {
    /// Register a subscription whose current value is read from `root`.
    pub(crate) fn add(
        &self,
        watch: Watch,
        listener: Listener,
        options: SubscribeOptions,
        root: &Value,
    ) -> Result<SubscriptionHandle, SelectorError> {
        let subscription = Arc::new(Subscription {
            id: NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed),
            active: AtomicBool::new(true),
            watch,
            listener,
            equality: options.equality,
            debounce: options.debounce,
            last: Mutex::new(Value::Null),
            baseline: Mutex::new(None),
        });
        let current = subscription.read(root)?;
        *subscription.last.lock() = current.clone();
        self.entries.lock().push(Arc::clone(&subscription));

        let handle = SubscriptionHandle {
            id: subscription.id,
            subscription: Some(Arc::clone(&subscription)),
            entries: Arc::downgrade(&self.entries),
        };
        if options.immediate {
            (subscription.listener)(&current, &current);
        }
        Ok(handle)
    }

    /// Run one notification pass for the change `prev` -> `next`.
    ///
    /// The pass stops early once `superseded` reports that a listener's own
    /// commit has already been delivered by a nested pass.
    pub(crate) fn notify(
        &self,
        prev: &Value,
        next: &Value,
        superseded: &dyn Fn() -> bool,
        report: &dyn Fn(StoreError),
    ) {
        let snapshot: Vec<Arc<Subscription>> = self.entries.lock().clone();
        let diff = OnceCell::new();
        for subscription in snapshot {
            if superseded() {
                trace!("notification pass superseded by a nested commit");
                break;
            }
            if subscription.is_active() {
                subscription.observe(prev, next, &diff, report);
            }
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Deactivate and drop every subscription.
    pub(crate) fn clear(&self) {
        let drained: Vec<_> = self.entries.lock().drain(..).collect();
        for subscription in drained {
            subscription.active.store(false, Ordering::Release);
        }
    }
}

/// Handle returned by the `subscribe*` methods.
///
/// Dropping the handle keeps the subscription alive; call
/// [`SubscriptionHandle::unsubscribe`] to remove it.
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: u64,
    subscription: Option<Arc<Subscription>>,
    entries: Weak<Mutex<Vec<Arc<Subscription>>>>,
}

impl SubscriptionHandle {
    /// A handle attached to nothing.
    pub(crate) fn inert() -> Self {
        Self {
            id: 0,
            subscription: None,
            entries: Weak::new(),
        }
    }

    /// Remove the subscription. Calling it again does nothing.
    pub fn unsubscribe(&self) {
        let Some(subscription) = &self.subscription else {
            return;
        };
        if !subscription.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(entries) = self.entries.upgrade() {
            entries.lock().retain(|s| s.id != self.id);
        }
    }

    /// Whether the subscription still receives notifications.
    pub fn is_active(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(|subscription| subscription.is_active())
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
