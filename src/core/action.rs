//! Actions: named, shareable zero-argument callables.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

const ANONYMOUS: &str = "anonymous";

type ActionFn = dyn Fn() + Send + Sync + 'static;

/// A registered zero-argument callable.
///
/// Cloning an `Action` shares the same callable, and equality is identity:
/// two actions compare equal only when they point at the same allocation.
/// Two separately built actions wrapping identical closures are different
/// actions.
#[derive(Clone)]
pub struct Action {
    name: Cow<'static, str>,
    callback: Arc<ActionFn>,
}

impl Action {
    pub fn new<F>(name: impl Into<Cow<'static, str>>, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            callback: Arc::new(callback),
        }
    }

    pub fn anonymous<F>(callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::new(ANONYMOUS, callback)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the callable.
    pub fn call(&self) {
        (self.callback)();
    }

    pub fn same_as(&self, other: &Action) -> bool {
        Arc::ptr_eq(&self.callback, &other.callback)
    }

    fn address(&self) -> *const () {
        Arc::as_ptr(&self.callback) as *const ()
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for Action {}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("at", &self.address())
            .finish()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:p}", self.name, self.address())
    }
}

/// Render action names as `[a, b, c]`.
pub fn action_names_to_string(actions: &[Action]) -> String {
    let names: Vec<&str> = actions.iter().map(Action::name).collect();
    format!("[{}]", names.join(", "))
}
