//! Named actions and what their return value means.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dbot_core::{ActionRef, CallbackArg, RegistryError, Result};

use crate::context::Context;

/// Unit of bot logic, invoked by a handler match, a decoded callback token, a redirect, or the
/// awaiting-input continuation. Any `async fn(Context, Vec<CallbackArg>) -> Result<Outcome>`
/// closure is an action.
#[async_trait]
pub trait Action: Send + Sync {
    async fn run(&self, ctx: Context, args: Vec<CallbackArg>) -> Result<Outcome>;
}

#[async_trait]
impl<F, Fut> Action for F
where
    F: Fn(Context, Vec<CallbackArg>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Outcome>> + Send + 'static,
{
    async fn run(&self, ctx: Context, args: Vec<CallbackArg>) -> Result<Outcome> {
        (self)(ctx, args).await
    }
}

/// Return value of an action. The value is the control flow:
/// `Pass` keeps walking handlers, `Handled` stops, `Then` runs another callable with the same
/// context and `Redirect` runs a registered action by name, both resolving recursively.
#[derive(Clone, Default)]
pub enum Outcome {
    #[default]
    Pass,
    Handled,
    Then(Arc<dyn Action>),
    Redirect(ActionRef),
}

impl Outcome {
    pub fn then(action: impl Action + 'static) -> Self {
        Outcome::Then(Arc::new(action))
    }

    pub fn redirect(action: impl Into<ActionRef>) -> Self {
        Outcome::Redirect(action.into())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Outcome::Pass | Outcome::Handled)
    }
}

impl From<bool> for Outcome {
    fn from(handled: bool) -> Self {
        if handled {
            Outcome::Handled
        } else {
            Outcome::Pass
        }
    }
}

impl From<ActionRef> for Outcome {
    fn from(action: ActionRef) -> Self {
        Outcome::Redirect(action)
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pass => f.write_str("Pass"),
            Outcome::Handled => f.write_str("Handled"),
            Outcome::Then(_) => f.write_str("Then(..)"),
            Outcome::Redirect(name) => write!(f, "Redirect({})", name),
        }
    }
}

/// Name -> action table. Names are unique unless overriding is enabled, non-empty, and free of
/// whitespace so they can travel inside callback tokens.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
    allow_override: bool,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later registrations under an existing name replace the earlier action.
    pub fn allow_override(mut self, allow: bool) -> Self {
        self.allow_override = allow;
        self
    }

    pub fn register(
        &mut self,
        name: &ActionRef,
        action: Arc<dyn Action>,
    ) -> std::result::Result<(), RegistryError> {
        let name = name.name();
        if name.trim().is_empty() {
            return Err(RegistryError::Anonymous);
        }
        if name.chars().any(char::is_whitespace) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        if !self.allow_override && self.actions.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        self.actions.insert(name.to_string(), action);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop(_ctx: Context, _args: Vec<CallbackArg>) -> Result<Outcome> {
        Ok(Outcome::Pass)
    }

    #[test]
    fn test_duplicate_rejected_unless_override() {
        let name = ActionRef::new("clicked");
        let mut registry = ActionRegistry::new();
        registry.register(&name, Arc::new(noop)).unwrap();
        assert_eq!(
            registry.register(&name, Arc::new(noop)),
            Err(RegistryError::Duplicate("clicked".to_string()))
        );

        let mut registry = ActionRegistry::new().allow_override(true);
        registry.register(&name, Arc::new(noop)).unwrap();
        registry.register(&name, Arc::new(noop)).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_names_must_be_token_safe() {
        let mut registry = ActionRegistry::new();
        assert_eq!(
            registry.register(&ActionRef::new(""), Arc::new(noop)),
            Err(RegistryError::Anonymous)
        );
        assert_eq!(
            registry.register(&ActionRef::new("  "), Arc::new(noop)),
            Err(RegistryError::Anonymous)
        );
        assert!(matches!(
            registry.register(&ActionRef::new("two words"), Arc::new(noop)),
            Err(RegistryError::InvalidName(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_outcome_from_bool() {
        assert!(matches!(Outcome::from(true), Outcome::Handled));
        assert!(matches!(Outcome::from(false), Outcome::Pass));
        assert!(!Outcome::redirect(ActionRef::new("x")).is_terminal());
    }
}
