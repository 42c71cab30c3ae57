//! Stable action identity.

use std::borrow::{Borrow, Cow};
use std::fmt;

/// Name of a registered action. Declared once as a constant so the name that ends up inside
/// callback tokens stays the same across restarts:
///
/// ```
/// use dbot_callback::ActionRef;
///
/// const OPEN_FORM: ActionRef = ActionRef::new("openForm");
/// assert_eq!(OPEN_FORM.name(), "openForm");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionRef(Cow<'static, str>);

impl ActionRef {
    pub const fn new(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Builds a ref from a runtime string (e.g. a name read back from user state).
    pub fn owned(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ActionRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ActionRef {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<String> for ActionRef {
    fn from(name: String) -> Self {
        Self::owned(name)
    }
}
