//! Command rewriting applied right before every execution.

use std::fmt;
use std::sync::Arc;

use crate::command::SqlCommand;
use crate::error::SqlPipeError;

pub mod session_context;

pub use session_context::{ValueProvider, context_variable, rls};

/// A pure `SqlCommand -> SqlCommand` rewrite.
pub type CommandModifier =
    Arc<dyn Fn(SqlCommand) -> Result<SqlCommand, SqlPipeError> + Send + Sync>;

/// Modifiers applied left to right, each one receiving the previous one's output.
#[derive(Clone, Default)]
pub struct ModifierChain {
    modifiers: Vec<CommandModifier>,
}

impl fmt::Debug for ModifierChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModifierChain")
            .field("len", &self.modifiers.len())
            .finish()
    }
}

impl ModifierChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a modifier; earlier ones stay in place.
    pub fn push(&mut self, modifier: CommandModifier) {
        self.modifiers.push(modifier);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modifiers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }

    /// Run every modifier in registration order.
    ///
    /// # Errors
    /// Returns the first error raised by a modifier.
    pub fn apply(&self, command: SqlCommand) -> Result<SqlCommand, SqlPipeError> {
        self.modifiers
            .iter()
            .try_fold(command, |command, modifier| modifier(command))
    }
}
