use crate::params::{ParameterBinding, ParameterSet};
use crate::types::{CommandType, ParamValue, SqlType};

/// The command value handed to the driver: text or procedure name plus its parameters.
///
/// Modifiers receive and return this by value, so a rewritten command never aliases the
/// statement's configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlCommand {
    text: String,
    command_type: CommandType,
    params: ParameterSet,
}

impl SqlCommand {
    /// A plain SQL batch.
    #[must_use]
    pub fn text(sql: impl Into<String>) -> Self {
        Self {
            text: sql.into(),
            command_type: CommandType::Text,
            params: ParameterSet::new(),
        }
    }

    /// A stored procedure call.
    #[must_use]
    pub fn procedure(name: impl Into<String>) -> Self {
        Self {
            text: name.into(),
            command_type: CommandType::StoredProcedure,
            params: ParameterSet::new(),
        }
    }

    /// Attach a parameter, sized automatically.
    #[must_use]
    pub fn with_param(
        mut self,
        name: impl AsRef<str>,
        sql_type: SqlType,
        value: impl Into<ParamValue>,
    ) -> Self {
        self.params
            .add(ParameterBinding::new(name, sql_type, value, None));
        self
    }

    #[must_use]
    pub fn command_text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    #[must_use]
    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    #[must_use]
    pub fn is_text(&self) -> bool {
        self.command_type == CommandType::Text
    }
}
