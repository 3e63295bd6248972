//! Session-context injection for row-level security predicates.
//!
//! The command is wrapped between two `sp_set_session_context` calls so that
//! `SESSION_CONTEXT(N'key')` is visible to the statement without the caller's SQL knowing
//! about it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::command::SqlCommand;
use crate::error::SqlPipeError;
use crate::params::ParameterBinding;
use crate::types::{ParamValue, SqlType};

use super::CommandModifier;

/// Supplies the context value at execution time.
pub type ValueProvider = Arc<dyn Fn() -> Option<String> + Send + Sync>;

static NEXT_SUFFIX: AtomicU64 = AtomicU64::new(0);

/// Size of `sysname`, the type of session-context keys.
const KEY_SIZE: i32 = 128;

/// `sql_variant` cannot hold `MAX` types, so context values stay inline.
const VALUE_SIZE_LIMIT: usize = 4000;

/// Row-level security variable: set for the statement and cleared right after it.
#[must_use]
pub fn rls(key: impl Into<String>, value: ValueProvider) -> CommandModifier {
    context_variable(key, value, false)
}

/// Set `key` in the session context around every execution of the command.
///
/// Read-only variables are not cleared afterwards because the server refuses to change a
/// read-only key for the rest of the session.
#[must_use]
pub fn context_variable(
    key: impl Into<String>,
    value: ValueProvider,
    read_only: bool,
) -> CommandModifier {
    let key = key.into();
    Arc::new(move |command| wrap(command, &key, value(), read_only))
}

fn wrap(
    mut command: SqlCommand,
    key: &str,
    value: Option<String>,
    read_only: bool,
) -> Result<SqlCommand, SqlPipeError> {
    if !command.is_text() {
        return Err(SqlPipeError::UnsupportedCommandShape(format!(
            "session context variable '{key}' can only wrap text commands, not procedure '{}'",
            command.command_text()
        )));
    }

    let value_size = match &value {
        Some(v) if v.chars().count() > VALUE_SIZE_LIMIT => {
            return Err(SqlPipeError::ParameterError(format!(
                "session context value for '{key}' exceeds {VALUE_SIZE_LIMIT} characters"
            )));
        }
        Some(v) => (v.chars().count() / 100 + 1) * 100,
        None => 100,
    };
    let value_size = i32::try_from(value_size.min(VALUE_SIZE_LIMIT)).unwrap_or(4000);

    let suffix = NEXT_SUFFIX.fetch_add(1, Ordering::Relaxed);
    let key_param = format!("@__ctx_key_{suffix}");
    let value_param = format!("@__ctx_value_{suffix}");

    let mut text = format!("EXEC sp_set_session_context @key = {key_param}, @value = {value_param}");
    if read_only {
        text.push_str(", @read_only = 1");
    }
    text.push_str(";\n");
    text.push_str(command.command_text());
    if !read_only {
        text.push_str(&format!(
            "\n;EXEC sp_set_session_context @key = {key_param}, @value = NULL;"
        ));
    }
    command.set_text(text);

    let params = command.params_mut();
    params.add(ParameterBinding::new(
        &key_param,
        SqlType::NVarChar,
        key,
        Some(KEY_SIZE),
    ));
    params.add(ParameterBinding::new(
        &value_param,
        SqlType::NVarChar,
        value.map_or(ParamValue::Null, ParamValue::Text),
        Some(value_size),
    ));
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifier::ModifierChain;

    fn provider(value: &'static str) -> ValueProvider {
        Arc::new(move || Some(value.to_string()))
    }

    #[test]
    fn wraps_text_and_adds_parameters() {
        let modifier = rls("TenantId", provider("42"));
        let command = SqlCommand::text("SELECT * FROM Orders FOR JSON PATH")
            .with_param("status", SqlType::Int, 1);
        let out = modifier(command).unwrap();

        let text = out.command_text();
        assert!(text.starts_with("EXEC sp_set_session_context @key = @__ctx_key_"));
        assert!(text.contains("\nSELECT * FROM Orders FOR JSON PATH\n"));
        assert!(text.ends_with("@value = NULL;"));
        assert_eq!(out.params().len(), 3);

        let values: Vec<_> = out.params().iter().map(|p| p.value().clone()).collect();
        assert!(values.contains(&ParamValue::Text("TenantId".into())));
        assert!(values.contains(&ParamValue::Text("42".into())));
    }

    #[test]
    fn read_only_variables_are_not_cleared() {
        let modifier = context_variable("UserId", provider("7"), true);
        let out = modifier(SqlCommand::text("SELECT 1")).unwrap();
        assert!(out.command_text().contains("@read_only = 1"));
        assert!(!out.command_text().contains("@value = NULL"));
    }

    #[test]
    fn missing_value_binds_null() {
        let modifier = rls("TenantId", Arc::new(|| -> Option<String> { None }));
        let out = modifier(SqlCommand::text("SELECT 1")).unwrap();
        assert!(out.params().iter().any(|p| p.value().is_null()));
    }

    #[test]
    fn long_values_stay_inline_or_are_rejected() {
        let at_limit = "x".repeat(4000);
        let modifier = context_variable("Claims", Arc::new(move || Some(at_limit.clone())), false);
        let out = modifier(SqlCommand::text("SELECT 1")).unwrap();
        let value = out
            .params()
            .iter()
            .find(|p| p.name().starts_with("@__ctx_value_"))
            .unwrap();
        assert_eq!(value.declaration(), "NVARCHAR(4000)");

        let modifier = rls("Claims", Arc::new(|| Some("x".repeat(4001))));
        let err = modifier(SqlCommand::text("SELECT 1")).unwrap_err();
        assert!(matches!(err, SqlPipeError::ParameterError(_)));
    }

    #[test]
    fn procedures_cannot_be_wrapped() {
        let modifier = rls("TenantId", provider("1"));
        let err = modifier(SqlCommand::procedure("dbo.GetOrders")).unwrap_err();
        assert!(matches!(err, SqlPipeError::UnsupportedCommandShape(_)));
    }

    #[test]
    fn two_variables_get_distinct_parameter_names() {
        let mut chain = ModifierChain::new();
        chain.push(rls("TenantId", provider("1")));
        chain.push(rls("Region", provider("eu")));
        let out = chain.apply(SqlCommand::text("SELECT 1")).unwrap();

        assert_eq!(out.params().len(), 4);
        let names: std::collections::HashSet<_> =
            out.params().iter().map(ParameterBinding::name).collect();
        assert_eq!(names.len(), 4);
        assert_eq!(out.command_text().matches("sp_set_session_context").count(), 4);
    }
}
