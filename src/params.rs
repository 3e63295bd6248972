use crate::types::{ParamValue, SqlType};

/// A named, typed parameter attached to a pending command.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterBinding {
    name: String,
    sql_type: SqlType,
    value: ParamValue,
    size: Option<i32>,
}

impl ParameterBinding {
    /// Create a binding; the name is normalized to start with `@`.
    #[must_use]
    pub fn new(
        name: impl AsRef<str>,
        sql_type: SqlType,
        value: impl Into<ParamValue>,
        size: Option<i32>,
    ) -> Self {
        Self {
            name: normalize_name(name.as_ref()),
            sql_type,
            value: value.into(),
            size,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    #[must_use]
    pub fn value(&self) -> &ParamValue {
        &self.value
    }

    /// Size as supplied by the caller.
    #[must_use]
    pub fn size(&self) -> Option<i32> {
        self.size
    }

    /// Size used when declaring the parameter.
    ///
    /// Variable-length text without an explicit size is rounded up to the next multiple of
    /// 100 strictly above the value's length, so plans for similar values get reused.
    #[must_use]
    pub fn effective_size(&self) -> Option<i32> {
        if self.size.is_some() || !self.sql_type.is_variable_length_text() {
            return self.size;
        }
        let len = self.value.length();
        let rounded = (len / 100 + 1) * 100;
        Some(i32::try_from(rounded).unwrap_or(crate::types::SIZE_MAX))
    }

    /// Full T-SQL declaration of the parameter's type.
    #[must_use]
    pub fn declaration(&self) -> String {
        self.sql_type.declaration(self.effective_size())
    }
}

fn normalize_name(name: &str) -> String {
    if name.starts_with('@') {
        name.to_string()
    } else {
        format!("@{name}")
    }
}

/// Ordered bag of parameter bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    bindings: Vec<ParameterBinding>,
}

impl ParameterSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding. A binding with the same name is replaced in place and keeps the
    /// spelling it was first added with.
    pub fn add(&mut self, binding: ParameterBinding) {
        match self
            .bindings
            .iter_mut()
            .find(|existing| existing.name.eq_ignore_ascii_case(&binding.name))
        {
            Some(existing) => {
                existing.sql_type = binding.sql_type;
                existing.value = binding.value;
                existing.size = binding.size;
            }
            None => self.bindings.push(binding),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParameterBinding> {
        let name = normalize_name(name);
        self.bindings
            .iter()
            .find(|binding| binding.name.eq_ignore_ascii_case(&name))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ParameterBinding> {
        self.bindings.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a ParameterBinding;
    type IntoIter = std::slice::Iter<'a, ParameterBinding>;

    fn into_iter(self) -> Self::IntoIter {
        self.bindings.iter()
    }
}
