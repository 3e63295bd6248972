use std::borrow::Cow;

/// Byte encoding applied to text cells, prefix, suffix and text defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputEncoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl OutputEncoding {
    #[must_use]
    pub fn encode<'a>(self, text: &'a str) -> Cow<'a, [u8]> {
        match self {
            OutputEncoding::Utf8 => Cow::Borrowed(text.as_bytes()),
            OutputEncoding::Utf16Le => {
                Cow::Owned(text.encode_utf16().flat_map(u16::to_le_bytes).collect())
            }
            OutputEncoding::Utf16Be => {
                Cow::Owned(text.encode_utf16().flat_map(u16::to_be_bytes).collect())
            }
        }
    }
}

/// Output written when the query produced no output at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultOutput {
    Text(String),
    Binary(Vec<u8>),
}

/// Per-call streaming options.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamOptions {
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub default_output: Option<DefaultOutput>,
    pub encoding: OutputEncoding,
}

impl StreamOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    #[must_use]
    pub fn default_text(mut self, output: impl Into<String>) -> Self {
        self.default_output = Some(DefaultOutput::Text(output.into()));
        self
    }

    #[must_use]
    pub fn default_binary(mut self, output: impl Into<Vec<u8>>) -> Self {
        self.default_output = Some(DefaultOutput::Binary(output.into()));
        self
    }

    #[must_use]
    pub fn encoding(mut self, encoding: OutputEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub(crate) fn encoded_prefix(&self) -> Cow<'_, [u8]> {
        self.prefix
            .as_deref()
            .map_or(Cow::Borrowed(&[][..]), |p| self.encoding.encode(p))
    }

    pub(crate) fn encoded_suffix(&self) -> Cow<'_, [u8]> {
        self.suffix
            .as_deref()
            .map_or(Cow::Borrowed(&[][..]), |s| self.encoding.encode(s))
    }

    pub(crate) fn encoded_default(&self) -> Option<Cow<'_, [u8]>> {
        match &self.default_output {
            Some(DefaultOutput::Text(text)) => Some(self.encoding.encode(text)),
            Some(DefaultOutput::Binary(bytes)) => Some(Cow::Borrowed(bytes.as_slice())),
            None => None,
        }
    }
}
