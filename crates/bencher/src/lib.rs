//! Inputs for the parameter unification benchmarks.

/// How big an input is, used to label benchmark groups.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaseSize {
    Small,
    Normal,
    Large,
}

impl CaseSize {
    pub fn label(self) -> &'static str {
        match self {
            CaseSize::Small => "small",
            CaseSize::Normal => "normal",
            CaseSize::Large => "large",
        }
    }
}

/// The request part an input is fed through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamsSource {
    Query,
    Form,
    /// Multipart body delimited by the given boundary.
    Multipart { boundary: &'static str },
    Json,
}

/// One benchmark input: a resource file and the source it is parsed as.
#[derive(Clone, Copy, Debug)]
pub struct ParamsCase {
    resource: &'static str,
    input: &'static str,
    size: CaseSize,
    source: ParamsSource,
}

impl ParamsCase {
    pub const fn query(resource: &'static str, input: &'static str, size: CaseSize) -> Self {
        Self { resource, input, size, source: ParamsSource::Query }
    }

    pub const fn form(resource: &'static str, input: &'static str, size: CaseSize) -> Self {
        Self { resource, input, size, source: ParamsSource::Form }
    }

    pub const fn multipart(resource: &'static str, input: &'static str, size: CaseSize, boundary: &'static str) -> Self {
        Self { resource, input, size, source: ParamsSource::Multipart { boundary } }
    }

    pub const fn json(resource: &'static str, input: &'static str, size: CaseSize) -> Self {
        Self { resource, input, size, source: ParamsSource::Json }
    }

    /// `<size>_<source>`, e.g. `large_json`.
    pub fn id(&self) -> String {
        let source = match self.source {
            ParamsSource::Query => "query",
            ParamsSource::Form => "form",
            ParamsSource::Multipart { .. } => "multipart",
            ParamsSource::Json => "json",
        };
        format!("{}_{source}", self.size.label())
    }

    pub fn resource(&self) -> &'static str {
        self.resource
    }

    pub fn input(&self) -> &'static str {
        self.input
    }

    pub fn size(&self) -> CaseSize {
        self.size
    }

    pub fn source(&self) -> ParamsSource {
        self.source
    }
}
