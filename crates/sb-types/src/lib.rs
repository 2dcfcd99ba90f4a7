//! sb-types: cross-crate stable contracts (issue codes reported by config validation).
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Stable issue codes reported by group config validation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    // ----- Validation / Schema -----
    UnknownField,
    MissingRequired,
    TypeMismatch,
    RangeExceeded,
    InvalidEnum,
    DuplicateTag,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        use IssueCode::*;
        match self {
            UnknownField => "UnknownField",
            MissingRequired => "MissingRequired",
            TypeMismatch => "TypeMismatch",
            RangeExceeded => "RangeExceeded",
            InvalidEnum => "InvalidEnum",
            DuplicateTag => "DuplicateTag",
        }
    }
}

impl Display for IssueCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validation finding: what went wrong and where (JSON pointer).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub code: IssueCode,
    pub ptr: String,
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl Issue {
    pub fn new(code: IssueCode, ptr: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            code,
            ptr: ptr.into(),
            msg: msg.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl Display for Issue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.ptr, self.msg)?;
        if let Some(h) = &self.hint {
            write!(f, " (hint: {})", h)?;
        }
        Ok(())
    }
}
