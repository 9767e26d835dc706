//! Error types and reporting

use crate::span::Span;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, CompileError>;

/// Lowering error
///
/// Every variant names the operator being lowered. The span is empty when the
/// error leaves the lowering layer; the surface layer fills it in with
/// [`CompileError::with_span`] before reporting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("{op}: invalid operands of type {lhs} and {rhs}")]
    IncompatibleType {
        op: &'static str,
        lhs: String,
        rhs: String,
        span: Option<Span>,
    },

    #[error("{op}: type error: {message}")]
    Type {
        op: &'static str,
        message: String,
        span: Option<Span>,
    },

    #[error("{op}: {message}")]
    Value {
        op: &'static str,
        message: String,
        span: Option<Span>,
    },

    #[error("{op}: shape error: {message}")]
    Shape {
        op: &'static str,
        message: String,
        /// Axis at which two shapes disagree, when there is one
        axis: Option<usize>,
        span: Option<Span>,
    },

    /// A type combination no rule covers, or a stale value handle.
    /// Indicates a compiler bug rather than a bad kernel.
    #[error("{op}: internal compiler error: {message}")]
    Internal {
        op: &'static str,
        message: String,
        span: Option<Span>,
    },
}

impl CompileError {
    pub fn incompatible(op: &'static str, lhs: impl ToString, rhs: impl ToString) -> Self {
        Self::IncompatibleType {
            op,
            lhs: lhs.to_string(),
            rhs: rhs.to_string(),
            span: None,
        }
    }

    pub fn type_error(op: &'static str, message: impl Into<String>) -> Self {
        Self::Type {
            op,
            message: message.into(),
            span: None,
        }
    }

    pub fn value_error(op: &'static str, message: impl Into<String>) -> Self {
        Self::Value {
            op,
            message: message.into(),
            span: None,
        }
    }

    pub fn shape_error(op: &'static str, message: impl Into<String>, axis: Option<usize>) -> Self {
        Self::Shape {
            op,
            message: message.into(),
            axis,
            span: None,
        }
    }

    pub fn internal(op: &'static str, message: impl Into<String>) -> Self {
        Self::Internal {
            op,
            message: message.into(),
            span: None,
        }
    }

    /// Attach a source location
    pub fn with_span(mut self, at: Span) -> Self {
        match &mut self {
            Self::IncompatibleType { span, .. }
            | Self::Type { span, .. }
            | Self::Value { span, .. }
            | Self::Shape { span, .. }
            | Self::Internal { span, .. } => *span = Some(at),
        }
        self
    }

    /// Re-label the error with the operator that triggered a shared helper
    pub fn with_op(mut self, name: &'static str) -> Self {
        match &mut self {
            Self::IncompatibleType { op, .. }
            | Self::Type { op, .. }
            | Self::Value { op, .. }
            | Self::Shape { op, .. }
            | Self::Internal { op, .. } => *op = name,
        }
        self
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Self::IncompatibleType { span, .. }
            | Self::Type { span, .. }
            | Self::Value { span, .. }
            | Self::Shape { span, .. }
            | Self::Internal { span, .. } => *span,
        }
    }

    pub fn op(&self) -> &'static str {
        match self {
            Self::IncompatibleType { op, .. }
            | Self::Type { op, .. }
            | Self::Value { op, .. }
            | Self::Shape { op, .. }
            | Self::Internal { op, .. } => op,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::IncompatibleType { lhs, rhs, .. } => {
                format!("invalid operands of type {lhs} and {rhs}")
            }
            Self::Type { message, .. }
            | Self::Value { message, .. }
            | Self::Shape { message, .. }
            | Self::Internal { message, .. } => message.clone(),
        }
    }

    /// True for errors that point at a gap in the rule tables
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::IncompatibleType { .. } => "Incompatible type",
            Self::Type { .. } => "Type",
            Self::Value { .. } => "Value",
            Self::Shape { .. } => "Shape",
            Self::Internal { .. } => "Internal",
        }
    }
}

/// Report error with ariadne
pub fn report_error(filename: &str, source: &str, error: &CompileError) {
    use ariadne::{Color, Label, Report, ReportKind, Source};

    let kind = error.kind();
    let result = if let Some(span) = error.span() {
        Report::build(ReportKind::Error, (filename, span.start..span.end))
            .with_message(format!("{kind} error in `{}`", error.op()))
            .with_label(
                Label::new((filename, span.start..span.end))
                    .with_message(error.message())
                    .with_color(Color::Red),
            )
            .finish()
            .eprint((filename, Source::from(source)))
    } else {
        Report::build(ReportKind::Error, (filename, 0..0))
            .with_message(format!("{kind} error in `{}`: {}", error.op(), error.message()))
            .finish()
            .eprint((filename, Source::from(source)))
    };

    if let Err(e) = result {
        log::error!("failed to render diagnostic: {e}");
    }
}
