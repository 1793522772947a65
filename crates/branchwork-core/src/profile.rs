//! Step profiles: a step function name plus its bound arguments.
//!
//! A [`StepProfile`] is immutable once built and compares structurally.
//! Callers describe what they want with [`StepArgs`], which is either an
//! existing profile (used verbatim) or a [`StepCall`] that may name an
//! explicit step function and falls back to the owner's default.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single argument bound into a step profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StepArg {
    /// Signed integer argument.
    Int(i64),
    /// Floating-point argument.
    Float(f64),
    /// Boolean argument.
    Bool(bool),
    /// Text argument.
    Text(String),
}

impl StepArg {
    /// Numeric view of the argument. Integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer view of the argument.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean view of the argument.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Text view of the argument.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for StepArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<i64> for StepArg {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for StepArg {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for StepArg {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for StepArg {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for StepArg {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for StepArg {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

// ── StepProfile ────────────────────────────────────────────────────

/// Immutable description of a step function plus bound arguments.
///
/// The function is referenced by name so that a profile can cross a
/// process boundary and be resolved by the simpack on the other side.
/// Two profiles are equal when function, positional and keyword
/// arguments all match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepProfile {
    function: String,
    args: Vec<StepArg>,
    kwargs: BTreeMap<String, StepArg>,
}

impl StepProfile {
    /// A profile calling `function` with no arguments.
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        }
    }

    /// Resolve caller-supplied arguments into a profile.
    ///
    /// An existing profile is returned unchanged, so wrapping a profile
    /// is idempotent. Otherwise the call's explicit function is used, or
    /// `default_function` when none was given.
    pub fn build(default_function: &str, args: impl Into<StepArgs>) -> Self {
        match args.into() {
            StepArgs::Profile(profile) => profile,
            StepArgs::Call(call) => Self {
                function: call
                    .function
                    .unwrap_or_else(|| default_function.to_owned()),
                args: call.args,
                kwargs: call.kwargs,
            },
        }
    }

    /// Name of the step function.
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Positional arguments in call order.
    pub fn args(&self) -> &[StepArg] {
        &self.args
    }

    /// Keyword arguments, sorted by name.
    pub fn kwargs(&self) -> &BTreeMap<String, StepArg> {
        &self.kwargs
    }

    /// Positional argument `index`, if bound.
    pub fn arg(&self, index: usize) -> Option<&StepArg> {
        self.args.get(index)
    }

    /// Keyword argument `name`, if bound.
    pub fn kwarg(&self, name: &str) -> Option<&StepArg> {
        self.kwargs.get(name)
    }

    /// Numeric keyword argument `name`, or `default` when absent or not numeric.
    pub fn kwarg_f64(&self, name: &str, default: f64) -> f64 {
        self.kwarg(name).and_then(StepArg::as_f64).unwrap_or(default)
    }

    /// Numeric positional argument `index`, or `default` when absent or not numeric.
    pub fn arg_f64(&self, index: usize, default: f64) -> f64 {
        self.arg(index).and_then(StepArg::as_f64).unwrap_or(default)
    }
}

impl fmt::Display for StepProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function)?;
        let mut first = true;
        for arg in &self.args {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
            first = false;
        }
        for (name, arg) in &self.kwargs {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{name}={arg}")?;
            first = false;
        }
        write!(f, ")")
    }
}

// ── StepArgs / StepCall ────────────────────────────────────────────

/// Arguments for a step function that has not been resolved yet.
///
/// Built fluently; an unset function means "the owner's default".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepCall {
    function: Option<String>,
    args: Vec<StepArg>,
    kwargs: BTreeMap<String, StepArg>,
}

impl StepCall {
    /// An empty call: default function, no arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// A call to an explicit step function.
    pub fn function(name: impl Into<String>) -> Self {
        Self {
            function: Some(name.into()),
            ..Self::default()
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<StepArg>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Bind a keyword argument, replacing any earlier binding of `name`.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<StepArg>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }
}

/// Everything a caller may pass where a step profile is expected.
#[derive(Clone, Debug, PartialEq)]
pub enum StepArgs {
    /// An already-built profile, used verbatim.
    Profile(StepProfile),
    /// Arguments to be resolved against a default step function.
    Call(StepCall),
}

impl Default for StepArgs {
    fn default() -> Self {
        Self::Call(StepCall::default())
    }
}

impl From<StepProfile> for StepArgs {
    fn from(profile: StepProfile) -> Self {
        Self::Profile(profile)
    }
}

impl From<&StepProfile> for StepArgs {
    fn from(profile: &StepProfile) -> Self {
        Self::Profile(profile.clone())
    }
}

impl From<StepCall> for StepArgs {
    fn from(call: StepCall) -> Self {
        Self::Call(call)
    }
}

impl From<()> for StepArgs {
    fn from(_: ()) -> Self {
        Self::default()
    }
}
