//! Parameter extraction: retriever + bitness policy + reinterpretation.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;

use super::retriever_for;
use crate::bitness::resolve_bitness;
use crate::error::{SnareError, SnareResult};
use crate::remote::{NativeType, Reinterpret, RemoteTypes, Value};
use crate::target::{TargetProcess, TargetThread};
use crate::types::{Bitness, BreakpointAddress};

/// Description of a hooked function: where it lives and what it takes
///
/// `arg_types` and `param_names` are kept as two lists because that is how
/// prototype sources deliver them (a type signature plus a separate list of
/// parameter names). They must have the same length; see
/// [`ArgumentExtractor::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionTarget
{
    /// Module exporting the function (e.g. `kernel32`)
    pub module: String,
    /// Function name (e.g. `CreateFileA`)
    pub function: String,
    /// Declared argument types, in order
    pub arg_types: Vec<NativeType>,
    /// Declared parameter names, in order
    pub param_names: Vec<String>,
}

impl FunctionTarget
{
    /// Describe a function with no parameters yet.
    pub fn new(module: impl Into<String>, function: impl Into<String>) -> Self
    {
        Self {
            module: module.into(),
            function: function.into(),
            arg_types: Vec::new(),
            param_names: Vec::new(),
        }
    }

    /// Append a parameter (name and type together).
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, ty: NativeType) -> Self
    {
        self.param_names.push(name.into());
        self.arg_types.push(ty);
        self
    }

    /// The symbolic breakpoint location `module!function`.
    #[must_use]
    pub fn symbol(&self) -> BreakpointAddress
    {
        BreakpointAddress::symbol(self.module.clone(), self.function.clone())
    }
}

/// Extracted arguments, in declared parameter order
///
/// Inserting a name that is already present replaces its value and keeps its
/// original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentSnapshot
{
    entries: SmallVec<[(String, Value); 8]>,
}

impl ArgumentSnapshot
{
    /// Create an empty snapshot.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Insert or replace (last write wins).
    pub fn insert(&mut self, name: impl Into<String>, value: Value)
    {
        let name = name.into();
        if let Some(slot) = self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            slot.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Value of a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value>
    {
        self.entries.iter().find(|(existing, _)| existing == name).map(|(_, value)| value)
    }

    /// Parameter names in order.
    pub fn names(&self) -> impl Iterator<Item = &str>
    {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// `(name, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)>
    {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of distinct parameters.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    /// Whether there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }
}

impl fmt::Display for ArgumentSnapshot
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

/// Produces an [`ArgumentSnapshot`] for a function at each stop
#[derive(Clone)]
pub struct ArgumentExtractor
{
    target: FunctionTarget,
    types: Arc<dyn Reinterpret>,
}

impl fmt::Debug for ArgumentExtractor
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("ArgumentExtractor").field("target", &self.target).finish_non_exhaustive()
    }
}

impl ArgumentExtractor
{
    /// Create an extractor using the default [`RemoteTypes`] reinterpreter.
    ///
    /// ## Errors
    ///
    /// `PrototypeMismatch` if the target's name and type lists differ in length.
    pub fn new(target: FunctionTarget) -> SnareResult<Self>
    {
        Self::with_types(target, Arc::new(RemoteTypes))
    }

    /// Create an extractor with a custom reinterpreter.
    ///
    /// ## Errors
    ///
    /// `PrototypeMismatch` if the target's name and type lists differ in length.
    pub fn with_types(target: FunctionTarget, types: Arc<dyn Reinterpret>) -> SnareResult<Self>
    {
        if target.param_names.len() != target.arg_types.len() {
            return Err(SnareError::PrototypeMismatch {
                function: target.symbol().to_string(),
                names: target.param_names.len(),
                types: target.arg_types.len(),
            });
        }
        Ok(Self { target, types })
    }

    /// The function this extractor describes.
    #[must_use]
    pub fn target(&self) -> &FunctionTarget
    {
        &self.target
    }

    /// Extract the arguments of the current stop.
    ///
    /// `debugger` is the bitness of the debugger process; together with the
    /// process and the thread's code segment it picks the calling convention.
    pub fn extract_arguments(
        &self,
        debugger: Bitness,
        process: &dyn TargetProcess,
        thread: &dyn TargetThread,
    ) -> SnareResult<ArgumentSnapshot>
    {
        let bitness = resolve_bitness(debugger, process, thread)?;
        self.extract_with(bitness, process, thread)
    }

    /// Extract assuming a given bitness, bypassing resolution.
    pub fn extract_with(
        &self,
        bitness: Bitness,
        process: &dyn TargetProcess,
        thread: &dyn TargetThread,
    ) -> SnareResult<ArgumentSnapshot>
    {
        let retriever = retriever_for(bitness);
        let mut snapshot = ArgumentSnapshot::new();
        let params = self.target.param_names.iter().zip(&self.target.arg_types);
        for (index, (name, ty)) in params.enumerate() {
            let raw = retriever.get_arg(index, process, thread)?;
            let value = self.types.reinterpret(raw, ty, bitness)?;
            snapshot.insert(name.as_str(), value);
        }
        debug!(function = %self.target.symbol(), %bitness, "extracted arguments: {snapshot}");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_snapshot_last_write_wins_keeps_position()
    {
        let mut snapshot = ArgumentSnapshot::new();
        snapshot.insert("a", Value::Unsigned(1));
        snapshot.insert("b", Value::Unsigned(2));
        snapshot.insert("a", Value::Unsigned(3));

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(snapshot.get("a"), Some(&Value::Unsigned(3)));
        assert_eq!(snapshot.to_string(), "a=0x3, b=0x2");
    }

    #[test]
    fn test_mismatched_prototype_fails_fast()
    {
        let mut target = FunctionTarget::new("kernel32", "CloseHandle").param("hObject", NativeType::UPtr);
        target.arg_types.push(NativeType::U32);

        let err = ArgumentExtractor::new(target).unwrap_err();
        match err {
            SnareError::PrototypeMismatch { function, names, types } => {
                assert_eq!(function, "kernel32!CloseHandle");
                assert_eq!(names, 1);
                assert_eq!(types, 2);
            }
            other => panic!("Expected PrototypeMismatch, got {other:?}"),
        }
    }
}
