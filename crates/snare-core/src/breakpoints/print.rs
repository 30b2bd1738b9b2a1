//! Print breakpoints: render a template every time the trap fires.
//!
//! The template is filled from a context with these keys:
//!
//! | key      | value                                  |
//! |----------|----------------------------------------|
//! | `dbg`    | [`Session::describe`]                  |
//! | `exc`    | the exception record                   |
//! | `proc`   | [`TargetProcess::describe`]            |
//! | `thread` | [`TargetThread::describe`]             |
//! | `ctx`    | the register snapshot                  |
//!
//! An enrichment function may add keys (or replace the ones above). The
//! template syntax is `{key}`, with `{{` and `}}` for literal braces.
//!
//! [`Session::describe`]: crate::session::Session::describe
//! [`TargetProcess::describe`]: crate::target::TargetProcess::describe
//! [`TargetThread::describe`]: crate::target::TargetThread::describe

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};

use tracing::debug;

use super::{Applicability, Breakpoint, BreakpointKind, Stop, TriggerOutcome};
use crate::error::{SnareError, SnareResult};
use crate::types::{BreakpointAddress, ThreadContext};

/// Extra template keys computed at each hit
pub type Enrichment = Box<dyn Fn(&Stop<'_>, &ThreadContext) -> SnareResult<BTreeMap<String, String>> + Send>;

/// Breakpoint that writes a formatted line on each hit
pub struct PrintBreakpoint
{
    address: BreakpointAddress,
    template: String,
    enrichment: Option<Enrichment>,
    sink: Box<dyn Write + Send>,
}

impl PrintBreakpoint
{
    /// Print breakpoint at `address` writing to stdout.
    pub fn new(address: impl Into<BreakpointAddress>, template: impl Into<String>) -> Self
    {
        Self {
            address: address.into(),
            template: template.into(),
            enrichment: None,
            sink: Box::new(io::stdout()),
        }
    }

    /// Add keys to the context with `enrichment`.
    #[must_use]
    pub fn with_enrichment<F>(mut self, enrichment: F) -> Self
    where
        F: Fn(&Stop<'_>, &ThreadContext) -> SnareResult<BTreeMap<String, String>> + Send + 'static,
    {
        self.enrichment = Some(Box::new(enrichment));
        self
    }

    /// Write rendered lines to `sink` instead of stdout.
    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn Write + Send>) -> Self
    {
        self.sink = sink;
        self
    }

    /// The template being rendered.
    #[must_use]
    pub fn template(&self) -> &str
    {
        &self.template
    }

    /// Build the format context for `stop`.
    pub fn context(&self, stop: &Stop<'_>) -> SnareResult<BTreeMap<String, String>>
    {
        let registers = stop.thread.registers()?;

        let mut context = BTreeMap::new();
        context.insert("dbg".to_string(), stop.session.describe());
        context.insert("exc".to_string(), stop.exception.to_string());
        context.insert("proc".to_string(), stop.process.describe());
        context.insert("thread".to_string(), stop.thread.describe());
        context.insert("ctx".to_string(), registers.to_string());

        if let Some(enrichment) = &self.enrichment {
            context.extend(enrichment(stop, &registers)?);
        }
        Ok(context)
    }
}

impl fmt::Debug for PrintBreakpoint
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("PrintBreakpoint")
            .field("address", &self.address)
            .field("template", &self.template)
            .field("enrichment", &self.enrichment.is_some())
            .finish_non_exhaustive()
    }
}

impl Breakpoint for PrintBreakpoint
{
    fn address(&self) -> &BreakpointAddress
    {
        &self.address
    }

    fn kind(&self) -> BreakpointKind
    {
        BreakpointKind::PRINT
    }

    fn applicability(&self) -> Applicability
    {
        Applicability::ProcessOnly
    }

    fn trigger(&mut self, stop: &mut Stop<'_>) -> SnareResult<TriggerOutcome>
    {
        let context = self.context(stop)?;
        let line = render_template(&self.template, &context)?;
        debug!(address = %self.address, "print breakpoint: {line}");

        writeln!(self.sink, "{line}")?;
        self.sink.flush()?;
        Ok(None)
    }
}

/// Substitute `{key}` placeholders in `template` with values from `context`.
///
/// ## Errors
///
/// `Template` for an unknown key, an unclosed `{` or a stray `}`.
pub fn render_template(template: &str, context: &BTreeMap<String, String>) -> SnareResult<String>
{
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => {
                            return Err(SnareError::Template(format!("unclosed '{{' in {template:?}")));
                        }
                        Some(k) => key.push(k),
                    }
                }
                let value = context
                    .get(key.trim())
                    .ok_or_else(|| SnareError::Template(format!("unknown key {{{key}}}")))?;
                out.push_str(value);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(SnareError::Template(format!("unmatched '}}' in {template:?}"))),
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn context() -> BTreeMap<String, String>
    {
        let mut context = BTreeMap::new();
        context.insert("proc".to_string(), "<process pid=7>".to_string());
        context.insert("n".to_string(), "3".to_string());
        context
    }

    #[test]
    fn test_render_substitutes_keys()
    {
        let out = render_template("{proc} hit {n} times", &context()).unwrap();
        assert_eq!(out, "<process pid=7> hit 3 times");
    }

    #[test]
    fn test_render_escaped_braces()
    {
        let out = render_template("{{{n}}} {{}}", &context()).unwrap();
        assert_eq!(out, "{3} {}");
    }

    #[test]
    fn test_render_unknown_key()
    {
        let err = render_template("{missing}", &context()).unwrap_err();
        assert!(matches!(err, SnareError::Template(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_render_unbalanced()
    {
        assert!(render_template("{proc", &context()).is_err());
        assert!(render_template("proc}", &context()).is_err());
        assert!(render_template("{pr{oc}", &context()).is_err());
    }

    #[test]
    fn test_render_plain_text()
    {
        assert_eq!(render_template("no placeholders", &context()).unwrap(), "no placeholders");
    }
}
