//! Caller-supplied value interception
//!
//! Every resolved value passes through the interception chain before it is
//! applied. An interceptor may leave the value alone, substitute another one,
//! or (illegally) return null. After a substitution the chain restarts from
//! the first interceptor with the new value, until a full pass leaves the
//! value unchanged.

use crate::error::{Result, TemplateError};
use crate::format::DocumentFormat;
use crate::model::Value;
use crate::options::TemplateOptions;
use log::trace;

/// Outcome of one interceptor call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interception {
    /// Keep the current value
    Unchanged,
    /// Use this value instead and run the chain again
    Replace(Value),
    /// No value; a contract violation that aborts generation
    Null,
}

/// Information about the placeholder being resolved
#[derive(Debug, Clone, Copy)]
pub struct InterceptContext<'a> {
    /// Upper-cased placeholder key
    pub key: &'a str,
    /// Raw instruction text
    pub instruction: &'a str,
    /// Format of the template
    pub format: DocumentFormat,
    /// Part holding the placeholder
    pub part: &'a str,
    /// Number of substitutions already made for this placeholder
    pub round: usize,
}

/// Value interceptor
pub trait Interceptor {
    /// Inspect (and optionally replace) a resolved value
    fn intercept(&self, value: &Value, ctx: &InterceptContext<'_>) -> Interception;
}

impl<F> Interceptor for F
where
    F: Fn(&Value, &InterceptContext<'_>) -> Interception,
{
    fn intercept(&self, value: &Value, ctx: &InterceptContext<'_>) -> Interception {
        self(value, ctx)
    }
}

/// Ordered interceptor pipeline
#[derive(Default)]
pub struct InterceptorChain {
    interceptors: Vec<Box<dyn Interceptor + Send + Sync>>,
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

impl InterceptorChain {
    /// Empty chain
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor
    pub fn push(&mut self, interceptor: impl Interceptor + Send + Sync + 'static) {
        self.interceptors.push(Box::new(interceptor));
    }

    /// Whether the chain has no interceptors
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run the chain until the value settles
    ///
    /// # Errors
    ///
    /// `InterceptorContractViolation` if an interceptor returns null,
    /// `InterceptionLimitExceeded` if a configured cap is hit.
    pub fn apply(
        &self,
        value: &Value,
        ctx: InterceptContext<'_>,
        options: &TemplateOptions,
    ) -> Result<Value> {
        let mut current = value.clone();
        let mut ctx = ctx;
        'rounds: loop {
            for interceptor in &self.interceptors {
                match interceptor.intercept(&current, &ctx) {
                    Interception::Unchanged => {}
                    Interception::Replace(next) => {
                        trace!("interceptor replaced value of {} (round {})", ctx.key, ctx.round);
                        current = next;
                        ctx.round += 1;
                        if let Some(max) = options.max_interception_rounds {
                            if ctx.round > max {
                                return Err(TemplateError::InterceptionLimitExceeded {
                                    key: ctx.key.to_string(),
                                    rounds: max,
                                });
                            }
                        }
                        continue 'rounds;
                    }
                    Interception::Null => {
                        return Err(TemplateError::InterceptorContractViolation(
                            ctx.key.to_string(),
                        ));
                    }
                }
            }
            return Ok(current);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> InterceptContext<'static> {
        InterceptContext {
            key: "NAME",
            instruction: " MERGEFIELD NAME ",
            format: DocumentFormat::Docx,
            part: "word/document.xml",
            round: 0,
        }
    }

    #[test]
    fn test_empty_chain_passes_through() {
        let chain = InterceptorChain::new();
        let v = chain
            .apply(&Value::from("Ada"), ctx(), &TemplateOptions::default())
            .unwrap();
        assert_eq!(v, Value::from("Ada"));
    }

    #[test]
    fn test_replacement_reenters_chain() {
        let mut chain = InterceptorChain::new();
        // Upper-cases once; the second pass sees the upper-cased text and settles
        chain.push(|v: &Value, _: &InterceptContext<'_>| match v {
            Value::Text(t) if t.text != t.text.to_uppercase() => {
                Interception::Replace(Value::from(t.text.to_uppercase()))
            }
            _ => Interception::Unchanged,
        });
        chain.push(|v: &Value, c: &InterceptContext<'_>| match v {
            Value::Text(t) if c.round == 1 => Interception::Replace(Value::from(format!("{}!", t.text))),
            _ => Interception::Unchanged,
        });
        let v = chain
            .apply(&Value::from("ada"), ctx(), &TemplateOptions::default())
            .unwrap();
        assert_eq!(v, Value::from("ADA!"));
    }

    #[test]
    fn test_null_is_contract_violation() {
        let mut chain = InterceptorChain::new();
        chain.push(|_: &Value, _: &InterceptContext<'_>| Interception::Null);
        let err = chain
            .apply(&Value::from("x"), ctx(), &TemplateOptions::default())
            .unwrap_err();
        assert!(matches!(err, TemplateError::InterceptorContractViolation(k) if k == "NAME"));
    }

    #[test]
    fn test_round_cap() {
        let mut chain = InterceptorChain::new();
        chain.push(|_: &Value, _: &InterceptContext<'_>| Interception::Replace(Value::from("again")));
        let opts = TemplateOptions::default().with_max_interception_rounds(Some(5));
        let err = chain.apply(&Value::from("x"), ctx(), &opts).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::InterceptionLimitExceeded { rounds: 5, .. }
        ));
    }
}
