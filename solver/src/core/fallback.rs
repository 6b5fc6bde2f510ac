//! Best-effort resolution of model output.
//!
//! Every place that interprets free-form model text follows the same ladder: a
//! local parse, then one extraction call to the model, then a fixed default.

use anyhow::Result;

/// Which rung of the ladder produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Primary,
    Extracted,
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub tier: Tier,
}

impl<T> Resolved<T> {
    pub fn into_value(self) -> T {
        self.value
    }
}

/// Resolve a value from `primary`, else `extract`, else `default`.
///
/// `extract` runs only when `primary` is `None`; `default` only when both miss.
/// Errors from `extract` propagate (backend failures are not parse failures).
pub fn best_effort<T>(
    primary: Option<T>,
    extract: impl FnOnce() -> Result<Option<T>>,
    default: impl FnOnce() -> T,
) -> Result<Resolved<T>> {
    if let Some(value) = primary {
        return Ok(Resolved {
            value,
            tier: Tier::Primary,
        });
    }
    if let Some(value) = extract()? {
        return Ok(Resolved {
            value,
            tier: Tier::Extracted,
        });
    }
    Ok(Resolved {
        value: default(),
        tier: Tier::Default,
    })
}
