//! Mapping functions: numeric domain to `[0, 1]` transforms.
//!
//! Number-valued columns normalize their raw values through a
//! [`MappingFunction`]. Two variants exist:
//!
//! - [`ScaleMapping`]: linear, log, sqrt and power scales, clamped
//! - [`ScriptMapping`]: a user expression evaluated by a restricted
//!   arithmetic evaluator (see [`script`])
//!
//! Mapping functions are values; columns hand out clones, never references
//! into their own state.

pub mod scale;
pub mod script;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use scale::{ScaleKind, ScaleMapping};
pub use script::{Script, ScriptEnv};

/// Default code of a new script mapping.
pub const DEFAULT_SCRIPT: &str = "return this.linear(value,this.value_min,this.value_max);";

/// Serialized form of a mapping function.
///
/// Scales dump as `{type, domain, range}`, scripts as
/// `{type: "script", code, domain}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingDump {
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub domain: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub range: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

fn default_kind() -> String {
    "linear".to_string()
}

/// A script-based mapping function.
#[derive(Debug, Clone)]
pub struct ScriptMapping {
    code: String,
    domain: [f64; 2],
    compiled: Option<Script>,
}

impl PartialEq for ScriptMapping {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.domain == other.domain
    }
}

impl ScriptMapping {
    /// Create a script mapping. Code that does not compile maps every value to NaN.
    pub fn new(code: impl Into<String>, domain: [f64; 2]) -> Self {
        let code = code.into();
        let compiled = match Script::compile(&code) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(target: lineup_core::logging::targets::COLUMN, error = %e, "invalid mapping script");
                None
            }
        };
        Self {
            code,
            domain,
            compiled,
        }
    }

    /// Create a script mapping, failing on code that does not compile.
    pub fn compile(code: impl Into<String>, domain: [f64; 2]) -> Result<Self> {
        let code = code.into();
        let compiled = Script::compile(&code)?;
        Ok(Self {
            code,
            domain,
            compiled: Some(compiled),
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn domain(&self) -> [f64; 2] {
        self.domain
    }

    /// Whether the code compiled.
    pub fn is_valid(&self) -> bool {
        self.compiled.is_some()
    }

    /// Evaluate the script, clamping to `[0, 1]`. Non-finite results are NaN.
    pub fn apply(&self, value: f64) -> f64 {
        let Some(script) = &self.compiled else {
            return f64::NAN;
        };
        let r = script.eval(&ScriptEnv {
            value,
            value_min: self.domain[0],
            value_max: self.domain[1],
        });
        if r.is_finite() {
            r.clamp(0.0, 1.0)
        } else {
            f64::NAN
        }
    }
}

/// A numeric domain to `[0, 1]` transform.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingFunction {
    Scale(ScaleMapping),
    Script(ScriptMapping),
}

impl Default for MappingFunction {
    fn default() -> Self {
        Self::Scale(ScaleMapping::default())
    }
}

impl MappingFunction {
    /// A linear mapping of `domain` onto `[0, 1]`.
    pub fn linear(domain: [f64; 2]) -> Self {
        Self::Scale(ScaleMapping::linear(domain))
    }

    /// Map a raw value.
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            Self::Scale(s) => s.apply(value),
            Self::Script(s) => s.apply(value),
        }
    }

    /// Map a normalized value back onto the domain.
    ///
    /// Scripts have no inverse; they invert linearly over their domain.
    pub fn invert(&self, value: f64) -> f64 {
        match self {
            Self::Scale(s) => s.invert(value),
            Self::Script(s) => s.domain[0] + value * (s.domain[1] - s.domain[0]),
        }
    }

    /// The input domain.
    pub fn domain(&self) -> Vec<f64> {
        match self {
            Self::Scale(s) => s.domain().to_vec(),
            Self::Script(s) => s.domain.to_vec(),
        }
    }

    /// Copy with a different input domain.
    pub fn with_domain(&self, domain: [f64; 2]) -> Self {
        match self {
            Self::Scale(s) => Self::Scale(s.with_domain(domain.to_vec())),
            Self::Script(s) => Self::Script(ScriptMapping {
                domain,
                ..s.clone()
            }),
        }
    }

    /// Tolerant equality: scales compare stops within 1e-4, scripts by code and domain.
    pub fn approx_eq(&self, other: &MappingFunction) -> bool {
        match (self, other) {
            (Self::Scale(a), Self::Scale(b)) => a.approx_eq(b),
            (Self::Script(a), Self::Script(b)) => a == b,
            _ => false,
        }
    }

    pub fn dump(&self) -> MappingDump {
        match self {
            Self::Scale(s) => MappingDump {
                kind: s.kind().as_str().to_string(),
                domain: s.domain().to_vec(),
                range: s.range().to_vec(),
                code: None,
            },
            Self::Script(s) => MappingDump {
                kind: "script".to_string(),
                domain: s.domain.to_vec(),
                range: Vec::new(),
                code: Some(s.code.clone()),
            },
        }
    }

    /// Rebuild from a dump. Unknown scale types fall back to linear.
    pub fn restore(dump: &MappingDump) -> Self {
        if dump.kind == "script" {
            let domain = match dump.domain.as_slice() {
                [a, b, ..] => [*a, *b],
                _ => [0.0, 1.0],
            };
            let code = dump.code.clone().unwrap_or_else(|| DEFAULT_SCRIPT.to_string());
            return Self::Script(ScriptMapping::new(code, domain));
        }
        let kind = dump.kind.parse().unwrap_or_else(|e: String| {
            tracing::warn!(target: lineup_core::logging::targets::DUMP, "{e}, using linear");
            ScaleKind::Linear
        });
        let range = if dump.range.is_empty() {
            vec![0.0, 1.0]
        } else {
            dump.range.clone()
        };
        Self::Scale(ScaleMapping::new(kind, dump.domain.clone(), range))
    }

    /// Build the initial mapping of a number column from its description:
    /// an explicit `map`, else `domain`/`range`, else linear `[0, 1]`.
    pub fn from_desc(
        map: Option<&MappingDump>,
        domain: Option<&[f64]>,
        range: Option<&[f64]>,
    ) -> Self {
        if let Some(map) = map {
            return Self::restore(map);
        }
        match (domain, range) {
            (None, None) => Self::default(),
            (domain, range) => Self::Scale(ScaleMapping::new(
                ScaleKind::Linear,
                domain.map_or_else(|| vec![0.0, 1.0], <[f64]>::to_vec),
                range.map_or_else(|| vec![0.0, 1.0], <[f64]>::to_vec),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_dump_restore_round_trip() {
        let m = MappingFunction::Scale(ScaleMapping::new(
            ScaleKind::Sqrt,
            vec![0.0, 50.0],
            vec![1.0, 0.0],
        ));
        let dump = m.dump();
        assert_eq!(dump.kind, "sqrt");
        let restored = MappingFunction::restore(&dump);
        assert!(restored.approx_eq(&m));
        assert_eq!(restored.dump(), dump);
    }

    #[test]
    fn test_script_dump_format() {
        let m = MappingFunction::Script(ScriptMapping::new(DEFAULT_SCRIPT, [0.0, 10.0]));
        let json = serde_json::to_value(m.dump()).ok();
        assert_eq!(
            json,
            Some(serde_json::json!({"type": "script", "domain": [0.0, 10.0], "code": DEFAULT_SCRIPT}))
        );
        assert_eq!(m.apply(2.5), 0.25);
        assert_eq!(m.apply(20.0), 1.0);
    }

    #[test]
    fn test_invalid_script_maps_to_nan_but_round_trips() {
        let m = MappingFunction::Script(ScriptMapping::new("alert('x')", [0.0, 1.0]));
        assert!(m.apply(0.5).is_nan());
        assert_eq!(MappingFunction::restore(&m.dump()), m);
        assert!(ScriptMapping::compile("alert('x')", [0.0, 1.0]).is_err());
    }

    #[test]
    fn test_non_finite_script_result_is_nan() {
        let m = ScriptMapping::new("1 / (value - value)", [0.0, 1.0]);
        assert!(m.apply(0.3).is_nan());
    }

    #[test]
    fn test_from_desc_defaults() {
        let m = MappingFunction::from_desc(None, Some(&[0.0, 100.0]), None);
        assert_eq!(m.apply(50.0), 0.5);
        assert_eq!(MappingFunction::from_desc(None, None, None), MappingFunction::default());
    }
}
