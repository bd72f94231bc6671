//! Search space definitions and the configuration <-> vector encoding.
//!
//! A [`Space`] is an ordered list of named [`Dimension`]s. Every configuration
//! drawn from a space maps to a fixed-length numeric vector:
//!
//! - continuous dimensions contribute one scalar normalised to `[0, 1]`
//!   (after a log transform for [`Scale::Log`]),
//! - discrete and categorical dimensions contribute a one-hot block with one
//!   slot per value.
//!
//! The mapping depends only on the space, so `encode`/`decode` are stateless.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::errors::SpaceError;

/// A configuration: parameter name -> concrete value.
pub type Configuration = HashMap<String, ParameterValue>;

/// Relative slack allowed when encoding values that sit on a bound.
const BOUND_TOLERANCE: f64 = 1e-9;

/// How a continuous dimension is normalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    #[default]
    Linear,
    /// Normalised in log-space; requires a positive lower bound.
    Log,
}

/// Definition of a single parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Dimension {
    /// Real-valued range `[low, high]`.
    Continuous {
        low: f64,
        high: f64,
        #[serde(default)]
        scale: Scale,
    },
    /// Ordered numeric values (e.g. batch sizes).
    Discrete { values: Vec<f64> },
    /// Unordered choices.
    Categorical { values: Vec<serde_json::Value> },
}

/// A concrete parameter value produced by sampling or decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Float(f64),
    Int(i64),
    Json(serde_json::Value),
}

impl ParameterValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Json(v) => v.as_f64(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Json(v) => v.as_str(),
            _ => None,
        }
    }

    fn matches_json(&self, other: &serde_json::Value) -> bool {
        match self {
            Self::Json(v) => json_eq(v, other),
            Self::Float(v) => other.as_f64() == Some(*v),
            Self::Int(v) => other.as_i64() == Some(*v) || other.as_f64() == Some(*v as f64),
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        Self::Json(serde_json::Value::from(v))
    }
}

fn json_eq(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

impl Dimension {
    /// Number of vector slots this dimension occupies.
    pub fn width(&self) -> usize {
        match self {
            Self::Continuous { .. } => 1,
            Self::Discrete { values } => values.len(),
            Self::Categorical { values } => values.len(),
        }
    }

    fn validate(&self, name: &str) -> Result<(), SpaceError> {
        match self {
            Self::Continuous { low, high, scale } => {
                // The span must be representable too, or sampling and
                // normalisation overflow.
                if !low.is_finite() || !high.is_finite() || !(high - low).is_finite() || low >= high
                {
                    return Err(SpaceError::InvalidBounds {
                        name: name.to_string(),
                        low: *low,
                        high: *high,
                    });
                }
                if *scale == Scale::Log {
                    if *low <= 0.0 {
                        return Err(SpaceError::InvalidLogBounds {
                            name: name.to_string(),
                            low: *low,
                        });
                    }
                    let span = high.ln() - low.ln();
                    if !span.is_finite() || span <= 0.0 {
                        return Err(SpaceError::InvalidBounds {
                            name: name.to_string(),
                            low: *low,
                            high: *high,
                        });
                    }
                }
                Ok(())
            }
            Self::Discrete { values } => {
                if values.is_empty() {
                    return Err(SpaceError::EmptyValues {
                        name: name.to_string(),
                    });
                }
                if values.iter().any(|v| !v.is_finite()) {
                    return Err(SpaceError::NonFiniteValue {
                        name: name.to_string(),
                    });
                }
                Ok(())
            }
            Self::Categorical { values } => {
                if values.is_empty() {
                    return Err(SpaceError::EmptyValues {
                        name: name.to_string(),
                    });
                }
                Ok(())
            }
        }
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterValue {
        match self {
            Self::Continuous {
                low,
                high,
                scale: Scale::Linear,
            } => ParameterValue::Float(rng.random_range(*low..=*high)),
            Self::Continuous {
                low,
                high,
                scale: Scale::Log,
            } => {
                let log_val: f64 = rng.random_range(low.ln()..=high.ln());
                ParameterValue::Float(log_val.exp().clamp(*low, *high))
            }
            Self::Discrete { values } => {
                ParameterValue::Float(values[rng.random_range(0..values.len())])
            }
            Self::Categorical { values } => {
                ParameterValue::Json(values[rng.random_range(0..values.len())].clone())
            }
        }
    }

    /// Normalised position of a continuous value, `None` for other kinds.
    fn normalize(&self, value: f64) -> Option<f64> {
        match self {
            Self::Continuous {
                low,
                high,
                scale: Scale::Linear,
            } => Some((value - low) / (high - low)),
            Self::Continuous {
                low,
                high,
                scale: Scale::Log,
            } => {
                if value <= 0.0 {
                    return Some(f64::NEG_INFINITY);
                }
                Some((value.ln() - low.ln()) / (high.ln() - low.ln()))
            }
            _ => None,
        }
    }

    /// Index of `value` within a discrete/categorical value list.
    fn index_of(&self, name: &str, value: &ParameterValue) -> Result<usize, SpaceError> {
        let found = match self {
            Self::Discrete { values } => {
                let v = value.as_f64().ok_or_else(|| SpaceError::TypeMismatch {
                    name: name.to_string(),
                    expected: "numeric",
                })?;
                values
                    .iter()
                    .position(|x| (x - v).abs() <= BOUND_TOLERANCE * x.abs().max(1.0))
            }
            Self::Categorical { values } => values.iter().position(|x| value.matches_json(x)),
            Self::Continuous { .. } => None,
        };
        found.ok_or_else(|| SpaceError::ValueNotInSpace {
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    fn unit_position(&self, name: &str, value: &ParameterValue) -> Result<f64, SpaceError> {
        let v = value.as_f64().ok_or_else(|| SpaceError::TypeMismatch {
            name: name.to_string(),
            expected: "numeric",
        })?;
        let u = self.normalize(v).unwrap_or(f64::NAN);
        if !(-BOUND_TOLERANCE..=1.0 + BOUND_TOLERANCE).contains(&u) {
            return Err(SpaceError::ValueNotInSpace {
                name: name.to_string(),
                value: value.to_string(),
            });
        }
        Ok(u.clamp(0.0, 1.0))
    }

    fn encode_into(
        &self,
        name: &str,
        value: &ParameterValue,
        out: &mut Vec<f64>,
    ) -> Result<(), SpaceError> {
        match self {
            Self::Continuous { .. } => out.push(self.unit_position(name, value)?),
            Self::Discrete { .. } | Self::Categorical { .. } => {
                let idx = self.index_of(name, value)?;
                let start = out.len();
                out.resize(start + self.width(), 0.0);
                out[start + idx] = 1.0;
            }
        }
        Ok(())
    }

    fn decode(&self, slots: &[f64]) -> ParameterValue {
        match self {
            Self::Continuous { low, high, scale } => {
                let u = slots[0].clamp(0.0, 1.0);
                let value = match scale {
                    Scale::Linear => low + u * (high - low),
                    Scale::Log => (low.ln() + u * (high.ln() - low.ln())).exp(),
                };
                ParameterValue::Float(value.clamp(*low, *high))
            }
            Self::Discrete { values } => ParameterValue::Float(values[argmax(slots)]),
            Self::Categorical { values } => ParameterValue::Json(values[argmax(slots)].clone()),
        }
    }

    fn distance(
        &self,
        name: &str,
        a: &ParameterValue,
        b: &ParameterValue,
    ) -> Result<f64, SpaceError> {
        match self {
            Self::Continuous { .. } => {
                Ok((self.unit_position(name, a)? - self.unit_position(name, b)?).abs())
            }
            Self::Discrete { values } => {
                if values.len() < 2 {
                    return Ok(0.0);
                }
                let (i, j) = (self.index_of(name, a)?, self.index_of(name, b)?);
                Ok(i.abs_diff(j) as f64 / (values.len() - 1) as f64)
            }
            Self::Categorical { .. } => {
                let same = self.index_of(name, a)? == self.index_of(name, b)?;
                Ok(if same { 0.0 } else { 1.0 })
            }
        }
    }
}

/// First index of the largest slot.
fn argmax(slots: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in slots.iter().enumerate() {
        if *v > slots[best] {
            best = i;
        }
    }
    best
}

/// A named parameter dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Human-readable parameter name (e.g. "learning_rate").
    pub name: String,
    pub dimension: Dimension,
}

/// The full search space: an ordered, validated list of parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ParameterDef>", into = "Vec<ParameterDef>")]
pub struct Space {
    parameters: Vec<ParameterDef>,
    width: usize,
}

impl Space {
    /// Validate and build a space. Fails on the first malformed dimension.
    pub fn new(parameters: Vec<ParameterDef>) -> Result<Self, SpaceError> {
        if parameters.is_empty() {
            return Err(SpaceError::Empty);
        }
        let mut seen = HashSet::new();
        for param in &parameters {
            if !seen.insert(param.name.as_str()) {
                return Err(SpaceError::DuplicateParameter {
                    name: param.name.clone(),
                });
            }
            param.dimension.validate(&param.name)?;
        }
        let width = parameters.iter().map(|p| p.dimension.width()).sum();
        Ok(Self { parameters, width })
    }

    pub fn builder() -> SpaceBuilder {
        SpaceBuilder::default()
    }

    pub fn parameters(&self) -> &[ParameterDef] {
        &self.parameters
    }

    /// Length of encoded vectors.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Draw one configuration uniformly at random.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Configuration {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.dimension.sample(rng)))
            .collect()
    }

    pub fn encode(&self, config: &Configuration) -> Result<Vec<f64>, SpaceError> {
        if let Some(unknown) = config
            .keys()
            .find(|k| !self.parameters.iter().any(|p| &p.name == *k))
        {
            return Err(SpaceError::UnknownParameter {
                name: unknown.clone(),
            });
        }

        let mut out = Vec::with_capacity(self.width);
        for param in &self.parameters {
            let value = config
                .get(&param.name)
                .ok_or_else(|| SpaceError::MissingParameter {
                    name: param.name.clone(),
                })?;
            param.dimension.encode_into(&param.name, value, &mut out)?;
        }
        Ok(out)
    }

    /// Inverse of [`Space::encode`]. One-hot blocks decode to their largest
    /// slot, so any vector of the right width yields a valid configuration.
    pub fn decode(&self, vector: &[f64]) -> Result<Configuration, SpaceError> {
        if vector.len() != self.width {
            return Err(SpaceError::VectorLength {
                expected: self.width,
                got: vector.len(),
            });
        }

        let mut config = Configuration::with_capacity(self.parameters.len());
        let mut offset = 0;
        for param in &self.parameters {
            let width = param.dimension.width();
            let value = param.dimension.decode(&vector[offset..offset + width]);
            config.insert(param.name.clone(), value);
            offset += width;
        }
        Ok(config)
    }

    /// Mean per-dimension normalised difference, in `[0, 1]`.
    pub fn distance(&self, a: &Configuration, b: &Configuration) -> Result<f64, SpaceError> {
        let mut total = 0.0;
        for param in &self.parameters {
            let lookup = |c: &Configuration| {
                c.get(&param.name)
                    .cloned()
                    .ok_or_else(|| SpaceError::MissingParameter {
                        name: param.name.clone(),
                    })
            };
            total += param
                .dimension
                .distance(&param.name, &lookup(a)?, &lookup(b)?)?;
        }
        Ok(total / self.parameters.len() as f64)
    }
}

impl TryFrom<Vec<ParameterDef>> for Space {
    type Error = SpaceError;

    fn try_from(parameters: Vec<ParameterDef>) -> Result<Self, Self::Error> {
        Self::new(parameters)
    }
}

impl From<Space> for Vec<ParameterDef> {
    fn from(space: Space) -> Self {
        space.parameters
    }
}

/// Chainable space builder; validation happens in [`SpaceBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct SpaceBuilder {
    parameters: Vec<ParameterDef>,
}

impl SpaceBuilder {
    fn push(mut self, name: impl Into<String>, dimension: Dimension) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            dimension,
        });
        self
    }

    pub fn continuous(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.push(
            name,
            Dimension::Continuous {
                low,
                high,
                scale: Scale::Linear,
            },
        )
    }

    pub fn log_continuous(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.push(
            name,
            Dimension::Continuous {
                low,
                high,
                scale: Scale::Log,
            },
        )
    }

    pub fn discrete(self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.push(name, Dimension::Discrete { values })
    }

    /// Discrete dimension over the inclusive integer range `[low, high]`.
    pub fn int_range(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        let values = (low..=high).map(|v| v as f64).collect();
        self.discrete(name, values)
    }

    pub fn categorical<V: Into<serde_json::Value>>(
        self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.push(name, Dimension::Categorical { values })
    }

    pub fn build(self) -> Result<Space, SpaceError> {
        Space::new(self.parameters)
    }
}
