//! Admission requests and their validation.

use crate::error::AdmissionError;

/// One limiter named in an admission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitSpec {
    /// Store key of the limiter, e.g. `ratelimit/login/ip/1.2.3.4`
    pub key: String,
    /// Capacity consumed if the request is admitted
    pub cost: i64,
    /// Maximum burst the limiter retains
    pub capacity: i64,
}

impl LimitSpec {
    /// Create a limiter spec. Call [`LimitSpec::validate`] before use.
    pub fn new(key: impl Into<String>, cost: i64, capacity: i64) -> Self {
        Self {
            key: key.into(),
            cost,
            capacity,
        }
    }

    /// Check `0 <= cost <= capacity`.
    pub fn validate(&self) -> Result<(), AdmissionError> {
        let reason = if self.cost < 0 {
            "negative cost"
        } else if self.capacity < 0 {
            "negative capacity"
        } else if self.cost > self.capacity {
            "capacity is smaller than cost"
        } else {
            return Ok(());
        };

        Err(AdmissionError::Validation {
            limiter: self.key.clone(),
            reason,
        })
    }
}

/// A batch of limiters to be admitted together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmitRequest {
    /// Limiters in the batch, in request order
    pub limits: Vec<LimitSpec>,
    /// Explicit timestamp in nanoseconds; the engine's clock is used when absent
    pub now: Option<i64>,
}

impl AdmitRequest {
    /// Build a request from already-typed limiters, validating every one.
    pub fn new(limits: Vec<LimitSpec>, now: Option<i64>) -> Result<Self, AdmissionError> {
        let request = Self { limits, now };
        request.validate()?;
        Ok(request)
    }

    /// Parse command arguments of the form `(key cost capacity)+ [now]`.
    ///
    /// Every limiter is parsed and validated before this returns, so a
    /// returned request never needs to be checked again.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self, AdmissionError> {
        if args.len() < 3 {
            return Err(AdmissionError::Arity(format!(
                "expected at least one key cost capacity triple, got {} arguments",
                args.len()
            )));
        }

        let (triples, now) = match args.len() % 3 {
            0 => (args, None),
            1 => {
                let (triples, last) = args.split_at(args.len() - 1);
                let now = parse_int(last[0].as_ref()).ok_or(AdmissionError::ParseTimestamp)?;
                (triples, Some(now))
            }
            _ => {
                return Err(AdmissionError::Arity(format!(
                    "expected (key cost capacity)+ [now], got {} arguments",
                    args.len()
                )))
            }
        };

        let limits = triples
            .chunks_exact(3)
            .map(|triple| -> Result<LimitSpec, AdmissionError> {
                let key = triple[0].as_ref();
                let cost = parse_int(triple[1].as_ref()).ok_or_else(|| AdmissionError::Parse {
                    limiter: key.to_string(),
                    field: "cost",
                })?;
                let capacity =
                    parse_int(triple[2].as_ref()).ok_or_else(|| AdmissionError::Parse {
                        limiter: key.to_string(),
                        field: "capacity",
                    })?;
                let spec = LimitSpec::new(key, cost, capacity);
                spec.validate()?;
                Ok(spec)
            })
            .collect::<Result<Vec<_>, _>>()?;

        if limits.is_empty() {
            return Err(AdmissionError::Arity("at least one limiter is required".to_string()));
        }

        Ok(Self { limits, now })
    }

    /// Validate every limiter, failing on the first bad one.
    pub fn validate(&self) -> Result<(), AdmissionError> {
        if self.limits.is_empty() {
            return Err(AdmissionError::Arity("at least one limiter is required".to_string()));
        }
        self.limits.iter().try_for_each(LimitSpec::validate)
    }
}

fn parse_int(raw: &str) -> Option<i64> {
    raw.parse().ok()
}
