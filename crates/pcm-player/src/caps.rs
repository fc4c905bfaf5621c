//! Device capability validation.
//!
//! Every parameter is checked against the range the device reports, and every violation is
//! collected so a single run reports all of them rather than stopping at the first.

use std::fmt;

use crate::backend::{CapabilityQuery, CapabilityRange, PcmBackend};
use crate::error::PlayError;
use crate::params::{ParamKind, StreamParameters};

/// Which side of the supported range a value fell on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bound {
    Min(u32),
    Max(u32),
}

/// One requested value outside the device's supported range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamViolation {
    pub kind: ParamKind,
    pub requested: u32,
    pub bound: Bound,
}

impl fmt::Display for ParamViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = self.kind.unit();
        let (op, limit) = match self.bound {
            Bound::Min(v) => (">=", v),
            Bound::Max(v) => ("<=", v),
        };
        write!(
            f,
            "{} is {}{unit}, device only supports {op} {limit}{unit}",
            self.kind.label(),
            self.requested
        )
    }
}

/// Outcome of checking one parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamCheck {
    pub range: CapabilityRange,
    pub requested: u32,
}

impl ParamCheck {
    /// Violations for this parameter (both bounds are checked independently).
    pub fn violations(&self) -> impl Iterator<Item = ParamViolation> + '_ {
        let below = (self.requested < self.range.min).then_some(Bound::Min(self.range.min));
        let above = (self.requested > self.range.max).then_some(Bound::Max(self.range.max));
        below.into_iter().chain(above).map(|bound| ParamViolation {
            kind: self.range.kind,
            requested: self.requested,
            bound,
        })
    }

    pub fn passed(&self) -> bool {
        self.range.contains(self.requested)
    }
}

/// Per-parameter results for one device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationReport {
    pub checks: Vec<ParamCheck>,
}

impl ValidationReport {
    /// `true` when every parameter is within range.
    pub fn is_playable(&self) -> bool {
        self.checks.iter().all(ParamCheck::passed)
    }

    pub fn violations(&self) -> Vec<ParamViolation> {
        self.checks.iter().flat_map(|c| c.violations()).collect()
    }

    /// Convert into `Ok(())` or `ParamsOutOfRange` carrying every violation.
    pub fn into_result(self) -> Result<(), PlayError> {
        if self.is_playable() {
            Ok(())
        } else {
            Err(PlayError::ParamsOutOfRange(self.violations()))
        }
    }
}

/// Check all requested parameters against an open capability handle.
pub fn check_params<Q: CapabilityQuery>(
    caps: &Q,
    params: &StreamParameters,
) -> Result<ValidationReport, PlayError> {
    let mut checks = Vec::with_capacity(ParamKind::ALL.len());
    for kind in ParamKind::ALL {
        let range = caps.range(kind)?;
        let check = ParamCheck {
            range,
            requested: params.value(kind),
        };
        for violation in check.violations() {
            tracing::error!(
                param = kind.label(),
                requested = check.requested,
                min = range.min,
                max = range.max,
                "{violation}"
            );
        }
        checks.push(check);
    }
    Ok(ValidationReport { checks })
}

/// Open the capability handle for the target device, check `params` and release it.
pub fn validate<B: PcmBackend>(
    backend: &B,
    params: &StreamParameters,
) -> Result<ValidationReport, PlayError> {
    let caps = backend.capabilities(params.card, params.device)?;
    let report = check_params(&caps, params);
    drop(caps);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;

    fn params() -> StreamParameters {
        StreamParameters {
            channels: 2,
            rate: 44_100,
            bits: 16,
            period_size: 1024,
            period_count: 4,
            ..StreamParameters::default()
        }
    }

    #[test]
    fn in_range_params_are_playable() {
        let backend = MockBackend::new();
        let report = validate(&backend, &params()).unwrap();
        assert!(report.is_playable());
        assert!(report.violations().is_empty());
        assert_eq!(report.checks.len(), 5);
    }

    #[test]
    fn reports_rate_above_max_with_bound() {
        let backend = MockBackend::new().with_range(ParamKind::Rate, 8_000, 48_000);
        let requested = StreamParameters { rate: 192_000, ..params() };
        let report = validate(&backend, &requested).unwrap();
        assert!(!report.is_playable());
        let violations = report.violations();
        assert_eq!(
            violations,
            vec![ParamViolation {
                kind: ParamKind::Rate,
                requested: 192_000,
                bound: Bound::Max(48_000),
            }]
        );
        assert_eq!(
            violations[0].to_string(),
            "Sample rate is 192000Hz, device only supports <= 48000Hz"
        );
    }

    #[test]
    fn every_single_field_out_of_range_is_identified() {
        for kind in ParamKind::ALL {
            let value = params().value(kind);
            let backend = MockBackend::new().with_range(kind, value + 1, value + 10);
            let report = validate(&backend, &params()).unwrap();
            let violations = report.violations();
            assert_eq!(violations.len(), 1, "{kind:?}");
            assert_eq!(violations[0].kind, kind);
            assert_eq!(violations[0].bound, Bound::Min(value + 1));
        }
    }

    #[test]
    fn collects_all_violations_without_short_circuit() {
        let backend = MockBackend::new()
            .with_range(ParamKind::Rate, 8_000, 22_050)
            .with_range(ParamKind::Channels, 4, 8)
            .with_range(ParamKind::PeriodCount, 2, 3);
        let report = validate(&backend, &params()).unwrap();
        let kinds: Vec<ParamKind> = report.violations().iter().map(|v| v.kind).collect();
        assert_eq!(
            kinds,
            vec![ParamKind::Rate, ParamKind::Channels, ParamKind::PeriodCount]
        );

        let err = report.into_result().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Sample rate is 44100Hz"), "{msg}");
        assert!(msg.contains("Channels is 2, device only supports >= 4"), "{msg}");
        assert!(msg.contains("Period count is 4, device only supports <= 3"), "{msg}");
    }

    #[test]
    fn query_failure_releases_handle() {
        let backend = MockBackend::new().failing_query(ParamKind::Bits);
        let err = validate(&backend, &params()).unwrap_err();
        assert!(matches!(err, PlayError::DeviceQueryFailed { .. }), "{err:?}");
        assert_eq!(backend.counters().caps_opened(), 1);
        assert_eq!(backend.counters().caps_released(), 1);
    }

    #[test]
    fn capability_handle_is_released_after_success() {
        let backend = MockBackend::new();
        validate(&backend, &params()).unwrap();
        assert_eq!(backend.counters().caps_released(), 1);
    }

    #[test]
    fn unreachable_device_is_query_failure() {
        let backend = MockBackend::new().unreachable();
        let err = validate(&backend, &params()).unwrap_err();
        assert!(matches!(err, PlayError::DeviceQueryFailed { .. }), "{err:?}");
    }
}
