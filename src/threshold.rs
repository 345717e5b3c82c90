//! Threshold evaluation.
//!
//! Decides from a [`UsageSnapshot`] and a [`ReclamationPolicy`] whether
//! a location needs reclamation and how many bytes must be freed.

use derive_builder::Builder;

/// Disk usage of one filesystem.
///
/// `used_bytes == total_bytes - free_bytes` holds by construction of the
/// [`DiskStats`][crate::disk::DiskStats] implementation, it is not enforced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsageSnapshot {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub used_bytes: u64,
}

impl UsageSnapshot {
    /// Build snapshot from total and free bytes.
    pub fn new(total_bytes: u64, free_bytes: u64) -> Self {
        Self {
            total_bytes,
            free_bytes,
            used_bytes: total_bytes.saturating_sub(free_bytes),
        }
    }

    /// Free space in percents of total space.
    ///
    /// Filesystem reporting zero total bytes is considered fully free.
    pub fn free_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        self.free_bytes as f64 / self.total_bytes as f64 * 100.0
    }
}

/// Reclamation policy of one location. Use [`ReclamationPolicyBuilder`] to create.
///
/// Zero `min_free_percent` or zero `min_free_bytes` means the bound is unset.
#[derive(Default, Builder, Debug, Clone, Copy, PartialEq)]
#[builder(setter(into))]
#[builder(default)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct ReclamationPolicy {
    /// Minimum percentage of free space to maintain.
    pub min_free_percent: f64,

    /// Minimum absolute free space to maintain, in bytes.
    pub min_free_bytes: u64,

    /// Simulate reclamation without touching the filesystem.
    pub dry_run: bool,
}

impl ReclamationPolicy {
    /// Create new builder for reclamation policy.
    pub fn builder() -> ReclamationPolicyBuilder {
        ReclamationPolicyBuilder::default()
    }
}

impl ReclamationPolicyBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(percent) = self.min_free_percent {
            if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
                return Err(format!(
                    "minimum free percent must be within 0..=100, got {}",
                    percent
                ));
            }
        }
        Ok(())
    }
}

/// Outcome of threshold evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdDecision {
    /// Whether any configured bound is violated.
    pub needs_reclamation: bool,

    /// Observed free space in percents.
    pub free_percent: f64,

    /// Free space the location should have after reclamation.
    pub target_free_bytes: u64,

    /// Bytes to free. Always 0 when reclamation is not needed.
    pub budget: u64,
}

/// Evaluate `usage` against `policy`.
///
/// Reclamation is needed when free space is below either configured bound.
/// The stricter bound then defines the target, even if only the other one triggered.
pub fn evaluate(usage: &UsageSnapshot, policy: &ReclamationPolicy) -> ThresholdDecision {
    let free_percent = usage.free_percent();

    let below_percent = policy.min_free_percent > 0.0 && free_percent < policy.min_free_percent;
    let below_bytes = policy.min_free_bytes > 0 && usage.free_bytes < policy.min_free_bytes;
    let needs_reclamation = below_percent || below_bytes;

    let target_by_percent = (usage.total_bytes as f64 * (policy.min_free_percent / 100.0)) as u64;
    let target_free_bytes = target_by_percent.max(policy.min_free_bytes);

    let budget = if needs_reclamation {
        target_free_bytes.saturating_sub(usage.free_bytes)
    } else {
        0
    };

    ThresholdDecision {
        needs_reclamation,
        free_percent,
        target_free_bytes,
        budget,
    }
}
