//! Per-kind resource reconcilers.
//!
//! Shared contract: locate the resource fresh, create it when absent (a
//! conflict on create means another creator won the race — re-locate and
//! continue on the present path), compare the minimal field set this
//! reconciler owns when present, and update with `observed version + 1` when
//! stale. `NotFound` and `Conflict` never escape a reconciler; everything
//! else propagates untouched.

pub mod cloud;
pub mod console;

use crate::error::ProvisionError;
use toolgate_control_plane::ControlPlaneError;

/// A create reported "already exists" but the follow-up locate found
/// nothing. The control plane is contradicting itself; surface that rather
/// than looping.
pub(crate) fn vanished_after_conflict(resource: &str) -> ProvisionError {
    ProvisionError::ControlPlane(ControlPlaneError::Malformed {
        operation: format!("locate {resource}"),
        message: format!("{resource} was reported as existing but could not be located"),
    })
}
