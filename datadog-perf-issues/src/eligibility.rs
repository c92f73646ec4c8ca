// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::detectors::DetectorKind;

/// Boolean gates the driver consults before surfacing a detector's
/// problems. The three checks are independent: a system-wide sampling
/// gate, an organization feature gate and a per-project option gate.
/// Implementations live outside the engine (option store, feature
/// flags); a lookup failure should be reported as `false`, never as an
/// error.
pub trait EligibilityGates {
    fn creation_allowed_for_system(&self, kind: DetectorKind) -> bool;
    fn creation_allowed_for_organization(&self, kind: DetectorKind) -> bool;
    fn creation_allowed_for_project(&self, kind: DetectorKind) -> bool;
}

/// Gates that allow everything; useful for tests and offline replay.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveGates;

impl EligibilityGates for PermissiveGates {
    fn creation_allowed_for_system(&self, _kind: DetectorKind) -> bool {
        true
    }

    fn creation_allowed_for_organization(&self, _kind: DetectorKind) -> bool {
        true
    }

    fn creation_allowed_for_project(&self, _kind: DetectorKind) -> bool {
        true
    }
}
