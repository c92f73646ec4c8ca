// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Remaps one obfuscated `(module, function)` pair to human-readable
/// names. `None` means "no mapping for this frame"; callers fall back to
/// the raw names.
pub trait SymbolMapper {
    fn remap(&self, module: &str, function: &str) -> Option<(String, String)>;
}

/// Resolves a [`SymbolMapper`] for a debug-image identifier. This is a
/// best-effort external collaborator: resolution failure must degrade to
/// "no mapping available", and it must never block span processing.
pub trait SymbolSource {
    fn mapper_for(&self, debug_id: &str) -> Option<Box<dyn SymbolMapper>>;
}

/// Source with no mappings; call stacks keep their raw names.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSymbolSource;

impl SymbolSource for NoopSymbolSource {
    fn mapper_for(&self, _debug_id: &str) -> Option<Box<dyn SymbolMapper>> {
        None
    }
}
