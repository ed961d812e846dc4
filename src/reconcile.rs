use serde::Serialize;

use crate::backend::{ComponentRuntime, RegistryLookup};
use crate::error::{ClassificationOutcome, Warning};
use crate::guid::{ClassId, InterfaceId};
use crate::model::{ConcurrencyProfile, EvidenceTier, Provenance, ThreadingModel};
use crate::probe::probe_capabilities;
use crate::registry::ClassRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    VersionIndependent,
    VersionDependent,
}

impl From<&ConcurrencyProfile> for Consistency {
    fn from(profile: &ConcurrencyProfile) -> Self {
        if profile.is_version_dependent() {
            Consistency::VersionDependent
        } else {
            Consistency::VersionIndependent
        }
    }
}

/// Registry classification followed by live capability probing.
pub fn reconcile_class<Reg, Rt>(
    classes: &ClassRegistry<'_, Reg>,
    runtime: &Rt,
    clsid: &ClassId,
    iid: Option<&InterfaceId>,
    warnings: &mut Vec<Warning>,
) -> ClassificationOutcome
where
    Reg: RegistryLookup + ?Sized,
    Rt: ComponentRuntime + ?Sized,
{
    let seed = classes.classify(clsid)?;
    let profile = probe_capabilities(runtime, clsid, seed, iid, warnings);
    debug_assert!(refinement_is_valid(&seed, &profile));
    tracing::debug!(
        %clsid,
        legacy = %profile.legacy().model,
        modern = %profile.modern().model,
        "reconciled profile"
    );
    Ok(profile)
}

/// The legacy tier either keeps its registry verdict or becomes neutral via
/// the free-threaded marshaler. The modern tier may additionally become
/// neutral via `IAgileObject`.
pub fn refinement_is_valid(seed: &ConcurrencyProfile, refined: &ConcurrencyProfile) -> bool {
    let neutral_via = |tier: EvidenceTier, provenance: Provenance| {
        tier.model == ThreadingModel::ThreadNeutral && tier.provenance == provenance
    };

    let legacy = refined.legacy();
    let legacy_ok = legacy == seed.legacy()
        || neutral_via(legacy, Provenance::FreeThreadedMarshalerDetected);

    let modern = refined.modern();
    let modern_ok = modern == seed.modern()
        || neutral_via(modern, Provenance::FreeThreadedMarshalerDetected)
        || neutral_via(modern, Provenance::AgileInterfaceDetected);

    let legacy_monotonic = !seed.legacy().model.is_neutral() || legacy == seed.legacy();

    legacy_ok && modern_ok && legacy_monotonic
}
