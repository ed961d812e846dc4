use crate::apartment::ApartmentGuard;
use crate::backend::{ActivationContext, Capability, ComponentRuntime, MarshalContext, MarshalFlags};
use crate::error::{Warning, record_warning};
use crate::guid::{CLSID_FREE_THREADED_MARSHALER, ClassId, InterfaceId};
use crate::model::{ConcurrencyProfile, EvidenceTier, Provenance, ThreadingModel};

/// Refines a registry-seeded profile by inspecting a live instance.
///
/// `IAgileObject` only exists from Windows 8 on, so it upgrades the modern
/// tier alone. An object that aggregates the free-threaded marshaler is
/// neutral on every OS version. Every failure along the way leaves the
/// evidence gathered so far in place and records a warning.
pub fn probe_capabilities<R: ComponentRuntime + ?Sized>(
    runtime: &R,
    clsid: &ClassId,
    profile: ConcurrencyProfile,
    iid: Option<&InterfaceId>,
    warnings: &mut Vec<Warning>,
) -> ConcurrencyProfile {
    let seed = profile.legacy().model;
    if seed.is_neutral() {
        tracing::debug!(%clsid, "already thread-neutral, skipping capability checks");
        return profile;
    }

    let apartment = ApartmentGuard::enter(runtime, seed);
    if let Some(code) = apartment.failure() {
        record_warning(
            warnings,
            Warning::ContextUnavailable {
                model: seed.to_string(),
                code,
            },
        );
        return profile;
    }

    tracing::debug!(%clsid, "creating object");
    let object = match runtime.create_instance(clsid, ActivationContext::InProcServer) {
        Ok(object) => object,
        Err(code) => {
            record_warning(
                warnings,
                Warning::InstantiationFailed {
                    clsid: *clsid,
                    code,
                },
            );
            return profile;
        }
    };

    let mut refined = profile;
    if query(runtime, &object, Capability::Agile, warnings).is_some() {
        refined = refined.with_modern(EvidenceTier::new(
            ThreadingModel::ThreadNeutral,
            Provenance::AgileInterfaceDetected,
        ));
    }

    let Some(iid) = iid else {
        record_warning(warnings, Warning::InterfaceIdMissing);
        return refined;
    };

    let Some(marshal) = query(runtime, &object, Capability::Marshal, warnings) else {
        return refined;
    };

    tracing::debug!(%iid, "checking whether object uses the free-threaded marshaler");
    match runtime.get_unmarshal_class(&marshal, iid, MarshalContext::InProc, MarshalFlags::Normal)
    {
        Ok(unmarshal) if unmarshal == CLSID_FREE_THREADED_MARSHALER => {
            tracing::debug!("free-threaded marshaler: yes");
            refined = refined.promote_neutral(Provenance::FreeThreadedMarshalerDetected);
        }
        Ok(unmarshal) => {
            tracing::debug!(%unmarshal, "free-threaded marshaler: no");
        }
        Err(code) => record_warning(warnings, Warning::UnmarshalClassFailed { code }),
    }

    refined
}

fn query<R: ComponentRuntime + ?Sized>(
    runtime: &R,
    object: &R::Object,
    capability: Capability,
    warnings: &mut Vec<Warning>,
) -> Option<R::Object> {
    match runtime.query_capability(object, capability) {
        Ok(Some(found)) => {
            tracing::debug!(%capability, "found");
            Some(found)
        }
        Ok(None) => {
            tracing::debug!(%capability, "not found");
            None
        }
        Err(code) if code.is_no_interface() => {
            tracing::debug!(%capability, "not found");
            None
        }
        Err(code) => {
            record_warning(warnings, Warning::capability_query_failed(capability, code));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HResult;
    use crate::fixture::{FixtureClass, FixtureRuntime};

    const CLSID: ClassId = ClassId::from_u128(0xaaaaaaaa_0000_0000_0000_000000000001);
    const IID: InterfaceId = InterfaceId::from_u128(0xbbbbbbbb_0000_0000_0000_000000000002);
    const OTHER_UNMARSHAL: ClassId = ClassId::from_u128(0x00000320_0000_0000_c000_000000000046);

    fn seeded(model: ThreadingModel) -> ConcurrencyProfile {
        ConcurrencyProfile::uniform(EvidenceTier::registry(model))
    }

    fn runtime_with(class: FixtureClass) -> FixtureRuntime {
        FixtureRuntime::default().with_class(
            CLSID,
            FixtureClass {
                in_proc: true,
                ..class
            },
        )
    }

    fn neutral(provenance: Provenance) -> EvidenceTier {
        EvidenceTier::new(ThreadingModel::ThreadNeutral, provenance)
    }

    #[test]
    fn free_threaded_class_without_capabilities_is_unchanged() {
        let runtime = runtime_with(FixtureClass::default());
        let mut warnings = Vec::new();
        let profile = probe_capabilities(
            &runtime,
            &CLSID,
            seeded(ThreadingModel::MultiThreaded),
            Some(&IID),
            &mut warnings,
        );

        assert_eq!(profile, seeded(ThreadingModel::MultiThreaded));
        assert!(warnings.is_empty());
        assert_eq!(runtime.context_log(), vec![ThreadingModel::MultiThreaded]);
        assert_eq!(runtime.open_contexts(), 0);
    }

    #[test]
    fn agile_object_only_changes_the_modern_tier() {
        let runtime = runtime_with(FixtureClass {
            agile: true,
            ..FixtureClass::default()
        });
        let mut warnings = Vec::new();
        let profile = probe_capabilities(
            &runtime,
            &CLSID,
            seeded(ThreadingModel::SingleThreaded),
            Some(&IID),
            &mut warnings,
        );

        assert_eq!(
            profile.legacy(),
            EvidenceTier::registry(ThreadingModel::SingleThreaded)
        );
        assert_eq!(profile.modern(), neutral(Provenance::AgileInterfaceDetected));
        assert!(profile.is_version_dependent());
        assert_eq!(runtime.context_log(), vec![ThreadingModel::SingleThreaded]);
    }

    #[test]
    fn free_threaded_marshaler_neutralizes_both_tiers() {
        let runtime = runtime_with(FixtureClass {
            marshal: true,
            unmarshal_class: Some(CLSID_FREE_THREADED_MARSHALER),
            ..FixtureClass::default()
        });
        let mut warnings = Vec::new();
        let profile = probe_capabilities(
            &runtime,
            &CLSID,
            seeded(ThreadingModel::SingleThreaded),
            Some(&IID),
            &mut warnings,
        );

        let expected = ConcurrencyProfile::uniform(neutral(Provenance::FreeThreadedMarshalerDetected));
        assert_eq!(profile, expected);
        assert!(!profile.is_version_dependent());
        assert!(warnings.is_empty());
    }

    #[test]
    fn agile_provenance_survives_free_threaded_marshaler() {
        let runtime = runtime_with(FixtureClass {
            agile: true,
            marshal: true,
            unmarshal_class: Some(CLSID_FREE_THREADED_MARSHALER),
            ..FixtureClass::default()
        });
        let mut warnings = Vec::new();
        let profile = probe_capabilities(
            &runtime,
            &CLSID,
            seeded(ThreadingModel::Both),
            Some(&IID),
            &mut warnings,
        );

        assert_eq!(profile.legacy(), neutral(Provenance::FreeThreadedMarshalerDetected));
        assert_eq!(profile.modern(), neutral(Provenance::AgileInterfaceDetected));
    }

    #[test]
    fn custom_marshaler_is_not_evidence() {
        let runtime = runtime_with(FixtureClass {
            marshal: true,
            unmarshal_class: Some(OTHER_UNMARSHAL),
            ..FixtureClass::default()
        });
        let mut warnings = Vec::new();
        let profile = probe_capabilities(
            &runtime,
            &CLSID,
            seeded(ThreadingModel::Both),
            Some(&IID),
            &mut warnings,
        );
        assert_eq!(profile, seeded(ThreadingModel::Both));
        assert!(warnings.is_empty());
    }

    #[test]
    fn neutral_profiles_short_circuit() {
        let runtime = runtime_with(FixtureClass {
            agile: true,
            ..FixtureClass::default()
        });
        let start = ConcurrencyProfile::uniform(neutral(Provenance::FreeThreadedMarshalerDetected));
        let mut warnings = Vec::new();
        let profile = probe_capabilities(&runtime, &CLSID, start, Some(&IID), &mut warnings);

        assert_eq!(profile, start);
        assert!(runtime.context_log().is_empty());
        assert_eq!(runtime.instances_created(), 0);
    }

    #[test]
    fn missing_iid_stops_after_agile_check() {
        let runtime = runtime_with(FixtureClass {
            agile: true,
            marshal: true,
            unmarshal_class: Some(CLSID_FREE_THREADED_MARSHALER),
            ..FixtureClass::default()
        });
        let mut warnings = Vec::new();
        let profile = probe_capabilities(
            &runtime,
            &CLSID,
            seeded(ThreadingModel::SingleThreaded),
            None,
            &mut warnings,
        );

        assert_eq!(
            profile.legacy(),
            EvidenceTier::registry(ThreadingModel::SingleThreaded)
        );
        assert_eq!(profile.modern(), neutral(Provenance::AgileInterfaceDetected));
        assert_eq!(warnings, vec![Warning::InterfaceIdMissing]);
    }

    #[test]
    fn context_failure_keeps_registry_verdict() {
        let runtime = runtime_with(FixtureClass {
            agile: true,
            ..FixtureClass::default()
        })
        .with_context_failure(HResult::RPC_E_CHANGED_MODE);
        let mut warnings = Vec::new();
        let profile = probe_capabilities(
            &runtime,
            &CLSID,
            seeded(ThreadingModel::SingleThreaded),
            Some(&IID),
            &mut warnings,
        );

        assert_eq!(profile, seeded(ThreadingModel::SingleThreaded));
        assert!(matches!(
            warnings.as_slice(),
            [Warning::ContextUnavailable { code, .. }] if *code == HResult::RPC_E_CHANGED_MODE
        ));
        assert_eq!(runtime.leave_count(), 0);
    }

    #[test]
    fn instantiation_failure_keeps_registry_verdict() {
        let runtime = FixtureRuntime::default();
        let mut warnings = Vec::new();
        let profile = probe_capabilities(
            &runtime,
            &CLSID,
            seeded(ThreadingModel::Both),
            Some(&IID),
            &mut warnings,
        );

        assert_eq!(profile, seeded(ThreadingModel::Both));
        assert!(matches!(
            warnings.as_slice(),
            [Warning::InstantiationFailed { code, .. }] if *code == HResult::REGDB_E_CLASSNOTREG
        ));
        assert_eq!(runtime.open_contexts(), 0);
        assert_eq!(runtime.leave_count(), 1);
    }

    #[test]
    fn unmarshal_class_failure_is_a_warning() {
        let runtime = runtime_with(FixtureClass {
            marshal: true,
            unmarshal_class: None,
            ..FixtureClass::default()
        });
        let mut warnings = Vec::new();
        let profile = probe_capabilities(
            &runtime,
            &CLSID,
            seeded(ThreadingModel::MultiThreaded),
            Some(&IID),
            &mut warnings,
        );
        assert_eq!(profile, seeded(ThreadingModel::MultiThreaded));
        assert_eq!(
            warnings,
            vec![Warning::UnmarshalClassFailed {
                code: HResult::E_FAIL
            }]
        );
    }

    #[test]
    fn no_interface_query_failures_count_as_absent() {
        let runtime = runtime_with(FixtureClass {
            agile_error: Some(HResult::E_NOINTERFACE),
            marshal_error: Some(HResult::E_NOINTERFACE),
            ..FixtureClass::default()
        });
        let mut warnings = Vec::new();
        let profile = probe_capabilities(
            &runtime,
            &CLSID,
            seeded(ThreadingModel::SingleThreaded),
            Some(&IID),
            &mut warnings,
        );

        assert_eq!(profile, seeded(ThreadingModel::SingleThreaded));
        assert!(warnings.is_empty());
    }

    #[test]
    fn other_query_failures_keep_the_profile_and_warn() {
        let runtime = runtime_with(FixtureClass {
            agile_error: Some(HResult::E_NOINTERFACE),
            marshal_error: Some(HResult::E_FAIL),
            ..FixtureClass::default()
        });
        let mut warnings = Vec::new();
        let profile = probe_capabilities(
            &runtime,
            &CLSID,
            seeded(ThreadingModel::Both),
            Some(&IID),
            &mut warnings,
        );

        assert_eq!(profile, seeded(ThreadingModel::Both));
        assert_eq!(
            warnings,
            vec![Warning::CapabilityQueryFailed {
                capability: "IMarshal".to_string(),
                code: HResult::E_FAIL
            }]
        );
    }

    #[test]
    fn failed_agile_query_still_checks_the_marshaler() {
        let runtime = runtime_with(FixtureClass {
            agile_error: Some(HResult::E_FAIL),
            marshal: true,
            unmarshal_class: Some(CLSID_FREE_THREADED_MARSHALER),
            ..FixtureClass::default()
        });
        let mut warnings = Vec::new();
        let profile = probe_capabilities(
            &runtime,
            &CLSID,
            seeded(ThreadingModel::SingleThreaded),
            Some(&IID),
            &mut warnings,
        );

        assert_eq!(
            profile,
            ConcurrencyProfile::uniform(neutral(Provenance::FreeThreadedMarshalerDetected))
        );
        assert!(matches!(
            warnings.as_slice(),
            [Warning::CapabilityQueryFailed { capability, .. }] if capability == "IAgileObject"
        ));
    }

    #[test]
    fn probing_twice_is_idempotent() {
        let runtime = runtime_with(FixtureClass {
            agile: true,
            ..FixtureClass::default()
        });
        let mut warnings = Vec::new();
        let first = probe_capabilities(
            &runtime,
            &CLSID,
            seeded(ThreadingModel::SingleThreaded),
            Some(&IID),
            &mut warnings,
        );
        let second = probe_capabilities(
            &runtime,
            &CLSID,
            seeded(ThreadingModel::SingleThreaded),
            Some(&IID),
            &mut warnings,
        );
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
