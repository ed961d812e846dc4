//! Top-level resolution of a class's threading model.
//!
//! An in-process server is classified from its own registration and a live
//! instance. Anything else must be a local server (registered, or at least
//! exposing a class factory at runtime), whose calls arrive through the
//! proxy/stub of the interface in use; that proxy/stub is what gets
//! classified instead.

use serde::Serialize;

use crate::apartment::ApartmentGuard;
use crate::backend::{ActivationContext, ComponentRuntime, RegistryLookup};
use crate::config::{Config, Target};
use crate::error::{ClassifyError, ResolveError, Warning, record_warning};
use crate::guid::{ClassId, InterfaceId};
use crate::model::{ClassRole, ConcurrencyProfile, ThreadingModel};
use crate::proxy::{ProxyStub, resolve_proxy_stub};
use crate::reconcile::{Consistency, reconcile_class};
use crate::registry::ClassRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassReport {
    pub role: ClassRole,
    pub clsid: ClassId,
    pub profile: ConcurrencyProfile,
    pub consistency: Consistency,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_path: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub automation_marshaler: bool,
}

impl ClassReport {
    pub fn server(clsid: ClassId, profile: ConcurrencyProfile, module_path: Option<String>) -> Self {
        Self {
            role: ClassRole::Server,
            clsid,
            profile,
            consistency: Consistency::from(&profile),
            module_path,
            automation_marshaler: false,
        }
    }

    pub fn proxy(proxy: ProxyStub) -> Self {
        Self {
            role: ClassRole::ProxyStub,
            clsid: proxy.clsid,
            profile: proxy.profile,
            consistency: Consistency::from(&proxy.profile),
            module_path: None,
            automation_marshaler: proxy.automation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub clsid: ClassId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prog_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iid: Option<InterfaceId>,
    pub server: Option<ClassReport>,
    pub proxy: Option<ClassReport>,
    pub warnings: Vec<Warning>,
}

pub fn resolve<Reg, Rt>(
    registry: &Reg,
    runtime: &Rt,
    config: &Config,
    target: &Target,
) -> Result<Resolution, ResolveError>
where
    Reg: RegistryLookup + ?Sized,
    Rt: ComponentRuntime + ?Sized,
{
    let classes = ClassRegistry::new(registry, config);
    let clsid = target.clsid;
    let iid = target.iid;
    let mut warnings = Vec::new();

    let mut resolution = Resolution {
        clsid,
        prog_id: target.prog_id.clone(),
        iid,
        server: None,
        proxy: None,
        warnings: Vec::new(),
    };

    match reconcile_class(&classes, runtime, &clsid, iid.as_ref(), &mut warnings) {
        Ok(profile) => {
            resolution.server = Some(ClassReport::server(
                clsid,
                profile,
                classes.module_path(&clsid),
            ));
            if let Some(iid) = iid {
                resolution.proxy =
                    supplementary_proxy(&classes, runtime, &clsid, &iid, &mut warnings);
            }
            resolution.warnings = warnings;
            return Ok(resolution);
        }
        Err(ClassifyError::ClassNotRegistered) => {
            tracing::info!(%clsid, "class is not a registered in-process server");
        }
        Err(ClassifyError::LookupFailed(code)) => {
            return Err(ResolveError::LookupFailed {
                key: "InprocServer32".to_string(),
                code,
            });
        }
        Err(ClassifyError::UnrecognizedModelValue(value)) => {
            return Err(ResolveError::UnrecognizedModelValue { clsid, value });
        }
    }

    tracing::info!("attempting to resolve as a local server");
    let registered = classes
        .is_local_server(&clsid)
        .map_err(|code| ResolveError::LookupFailed {
            key: "LocalServer32".to_string(),
            code,
        })?;
    if !registered && !has_runtime_class_factory(runtime, &clsid)? {
        return Err(ResolveError::NotLocalServer);
    }

    tracing::info!("class is a local server; its threading model is that of its proxy/stub class");
    let iid = iid.ok_or(ResolveError::InterfaceRequired)?;
    let proxy = resolve_proxy_stub(&classes, runtime, &iid, &mut warnings)?;
    resolution.proxy = Some(ClassReport::proxy(proxy));
    resolution.warnings = warnings;
    Ok(resolution)
}

/// Covers classes registered with `CoRegisterClassObject` but absent from
/// the registry.
fn has_runtime_class_factory<Rt: ComponentRuntime + ?Sized>(
    runtime: &Rt,
    clsid: &ClassId,
) -> Result<bool, ResolveError> {
    let apartment = ApartmentGuard::enter(runtime, ThreadingModel::MultiThreaded);
    if let Some(code) = apartment.failure() {
        return Err(ResolveError::ContextUnavailable(code));
    }

    match runtime.get_class_factory(clsid, ActivationContext::LocalServer) {
        Ok(_factory) => {
            tracing::info!(%clsid, "class factory is registered at runtime");
            Ok(true)
        }
        Err(code) => {
            tracing::debug!(%clsid, %code, "no class factory");
            Ok(false)
        }
    }
}

fn supplementary_proxy<Reg, Rt>(
    classes: &ClassRegistry<'_, Reg>,
    runtime: &Rt,
    clsid: &ClassId,
    iid: &InterfaceId,
    warnings: &mut Vec<Warning>,
) -> Option<ClassReport>
where
    Reg: RegistryLookup + ?Sized,
    Rt: ComponentRuntime + ?Sized,
{
    match classes.has_out_of_process_registration(clsid) {
        Ok(true) => {}
        Ok(false) => return None,
        Err(code) => {
            tracing::debug!(%clsid, %code, "could not check out-of-process registration");
            return None;
        }
    }

    tracing::info!("class also registers out-of-process; resolving its proxy/stub");
    match resolve_proxy_stub(classes, runtime, iid, warnings) {
        Ok(proxy) => Some(ClassReport::proxy(proxy)),
        Err(err) => {
            record_warning(
                warnings,
                Warning::ProxyUnresolved {
                    reason: err.to_string(),
                },
            );
            None
        }
    }
}
