use crate::backend::{ComponentRuntime, RegistryLookup};
use crate::error::{ResolveError, Warning};
use crate::guid::{ClassId, Guid, InterfaceId, is_automation_marshaler};
use crate::model::ConcurrencyProfile;
use crate::reconcile::reconcile_class;
use crate::registry::{ClassRegistry, proxy_stub_key};

/// The marshaling class registered for an interface, and how it threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyStub {
    pub clsid: ClassId,
    /// Marshaled through the type-library driven automation marshaler.
    pub automation: bool,
    pub profile: ConcurrencyProfile,
}

/// Classifies the proxy/stub class registered under `iid`, probing it with
/// that same interface.
pub fn resolve_proxy_stub<Reg, Rt>(
    classes: &ClassRegistry<'_, Reg>,
    runtime: &Rt,
    iid: &InterfaceId,
    warnings: &mut Vec<Warning>,
) -> Result<ProxyStub, ResolveError>
where
    Reg: RegistryLookup + ?Sized,
    Rt: ComponentRuntime + ?Sized,
{
    let raw = match classes.proxy_stub_clsid(iid) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Err(ResolveError::ProxyStubNotRegistered { iid: *iid }),
        Err(code) if code.is_not_found() => {
            return Err(ResolveError::ProxyStubNotRegistered { iid: *iid });
        }
        Err(code) => {
            return Err(ResolveError::LookupFailed {
                key: proxy_stub_key(iid),
                code,
            });
        }
    };

    let clsid = Guid::parse_registry_format(&raw)
        .map_err(|_| ResolveError::MalformedProxyStubClsid { value: raw.clone() })?;

    let automation = is_automation_marshaler(&clsid);
    if automation {
        tracing::info!(%clsid, "interface uses the automation marshaler");
    } else {
        tracing::info!(%clsid, "proxy/stub class");
    }

    let profile = reconcile_class(classes, runtime, &clsid, Some(iid), warnings)
        .map_err(|source| ResolveError::ProxyStubUnclassified { clsid, source })?;

    Ok(ProxyStub {
        clsid,
        automation,
        profile,
    })
}
