use crate::backend::{RegStatus, RegistryLookup};
use crate::config::Config;
use crate::error::{ClassificationOutcome, ClassifyError};
use crate::guid::{ClassId, InterfaceId};
use crate::model::{ConcurrencyProfile, EvidenceTier, ThreadingModel};

pub fn clsid_key(clsid: &ClassId) -> String {
    format!(r"CLSID\{clsid}")
}

pub fn inproc_server_key(clsid: &ClassId) -> String {
    format!(r"CLSID\{clsid}\InprocServer32")
}

pub fn local_server_key(clsid: &ClassId) -> String {
    format!(r"CLSID\{clsid}\LocalServer32")
}

pub fn proxy_stub_key(iid: &InterfaceId) -> String {
    format!(r"Interface\{iid}\ProxyStubClsid32")
}

/// Class registration data as persisted under `HKEY_CLASSES_ROOT`.
pub struct ClassRegistry<'a, R: RegistryLookup + ?Sized> {
    registry: &'a R,
    config: &'a Config,
}

impl<'a, R: RegistryLookup + ?Sized> ClassRegistry<'a, R> {
    pub fn new(registry: &'a R, config: &'a Config) -> Self {
        Self { registry, config }
    }

    /// Seeds a profile from the class's `InprocServer32` registration.
    ///
    /// A registration without a `ThreadingModel` value is single-threaded.
    /// The value is matched verbatim apart from ASCII case, so padding makes
    /// it unrecognized.
    pub fn classify(&self, clsid: &ClassId) -> ClassificationOutcome {
        let key = inproc_server_key(clsid);
        if !self
            .registry
            .key_exists(&key)
            .map_err(ClassifyError::LookupFailed)?
        {
            return Err(ClassifyError::ClassNotRegistered);
        }

        let value = self
            .registry
            .get(&key, Some("ThreadingModel"))
            .map_err(ClassifyError::LookupFailed)?;

        let model = match value.as_deref() {
            None | Some("") => ThreadingModel::SingleThreaded,
            Some(raw) => ThreadingModel::from_registry_value(raw)
                .ok_or_else(|| ClassifyError::UnrecognizedModelValue(raw.to_string()))?,
        };

        tracing::debug!(%clsid, %model, "registry threading model");
        Ok(ConcurrencyProfile::uniform(EvidenceTier::registry(model)))
    }

    /// Backing module of an in-process server. Only read in verbose mode;
    /// any failure yields `None`.
    pub fn module_path(&self, clsid: &ClassId) -> Option<String> {
        if !self.config.verbose {
            return None;
        }
        match self.registry.get(&inproc_server_key(clsid), None) {
            Ok(Some(path)) if !path.is_empty() => {
                tracing::info!(%clsid, module = %path, "in-process server module");
                Some(path)
            }
            Ok(_) => None,
            Err(code) => {
                tracing::debug!(%clsid, %code, "could not read in-process server module");
                None
            }
        }
    }

    pub fn is_local_server(&self, clsid: &ClassId) -> Result<bool, RegStatus> {
        self.registry.key_exists(&local_server_key(clsid))
    }

    /// Whether the class can also be activated out of process, either via a
    /// `LocalServer32` key or an `AppID` value.
    pub fn has_out_of_process_registration(&self, clsid: &ClassId) -> Result<bool, RegStatus> {
        if self.is_local_server(clsid)? {
            return Ok(true);
        }
        Ok(self
            .registry
            .get(&clsid_key(clsid), Some("AppID"))?
            .is_some_and(|v| !v.trim().is_empty()))
    }

    /// Raw proxy/stub CLSID string registered for `iid`.
    pub fn proxy_stub_clsid(&self, iid: &InterfaceId) -> Result<Option<String>, RegStatus> {
        Ok(self
            .registry
            .get(&proxy_stub_key(iid), None)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()))
    }
}
