//! JSON-described stand-ins for the registry and the component runtime.
//!
//! A fixture lets the whole engine run on machines without COM, and records
//! apartment entry/exit so tests can check pairing. Registry paths and value
//! names compare case-insensitively, like the real registry.
//!
//! ```json
//! {
//!   "registry": {
//!     "keys": {
//!       "CLSID\\{...}\\InprocServer32": { "": "demo.dll", "ThreadingModel": "Apartment" }
//!     },
//!     "errors": { "CLSID\\{...}\\LocalServer32": 5 }
//!   },
//!   "runtime": {
//!     "classes": {
//!       "{...}": { "in_proc": true, "agile": true, "marshal": true,
//!                  "unmarshal_class": "{0000033A-0000-0000-C000-000000000046}" }
//!     },
//!     "prog_ids": { "Demo.Object": "{...}" },
//!     "context_failure": null
//!   }
//! }
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::Path;

use crate::backend::{
    ActivationContext, Capability, ComponentRuntime, ContextToken, HResult, MarshalContext,
    MarshalFlags, RegStatus, RegistryLookup,
};
use crate::guid::{ClassId, InterfaceId};
use crate::model::ThreadingModel;

const CO_E_NOTINITIALIZED: HResult = HResult(0x8004_01F0_u32 as i32);

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Fixture {
    pub registry: FixtureRegistry,
    pub runtime: FixtureRuntime,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture: {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid fixture: {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('\\').to_ascii_lowercase()
}

#[derive(Debug, Default, Deserialize)]
#[serde(from = "RegistryDoc")]
pub struct FixtureRegistry {
    keys: BTreeMap<String, BTreeMap<String, String>>,
    errors: BTreeMap<String, RegStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RegistryDoc {
    keys: BTreeMap<String, BTreeMap<String, String>>,
    errors: BTreeMap<String, RegStatus>,
}

impl From<RegistryDoc> for FixtureRegistry {
    fn from(doc: RegistryDoc) -> Self {
        let mut registry = FixtureRegistry::default();
        for (path, values) in doc.keys {
            registry = registry.with_key(&path);
            for (name, value) in values {
                registry = registry.with_value(&path, &name, &value);
            }
        }
        for (path, code) in doc.errors {
            registry = registry.with_error(&path, code);
        }
        registry
    }
}

impl FixtureRegistry {
    pub fn with_key(mut self, path: &str) -> Self {
        self.keys.entry(normalize(path)).or_default();
        self
    }

    /// An empty `name` sets the key's default value.
    pub fn with_value(mut self, path: &str, name: &str, value: &str) -> Self {
        self.keys
            .entry(normalize(path))
            .or_default()
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Every lookup touching `path` fails with `code`.
    pub fn with_error(mut self, path: &str, code: RegStatus) -> Self {
        self.errors.insert(normalize(path), code);
        self
    }

    fn check_error(&self, path: &str) -> Result<(), RegStatus> {
        match self.errors.get(path) {
            Some(code) => Err(*code),
            None => Ok(()),
        }
    }
}

impl RegistryLookup for FixtureRegistry {
    fn get(&self, key_path: &str, value_name: Option<&str>) -> Result<Option<String>, RegStatus> {
        let path = normalize(key_path);
        self.check_error(&path)?;
        let name = value_name.unwrap_or_default().to_ascii_lowercase();
        Ok(self
            .keys
            .get(&path)
            .and_then(|values| values.get(&name))
            .cloned())
    }

    fn key_exists(&self, key_path: &str) -> Result<bool, RegStatus> {
        let path = normalize(key_path);
        self.check_error(&path)?;
        let prefix = format!("{path}\\");
        Ok(self
            .keys
            .keys()
            .any(|k| *k == path || k.starts_with(&prefix)))
    }
}

/// Runtime behaviour of one class.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FixtureClass {
    /// In-process activation succeeds.
    pub in_proc: bool,
    /// Activation failure code when `in_proc` is false.
    pub create_error: Option<HResult>,
    pub agile: bool,
    /// Failure code for the `IAgileObject` query; overrides `agile`.
    pub agile_error: Option<HResult>,
    pub marshal: bool,
    /// Failure code for the `IMarshal` query; overrides `marshal`.
    pub marshal_error: Option<HResult>,
    /// Reported by `GetUnmarshalClass`; absent means that call fails.
    pub unmarshal_class: Option<ClassId>,
    /// A class factory is registered with the running process.
    pub class_factory: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureInterface {
    Unknown,
    Agile,
    Marshal,
    ClassFactory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureObject {
    pub clsid: ClassId,
    pub interface: FixtureInterface,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FixtureRuntime {
    classes: BTreeMap<ClassId, FixtureClass>,
    prog_ids: BTreeMap<String, ClassId>,
    context_failure: Option<HResult>,

    #[serde(skip)]
    open: RefCell<Vec<ThreadingModel>>,
    #[serde(skip)]
    log: RefCell<Vec<ThreadingModel>>,
    #[serde(skip)]
    left: Cell<usize>,
    #[serde(skip)]
    peak_open: Cell<usize>,
    #[serde(skip)]
    instances: Cell<usize>,
}

impl FixtureRuntime {
    pub fn with_class(mut self, clsid: ClassId, class: FixtureClass) -> Self {
        self.classes.insert(clsid, class);
        self
    }

    pub fn with_prog_id(mut self, prog_id: &str, clsid: ClassId) -> Self {
        self.prog_ids.insert(prog_id.to_ascii_lowercase(), clsid);
        self
    }

    pub fn with_context_failure(mut self, code: HResult) -> Self {
        self.context_failure = Some(code);
        self
    }

    pub fn open_contexts(&self) -> usize {
        self.open.borrow().len()
    }

    pub fn peak_open_contexts(&self) -> usize {
        self.peak_open.get()
    }

    /// Models requested by every successful entry, in order.
    pub fn context_log(&self) -> Vec<ThreadingModel> {
        self.log.borrow().clone()
    }

    pub fn leave_count(&self) -> usize {
        self.left.get()
    }

    pub fn instances_created(&self) -> usize {
        self.instances.get()
    }

    fn require_context(&self) -> Result<(), HResult> {
        if self.open_contexts() == 0 {
            return Err(CO_E_NOTINITIALIZED);
        }
        Ok(())
    }

    fn class(&self, clsid: &ClassId) -> Option<&FixtureClass> {
        self.classes.get(clsid)
    }

    fn class_of(&self, object: &FixtureObject) -> Result<&FixtureClass, HResult> {
        self.class(&object.clsid).ok_or(HResult::E_FAIL)
    }
}

fn is_sta(model: ThreadingModel) -> bool {
    model == ThreadingModel::SingleThreaded
}

impl ComponentRuntime for FixtureRuntime {
    type Object = FixtureObject;

    fn enter_context(&self, model: ThreadingModel) -> Result<ContextToken, HResult> {
        if let Some(code) = self.context_failure {
            return Err(code);
        }
        let mut open = self.open.borrow_mut();
        if let Some(current) = open.last()
            && is_sta(*current) != is_sta(model)
        {
            return Err(HResult::RPC_E_CHANGED_MODE);
        }
        open.push(model);
        self.peak_open.set(self.peak_open.get().max(open.len()));
        self.log.borrow_mut().push(model);
        Ok(ContextToken { model })
    }

    fn leave_context(&self, _token: ContextToken) {
        self.open.borrow_mut().pop();
        self.left.set(self.left.get() + 1);
    }

    fn create_instance(
        &self,
        clsid: &ClassId,
        context: ActivationContext,
    ) -> Result<FixtureObject, HResult> {
        self.require_context()?;
        let class = self.class(clsid).ok_or(HResult::REGDB_E_CLASSNOTREG)?;
        if context != ActivationContext::InProcServer || !class.in_proc {
            return Err(class.create_error.unwrap_or(HResult::REGDB_E_CLASSNOTREG));
        }
        self.instances.set(self.instances.get() + 1);
        Ok(FixtureObject {
            clsid: *clsid,
            interface: FixtureInterface::Unknown,
        })
    }

    fn query_capability(
        &self,
        object: &FixtureObject,
        capability: Capability,
    ) -> Result<Option<FixtureObject>, HResult> {
        let class = self.class_of(object)?;
        let (present, failure, interface) = match capability {
            Capability::Agile => (class.agile, class.agile_error, FixtureInterface::Agile),
            Capability::Marshal => (class.marshal, class.marshal_error, FixtureInterface::Marshal),
        };
        if let Some(code) = failure {
            return Err(code);
        }
        Ok(present.then(|| FixtureObject {
            clsid: object.clsid,
            interface,
        }))
    }

    fn get_unmarshal_class(
        &self,
        marshal: &FixtureObject,
        _iid: &InterfaceId,
        _context: MarshalContext,
        _flags: MarshalFlags,
    ) -> Result<ClassId, HResult> {
        if marshal.interface != FixtureInterface::Marshal {
            return Err(HResult::E_NOINTERFACE);
        }
        self.class_of(marshal)?
            .unmarshal_class
            .ok_or(HResult::E_FAIL)
    }

    fn get_class_factory(
        &self,
        clsid: &ClassId,
        _context: ActivationContext,
    ) -> Result<FixtureObject, HResult> {
        self.require_context()?;
        match self.class(clsid) {
            Some(class) if class.class_factory => Ok(FixtureObject {
                clsid: *clsid,
                interface: FixtureInterface::ClassFactory,
            }),
            _ => Err(HResult::REGDB_E_CLASSNOTREG),
        }
    }

    fn resolve_prog_id(&self, prog_id: &str) -> Result<ClassId, HResult> {
        // CO_E_CLASSSTRING
        const INVALID_CLASS_STRING: HResult = HResult(0x8004_01F3_u32 as i32);
        self.prog_ids
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(prog_id))
            .map(|(_, clsid)| *clsid)
            .ok_or(INVALID_CLASS_STRING)
    }
}
