//! Contracts for the two external services the engine queries: the class
//! registration store and the component runtime.
//!
//! Implementations: [`crate::fixture`] (JSON-described, any platform) and
//! `crate::sys` (native, Windows only).

use std::fmt;

use crate::guid::{ClassId, InterfaceId};
use crate::model::ThreadingModel;

/// Win32 status code returned by registry functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RegStatus(pub u32);

impl RegStatus {
    pub const FILE_NOT_FOUND: RegStatus = RegStatus(2);

    pub fn is_not_found(self) -> bool {
        self == Self::FILE_NOT_FOUND
    }
}

impl fmt::Display for RegStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// COM `HRESULT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct HResult(pub i32);

impl HResult {
    pub const E_NOINTERFACE: HResult = HResult(0x8000_4002_u32 as i32);
    pub const E_FAIL: HResult = HResult(0x8000_4005_u32 as i32);
    pub const REGDB_E_CLASSNOTREG: HResult = HResult(0x8004_0154_u32 as i32);
    pub const RPC_E_CHANGED_MODE: HResult = HResult(0x8001_0106_u32 as i32);

    pub fn is_no_interface(self) -> bool {
        self == Self::E_NOINTERFACE
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0 as u32)
    }
}

/// Read access to class registration data rooted at `HKEY_CLASSES_ROOT`.
pub trait RegistryLookup {
    /// Reads a string value. `None` as `value_name` reads the key's default
    /// value. Returns `Ok(None)` when the key or the value is absent.
    fn get(&self, key_path: &str, value_name: Option<&str>) -> Result<Option<String>, RegStatus>;

    fn key_exists(&self, key_path: &str) -> Result<bool, RegStatus>;
}

/// Where an object may be activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationContext {
    InProcServer,
    LocalServer,
}

/// Optional interfaces the prober asks a live object for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IAgileObject`.
    Agile,
    /// `IMarshal`.
    Marshal,
}

impl Capability {
    pub fn interface_id(self) -> InterfaceId {
        match self {
            Capability::Agile => crate::guid::IID_IAGILE_OBJECT,
            Capability::Marshal => crate::guid::IID_IMARSHAL,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Agile => "IAgileObject",
            Capability::Marshal => "IMarshal",
        })
    }
}

/// Destination context passed to `IMarshal::GetUnmarshalClass`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarshalContext {
    InProc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarshalFlags {
    Normal,
}

/// Proof that a concurrency context was entered; handed back on leave.
#[derive(Debug)]
pub struct ContextToken {
    pub model: ThreadingModel,
}

/// The component runtime (COM). Every call is synchronous.
pub trait ComponentRuntime {
    /// A live interface pointer. Dropping it releases the reference.
    type Object;

    fn enter_context(&self, model: ThreadingModel) -> Result<ContextToken, HResult>;

    fn leave_context(&self, token: ContextToken);

    fn create_instance(
        &self,
        clsid: &ClassId,
        context: ActivationContext,
    ) -> Result<Self::Object, HResult>;

    /// `Ok(None)` when the object does not implement the capability.
    fn query_capability(
        &self,
        object: &Self::Object,
        capability: Capability,
    ) -> Result<Option<Self::Object>, HResult>;

    fn get_unmarshal_class(
        &self,
        marshal: &Self::Object,
        iid: &InterfaceId,
        context: MarshalContext,
        flags: MarshalFlags,
    ) -> Result<ClassId, HResult>;

    fn get_class_factory(
        &self,
        clsid: &ClassId,
        context: ActivationContext,
    ) -> Result<Self::Object, HResult>;

    /// Name to identifier resolution (`CLSIDFromProgID`).
    fn resolve_prog_id(&self, prog_id: &str) -> Result<ClassId, HResult>;
}
