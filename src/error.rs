use serde::Serialize;
use thiserror::Error;

use crate::backend::{Capability, HResult, RegStatus};
use crate::guid::{ClassId, InterfaceId};
use crate::model::ConcurrencyProfile;

/// Why the registry could not seed a profile for a class.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("class is not a registered in-process server")]
    ClassNotRegistered,

    #[error("registry lookup failed with code {0}")]
    LookupFailed(RegStatus),

    #[error("unrecognized ThreadingModel value {0:?}")]
    UnrecognizedModelValue(String),
}

pub type ClassificationOutcome = Result<ConcurrencyProfile, ClassifyError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Unparseable identifier or unrecognized registry data.
    MalformedInput,
    /// Something the next step needs was not supplied.
    MissingPrerequisite,
    /// The class or its marshaling metadata is not registered anywhere.
    NotFound,
    /// A registry read failed for a reason other than absence.
    Lookup,
    /// The runtime could not provide a concurrency context.
    Environment,
}

/// Failures that end a resolution run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("failed to parse {what}: {value:?}")]
    MalformedIdentifier { what: &'static str, value: String },

    #[error("invalid ProgID {prog_id:?} (code {code})")]
    UnknownProgId { prog_id: String, code: HResult },

    #[error("{key} query failed with code {code}")]
    LookupFailed { key: String, code: RegStatus },

    #[error("class {clsid} has an unrecognized ThreadingModel value {value:?}")]
    UnrecognizedModelValue { clsid: ClassId, value: String },

    #[error("CLSID is not a registered local server")]
    NotLocalServer,

    #[error("could not enter a multi-threaded apartment to look up class factories (code {0})")]
    ContextUnavailable(HResult),

    #[error("an IID must be provided to proceed any further")]
    InterfaceRequired,

    #[error("could not resolve the proxy/stub CLSID of {iid}")]
    ProxyStubNotRegistered { iid: InterfaceId },

    #[error("could not parse proxy/stub CLSID {value:?}")]
    MalformedProxyStubClsid { value: String },

    #[error("could not resolve proxy/stub threading model of {clsid}: {source}")]
    ProxyStubUnclassified {
        clsid: ClassId,
        #[source]
        source: ClassifyError,
    },
}

impl ResolveError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ResolveError::MalformedIdentifier { .. }
            | ResolveError::UnknownProgId { .. }
            | ResolveError::UnrecognizedModelValue { .. }
            | ResolveError::MalformedProxyStubClsid { .. } => FailureKind::MalformedInput,
            ResolveError::InterfaceRequired => FailureKind::MissingPrerequisite,
            ResolveError::NotLocalServer | ResolveError::ProxyStubNotRegistered { .. } => {
                FailureKind::NotFound
            }
            ResolveError::ProxyStubUnclassified { source, .. } => match source {
                ClassifyError::UnrecognizedModelValue(_) => FailureKind::MalformedInput,
                ClassifyError::ClassNotRegistered => FailureKind::NotFound,
                ClassifyError::LookupFailed(_) => FailureKind::Lookup,
            },
            ResolveError::LookupFailed { .. } => FailureKind::Lookup,
            ResolveError::ContextUnavailable(_) => FailureKind::Environment,
        }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self.kind() {
            FailureKind::MalformedInput => 2,
            FailureKind::MissingPrerequisite => 3,
            _ => 1,
        }
    }
}

/// Non-fatal conditions. Each one means the verdict rests on less evidence
/// than was asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    #[error("could not enter a {model} apartment (code {code}); results might be incomplete")]
    ContextUnavailable { model: String, code: HResult },

    #[error("could not create an in-process instance of {clsid} (code {code}); results might be incomplete")]
    InstantiationFailed { clsid: ClassId, code: HResult },

    #[error("IID required to query for the free-threaded marshaler; results might be incomplete")]
    InterfaceIdMissing,

    #[error("querying for {capability} failed (code {code})")]
    CapabilityQueryFailed { capability: String, code: HResult },

    #[error("IMarshal::GetUnmarshalClass failed (code {code})")]
    UnmarshalClassFailed { code: HResult },

    #[error("class also registers out-of-process, but its proxy could not be resolved: {reason}")]
    ProxyUnresolved { reason: String },
}

impl Warning {
    pub fn capability_query_failed(capability: Capability, code: HResult) -> Self {
        Warning::CapabilityQueryFailed {
            capability: capability.to_string(),
            code,
        }
    }
}

pub(crate) fn record_warning(warnings: &mut Vec<Warning>, warning: Warning) {
    tracing::debug!(%warning, "recorded warning");
    warnings.push(warning);
}
