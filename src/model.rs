//! Threading-model verdicts and the provenance that justifies them.
//!
//! A [`ConcurrencyProfile`] carries one [`EvidenceTier`] per OS-version
//! regime. The legacy regime predates `IAgileObject`, so agile-object
//! evidence only ever lands in the modern tier.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadingModel {
    /// `Apartment` in the registry.
    SingleThreaded,
    /// `Free` in the registry.
    MultiThreaded,
    /// Either single- or multi-threaded, chosen per instantiation.
    Both,
    ThreadNeutral,
}

impl ThreadingModel {
    /// Maps a registry `ThreadingModel` value. Comparison ignores ASCII case.
    pub fn from_registry_value(value: &str) -> Option<Self> {
        const TABLE: [(&str, ThreadingModel); 4] = [
            ("Apartment", ThreadingModel::SingleThreaded),
            ("Free", ThreadingModel::MultiThreaded),
            ("Both", ThreadingModel::Both),
            ("Neutral", ThreadingModel::ThreadNeutral),
        ];
        TABLE
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(value))
            .map(|(_, model)| *model)
    }

    pub fn is_neutral(self) -> bool {
        self == ThreadingModel::ThreadNeutral
    }
}

impl fmt::Display for ThreadingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ThreadingModel::SingleThreaded => "single-threaded",
            ThreadingModel::MultiThreaded => "multi-threaded",
            ThreadingModel::Both => "both",
            ThreadingModel::ThreadNeutral => "thread-neutral",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    RegistryDeclared,
    FreeThreadedMarshalerDetected,
    /// Activation-context manifests can override the registry, but there is
    /// no public API to inspect them. Never produced.
    ManifestDeclared,
    AgileInterfaceDetected,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provenance::RegistryDeclared => "registry",
            Provenance::FreeThreadedMarshalerDetected => "free-threaded marshaler",
            Provenance::ManifestDeclared => "manifest",
            Provenance::AgileInterfaceDetected => "IAgileObject",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvidenceTier {
    pub model: ThreadingModel,
    pub provenance: Provenance,
}

impl EvidenceTier {
    pub const fn new(model: ThreadingModel, provenance: Provenance) -> Self {
        Self { model, provenance }
    }

    pub const fn registry(model: ThreadingModel) -> Self {
        Self::new(model, Provenance::RegistryDeclared)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    /// Windows 7 and earlier.
    Legacy,
    /// Windows 8 and newer.
    Modern,
}

impl Regime {
    pub fn label(self) -> &'static str {
        match self {
            Regime::Legacy => "Windows 7",
            Regime::Modern => "Windows 8 and newer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConcurrencyProfile {
    legacy: EvidenceTier,
    modern: EvidenceTier,
}

impl ConcurrencyProfile {
    pub const fn uniform(tier: EvidenceTier) -> Self {
        Self {
            legacy: tier,
            modern: tier,
        }
    }

    pub fn legacy(&self) -> EvidenceTier {
        self.legacy
    }

    pub fn modern(&self) -> EvidenceTier {
        self.modern
    }

    pub fn tier(&self, regime: Regime) -> EvidenceTier {
        match regime {
            Regime::Legacy => self.legacy,
            Regime::Modern => self.modern,
        }
    }

    /// Replaces the modern tier only.
    pub fn with_modern(self, modern: EvidenceTier) -> Self {
        Self { modern, ..self }
    }

    /// Promotes both regimes on evidence that holds regardless of OS version.
    ///
    /// The legacy tier never weakens: a thread-neutral legacy tier is kept.
    /// A modern tier that is already thread-neutral keeps its provenance.
    pub fn promote_neutral(self, provenance: Provenance) -> Self {
        let neutral = EvidenceTier::new(ThreadingModel::ThreadNeutral, provenance);
        Self {
            legacy: if self.legacy.model.is_neutral() {
                self.legacy
            } else {
                neutral
            },
            modern: if self.modern.model.is_neutral() {
                self.modern
            } else {
                neutral
            },
        }
    }

    pub fn is_version_dependent(&self) -> bool {
        self.legacy.model != self.modern.model
    }
}

/// Which side of a call the profile describes. Labels reports only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassRole {
    Server,
    ProxyStub,
}

impl fmt::Display for ClassRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClassRole::Server => "Server",
            ClassRole::ProxyStub => "Proxy",
        })
    }
}
