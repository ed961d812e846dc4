use anyhow::Result;

use crate::cli::OutputFormat;
use crate::config::Config;
use crate::model::{EvidenceTier, Provenance, Regime, ThreadingModel};
use crate::reconcile::Consistency;
use crate::resolve::{ClassReport, Resolution};

pub fn render(resolution: &Resolution, config: &Config) -> Result<String> {
    let content = match config.format {
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(resolution)?;
            json.push('\n');
            json
        }
        OutputFormat::Text => {
            let mut out = String::new();
            for warning in &resolution.warnings {
                out.push_str(&format!("WARNING: {warning}\n"));
            }
            let reports = [&resolution.server, &resolution.proxy];
            for (idx, report) in reports.into_iter().flatten().enumerate() {
                if idx > 0 {
                    out.push('\n');
                }
                if config.descriptive {
                    out.push_str(&describe(report));
                } else {
                    out.push_str(&summarize(report));
                }
            }
            out
        }
    };
    Ok(content)
}

fn model_description(model: ThreadingModel) -> &'static str {
    match model {
        ThreadingModel::SingleThreaded => {
            "single-threaded:\nCalls from any other apartment must go through a proxy.\n"
        }
        ThreadingModel::MultiThreaded => {
            "multi-threaded:\nCalls from any single-threaded apartment must go through a proxy.\n"
        }
        ThreadingModel::Both => {
            "either single-threaded or multi-threaded,\n    chosen by the apartment that creates it.\n"
        }
        ThreadingModel::ThreadNeutral => {
            "thread-neutral:\nAny thread in any apartment may call into this class directly.\n"
        }
    }
}

fn provenance_description(provenance: Provenance) -> &'static str {
    match provenance {
        Provenance::RegistryDeclared => "Determined from the class registration in the registry.\n",
        Provenance::FreeThreadedMarshalerDetected => {
            "The object aggregates the free-threaded marshaler.\n"
        }
        Provenance::ManifestDeclared => "Determined from an activation manifest.\n",
        Provenance::AgileInterfaceDetected => "The object implements IAgileObject.\n",
    }
}

fn push_tier(out: &mut String, tier: EvidenceTier) {
    out.push_str(model_description(tier.model));
    out.push_str(provenance_description(tier.provenance));
}

/// Same model in both regimes, but the modern one rests on other evidence.
fn distinct_modern_provenance(report: &ClassReport) -> Option<Provenance> {
    let (legacy, modern) = (report.profile.legacy(), report.profile.modern());
    (modern.provenance != legacy.provenance).then_some(modern.provenance)
}

fn describe(report: &ClassReport) -> String {
    let mut out = format!("{} {}\n", report.role, report.clsid);
    if let Some(path) = &report.module_path {
        out.push_str(&format!("Module: {path}\n"));
    }
    if report.automation_marshaler {
        out.push_str("Marshaled by the automation (type library) marshaler.\n");
    }

    match report.consistency {
        Consistency::VersionIndependent => {
            out.push_str("Threading model is ");
            push_tier(&mut out, report.profile.legacy());
            if let Some(provenance) = distinct_modern_provenance(report) {
                out.push_str(&format!(
                    "On {}, additionally: {}",
                    Regime::Modern.label(),
                    provenance_description(provenance)
                ));
            }
        }
        Consistency::VersionDependent => {
            out.push_str("Threading model differs by OS version.\n");
            for regime in [Regime::Legacy, Regime::Modern] {
                out.push_str(&format!("\nOn {}, the threading model is ", regime.label()));
                push_tier(&mut out, report.profile.tier(regime));
            }
        }
    }
    out
}

fn summarize(report: &ClassReport) -> String {
    let tier = |t: EvidenceTier| format!("{} ({})", t.model, t.provenance);
    let verdict = match report.consistency {
        Consistency::VersionIndependent => match distinct_modern_provenance(report) {
            Some(provenance) => format!(
                "{}; {}: {provenance}",
                tier(report.profile.legacy()),
                Regime::Modern.label()
            ),
            None => tier(report.profile.legacy()),
        },
        Consistency::VersionDependent => format!(
            "{}: {}; {}: {}",
            Regime::Legacy.label(),
            tier(report.profile.legacy()),
            Regime::Modern.label(),
            tier(report.profile.modern())
        ),
    };
    format!("{} {}: {verdict}\n", report.role, report.clsid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Warning;
    use crate::guid::ClassId;
    use crate::model::ConcurrencyProfile;
    use crate::proxy::ProxyStub;

    const CLSID: ClassId = ClassId::from_u128(0xaaaaaaaa_0000_0000_0000_000000000001);

    fn resolution(server: Option<ClassReport>, proxy: Option<ClassReport>) -> Resolution {
        Resolution {
            clsid: CLSID,
            prog_id: None,
            iid: None,
            server,
            proxy,
            warnings: Vec::new(),
        }
    }

    fn split_profile() -> ConcurrencyProfile {
        ConcurrencyProfile::uniform(EvidenceTier::registry(ThreadingModel::SingleThreaded))
            .with_modern(EvidenceTier::new(
                ThreadingModel::ThreadNeutral,
                Provenance::AgileInterfaceDetected,
            ))
    }

    #[test]
    fn version_independent_text_names_model_and_provenance() -> Result<()> {
        let report = ClassReport::server(
            CLSID,
            ConcurrencyProfile::uniform(EvidenceTier::registry(ThreadingModel::MultiThreaded)),
            None,
        );
        let text = render(&resolution(Some(report), None), &Config::default())?;
        assert!(text.starts_with("Server {AAAAAAAA-0000-0000-0000-000000000001}\n"));
        assert!(text.contains("Threading model is multi-threaded:"));
        assert!(text.contains("registry"));
        assert!(!text.contains("Windows 7"));
        Ok(())
    }

    #[test]
    fn version_dependent_text_splits_by_regime() -> Result<()> {
        let report = ClassReport::server(CLSID, split_profile(), None);
        let text = render(&resolution(Some(report), None), &Config::default())?;
        assert!(text.contains("differs by OS version"));
        assert!(text.contains("On Windows 7, the threading model is single-threaded"));
        assert!(text.contains("On Windows 8 and newer, the threading model is thread-neutral"));
        assert!(text.contains("IAgileObject"));
        Ok(())
    }

    fn neutral_by_both_mechanisms() -> ConcurrencyProfile {
        ConcurrencyProfile::uniform(EvidenceTier::registry(ThreadingModel::Both))
            .with_modern(EvidenceTier::new(
                ThreadingModel::ThreadNeutral,
                Provenance::AgileInterfaceDetected,
            ))
            .promote_neutral(Provenance::FreeThreadedMarshalerDetected)
    }

    #[test]
    fn uniform_model_still_names_distinct_modern_evidence() -> Result<()> {
        let report = ClassReport::server(CLSID, neutral_by_both_mechanisms(), None);
        let res = resolution(Some(report), None);

        let text = render(&res, &Config::default())?;
        assert!(text.contains("Threading model is thread-neutral"));
        assert!(text.contains("The object aggregates the free-threaded marshaler."));
        assert!(text.contains(
            "On Windows 8 and newer, additionally: The object implements IAgileObject."
        ));
        assert!(!text.contains("differs by OS version"));

        let brief = Config {
            descriptive: false,
            ..Config::default()
        };
        let line = render(&res, &brief)?;
        assert!(line.trim_end().ends_with(
            ": thread-neutral (free-threaded marshaler); Windows 8 and newer: IAgileObject"
        ));
        Ok(())
    }

    #[test]
    fn matching_provenance_is_printed_once() -> Result<()> {
        let report = ClassReport::server(
            CLSID,
            ConcurrencyProfile::uniform(EvidenceTier::registry(ThreadingModel::Both)),
            None,
        );
        let text = render(&resolution(Some(report), None), &Config::default())?;
        assert!(!text.contains("additionally"));
        Ok(())
    }

    #[test]
    fn brief_text_is_one_line_per_class() -> Result<()> {
        let config = Config {
            descriptive: false,
            ..Config::default()
        };
        let proxy = ClassReport::proxy(ProxyStub {
            clsid: CLSID,
            automation: true,
            profile: ConcurrencyProfile::uniform(EvidenceTier::registry(ThreadingModel::Both)),
        });
        let mut res = resolution(
            Some(ClassReport::server(CLSID, split_profile(), None)),
            Some(proxy),
        );
        res.warnings.push(Warning::InterfaceIdMissing);

        let text = render(&res, &config)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("WARNING: IID required"));
        assert!(lines[1].ends_with(
            "Windows 7: single-threaded (registry); Windows 8 and newer: thread-neutral (IAgileObject)"
        ));
        assert_eq!(lines[2], "");
        assert!(lines[3].starts_with("Proxy {AAAAAAAA"));
        assert!(lines[3].ends_with(": both (registry)"));
        Ok(())
    }

    #[test]
    fn json_carries_both_tiers_and_warnings() -> Result<()> {
        let config = Config {
            format: OutputFormat::Json,
            ..Config::default()
        };
        let mut res = resolution(Some(ClassReport::server(CLSID, split_profile(), None)), None);
        res.warnings.push(Warning::InterfaceIdMissing);

        let value: serde_json::Value = serde_json::from_str(&render(&res, &config)?)?;
        let server = &value["server"];
        assert_eq!(server["role"], "server");
        assert_eq!(server["consistency"], "version_dependent");
        assert_eq!(server["profile"]["legacy"]["model"], "single_threaded");
        assert_eq!(server["profile"]["modern"]["provenance"], "agile_interface_detected");
        assert!(value["proxy"].is_null());
        assert_eq!(value["warnings"][0]["kind"], "interface_id_missing");
        Ok(())
    }
}
