use std::env;
use std::path::PathBuf;

use crate::backend::ComponentRuntime;
use crate::cli::{Cli, OutputFormat};
use crate::error::ResolveError;
use crate::guid::{ClassId, Guid, InterfaceId};

pub const FIXTURE_ENV: &str = "APARTMENT_FINDER_FIXTURE";

/// Run-wide settings. Built once, then only ever borrowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub verbose: bool,
    pub descriptive: bool,
    pub format: OutputFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: false,
            descriptive: true,
            format: OutputFormat::Text,
        }
    }
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            verbose: cli.verbose,
            descriptive: !cli.brief,
            format: cli.format,
        }
    }
}

pub fn resolve_fixture_path(cli: &Cli) -> Option<PathBuf> {
    if let Some(p) = cli.fixture.clone() {
        return Some(p);
    }

    env::var_os(FIXTURE_ENV)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

/// The class (and optionally the interface) a run is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub clsid: ClassId,
    pub prog_id: Option<String>,
    pub iid: Option<InterfaceId>,
}

/// Turns the positional arguments into identifiers. Anything not starting
/// with `{` is taken to be a ProgID.
pub fn resolve_target<R: ComponentRuntime + ?Sized>(
    cli: &Cli,
    runtime: &R,
) -> Result<Target, ResolveError> {
    let raw = cli.target.trim();
    let (clsid, prog_id) = if raw.starts_with('{') {
        let clsid = Guid::parse_registry_format(raw).map_err(|_| {
            ResolveError::MalformedIdentifier {
                what: "CLSID",
                value: raw.to_string(),
            }
        })?;
        (clsid, None)
    } else {
        let clsid = runtime
            .resolve_prog_id(raw)
            .map_err(|code| ResolveError::UnknownProgId {
                prog_id: raw.to_string(),
                code,
            })?;
        (clsid, Some(raw.to_string()))
    };

    let iid = cli
        .iid
        .as_deref()
        .map(|raw| {
            Guid::parse_registry_format(raw).map_err(|_| ResolveError::MalformedIdentifier {
                what: "IID",
                value: raw.to_string(),
            })
        })
        .transpose()?;

    tracing::info!(%clsid, "using CLSID");
    if let Some(prog_id) = &prog_id {
        tracing::info!(prog_id = %prog_id, "obtained from ProgID");
    }
    if let Some(iid) = &iid {
        tracing::info!(%iid, "using IID");
    }

    Ok(Target {
        clsid,
        prog_id,
        iid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureRuntime;
    use clap::Parser;

    const CLSID: &str = "{AAAAAAAA-0000-0000-0000-000000000001}";
    const IID: &str = "{BBBBBBBB-0000-0000-0000-000000000002}";

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["apartment-finder"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn brief_flag_disables_descriptive_text() {
        let config = Config::from_cli(&cli(&["-v", "--brief", CLSID]));
        assert!(config.verbose);
        assert!(!config.descriptive);
        assert_eq!(config.format, OutputFormat::Text);
    }

    #[test]
    fn resolves_clsid_and_iid() {
        let runtime = FixtureRuntime::default();
        let target = resolve_target(&cli(&[CLSID, IID]), &runtime).unwrap();
        assert_eq!(target.clsid.to_string(), CLSID);
        assert_eq!(target.iid.map(|g| g.to_string()).as_deref(), Some(IID));
        assert_eq!(target.prog_id, None);
    }

    #[test]
    fn resolves_prog_id_through_the_runtime() {
        let clsid: ClassId = CLSID.parse().unwrap();
        let runtime = FixtureRuntime::default().with_prog_id("Demo.Object", clsid);
        let target = resolve_target(&cli(&["Demo.Object"]), &runtime).unwrap();
        assert_eq!(target.clsid, clsid);
        assert_eq!(target.prog_id.as_deref(), Some("Demo.Object"));
        assert_eq!(target.iid, None);
    }

    #[test]
    fn malformed_identifiers_are_rejected() {
        let runtime = FixtureRuntime::default();
        let err = resolve_target(&cli(&["{AAAAAAAA-0000}"]), &runtime).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::MalformedIdentifier { what: "CLSID", .. }
        ));

        let err = resolve_target(&cli(&[CLSID, "{nope}"]), &runtime).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::MalformedIdentifier { what: "IID", .. }
        ));

        let err = resolve_target(&cli(&["No.Such.ProgId"]), &runtime).unwrap_err();
        assert!(matches!(err, ResolveError::UnknownProgId { .. }));
    }
}
