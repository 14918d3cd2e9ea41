use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use code_installer::{CodeInstaller, CodeInstallResult, InstallerConfig, StandaloneRuntime, StubInstallResult, VmRuntime};
use compilation_result::CompilationResult;

mod summary;

/// Parse a single key-value pair
fn parse_key_val<T, U>(s: &str) -> Result<(T, U), Box<dyn Error + Send + Sync>>
    where
        T: FromStr,
        T::Err: Error + Send + Sync + 'static,
        U: FromStr,
        U::Err: Error + Send + Sync + 'static,
{
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{}`", s))?;
    Ok((s[..pos].parse()?, s[pos + 1..].parse()?))
}

#[derive(Parser, Debug, Clone)]
#[clap(version, about = "installs compiled units into a described runtime and prints what was installed")]
pub struct InstallArgs {
    #[clap(short, long, help = "the runtime description")]
    runtime: PathBuf,
    #[clap(short, long, help = "installer config, defaults to amd64 little endian")]
    config: Option<PathBuf>,
    #[clap(short = 'p', long = "property", help = "config overrides", value_parser = parse_key_val::<String, String>, num_args = 1)]
    properties: Vec<(String, String)>,
    #[clap(short, long, help = "more logging, repeatable", action = clap::ArgAction::Count)]
    verbose: u8,
    #[clap(required = true, help = "compiled units, installed in order")]
    units: Vec<PathBuf>,
}

fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let default_directive = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))
}

fn load_unit(path: &Path) -> anyhow::Result<CompilationResult> {
    let unit_string = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    ron::from_str(unit_string.as_str()).with_context(|| format!("parsing {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let args: InstallArgs = InstallArgs::parse();
    init_logging(args.verbose)?;
    let config = match args.config.as_ref() {
        Some(path) => InstallerConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => InstallerConfig::default(),
    }.with_overrides(&args.properties)?;
    let runtime = StandaloneRuntime::load(&args.runtime, &config).with_context(|| format!("loading runtime {}", args.runtime.display()))?;
    let installer = CodeInstaller::new(&runtime, config);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for path in args.units.iter() {
        let unit = load_unit(path)?;
        info!(unit = unit.name.as_str(), sites = unit.sites.len(), "loaded");
        let id = if unit.method.is_some() {
            match installer.install_method(&unit).with_context(|| format!("installing {}", unit.name))? {
                CodeInstallResult::Ok(id) => id,
                CodeInstallResult::DependenciesFailed(violation) => {
                    writeln!(out, "{}: not installed, {}", unit.name, violation)?;
                    continue;
                }
                CodeInstallResult::CacheFull(full) => bail!("{}: {}", unit.name, full),
            }
        } else {
            match installer.install_stub(&unit).with_context(|| format!("installing {}", unit.name))? {
                StubInstallResult::Ok { id, stub_id } => {
                    writeln!(out, "{}: stub id {}", unit.name, stub_id)?;
                    id
                }
                StubInstallResult::CacheFull(full) => bail!("{}: {}", unit.name, full),
            }
        };
        let installed = runtime.method_table().read().try_lookup(id).ok_or_else(|| anyhow!("{} vanished after install", unit.name))?;
        summary::write_installed(&mut out, &installed)?;
    }
    Ok(())
}
