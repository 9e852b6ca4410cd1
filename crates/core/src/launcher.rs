// crates/core/src/launcher.rs
//! Builds the commands that run the inventory tool.
//!
//! [`JobLauncher`] is the seam between the orchestrator and the concrete
//! tool. [`PowerShellLauncher`] drives `Invoke-ARI` through `pwsh`.

use std::path::{Path, PathBuf};

use crate::command::{CommandSpec, EnvVar};
use crate::request::JobRequest;

/// Environment variable carrying the service principal secret into the script.
pub const SECRET_ENV_VAR: &str = "ARI_APP_SECRET";

/// The three diagnostic commands behind `GET /api/check-environment`.
#[derive(Debug, Clone)]
pub struct EnvironmentChecks {
    pub powershell: CommandSpec,
    pub ari_module: CommandSpec,
    pub azure_modules: CommandSpec,
}

/// Produces the external invocations for inventory jobs.
pub trait JobLauncher: Send + Sync {
    /// Build the inventory command writing its output into `report_dir`.
    ///
    /// Must be deterministic: the same request and directory always yield
    /// the same command.
    fn inventory_command(&self, request: &JobRequest, report_dir: &Path) -> CommandSpec;

    /// Commands used to check the host environment.
    fn environment_checks(&self) -> EnvironmentChecks;

    /// Launcher name for logs.
    fn name(&self) -> &str;
}

/// Launcher for the AzureResourceInventory PowerShell module.
#[derive(Debug, Clone)]
pub struct PowerShellLauncher {
    pwsh_path: PathBuf,
    module_path: Option<String>,
}

impl PowerShellLauncher {
    pub fn new(pwsh_path: impl Into<PathBuf>) -> Self {
        Self {
            pwsh_path: pwsh_path.into(),
            module_path: None,
        }
    }

    /// Override `PSModulePath` for every spawned `pwsh`.
    pub fn with_module_path(mut self, module_path: impl Into<String>) -> Self {
        self.module_path = Some(module_path.into());
        self
    }

    fn pwsh(&self, script: String) -> CommandSpec {
        let mut spec = CommandSpec::new(self.pwsh_path.to_string_lossy())
            .args(["-NoProfile", "-NonInteractive", "-Command"])
            .arg(script);
        if let Some(path) = &self.module_path {
            spec = spec.env(EnvVar::plain("PSModulePath", path));
        }
        spec
    }
}

impl JobLauncher for PowerShellLauncher {
    fn inventory_command(&self, request: &JobRequest, report_dir: &Path) -> CommandSpec {
        let mut spec = self.pwsh(inventory_script(request, report_dir));
        if let Some(sp) = &request.service_principal {
            spec = spec.env(EnvVar::sensitive(SECRET_ENV_VAR, sp.secret.expose()));
        }
        spec
    }

    fn environment_checks(&self) -> EnvironmentChecks {
        EnvironmentChecks {
            powershell: self.pwsh("$PSVersionTable.PSVersion.ToString()".to_string()),
            ari_module: self.pwsh(
                "Get-Module -ListAvailable -Name AzureResourceInventory | Select-Object Name, Version"
                    .to_string(),
            ),
            azure_modules: self.pwsh(
                "Get-Module -ListAvailable -Name Az.* | Select-Object Name, Version | Sort-Object Name"
                    .to_string(),
            ),
        }
    }

    fn name(&self) -> &str {
        "pwsh"
    }
}

/// Render the `Invoke-ARI` script for a request.
///
/// Values are embedded as single-quoted PowerShell literals; the secret is
/// read from the environment so it never appears in the script text.
pub fn inventory_script(request: &JobRequest, report_dir: &Path) -> String {
    let mut params = vec![
        format!("TenantID = {}", ps_quote(&request.tenant_id)),
        "ReportDir = $ReportDir".to_string(),
        format!("ReportName = {}", ps_quote(&request.report_name)),
        format!("AzureEnvironment = {}", ps_quote(&request.azure_environment)),
    ];
    if let Some(sub) = &request.subscription_id {
        params.push(format!("SubscriptionID = {}", ps_quote(sub)));
    }
    if let Some(sp) = &request.service_principal {
        params.push(format!("AppId = {}", ps_quote(&sp.app_id)));
        params.push(format!("Secret = $env:{SECRET_ENV_VAR}"));
    }

    let flags = request.flags;
    for (enabled, name) in [
        (flags.include_tags, "IncludeTags"),
        (flags.security_center, "SecurityCenter"),
        (flags.skip_diagram, "SkipDiagram"),
        (flags.skip_advisory, "SkipAdvisory"),
        (flags.lite, "Lite"),
        (flags.debug, "Debug"),
    ] {
        if enabled {
            params.push(format!("{name} = $true"));
        }
    }

    let params = params
        .iter()
        .map(|p| format!("    {p};"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Import-Module AzureResourceInventory -Force;
$ErrorActionPreference = 'Stop';
$ReportDir = {report_dir};
if (!(Test-Path $ReportDir)) {{
    New-Item -ItemType Directory -Path $ReportDir -Force | Out-Null;
}}
$params = @{{
{params}
}};
Write-Host "Connecting to Azure...";
try {{
    Invoke-ARI @params;
    Write-Host "Azure Resource Inventory completed successfully!";
    Get-ChildItem -Path $ReportDir -File | ForEach-Object {{ Write-Host "Generated: $($_.Name) ($($_.Length) bytes)" }};
}}
catch {{
    Write-Error "Error executing ARI: $($_.Exception.Message)";
    throw;
}}"#,
        report_dir = ps_quote(&report_dir.to_string_lossy()),
    )
}

/// Quote a value as a PowerShell verbatim string.
///
/// PowerShell also treats the typographic single quotes as delimiters, so
/// those are doubled too.
pub fn ps_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if matches!(c, '\'' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}') {
            out.push(c);
        }
        out.push(c);
    }
    out.push('\'');
    out
}
