use crate::error::{ResponseError, Result};
use crate::types::{ContainmentKind, Verdict};
use mde_client::RemoteApiError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable consulted when `api.client_secret` is absent.
pub const CLIENT_SECRET_ENV: &str = "MDE_CLIENT_SECRET";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ApiConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_url")]
    pub url: String,
    pub auth_url: String,
    #[serde(default = "default_api_url")]
    pub resource: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_api_url() -> String {
    "https://api.securitycenter.microsoft.com".to_string()
}

fn default_user_agent() -> String {
    format!("mde-response/{}", env!("CARGO_PKG_VERSION"))
}

impl ApiConfig {
    /// The configured secret, falling back to [`CLIENT_SECRET_ENV`].
    pub fn resolve_secret(&self) -> Option<String> {
        self.client_secret
            .clone()
            .or_else(|| std::env::var(CLIENT_SECRET_ENV).ok())
            .filter(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------
// StatusConfig
// ---------------------------------------------------------------------------

/// Vendor status codes, grouped by what the engine does with them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_succeeded")]
    pub succeeded: String,
    #[serde(default = "default_failed")]
    pub failed: Vec<String>,
    /// An action in one of these states makes its machine unavailable.
    #[serde(default = "default_busy")]
    pub busy: Vec<String>,
    /// Submission error codes meaning another action got to the machine
    /// first. These send the submission back to waiting for availability.
    #[serde(default = "default_busy_error_codes")]
    pub busy_error_codes: Vec<String>,
}

fn default_succeeded() -> String {
    "Succeeded".to_string()
}

fn default_failed() -> Vec<String> {
    vec!["Failed".into(), "TimeOut".into(), "Cancelled".into()]
}

fn default_busy() -> Vec<String> {
    vec!["Pending".into(), "InProgress".into()]
}

fn default_busy_error_codes() -> Vec<String> {
    vec!["ActiveRequestAlreadyExists".into()]
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            succeeded: default_succeeded(),
            failed: default_failed(),
            busy: default_busy(),
            busy_error_codes: default_busy_error_codes(),
        }
    }
}

impl StatusConfig {
    pub fn is_succeeded(&self, status: &str) -> bool {
        self.succeeded == status
    }

    pub fn is_failed(&self, status: &str) -> bool {
        self.failed.iter().any(|s| s == status)
    }

    pub fn is_busy(&self, status: &str) -> bool {
        self.busy.iter().any(|s| s == status)
    }

    /// Whether a rejected submission only means the machine is busy.
    pub fn is_busy_rejection(&self, error: &RemoteApiError) -> bool {
        error
            .vendor_code()
            .is_some_and(|code| self.busy_error_codes.iter().any(|c| c == code))
    }
}

// ---------------------------------------------------------------------------
// ActionPolicy
// ---------------------------------------------------------------------------

/// Whether and when one containment kind fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_verdicts")]
    pub verdicts: Vec<Verdict>,
    /// Overrides [`ContainmentKind::default_comment`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Overrides [`ContainmentKind::default_type_code`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_code: Option<String>,
}

fn default_verdicts() -> Vec<Verdict> {
    vec![Verdict::Malicious]
}

impl Default for ActionPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            verdicts: default_verdicts(),
            comment: None,
            type_code: None,
        }
    }
}

impl ActionPolicy {
    pub fn triggers_on(&self, verdict: Verdict) -> bool {
        self.enabled && self.verdicts.contains(&verdict)
    }
}

// ---------------------------------------------------------------------------
// MachineActionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineActionConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// How long to wait for a machine to become available.
    #[serde(default = "default_machine_timeout")]
    pub machine_timeout_secs: u64,
    /// How long a submitted action may run before it is cancelled.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,
    /// Delay before re-reading a new live-response action for its command list.
    #[serde(default = "default_settle")]
    pub live_response_settle_secs: u64,
    #[serde(default = "default_max_parallel")]
    pub max_parallel_machines: usize,
    #[serde(default = "default_live_response_comment")]
    pub live_response_comment: String,
    #[serde(default)]
    pub statuses: StatusConfig,
    #[serde(default)]
    pub investigation_package: ActionPolicy,
    #[serde(default)]
    pub antivirus_scan: ActionPolicy,
    #[serde(default)]
    pub quarantine: ActionPolicy,
    #[serde(default)]
    pub isolation: ActionPolicy,
}

fn default_poll_interval() -> u64 {
    30
}

fn default_machine_timeout() -> u64 {
    300
}

fn default_job_timeout() -> u64 {
    180
}

fn default_settle() -> u64 {
    5
}

fn default_max_parallel() -> usize {
    4
}

fn default_live_response_comment() -> String {
    "mde-response file acquisition for".to_string()
}

impl Default for MachineActionConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            machine_timeout_secs: default_machine_timeout(),
            job_timeout_secs: default_job_timeout(),
            live_response_settle_secs: default_settle(),
            max_parallel_machines: default_max_parallel(),
            live_response_comment: default_live_response_comment(),
            statuses: StatusConfig::default(),
            investigation_package: ActionPolicy::default(),
            antivirus_scan: ActionPolicy::default(),
            quarantine: ActionPolicy::default(),
            isolation: ActionPolicy::default(),
        }
    }
}

impl MachineActionConfig {
    pub fn policy(&self, kind: ContainmentKind) -> &ActionPolicy {
        match kind {
            ContainmentKind::InvestigationPackage => &self.investigation_package,
            ContainmentKind::AntivirusScan => &self.antivirus_scan,
            ContainmentKind::Quarantine => &self.quarantine,
            ContainmentKind::Isolation => &self.isolation,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.live_response_settle_secs)
    }

    /// Status polls allowed per job: `floor(job_timeout / poll_interval)`.
    pub fn poll_budget(&self) -> u32 {
        budget(self.job_timeout_secs, self.poll_interval_secs)
    }

    /// Availability checks allowed per machine:
    /// `floor(machine_timeout / poll_interval)`.
    pub fn availability_budget(&self) -> u32 {
        budget(self.machine_timeout_secs, self.poll_interval_secs)
    }
}

fn budget(timeout_secs: u64, interval_secs: u64) -> u32 {
    if interval_secs == 0 {
        return 0;
    }
    u32::try_from(timeout_secs / interval_secs).unwrap_or(u32::MAX)
}

// ---------------------------------------------------------------------------
// AlertConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_alert_statuses")]
    pub statuses: Vec<String>,
    #[serde(default = "default_severities")]
    pub severities: Vec<String>,
    #[serde(default = "default_entity_types")]
    pub evidence_entity_types: Vec<String>,
    #[serde(default = "default_max_alerts")]
    pub max_alert_count: u32,
    /// Lookback window for alert creation time.
    #[serde(default = "default_time_span")]
    pub time_span_secs: u64,
}

fn default_alert_statuses() -> Vec<String> {
    vec!["Unknown".into(), "New".into(), "InProgress".into()]
}

fn default_severities() -> Vec<String> {
    vec![
        "Informational".into(),
        "Low".into(),
        "Medium".into(),
        "High".into(),
    ]
}

fn default_entity_types() -> Vec<String> {
    vec!["File".into(), "Process".into()]
}

fn default_max_alerts() -> u32 {
    10_000
}

fn default_time_span() -> u64 {
    3600
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            statuses: default_alert_statuses(),
            severities: default_severities(),
            evidence_entity_types: default_entity_types(),
            max_alert_count: default_max_alerts(),
            time_span_secs: default_time_span(),
        }
    }
}

// ---------------------------------------------------------------------------
// DownloadConfig / StoreConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_download_dir")]
    pub dir: PathBuf,
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            dir: default_download_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("mde-response.redb")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub machine_action: MachineActionConfig,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ResponseError::ConfigNotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// A copy safe to print: the client secret is masked.
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        if cfg.api.client_secret.is_some() {
            cfg.api.client_secret = Some("********".to_string());
        }
        cfg
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let ma = &self.machine_action;

        // 1. A zero poll interval makes every budget zero
        if ma.poll_interval_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "machine_action.poll_interval_secs must be greater than 0".to_string(),
            });
        } else {
            // 2. Timeouts shorter than one interval allow no checks at all
            if ma.availability_budget() == 0 {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "machine_timeout_secs={} is shorter than poll_interval_secs={}; \
                         no availability check will run",
                        ma.machine_timeout_secs, ma.poll_interval_secs
                    ),
                });
            }
            if ma.poll_budget() == 0 {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "job_timeout_secs={} is shorter than poll_interval_secs={}; \
                         every job will time out unpolled",
                        ma.job_timeout_secs, ma.poll_interval_secs
                    ),
                });
            }
        }

        if ma.max_parallel_machines == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "max_parallel_machines=0 is treated as 1".to_string(),
            });
        }

        // 3. Per-kind policy checks
        for &kind in ContainmentKind::priority_order() {
            let policy = ma.policy(kind);
            if policy.enabled && policy.verdicts.is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("{kind} is enabled but has no trigger verdicts"),
                });
            }
            if let Some(code) = &policy.type_code {
                let allowed = kind.type_codes();
                if !allowed.contains(&code.as_str()) {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!(
                            "{kind} type_code '{code}' is not one of [{}]",
                            allowed.join(", ")
                        ),
                    });
                }
            }
        }

        // 4. Secret must come from somewhere
        if self.api.resolve_secret().is_none() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "api.client_secret is not set and {CLIENT_SECRET_ENV} is empty"
                ),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "api:\n  auth_url: https://login.example/oauth2/token\n  client_id: app\n  client_secret: s3cret\n";

    fn minimal() -> Config {
        serde_yaml::from_str(MINIMAL).unwrap()
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = minimal();
        assert_eq!(cfg.api.url, "https://api.securitycenter.microsoft.com");
        assert_eq!(cfg.machine_action.poll_interval_secs, 30);
        assert_eq!(cfg.machine_action.statuses.succeeded, "Succeeded");
        assert!(!cfg.machine_action.isolation.enabled);
        assert_eq!(cfg.machine_action.isolation.verdicts, vec![Verdict::Malicious]);
        assert_eq!(cfg.alert.evidence_entity_types, vec!["File", "Process"]);
    }

    #[test]
    fn budgets_floor_division() {
        let ma = MachineActionConfig {
            poll_interval_secs: 10,
            job_timeout_secs: 30,
            machine_timeout_secs: 25,
            ..Default::default()
        };
        assert_eq!(ma.poll_budget(), 3);
        assert_eq!(ma.availability_budget(), 2);
    }

    #[test]
    fn zero_interval_budget_is_zero() {
        let ma = MachineActionConfig {
            poll_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(ma.poll_budget(), 0);
        assert_eq!(ma.availability_budget(), 0);
    }

    #[test]
    fn policy_block_roundtrip() {
        let yaml = r#"
api:
  auth_url: https://login.example/oauth2/token
  client_id: app
machine_action:
  poll_interval_secs: 10
  investigation_package:
    enabled: true
    verdicts: [malicious, suspicious]
  isolation:
    enabled: true
    type_code: Selective
    comment: "contained"
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        let ma = &cfg.machine_action;
        assert!(ma.investigation_package.triggers_on(Verdict::Suspicious));
        assert!(!ma.investigation_package.triggers_on(Verdict::Clean));
        assert!(!ma.antivirus_scan.triggers_on(Verdict::Malicious));
        assert_eq!(ma.isolation.type_code.as_deref(), Some("Selective"));
        assert_eq!(ma.policy(ContainmentKind::Isolation).comment.as_deref(), Some("contained"));
    }

    #[test]
    fn statuses_classify_vendor_codes() {
        let s = StatusConfig::default();
        assert!(s.is_busy("Pending"));
        assert!(s.is_busy("InProgress"));
        assert!(!s.is_busy("Succeeded"));
        assert!(s.is_failed("TimeOut"));
        assert!(s.is_succeeded("Succeeded"));

        let busy = RemoteApiError::Vendor {
            code: Some("ActiveRequestAlreadyExists".into()),
            message: "busy".into(),
        };
        let offline = RemoteApiError::Vendor {
            code: None,
            message: "Machine is offline".into(),
        };
        assert!(s.is_busy_rejection(&busy));
        assert!(!s.is_busy_rejection(&offline));
    }

    #[test]
    fn load_missing_file_is_config_not_found() {
        let err = Config::load(Path::new("/nonexistent/mde-response.yaml")).unwrap_err();
        assert!(matches!(err, ResponseError::ConfigNotFound(_)));
    }

    #[test]
    fn validate_clean_config_no_warnings() {
        assert!(minimal().validate().is_empty());
    }

    #[test]
    fn validate_zero_interval_is_error() {
        let mut cfg = minimal();
        cfg.machine_action.poll_interval_secs = 0;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.level == WarnLevel::Error));
    }

    #[test]
    fn validate_short_job_timeout_warns() {
        let mut cfg = minimal();
        cfg.machine_action.job_timeout_secs = 5;
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("every job will time out")));
    }

    #[test]
    fn validate_unknown_type_code_warns() {
        let mut cfg = minimal();
        cfg.machine_action.antivirus_scan.type_code = Some("Deep".into());
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("antivirus_scan type_code 'Deep'")));
    }

    #[test]
    fn validate_enabled_without_verdicts_warns() {
        let mut cfg = minimal();
        cfg.machine_action.quarantine.enabled = true;
        cfg.machine_action.quarantine.verdicts.clear();
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("quarantine is enabled but has no trigger verdicts")));
    }

    #[test]
    fn redacted_masks_secret() {
        let cfg = minimal().redacted();
        assert_eq!(cfg.api.client_secret.as_deref(), Some("********"));
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        assert!(!yaml.contains("s3cret"));
    }
}
