use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use suitectl_proto::{JobStatus, Suite};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartJobRequest {
    pub name: String,
    pub framework: String,
    pub suite: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tunnel: Option<TunnelSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TunnelSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl From<&Suite> for StartJobRequest {
    fn from(suite: &Suite) -> Self {
        Self {
            name: suite.name.clone(),
            framework: suite.framework.clone(),
            suite: suite.payload.clone(),
            timeout_seconds: suite.timeout.map(|t| t.as_secs()),
            tunnel: suite.tunnel.as_ref().map(|t| TunnelSpec {
                name: t.name.clone(),
                owner: t.owner.clone(),
            }),
            build: suite.metadata.build.clone(),
            tags: suite.metadata.tags.clone(),
            env: suite.env.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartJobResponse {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobDetails {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub passed: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobDetails {
    /// Maps the grid's status vocabulary onto [`JobStatus`].
    ///
    /// Unknown values are treated as still running; the suite timeout bounds
    /// how long that can last.
    pub fn job_status(&self) -> JobStatus {
        match self.status.to_ascii_lowercase().as_str() {
            "new" | "queued" => JobStatus::Queued,
            "in progress" | "running" => JobStatus::Running,
            "complete" | "completed" | "finished" => {
                if self.passed.unwrap_or(false) {
                    JobStatus::Passed
                } else {
                    JobStatus::Failed
                }
            }
            "passed" => JobStatus::Passed,
            "failed" => JobStatus::Failed,
            "error" | "errored" => JobStatus::Errored,
            "timeout" | "timed out" => JobStatus::TimedOut,
            "cancelled" | "canceled" | "aborted" | "stopped" => JobStatus::Stopped,
            _ => JobStatus::Running,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConcurrencyResponse {
    pub concurrency: ConcurrencyScopes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConcurrencyScopes {
    pub organization: ConcurrencyAllowance,
    #[serde(default)]
    pub team: Option<ConcurrencyAllowance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConcurrencyAllowance {
    pub allowed: ConcurrencyLimits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConcurrencyLimits {
    #[serde(default)]
    pub vms: usize,
}

impl ConcurrencyResponse {
    /// The effective limit: the team's allowance when set, else the organization's.
    pub fn allowed(&self) -> usize {
        self.concurrency
            .team
            .as_ref()
            .map_or(self.concurrency.organization.allowed.vms, |t| t.allowed.vms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TunnelInfo {
    #[serde(rename = "tunnel_identifier")]
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub owner: Option<String>,
}

impl TunnelInfo {
    pub fn is_running(&self) -> bool {
        self.status.eq_ignore_ascii_case("running")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetList {
    #[serde(default)]
    pub files: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use suitectl_proto::{JobMetadata, TunnelRef};

    fn details(status: &str, passed: Option<bool>) -> JobDetails {
        JobDetails {
            id: "abc".into(),
            status: status.into(),
            passed,
            error: None,
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(details("new", None).job_status(), JobStatus::Queued);
        assert_eq!(details("In Progress", None).job_status(), JobStatus::Running);
        assert_eq!(details("complete", Some(true)).job_status(), JobStatus::Passed);
        assert_eq!(details("complete", Some(false)).job_status(), JobStatus::Failed);
        assert_eq!(details("complete", None).job_status(), JobStatus::Failed);
        assert_eq!(details("error", None).job_status(), JobStatus::Errored);
        assert_eq!(details("timeout", None).job_status(), JobStatus::TimedOut);
        assert_eq!(details("cancelled", None).job_status(), JobStatus::Stopped);
        assert_eq!(details("mystery", None).job_status(), JobStatus::Running);
    }

    #[test]
    fn test_start_request_from_suite() {
        let mut suite = Suite::new("chrome", "cypress")
            .with_timeout(Duration::from_secs(600))
            .with_tunnel(TunnelRef::new("t1").with_owner("lead"))
            .with_env("FOO", "bar")
            .with_payload(serde_json::json!({"browser": "chrome"}));
        suite.metadata = JobMetadata {
            build: Some("Build 7".into()),
            tags: vec!["e2e".into()],
        };

        let body = serde_json::to_value(StartJobRequest::from(&suite)).unwrap();
        assert_eq!(body["name"], "chrome");
        assert_eq!(body["framework"], "cypress");
        assert_eq!(body["suite"]["browser"], "chrome");
        assert_eq!(body["timeoutSeconds"], 600);
        assert_eq!(body["tunnel"]["owner"], "lead");
        assert_eq!(body["build"], "Build 7");
        assert_eq!(body["env"]["FOO"], "bar");
    }

    #[test]
    fn test_start_request_omits_unset_fields() {
        let request = StartJobRequest::from(&Suite::new("a", "playwright"));
        let body = serde_json::to_value(request).unwrap();
        let object = body.as_object().unwrap();
        assert!(!object.contains_key("tunnel"));
        assert!(!object.contains_key("timeoutSeconds"));
        assert!(!object.contains_key("tags"));
    }

    #[test]
    fn test_concurrency_prefers_team_allowance() {
        let org_only: ConcurrencyResponse = serde_json::from_str(
            r#"{"concurrency":{"organization":{"allowed":{"vms":10}}}}"#,
        )
        .unwrap();
        assert_eq!(org_only.allowed(), 10);

        let with_team: ConcurrencyResponse = serde_json::from_str(concat!(
            r#"{"concurrency":{"organization":{"allowed":{"vms":10}},"#,
            r#""team":{"allowed":{"vms":3}}}}"#
        ))
        .unwrap();
        assert_eq!(with_team.allowed(), 3);
    }

    #[test]
    fn test_tunnel_info_parsing() {
        let tunnels: Vec<TunnelInfo> = serde_json::from_str(
            r#"[{"tunnel_identifier":"t1","status":"running","owner":"lead"},
                {"tunnel_identifier":"t2","status":"terminated"}]"#,
        )
        .unwrap();
        assert!(tunnels[0].is_running());
        assert!(!tunnels[1].is_running());
        assert_eq!(tunnels[1].owner, None);
    }
}
