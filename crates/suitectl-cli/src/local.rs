//! Local execution of docker-mode suites.

use async_trait::async_trait;
use suitectl_proto::{LocalRunner, ServiceError, ServiceResult, Suite};
use tokio::process::Command;
use tracing::{info, warn};

/// Runs each local suite in a throwaway container, one after another.
#[derive(Debug, Clone)]
pub struct ContainerRunner {
    program: String,
}

impl Default for ContainerRunner {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl ContainerRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments for one suite: `run --rm -e K=V... <image>`.
    pub fn args_for(suite: &Suite) -> ServiceResult<Vec<String>> {
        let image = suite
            .image
            .as_deref()
            .filter(|i| !i.trim().is_empty())
            .ok_or_else(|| ServiceError::Rejected(format!("suite '{}' has no image", suite.name)))?;

        let mut args = vec!["run".to_string(), "--rm".to_string()];
        for (key, value) in &suite.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(image.to_string());
        Ok(args)
    }
}

#[async_trait]
impl LocalRunner for ContainerRunner {
    async fn run_locally(&self, suites: &[Suite]) -> ServiceResult<i32> {
        let mut exit_code = 0;

        for suite in suites {
            let args = Self::args_for(suite)?;
            info!(suite = %suite.name, program = %self.program, "Running suite locally");

            let status = Command::new(&self.program).args(&args).status().await?;
            let code = status.code().unwrap_or(1);
            if code != 0 {
                warn!(suite = %suite.name, exit_code = code, "Local suite failed");
                if exit_code == 0 {
                    exit_code = code;
                }
            }
        }

        Ok(exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use suitectl_proto::ExecutionMode;

    fn local_suite(name: &str) -> Suite {
        Suite::new(name, "cypress")
            .with_mode(ExecutionMode::Local)
            .with_image("cypress/included:13")
    }

    #[test]
    fn test_args_for_suite() {
        let suite = local_suite("docker")
            .with_env("B", "2")
            .with_env("A", "1");
        let args = ContainerRunner::args_for(&suite).unwrap();
        assert_eq!(
            args,
            vec!["run", "--rm", "-e", "A=1", "-e", "B=2", "cypress/included:13"]
        );
    }

    #[test]
    fn test_args_require_image() {
        let suite = Suite::new("docker", "cypress").with_mode(ExecutionMode::Local);
        assert!(matches!(
            ContainerRunner::args_for(&suite),
            Err(ServiceError::Rejected(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_all_passing_suites_exit_zero() {
        let runner = ContainerRunner::new("true");
        let code = runner
            .run_locally(&[local_suite("a"), local_suite("b")])
            .await
            .unwrap();
        assert_eq!(code, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_suite_sets_exit_code() {
        let runner = ContainerRunner::new("false");
        let code = runner.run_locally(&[local_suite("a")]).await.unwrap();
        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let runner = ContainerRunner::new("suitectl-no-such-container-tool");
        let err = runner.run_locally(&[local_suite("a")]).await.unwrap_err();
        assert!(matches!(err, ServiceError::Io(_)));
    }
}
