//! Configuration loading
//! Reads the YAML configuration file and layers `MERGER__*` environment overrides on top

use config::{Config, Environment, File, FileFormat};
use std::path::Path;
use tracing::info;

use super::{AppConfig, CoordinatorConfig, WorkerConfig};
use crate::error::MergerError;

pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

const ENV_PREFIX: &str = "MERGER";
const ENV_SEPARATOR: &str = "__";

impl AppConfig {
    /// Load and validate configuration from `path`, with environment overrides
    pub fn load(path: &Path) -> Result<Self, MergerError> {
        info!("Loading configuration from: {:?}", path);

        if !path.is_file() {
            return Err(MergerError::Config(format!(
                "Expected configuration file {:?}",
                path
            )));
        }

        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML text without consulting the environment
    pub fn from_yaml(contents: &str) -> Result<Self, MergerError> {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MergerError> {
        let repository = &self.repository;
        if repository.path.as_os_str().is_empty() {
            return Err(missing("repository.path"));
        }
        if repository.base_branch.trim().is_empty() {
            return Err(missing("repository.base_branch"));
        }
        if repository.committer.name.trim().is_empty() {
            return Err(missing("repository.committer.name"));
        }
        if repository.committer.email.trim().is_empty() {
            return Err(missing("repository.committer.email"));
        }

        if self.github.token.trim().is_empty() {
            return Err(missing("github.token"));
        }
        if !self.github.downstream_project.contains('/') {
            return Err(MergerError::Config(format!(
                "github.downstream_project must be owner/repo, got {:?}",
                self.github.downstream_project
            )));
        }

        if self.batch.size == 0 {
            return Err(MergerError::Config(
                "batch.size must be at least 1".to_string(),
            ));
        }

        if self.build.steps.is_empty() {
            return Err(missing("build.steps"));
        }
        if let Some(step) = self.build.steps.iter().find(|s| s.program.trim().is_empty()) {
            return Err(MergerError::Config(format!(
                "Build step in stage {} has no program",
                step.stage
            )));
        }

        if let Some(coordinator) = &self.coordinator {
            if coordinator.auth.username.is_empty() || coordinator.auth.password.is_empty() {
                return Err(missing("coordinator.auth"));
            }
        }

        if let Some(worker) = &self.worker {
            if worker.node_name.trim().is_empty() {
                return Err(missing("worker.node_name"));
            }
        }

        Ok(())
    }

    pub fn coordinator(&self) -> Result<&CoordinatorConfig, MergerError> {
        self.coordinator
            .as_ref()
            .ok_or_else(|| missing("coordinator"))
    }

    pub fn worker(&self) -> Result<&WorkerConfig, MergerError> {
        self.worker.as_ref().ok_or_else(|| missing("worker"))
    }

    /// Login the coordinator assigns claimed pull requests to
    pub fn claim_assignee(&self) -> String {
        self.coordinator
            .as_ref()
            .and_then(|c| c.assignee.clone())
            .unwrap_or_else(|| self.github.username.clone())
    }
}

fn missing(key: &str) -> MergerError {
    MergerError::Config(format!("Missing required setting {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildStage;

    const MINIMAL: &str = r#"
repository:
  path: /srv/fork
  base_branch: 1.9-dev
  committer:
    name: Merge Bot
    email: bot@example.com
github:
  token: secret
  username: mergebot
  downstream_project: fork/fork
"#;

    #[test]
    fn test_defaults_applied() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();

        assert_eq!(config.batch.size, 4);
        assert_eq!(config.batch.cooldown_secs, 3600);
        assert_eq!(config.repository.push_remote, "origin");
        assert_eq!(config.repository.safe_branch(), "1.9-dev");
        assert_eq!(config.repository.base_ref(), "refs/heads/1.9-dev");
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.build.steps.len(), 5);
        assert_eq!(config.build.steps[4].stage, BuildStage::Test);
        assert_eq!(config.claim_assignee(), "mergebot");
        assert!(config.coordinator().is_err());
    }

    #[test]
    fn test_remote_base_ref() {
        let yaml = MINIMAL.replace(
            "  base_branch: 1.9-dev\n",
            "  base_branch: 1.9-dev\n  base_remote: origin\n",
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.repository.base_ref(), "refs/remotes/origin/1.9-dev");
    }

    #[test]
    fn test_missing_committer_rejected() {
        let yaml = MINIMAL.replace("    name: Merge Bot\n", "    name: \"\"\n");
        let err = AppConfig::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, MergerError::Config(msg) if msg.contains("committer.name")));
    }

    #[test]
    fn test_missing_section_rejected() {
        let yaml = MINIMAL.replace("github:", "gh:");
        assert!(matches!(
            AppConfig::from_yaml(&yaml),
            Err(MergerError::Config(_))
        ));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let yaml = format!("{}batch:\n  size: 0\n", MINIMAL);
        assert!(AppConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_load_requires_existing_file() {
        let err = AppConfig::load(Path::new("/nonexistent/config.yml")).unwrap_err();
        assert!(matches!(err, MergerError::Config(_)));
    }
}
