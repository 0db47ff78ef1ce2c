use crate::cli::actions::Action;
use crate::server::new;
use anyhow::Result;

/// Handle the run action
///
/// # Errors
///
/// Returns an error if the server fails to start
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Run {
            port,
            listen,
            config,
        } => {
            new(port, listen, config).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{DatasourceConfig, FailurePolicy};
    use std::time::Duration;

    #[tokio::test]
    async fn test_handle_rejects_bad_listen_address() {
        let action = Action::Run {
            port: 0,
            listen: Some("not-an-ip".to_string()),
            config: DatasourceConfig::default().with_timeout(Duration::from_secs(1)),
        };

        let result = handle(action).await;

        assert!(result.is_err(), "Should fail on an invalid listen address");
    }

    #[test]
    fn test_action_creation() {
        let action = Action::Run {
            port: 9400,
            listen: Some("127.0.0.1".to_string()),
            config: DatasourceConfig::default().with_failure_policy(FailurePolicy::Partial),
        };

        match action {
            Action::Run {
                port,
                listen,
                config,
            } => {
                assert_eq!(port, 9400);
                assert_eq!(listen, Some("127.0.0.1".to_string()));
                assert_eq!(config.failure_policy, FailurePolicy::Partial);
            }
        }
    }
}
