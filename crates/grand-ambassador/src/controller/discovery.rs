//! Waiting for a workload to report running.

use super::types::ControllerError;
use crate::directory::{WorkloadDescriptor, WorkloadDirectory};
use std::time::Duration;
use tracing::debug;

/// Fetch `identity` until its descriptor reports running.
///
/// Polls at most `max_attempts` extra times, `interval` apart. Lookup errors
/// are returned immediately.
pub async fn wait_for_running(
    directory: &dyn WorkloadDirectory,
    identity: &str,
    interval: Duration,
    max_attempts: u32,
) -> Result<WorkloadDescriptor, ControllerError> {
    let mut attempt = 0;
    loop {
        let descriptor = directory.fetch_descriptor(identity).await?;
        if descriptor.running {
            return Ok(descriptor);
        }
        if attempt >= max_attempts {
            return Err(ControllerError::NotRunning(identity.to_string()));
        }
        attempt += 1;
        debug!(
            "Workload {} not running yet, retrying ({}/{})",
            identity, attempt, max_attempts
        );
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{DirectoryError, InMemoryDirectory, PortSpec};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn web(running: bool) -> WorkloadDescriptor {
        WorkloadDescriptor {
            id: "abc".to_string(),
            name: "web".to_string(),
            running,
            address: running.then(|| "10.0.0.5".parse().unwrap()),
            ports: BTreeSet::from([PortSpec::tcp(80)]),
        }
    }

    #[tokio::test]
    async fn test_returns_running_descriptor_immediately() {
        let directory = InMemoryDirectory::new();
        directory.upsert(web(true));
        let descriptor = wait_for_running(&directory, "web", Duration::from_millis(10), 0)
            .await
            .unwrap();
        assert!(descriptor.running);
    }

    #[tokio::test]
    async fn test_polls_until_running() {
        let directory = Arc::new(InMemoryDirectory::new());
        directory.upsert(web(false));

        let starter = {
            let directory = Arc::clone(&directory);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(60)).await;
                directory.upsert(web(true));
            })
        };

        let descriptor = wait_for_running(directory.as_ref(), "abc", Duration::from_millis(10), 100)
            .await
            .unwrap();
        assert_eq!(descriptor.address, Some("10.0.0.5".parse().unwrap()));
        starter.await.unwrap();
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let directory = InMemoryDirectory::new();
        directory.upsert(web(false));
        let err = wait_for_running(&directory, "web", Duration::from_millis(1), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::NotRunning(ref id) if id == "web"));
    }

    #[tokio::test]
    async fn test_lookup_failure_is_returned() {
        let directory = InMemoryDirectory::new();
        let err = wait_for_running(&directory, "web", Duration::from_millis(1), 3)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ControllerError::Directory(DirectoryError::NotFound(_))
        ));
    }
}
