//! Controller tunables, read from the environment.

use std::time::Duration;

use carto_templates::Ytt;

fn env_secs(name: &str, default: u64) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(default))
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Periodic rescan of every object, which also picks up changes to stamped objects.
    pub resync: Duration,
    /// Requeue delay after a reconcile error.
    pub error_requeue: Duration,
    pub ytt: Ytt,
}

impl ControllerConfig {
    pub fn from_env() -> Self {
        Self {
            resync: env_secs("CARTO_RESYNC_SECS", 60),
            error_requeue: env_secs("CARTO_ERROR_REQUEUE_SECS", 15),
            ytt: Ytt::from_env(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self { resync: Duration::from_secs(60), error_requeue: Duration::from_secs(15), ytt: Ytt::from_env() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparsable_values_fall_back() {
        assert_eq!(env_secs("CARTO_TEST_UNSET_SECS", 7), Duration::from_secs(7));
        std::env::set_var("CARTO_TEST_BAD_SECS", "soon");
        assert_eq!(env_secs("CARTO_TEST_BAD_SECS", 9), Duration::from_secs(9));
        std::env::set_var("CARTO_TEST_GOOD_SECS", "30");
        assert_eq!(env_secs("CARTO_TEST_GOOD_SECS", 9), Duration::from_secs(30));
    }
}
