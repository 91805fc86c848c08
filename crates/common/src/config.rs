use std::time::Duration;

use serde::Deserialize;

use crate::types::{Category, Icon};

const DEFAULT_WARNING_IMAGE: &str = "https://www.rocketlawyer.com/images/ops/warning.png";
const DEFAULT_PROGRESS_IMAGE: &str = "https://www.rocketlawyer.com/images/ops/progress.gif";
const DEFAULT_RECOVERING_IMAGE: &str = "https://www.rocketlawyer.com/images/ops/recovering.gif";
const DEFAULT_OK_IMAGE: &str = "https://www.rocketlawyer.com/images/ops/ok.png";
const DEFAULT_WATCH_COMMAND: &str = "kubectl get deployments --all-namespaces --watch --output json";

/// URLs for the four status icons.
#[derive(Debug, Clone, Deserialize)]
pub struct IconSet {
    pub warning: String,
    pub progress: String,
    pub recovering: String,
    pub healthy: String,
}

impl IconSet {
    pub fn url(&self, icon: Icon) -> &str {
        match icon {
            Icon::Warning => &self.warning,
            Icon::Progress => &self.progress,
            Icon::Recovering => &self.recovering,
            Icon::Healthy => &self.healthy,
        }
    }
}

impl Default for IconSet {
    fn default() -> Self {
        Self {
            warning: DEFAULT_WARNING_IMAGE.to_string(),
            progress: DEFAULT_PROGRESS_IMAGE.to_string(),
            recovering: DEFAULT_RECOVERING_IMAGE.to_string(),
            healthy: DEFAULT_OK_IMAGE.to_string(),
        }
    }
}

/// Labels and icons used when composing message text.
#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    pub icons: IconSet,
    /// Cluster label used in console links
    pub cluster_name: String,
    /// Region label used in console links
    pub region: String,
    /// Project label shown in headers and console links
    pub project: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            icons: IconSet::default(),
            cluster_name: "kubernetes".to_string(),
            region: "us-west1".to_string(),
            project: "rl-us".to_string(),
        }
    }
}

/// Thread-head thresholds and destination channels.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadConfig {
    /// Channel for rollout notifications
    pub rollout_channel: String,
    /// Channel for degraded/recovered notifications
    pub alert_channel: String,
    /// Age after which new replies are re-broadcast to the channel (default: 900s)
    pub refresh_threshold: Duration,
    /// Age after which a thread head is closed as timed out (default: 3600s)
    pub timeout_threshold: Duration,
}

impl ThreadConfig {
    /// Channel that carries the thread head and items of `category`.
    pub fn channel(&self, category: Category) -> &str {
        match category {
            Category::Rollout => &self.rollout_channel,
            Category::Degraded => &self.alert_channel,
        }
    }
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            rollout_channel: "#robot_dreams".to_string(),
            alert_channel: "#robot_dreams".to_string(),
            refresh_threshold: Duration::from_secs(900),
            timeout_threshold: Duration::from_secs(3600),
        }
    }
}

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct LookoutConfig {
    /// Slack bot token (not required in dry-run mode)
    pub slack_token: Option<String>,

    pub display: DisplayConfig,

    pub threads: ThreadConfig,

    /// Command whose stdout streams workload objects
    pub watch_command: String,

    /// Log messages instead of delivering them
    pub dry_run: bool,
}

impl LookoutConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let dry_run = std::env::var("DRY_RUN")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let slack_token = std::env::var("SLACK_TOKEN").ok();
        if slack_token.is_none() && !dry_run {
            anyhow::bail!("SLACK_TOKEN environment variable is required");
        }

        let rollout_channel =
            std::env::var("SLACK_CHANNEL").unwrap_or_else(|_| "#robot_dreams".to_string());
        let alert_channel =
            std::env::var("SLACK_ALERT_CHANNEL").unwrap_or_else(|_| rollout_channel.clone());

        let refresh_threshold = Duration::from_secs(
            std::env::var("REFRESH_THRESHOLD")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("REFRESH_THRESHOLD must be a valid u64"))?,
        );
        let timeout_threshold = Duration::from_secs(
            std::env::var("TIMEOUT_THRESHOLD")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("TIMEOUT_THRESHOLD must be a valid u64"))?,
        );

        if timeout_threshold <= refresh_threshold {
            tracing::warn!(
                refresh_secs = refresh_threshold.as_secs(),
                timeout_secs = timeout_threshold.as_secs(),
                "TIMEOUT_THRESHOLD does not exceed REFRESH_THRESHOLD; threads will never re-broadcast"
            );
        }

        Ok(Self {
            slack_token,
            display: DisplayConfig {
                icons: IconSet {
                    warning: std::env::var("WARNING_IMAGE")
                        .unwrap_or_else(|_| DEFAULT_WARNING_IMAGE.to_string()),
                    progress: std::env::var("PROGRESS_IMAGE")
                        .unwrap_or_else(|_| DEFAULT_PROGRESS_IMAGE.to_string()),
                    recovering: std::env::var("RECOVERING_IMAGE")
                        .unwrap_or_else(|_| DEFAULT_RECOVERING_IMAGE.to_string()),
                    healthy: std::env::var("OK_IMAGE")
                        .unwrap_or_else(|_| DEFAULT_OK_IMAGE.to_string()),
                },
                cluster_name: std::env::var("CLUSTER_NAME")
                    .unwrap_or_else(|_| "kubernetes".to_string()),
                region: std::env::var("GCP_REGION").unwrap_or_else(|_| "us-west1".to_string()),
                project: std::env::var("GCP_PROJECT").unwrap_or_else(|_| "rl-us".to_string()),
            },
            threads: ThreadConfig {
                rollout_channel,
                alert_channel,
                refresh_threshold,
                timeout_threshold,
            },
            watch_command: std::env::var("WATCH_COMMAND")
                .unwrap_or_else(|_| DEFAULT_WATCH_COMMAND.to_string()),
            dry_run,
        })
    }
}
