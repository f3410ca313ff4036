//! HTTP uptime checks

use std::time::Duration;

use futures::future::join_all;
use reqwest::StatusCode;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Up,
    Down(u16),
    Unreachable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    pub link: String,
    pub outcome: LinkOutcome,
}

/// Client used for uptime checks
pub fn uptime_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(READ_TIMEOUT)
        .build()
}

/// GET every link concurrently; results keep the input order
pub async fn check_links(client: &reqwest::Client, links: &[String]) -> Vec<LinkStatus> {
    let checks = links.iter().map(|link| async move {
        let outcome = match client.get(link).send().await {
            Ok(response) if response.status() == StatusCode::OK => LinkOutcome::Up,
            Ok(response) => LinkOutcome::Down(response.status().as_u16()),
            Err(e) => LinkOutcome::Unreachable(e.to_string()),
        };
        LinkStatus {
            link: link.clone(),
            outcome,
        }
    });
    join_all(checks).await
}

/// Alarm and heartbeat text for a round of uptime checks
pub fn render_up_checks(statuses: &[LinkStatus]) -> (String, String) {
    let mut alarm = String::new();
    let mut lines = String::new();
    let mut up = 0;

    for status in statuses {
        match &status.outcome {
            LinkOutcome::Up => {
                up += 1;
                lines.push_str(&format!("  ✅  {}\n", status.link));
            }
            LinkOutcome::Down(code) => {
                alarm.push_str(&format!("{} is down with error: {}\n", status.link, code));
                lines.push_str(&format!("  ❌  {}\n", status.link));
            }
            LinkOutcome::Unreachable(reason) => {
                alarm.push_str(&format!(
                    "{} not fetched. Exception:\n    {}\n",
                    status.link, reason
                ));
                lines.push_str(&format!("  ❎ {}\n", status.link));
            }
        }
    }

    let mark = if up == statuses.len() { "✅" } else { "❎" };
    let heartbeat = format!("{} {}/{} URLs are up.\n\n{}", mark, up, statuses.len(), lines);
    (alarm, heartbeat)
}
