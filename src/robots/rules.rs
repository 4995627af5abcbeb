//! Robots.txt rules for one site
//!
//! Disallow matching is delegated to the robotstxt crate; the crawl delay is read
//! from the group that applies to our product token.

use robotstxt::DefaultMatcher;
use std::time::Duration;
use url::Url;

/// Parsed robots.txt for the crawled site, bound to one user agent token
#[derive(Debug, Clone)]
pub struct RobotsRules {
    /// Raw robots.txt body (empty means allow everything)
    body: String,
    /// Product token matched against `User-agent` lines, e.g. `Sitesnap`
    agent: String,
    crawl_delay: Option<Duration>,
}

impl RobotsRules {
    /// Parses a robots.txt body for `agent`
    pub fn from_content(body: &str, agent: &str) -> Self {
        Self {
            body: body.to_string(),
            agent: agent.to_string(),
            crawl_delay: parse_crawl_delay(body, agent),
        }
    }

    /// Rules that allow everything, used when robots.txt is missing or unreadable
    pub fn allow_all(agent: &str) -> Self {
        Self {
            body: String::new(),
            agent: agent.to_string(),
            crawl_delay: None,
        }
    }

    /// Returns true if `url` may be fetched
    pub fn allows(&self, url: &Url) -> bool {
        if self.body.trim().is_empty() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.body, &self.agent, url.as_str())
    }

    /// `Crawl-delay` for our agent, falling back to the `*` group
    pub fn crawl_delay(&self) -> Option<Duration> {
        self.crawl_delay
    }
}

#[derive(Default)]
struct Group {
    agents: Vec<String>,
    delay: Option<f64>,
}

/// Splits robots.txt into user-agent groups and picks the delay for `agent`
///
/// Consecutive `User-agent` lines share one group; any other directive closes the
/// agent list, so the next `User-agent` line starts a new group.
fn parse_crawl_delay(body: &str, agent: &str) -> Option<Duration> {
    let mut groups: Vec<Group> = Vec::new();
    let mut collecting_agents = false;

    for line in body.lines() {
        let line = line.split('#').next().unwrap_or_default().trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();

        if key == "user-agent" {
            if !collecting_agents {
                groups.push(Group::default());
                collecting_agents = true;
            }
            if let Some(group) = groups.last_mut() {
                group.agents.push(value.to_ascii_lowercase());
            }
            continue;
        }

        collecting_agents = false;
        if key == "crawl-delay" {
            if let (Some(group), Ok(delay)) = (groups.last_mut(), value.parse::<f64>()) {
                group.delay = Some(delay);
            }
        }
    }

    let agent = agent.to_ascii_lowercase();
    let specific = groups
        .iter()
        .find(|g| g.agents.iter().any(|a| a != "*" && agent.contains(a.as_str())));
    let wildcard = groups.iter().find(|g| g.agents.iter().any(|a| a == "*"));

    specific
        .or(wildcard)
        .and_then(|g| g.delay)
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(Duration::from_secs_f64)
}
