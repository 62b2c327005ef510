//! Robots.txt rules
//!
//! Allow/disallow matching is delegated to the robotstxt crate. The crate does
//! not expose `Crawl-delay`, so that directive is read here from the groups
//! that name our agent (falling back to the `*` group).

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Robots.txt content for one host
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    /// Raw robots.txt body; `None` means everything is allowed
    content: Option<String>,
}

impl RobotsRules {
    /// Creates rules from a robots.txt body
    pub fn from_content(content: &str) -> Self {
        Self {
            content: Some(content.to_string()),
        }
    }

    /// Rules that allow everything
    ///
    /// Used when robots.txt is missing or cannot be fetched.
    pub fn allow_all() -> Self {
        Self { content: None }
    }

    /// Returns true if these rules allow everything
    pub fn is_allow_all(&self) -> bool {
        self.content.as_deref().map_or(true, |c| c.trim().is_empty())
    }

    /// Checks if a URL is allowed for the given agent token
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL to check
    /// * `agent` - Product token of the crawler (e.g. "BidCrawler")
    pub fn is_allowed(&self, url: &str, agent: &str) -> bool {
        match &self.content {
            Some(content) if !content.trim().is_empty() => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(content, agent, url)
            }
            _ => true,
        }
    }

    /// Returns the `Crawl-delay` that applies to `agent`, if any
    ///
    /// A delay in a group naming the agent wins over one in the `*` group.
    pub fn crawl_delay(&self, agent: &str) -> Option<Duration> {
        let content = self.content.as_deref()?;
        let agent = agent.to_ascii_lowercase();

        let mut group_agents: Vec<String> = Vec::new();
        let mut in_agent_lines = false;
        let mut specific = None;
        let mut wildcard = None;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            if key == "user-agent" {
                // Consecutive user-agent lines share one group
                if !in_agent_lines {
                    group_agents.clear();
                }
                group_agents.push(value.to_ascii_lowercase());
                in_agent_lines = true;
                continue;
            }
            in_agent_lines = false;

            if key != "crawl-delay" {
                continue;
            }
            let Some(delay) = value
                .parse::<f64>()
                .ok()
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            else {
                continue;
            };

            if group_agents.iter().any(|a| a == &agent) {
                specific.get_or_insert(delay);
            } else if group_agents.iter().any(|a| a == "*") {
                wildcard.get_or_insert(delay);
            }
        }

        specific.or(wildcard)
    }
}
