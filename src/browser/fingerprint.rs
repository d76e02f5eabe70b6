use rand::{thread_rng, Rng};
use tracing::debug;

/// Used when no user agents are configured
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Pool of user agents; each browser session presents a random one
#[derive(Debug, Clone)]
pub struct UserAgentPool {
    user_agents: Vec<String>,
}

impl UserAgentPool {
    pub fn new(user_agents: Vec<String>) -> Self {
        let user_agents = user_agents
            .into_iter()
            .map(|ua| ua.trim().to_string())
            .filter(|ua| !ua.is_empty())
            .collect();

        Self { user_agents }
    }

    /// Select a random user agent
    pub fn pick(&self) -> &str {
        if self.user_agents.is_empty() {
            return DEFAULT_USER_AGENT;
        }

        let user_agent = &self.user_agents[thread_rng().gen_range(0..self.user_agents.len())];
        debug!("Using User-Agent: {}", user_agent);
        user_agent
    }

    pub fn is_empty(&self) -> bool {
        self.user_agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pool_falls_back_to_default() {
        let pool = UserAgentPool::new(vec!["   ".to_string()]);
        assert!(pool.is_empty());
        assert_eq!(pool.pick(), DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_pick_comes_from_pool() {
        let agents = vec!["agent-a".to_string(), "agent-b".to_string()];
        let pool = UserAgentPool::new(agents.clone());

        for _ in 0..20 {
            let picked = pool.pick().to_string();
            assert!(agents.contains(&picked));
        }
    }
}
