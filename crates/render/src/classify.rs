//! Picks the render strategy from the requester's user agent.

/// Whether a user agent belongs to an automated, non-interactive client.
pub trait AgentClassifier: Send + Sync {
    fn is_automated_agent(&self, user_agent: &str) -> bool;
}

impl<F> AgentClassifier for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_automated_agent(&self, user_agent: &str) -> bool {
        self(user_agent)
    }
}

/// How a response is rendered for one request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// wait for the complete document before responding
    Agent,
    /// respond at the shell and stream the rest
    Interactive,
}

impl Strategy {
    pub fn for_user_agent<C>(classifier: &C, user_agent: &str) -> Self
    where
        C: AgentClassifier + ?Sized,
    {
        if classifier.is_automated_agent(user_agent) { Strategy::Agent } else { Strategy::Interactive }
    }
}

/// Case-insensitive substring match against well known crawler tokens.
#[derive(Debug, Clone)]
pub struct KnownAgents {
    tokens: Vec<String>,
}

const DEFAULT_TOKENS: &[&str] = &[
    "bot",
    "crawler",
    "spider",
    "slurp",
    "crawling",
    "facebookexternalhit",
    "embedly",
    "headlesschrome",
    "lighthouse",
    "bingpreview",
    "skypeuripreview",
    "whatsapp/",
    "curl/",
    "wget/",
    "python-requests",
];

impl Default for KnownAgents {
    fn default() -> Self {
        Self::with_tokens(DEFAULT_TOKENS.iter().copied())
    }
}

impl KnownAgents {
    pub fn with_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self { tokens: tokens.into_iter().map(|t| t.as_ref().to_ascii_lowercase()).collect() }
    }
}

impl AgentClassifier for KnownAgents {
    fn is_automated_agent(&self, user_agent: &str) -> bool {
        let user_agent = user_agent.to_ascii_lowercase();
        self.tokens.iter().any(|token| user_agent.contains(token.as_str()))
    }
}
