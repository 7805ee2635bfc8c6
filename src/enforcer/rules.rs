use url::Url;

use crate::browser::{
    BlockRule, ResourceType, RuleAction, RuleActionKind, RuleCondition, RuleRedirect,
    BLOCKED_PAGE_PATH,
};

/// The single matching policy shared by the declarative rules, the reactive listener and any UI
/// that needs to know whether a hostname is blocked.
pub fn matches_domain(hostname: &str, domain: &str) -> bool {
    hostname == domain
        || hostname
            .strip_suffix(domain)
            .is_some_and(|rest| rest.ends_with('.'))
}

/// Hostname of a URL, `None` if the URL can't be parsed or has no host.
pub fn hostname(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .host_str()
        .map(|host| host.trim_end_matches('.').to_ascii_lowercase())
}

/// Unparseable URLs never match.
pub fn url_is_blocked(url: &str, domains: &[String]) -> bool {
    let Some(host) = hostname(url) else {
        return false;
    };
    domains.iter().any(|domain| matches_domain(&host, domain))
}

/// One main-frame redirect rule per domain. Ids are assigned from 1 in list order on every call.
pub fn build_rules(domains: &[String]) -> Vec<BlockRule> {
    domains
        .iter()
        .zip(1u32..)
        .map(|(domain, id)| BlockRule {
            id,
            priority: 1,
            action: RuleAction {
                kind: RuleActionKind::Redirect,
                redirect: RuleRedirect {
                    extension_path: BLOCKED_PAGE_PATH.into(),
                },
            },
            condition: RuleCondition {
                request_domains: vec![domain.clone()],
                resource_types: vec![ResourceType::MainFrame],
            },
        })
        .collect()
}
