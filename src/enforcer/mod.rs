//! Site blocking during focus sessions. Two channels cooperate behind [FocusEnforcer]:
//!  - declarative redirect rules the browser evaluates before a top-level navigation;
//!  - a reactive listener that redirects URL changes the rules let through, which happens while
//!    freshly installed rules are still propagating to new tabs.

pub mod rules;

use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::{
    browser::{Browser, TabId},
    store::repository::StateRepository,
};

use rules::{build_rules, hostname, url_is_blocked};

pub struct FocusEnforcer {
    browser: Arc<dyn Browser>,
    repository: StateRepository,
    listening: bool,
    rules_installed: bool,
    /// Where redirected tabs were before the sweep. Lives only in this process, a restart
    /// forgets it and those tabs stay on the blocked page.
    redirected_tabs: HashMap<TabId, String>,
    fallback_redirects: u64,
}

impl FocusEnforcer {
    pub fn new(browser: Arc<dyn Browser>, repository: StateRepository) -> Self {
        Self {
            browser,
            repository,
            listening: false,
            rules_installed: false,
            redirected_tabs: HashMap::new(),
            fallback_redirects: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.listening
    }

    pub fn redirected_tabs(&self) -> &HashMap<TabId, String> {
        &self.redirected_tabs
    }

    /// Navigations the reactive listener had to redirect although rules were installed.
    pub fn fallback_redirects(&self) -> u64 {
        self.fallback_redirects
    }

    /// Only the extension's own page counts, a site serving the same path is still blocked.
    fn is_blocked_page(&self, url: &str) -> bool {
        url.starts_with(&self.browser.blocked_page_url())
    }

    /// Installs rules, starts listening and sweeps open tabs. Calling it again while active
    /// replaces the rule set instead of adding to it.
    ///
    /// A failure to install rules doesn't stop the listener and the sweep. The error is still
    /// returned once both have run.
    pub async fn activate(&mut self) -> Result<()> {
        let domains = self.repository.settings().await?.blocklist();
        if domains.is_empty() {
            debug!("No blocked domains configured, nothing to enforce");
            return Ok(());
        }

        let installed = self
            .install_rules(&domains)
            .await
            .inspect_err(|e| error!("Failed to install blocking rules {e:?}"));
        self.rules_installed = installed.is_ok();
        self.listening = true;

        self.sweep(&domains).await?;
        info!(
            "Blocking active for {} domains, {} tabs redirected",
            domains.len(),
            self.redirected_tabs.len()
        );
        installed
    }

    async fn install_rules(&self, domains: &[String]) -> Result<()> {
        let remove_rule_ids = self
            .browser
            .installed_rules()
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect::<Vec<_>>();
        let add_rules = build_rules(domains);
        debug!(
            "Replacing {} rules with {} rules",
            remove_rule_ids.len(),
            add_rules.len()
        );
        self.browser.update_rules(remove_rule_ids, add_rules).await
    }

    async fn sweep(&mut self, domains: &[String]) -> Result<()> {
        let blocked_page = self.browser.blocked_page_url();
        for tab in self.browser.tabs().await? {
            let Some(url) = tab.url else {
                continue;
            };
            if self.is_blocked_page(&url) || !url_is_blocked(&url, domains) {
                continue;
            }
            match self.browser.navigate(tab.id, blocked_page.clone()).await {
                Ok(()) => {
                    debug!("Redirected open tab {} away from {url}", tab.id);
                    self.redirected_tabs.insert(tab.id, url);
                }
                Err(e) => warn!("Couldn't redirect tab {}: {e:?}", tab.id),
            }
        }
        Ok(())
    }

    /// Removes every rule, stops listening and sends swept tabs back where they were.
    pub async fn deactivate(&mut self) -> Result<()> {
        self.listening = false;
        let removed = self.remove_rules().await;
        if removed.is_ok() {
            self.rules_installed = false;
        }

        for (tab_id, url) in self.redirected_tabs.drain() {
            if let Err(e) = self.browser.navigate(tab_id, url).await {
                // The tab may have been closed in the meantime.
                debug!("Couldn't restore tab {tab_id}: {e:?}");
            }
        }
        info!("Blocking deactivated");
        removed
    }

    async fn remove_rules(&self) -> Result<()> {
        let remove_rule_ids = self
            .browser
            .installed_rules()
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect::<Vec<_>>();
        if remove_rule_ids.is_empty() {
            return Ok(());
        }
        self.browser.update_rules(remove_rule_ids, vec![]).await
    }

    /// Reactive half of the enforcement. Returns whether the tab was redirected.
    pub async fn on_url_changed(&mut self, tab_id: TabId, url: &str) -> Result<bool> {
        if !self.listening || self.is_blocked_page(url) {
            return Ok(false);
        }
        let domains = self.repository.settings().await?.blocklist();
        if !url_is_blocked(url, &domains) {
            return Ok(false);
        }

        self.browser
            .navigate(tab_id, self.browser.blocked_page_url())
            .await?;
        if self.rules_installed {
            self.fallback_redirects += 1;
            warn!(
                "Blocking rules let a navigation of tab {tab_id} to {} through, \
                 redirected by listener ({} so far)",
                hostname(url).unwrap_or_default(),
                self.fallback_redirects
            );
        } else {
            debug!("Listener redirected tab {tab_id}");
        }
        Ok(true)
    }
}
