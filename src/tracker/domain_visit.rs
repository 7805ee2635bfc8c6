use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::{
    browser::{Browser, TabId, WindowId},
    store::{entities::DomainVisit, repository::StateRepository},
    utils::clock::Clock,
};

/// Records which site is in front of the user during breaks. At most one visit is open at a
/// time and only this process knows which one.
pub struct DomainVisitTracker {
    browser: Arc<dyn Browser>,
    repository: StateRepository,
    clock: Arc<dyn Clock>,
    listening: bool,
    window_focused: bool,
    current: Option<Uuid>,
}

impl DomainVisitTracker {
    pub fn new(
        browser: Arc<dyn Browser>,
        repository: StateRepository,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            browser,
            repository,
            clock,
            listening: false,
            window_focused: true,
            current: None,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn current_visit(&self) -> Option<Uuid> {
        self.current
    }

    /// Starts listening and opens a visit for the active tab. A visit an earlier failed stop
    /// left open is closed first.
    pub async fn start(&mut self) -> Result<()> {
        self.listening = true;
        self.close_current_visit().await?;
        if !self.window_focused {
            return Ok(());
        }
        if let Some(url) = self.browser.active_tab().await?.and_then(|t| t.url) {
            self.open_visit(&url).await?;
        }
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.listening = false;
        self.close_current_visit().await
    }

    pub async fn on_tab_activated(&mut self, tab_id: TabId) -> Result<()> {
        if !self.listening {
            return Ok(());
        }
        let Some(url) = self.browser.tab(tab_id).await?.and_then(|t| t.url) else {
            return Ok(());
        };
        self.close_current_visit().await?;
        if self.window_focused {
            self.open_visit(&url).await?;
        }
        Ok(())
    }

    /// Only URL changes of the active tab count as a new visit.
    pub async fn on_tab_updated(&mut self, tab_id: TabId, url: &str) -> Result<()> {
        if !self.listening {
            return Ok(());
        }
        let active = self.browser.active_tab().await?.map(|t| t.id);
        if active != Some(tab_id) {
            return Ok(());
        }
        self.close_current_visit().await?;
        if self.window_focused {
            self.open_visit(url).await?;
        }
        Ok(())
    }

    /// Seeds window focus from a snapshot without opening or closing visits.
    pub fn set_window_focused(&mut self, focused: bool) {
        self.window_focused = focused;
    }

    /// `None` means every browser window lost focus.
    pub async fn on_window_focus_changed(&mut self, window_id: Option<WindowId>) -> Result<()> {
        self.window_focused = window_id.is_some();
        if !self.listening {
            return Ok(());
        }
        if self.window_focused {
            if let Some(url) = self.browser.active_tab().await?.and_then(|t| t.url) {
                self.close_current_visit().await?;
                self.open_visit(&url).await?;
            }
        } else {
            self.close_current_visit().await?;
        }
        Ok(())
    }

    /// Appends an open visit for the hostname of `url` and makes it current. Ignored when no
    /// session runs or the URL isn't a web page.
    pub async fn open_visit(&mut self, url: &str) -> Result<Option<DomainVisit>> {
        let Some(domain) = Url::parse(url)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .and_then(|u| u.host_str().map(str::to_string))
        else {
            debug!("Not a web page, ignoring {url}");
            return Ok(None);
        };

        let state = self.repository.timer_state().await?;
        let (true, Some(session_id)) = (state.is_running(), state.session_id) else {
            return Ok(None);
        };

        let visit = DomainVisit {
            id: Uuid::new_v4(),
            session_id,
            domain,
            started_at: self.clock.time(),
            ended_at: None,
        };
        let mut visits = self.repository.domain_visits().await?;
        visits.push(visit.clone());
        self.repository.save_domain_visits(&visits).await?;
        self.current = Some(visit.id);
        debug!("Opened visit to {}", visit.domain);
        Ok(Some(visit))
    }

    /// The visit stays current until its end is written.
    pub async fn close_current_visit(&mut self) -> Result<()> {
        let Some(current) = self.current else {
            return Ok(());
        };
        let mut visits = self.repository.domain_visits().await?;
        if let Some(visit) = visits.iter_mut().find(|v| v.id == current) {
            visit.ended_at = Some(self.clock.time());
            debug!("Closing visit to {}", visit.domain);
            self.repository.save_domain_visits(&visits).await?;
        }
        self.current = None;
        Ok(())
    }

    /// Closes open visits this process doesn't own, left behind by an earlier run.
    pub async fn close_orphaned_visits(&self) -> Result<usize> {
        let mut visits = self.repository.domain_visits().await?;
        let now = self.clock.time();
        let mut closed = 0;
        for visit in visits
            .iter_mut()
            .filter(|v| v.is_open() && Some(v.id) != self.current)
        {
            visit.ended_at = Some(now);
            closed += 1;
        }
        if closed > 0 {
            self.repository.save_domain_visits(&visits).await?;
            info!("Closed {closed} orphaned domain visits");
        }
        Ok(closed)
    }
}
