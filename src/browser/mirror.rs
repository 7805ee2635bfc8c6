use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard},
};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::timer::clock::Badge;

use super::{BlockRule, Browser, BrowserEvent, Tab, TabId, WindowId, BLOCKED_PAGE_PATH};

/// Instructions for the extension side. The host never touches the browser directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "command",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum HostCommand {
    UpdateRules {
        remove_rule_ids: Vec<u32>,
        add_rules: Vec<BlockRule>,
    },
    Navigate {
        tab_id: TabId,
        url: String,
    },
    SetBadge {
        text: String,
        color: Option<String>,
    },
}

#[derive(Default)]
struct MirrorState {
    tabs: BTreeMap<TabId, Tab>,
    active_tabs: HashMap<WindowId, TabId>,
    current_window: Option<WindowId>,
    rules: Vec<BlockRule>,
    extension_origin: String,
}

impl MirrorState {
    fn activate(&mut self, tab_id: TabId, window_id: WindowId) {
        if let Some(previous) = self.active_tabs.insert(window_id, tab_id) {
            if let Some(tab) = self.tabs.get_mut(&previous) {
                tab.active = false;
            }
        }
        if let Some(tab) = self.tabs.get_mut(&tab_id) {
            tab.active = true;
        }
        self.current_window = Some(window_id);
    }
}

/// [Browser] backed by a mirror of the browser state. The mirror is fed by [BrowserEvent]s and
/// every mutation is forwarded as a [HostCommand] for the extension to carry out.
pub struct MirroredBrowser {
    state: Mutex<MirrorState>,
    commands: mpsc::UnboundedSender<HostCommand>,
}

impl MirroredBrowser {
    pub fn new(extension_origin: String, commands: mpsc::UnboundedSender<HostCommand>) -> Self {
        Self {
            state: Mutex::new(MirrorState {
                extension_origin,
                ..MirrorState::default()
            }),
            commands,
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, MirrorState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("Browser mirror lock poisoned"))
    }

    fn send(&self, command: HostCommand) -> Result<()> {
        trace!("Queueing host command {command:?}");
        self.commands
            .send(command)
            .map_err(|_| anyhow!("Host output channel is closed"))
    }

    /// Brings the mirror in line with an event. Must run before the event reaches the enforcer
    /// or the trackers so they observe the post-event browser.
    pub fn apply(&self, event: &BrowserEvent) -> Result<()> {
        let mut state = self.state()?;
        match event {
            BrowserEvent::Snapshot {
                tabs,
                focused_window_id,
                extension_origin,
                rules,
            } => {
                state.tabs = tabs.iter().map(|t| (t.id, t.clone())).collect();
                state.active_tabs = tabs
                    .iter()
                    .filter(|t| t.active)
                    .map(|t| (t.window_id, t.id))
                    .collect();
                state.current_window = focused_window_id
                    .or_else(|| tabs.iter().find(|t| t.active).map(|t| t.window_id));
                if let Some(origin) = extension_origin {
                    state.extension_origin = origin.clone();
                }
                state.rules = rules.clone();
                debug!("Mirror reset with {} tabs", state.tabs.len());
            }
            BrowserEvent::TabCreated { tab } => {
                state.tabs.insert(tab.id, tab.clone());
                if tab.active {
                    state.activate(tab.id, tab.window_id);
                }
            }
            BrowserEvent::TabUpdated { tab_id, url } => {
                if let Some(tab) = state.tabs.get_mut(tab_id) {
                    tab.url = Some(url.clone());
                }
            }
            BrowserEvent::TabRemoved { tab_id } => {
                state.tabs.remove(tab_id);
                state.active_tabs.retain(|_, active| *active != *tab_id);
            }
            BrowserEvent::TabActivated { tab_id, window_id } => {
                state.activate(*tab_id, *window_id);
            }
            BrowserEvent::WindowFocusChanged { window_id } => {
                // Losing focus keeps the last window current, like the browser does.
                if let Some(window_id) = window_id {
                    state.current_window = Some(*window_id);
                }
            }
            BrowserEvent::ScreenLocked => {}
        }
        Ok(())
    }
}

#[async_trait]
impl Browser for MirroredBrowser {
    async fn installed_rules(&self) -> Result<Vec<BlockRule>> {
        Ok(self.state()?.rules.clone())
    }

    async fn update_rules(
        &self,
        remove_rule_ids: Vec<u32>,
        add_rules: Vec<BlockRule>,
    ) -> Result<()> {
        {
            let mut state = self.state()?;
            let mut rules = state
                .rules
                .iter()
                .filter(|r| !remove_rule_ids.contains(&r.id))
                .cloned()
                .collect::<Vec<_>>();
            for rule in &add_rules {
                if rules.iter().any(|r| r.id == rule.id) {
                    bail!("Rule with id {} does not have a unique id", rule.id);
                }
                rules.push(rule.clone());
            }
            state.rules = rules;
        }
        self.send(HostCommand::UpdateRules {
            remove_rule_ids,
            add_rules,
        })
    }

    async fn tabs(&self) -> Result<Vec<Tab>> {
        Ok(self.state()?.tabs.values().cloned().collect())
    }

    async fn tab(&self, tab_id: TabId) -> Result<Option<Tab>> {
        Ok(self.state()?.tabs.get(&tab_id).cloned())
    }

    async fn active_tab(&self) -> Result<Option<Tab>> {
        let state = self.state()?;
        let active = state
            .current_window
            .and_then(|window| state.active_tabs.get(&window))
            .and_then(|tab_id| state.tabs.get(tab_id))
            .cloned();
        Ok(active)
    }

    async fn navigate(&self, tab_id: TabId, url: String) -> Result<()> {
        {
            let mut state = self.state()?;
            let Some(tab) = state.tabs.get_mut(&tab_id) else {
                bail!("No tab with id {tab_id}");
            };
            tab.url = Some(url.clone());
        }
        self.send(HostCommand::Navigate { tab_id, url })
    }

    fn blocked_page_url(&self) -> String {
        let origin = self
            .state
            .lock()
            .map(|s| s.extension_origin.clone())
            .unwrap_or_default();
        format!("{}{BLOCKED_PAGE_PATH}", origin.trim_end_matches('/'))
    }

    async fn set_badge(&self, badge: Badge) -> Result<()> {
        self.send(HostCommand::SetBadge {
            text: badge.text,
            color: badge.color,
        })
    }
}
