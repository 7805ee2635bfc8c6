//! Contains the contract with the browser the host is attached to.
//! [Browser] abstracts the operations the enforcer and the trackers need, and
//! [mirror::MirroredBrowser] is the main realization used when running as a host.

pub mod mirror;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::timer::clock::Badge;

/// Path of the page blocked navigations land on, relative to the extension origin.
pub const BLOCKED_PAGE_PATH: &str = "/blocked/blocked.html";

pub type TabId = i64;
pub type WindowId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    pub window_id: WindowId,
    /// Missing for tabs the browser doesn't expose a URL for.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleActionKind {
    Redirect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRedirect {
    pub extension_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub kind: RuleActionKind,
    pub redirect: RuleRedirect,
}

/// `request_domains` matches the listed domains and all of their subdomains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub request_domains: Vec<String>,
    pub resource_types: Vec<ResourceType>,
}

/// One entry of the browser's declarative request table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

/// Browser level signals forwarded by the extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum BrowserEvent {
    /// Full picture of the browser, sent when the extension (re)connects.
    Snapshot {
        tabs: Vec<Tab>,
        #[serde(default)]
        focused_window_id: Option<WindowId>,
        #[serde(default)]
        extension_origin: Option<String>,
        /// Rules left installed by an earlier run of the host.
        #[serde(default)]
        rules: Vec<BlockRule>,
    },
    TabCreated {
        tab: Tab,
    },
    TabUpdated {
        tab_id: TabId,
        url: String,
    },
    TabRemoved {
        tab_id: TabId,
    },
    TabActivated {
        tab_id: TabId,
        window_id: WindowId,
    },
    /// `None` means no browser window has focus.
    WindowFocusChanged {
        #[serde(default)]
        window_id: Option<WindowId>,
    },
    ScreenLocked,
}

/// Intended to serve as a contract the host environment must implement.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Browser: Send + Sync {
    async fn installed_rules(&self) -> Result<Vec<BlockRule>>;

    /// Removes and adds rules in one step, so there is never a moment with neither set installed.
    async fn update_rules(&self, remove_rule_ids: Vec<u32>, add_rules: Vec<BlockRule>)
        -> Result<()>;

    async fn tabs(&self) -> Result<Vec<Tab>>;

    async fn tab(&self, tab_id: TabId) -> Result<Option<Tab>>;

    /// Active tab of the current window.
    async fn active_tab(&self) -> Result<Option<Tab>>;

    /// Fails if the tab no longer exists.
    async fn navigate(&self, tab_id: TabId, url: String) -> Result<()>;

    /// Full URL of the page blocked navigations are sent to.
    fn blocked_page_url(&self) -> String;

    async fn set_badge(&self, badge: Badge) -> Result<()>;
}
